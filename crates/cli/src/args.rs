use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "trishula")]
#[command(version)]
#[command(about = "Layered network reconnaissance engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v, -vv); LOG_LEVEL takes precedence when set
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan one or more targets through the layered pipeline
    Scan {
        /// Targets: IPv4 addresses, CIDR blocks, ranges, or hostnames,
        /// comma separated. Example: 203.0.113.7,192.168.1.0/28
        #[arg(short = 't', long, required = true)]
        targets: String,

        /// Pin explicit ports (e.g. 80,443 or 1-1024); disables smart
        /// escalation for the run
        #[arg(short, long)]
        ports: Option<String>,

        /// Scan layers to run
        #[arg(short, long, default_value = "port_scan,http_detection,web_probe")]
        layers: String,

        /// Disable smart escalation even without pinned ports
        #[arg(long)]
        no_smart: bool,

        /// Open-port count below which the preset sweep escalates to 1-65535
        #[arg(long, default_value = "3")]
        threshold: usize,

        /// Maximum concurrently scanned targets
        #[arg(long, default_value = "5")]
        max_concurrent: usize,

        /// Sweep helper per-port timeout in milliseconds
        #[arg(long, default_value = "10000")]
        timeout: u64,

        /// Banner capture timeout in seconds
        #[arg(long, default_value = "5.0")]
        banner_timeout: f64,

        /// HTTP probe timeout in seconds
        #[arg(long, default_value = "10.0")]
        http_timeout: f64,

        /// Directory probes in flight per endpoint
        #[arg(long, default_value = "10")]
        admin_threads: usize,

        /// Skip the directory-probing layer's admin path catalogue
        #[arg(long)]
        no_directory_scan: bool,

        /// Output format: table, json, csv
        #[arg(short, long, default_value = "table")]
        output_format: String,

        /// Also write the JSON report to this file
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Stream progress events to stderr
        #[arg(long)]
        progress: bool,
    },

    /// Scan targets listed in a file, one report file per target
    Batch {
        /// File with one target expression per line; '#' starts a comment
        targets_file: PathBuf,

        /// Scan layers to run
        #[arg(short, long, default_value = "port_scan,http_detection,web_probe")]
        layers: String,

        /// Maximum concurrently scanned targets
        #[arg(short = 'c', long, default_value = "5")]
        max_concurrent: usize,

        /// Directory receiving one JSON report per target
        #[arg(short, long, default_value = "scan_results")]
        output_dir: PathBuf,

        /// Stream progress events to stderr
        #[arg(long)]
        progress: bool,
    },

    /// Report sweep-helper installation status and effective defaults
    Check,
}
