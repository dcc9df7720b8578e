mod args;
mod output;
mod runner;

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use args::{Cli, Commands};
use runner::{run_batch, run_check, run_scan, ScanArgs};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    match cli.command {
        Commands::Scan {
            targets,
            ports,
            layers,
            no_smart,
            threshold,
            max_concurrent,
            timeout,
            banner_timeout,
            http_timeout,
            admin_threads,
            no_directory_scan,
            output_format,
            output,
            progress,
        } => {
            run_scan(ScanArgs {
                targets,
                ports,
                layers,
                no_smart,
                threshold,
                max_concurrent,
                timeout,
                banner_timeout,
                http_timeout,
                admin_threads,
                no_directory_scan,
                output_format,
                output,
                progress,
            })
            .await?;
        }
        Commands::Batch {
            targets_file,
            layers,
            max_concurrent,
            output_dir,
            progress,
        } => {
            run_batch(targets_file, layers, max_concurrent, output_dir, progress).await?;
        }
        Commands::Check => run_check().await?,
    }

    Ok(())
}

/// Logging honors `LOG_LEVEL`, `LOG_FILE`, and `LOG_DETAILED`; the `-v`
/// flags only apply when `LOG_LEVEL` is unset. Stderr is always a sink,
/// `LOG_FILE` adds a plain-text file sink. Detailed file:line formatting
/// is on unless `LOG_DETAILED` is set falsy.
fn init_logging(verbose: u8) -> Result<()> {
    let level = match std::env::var("LOG_LEVEL") {
        Ok(value) => normalize_level(&value),
        Err(_) => match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        },
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let detailed = std::env::var("LOG_DETAILED")
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(true);

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(detailed)
        .with_file(detailed)
        .with_line_number(detailed)
        .compact();

    let registry = tracing_subscriber::registry().with(filter).with(stderr_layer);

    if let Ok(path) = std::env::var("LOG_FILE") {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        let file_layer = fmt::layer()
            .with_ansi(false)
            .with_writer(Arc::new(file))
            .with_target(detailed)
            .with_file(detailed)
            .with_line_number(detailed);
        registry.with(file_layer).init();
    } else {
        registry.init();
    }
    Ok(())
}

/// Accept Python-style level names alongside tracing's own.
fn normalize_level(value: &str) -> &'static str {
    match value.to_uppercase().as_str() {
        "DEBUG" => "debug",
        "WARNING" | "WARN" => "warn",
        "ERROR" => "error",
        "TRACE" => "trace",
        _ => "info",
    }
}
