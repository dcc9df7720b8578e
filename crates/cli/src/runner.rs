use crate::output::{print_results, write_json_report};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;
use trishula_common::config::parse_port_spec;
use trishula_common::{ScanConfig, ScanTarget};
use trishula_discovery::check_installation;
use trishula_orchestrator::{Engine, ScanLayer};
use trishula_target_resolver::TargetResolver;

pub struct ScanArgs {
    pub targets: String,
    pub ports: Option<String>,
    pub layers: String,
    pub no_smart: bool,
    pub threshold: usize,
    pub max_concurrent: usize,
    pub timeout: u64,
    pub banner_timeout: f64,
    pub http_timeout: f64,
    pub admin_threads: usize,
    pub no_directory_scan: bool,
    pub output_format: String,
    pub output: Option<PathBuf>,
    pub progress: bool,
}

pub async fn run_scan(args: ScanArgs) -> Result<()> {
    let ips = TargetResolver::resolve_targets(&args.targets).await?;
    let explicit_ports = args
        .ports
        .as_deref()
        .map(parse_port_spec)
        .transpose()
        .context("invalid --ports value")?;
    let layers = parse_layers(&args.layers)?;

    info!("scanning {} target(s), layers: {:?}", ips.len(), layers);

    let config = ScanConfig {
        smart_scan_enabled: !args.no_smart,
        smart_scan_threshold: args.threshold,
        max_concurrent_targets: args.max_concurrent,
        sweep_timeout_ms: args.timeout,
        banner_timeout_s: args.banner_timeout,
        http_timeout_s: args.http_timeout,
        directory_concurrency: args.admin_threads,
        directory_scan_enabled: !args.no_directory_scan,
        ..ScanConfig::default()
    };
    let mut engine = Engine::new(config)?;

    if args.progress {
        let mut rx = engine.subscribe_progress();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                eprintln!(
                    "[{:>5.1}%] {} {}: {}",
                    event.percent, event.target, event.stage, event.message
                );
            }
        });
    }

    let scan_targets: Vec<ScanTarget> = ips
        .into_iter()
        .map(|ip| match &explicit_ports {
            Some(ports) => ScanTarget::with_ports(ip, ports.clone()),
            None => ScanTarget::new(ip),
        })
        .collect();

    let started = Instant::now();
    let results = engine.batch_scan(scan_targets, &layers).await;
    let elapsed = started.elapsed();

    print_results(&results, &args.output_format, elapsed)?;
    if let Some(path) = &args.output {
        write_json_report(&results, elapsed, path)?;
        info!("JSON report written to {}", path.display());
    }
    Ok(())
}

/// Scan every target listed in a file and drop one JSON report per target
/// into the output directory.
pub async fn run_batch(
    targets_file: PathBuf,
    layers: String,
    max_concurrent: usize,
    output_dir: PathBuf,
    progress: bool,
) -> Result<()> {
    let raw = std::fs::read_to_string(&targets_file)
        .with_context(|| format!("cannot read {}", targets_file.display()))?;
    let spec = parse_target_lines(&raw)?;
    let ips = TargetResolver::resolve_targets(&spec).await?;
    let layers = parse_layers(&layers)?;

    let config = ScanConfig {
        max_concurrent_targets: max_concurrent,
        ..ScanConfig::default()
    };
    let mut engine = Engine::new(config)?;

    if progress {
        let mut rx = engine.subscribe_progress();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                eprintln!(
                    "[{:>5.1}%] {} {}: {}",
                    event.percent, event.target, event.stage, event.message
                );
            }
        });
    }

    let targets: Vec<ScanTarget> = ips.into_iter().map(ScanTarget::new).collect();
    info!("batch scanning {} targets from {}", targets.len(), targets_file.display());

    let started = Instant::now();
    let results = engine.batch_scan(targets, &layers).await;
    let elapsed = started.elapsed();

    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("cannot create {}", output_dir.display()))?;
    for result in &results {
        let path = output_dir.join(format!("{}_{}.json", result.target.ip, result.scan_id));
        std::fs::write(&path, serde_json::to_string_pretty(result)?)?;
    }

    print_results(&results, "table", elapsed)?;
    println!("Reports written to {}", output_dir.display());
    Ok(())
}

/// Join the non-comment lines of a targets file into one resolver spec.
fn parse_target_lines(raw: &str) -> Result<String> {
    let entries: Vec<&str> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect();
    if entries.is_empty() {
        anyhow::bail!("targets file contains no targets");
    }
    Ok(entries.join(","))
}

/// Show where the sweep helper resolves from and whether it runs, plus the
/// defaults a scan would use.
pub async fn run_check() -> Result<()> {
    let status = check_installation().await;
    let config = ScanConfig::default();

    println!("Sweep helper");
    println!("  platform binary : {}", status.platform_filename);
    println!(
        "  local bin/      : {}",
        status
            .local_path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "not found".into())
    );
    println!(
        "  on $PATH        : {}",
        status
            .path_binary
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "not found".into())
    );
    match (&status.resolved, &status.version) {
        (Some(path), Some(version)) => {
            println!("  using           : {} ({version})", path.display());
        }
        (Some(path), None) => {
            println!("  using           : {} (does not run)", path.display());
        }
        _ => println!("  using           : none, connect-scan fallback only"),
    }

    println!("\nDefaults");
    println!("  preset range    : {}", config.preset_port_range);
    println!("  preset extras   : {} ports", config.preset_extra_ports.len());
    println!("  web ports       : {:?}", config.web_ports);
    println!(
        "  smart scan      : {} (threshold {})",
        config.smart_scan_enabled, config.smart_scan_threshold
    );
    println!("  max targets     : {}", config.max_concurrent_targets);
    Ok(())
}

fn parse_layers(spec: &str) -> Result<Vec<ScanLayer>> {
    let layers: Vec<ScanLayer> = spec
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| ScanLayer::parse(s).map_err(anyhow::Error::from))
        .collect::<Result<_>>()?;
    if layers.is_empty() {
        anyhow::bail!("no scan layers selected");
    }
    Ok(layers)
}
