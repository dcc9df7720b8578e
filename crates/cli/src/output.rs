//! Output formatting for scan results

use anyhow::Result;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use trishula_common::{ScanResult, ScanStatus};

/// Print scan results in the requested format.
pub fn print_results(results: &[ScanResult], format: &str, elapsed: Duration) -> Result<()> {
    match format.trim().to_lowercase().as_str() {
        "json" | "j" => print_json(results, elapsed)?,
        "csv" | "c" => print_csv(results),
        "table" | "text" | "t" | "" => print_table(results, elapsed),
        other => {
            eprintln!("Warning: unknown format '{other}', using table");
            print_table(results, elapsed);
        }
    }
    Ok(())
}

/// Write the JSON report to a file regardless of the console format.
pub fn write_json_report(results: &[ScanResult], elapsed: Duration, path: &Path) -> Result<()> {
    let report = build_report(results, elapsed)?;
    std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
    Ok(())
}

fn build_report(results: &[ScanResult], elapsed: Duration) -> Result<serde_json::Value> {
    let rendered: Vec<serde_json::Value> = results
        .iter()
        .map(serde_json::to_value)
        .collect::<std::result::Result<_, _>>()?;

    Ok(json!({
        "scan_info": {
            "duration_seconds": elapsed.as_secs_f64(),
            "duration_formatted": format_duration(elapsed),
            "total_targets": results.len(),
            "completed": results.iter().filter(|r| r.status == ScanStatus::Completed).count(),
            "failed": results.iter().filter(|r| r.status == ScanStatus::Failed).count(),
        },
        "results": rendered,
    }))
}

/// One CSV row per open port, banners escaped and flattened.
fn print_csv(results: &[ScanResult]) {
    println!("ip,port,protocol,state,service,version,confidence,banner");
    for result in results {
        for port in &result.open_ports {
            let banner = port
                .banner
                .as_deref()
                .map(|b| b.replace('"', "\"\"").replace('\n', " ").replace('\r', ""))
                .unwrap_or_default();
            println!(
                "{},{},{},{},\"{}\",\"{}\",{:.2},\"{}\"",
                result.target.ip,
                port.port,
                port.protocol.as_str(),
                port.state,
                port.service.as_deref().unwrap_or(""),
                port.version.as_deref().unwrap_or(""),
                port.confidence,
                banner
            );
        }
    }
}

/// The consumer-facing JSON report: one entry per target in the stable
/// result shape, wrapped with batch-level timing.
fn print_json(results: &[ScanResult], elapsed: Duration) -> Result<()> {
    let report = build_report(results, elapsed)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn print_table(results: &[ScanResult], elapsed: Duration) {
    if results.is_empty() {
        println!("\nNo results to display.\n");
        return;
    }

    for result in results {
        println!("\n{:-<78}", "");
        println!(
            "Target {}  [{}]  scan {}",
            result.target.ip,
            status_label(result),
            result.scan_id
        );
        println!("{:-<78}", "");

        if let Some(error) = &result.error_message {
            println!("  error: {error}");
        }

        if result.open_ports.is_empty() {
            println!("  no open ports");
        } else {
            println!(
                "  {:<8} {:<8} {:<18} {:<28} {:<6}",
                "PORT", "STATE", "SERVICE", "VERSION", "CONF"
            );
            for port in &result.open_ports {
                println!(
                    "  {:<8} {:<8} {:<18} {:<28} {:<6.2}",
                    port.port,
                    port.state,
                    port.service.as_deref().unwrap_or("unknown"),
                    truncate(port.version.as_deref().unwrap_or(""), 28),
                    port.confidence
                );
            }
        }

        if !result.http_services.is_empty() {
            println!("\n  Web services:");
            for http in &result.http_services {
                println!(
                    "    {} -> {}  {}  {}",
                    http.url,
                    http.status_code,
                    http.server.as_deref().unwrap_or("-"),
                    truncate(http.title.as_deref().unwrap_or(""), 40)
                );
                if let Some(redirect) = &http.redirect_url {
                    println!("      redirects to {redirect}");
                }
            }
        }

        if !result.admin_directories.is_empty() {
            println!("\n  Notable paths:");
            for dir in &result.admin_directories {
                let flag = if dir.is_admin { " [ADMIN]" } else { "" };
                println!(
                    "    {} ({}){}  {}",
                    dir.path,
                    dir.status_code,
                    flag,
                    truncate(dir.title.as_deref().unwrap_or(""), 40)
                );
            }
        }

        println!(
            "\n  Summary: {} open ports, {} web services, {} notable paths ({} admin)",
            result.summary.open_ports_count,
            result.summary.http_services_count,
            result.summary.admin_directories_count,
            result.summary.admin_interfaces_count
        );
    }

    println!("\nScanned {} target(s) in {}\n", results.len(), format_duration(elapsed));
}

fn status_label(result: &ScanResult) -> &'static str {
    match result.status {
        ScanStatus::Pending => "pending",
        ScanStatus::Running => "running",
        ScanStatus::Completed => "completed",
        ScanStatus::Failed => "failed",
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    } else {
        s.to_string()
    }
}

fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if total_secs == 0 {
        format!("{millis}ms")
    } else if total_secs < 60 {
        if millis > 0 {
            format!("{total_secs}.{millis:03}s")
        } else {
            format!("{total_secs}s")
        }
    } else {
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        if secs > 0 {
            format!("{mins}m {secs}s")
        } else {
            format!("{mins}m")
        }
    }
}
