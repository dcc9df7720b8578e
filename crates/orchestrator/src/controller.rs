//! The smart controller: drives the three layers for one target
//!
//! Layer boundaries are strict: no layer-2 work starts until layer 1 has
//! yielded its complete, sorted port set. Escalation decisions sit between
//! the preset sweep and HTTP detection; a full sweep always supersedes the
//! preset result set.

use crate::progress::ProgressSender;
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{error, info};
use trishula_common::{PortInfo, ScanConfig, ScanError, ScanResult, ScanTarget};
use trishula_discovery::{BannerGrabber, PortDiscoverer, PortSet};
use trishula_web::{DirectoryProber, HttpFingerprinter};

/// The three pipeline layers a caller can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanLayer {
    PortScan,
    HttpDetection,
    WebProbe,
}

impl ScanLayer {
    pub const ALL: [ScanLayer; 3] = [
        ScanLayer::PortScan,
        ScanLayer::HttpDetection,
        ScanLayer::WebProbe,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ScanLayer::PortScan => "port_scan",
            ScanLayer::HttpDetection => "http_detection",
            ScanLayer::WebProbe => "web_probe",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ScanError> {
        match s.trim() {
            "port_scan" => Ok(ScanLayer::PortScan),
            "http_detection" => Ok(ScanLayer::HttpDetection),
            "web_probe" => Ok(ScanLayer::WebProbe),
            other => Err(ScanError::ConfigInvalid(format!("unknown scan layer: {other}"))),
        }
    }
}

pub struct SmartController {
    config: Arc<ScanConfig>,
    discoverer: PortDiscoverer,
    banner: BannerGrabber,
    http: HttpFingerprinter,
    prober: DirectoryProber,
}

impl SmartController {
    pub fn new(config: Arc<ScanConfig>) -> Result<Self, ScanError> {
        Ok(Self {
            discoverer: PortDiscoverer::new(Arc::clone(&config)),
            banner: BannerGrabber::new(Arc::clone(&config)),
            http: HttpFingerprinter::new(Arc::clone(&config))?,
            prober: DirectoryProber::new(Arc::clone(&config))?,
            config,
        })
    }

    /// Run the requested layers for one target. Never returns an error:
    /// anything that escapes a layer marks the result failed with its
    /// partial findings preserved.
    pub async fn scan_target(
        &self,
        target: ScanTarget,
        layers: &[ScanLayer],
        progress: &ProgressSender,
    ) -> ScanResult {
        self.run(ScanResult::new(target), layers, progress).await
    }

    /// Drive a caller-constructed aggregator through the pipeline. Lets the
    /// engine register the scan id before any work starts.
    pub async fn run(
        &self,
        mut result: ScanResult,
        layers: &[ScanLayer],
        progress: &ProgressSender,
    ) -> ScanResult {
        result.mark_running();
        info!("scan {} started on {}", result.scan_id, result.target);

        match self.run_layers(&mut result, layers, progress).await {
            Ok(()) => result.mark_completed(),
            Err(e) => {
                error!("scan {} failed: {e}", result.scan_id);
                result.mark_failed(e.to_string());
            }
        }

        progress.emit(
            result.scan_id,
            result.target.ip,
            "scan_complete",
            100.0,
            format!(
                "scan finished: {} ports, {} web services, {} notable paths",
                result.summary.open_ports_count,
                result.summary.http_services_count,
                result.summary.admin_directories_count
            ),
        );
        info!(
            "scan {} finished with status {:?} in {:.2}s",
            result.scan_id,
            result.status,
            result.duration.unwrap_or(0.0)
        );
        result
    }

    async fn run_layers(
        &self,
        result: &mut ScanResult,
        layers: &[ScanLayer],
        progress: &ProgressSender,
    ) -> Result<(), ScanError> {
        let ip = result.target.ip;
        let mut fingerprinted: HashSet<u16> = HashSet::new();

        if layers.contains(&ScanLayer::PortScan) {
            let smart = self.config.smart_scan_enabled && !result.target.has_explicit_ports();
            if smart {
                fingerprinted = self.run_smart_layer1(result, layers, progress).await?;
            } else {
                let set = match &result.target.ports {
                    Some(ports) => PortSet::explicit(ports.clone()),
                    None => PortSet::preset(&self.config)?,
                };
                progress.emit(
                    result.scan_id,
                    ip,
                    "port_scan",
                    0.0,
                    format!("scanning {} candidate ports", set.len()),
                );
                let ports = self.sweep_and_banner(ip, &set).await;
                result.replace_ports(ports);
                result.finalize_ports();
                progress.emit(
                    result.scan_id,
                    ip,
                    "port_scan",
                    30.0,
                    format!("found {} open ports", result.open_ports.len()),
                );
            }
        }

        if layers.contains(&ScanLayer::HttpDetection) && !result.open_ports.is_empty() {
            let remaining: Vec<PortInfo> = result
                .open_ports
                .iter()
                .filter(|p| !fingerprinted.contains(&p.port))
                .cloned()
                .collect();
            if !remaining.is_empty() {
                progress.emit(
                    result.scan_id,
                    ip,
                    "http_detection",
                    88.0,
                    format!("checking {} ports for web services", remaining.len()),
                );
                let services = self.http.detect(ip, &remaining).await;
                progress.emit(
                    result.scan_id,
                    ip,
                    "http_detection",
                    92.0,
                    format!("found {} HTTP services", services.len()),
                );
                for service in services {
                    result.add_http_service(service);
                }
            }
        }

        if layers.contains(&ScanLayer::WebProbe) && !result.http_services.is_empty() {
            progress.emit(
                result.scan_id,
                ip,
                "web_probe",
                95.0,
                format!("probing {} web services", result.http_services.len()),
            );
            let directories = self.prober.probe_all(&result.http_services).await;
            progress.emit(
                result.scan_id,
                ip,
                "web_probe",
                98.0,
                format!("found {} notable paths", directories.len()),
            );
            for dir in directories {
                result.add_admin_directory(dir);
            }
        }

        Ok(())
    }

    /// Smart layer 1: preset sweep, then decide between a full sweep and a
    /// web check on the already-discovered web-candidate ports. Returns the
    /// ports that were already fingerprinted during the web check.
    async fn run_smart_layer1(
        &self,
        result: &mut ScanResult,
        layers: &[ScanLayer],
        progress: &ProgressSender,
    ) -> Result<HashSet<u16>, ScanError> {
        let ip = result.target.ip;
        let id = result.scan_id;

        progress.emit(id, ip, "smart_preset_scan", 0.0, "preset port sweep".into());
        let preset = PortSet::preset(&self.config)?;
        let ports = self.sweep_and_banner(ip, &preset).await;
        result.replace_ports(ports);
        result.finalize_ports();

        let open_count = result.open_ports.len();
        progress.emit(
            id,
            ip,
            "smart_preset_scan",
            30.0,
            format!("preset sweep found {open_count} open ports"),
        );

        progress.emit(
            id,
            ip,
            "smart_decision",
            35.0,
            format!(
                "{open_count} open ports vs threshold {}",
                self.config.smart_scan_threshold
            ),
        );

        if open_count < self.config.smart_scan_threshold {
            info!(
                "{ip}: {open_count} < {} open ports, escalating to full sweep",
                self.config.smart_scan_threshold
            );
            progress.emit(id, ip, "smart_decision", 40.0, "below threshold, running full sweep".into());
            self.full_sweep(result, progress).await;
            return Ok(HashSet::new());
        }

        // Enough ports: fingerprint the web-candidate subset before deciding
        let web_subset: Vec<PortInfo> = result
            .open_ports
            .iter()
            .filter(|p| self.config.web_ports.contains(&p.port))
            .cloned()
            .collect();

        let mut checked = HashSet::new();
        let mut found_web = false;
        if layers.contains(&ScanLayer::HttpDetection) && !web_subset.is_empty() {
            progress.emit(
                id,
                ip,
                "web_service_check",
                40.0,
                format!("checking {} web ports", web_subset.len()),
            );
            let services = self.http.detect(ip, &web_subset).await;
            checked.extend(web_subset.iter().map(|p| p.port));
            found_web = !services.is_empty();
            progress.emit(
                id,
                ip,
                "web_service_check",
                60.0,
                format!("found {} HTTP services", services.len()),
            );
            for service in services {
                result.add_http_service(service);
            }
        }

        if found_web {
            info!("{ip}: web surface found, skipping full sweep");
            progress.emit(id, ip, "smart_decision", 80.0, "web surface found, full sweep skipped".into());
            Ok(checked)
        } else {
            info!("{ip}: no web surface, escalating to full sweep");
            progress.emit(id, ip, "smart_decision", 70.0, "no web surface, running full sweep".into());
            self.full_sweep(result, progress).await;
            Ok(HashSet::new())
        }
    }

    /// Exhaustive 1-65535 sweep; its result set supersedes earlier findings.
    async fn full_sweep(&self, result: &mut ScanResult, progress: &ProgressSender) {
        let ip = result.target.ip;
        progress.emit(result.scan_id, ip, "full_sweep", 45.0, "sweeping ports 1-65535".into());
        let ports = self.sweep_and_banner(ip, &PortSet::full()).await;
        result.replace_ports(ports);
        result.finalize_ports();
        progress.emit(
            result.scan_id,
            ip,
            "full_sweep",
            65.0,
            format!("full sweep found {} open ports", result.open_ports.len()),
        );
    }

    /// Layer-1 unit of work: discover open ports in `set`, then capture
    /// banners for whatever came back.
    async fn sweep_and_banner(&self, ip: Ipv4Addr, set: &PortSet) -> Vec<PortInfo> {
        let open = self.discoverer.discover(ip, set).await;
        if open.is_empty() {
            return Vec::new();
        }
        let ports: Vec<u16> = open.iter().map(|p| p.port).collect();
        self.banner.grab_all(ip, &ports).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use trishula_common::ScanStatus;

    fn test_config() -> ScanConfig {
        ScanConfig {
            banner_timeout_s: 1.0,
            http_timeout_s: 2.0,
            directory_timeout_s: 2.0,
            ..ScanConfig::default()
        }
    }

    fn controller(config: ScanConfig) -> SmartController {
        SmartController::new(Arc::new(config)).unwrap()
    }

    /// Minimal HTTP endpoint that answers every connection with the same
    /// canned response. It waits briefly for a request so real GETs are
    /// consumed, but still answers silent connections, which lets the
    /// passive banner read see the response too.
    async fn canned_http_server() -> u16 {
        let body = "<html><head><title>Router Admin</title></head><body><form action=\"/login\"><input type=\"password\"></form></body></html>";
        let response = format!(
            "HTTP/1.1 200 OK\r\nServer: nginx/1.18.0\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                if let Ok((mut stream, _)) = listener.accept().await {
                    let response = response.clone();
                    tokio::spawn(async move {
                        let mut buf = [0u8; 1024];
                        let _ = tokio::time::timeout(
                            std::time::Duration::from_millis(100),
                            stream.read(&mut buf),
                        )
                        .await;
                        let _ = stream.write_all(response.as_bytes()).await;
                        let _ = stream.shutdown().await;
                    });
                }
            }
        });
        port
    }

    #[test]
    fn layer_parsing() {
        assert_eq!(ScanLayer::parse("port_scan").unwrap(), ScanLayer::PortScan);
        assert_eq!(ScanLayer::parse(" web_probe ").unwrap(), ScanLayer::WebProbe);
        assert!(ScanLayer::parse("dns").is_err());
        assert_eq!(ScanLayer::PortScan.as_str(), "port_scan");
    }

    #[tokio::test]
    async fn empty_host_completes_cleanly() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let controller = controller(test_config());
        let target = ScanTarget::with_ports(Ipv4Addr::LOCALHOST, vec![port]);
        let result = controller
            .scan_target(target, &ScanLayer::ALL, &ProgressSender::disabled())
            .await;

        assert_eq!(result.status, ScanStatus::Completed);
        assert!(result.open_ports.is_empty());
        assert!(result.http_services.is_empty());
        assert!(result.admin_directories.is_empty());
        assert!(result.end_time.is_some());
        assert!(result.duration.is_some());
    }

    #[tokio::test]
    async fn explicit_ports_full_pipeline() {
        let http_port = canned_http_server().await;
        let closed = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let p = l.local_addr().unwrap().port();
            drop(l);
            p
        };

        let controller = controller(test_config());
        let target = ScanTarget::with_ports(Ipv4Addr::LOCALHOST, vec![http_port, closed]);
        let result = controller
            .scan_target(target, &ScanLayer::ALL, &ProgressSender::disabled())
            .await;

        assert_eq!(result.status, ScanStatus::Completed);

        // explicit mode: reported ports are a subset of the requested ones
        let ports: Vec<u16> = result.open_ports.iter().map(|p| p.port).collect();
        assert_eq!(ports, vec![http_port]);
        assert!(result.open_ports.iter().all(|p| p.is_open()));

        // the banner phase saw the eager response and labeled the service
        let info = &result.open_ports[0];
        assert_eq!(info.service.as_deref(), Some("http"));
        assert!(info.banner.is_some());

        // every HTTP service references a discovered open port
        assert_eq!(result.http_services.len(), 1);
        let http = &result.http_services[0];
        assert_eq!(http.port(), Some(http_port));
        assert_eq!(http.status_code, 200);
        assert_eq!(http.title.as_deref(), Some("Router Admin"));
        assert_eq!(http.server.as_deref(), Some("nginx/1.18.0"));

        // layer 3 found admin paths (every canned answer is meaningful,
        // so at minimum the keyword-bearing paths are flagged)
        assert!(result.summary.admin_directories_count > 0);
        let admin = result
            .admin_directories
            .iter()
            .find(|d| d.path == "/admin")
            .unwrap();
        assert!(admin.is_admin);
        assert_eq!(result.summary.admin_interfaces_count,
            result.admin_directories.iter().filter(|d| d.is_admin).count());
    }

    #[tokio::test]
    async fn layer_gating_skips_downstream_work() {
        let http_port = canned_http_server().await;

        let controller = controller(test_config());
        let target = ScanTarget::with_ports(Ipv4Addr::LOCALHOST, vec![http_port]);
        let result = controller
            .scan_target(target, &[ScanLayer::PortScan], &ProgressSender::disabled())
            .await;

        assert_eq!(result.status, ScanStatus::Completed);
        assert_eq!(result.open_ports.len(), 1);
        assert!(result.http_services.is_empty());
        assert!(result.admin_directories.is_empty());
    }

    #[tokio::test]
    async fn progress_events_end_at_one_hundred() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let (sender, mut rx) = ProgressSender::channel();
        let controller = controller(test_config());
        let target = ScanTarget::with_ports(Ipv4Addr::LOCALHOST, vec![port]);
        let result = controller.scan_target(target, &ScanLayer::ALL, &sender).await;
        drop(sender);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert!(!events.is_empty());
        let last = events.last().unwrap();
        assert_eq!(last.stage, "scan_complete");
        assert_eq!(last.percent, 100.0);
        assert!(events.iter().all(|e| e.scan_id == result.scan_id));
    }
}
