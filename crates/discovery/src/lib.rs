//! Layer 1: port discovery and banner capture
//!
//! Discovery runs behind one contract with two implementations: the
//! external fast-sweep helper when a binary can be located, and an
//! in-process TCP connect scan otherwise. Helper failure is informational
//! and always falls through to the connect scan.

mod banner;
mod connect;
mod helper;
mod ports;

pub use banner::BannerGrabber;
pub use connect::ConnectSweep;
pub use helper::{check_installation, HelperStatus, HelperSweep};
pub use ports::PortSet;

use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, info, warn};
use trishula_common::{PortInfo, ScanConfig, ScanError};

/// One port-sweep strategy.
#[async_trait]
pub trait Sweeper: Send + Sync {
    /// Return the open TCP ports found in `set`, deduplicated and sorted.
    async fn sweep(&self, ip: Ipv4Addr, set: &PortSet) -> Result<Vec<u16>, ScanError>;

    /// Strategy name for log lines.
    fn name(&self) -> &'static str;
}

/// Layer-1 entry point: helper-first discovery with connect-scan fallback.
pub struct PortDiscoverer {
    helper: Option<HelperSweep>,
    fallback: ConnectSweep,
}

impl PortDiscoverer {
    #[must_use]
    pub fn new(config: Arc<ScanConfig>) -> Self {
        let helper = HelperSweep::locate(Arc::clone(&config));
        match &helper {
            Some(h) => info!("using sweep helper at {}", h.path().display()),
            None => info!("no sweep helper found, connect scan only"),
        }
        Self {
            helper,
            fallback: ConnectSweep::new(),
        }
    }

    /// Discover open ports in `set`. Never fails: an empty result means no
    /// open ports were observed.
    pub async fn discover(&self, ip: Ipv4Addr, set: &PortSet) -> Vec<PortInfo> {
        let ports = match &self.helper {
            Some(helper) => match helper.sweep(ip, set).await {
                Ok(ports) => ports,
                Err(e) => {
                    warn!("sweep helper failed ({e}), falling back to connect scan");
                    self.run_fallback(ip, set).await
                }
            },
            None => self.run_fallback(ip, set).await,
        };

        debug!("{ip}: {} open ports in {} candidates", ports.len(), set.len());
        ports.into_iter().map(PortInfo::open).collect()
    }

    async fn run_fallback(&self, ip: Ipv4Addr, set: &PortSet) -> Vec<u16> {
        match self.fallback.sweep(ip, set).await {
            Ok(ports) => ports,
            Err(e) => {
                warn!("connect scan failed for {ip}: {e}");
                Vec::new()
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use tokio::net::TcpListener;

    /// Drop a tiny shell script into the temp dir to stand in for the
    /// sweep helper binary.
    fn fake_helper(name: &str, body: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("trishula-helper-{name}-{}", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "#!/bin/sh\n{body}").unwrap();
        drop(file);
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn discoverer_with(helper: Option<HelperSweep>) -> PortDiscoverer {
        PortDiscoverer {
            helper,
            fallback: ConnectSweep::new(),
        }
    }

    #[tokio::test]
    async fn helper_output_drives_discovery() {
        let config = Arc::new(ScanConfig::default());
        let script = fake_helper("ok", r#"echo "10.0.0.1 -> [80,22]""#);
        let discoverer = discoverer_with(Some(HelperSweep::with_path(script.clone(), config)));

        let ports = discoverer
            .discover(Ipv4Addr::new(10, 0, 0, 1), &PortSet::explicit(vec![22, 80, 443]))
            .await;

        let numbers: Vec<u16> = ports.iter().map(|p| p.port).collect();
        assert_eq!(numbers, vec![22, 80]);
        assert!(ports.iter().all(|p| p.is_open()));
        std::fs::remove_file(script).ok();
    }

    #[tokio::test]
    async fn failing_helper_falls_back_to_connect_scan() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let _ = listener.accept().await;
            }
        });

        let config = Arc::new(ScanConfig::default());
        let script = fake_helper("fail", "exit 1");
        let discoverer = discoverer_with(Some(HelperSweep::with_path(script.clone(), config)));

        let ports = discoverer
            .discover(Ipv4Addr::LOCALHOST, &PortSet::explicit(vec![port]))
            .await;
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].port, port);
        std::fs::remove_file(script).ok();
    }

    #[tokio::test]
    async fn garbage_helper_output_falls_back() {
        let config = Arc::new(ScanConfig::default());
        let script = fake_helper("garbage", r#"echo "10.0.0.1 -> [what,is,this]""#);
        let discoverer = discoverer_with(Some(HelperSweep::with_path(script.clone(), config)));

        // fallback connect scan reports nothing for a closed port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let closed = listener.local_addr().unwrap().port();
        drop(listener);

        let ports = discoverer
            .discover(Ipv4Addr::LOCALHOST, &PortSet::explicit(vec![closed]))
            .await;
        assert!(ports.is_empty());
        std::fs::remove_file(script).ok();
    }
}
