//! Banner capture for open ports
//!
//! Passive read first; if the service stays silent and the port is a common
//! HTTP port, a plain GET nudge is sent. Either way the port is reported:
//! a failed grab falls back to a port-table-only classification.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::timeout;
use tracing::{debug, warn};
use trishula_common::config::HTTP_NUDGE_PORTS;
use trishula_common::{PortInfo, ScanConfig};
use trishula_fingerprint::classify;

const PASSIVE_READ_TIMEOUT: Duration = Duration::from_secs(2);
const NUDGE_READ_TIMEOUT: Duration = Duration::from_secs(3);
const MAX_IN_FLIGHT: usize = 20;

pub struct BannerGrabber {
    config: Arc<ScanConfig>,
}

impl BannerGrabber {
    #[must_use]
    pub fn new(config: Arc<ScanConfig>) -> Self {
        Self { config }
    }

    /// Enrich every open port with a banner and service label. Ports are
    /// returned in completion order; the caller sorts at the layer boundary.
    pub async fn grab_all(&self, ip: Ipv4Addr, ports: &[u16]) -> Vec<PortInfo> {
        let semaphore = Arc::new(Semaphore::new(MAX_IN_FLIGHT));
        let (tx, mut rx) = mpsc::channel::<PortInfo>(ports.len().max(1));

        for &port in ports {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let tx = tx.clone();
            let config = Arc::clone(&self.config);

            tokio::spawn(async move {
                let _permit = permit;
                let info = grab_one(ip, port, &config).await;
                let _ = tx.send(info).await;
            });
        }
        drop(tx);

        let mut infos = Vec::with_capacity(ports.len());
        while let Some(info) = rx.recv().await {
            infos.push(info);
        }
        infos
    }
}

async fn grab_one(ip: Ipv4Addr, port: u16, config: &ScanConfig) -> PortInfo {
    let banner = read_banner(ip, port, config).await;

    let mut info = PortInfo::open(port);
    match classify(port, banner.as_deref()) {
        Some(guess) => {
            if let Some(threat) = guess.threat {
                warn!("{ip}:{port} flagged as {} ({threat})", guess.service);
            }
            info = info.with_service(guess.service).with_confidence(guess.confidence);
            if let Some(version) = guess.version {
                info = info.with_version(version);
            }
        }
        None => debug!("{ip}:{port} unclassified"),
    }
    if let Some(banner) = banner {
        info = info.with_banner(banner);
    }
    info
}

/// Connect and read whatever the service volunteers; nudge HTTP ports that
/// stay silent. Returns `None` when nothing readable came back.
async fn read_banner(ip: Ipv4Addr, port: u16, config: &ScanConfig) -> Option<String> {
    let addr = SocketAddr::from((ip, port));
    let mut stream = timeout(config.banner_timeout(), TcpStream::connect(addr))
        .await
        .ok()?
        .ok()?;

    let mut buf = vec![0u8; config.banner_max_bytes];

    if let Ok(Ok(n)) = timeout(PASSIVE_READ_TIMEOUT, stream.read(&mut buf)).await {
        if n > 0 {
            return decode_banner(&buf[..n], config.banner_max_bytes);
        }
    }

    if HTTP_NUDGE_PORTS.contains(&port) {
        let request = format!("GET / HTTP/1.1\r\nHost: {ip}\r\n\r\n");
        if stream.write_all(request.as_bytes()).await.is_err() {
            return None;
        }
        if let Ok(Ok(n)) = timeout(NUDGE_READ_TIMEOUT, stream.read(&mut buf)).await {
            if n > 0 {
                return decode_banner(&buf[..n], config.banner_max_bytes);
            }
        }
    }

    None
}

/// Lossy UTF-8 decode, trimmed and capped at the configured byte budget.
fn decode_banner(bytes: &[u8], max_bytes: usize) -> Option<String> {
    let mut banner = String::from_utf8_lossy(bytes).trim().to_string();
    if banner.is_empty() {
        return None;
    }
    if banner.len() > max_bytes {
        let mut cut = max_bytes;
        while !banner.is_char_boundary(cut) {
            cut -= 1;
        }
        banner.truncate(cut);
    }
    Some(banner)
}
