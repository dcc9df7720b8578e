//! In-process TCP connect scan
//!
//! Fallback for when the sweep helper is absent or broken. A port counts as
//! open iff the connect succeeds within the deadline; refusals, resets, and
//! timeouts all collapse to "not reported".

use crate::ports::PortSet;
use crate::Sweeper;
use async_trait::async_trait;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::timeout;
use tracing::debug;
use trishula_common::ScanError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const MAX_IN_FLIGHT: usize = 50;

pub struct ConnectSweep {
    connect_timeout: Duration,
    max_in_flight: usize,
}

impl ConnectSweep {
    #[must_use]
    pub fn new() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
            max_in_flight: MAX_IN_FLIGHT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

impl Default for ConnectSweep {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sweeper for ConnectSweep {
    async fn sweep(&self, ip: Ipv4Addr, set: &PortSet) -> Result<Vec<u16>, ScanError> {
        let candidates = set.expand();
        debug!("connect scan of {ip}: {} candidates", candidates.len());

        let semaphore = Arc::new(Semaphore::new(self.max_in_flight));
        let (tx, mut rx) = mpsc::channel::<u16>(candidates.len().max(1));
        let connect_timeout = self.connect_timeout;

        for port in candidates {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| ScanError::Internal(e.to_string()))?;
            let tx = tx.clone();

            tokio::spawn(async move {
                let _permit = permit;
                if probe(ip, port, connect_timeout).await {
                    let _ = tx.send(port).await;
                }
            });
        }
        drop(tx);

        let mut open = Vec::new();
        while let Some(port) = rx.recv().await {
            open.push(port);
        }
        open.sort_unstable();
        open.dedup();
        Ok(open)
    }

    fn name(&self) -> &'static str {
        "connect-sweep"
    }
}

async fn probe(ip: Ipv4Addr, port: u16, deadline: Duration) -> bool {
    let addr = SocketAddr::from((ip, port));
    matches!(timeout(deadline, TcpStream::connect(addr)).await, Ok(Ok(_)))
}
