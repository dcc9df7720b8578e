//! Progress events
//!
//! Coarse-grained, fire-and-forget notifications. Losing an event (or having
//! no subscriber at all) never affects scan correctness.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::Ipv4Addr;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub scan_id: Uuid,
    pub target: String,
    pub stage: String,
    pub percent: f32,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Emitting half of the progress stream. Cloneable; a disabled sender
/// swallows everything.
#[derive(Clone)]
pub struct ProgressSender {
    inner: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressSender {
    #[must_use]
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { inner: Some(tx) }, rx)
    }

    pub fn emit(&self, scan_id: Uuid, target: Ipv4Addr, stage: &str, percent: f32, message: String) {
        let Some(tx) = &self.inner else {
            return;
        };
        let _ = tx.send(ProgressEvent {
            scan_id,
            target: target.to_string(),
            stage: stage.to_string(),
            percent,
            message,
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_sender_swallows_events() {
        let sender = ProgressSender::disabled();
        sender.emit(Uuid::new_v4(), Ipv4Addr::LOCALHOST, "stage", 50.0, "msg".into());
    }

    #[tokio::test]
    async fn channel_delivers_in_order() {
        let (sender, mut rx) = ProgressSender::channel();
        let id = Uuid::new_v4();
        sender.emit(id, Ipv4Addr::LOCALHOST, "preset_scan", 0.0, "start".into());
        sender.emit(id, Ipv4Addr::LOCALHOST, "preset_scan", 30.0, "done".into());
        drop(sender);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.percent, 0.0);
        assert_eq!(first.stage, "preset_scan");
        let second = rx.recv().await.unwrap();
        assert_eq!(second.percent, 30.0);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn dropped_receiver_does_not_block_emitters() {
        let (sender, rx) = ProgressSender::channel();
        drop(rx);
        sender.emit(Uuid::new_v4(), Ipv4Addr::LOCALHOST, "stage", 10.0, "msg".into());
    }
}
