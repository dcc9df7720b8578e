//! The engine: owned scan state and the batch executor
//!
//! Everything that would otherwise be process-global (active scans, the
//! result cache) lives on an `Engine` value owned by the caller. The
//! configuration is fixed at construction; a caller wanting different
//! tunables builds another engine.

use crate::controller::{ScanLayer, SmartController};
use crate::progress::{ProgressEvent, ProgressSender};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tracing::info;
use trishula_common::{
    ScanConfig, ScanError, ScanRequest, ScanResponse, ScanResult, ScanStatus, ScanTarget,
};
use uuid::Uuid;

pub struct Engine {
    config: Arc<ScanConfig>,
    controller: Arc<SmartController>,
    progress: ProgressSender,
    active: Arc<Mutex<HashMap<Uuid, ScanTarget>>>,
    results: Mutex<HashMap<Uuid, ScanResult>>,
}

impl Engine {
    /// Validate the configuration and compile all rule tables. Both
    /// failure modes (`ConfigInvalid`, `RuleCompilation`) happen here or
    /// never.
    pub fn new(config: ScanConfig) -> Result<Self, ScanError> {
        config.validate()?;
        let config = Arc::new(config);
        let controller = Arc::new(SmartController::new(Arc::clone(&config))?);
        info!("engine ready (smart scan: {})", config.smart_scan_enabled);
        Ok(Self {
            config,
            controller,
            progress: ProgressSender::disabled(),
            active: Arc::new(Mutex::new(HashMap::new())),
            results: Mutex::new(HashMap::new()),
        })
    }

    /// Subscribe to progress events. Replaces any previous subscription.
    pub fn subscribe_progress(&mut self) -> mpsc::UnboundedReceiver<ProgressEvent> {
        let (sender, rx) = ProgressSender::channel();
        self.progress = sender;
        rx
    }

    #[must_use]
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scan one target through the requested layers.
    pub async fn scan(&self, target: ScanTarget, layers: &[ScanLayer]) -> ScanResult {
        let result = ScanResult::new(target);
        let scan_id = result.scan_id;
        self.active
            .lock()
            .await
            .insert(scan_id, result.target.clone());

        let result = self.controller.run(result, layers, &self.progress).await;

        self.active.lock().await.remove(&scan_id);
        self.results
            .lock()
            .await
            .insert(result.scan_id, result.clone());
        result
    }

    /// Scan many targets with at most `max_concurrent_targets` in flight.
    /// A target that fails (or panics) yields a failed result in its slot;
    /// the rest of the batch is unaffected.
    pub async fn batch_scan(&self, targets: Vec<ScanTarget>, layers: &[ScanLayer]) -> Vec<ScanResult> {
        info!("batch scan of {} targets", targets.len());
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_targets));
        let layers = layers.to_vec();

        let mut handles = Vec::with_capacity(targets.len());
        for target in &targets {
            let result = ScanResult::new(target.clone());
            let scan_id = result.scan_id;
            self.active.lock().await.insert(scan_id, target.clone());

            let semaphore = Arc::clone(&semaphore);
            let controller = Arc::clone(&self.controller);
            let progress = self.progress.clone();
            let layers = layers.clone();

            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                controller.run(result, &layers, &progress).await
            });
            handles.push((scan_id, handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        for ((scan_id, handle), target) in handles.into_iter().zip(targets) {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    let mut failed = ScanResult::new(target);
                    failed.mark_failed(format!("scan task aborted: {e}"));
                    failed
                }
            };
            self.active.lock().await.remove(&scan_id);
            results.push(result);
        }

        let mut cache = self.results.lock().await;
        for result in &results {
            cache.insert(result.scan_id, result.clone());
        }
        drop(cache);
        results
    }

    /// Serve a transport-shell request: validate its layer names up front,
    /// run the batch, and wrap the outcome.
    pub async fn execute(&self, request: ScanRequest) -> Result<ScanResponse, ScanError> {
        let layers: Vec<ScanLayer> = request
            .scan_layers
            .iter()
            .map(|s| ScanLayer::parse(s))
            .collect::<Result<_, _>>()?;

        let total_targets = request.targets.len();
        let results = self.batch_scan(request.targets, &layers).await;
        let completed_targets = results
            .iter()
            .filter(|r| r.status == ScanStatus::Completed)
            .count();

        let status = if completed_targets == total_targets {
            ScanStatus::Completed
        } else {
            ScanStatus::Failed
        };
        Ok(ScanResponse {
            scan_id: Uuid::new_v4(),
            status,
            message: format!("{completed_targets}/{total_targets} targets completed"),
            results,
            total_targets,
            completed_targets,
        })
    }

    /// Scans currently in flight.
    pub async fn active_scans(&self) -> Vec<(Uuid, ScanTarget)> {
        self.active
            .lock()
            .await
            .iter()
            .map(|(id, target)| (*id, target.clone()))
            .collect()
    }

    /// Look up a finished (or failed) scan by id.
    pub async fn result(&self, scan_id: Uuid) -> Option<ScanResult> {
        self.results.lock().await.get(&scan_id).cloned()
    }

    /// All results this engine has produced.
    pub async fn results(&self) -> Vec<ScanResult> {
        self.results.lock().await.values().cloned().collect()
    }
}
