//! Direction-scoped polling loops over pending swaps

use super::swap::SwapWorker;
use crate::config::{BridgeConfig, MAX_SWAP_LIFETIME_SECS};
use crate::error::BridgeResult;
use crate::state::SwapStatus;
use crate::types::SwapDirection;

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Runs one loop per swap direction, each at most once per process
pub struct Scheduler {
    worker: Arc<SwapWorker>,
    poll_interval: Duration,
    lookback: chrono::Duration,
    swapin_started: AtomicBool,
    swapout_started: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl Scheduler {
    pub fn new(worker: Arc<SwapWorker>, config: &BridgeConfig) -> Self {
        Self::with_timing(
            worker,
            config.poll_interval(),
            chrono::Duration::seconds(config.max_swap_lifetime_secs.min(MAX_SWAP_LIFETIME_SECS) as i64),
        )
    }

    pub fn with_timing(worker: Arc<SwapWorker>, poll_interval: Duration, lookback: chrono::Duration) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            worker,
            poll_interval,
            lookback,
            swapin_started: AtomicBool::new(false),
            swapout_started: AtomicBool::new(false),
            shutdown,
        }
    }

    fn started_flag(&self, direction: SwapDirection) -> &AtomicBool {
        match direction {
            SwapDirection::Swapin => &self.swapin_started,
            SwapDirection::Swapout => &self.swapout_started,
        }
    }

    /// Start both loops, skipping any already running
    pub fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        SwapDirection::ALL
            .into_iter()
            .filter_map(|direction| self.start_direction(direction))
            .collect()
    }

    fn start_direction(self: &Arc<Self>, direction: SwapDirection) -> Option<JoinHandle<()>> {
        if self.started_flag(direction).swap(true, Ordering::SeqCst) {
            debug!("{} loop already started", direction);
            return None;
        }

        let scheduler = Arc::clone(self);
        Some(tokio::spawn(async move { scheduler.run(direction).await }))
    }

    async fn run(&self, direction: SwapDirection) {
        let mut shutdown = self.shutdown.subscribe();
        info!("{} loop started", direction);

        loop {
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = self.run_pass(direction).await {
                error!("{} pass failed: {}", direction, e);
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = shutdown.changed() => {}
            }
        }

        info!("{} loop stopped", direction);
    }

    /// Process every pending swap of a direction once, returning how many were settled
    pub async fn run_pass(&self, direction: SwapDirection) -> BridgeResult<usize> {
        let since = Utc::now() - self.lookback;
        let records = self
            .worker
            .store()
            .find_swaps_with_status(direction, SwapStatus::NotSwapped, since)
            .await?;

        let mut settled = 0;
        for record in &records {
            match self.worker.process_swap(direction, record).await {
                Ok(()) => settled += 1,
                Err(e) if e.should_alert() => {
                    error!("{} swap {} needs operator attention: {}", direction, record.tx_id, e)
                }
                Err(e) if e.is_retryable() => {
                    warn!("{} swap {} will be retried: {}", direction, record.tx_id, e)
                }
                Err(e) => warn!("{} swap {} failed: {}", direction, record.tx_id, e),
            }
        }

        if !records.is_empty() {
            debug!("{} pass settled {}/{} swaps", direction, settled, records.len());
        }
        Ok(settled)
    }

    /// Signal both loops to stop after their current pass
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }
}
