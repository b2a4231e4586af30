//! Nonce allocation for the custodied account
//!
//! The node's pending pool lags behind rapid sequential submissions, so the
//! reported nonce is reconciled with a local counter per (chain, direction).

use crate::types::SwapDirection;

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Counter key: one counter per outbound chain and swap direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NonceKey {
    pub chain_id: u64,
    pub direction: SwapDirection,
}

impl NonceKey {
    pub fn new(chain_id: u64, direction: SwapDirection) -> Self {
        Self {
            chain_id,
            direction,
        }
    }
}

#[derive(Debug, Default)]
struct NonceState {
    /// Last nonce handed out, `None` until the first allocation
    last: Option<u64>,
}

/// Allocates strictly increasing nonces per key
#[derive(Default)]
pub struct NonceAllocator {
    counters: DashMap<NonceKey, Arc<Mutex<NonceState>>>,
}

impl NonceAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self, key: NonceKey) -> Arc<Mutex<NonceState>> {
        self.counters
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(NonceState::default())))
            .clone()
    }

    /// Next nonce given the pool nonce the node reports
    ///
    /// A counter at or above the reported value advances by one; otherwise the
    /// reported value is adopted.
    pub async fn allocate(&self, key: NonceKey, reported: u64) -> u64 {
        let state = self.state(key);
        let mut state = state.lock().await;

        let nonce = match state.last {
            Some(last) if last >= reported => last + 1,
            _ => reported,
        };
        state.last = Some(nonce);

        debug!(
            "Allocated nonce {} on chain {} for {} (pool reported {})",
            nonce, key.chain_id, key.direction, reported
        );
        nonce
    }

    /// Roll back a nonce whose transaction never left the process
    pub async fn release(&self, key: NonceKey, nonce: u64) {
        let state = self.state(key);
        let mut state = state.lock().await;

        // Only the most recent allocation can be handed back
        if state.last == Some(nonce) {
            state.last = nonce.checked_sub(1);
            debug!(
                "Released nonce {} on chain {} for {}",
                nonce, key.chain_id, key.direction
            );
        }
    }

    /// Last nonce handed out for a key
    pub async fn last_allocated(&self, key: NonceKey) -> Option<u64> {
        let state = self.counters.get(&key).map(|s| s.clone())?;
        let state = state.lock().await;
        state.last
    }
}
