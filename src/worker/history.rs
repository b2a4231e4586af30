//! Recent outbound transactions, consulted before building a new one

use crate::types::SwapDirection;

use std::collections::VecDeque;
use tokio::sync::RwLock;

pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub tx_id: String,
    pub value: String,
    pub match_tx: String,
    pub direction: SwapDirection,
}

/// Fixed-capacity FIFO of swaps that produced an outbound transaction
pub struct SwapHistory {
    capacity: usize,
    entries: RwLock<VecDeque<HistoryEntry>>,
}

impl SwapHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Append an entry, evicting the oldest when full
    pub async fn add(&self, entry: HistoryEntry) {
        let mut entries = self.entries.write().await;
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Most recent entry for a source transaction and direction
    pub async fn get(&self, tx_id: &str, direction: SwapDirection) -> Option<HistoryEntry> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .rev()
            .find(|e| e.tx_id == tx_id && e.direction == direction)
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl Default for SwapHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
