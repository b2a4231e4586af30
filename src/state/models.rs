//! Persisted swap records

use crate::types::{SwapDirection, SwapIntent, SwapType};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Processing status shared by a swap record and its result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapStatus {
    NotSwapped,
    /// A non-empty match transaction is recorded
    Processed,
    /// Broadcast exhausted its retries; only an explicit reset re-drives it
    SwapFailed,
}

impl SwapStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwapStatus::NotSwapped => "not_swapped",
            SwapStatus::Processed => "processed",
            SwapStatus::SwapFailed => "swap_failed",
        }
    }
}

impl fmt::Display for SwapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SwapStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_swapped" => Ok(SwapStatus::NotSwapped),
            "processed" => Ok(SwapStatus::Processed),
            "swap_failed" => Ok(SwapStatus::SwapFailed),
            other => Err(format!("unknown swap status: {}", other)),
        }
    }
}

/// A registered inbound transaction awaiting or past settlement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapRecord {
    pub tx_id: String,
    pub direction: SwapDirection,
    pub bind: String,
    pub status: SwapStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Last error, if any
    pub memo: String,
}

impl SwapRecord {
    pub fn new(tx_id: impl Into<String>, direction: SwapDirection, bind: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            tx_id: tx_id.into(),
            direction,
            bind: bind.into(),
            status: SwapStatus::NotSwapped,
            created_at: now,
            updated_at: now,
            memo: String::new(),
        }
    }
}

/// Verified inbound transaction and the outbound transaction matched to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapResult {
    pub tx_id: String,
    pub direction: SwapDirection,
    pub from: String,
    pub to: String,
    pub bind: String,
    /// Decimal string in the inbound chain's smallest unit
    pub value: String,
    pub height: u64,
    pub timestamp: u64,
    pub swap_tx: String,
    pub swap_value: String,
    pub swap_type: SwapType,
    pub swap_height: u64,
    pub swap_time: u64,
    pub status: SwapStatus,
    pub memo: String,
}

impl SwapResult {
    pub fn from_intent(direction: SwapDirection, intent: &SwapIntent) -> Self {
        Self {
            tx_id: intent.hash.clone(),
            direction,
            from: intent.from.clone(),
            to: intent.to.clone(),
            bind: intent.bind.clone(),
            value: intent.value.to_string(),
            height: intent.height,
            timestamp: intent.timestamp,
            swap_tx: String::new(),
            swap_value: String::new(),
            swap_type: SwapType::NoSwap,
            swap_height: 0,
            swap_time: 0,
            status: SwapStatus::NotSwapped,
            memo: String::new(),
        }
    }

    pub fn has_match(&self) -> bool {
        !self.swap_tx.is_empty()
    }
}

/// Outbound transaction recorded against a swap
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchTx {
    pub swap_tx: String,
    pub swap_value: String,
    pub swap_type: Option<SwapType>,
    pub swap_height: u64,
    pub swap_time: u64,
}

impl MatchTx {
    pub fn new(swap_tx: impl Into<String>, swap_value: impl Into<String>, swap_type: SwapType) -> Self {
        Self {
            swap_tx: swap_tx.into(),
            swap_value: swap_value.into(),
            swap_type: Some(swap_type),
            swap_height: 0,
            swap_time: 0,
        }
    }

    /// Match cleared by a failed-swap reset
    pub fn cleared() -> Self {
        Self::default()
    }
}

/// Swap counts by status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SwapStats {
    pub not_swapped: u64,
    pub processed: u64,
    pub swap_failed: u64,
}

impl SwapStats {
    pub fn count(&mut self, status: SwapStatus) {
        match status {
            SwapStatus::NotSwapped => self.not_swapped += 1,
            SwapStatus::Processed => self.processed += 1,
            SwapStatus::SwapFailed => self.swap_failed += 1,
        }
    }
}
