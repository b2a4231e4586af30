//! Swap persistence
//!
//! Handles:
//! - Swap records scanned by the worker
//! - Verified results and their matched outbound transactions
//! - Status counts for the status API
//!
//! Every write touches a single record and is atomic on its own.

mod manager;
mod memory;
pub mod models;

pub use manager::PgSwapStore;
pub use memory::MemorySwapStore;
pub use models::{MatchTx, SwapRecord, SwapResult, SwapStats, SwapStatus};

use crate::error::BridgeResult;
use crate::types::SwapDirection;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Store of swap records and results, keyed by (tx id, direction)
#[async_trait]
pub trait SwapStore: Send + Sync {
    /// Records of a direction with `status` created at or after `since`, oldest first
    async fn find_swaps_with_status(
        &self,
        direction: SwapDirection,
        status: SwapStatus,
        since: DateTime<Utc>,
    ) -> BridgeResult<Vec<SwapRecord>>;

    /// Insert a record and its result, returning false when the swap is already registered
    async fn add_swap(&self, record: &SwapRecord, result: &SwapResult) -> BridgeResult<bool>;

    async fn find_swap(&self, direction: SwapDirection, tx_id: &str) -> BridgeResult<Option<SwapRecord>>;

    async fn update_swap_status(
        &self,
        direction: SwapDirection,
        tx_id: &str,
        status: SwapStatus,
        memo: &str,
    ) -> BridgeResult<()>;

    async fn find_swap_result(
        &self,
        direction: SwapDirection,
        tx_id: &str,
    ) -> BridgeResult<Option<SwapResult>>;

    /// Record the outbound transaction matched to a swap
    async fn update_swap_result(
        &self,
        direction: SwapDirection,
        tx_id: &str,
        match_tx: &MatchTx,
    ) -> BridgeResult<()>;

    async fn update_swap_result_status(
        &self,
        direction: SwapDirection,
        tx_id: &str,
        status: SwapStatus,
        memo: &str,
    ) -> BridgeResult<()>;

    async fn swap_stats(&self) -> BridgeResult<SwapStats>;

    async fn health_check(&self) -> BridgeResult<()>;
}
