//! In-memory swap store for development runs and tests

use super::models::{MatchTx, SwapRecord, SwapResult, SwapStats, SwapStatus};
use super::SwapStore;
use crate::error::{BridgeError, BridgeResult};
use crate::types::{SwapDirection, SwapType};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

type SwapKey = (String, SwapDirection);

#[derive(Default)]
struct Tables {
    swaps: HashMap<SwapKey, SwapRecord>,
    results: HashMap<SwapKey, SwapResult>,
}

/// Swap store held in process memory
#[derive(Default)]
pub struct MemorySwapStore {
    tables: RwLock<Tables>,
}

impl MemorySwapStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn key(direction: SwapDirection, tx_id: &str) -> SwapKey {
    (tx_id.to_string(), direction)
}

fn missing(direction: SwapDirection, tx_id: &str) -> BridgeError {
    BridgeError::Internal(format!("no {} swap {}", direction, tx_id))
}

#[async_trait]
impl SwapStore for MemorySwapStore {
    async fn find_swaps_with_status(
        &self,
        direction: SwapDirection,
        status: SwapStatus,
        since: DateTime<Utc>,
    ) -> BridgeResult<Vec<SwapRecord>> {
        let tables = self.tables.read().await;
        let mut records: Vec<SwapRecord> = tables
            .swaps
            .values()
            .filter(|r| r.direction == direction && r.status == status && r.created_at >= since)
            .cloned()
            .collect();

        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.tx_id.cmp(&b.tx_id)));
        Ok(records)
    }

    async fn add_swap(&self, record: &SwapRecord, result: &SwapResult) -> BridgeResult<bool> {
        let mut tables = self.tables.write().await;
        let key = key(record.direction, &record.tx_id);
        if tables.swaps.contains_key(&key) {
            return Ok(false);
        }

        tables.swaps.insert(key.clone(), record.clone());
        tables.results.insert(key, result.clone());
        Ok(true)
    }

    async fn find_swap(&self, direction: SwapDirection, tx_id: &str) -> BridgeResult<Option<SwapRecord>> {
        let tables = self.tables.read().await;
        Ok(tables.swaps.get(&key(direction, tx_id)).cloned())
    }

    async fn update_swap_status(
        &self,
        direction: SwapDirection,
        tx_id: &str,
        status: SwapStatus,
        memo: &str,
    ) -> BridgeResult<()> {
        let mut tables = self.tables.write().await;
        let record = tables
            .swaps
            .get_mut(&key(direction, tx_id))
            .ok_or_else(|| missing(direction, tx_id))?;

        record.status = status;
        record.memo = memo.to_string();
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn find_swap_result(
        &self,
        direction: SwapDirection,
        tx_id: &str,
    ) -> BridgeResult<Option<SwapResult>> {
        let tables = self.tables.read().await;
        Ok(tables.results.get(&key(direction, tx_id)).cloned())
    }

    async fn update_swap_result(
        &self,
        direction: SwapDirection,
        tx_id: &str,
        match_tx: &MatchTx,
    ) -> BridgeResult<()> {
        let mut tables = self.tables.write().await;
        let result = tables
            .results
            .get_mut(&key(direction, tx_id))
            .ok_or_else(|| missing(direction, tx_id))?;

        result.swap_tx = match_tx.swap_tx.clone();
        result.swap_value = match_tx.swap_value.clone();
        result.swap_type = match_tx.swap_type.unwrap_or(SwapType::NoSwap);
        result.swap_height = match_tx.swap_height;
        result.swap_time = match_tx.swap_time;
        Ok(())
    }

    async fn update_swap_result_status(
        &self,
        direction: SwapDirection,
        tx_id: &str,
        status: SwapStatus,
        memo: &str,
    ) -> BridgeResult<()> {
        let mut tables = self.tables.write().await;
        let result = tables
            .results
            .get_mut(&key(direction, tx_id))
            .ok_or_else(|| missing(direction, tx_id))?;

        result.status = status;
        result.memo = memo.to_string();
        Ok(())
    }

    async fn swap_stats(&self) -> BridgeResult<SwapStats> {
        let tables = self.tables.read().await;
        let mut stats = SwapStats::default();
        for record in tables.swaps.values() {
            stats.count(record.status);
        }
        Ok(stats)
    }

    async fn health_check(&self) -> BridgeResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SwapIntent, SwapIntentExtra};
    use chrono::Duration;
    use ethers::types::U256;
    use tokio_test::{assert_err, assert_ok};

    fn registered(tx_id: &str, direction: SwapDirection) -> (SwapRecord, SwapResult) {
        let intent = SwapIntent {
            hash: tx_id.to_string(),
            from: "sender".to_string(),
            to: "custody".to_string(),
            bind: "0xbind".to_string(),
            value: U256::from(1_000u64),
            height: 10,
            timestamp: 1_600_000_000,
            extra: SwapIntentExtra::default(),
        };
        (
            SwapRecord::new(tx_id, direction, "0xbind"),
            SwapResult::from_intent(direction, &intent),
        )
    }

    #[tokio::test]
    async fn test_duplicate_registration_is_ignored() {
        let store = MemorySwapStore::new();
        let (record, result) = registered("tx1", SwapDirection::Swapin);

        assert!(assert_ok!(store.add_swap(&record, &result).await));
        assert!(!assert_ok!(store.add_swap(&record, &result).await));

        // The same id in the other direction is a different swap
        let (record, result) = registered("tx1", SwapDirection::Swapout);
        assert!(assert_ok!(store.add_swap(&record, &result).await));
        assert_ok!(store.health_check().await);
    }

    #[tokio::test]
    async fn test_scan_filters_and_orders() {
        let store = MemorySwapStore::new();
        let now = Utc::now();

        for (offset, tx_id) in [(3, "tx-new"), (1, "tx-old"), (2, "tx-mid")] {
            let (mut record, result) = registered(tx_id, SwapDirection::Swapin);
            record.created_at = now - Duration::minutes(10 - offset);
            store.add_swap(&record, &result).await.unwrap();
        }
        let (mut stale, result) = registered("tx-stale", SwapDirection::Swapin);
        stale.created_at = now - Duration::days(3);
        store.add_swap(&stale, &result).await.unwrap();

        store
            .update_swap_status(SwapDirection::Swapin, "tx-mid", SwapStatus::Processed, "")
            .await
            .unwrap();

        let found = store
            .find_swaps_with_status(SwapDirection::Swapin, SwapStatus::NotSwapped, now - Duration::days(1))
            .await
            .unwrap();
        let ids: Vec<&str> = found.iter().map(|r| r.tx_id.as_str()).collect();
        assert_eq!(ids, vec!["tx-old", "tx-new"]);

        let stats = store.swap_stats().await.unwrap();
        assert_eq!(stats.not_swapped, 3);
        assert_eq!(stats.processed, 1);
    }

    #[tokio::test]
    async fn test_match_is_recorded_on_result() {
        let store = MemorySwapStore::new();
        let (record, result) = registered("tx1", SwapDirection::Swapin);
        store.add_swap(&record, &result).await.unwrap();

        let match_tx = MatchTx::new("0xout", "1500", SwapType::Swapin);
        store
            .update_swap_result(SwapDirection::Swapin, "tx1", &match_tx)
            .await
            .unwrap();

        let result = store
            .find_swap_result(SwapDirection::Swapin, "tx1")
            .await
            .unwrap()
            .unwrap();
        assert!(result.has_match());
        assert_eq!(result.swap_type, SwapType::Swapin);
        assert_eq!(result.swap_value, "1500");
    }

    #[tokio::test]
    async fn test_updating_unknown_swap_fails() {
        let store = MemorySwapStore::new();
        let err = assert_err!(
            store
                .update_swap_status(SwapDirection::Swapin, "nope", SwapStatus::Processed, "")
                .await
        );
        assert!(matches!(err, BridgeError::Internal(_)));
    }
}
