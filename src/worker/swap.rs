//! Settlement of one registered swap

use super::history::{HistoryEntry, SwapHistory};
use crate::chain::{BridgeSet, CrossChainBridge, SignedTx};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::metrics;
use crate::state::{MatchTx, SwapRecord, SwapStatus, SwapStore};
use crate::types::{BuildTxArgs, SwapDirection};

use ethers::types::U256;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Drives a swap record from `NotSwapped` to a recorded outbound transaction
pub struct SwapWorker {
    bridges: BridgeSet,
    store: Arc<dyn SwapStore>,
    history: Arc<SwapHistory>,
    retry_send_count: u32,
    retry_send_interval: Duration,
}

impl SwapWorker {
    pub fn new(
        bridges: BridgeSet,
        store: Arc<dyn SwapStore>,
        history: Arc<SwapHistory>,
        config: &BridgeConfig,
    ) -> Self {
        Self::with_retry(
            bridges,
            store,
            history,
            config.retry_send_tx_count,
            config.retry_send_tx_interval(),
        )
    }

    pub fn with_retry(
        bridges: BridgeSet,
        store: Arc<dyn SwapStore>,
        history: Arc<SwapHistory>,
        retry_send_count: u32,
        retry_send_interval: Duration,
    ) -> Self {
        Self {
            bridges,
            store,
            history,
            retry_send_count: retry_send_count.max(1),
            retry_send_interval,
        }
    }

    pub fn store(&self) -> &Arc<dyn SwapStore> {
        &self.store
    }

    /// Settle one swap record
    ///
    /// A failure before the match is recorded leaves the record `NotSwapped`
    /// for a later pass. Once a signed transaction is recorded the record is
    /// `Processed`, and only exhausted broadcast retries demote it to `SwapFailed`.
    pub async fn process_swap(&self, direction: SwapDirection, record: &SwapRecord) -> BridgeResult<()> {
        let tx_id = record.tx_id.as_str();
        let result = self
            .store
            .find_swap_result(direction, tx_id)
            .await?
            .ok_or_else(|| BridgeError::Internal(format!("no result for {} swap {}", direction, tx_id)))?;

        if result.has_match() {
            if record.status != SwapStatus::Processed {
                debug!("{} swap {} already matched by {}", direction, tx_id, result.swap_tx);
                self.mark_processed(direction, tx_id).await?;
            }
            return Ok(());
        }

        let outbound = self.bridges.outbound(direction);

        if let Some(entry) = self.history.get(tx_id, direction).await {
            if outbound.transaction_exists(&entry.match_tx).await? {
                info!(
                    "Adopting {} as match of {} swap {} from history",
                    entry.match_tx, direction, tx_id
                );
                let match_tx = MatchTx::new(&entry.match_tx, &entry.value, direction.swap_type());
                self.store.update_swap_result(direction, tx_id, &match_tx).await?;
                self.mark_processed(direction, tx_id).await?;
                return Ok(());
            }
        }

        let value = U256::from_dec_str(&result.value)
            .map_err(|_| BridgeError::MalformedValue(result.value.clone()))?;

        let mut args = BuildTxArgs::for_swap(tx_id, direction.swap_type(), &result.bind, value);
        let raw = outbound.build_raw_transaction(&mut args).await?;

        let signed = match outbound.sign_transaction(raw, &args).await {
            Ok(signed) => signed,
            Err(e) => {
                outbound.release_build(&args).await;
                return Err(e);
            }
        };

        // Recorded before broadcast: an ambiguous send failure must not lead to a second payout
        let swap_value = args.swap_value.unwrap_or(value).to_string();
        let match_tx = MatchTx::new(&signed.tx_hash, &swap_value, args.swap_type);
        if let Err(e) = self.store.update_swap_result(direction, tx_id, &match_tx).await {
            outbound.release_build(&args).await;
            return Err(e);
        }
        // The match is durable from here on, so the transaction must go out.
        // A later pass reconciles the status from the recorded match.
        if let Err(e) = self.mark_processed(direction, tx_id).await {
            warn!(
                "Failed to mark {} swap {} processed, broadcasting anyway: {}",
                direction, tx_id, e
            );
        }

        self.history
            .add(HistoryEntry {
                tx_id: tx_id.to_string(),
                value: swap_value,
                match_tx: signed.tx_hash.clone(),
                direction,
            })
            .await;

        info!(
            "{} swap {} matched by {} on {}",
            direction,
            tx_id,
            signed.tx_hash,
            outbound.name()
        );

        if let Err(e) = self.broadcast(outbound.as_ref(), &signed, tx_id).await {
            let reason = e.to_string();
            error!("Broadcast of {} for swap {} failed: {}", signed.tx_hash, tx_id, reason);
            self.store
                .update_swap_status(direction, tx_id, SwapStatus::SwapFailed, &reason)
                .await?;
            self.store
                .update_swap_result_status(direction, tx_id, SwapStatus::SwapFailed, &reason)
                .await?;
            metrics::record_swap(direction, SwapStatus::SwapFailed);
            return Err(e);
        }

        Ok(())
    }

    /// Send with fixed retries, stopping once the transaction is visible
    async fn broadcast(
        &self,
        outbound: &dyn CrossChainBridge,
        signed: &SignedTx,
        tx_id: &str,
    ) -> BridgeResult<()> {
        let mut last_error = None;

        for attempt in 1..=self.retry_send_count {
            match outbound.send_transaction(signed).await {
                Ok(hash) => {
                    debug!("Sent {} for swap {} (attempt {})", hash, tx_id, attempt);
                    last_error = None;
                }
                Err(e) => {
                    warn!(
                        "Send of {} for swap {} failed (attempt {}/{}): {}",
                        signed.tx_hash, tx_id, attempt, self.retry_send_count, e
                    );
                    last_error = Some(e);
                }
            }

            match outbound.transaction_exists(&signed.tx_hash).await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) => debug!("Visibility check of {} failed: {}", signed.tx_hash, e),
            }

            if attempt < self.retry_send_count {
                tokio::time::sleep(self.retry_send_interval).await;
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => {
                warn!("{} for swap {} sent but not yet visible", signed.tx_hash, tx_id);
                Ok(())
            }
        }
    }

    async fn mark_processed(&self, direction: SwapDirection, tx_id: &str) -> BridgeResult<()> {
        self.store
            .update_swap_status(direction, tx_id, SwapStatus::Processed, "")
            .await?;
        self.store
            .update_swap_result_status(direction, tx_id, SwapStatus::Processed, "")
            .await?;
        metrics::record_swap(direction, SwapStatus::Processed);
        Ok(())
    }

    /// Return a failed swap to `NotSwapped` so the scheduler picks it up again
    ///
    /// Refuses when the recorded outbound transaction is visible on chain; the
    /// swap is reconciled to `Processed` instead.
    pub async fn reset_failed_swap(&self, direction: SwapDirection, tx_id: &str) -> BridgeResult<()> {
        let record = self
            .store
            .find_swap(direction, tx_id)
            .await?
            .ok_or_else(|| BridgeError::UnknownSwap {
                tx_id: tx_id.to_string(),
            })?;

        if record.status != SwapStatus::SwapFailed {
            return Err(BridgeError::NotFailed {
                tx_id: tx_id.to_string(),
                status: record.status.to_string(),
            });
        }

        if let Some(result) = self.store.find_swap_result(direction, tx_id).await? {
            if result.has_match()
                && self
                    .bridges
                    .outbound(direction)
                    .transaction_exists(&result.swap_tx)
                    .await?
            {
                self.mark_processed(direction, tx_id).await?;
                return Err(BridgeError::AlreadySwapped {
                    tx_id: tx_id.to_string(),
                    swap_tx: result.swap_tx,
                });
            }
        }

        self.store
            .update_swap_result(direction, tx_id, &MatchTx::cleared())
            .await?;
        self.store
            .update_swap_result_status(direction, tx_id, SwapStatus::NotSwapped, "")
            .await?;
        self.store
            .update_swap_status(direction, tx_id, SwapStatus::NotSwapped, "")
            .await?;

        info!("Reset failed {} swap {}", direction, tx_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::electrs::MockUtxoClient;
    use crate::chain::provider::MockEvmClient;
    use crate::state::{MemorySwapStore, SwapResult};
    use crate::testing;
    use crate::tx::{MockSignService, SignStatusError};
    use crate::types::{SwapIntent, SwapIntentExtra, SwapType};
    use crate::chain::eth::abi;
    use crate::state::SwapStats;
    use crate::worker::SwapAcceptor;
    use alloy_sol_types::SolCall;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use ethers::types::transaction::eip2718::TypedTransaction;
    use ethers::types::{Bytes, Transaction, H256};
    use ethers::utils::{keccak256, rlp::Rlp};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    const BTC_TXID: &str = "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";

    fn swapin_intent(value: u64) -> SwapIntent {
        SwapIntent {
            hash: BTC_TXID.to_string(),
            from: testing::btc_address(2),
            to: testing::btc_dcrm_address(),
            bind: testing::BIND_ADDRESS.to_string(),
            value: U256::from(value),
            height: testing::BTC_DEPOSIT_HEIGHT,
            timestamp: 1_600_000_000,
            extra: SwapIntentExtra::default(),
        }
    }

    async fn store_with_swapin(result: SwapResult) -> Arc<MemorySwapStore> {
        let store = Arc::new(MemorySwapStore::new());
        let record = SwapRecord::new(&result.tx_id, SwapDirection::Swapin, &result.bind);
        store.add_swap(&record, &result).await.unwrap();
        store
    }

    /// Destination client that builds and accepts transactions
    fn dst_client(send_ok: bool, visible: bool) -> MockEvmClient {
        let mut client = MockEvmClient::new();
        client
            .expect_suggest_gas_price()
            .returning(|| Ok(U256::from(1_000_000_000u64)));
        client.expect_get_pool_nonce().returning(|_| Ok(0));
        client.expect_send_raw_transaction().returning(move |_| {
            if send_ok {
                Ok(H256::repeat_byte(0xaa))
            } else {
                Err(BridgeError::rpc("FSN", "connection refused"))
            }
        });
        client
            .expect_get_transaction_by_hash()
            .returning(move |_| Ok(visible.then(Transaction::default)));
        client
    }

    fn worker(dst: crate::chain::EthBridge, store: Arc<dyn SwapStore>, history: Arc<SwapHistory>) -> SwapWorker {
        let src = testing::btc_src_bridge(MockUtxoClient::new());
        SwapWorker::with_retry(
            BridgeSet::new(Arc::new(src), Arc::new(dst)),
            store,
            history,
            3,
            Duration::ZERO,
        )
    }

    async fn record(store: &MemorySwapStore) -> SwapRecord {
        store
            .find_swap(SwapDirection::Swapin, BTC_TXID)
            .await
            .unwrap()
            .unwrap()
    }

    async fn result(store: &MemorySwapStore) -> SwapResult {
        store
            .find_swap_result(SwapDirection::Swapin, BTC_TXID)
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_swapin_settled_and_recorded() {
        let store = store_with_swapin(SwapResult::from_intent(SwapDirection::Swapin, &swapin_intent(150_000_000))).await;
        let history = Arc::new(SwapHistory::default());
        let dst = testing::eth_dst_bridge(dst_client(true, true), testing::btc_counterpart());
        let worker = worker(dst, store.clone(), history.clone());

        worker
            .process_swap(SwapDirection::Swapin, &record(&store).await)
            .await
            .unwrap();

        let record = record(&store).await;
        let result = result(&store).await;
        assert_eq!(record.status, SwapStatus::Processed);
        assert_eq!(result.status, SwapStatus::Processed);
        assert!(result.swap_tx.starts_with("0x"));
        assert_eq!(result.swap_value, "1500000000000000000");
        assert_eq!(result.swap_type, SwapType::Swapin);

        let entry = history.get(BTC_TXID, SwapDirection::Swapin).await.unwrap();
        assert_eq!(entry.match_tx, result.swap_tx);
    }

    #[tokio::test]
    async fn test_second_pass_does_not_rebroadcast() {
        let store = store_with_swapin(SwapResult::from_intent(SwapDirection::Swapin, &swapin_intent(150_000_000))).await;
        let mut client = MockEvmClient::new();
        client
            .expect_suggest_gas_price()
            .times(1)
            .returning(|| Ok(U256::from(1_000_000_000u64)));
        client.expect_get_pool_nonce().times(1).returning(|_| Ok(0));
        client
            .expect_send_raw_transaction()
            .times(1)
            .returning(|_| Ok(H256::repeat_byte(0xaa)));
        client
            .expect_get_transaction_by_hash()
            .returning(|_| Ok(Some(Transaction::default())));
        let dst = testing::eth_dst_bridge(client, testing::btc_counterpart());
        let worker = worker(dst, store.clone(), Arc::new(SwapHistory::default()));

        // Both passes see the record as it was first read
        let stale = record(&store).await;
        worker.process_swap(SwapDirection::Swapin, &stale).await.unwrap();
        worker.process_swap(SwapDirection::Swapin, &stale).await.unwrap();

        assert_eq!(record(&store).await.status, SwapStatus::Processed);
    }

    #[tokio::test]
    async fn test_match_from_history_adopted_without_rebuilding() {
        let store = store_with_swapin(SwapResult::from_intent(SwapDirection::Swapin, &swapin_intent(150_000_000))).await;
        let history = Arc::new(SwapHistory::default());
        history
            .add(HistoryEntry {
                tx_id: BTC_TXID.to_string(),
                value: "1500000000000000000".to_string(),
                match_tx: format!("{:?}", H256::repeat_byte(0xbb)),
                direction: SwapDirection::Swapin,
            })
            .await;

        // Any build call would hit an unexpected mock method
        let mut client = MockEvmClient::new();
        client
            .expect_get_transaction_by_hash()
            .times(1)
            .returning(|_| Ok(Some(Transaction::default())));
        let dst = testing::eth_dst_bridge(client, testing::btc_counterpart());
        let worker = worker(dst, store.clone(), history);

        worker
            .process_swap(SwapDirection::Swapin, &record(&store).await)
            .await
            .unwrap();

        let result = result(&store).await;
        assert_eq!(result.swap_tx, format!("{:?}", H256::repeat_byte(0xbb)));
        assert_eq!(result.status, SwapStatus::Processed);
    }

    #[tokio::test]
    async fn test_malformed_value_leaves_swap_pending() {
        let mut result = SwapResult::from_intent(SwapDirection::Swapin, &swapin_intent(150_000_000));
        result.value = "1.5".to_string();
        let store = store_with_swapin(result).await;
        let dst = testing::eth_dst_bridge(MockEvmClient::new(), testing::btc_counterpart());
        let worker = worker(dst, store.clone(), Arc::new(SwapHistory::default()));

        let err = worker
            .process_swap(SwapDirection::Swapin, &record(&store).await)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::MalformedValue(_)));
        assert_eq!(record(&store).await.status, SwapStatus::NotSwapped);
    }

    #[tokio::test]
    async fn test_sign_failure_leaves_swap_pending() {
        let store = store_with_swapin(SwapResult::from_intent(SwapDirection::Swapin, &swapin_intent(150_000_000))).await;
        let mut client = MockEvmClient::new();
        client
            .expect_suggest_gas_price()
            .returning(|| Ok(U256::from(1_000_000_000u64)));
        client.expect_get_pool_nonce().returning(|_| Ok(0));

        let mut service = MockSignService::new();
        service
            .expect_submit_sign_request()
            .returning(|_, _| Ok("req".to_string()));
        service
            .expect_get_sign_status()
            .returning(|_| Err(SignStatusError::Failed("refused".to_string())));

        let dst = testing::eth_bridge_with_signer(
            client,
            false,
            true,
            testing::btc_counterpart(),
            Arc::new(service),
        );
        let worker = worker(dst, store.clone(), Arc::new(SwapHistory::default()));

        let err = worker
            .process_swap(SwapDirection::Swapin, &record(&store).await)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::SignFailed { .. }));
        assert_eq!(record(&store).await.status, SwapStatus::NotSwapped);
        assert!(!result(&store).await.has_match());
    }

    #[tokio::test]
    async fn test_broadcast_failure_demotes_and_reset_redrives() {
        let store = store_with_swapin(SwapResult::from_intent(SwapDirection::Swapin, &swapin_intent(150_000_000))).await;
        let dst = testing::eth_dst_bridge(dst_client(false, false), testing::btc_counterpart());
        let worker = worker(dst, store.clone(), Arc::new(SwapHistory::default()));

        let err = worker
            .process_swap(SwapDirection::Swapin, &record(&store).await)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Rpc { .. }));

        let failed = record(&store).await;
        assert_eq!(failed.status, SwapStatus::SwapFailed);
        assert!(failed.memo.contains("connection refused"));
        let failed_result = result(&store).await;
        assert_eq!(failed_result.status, SwapStatus::SwapFailed);
        assert!(failed_result.has_match());

        let since = Utc::now() - chrono::Duration::days(1);
        let pending = store
            .find_swaps_with_status(SwapDirection::Swapin, SwapStatus::NotSwapped, since)
            .await
            .unwrap();
        assert!(pending.is_empty());

        worker
            .reset_failed_swap(SwapDirection::Swapin, BTC_TXID)
            .await
            .unwrap();
        let pending = store
            .find_swaps_with_status(SwapDirection::Swapin, SwapStatus::NotSwapped, since)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert!(!result(&store).await.has_match());

        let err = worker
            .reset_failed_swap(SwapDirection::Swapin, BTC_TXID)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::NotFailed { .. }));
    }

    #[tokio::test]
    async fn test_reset_of_visible_match_reconciles() {
        let mut result = SwapResult::from_intent(SwapDirection::Swapin, &swapin_intent(150_000_000));
        result.swap_tx = format!("{:?}", H256::repeat_byte(0xcc));
        result.status = SwapStatus::SwapFailed;
        let store = store_with_swapin(result).await;
        store
            .update_swap_status(SwapDirection::Swapin, BTC_TXID, SwapStatus::SwapFailed, "timeout")
            .await
            .unwrap();

        let mut client = MockEvmClient::new();
        client
            .expect_get_transaction_by_hash()
            .returning(|_| Ok(Some(Transaction::default())));
        let dst = testing::eth_dst_bridge(client, testing::btc_counterpart());
        let worker = worker(dst, store.clone(), Arc::new(SwapHistory::default()));

        let err = worker
            .reset_failed_swap(SwapDirection::Swapin, BTC_TXID)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::AlreadySwapped { .. }));
        assert_eq!(record(&store).await.status, SwapStatus::Processed);
    }

    /// Memory store whose next few writes of a kind fail
    struct FlakyStore {
        inner: MemorySwapStore,
        failing_result_writes: AtomicU32,
        failing_processed_writes: AtomicU32,
    }

    impl FlakyStore {
        fn new(failing_result_writes: u32, failing_processed_writes: u32) -> Self {
            Self {
                inner: MemorySwapStore::new(),
                failing_result_writes: AtomicU32::new(failing_result_writes),
                failing_processed_writes: AtomicU32::new(failing_processed_writes),
            }
        }

        fn take_failure(counter: &AtomicU32) -> bool {
            counter
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    #[async_trait]
    impl SwapStore for FlakyStore {
        async fn find_swaps_with_status(
            &self,
            direction: SwapDirection,
            status: SwapStatus,
            since: DateTime<Utc>,
        ) -> BridgeResult<Vec<SwapRecord>> {
            self.inner.find_swaps_with_status(direction, status, since).await
        }

        async fn add_swap(&self, record: &SwapRecord, result: &SwapResult) -> BridgeResult<bool> {
            self.inner.add_swap(record, result).await
        }

        async fn find_swap(&self, direction: SwapDirection, tx_id: &str) -> BridgeResult<Option<SwapRecord>> {
            self.inner.find_swap(direction, tx_id).await
        }

        async fn update_swap_status(
            &self,
            direction: SwapDirection,
            tx_id: &str,
            status: SwapStatus,
            memo: &str,
        ) -> BridgeResult<()> {
            if status == SwapStatus::Processed && Self::take_failure(&self.failing_processed_writes) {
                return Err(BridgeError::Internal("store unavailable".to_string()));
            }
            self.inner.update_swap_status(direction, tx_id, status, memo).await
        }

        async fn find_swap_result(
            &self,
            direction: SwapDirection,
            tx_id: &str,
        ) -> BridgeResult<Option<SwapResult>> {
            self.inner.find_swap_result(direction, tx_id).await
        }

        async fn update_swap_result(
            &self,
            direction: SwapDirection,
            tx_id: &str,
            match_tx: &MatchTx,
        ) -> BridgeResult<()> {
            if Self::take_failure(&self.failing_result_writes) {
                return Err(BridgeError::Internal("store unavailable".to_string()));
            }
            self.inner.update_swap_result(direction, tx_id, match_tx).await
        }

        async fn update_swap_result_status(
            &self,
            direction: SwapDirection,
            tx_id: &str,
            status: SwapStatus,
            memo: &str,
        ) -> BridgeResult<()> {
            self.inner
                .update_swap_result_status(direction, tx_id, status, memo)
                .await
        }

        async fn swap_stats(&self) -> BridgeResult<SwapStats> {
            self.inner.swap_stats().await
        }

        async fn health_check(&self) -> BridgeResult<()> {
            self.inner.health_check().await
        }
    }

    async fn flaky_store_with_swapin(failing_result_writes: u32, failing_processed_writes: u32) -> Arc<FlakyStore> {
        let store = Arc::new(FlakyStore::new(failing_result_writes, failing_processed_writes));
        let result = SwapResult::from_intent(SwapDirection::Swapin, &swapin_intent(150_000_000));
        let record = SwapRecord::new(&result.tx_id, SwapDirection::Swapin, &result.bind);
        store.add_swap(&record, &result).await.unwrap();
        store
    }

    /// Destination client that keeps every raw transaction it is sent
    fn recording_client(sent: Arc<Mutex<Vec<Bytes>>>) -> MockEvmClient {
        let mut client = MockEvmClient::new();
        client
            .expect_suggest_gas_price()
            .returning(|| Ok(U256::from(1_000_000_000u64)));
        client.expect_get_pool_nonce().returning(|_| Ok(0));
        client.expect_send_raw_transaction().returning(move |raw| {
            sent.lock().unwrap().push(raw);
            Ok(H256::repeat_byte(0xaa))
        });
        client
            .expect_get_transaction_by_hash()
            .returning(|_| Ok(Some(Transaction::default())));
        client
    }

    #[tokio::test]
    async fn test_failed_match_write_releases_nonce() {
        let store = flaky_store_with_swapin(1, 0).await;
        let sent = Arc::new(Mutex::new(Vec::new()));
        let dst = testing::eth_dst_bridge(recording_client(sent.clone()), testing::btc_counterpart());
        let worker = worker(dst, store.clone(), Arc::new(SwapHistory::default()));

        let err = worker
            .process_swap(SwapDirection::Swapin, &record(&store.inner).await)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Internal(_)));
        assert!(sent.lock().unwrap().is_empty());
        assert_eq!(record(&store.inner).await.status, SwapStatus::NotSwapped);
        assert!(!result(&store.inner).await.has_match());

        worker
            .process_swap(SwapDirection::Swapin, &record(&store.inner).await)
            .await
            .unwrap();

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let (tx, _) = TypedTransaction::decode_signed(&Rlp::new(&sent[0])).unwrap();
        assert_eq!(tx.nonce(), Some(&U256::zero()));
        assert_eq!(record(&store.inner).await.status, SwapStatus::Processed);
    }

    #[tokio::test]
    async fn test_failed_status_write_still_broadcasts() {
        let store = flaky_store_with_swapin(0, 1).await;
        let sent = Arc::new(Mutex::new(Vec::new()));
        let dst = testing::eth_dst_bridge(recording_client(sent.clone()), testing::btc_counterpart());
        let worker = worker(dst, store.clone(), Arc::new(SwapHistory::default()));

        worker
            .process_swap(SwapDirection::Swapin, &record(&store.inner).await)
            .await
            .unwrap();
        assert_eq!(sent.lock().unwrap().len(), 1);
        assert_eq!(record(&store.inner).await.status, SwapStatus::NotSwapped);
        let matched = result(&store.inner).await;
        assert_eq!(matched.swap_tx, format!("{:?}", H256::from(keccak256(&sent.lock().unwrap()[0]))));

        // Next pass settles the status from the recorded match
        worker
            .process_swap(SwapDirection::Swapin, &record(&store.inner).await)
            .await
            .unwrap();
        assert_eq!(sent.lock().unwrap().len(), 1);
        assert_eq!(record(&store.inner).await.status, SwapStatus::Processed);
        assert_eq!(result(&store.inner).await.status, SwapStatus::Processed);
    }

    #[tokio::test]
    async fn test_registered_deposit_minted_to_bind() {
        let memo = format!("SWAPTO:{}", testing::BIND_ADDRESS);
        let deposit = testing::electrs_tx(
            BTC_TXID,
            &testing::btc_address(2),
            vec![
                testing::p2pkh_output(&testing::btc_dcrm_address(), 150_000_000),
                testing::memo_output(&memo),
            ],
        );
        let sent = Arc::new(Mutex::new(Vec::new()));
        let src = testing::btc_src_bridge(testing::utxo_client_serving(deposit));
        let dst = testing::eth_dst_bridge(recording_client(sent.clone()), testing::btc_counterpart());
        let bridges = BridgeSet::new(Arc::new(src), Arc::new(dst));
        let store = Arc::new(MemorySwapStore::new());

        let acceptor = SwapAcceptor::new(bridges.clone(), store.clone());
        assert!(acceptor
            .register_swap(SwapDirection::Swapin, BTC_TXID)
            .await
            .unwrap());

        let worker = SwapWorker::with_retry(
            bridges,
            store.clone(),
            Arc::new(SwapHistory::default()),
            3,
            Duration::ZERO,
        );
        worker
            .process_swap(SwapDirection::Swapin, &record(&store).await)
            .await
            .unwrap();

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let (tx, signature) = TypedTransaction::decode_signed(&Rlp::new(&sent[0])).unwrap();
        assert_eq!(signature.recover(tx.sighash()).unwrap(), testing::dcrm_evm_address());
        assert_eq!(tx.to_addr(), Some(&testing::mapping_contract()));

        let call = abi::SwapinCall::abi_decode(tx.data().unwrap(), true).unwrap();
        assert_eq!(hex::encode(call.txhash), BTC_TXID);
        assert_eq!(
            format!("{:?}", abi::from_alloy_address(call.account)),
            testing::BIND_ADDRESS
        );
        assert_eq!(
            abi::from_alloy_u256(call.amount),
            U256::from(15u64) * U256::exp10(17)
        );

        let result = result(&store).await;
        assert_eq!(result.swap_tx, format!("{:?}", H256::from(keccak256(&sent[0]))));
        assert_eq!(record(&store).await.status, SwapStatus::Processed);
    }
}
