//! Registration of verified inbound transactions as swap records

use crate::chain::BridgeSet;
use crate::error::BridgeResult;
use crate::state::{SwapRecord, SwapResult, SwapStore};
use crate::types::{SwapDirection, SwapIntent};

use std::sync::Arc;
use tracing::{info, warn};

/// Entry point for the acceptance layer that submits inbound transactions
pub struct SwapAcceptor {
    bridges: BridgeSet,
    store: Arc<dyn SwapStore>,
}

impl SwapAcceptor {
    pub fn new(bridges: BridgeSet, store: Arc<dyn SwapStore>) -> Self {
        Self { bridges, store }
    }

    /// Verify a stable inbound transaction and register it for settlement
    ///
    /// Returns false when the swap was registered before. A rejected
    /// verification stores nothing.
    pub async fn register_swap(&self, direction: SwapDirection, tx_id: &str) -> BridgeResult<bool> {
        let intent = match self
            .bridges
            .inbound(direction)
            .verify_transaction(tx_id, false)
            .await
        {
            Ok(intent) => intent,
            Err(e) if e.is_verify_rejection() => {
                info!("Rejected {} {}: {}", direction, tx_id, e);
                return Err(e);
            }
            Err(e) => {
                warn!("Could not verify {} {}: {}", direction, tx_id, e);
                return Err(e);
            }
        };

        self.store_intent(direction, &intent).await
    }

    /// Register a deposit made to the P2SH address derived from `bind`
    pub async fn register_p2sh_swapin(&self, tx_id: &str, bind: &str) -> BridgeResult<bool> {
        let intent = self
            .bridges
            .src
            .verify_p2sh_transaction(tx_id, bind, false)
            .await?;

        self.store_intent(SwapDirection::Swapin, &intent).await
    }

    async fn store_intent(&self, direction: SwapDirection, intent: &SwapIntent) -> BridgeResult<bool> {
        let record = SwapRecord::new(&intent.hash, direction, &intent.bind);
        let result = SwapResult::from_intent(direction, intent);

        let added = self.store.add_swap(&record, &result).await?;
        if added {
            info!(
                "Registered {} {} of {} for {}",
                direction, intent.hash, intent.value, intent.bind
            );
        }
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::electrs::MockUtxoClient;
    use crate::chain::provider::MockEvmClient;
    use crate::error::BridgeError;
    use crate::state::{MemorySwapStore, SwapStatus};
    use crate::testing;
    use chrono::Utc;

    const TXID: &str = "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";

    fn acceptor(client: MockUtxoClient, store: Arc<MemorySwapStore>) -> SwapAcceptor {
        let src = testing::btc_src_bridge(client);
        let dst = testing::eth_dst_bridge(MockEvmClient::new(), testing::btc_counterpart());
        SwapAcceptor::new(BridgeSet::new(Arc::new(src), Arc::new(dst)), store)
    }

    async fn pending(store: &MemorySwapStore) -> Vec<SwapRecord> {
        store
            .find_swaps_with_status(
                SwapDirection::Swapin,
                SwapStatus::NotSwapped,
                Utc::now() - chrono::Duration::hours(1),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_verified_deposit_registered_once() {
        let memo = format!("SWAPTO:{}", testing::BIND_ADDRESS);
        let tx = testing::electrs_tx(
            TXID,
            &testing::btc_address(2),
            vec![
                testing::p2pkh_output(&testing::btc_dcrm_address(), 150_000_000),
                testing::memo_output(&memo),
            ],
        );
        let store = Arc::new(MemorySwapStore::new());
        let acceptor = acceptor(testing::utxo_client_serving(tx), store.clone());

        assert!(acceptor.register_swap(SwapDirection::Swapin, TXID).await.unwrap());
        assert!(!acceptor.register_swap(SwapDirection::Swapin, TXID).await.unwrap());

        let records = pending(&store).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].bind, testing::BIND_ADDRESS);

        let result = store
            .find_swap_result(SwapDirection::Swapin, TXID)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.value, "150000000");
        assert_eq!(result.height, testing::BTC_DEPOSIT_HEIGHT);
    }

    #[tokio::test]
    async fn test_self_swap_creates_no_record() {
        let dcrm = testing::btc_dcrm_address();
        let memo = format!("SWAPTO:{}", testing::BIND_ADDRESS);
        let tx = testing::electrs_tx(
            TXID,
            &dcrm,
            vec![testing::p2pkh_output(&dcrm, 150_000_000), testing::memo_output(&memo)],
        );
        let store = Arc::new(MemorySwapStore::new());
        let acceptor = acceptor(testing::utxo_client_serving(tx), store.clone());

        let err = acceptor
            .register_swap(SwapDirection::Swapin, TXID)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::WrongSender { .. }));
        assert!(pending(&store).await.is_empty());
        assert!(store
            .find_swap_result(SwapDirection::Swapin, TXID)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_p2sh_deposit_registered_with_supplied_bind() {
        let (p2sh, _) = testing::btc_src_bridge(MockUtxoClient::new())
            .get_p2sh_address(testing::BIND_ADDRESS)
            .unwrap();
        let tx = testing::electrs_tx(
            TXID,
            &testing::btc_address(2),
            vec![testing::p2sh_output(&p2sh, 150_000_000)],
        );
        let store = Arc::new(MemorySwapStore::new());
        let acceptor = acceptor(testing::utxo_client_serving(tx), store.clone());

        assert!(acceptor
            .register_p2sh_swapin(TXID, testing::BIND_ADDRESS)
            .await
            .unwrap());

        let record = store
            .find_swap(SwapDirection::Swapin, TXID)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.bind, testing::BIND_ADDRESS);
        assert_eq!(record.status, SwapStatus::NotSwapped);
    }
}
