//! Gas price resolution for outbound transactions

use super::retry_rpc;
use crate::chain::EvmClient;
use crate::error::BridgeResult;

use ethers::types::U256;
use std::time::Duration;
use tracing::debug;

/// Gas price oracle with fixed retries
#[derive(Debug, Clone)]
pub struct GasEstimator {
    retry_count: u32,
    retry_interval: Duration,
}

impl GasEstimator {
    pub fn new(retry_count: u32, retry_interval: Duration) -> Self {
        Self {
            retry_count,
            retry_interval,
        }
    }

    /// Suggested gas price, retried on RPC failure
    pub async fn get_gas_price(&self, chain: &str, client: &dyn EvmClient) -> BridgeResult<U256> {
        let price = retry_rpc(self.retry_count, self.retry_interval, "gas price", || {
            client.suggest_gas_price()
        })
        .await?;

        debug!("Gas price for chain {}: {}", chain, price);
        Ok(price)
    }
}
