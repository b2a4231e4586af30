//! Account-model chain access with multi-RPC support and automatic failover

use crate::config::ChainConfig;
use crate::error::{BridgeError, BridgeResult};

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Node operations the bridge needs from an account-model chain
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EvmClient: Send + Sync {
    async fn get_transaction_by_hash(&self, hash: H256) -> BridgeResult<Option<Transaction>>;

    async fn get_transaction_receipt(&self, hash: H256)
        -> BridgeResult<Option<TransactionReceipt>>;

    async fn get_block_number(&self) -> BridgeResult<u64>;

    /// Timestamp of a block, zero if the node does not know it
    async fn get_block_timestamp(&self, number: u64) -> BridgeResult<u64>;

    /// Nonce including transactions still in the pending pool
    async fn get_pool_nonce(&self, address: Address) -> BridgeResult<u64>;

    async fn suggest_gas_price(&self) -> BridgeResult<U256>;

    async fn send_raw_transaction(&self, raw: Bytes) -> BridgeResult<H256>;

    async fn get_code(&self, address: Address) -> BridgeResult<Bytes>;

    /// `eth_call` against the latest block
    async fn call_contract(&self, to: Address, data: Bytes) -> BridgeResult<Bytes>;
}

/// Multi-provider wrapper with automatic failover
pub struct ChainProvider {
    /// Chain name used in logs and errors
    name: String,
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
}

impl ChainProvider {
    /// Create a new chain provider
    pub fn new(config: &ChainConfig) -> BridgeResult<Self> {
        let mut http_providers = Vec::new();

        for url in &config.rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    let provider = provider.interval(Duration::from_millis(100));
                    http_providers.push(provider);
                    debug!("Added HTTP provider for chain {}: {}", config.name, url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(BridgeError::rpc(&config.name, "No valid RPC providers"));
        }

        Ok(Self {
            name: config.name.clone(),
            http_providers,
            current_provider: AtomicUsize::new(0),
        })
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    pub fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("Chain {} failover to provider {}", self.name, next);
    }

    fn rpc_error(&self, err: impl std::fmt::Display) -> BridgeError {
        BridgeError::rpc(&self.name, err)
    }
}

#[async_trait]
impl EvmClient for ChainProvider {
    async fn get_transaction_by_hash(&self, hash: H256) -> BridgeResult<Option<Transaction>> {
        for _ in 0..self.http_providers.len() {
            match self.http().get_transaction(hash).await {
                Ok(tx) => return Ok(tx),
                Err(e) => {
                    warn!("Failed to get transaction {:?} from {}: {}", hash, self.name, e);
                    self.failover();
                }
            }
        }

        Err(self.rpc_error("All providers failed to get transaction"))
    }

    async fn get_transaction_receipt(
        &self,
        hash: H256,
    ) -> BridgeResult<Option<TransactionReceipt>> {
        self.http()
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| self.rpc_error(e))
    }

    async fn get_block_number(&self) -> BridgeResult<u64> {
        for _ in 0..self.http_providers.len() {
            match self.http().get_block_number().await {
                Ok(block) => return Ok(block.as_u64()),
                Err(e) => {
                    warn!("Failed to get block number from chain {}: {}", self.name, e);
                    self.failover();
                }
            }
        }

        Err(self.rpc_error("All providers failed"))
    }

    async fn get_block_timestamp(&self, number: u64) -> BridgeResult<u64> {
        let block = self
            .http()
            .get_block(number)
            .await
            .map_err(|e| self.rpc_error(e))?;

        Ok(block.map(|b| b.timestamp.as_u64()).unwrap_or_default())
    }

    async fn get_pool_nonce(&self, address: Address) -> BridgeResult<u64> {
        let nonce = self
            .http()
            .get_transaction_count(address, Some(BlockNumber::Pending.into()))
            .await
            .map_err(|e| self.rpc_error(e))?;

        Ok(nonce.as_u64())
    }

    async fn suggest_gas_price(&self) -> BridgeResult<U256> {
        self.http()
            .get_gas_price()
            .await
            .map_err(|e| self.rpc_error(e))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> BridgeResult<H256> {
        let pending = self
            .http()
            .send_raw_transaction(raw)
            .await
            .map_err(|e| self.rpc_error(e))?;

        Ok(pending.tx_hash())
    }

    async fn get_code(&self, address: Address) -> BridgeResult<Bytes> {
        self.http()
            .get_code(address, None)
            .await
            .map_err(|e| self.rpc_error(e))
    }

    async fn call_contract(&self, to: Address, data: Bytes) -> BridgeResult<Bytes> {
        let tx: TypedTransaction = TransactionRequest::new().to(to).data(data).into();
        self.http()
            .call(&tx, None)
            .await
            .map_err(|e| self.rpc_error(e))
    }
}
