//! Chain module - one bridge implementation per chain family
//!
//! This module provides:
//! - The `CrossChainBridge` capability interface the worker is written against
//! - Account-model chains (`eth`) over an ethers JSON-RPC provider with failover
//! - UTXO chains (`btc`) over an electrs REST indexer
//! - Address validation for the counterpart chain of each bridge

pub mod btc;
pub mod electrs;
pub mod eth;
pub mod provider;

pub use btc::BtcBridge;
pub use electrs::{ElectrsClient, UtxoClient};
pub use eth::EthBridge;
pub use provider::{ChainProvider, EvmClient};

use crate::config::{BridgeConfig, ChainConfig, ChainFamily, Settings};
use crate::error::{BridgeError, BridgeResult};
use crate::tokens::SwapValueRules;
use crate::tx::{NonceAllocator, SignCoordinator};
use crate::types::{BuildTxArgs, SwapDirection, SwapIntent, TxStatus};

use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::Bytes;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

/// Unsigned outbound transaction produced by a builder
#[derive(Debug, Clone)]
pub enum UnsignedTx {
    Evm(TypedTransaction),
}

/// Signed transaction ready for broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTx {
    pub raw: Bytes,
    pub tx_hash: String,
}

/// Memo tags distinguishing lock, unlock and recall payloads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoPrefixes {
    pub lock: String,
    pub unlock: String,
    pub recall: String,
}

impl From<&BridgeConfig> for MemoPrefixes {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            lock: config.lock_memo_prefix.clone(),
            unlock: config.unlock_memo_prefix.clone(),
            recall: config.recall_memo_prefix.clone(),
        }
    }
}

/// Bind address carried by a lock memo, which must be longer than the prefix
pub(crate) fn strip_lock_memo(memo: &[u8], lock_prefix: &str) -> Option<String> {
    if memo.len() <= lock_prefix.len() || !memo.starts_with(lock_prefix.as_bytes()) {
        return None;
    }

    String::from_utf8(memo[lock_prefix.len()..].to_vec()).ok()
}

/// Address format of a chain, used to validate bind addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    Bitcoin(bitcoin::Network),
    Evm,
}

impl AddressKind {
    pub fn from_config(config: &ChainConfig) -> BridgeResult<Self> {
        match config.family {
            ChainFamily::Ethereum => Ok(AddressKind::Evm),
            ChainFamily::Bitcoin => {
                let name = config.network.as_deref().unwrap_or("bitcoin");
                let network = bitcoin::Network::from_str(name).map_err(|e| {
                    BridgeError::Config(format!("Unknown bitcoin network {}: {}", name, e))
                })?;
                Ok(AddressKind::Bitcoin(network))
            }
        }
    }

    pub fn is_valid_address(&self, address: &str) -> bool {
        match self {
            AddressKind::Evm => eth::parse_address(address).is_some(),
            AddressKind::Bitcoin(network) => bitcoin::Address::from_str(address)
                .map(|addr| addr.require_network(*network).is_ok())
                .unwrap_or(false),
        }
    }
}

/// Shared services handed to every bridge
#[derive(Clone)]
pub struct BridgeContext {
    pub values: Arc<SwapValueRules>,
    pub memo: MemoPrefixes,
    pub nonces: Arc<NonceAllocator>,
    pub signer: Arc<SignCoordinator>,
}

/// Capability interface of one side of the bridge
#[async_trait]
pub trait CrossChainBridge: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this is the source side of the token pair
    fn is_src(&self) -> bool;

    fn is_valid_address(&self, address: &str) -> bool;

    /// Verify an inbound transaction and extract its swap intent
    async fn verify_transaction(&self, tx_id: &str, allow_unstable: bool)
        -> BridgeResult<SwapIntent>;

    /// Verify a deposit made to the P2SH address derived from `bind`
    async fn verify_p2sh_transaction(
        &self,
        _tx_id: &str,
        _bind: &str,
        _allow_unstable: bool,
    ) -> BridgeResult<SwapIntent> {
        Err(BridgeError::Unsupported {
            chain: self.name().to_string(),
            operation: "p2sh verification",
        })
    }

    async fn get_transaction_status(&self, tx_id: &str) -> BridgeResult<TxStatus>;

    /// Whether the chain knows the transaction, pending or mined
    async fn transaction_exists(&self, tx_id: &str) -> BridgeResult<bool>;

    /// Build an outbound transaction, resolving defaults into `args`
    async fn build_raw_transaction(&self, args: &mut BuildTxArgs) -> BridgeResult<UnsignedTx>;

    async fn sign_transaction(&self, tx: UnsignedTx, args: &BuildTxArgs)
        -> BridgeResult<SignedTx>;

    /// Broadcast, returning the hash reported by the node
    async fn send_transaction(&self, tx: &SignedTx) -> BridgeResult<String>;

    /// Give back what a build reserved when its transaction never left the process
    async fn release_build(&self, _args: &BuildTxArgs) {}

    /// Check the configured contracts expose the expected interface
    async fn verify_contract_address(&self) -> BridgeResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> bool;
}

/// The two sides of the bridge
#[derive(Clone)]
pub struct BridgeSet {
    pub src: Arc<dyn CrossChainBridge>,
    pub dst: Arc<dyn CrossChainBridge>,
}

impl BridgeSet {
    pub fn new(src: Arc<dyn CrossChainBridge>, dst: Arc<dyn CrossChainBridge>) -> Self {
        Self { src, dst }
    }

    /// Connect both chains described by the settings
    pub fn from_settings(settings: &Settings, ctx: BridgeContext) -> BridgeResult<Self> {
        let src_kind = AddressKind::from_config(&settings.src)?;
        let dst_kind = AddressKind::from_config(&settings.dst)?;

        let src = connect_bridge(&settings.src, true, dst_kind, ctx.clone())?;
        let dst = connect_bridge(&settings.dst, false, src_kind, ctx)?;

        info!(
            "Bridge connected: {} (src) <-> {} (dst)",
            settings.src.name, settings.dst.name
        );

        Ok(Self { src, dst })
    }

    /// Chain whose transactions start a swap of this direction
    pub fn inbound(&self, direction: SwapDirection) -> &Arc<dyn CrossChainBridge> {
        match direction {
            SwapDirection::Swapin => &self.src,
            SwapDirection::Swapout => &self.dst,
        }
    }

    /// Chain that receives the outbound transaction of this direction
    pub fn outbound(&self, direction: SwapDirection) -> &Arc<dyn CrossChainBridge> {
        match direction {
            SwapDirection::Swapin => &self.dst,
            SwapDirection::Swapout => &self.src,
        }
    }

    /// Health of (src, dst)
    pub async fn health_check(&self) -> (bool, bool) {
        let (src, dst) = futures::join!(self.src.health_check(), self.dst.health_check());
        crate::metrics::record_chain_health(self.src.name(), src);
        crate::metrics::record_chain_health(self.dst.name(), dst);
        (src, dst)
    }
}

fn connect_bridge(
    config: &ChainConfig,
    is_src: bool,
    counterpart: AddressKind,
    ctx: BridgeContext,
) -> BridgeResult<Arc<dyn CrossChainBridge>> {
    info!(
        "Initializing chain {} ({})",
        config.name,
        if is_src { "src" } else { "dst" }
    );

    match config.family {
        ChainFamily::Ethereum => {
            let client: Arc<dyn EvmClient> = Arc::new(ChainProvider::new(config)?);
            Ok(Arc::new(EthBridge::new(config, is_src, client, counterpart, ctx)?))
        }
        ChainFamily::Bitcoin => {
            let client: Arc<dyn UtxoClient> = Arc::new(ElectrsClient::new(config)?);
            Ok(Arc::new(BtcBridge::new(
                config,
                is_src,
                client,
                counterpart,
                ctx.values,
                ctx.memo,
            )?))
        }
    }
}
