//! Account-model chain bridge
//!
//! On the source side it verifies native or erc20 deposits to the custodied
//! address and pays swapouts back. On the destination side it verifies
//! `LogSwapout` burns of the mapping contract and mints swapins through it.

pub mod abi;
mod build;
mod sign;
mod verify;

use super::{AddressKind, BridgeContext, CrossChainBridge, EvmClient, MemoPrefixes, SignedTx, UnsignedTx};
use crate::config::ChainConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::tokens::SwapValueRules;
use crate::tx::{GasEstimator, NonceAllocator, SignCoordinator};
use crate::types::{BuildTxArgs, SwapIntent, TxStatus};

use async_trait::async_trait;
use ethers::types::{Address, H256};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

/// Bridge for an EVM chain
pub struct EthBridge {
    name: String,
    is_src: bool,
    chain_id: u64,
    confirmations: u64,
    /// Custodied account signed for by the MPC group
    dcrm_address: Address,
    /// Token contract on the source side, mapping contract on the destination side
    contract_address: Option<Address>,
    is_erc20: bool,
    default_gas_limit: u64,
    rpc_retry_count: u32,
    rpc_retry_interval: Duration,
    client: Arc<dyn EvmClient>,
    counterpart: AddressKind,
    values: Arc<SwapValueRules>,
    memo: MemoPrefixes,
    nonces: Arc<NonceAllocator>,
    gas: GasEstimator,
    signer: Arc<SignCoordinator>,
}

impl EthBridge {
    pub fn new(
        config: &ChainConfig,
        is_src: bool,
        client: Arc<dyn EvmClient>,
        counterpart: AddressKind,
        ctx: BridgeContext,
    ) -> BridgeResult<Self> {
        let chain_id = config
            .chain_id
            .ok_or_else(|| BridgeError::Config(format!("Chain {} needs a chain_id", config.name)))?;

        let dcrm_address = parse_address(&config.dcrm_address)
            .ok_or_else(|| BridgeError::Config(format!("Bad dcrm address {}", config.dcrm_address)))?;

        let contract_address = match &config.contract_address {
            Some(contract) => Some(
                parse_address(contract)
                    .ok_or_else(|| BridgeError::Config(format!("Bad contract address {}", contract)))?,
            ),
            None => None,
        };

        if !is_src && contract_address.is_none() {
            return Err(BridgeError::Config(format!(
                "Chain {} needs its mapping contract address",
                config.name
            )));
        }

        Ok(Self {
            name: config.name.clone(),
            is_src,
            chain_id,
            confirmations: config.confirmations,
            dcrm_address,
            contract_address,
            is_erc20: config.token.is_erc20,
            default_gas_limit: config.default_gas_limit,
            rpc_retry_count: config.rpc_retry_count,
            rpc_retry_interval: config.rpc_retry_interval(),
            client,
            counterpart,
            values: ctx.values,
            memo: ctx.memo,
            nonces: ctx.nonces,
            gas: GasEstimator::new(config.rpc_retry_count, config.rpc_retry_interval()),
            signer: ctx.signer,
        })
    }

    fn contract(&self) -> BridgeResult<Address> {
        self.contract_address.ok_or_else(|| {
            BridgeError::Config(format!("Chain {} has no contract address", self.name))
        })
    }
}

pub(crate) fn parse_address(address: &str) -> Option<Address> {
    if !address.starts_with("0x") || address.len() != 42 {
        return None;
    }
    Address::from_str(address).ok()
}

pub(crate) fn parse_tx_hash(tx_id: &str) -> BridgeResult<H256> {
    H256::from_str(tx_id).map_err(|_| BridgeError::NotFound {
        tx_id: tx_id.to_string(),
    })
}

/// Lowercase 0x-prefixed hex of a hash
pub(crate) fn hash_hex(hash: H256) -> String {
    format!("{:?}", hash)
}

#[async_trait]
impl CrossChainBridge for EthBridge {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_src(&self) -> bool {
        self.is_src
    }

    fn is_valid_address(&self, address: &str) -> bool {
        AddressKind::Evm.is_valid_address(address)
    }

    async fn verify_transaction(
        &self,
        tx_id: &str,
        allow_unstable: bool,
    ) -> BridgeResult<SwapIntent> {
        if self.is_src {
            self.verify_swapin_tx(tx_id, allow_unstable).await
        } else {
            self.verify_swapout_tx(tx_id, allow_unstable).await
        }
    }

    async fn get_transaction_status(&self, tx_id: &str) -> BridgeResult<TxStatus> {
        self.transaction_status(tx_id).await
    }

    async fn transaction_exists(&self, tx_id: &str) -> BridgeResult<bool> {
        let hash = parse_tx_hash(tx_id)?;
        Ok(self.client.get_transaction_by_hash(hash).await?.is_some())
    }

    async fn build_raw_transaction(&self, args: &mut BuildTxArgs) -> BridgeResult<UnsignedTx> {
        self.build_transaction(args).await
    }

    async fn sign_transaction(
        &self,
        tx: UnsignedTx,
        args: &BuildTxArgs,
    ) -> BridgeResult<SignedTx> {
        self.mpc_sign_transaction(tx, args).await
    }

    async fn send_transaction(&self, tx: &SignedTx) -> BridgeResult<String> {
        let hash = self.client.send_raw_transaction(tx.raw.clone()).await?;
        Ok(hash_hex(hash))
    }

    async fn release_build(&self, args: &BuildTxArgs) {
        self.release_nonce(args).await
    }

    async fn verify_contract_address(&self) -> BridgeResult<()> {
        self.check_contract_code().await
    }

    async fn health_check(&self) -> bool {
        match self.client.get_block_number().await {
            Ok(_) => true,
            Err(e) => {
                error!("Health check failed for chain {}: {}", self.name, e);
                false
            }
        }
    }
}
