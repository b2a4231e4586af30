//! Shared fixtures for unit tests

use crate::chain::electrs::{
    ElectTx, ElectTxOut, ElectTxStatus, ElectTxin, MockUtxoClient, OP_RETURN_TYPE, P2PKH_TYPE, P2SH_TYPE,
};
use crate::chain::provider::MockEvmClient;
use crate::chain::{AddressKind, BridgeContext, BtcBridge, EthBridge, MemoPrefixes};
use crate::config::{ChainConfig, ChainFamily, TokenConfig};
use crate::error::{BridgeError, BridgeResult};
use crate::tokens::SwapValueRules;
use crate::tx::{NonceAllocator, SignCoordinator, SignService, SignStatusError};

use async_trait::async_trait;
use bitcoin::hashes::Hash;
use bitcoin::{Address as BtcAddress, Network, PubkeyHash};
use dashmap::DashMap;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, H256};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub const EVM_CHAIN_ID: u64 = 46688;
pub const EVM_DEPOSIT_HEIGHT: u64 = 500_000;
pub const BTC_DEPOSIT_HEIGHT: u64 = 1_800_000;
pub const BTC_TIP: u64 = 1_800_010;

/// EVM account credited by swapins in tests
pub const BIND_ADDRESS: &str = "0x0520e8e5e08169c4dbc1580dc9bf56638532773a";

const DCRM_KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
const MAPPING_CONTRACT: &str = "0x5d3c0f4ca5ee99f8e8f59ff9a5fab04f6a7e007f";
const TOKEN_CONTRACT: &str = "0x9a4f5c3e1a8e0bb2a1e4e3b5d6c7f8091a2b3c4d";

pub fn dcrm_wallet() -> LocalWallet {
    DCRM_KEY
        .parse::<LocalWallet>()
        .unwrap()
        .with_chain_id(EVM_CHAIN_ID)
}

pub fn dcrm_evm_address() -> Address {
    dcrm_wallet().address()
}

pub fn mapping_contract() -> Address {
    MAPPING_CONTRACT.parse().unwrap()
}

pub fn token_contract() -> Address {
    TOKEN_CONTRACT.parse().unwrap()
}

/// Deterministic testnet p2pkh address
pub fn btc_address(seed: u8) -> String {
    let hash = PubkeyHash::from_byte_array([seed; 20]);
    BtcAddress::p2pkh(hash, Network::Testnet).to_string()
}

pub fn btc_dcrm_address() -> String {
    btc_address(1)
}

pub fn btc_counterpart() -> AddressKind {
    AddressKind::Bitcoin(Network::Testnet)
}

pub fn token_config(symbol: &str, decimals: u32, is_erc20: bool) -> TokenConfig {
    TokenConfig {
        symbol: symbol.to_string(),
        decimals,
        minimum_swap: 0.00001,
        maximum_swap: 100.0,
        swap_fee_rate: 0.0,
        minimum_swap_fee: 0.0,
        maximum_swap_fee: 0.0,
        is_erc20,
    }
}

pub fn btc_chain_config() -> ChainConfig {
    ChainConfig {
        family: ChainFamily::Bitcoin,
        name: "BTC".to_string(),
        network: Some("testnet".to_string()),
        chain_id: None,
        rpc_urls: vec!["http://127.0.0.1:3002".to_string()],
        confirmations: 6,
        dcrm_address: btc_dcrm_address(),
        contract_address: None,
        default_gas_limit: 90_000,
        rpc_retry_count: 1,
        rpc_retry_interval_ms: 0,
        token: token_config("BTC", 8, false),
    }
}

pub fn eth_chain_config(is_src: bool, is_erc20: bool) -> ChainConfig {
    let contract_address = if !is_src {
        Some(MAPPING_CONTRACT.to_string())
    } else if is_erc20 {
        Some(TOKEN_CONTRACT.to_string())
    } else {
        None
    };

    ChainConfig {
        family: ChainFamily::Ethereum,
        name: "FSN".to_string(),
        network: None,
        chain_id: Some(EVM_CHAIN_ID),
        rpc_urls: vec!["http://127.0.0.1:8545".to_string()],
        confirmations: 6,
        dcrm_address: format!("{:?}", dcrm_evm_address()),
        contract_address,
        default_gas_limit: 90_000,
        rpc_retry_count: 1,
        rpc_retry_interval_ms: 0,
        token: token_config(if is_src { "ETH" } else { "mBTC" }, 18, is_erc20 || !is_src),
    }
}

/// 8-decimal source token mapped to an 18-decimal destination token
pub fn value_rules() -> Arc<SwapValueRules> {
    value_rules_for(8, 18)
}

pub fn value_rules_for(src_decimals: u32, dst_decimals: u32) -> Arc<SwapValueRules> {
    Arc::new(
        SwapValueRules::new(
            &token_config("SRC", src_decimals, false),
            &token_config("DST", dst_decimals, true),
        )
        .unwrap(),
    )
}

pub fn memo_prefixes() -> MemoPrefixes {
    MemoPrefixes {
        lock: "SWAPTO:".to_string(),
        unlock: "SWAPTX:".to_string(),
        recall: "RECALL:".to_string(),
    }
}

pub fn p2pkh_output(address: &str, value: u64) -> ElectTxOut {
    ElectTxOut {
        scriptpubkey_type: P2PKH_TYPE.to_string(),
        scriptpubkey_address: Some(address.to_string()),
        value,
        ..Default::default()
    }
}

pub fn p2sh_output(address: &str, value: u64) -> ElectTxOut {
    ElectTxOut {
        scriptpubkey_type: P2SH_TYPE.to_string(),
        scriptpubkey_address: Some(address.to_string()),
        value,
        ..Default::default()
    }
}

pub fn memo_output(memo: &str) -> ElectTxOut {
    ElectTxOut {
        scriptpubkey_type: OP_RETURN_TYPE.to_string(),
        scriptpubkey_asm: format!(
            "OP_RETURN OP_PUSHBYTES_{} {}",
            memo.len(),
            hex::encode(memo.as_bytes())
        ),
        ..Default::default()
    }
}

/// Confirmed transaction at `BTC_DEPOSIT_HEIGHT` spending an output of `from`
pub fn electrs_tx(txid: &str, from: &str, outputs: Vec<ElectTxOut>) -> ElectTx {
    ElectTx {
        txid: txid.to_string(),
        vin: vec![ElectTxin {
            txid: Some("11".repeat(32)),
            vout: Some(0),
            is_coinbase: false,
            prevout: Some(p2pkh_output(from, 200_000_000)),
        }],
        vout: outputs,
        status: Some(ElectTxStatus {
            confirmed: true,
            block_height: Some(BTC_DEPOSIT_HEIGHT),
            block_hash: Some("22".repeat(32)),
            block_time: Some(1_600_000_000),
        }),
    }
}

/// Indexer client serving one transaction, stable at `BTC_TIP`
pub fn utxo_client_serving(tx: ElectTx) -> MockUtxoClient {
    let mut client = MockUtxoClient::new();
    let status = tx.status.clone().unwrap_or_default();
    client
        .expect_get_transaction_status()
        .returning(move |_| Ok(status.clone()));
    client
        .expect_get_latest_block_number()
        .returning(|| Ok(BTC_TIP));
    client
        .expect_get_transaction_by_hash()
        .returning(move |_| Ok(Some(tx.clone())));
    client
}

/// Signing service backed by a local key
pub struct WalletSignService {
    wallet: LocalWallet,
    signatures: DashMap<String, String>,
}

impl WalletSignService {
    pub fn new(wallet: LocalWallet) -> Self {
        Self {
            wallet,
            signatures: DashMap::new(),
        }
    }
}

#[async_trait]
impl SignService for WalletSignService {
    async fn submit_sign_request(&self, msg_hash: &str, _context: &str) -> BridgeResult<String> {
        let hash = H256::from_str(msg_hash).map_err(|e| BridgeError::Internal(e.to_string()))?;
        let signature = self
            .wallet
            .sign_hash(hash)
            .map_err(|e| BridgeError::Internal(e.to_string()))?;

        let request_id = uuid::Uuid::new_v4().to_string();
        self.signatures
            .insert(request_id.clone(), hex::encode(signature.to_vec()));
        Ok(request_id)
    }

    async fn get_sign_status(&self, request_id: &str) -> Result<Vec<String>, SignStatusError> {
        self.signatures
            .get(request_id)
            .map(|rsv| vec![rsv.clone()])
            .ok_or_else(|| SignStatusError::Failed(format!("unknown request {}", request_id)))
    }
}

pub fn sign_coordinator(service: Arc<dyn SignService>) -> Arc<SignCoordinator> {
    Arc::new(SignCoordinator::with_intervals(
        service,
        Duration::ZERO,
        3,
        Duration::ZERO,
    ))
}

pub fn bridge_context(values: Arc<SwapValueRules>, service: Arc<dyn SignService>) -> BridgeContext {
    BridgeContext {
        values,
        memo: memo_prefixes(),
        nonces: Arc::new(NonceAllocator::new()),
        signer: sign_coordinator(service),
    }
}

pub fn eth_bridge_with_signer(
    client: MockEvmClient,
    is_src: bool,
    is_erc20: bool,
    counterpart: AddressKind,
    service: Arc<dyn SignService>,
) -> EthBridge {
    let values = if is_src {
        value_rules_for(18, 18)
    } else {
        value_rules()
    };

    EthBridge::new(
        &eth_chain_config(is_src, is_erc20),
        is_src,
        Arc::new(client),
        counterpart,
        bridge_context(values, service),
    )
    .unwrap()
}

/// Source-side EVM bridge whose counterpart is bitcoin testnet
pub fn eth_src_bridge(client: MockEvmClient, is_erc20: bool) -> EthBridge {
    eth_bridge_with_signer(
        client,
        true,
        is_erc20,
        btc_counterpart(),
        Arc::new(WalletSignService::new(dcrm_wallet())),
    )
}

/// Destination-side EVM bridge with the mapping contract
pub fn eth_dst_bridge(client: MockEvmClient, counterpart: AddressKind) -> EthBridge {
    eth_bridge_with_signer(
        client,
        false,
        true,
        counterpart,
        Arc::new(WalletSignService::new(dcrm_wallet())),
    )
}

/// Source-side bitcoin testnet bridge whose counterpart is an EVM chain
pub fn btc_src_bridge(client: MockUtxoClient) -> BtcBridge {
    BtcBridge::new(
        &btc_chain_config(),
        true,
        Arc::new(client),
        AddressKind::Evm,
        value_rules(),
        memo_prefixes(),
    )
    .unwrap()
}
