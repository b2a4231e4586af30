//! UTXO chain bridge: verifies deposits to the custodied address or to a bind-specific P2SH address

use super::electrs::{ElectTx, ElectTxOut, ElectTxin, UtxoClient, OP_RETURN_TYPE, P2PKH_TYPE, P2SH_TYPE};
use super::{strip_lock_memo, AddressKind, CrossChainBridge, MemoPrefixes, SignedTx, UnsignedTx};
use crate::config::ChainConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::tokens::SwapValueRules;
use crate::types::{BuildTxArgs, SwapIntent, SwapIntentExtra, TxStatus};

use async_trait::async_trait;
use bitcoin::opcodes::all::OP_DROP;
use bitcoin::script::{Builder, PushBytesBuf, ScriptBuf};
use bitcoin::{Address, Network};
use ethers::types::U256;
use lazy_static::lazy_static;
use regex::Regex;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error};

lazy_static! {
    static ref MEMO_SCRIPT: Regex =
        Regex::new(r"^OP_RETURN OP_PUSHBYTES_[0-9]* ").expect("valid memo script pattern");
}

/// Bridge for a bitcoin-like chain indexed by electrs
pub struct BtcBridge {
    name: String,
    is_src: bool,
    network: Network,
    confirmations: u64,
    dcrm_address: String,
    dcrm_script: ScriptBuf,
    client: Arc<dyn UtxoClient>,
    counterpart: AddressKind,
    values: Arc<SwapValueRules>,
    memo: MemoPrefixes,
}

impl BtcBridge {
    pub fn new(
        config: &ChainConfig,
        is_src: bool,
        client: Arc<dyn UtxoClient>,
        counterpart: AddressKind,
        values: Arc<SwapValueRules>,
        memo: MemoPrefixes,
    ) -> BridgeResult<Self> {
        let network = match AddressKind::from_config(config)? {
            AddressKind::Bitcoin(network) => network,
            AddressKind::Evm => {
                return Err(BridgeError::Config(format!(
                    "Chain {} is not a bitcoin chain",
                    config.name
                )))
            }
        };

        let dcrm = Address::from_str(&config.dcrm_address)
            .map_err(|e| BridgeError::Config(format!("Bad dcrm address: {}", e)))?
            .require_network(network)
            .map_err(|e| BridgeError::Config(format!("Bad dcrm address: {}", e)))?;

        Ok(Self {
            name: config.name.clone(),
            is_src,
            network,
            confirmations: config.confirmations,
            dcrm_address: config.dcrm_address.clone(),
            dcrm_script: dcrm.script_pubkey(),
            client,
            counterpart,
            values,
            memo,
        })
    }

    /// P2SH deposit address for a bind and its redeem script
    ///
    /// The redeem script is `<lock prefix || bind> OP_DROP <dcrm output script>`.
    pub fn get_p2sh_address(&self, bind: &str) -> BridgeResult<(String, ScriptBuf)> {
        if !self.counterpart.is_valid_address(bind) {
            return Err(BridgeError::WrongBind {
                bind: bind.to_string(),
            });
        }

        let memo = format!("{}{}", self.memo.lock, bind).into_bytes();
        let memo = PushBytesBuf::try_from(memo).map_err(|_| BridgeError::WrongBind {
            bind: bind.to_string(),
        })?;

        let mut redeem = Builder::new()
            .push_slice(memo)
            .push_opcode(OP_DROP)
            .into_script()
            .into_bytes();
        redeem.extend_from_slice(self.dcrm_script.as_bytes());
        let redeem = ScriptBuf::from_bytes(redeem);

        let address = Address::p2sh(&redeem, self.network).map_err(|_| BridgeError::WrongBind {
            bind: bind.to_string(),
        })?;

        Ok((address.to_string(), redeem))
    }

    async fn check_stable(&self, tx_id: &str) -> BridgeResult<()> {
        let status = self.get_transaction_status(tx_id).await?;
        if status.block_height > 0 && status.confirmations >= self.confirmations {
            Ok(())
        } else {
            Err(BridgeError::NotStable {
                tx_id: tx_id.to_string(),
            })
        }
    }

    async fn fetch_transaction(&self, tx_id: &str) -> BridgeResult<ElectTx> {
        match self.client.get_transaction_by_hash(tx_id).await {
            Ok(Some(tx)) => Ok(tx),
            Ok(None) => Err(BridgeError::NotFound {
                tx_id: tx_id.to_string(),
            }),
            Err(e) => {
                debug!("{} get transaction {} failed: {}", self.name, tx_id, e);
                Err(e)
            }
        }
    }

    /// Shared receiver, sender and value checks of both deposit styles
    async fn verify_deposit(
        &self,
        tx_id: &str,
        receiver: &str,
        allow_unstable: bool,
    ) -> BridgeResult<(SwapIntent, Option<String>)> {
        if !allow_unstable {
            self.check_stable(tx_id).await?;
        }

        let tx = self.fetch_transaction(tx_id).await?;
        let status = tx.status.clone().unwrap_or_default();

        let (value, memo_script, right_receiver) = get_received_value(&tx.vout, receiver);
        if !right_receiver {
            return Err(BridgeError::WrongReceiver {
                tx_id: tx_id.to_string(),
            });
        }

        let from = get_tx_from(&tx.vin);
        if from == receiver {
            return Err(BridgeError::WrongSender {
                tx_id: tx_id.to_string(),
            });
        }

        let value = U256::from(value);
        if !self.values.check_swap_value(value, self.is_src) {
            return Err(BridgeError::WrongValue {
                tx_id: tx_id.to_string(),
                value: value.to_string(),
            });
        }

        let intent = SwapIntent {
            hash: tx_id.to_string(),
            from,
            to: receiver.to_string(),
            bind: String::new(),
            value,
            height: status.block_height.unwrap_or_default(),
            timestamp: status.block_time.unwrap_or_default(),
            extra: SwapIntentExtra::default(),
        };

        Ok((intent, memo_script))
    }

    fn not_source(&self) -> BridgeError {
        BridgeError::Unsupported {
            chain: self.name.clone(),
            operation: "verification on the destination side",
        }
    }

    fn no_outbound(&self, operation: &'static str) -> BridgeError {
        BridgeError::Unsupported {
            chain: self.name.clone(),
            operation,
        }
    }
}

/// Sum of payable outputs to `receiver`, plus the null-data script if any
fn get_received_value(vout: &[ElectTxOut], receiver: &str) -> (u64, Option<String>, bool) {
    let mut value = 0u64;
    let mut memo_script = None;
    let mut right_receiver = false;

    for output in vout {
        match output.scriptpubkey_type.as_str() {
            OP_RETURN_TYPE => memo_script = Some(output.scriptpubkey_asm.clone()),
            P2PKH_TYPE | P2SH_TYPE => {
                if output.scriptpubkey_address.as_deref() != Some(receiver) {
                    continue;
                }
                right_receiver = true;
                value = value.saturating_add(output.value);
            }
            _ => {}
        }
    }

    (value, memo_script, right_receiver)
}

/// Address funding the first input with a resolvable previous output
fn get_tx_from(vin: &[ElectTxin]) -> String {
    vin.iter()
        .filter_map(|input| input.prevout.as_ref())
        .find_map(|prevout| prevout.scriptpubkey_address.clone())
        .unwrap_or_default()
}

/// Extract the bind address from an `OP_RETURN OP_PUSHBYTES_N <hex>` script
pub fn parse_bind_from_memo_script(memo_script: &str, lock_prefix: &str) -> Option<String> {
    let found = MEMO_SCRIPT.find(memo_script)?;
    let memo = hex::decode(memo_script[found.end()..].trim()).ok()?;
    strip_lock_memo(&memo, lock_prefix)
}

#[async_trait]
impl CrossChainBridge for BtcBridge {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_src(&self) -> bool {
        self.is_src
    }

    fn is_valid_address(&self, address: &str) -> bool {
        AddressKind::Bitcoin(self.network).is_valid_address(address)
    }

    async fn verify_transaction(
        &self,
        tx_id: &str,
        allow_unstable: bool,
    ) -> BridgeResult<SwapIntent> {
        if !self.is_src {
            return Err(self.not_source());
        }

        let (mut intent, memo_script) = self
            .verify_deposit(tx_id, &self.dcrm_address, allow_unstable)
            .await?;

        // Memo is checked last so it never masks a more fundamental rejection
        let bind = memo_script
            .as_deref()
            .and_then(|script| parse_bind_from_memo_script(script, &self.memo.lock));
        match bind {
            Some(bind) if self.counterpart.is_valid_address(&bind) => intent.bind = bind,
            Some(bind) => {
                debug!("wrong bind address {} in memo of {}", bind, tx_id);
                return Err(BridgeError::WrongMemo {
                    tx_id: tx_id.to_string(),
                });
            }
            None => {
                debug!("wrong memo {:?} in {}", memo_script, tx_id);
                return Err(BridgeError::WrongMemo {
                    tx_id: tx_id.to_string(),
                });
            }
        }

        if !allow_unstable {
            debug!(
                "verify swapin pass: txid={} from={} to={} bind={} value={} height={}",
                intent.hash, intent.from, intent.to, intent.bind, intent.value, intent.height
            );
        }
        Ok(intent)
    }

    async fn verify_p2sh_transaction(
        &self,
        tx_id: &str,
        bind: &str,
        allow_unstable: bool,
    ) -> BridgeResult<SwapIntent> {
        if !self.is_src {
            return Err(self.not_source());
        }

        let (p2sh_address, _) = self.get_p2sh_address(bind)?;
        let (mut intent, _) = self
            .verify_deposit(tx_id, &p2sh_address, allow_unstable)
            .await?;
        intent.bind = bind.to_string();

        if !allow_unstable {
            debug!(
                "verify p2sh swapin pass: txid={} from={} to={} bind={} value={}",
                intent.hash, intent.from, intent.to, intent.bind, intent.value
            );
        }
        Ok(intent)
    }

    async fn get_transaction_status(&self, tx_id: &str) -> BridgeResult<TxStatus> {
        let status = self.client.get_transaction_status(tx_id).await?;
        let mut tx_status = TxStatus {
            confirmed: status.confirmed,
            block_height: status.block_height.unwrap_or_default(),
            block_time: status.block_time.unwrap_or_default(),
            confirmations: 0,
        };

        if tx_status.block_height > 0 {
            let latest = self.client.get_latest_block_number().await?;
            tx_status.confirmations = latest.saturating_sub(tx_status.block_height);
        }

        Ok(tx_status)
    }

    async fn transaction_exists(&self, tx_id: &str) -> BridgeResult<bool> {
        Ok(self.client.get_transaction_by_hash(tx_id).await?.is_some())
    }

    async fn build_raw_transaction(&self, _args: &mut BuildTxArgs) -> BridgeResult<UnsignedTx> {
        Err(self.no_outbound("building outbound transactions"))
    }

    async fn sign_transaction(
        &self,
        _tx: UnsignedTx,
        _args: &BuildTxArgs,
    ) -> BridgeResult<SignedTx> {
        Err(self.no_outbound("signing outbound transactions"))
    }

    async fn send_transaction(&self, _tx: &SignedTx) -> BridgeResult<String> {
        Err(self.no_outbound("broadcasting transactions"))
    }

    async fn health_check(&self) -> bool {
        match self.client.get_latest_block_number().await {
            Ok(_) => true,
            Err(e) => {
                error!("Health check failed for chain {}: {}", self.name, e);
                false
            }
        }
    }
}
