//! Verification of swapin deposits and swapout burns on EVM chains

use super::abi::{self, from_alloy_address, from_alloy_u256, to_b256, LogSwapout, TRANSFER_CALL_LENGTH};
use super::{parse_tx_hash, EthBridge};
use crate::chain::strip_lock_memo;
use crate::error::{BridgeError, BridgeResult};
use crate::types::{SwapIntent, SwapIntentExtra, TxStatus};

use alloy_sol_types::{SolCall, SolEvent};
use ethers::types::{Address, TransactionReceipt, H256, U256, U64};
use tracing::debug;

fn format_address(address: Address) -> String {
    format!("{:?}", address)
}

fn is_reverted(receipt: &TransactionReceipt) -> bool {
    receipt.status == Some(U64::zero())
}

impl EthBridge {
    /// Receipt of a transaction and the status derived from it
    async fn fetch_status(&self, hash: H256) -> BridgeResult<(Option<TransactionReceipt>, TxStatus)> {
        let mut status = TxStatus::default();

        let receipt = match self.client.get_transaction_receipt(hash).await? {
            Some(receipt) => receipt,
            None => return Ok((None, status)),
        };

        if let Some(block) = receipt.block_number {
            let block = block.as_u64();
            let latest = self.client.get_block_number().await?;
            status.confirmed = true;
            status.block_height = block;
            status.confirmations = latest.saturating_sub(block);
            status.block_time = self.client.get_block_timestamp(block).await?;
        }

        Ok((Some(receipt), status))
    }

    pub(super) async fn transaction_status(&self, tx_id: &str) -> BridgeResult<TxStatus> {
        let hash = parse_tx_hash(tx_id)?;
        let (_, status) = self.fetch_status(hash).await?;
        Ok(status)
    }

    /// Stability check followed by the transaction fetch
    async fn fetch_verifiable(
        &self,
        tx_id: &str,
        allow_unstable: bool,
    ) -> BridgeResult<(ethers::types::Transaction, Option<TransactionReceipt>, TxStatus)> {
        let hash = parse_tx_hash(tx_id)?;
        let (receipt, status) = self.fetch_status(hash).await?;

        if !allow_unstable && !status.is_stable(self.confirmations) {
            return Err(BridgeError::NotStable {
                tx_id: tx_id.to_string(),
            });
        }

        let tx = self
            .client
            .get_transaction_by_hash(hash)
            .await?
            .ok_or_else(|| BridgeError::NotFound {
                tx_id: tx_id.to_string(),
            })?;

        if receipt.as_ref().map(is_reverted).unwrap_or(false) {
            return Err(BridgeError::TxReverted {
                tx_id: tx_id.to_string(),
            });
        }

        Ok((tx, receipt, status))
    }

    /// Deposit to the custodied account, natively or through an erc20 `transfer`
    pub(super) async fn verify_swapin_tx(
        &self,
        tx_id: &str,
        allow_unstable: bool,
    ) -> BridgeResult<SwapIntent> {
        let (tx, _, status) = self.fetch_verifiable(tx_id, allow_unstable).await?;
        let wrong_receiver = || BridgeError::WrongReceiver {
            tx_id: tx_id.to_string(),
        };

        let (value, memo, contract) = if self.is_erc20 {
            let token = self.contract()?;
            if tx.to != Some(token) || tx.input.len() < TRANSFER_CALL_LENGTH {
                return Err(wrong_receiver());
            }

            let call = abi::transferCall::abi_decode(&tx.input[..TRANSFER_CALL_LENGTH], true)
                .map_err(|_| wrong_receiver())?;
            if from_alloy_address(call.to) != self.dcrm_address {
                return Err(wrong_receiver());
            }

            (
                from_alloy_u256(call.value),
                tx.input[TRANSFER_CALL_LENGTH..].to_vec(),
                Some(format_address(token)),
            )
        } else {
            if tx.to != Some(self.dcrm_address) {
                return Err(wrong_receiver());
            }
            (tx.value, tx.input.to_vec(), None)
        };

        if tx.from == self.dcrm_address {
            return Err(BridgeError::WrongSender {
                tx_id: tx_id.to_string(),
            });
        }

        self.check_value(tx_id, value)?;

        let bind = strip_lock_memo(&memo, &self.memo.lock)
            .filter(|bind| self.counterpart.is_valid_address(bind))
            .ok_or_else(|| {
                debug!("wrong memo in swapin {}", tx_id);
                BridgeError::WrongMemo {
                    tx_id: tx_id.to_string(),
                }
            })?;

        Ok(SwapIntent {
            hash: tx_id.to_string(),
            from: format_address(tx.from),
            to: format_address(self.dcrm_address),
            bind,
            value,
            height: tx
                .block_number
                .map(|b| b.as_u64())
                .unwrap_or(status.block_height),
            timestamp: status.block_time,
            extra: SwapIntentExtra {
                is_erc20: self.is_erc20,
                contract,
            },
        })
    }

    /// Burn on the mapping contract announced by `LogSwapout`
    pub(super) async fn verify_swapout_tx(
        &self,
        tx_id: &str,
        allow_unstable: bool,
    ) -> BridgeResult<SwapIntent> {
        let (tx, receipt, status) = self.fetch_verifiable(tx_id, allow_unstable).await?;
        let receipt = receipt.ok_or_else(|| BridgeError::NotStable {
            tx_id: tx_id.to_string(),
        })?;
        let contract = self.contract()?;
        let topic = H256::from(LogSwapout::SIGNATURE_HASH.0);

        let event = receipt
            .logs
            .iter()
            .filter(|log| log.address == contract && log.topics.first() == Some(&topic))
            .find_map(|log| {
                LogSwapout::decode_raw_log(log.topics.iter().map(|t| to_b256(*t)), &log.data, true)
                    .ok()
            })
            .ok_or_else(|| BridgeError::WrongReceiver {
                tx_id: tx_id.to_string(),
            })?;

        if tx.from == contract {
            return Err(BridgeError::WrongSender {
                tx_id: tx_id.to_string(),
            });
        }

        let value = from_alloy_u256(event.amount);
        self.check_value(tx_id, value)?;

        if !self.counterpart.is_valid_address(&event.bindaddr) {
            debug!("wrong bind address {} in swapout {}", event.bindaddr, tx_id);
            return Err(BridgeError::WrongMemo {
                tx_id: tx_id.to_string(),
            });
        }

        Ok(SwapIntent {
            hash: tx_id.to_string(),
            from: format_address(tx.from),
            to: format_address(contract),
            bind: event.bindaddr,
            value,
            height: status.block_height,
            timestamp: status.block_time,
            extra: SwapIntentExtra {
                is_erc20: true,
                contract: Some(format_address(contract)),
            },
        })
    }

    fn check_value(&self, tx_id: &str, value: U256) -> BridgeResult<()> {
        if self.values.check_swap_value(value, self.is_src) {
            Ok(())
        } else {
            Err(BridgeError::WrongValue {
                tx_id: tx_id.to_string(),
                value: value.to_string(),
            })
        }
    }
}
