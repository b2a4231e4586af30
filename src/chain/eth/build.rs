//! Outbound transaction building for EVM chains

use super::abi::{self, from_alloy_u256, to_alloy_address, to_alloy_u256};
use super::{parse_address, EthBridge};
use crate::chain::UnsignedTx;
use crate::error::{BridgeError, BridgeResult};
use crate::tx::{retry_rpc, NonceKey};
use crate::types::{BuildTxArgs, EthExtraArgs, SwapDirection, SwapType};

use alloy_primitives::B256;
use alloy_sol_types::SolCall;
use ethers::types::{Address, Bytes, TransactionRequest, U256};
use tracing::{debug, info};

/// Destination, value and calldata of a transaction before defaults are set
struct Payload {
    to: Address,
    value: U256,
    input: Bytes,
}

impl EthBridge {
    pub(super) async fn build_transaction(&self, args: &mut BuildTxArgs) -> BridgeResult<UnsignedTx> {
        let payload = match args.swap_type {
            SwapType::Swapin if self.is_src => return Err(self.wrong_endpoint(args.swap_type)),
            SwapType::Swapout | SwapType::Recall if !self.is_src => {
                return Err(self.wrong_endpoint(args.swap_type))
            }
            SwapType::Swapin => self.swapin_payload(args)?,
            SwapType::Swapout | SwapType::Recall => self.swapout_payload(args).await?,
            SwapType::NoSwap => Payload {
                to: self.address_arg(&args.to)?,
                value: args.value,
                input: args.input.clone().unwrap_or_default(),
            },
        };

        args.to = format!("{:?}", payload.to);
        args.input = Some(payload.input.clone());

        let extra = self.set_defaults(args).await?;
        let from = self.address_arg(&args.from)?;

        let (Some(gas), Some(gas_price), Some(nonce)) = (extra.gas, extra.gas_price, extra.nonce) else {
            return Err(BridgeError::Internal(format!(
                "unresolved transaction defaults for swap {}",
                args.swap_id
            )));
        };

        let request = TransactionRequest::new()
            .from(from)
            .to(payload.to)
            .value(payload.value)
            .gas(gas)
            .gas_price(gas_price)
            .nonce(nonce)
            .data(payload.input)
            .chain_id(self.chain_id);

        info!(
            "Built {} tx for swap {} on {}: to {:?} value {} nonce {} gas {} gas price {}",
            args.swap_type, args.swap_id, self.name, payload.to, payload.value, nonce, gas, gas_price
        );

        Ok(UnsignedTx::Evm(request.into()))
    }

    /// Mint on the mapping contract for a verified source deposit
    fn swapin_payload(&self, args: &mut BuildTxArgs) -> BridgeResult<Payload> {
        let contract = self.contract()?;
        let account = self.address_arg(&args.bind)?;
        let amount = self.values.calc_swapped_value(args.value, SwapDirection::Swapin);
        args.swap_value = Some(amount);

        let call = abi::SwapinCall {
            txhash: swap_id_hash(&args.swap_id)?,
            account: to_alloy_address(account),
            amount: to_alloy_u256(amount),
        };

        Ok(Payload {
            to: contract,
            value: U256::zero(),
            input: Bytes::from(call.abi_encode()),
        })
    }

    /// Release from the custodied account for a verified burn or a recall
    async fn swapout_payload(&self, args: &mut BuildTxArgs) -> BridgeResult<Payload> {
        let receiver = self.address_arg(&args.bind)?;

        if self.is_erc20 {
            // Contract transfers carry the full-precision amount
            let amount = self.values.apply_swap_fee(args.value, SwapDirection::Swapout);
            args.swap_value = Some(amount);
            let token = self.contract()?;
            let balance = self.token_balance(token, self.dcrm_address).await?;
            if balance < amount {
                return Err(BridgeError::InsufficientBalance {
                    have: balance.to_string(),
                    need: amount.to_string(),
                });
            }

            let call = abi::transferCall {
                to: to_alloy_address(receiver),
                value: to_alloy_u256(amount),
            };
            return Ok(Payload {
                to: token,
                value: U256::zero(),
                input: Bytes::from(call.abi_encode()),
            });
        }

        let prefix = if args.swap_type == SwapType::Recall {
            &self.memo.recall
        } else {
            &self.memo.unlock
        };
        let amount = self.values.calc_swapped_value(args.value, SwapDirection::Swapout);
        args.swap_value = Some(amount);
        let memo = format!("{}{}", prefix, args.swap_id);
        let input = Bytes::from(memo.clone().into_bytes());
        args.memo = Some(memo);

        Ok(Payload {
            to: receiver,
            value: amount,
            input,
        })
    }

    /// Resolve gas, gas price, nonce and sender left unset in `args`
    async fn set_defaults(&self, args: &mut BuildTxArgs) -> BridgeResult<EthExtraArgs> {
        if args.from.is_empty() {
            args.from = format!("{:?}", self.dcrm_address);
        }
        let from = self.address_arg(&args.from)?;
        let mut extra = args.extra.clone().unwrap_or_default();

        if extra.gas.is_none() {
            extra.gas = Some(self.default_gas_limit);
        }

        if extra.gas_price.is_none() {
            extra.gas_price = Some(self.gas.get_gas_price(&self.name, self.client.as_ref()).await?);
        }

        if extra.nonce.is_none() {
            let reported = retry_rpc(self.rpc_retry_count, self.rpc_retry_interval, "pool nonce", || {
                self.client.get_pool_nonce(from)
            })
            .await?;

            let nonce = match args.swap_type.direction() {
                Some(direction) if from == self.dcrm_address => {
                    self.nonces
                        .allocate(NonceKey::new(self.chain_id, direction), reported)
                        .await
                }
                _ => reported,
            };
            extra.nonce = Some(nonce);
        }

        args.extra = Some(extra.clone());
        Ok(extra)
    }

    /// Hand back the nonce of a build whose transaction was never broadcast
    pub(super) async fn release_nonce(&self, args: &BuildTxArgs) {
        let Some(direction) = args.swap_type.direction() else {
            return;
        };
        let Some(nonce) = args.extra.as_ref().and_then(|extra| extra.nonce) else {
            return;
        };
        if parse_address(&args.from) != Some(self.dcrm_address) {
            return;
        }

        self.nonces
            .release(NonceKey::new(self.chain_id, direction), nonce)
            .await;
    }

    /// Check the configured contract carries the expected interface
    pub(super) async fn check_contract_code(&self) -> BridgeResult<()> {
        let Some(contract) = self.contract_address else {
            return Ok(());
        };
        if self.is_src && !self.is_erc20 {
            return Ok(());
        }

        let code = retry_rpc(self.rpc_retry_count, self.rpc_retry_interval, "contract code", || {
            self.client.get_code(contract)
        })
        .await?;

        let mut parts = abi::erc20_code_parts();
        if !self.is_src {
            parts.extend(abi::mapping_code_parts());
        }

        for (name, part) in parts {
            if !contains_bytes(&code, &part) {
                return Err(BridgeError::Config(format!(
                    "Contract {:?} on {} lacks {}",
                    contract, self.name, name
                )));
            }
        }

        info!("Verified contract {:?} on {}", contract, self.name);
        Ok(())
    }

    /// Build a user's burn on the mapping contract, releasing `value` to `bind`
    pub async fn build_swapout_tx(
        &self,
        from: &str,
        value: U256,
        bind: &str,
    ) -> BridgeResult<UnsignedTx> {
        if self.is_src {
            return Err(self.wrong_endpoint(SwapType::Swapout));
        }
        if value.is_zero() {
            return Err(BridgeError::MalformedValue(value.to_string()));
        }

        let contract = self.contract()?;
        let owner = self.address_arg(from)?;
        let balance = self.token_balance(contract, owner).await?;
        if balance < value {
            return Err(BridgeError::InsufficientBalance {
                have: balance.to_string(),
                need: value.to_string(),
            });
        }

        if !self.values.check_swap_value(value, false) {
            return Err(BridgeError::MalformedValue(value.to_string()));
        }
        if !self.counterpart.is_valid_address(bind) {
            return Err(BridgeError::WrongBind {
                bind: bind.to_string(),
            });
        }

        let call = abi::SwapoutCall {
            amount: to_alloy_u256(value),
            bindaddr: bind.to_string(),
        };

        let mut args = BuildTxArgs {
            swap_id: String::new(),
            swap_type: SwapType::NoSwap,
            bind: bind.to_string(),
            from: from.to_string(),
            to: format!("{:?}", contract),
            value: U256::zero(),
            input: Some(Bytes::from(call.abi_encode())),
            memo: None,
            extra: None,
            swap_value: None,
        };

        debug!("Building swapout of {} from {} to {}", value, from, bind);
        self.build_transaction(&mut args).await
    }

    async fn token_balance(&self, token: Address, owner: Address) -> BridgeResult<U256> {
        let data = Bytes::from(
            abi::balanceOfCall {
                owner: to_alloy_address(owner),
            }
            .abi_encode(),
        );

        let output = retry_rpc(self.rpc_retry_count, self.rpc_retry_interval, "balanceOf", || {
            self.client.call_contract(token, data.clone())
        })
        .await?;

        let balance = abi::balanceOfCall::abi_decode_returns(&output, true).map_err(|e| {
            BridgeError::rpc(&self.name, format!("bad balanceOf output: {}", e))
        })?;
        Ok(from_alloy_u256(balance._0))
    }

    fn address_arg(&self, address: &str) -> BridgeResult<Address> {
        parse_address(address).ok_or_else(|| BridgeError::WrongBind {
            bind: address.to_string(),
        })
    }

    fn wrong_endpoint(&self, swap_type: SwapType) -> BridgeError {
        BridgeError::WrongEndpoint {
            swap_type: swap_type.to_string(),
            endpoint: if self.is_src { "src" } else { "dst" },
        }
    }
}

/// Source transaction id as the `bytes32` recorded by the mapping contract
fn swap_id_hash(swap_id: &str) -> BridgeResult<B256> {
    let bytes = hex::decode(swap_id.trim_start_matches("0x"))
        .map_err(|_| BridgeError::MalformedValue(format!("swap id {}", swap_id)))?;
    if bytes.len() != 32 {
        return Err(BridgeError::MalformedValue(format!("swap id {}", swap_id)));
    }
    Ok(B256::from_slice(&bytes))
}

fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|window| window == needle)
}
