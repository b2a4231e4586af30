//! MPC signing of EVM transactions

use super::{hash_hex, EthBridge};
use crate::chain::{SignedTx, UnsignedTx};
use crate::error::{BridgeError, BridgeResult};
use crate::types::BuildTxArgs;

use ethers::types::{Signature, H256, U256};
use ethers::utils::keccak256;
use tracing::info;

impl EthBridge {
    pub(super) async fn mpc_sign_transaction(
        &self,
        tx: UnsignedTx,
        args: &BuildTxArgs,
    ) -> BridgeResult<SignedTx> {
        let UnsignedTx::Evm(mut tx) = tx;
        tx.set_chain_id(self.chain_id);
        let sighash = tx.sighash();

        let rsv = self
            .signer
            .sign(&hash_hex(sighash), &args.signing_context(), &args.swap_id)
            .await?;

        let recovery_id = match rsv[64] {
            0 | 27 => 0u64,
            1 | 28 => 1u64,
            v => {
                return Err(BridgeError::SignProtocolViolation(format!(
                    "unexpected recovery byte {} for swap {}",
                    v, args.swap_id
                )))
            }
        };

        // EIP-155 replay protection
        let signature = Signature {
            r: U256::from_big_endian(&rsv[..32]),
            s: U256::from_big_endian(&rsv[32..64]),
            v: recovery_id + 35 + 2 * self.chain_id,
        };

        let sender = signature.recover(sighash).map_err(|e| {
            BridgeError::SignProtocolViolation(format!(
                "unrecoverable signature for swap {}: {}",
                args.swap_id, e
            ))
        })?;
        if sender != self.dcrm_address {
            return Err(BridgeError::SignProtocolViolation(format!(
                "signer {:?} of swap {} is not the custodied account {:?}",
                sender, args.swap_id, self.dcrm_address
            )));
        }

        let raw = tx.rlp_signed(&signature);
        let tx_hash = hash_hex(H256::from(keccak256(&raw)));

        info!("Signed tx {} for swap {} on {}", tx_hash, args.swap_id, self.name);
        Ok(SignedTx { raw, tx_hash })
    }
}
