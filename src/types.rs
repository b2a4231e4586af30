//! Core swap types shared by the verifiers, builders and the worker

use ethers::types::{Bytes, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Direction a swap travels through the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapDirection {
    /// Source chain deposit minted on the destination chain
    Swapin,
    /// Destination chain burn released on the source chain
    Swapout,
}

impl SwapDirection {
    pub const ALL: [SwapDirection; 2] = [SwapDirection::Swapin, SwapDirection::Swapout];

    pub fn as_str(&self) -> &'static str {
        match self {
            SwapDirection::Swapin => "swapin",
            SwapDirection::Swapout => "swapout",
        }
    }

    /// Swap type used when building the outbound transaction
    pub fn swap_type(&self) -> SwapType {
        match self {
            SwapDirection::Swapin => SwapType::Swapin,
            SwapDirection::Swapout => SwapType::Swapout,
        }
    }
}

impl fmt::Display for SwapDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SwapDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "swapin" => Ok(SwapDirection::Swapin),
            "swapout" => Ok(SwapDirection::Swapout),
            other => Err(format!("unknown swap direction: {}", other)),
        }
    }
}

/// Kind of outbound transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapType {
    NoSwap,
    Swapin,
    Swapout,
    Recall,
}

impl SwapType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwapType::NoSwap => "noswap",
            SwapType::Swapin => "swapin",
            SwapType::Swapout => "swapout",
            SwapType::Recall => "recall",
        }
    }

    /// Direction whose nonce counter this swap type consumes
    pub fn direction(&self) -> Option<SwapDirection> {
        match self {
            SwapType::NoSwap => None,
            SwapType::Swapin => Some(SwapDirection::Swapin),
            SwapType::Swapout | SwapType::Recall => Some(SwapDirection::Swapout),
        }
    }
}

impl fmt::Display for SwapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SwapType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "noswap" => Ok(SwapType::NoSwap),
            "swapin" => Ok(SwapType::Swapin),
            "swapout" => Ok(SwapType::Swapout),
            "recall" => Ok(SwapType::Recall),
            other => Err(format!("unknown swap type: {}", other)),
        }
    }
}

/// Chain specific facts about a verified transaction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapIntentExtra {
    /// Deposit made through an erc20 `transfer`
    pub is_erc20: bool,
    /// Contract the deposit went through, if any
    pub contract: Option<String>,
}

/// Normalized result of verifying one inbound transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapIntent {
    /// Source transaction id
    pub hash: String,
    pub from: String,
    pub to: String,
    /// Counterpart chain address credited by the swap
    pub bind: String,
    /// Amount in the smallest unit of the verifying chain
    pub value: U256,
    pub height: u64,
    pub timestamp: u64,
    pub extra: SwapIntentExtra,
}

/// Account-model transaction parameters resolved by the builder
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EthExtraArgs {
    pub gas: Option<u64>,
    pub gas_price: Option<U256>,
    pub nonce: Option<u64>,
}

/// Instructions for building one outbound transaction
///
/// The builder fills in missing fields in place; the final value is serialized
/// as the signing context handed to the MPC service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildTxArgs {
    pub swap_id: String,
    pub swap_type: SwapType,
    pub bind: String,
    pub from: String,
    pub to: String,
    pub value: U256,
    pub input: Option<Bytes>,
    pub memo: Option<String>,
    pub extra: Option<EthExtraArgs>,
    /// Amount paid out by the outbound transaction, resolved by the builder
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swap_value: Option<U256>,
}

impl BuildTxArgs {
    /// Arguments for settling a verified swap
    pub fn for_swap(
        swap_id: impl Into<String>,
        swap_type: SwapType,
        bind: impl Into<String>,
        value: U256,
    ) -> Self {
        let bind = bind.into();
        Self {
            swap_id: swap_id.into(),
            swap_type,
            to: bind.clone(),
            bind,
            from: String::new(),
            value,
            input: None,
            memo: None,
            extra: None,
            swap_value: None,
        }
    }

    /// Signing context sent along with the message hash
    pub fn signing_context(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Confirmation status of a transaction as seen by a chain adapter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxStatus {
    pub confirmed: bool,
    pub block_height: u64,
    pub block_time: u64,
    pub confirmations: u64,
}

impl TxStatus {
    /// Whether the transaction is buried deep enough to be acted upon
    pub fn is_stable(&self, required_confirmations: u64) -> bool {
        self.confirmed && self.block_height > 0 && self.confirmations >= required_confirmations
    }
}
