//! Swap value bounds, fees and decimal conversion between the two bridged tokens

use crate::config::TokenConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::types::SwapDirection;

use ethers::types::U256;
use ethers::utils::parse_units;

/// Fee rates are applied with this many parts per unit
const FEE_RATE_PRECISION: u64 = 1_000_000;

/// One token's limits converted to its smallest unit
#[derive(Debug, Clone)]
pub struct TokenAmounts {
    pub symbol: String,
    pub decimals: u32,
    pub minimum_swap: U256,
    pub maximum_swap: U256,
    pub minimum_swap_fee: U256,
    /// Zero leaves the fee uncapped
    pub maximum_swap_fee: U256,
    fee_rate: u64,
}

impl TokenAmounts {
    pub fn from_config(config: &TokenConfig) -> BridgeResult<Self> {
        let to_units = |amount: f64, field: &str| -> BridgeResult<U256> {
            parse_units(amount.to_string(), config.decimals)
                .map(U256::from)
                .map_err(|e| {
                    BridgeError::Config(format!("{} {} of {}: {}", field, amount, config.symbol, e))
                })
        };

        Ok(Self {
            symbol: config.symbol.clone(),
            decimals: config.decimals,
            minimum_swap: to_units(config.minimum_swap, "minimum_swap")?,
            maximum_swap: to_units(config.maximum_swap, "maximum_swap")?,
            minimum_swap_fee: to_units(config.minimum_swap_fee, "minimum_swap_fee")?,
            maximum_swap_fee: to_units(config.maximum_swap_fee, "maximum_swap_fee")?,
            fee_rate: (config.swap_fee_rate * FEE_RATE_PRECISION as f64).round() as u64,
        })
    }

    pub fn in_range(&self, value: U256) -> bool {
        value >= self.minimum_swap && value <= self.maximum_swap
    }

    /// Value left after the swap fee is taken
    pub fn deduct_fee(&self, value: U256) -> U256 {
        if self.fee_rate == 0 {
            return value;
        }

        let mut fee = value * U256::from(self.fee_rate) / U256::from(FEE_RATE_PRECISION);
        if fee < self.minimum_swap_fee {
            fee = self.minimum_swap_fee;
        } else if !self.maximum_swap_fee.is_zero() && fee > self.maximum_swap_fee {
            fee = self.maximum_swap_fee;
        }

        value.saturating_sub(fee)
    }
}

/// Value rules for the bridged token pair
#[derive(Debug, Clone)]
pub struct SwapValueRules {
    pub src: TokenAmounts,
    pub dst: TokenAmounts,
}

impl SwapValueRules {
    pub fn new(src: &TokenConfig, dst: &TokenConfig) -> BridgeResult<Self> {
        Ok(Self {
            src: TokenAmounts::from_config(src)?,
            dst: TokenAmounts::from_config(dst)?,
        })
    }

    pub fn token(&self, is_src: bool) -> &TokenAmounts {
        if is_src {
            &self.src
        } else {
            &self.dst
        }
    }

    /// Check a value against the bounds of the side it was observed on
    pub fn check_swap_value(&self, value: U256, is_src: bool) -> bool {
        self.token(is_src).in_range(value)
    }

    /// Take the swap fee of the side the value was observed on
    pub fn apply_swap_fee(&self, value: U256, direction: SwapDirection) -> U256 {
        match direction {
            SwapDirection::Swapin => self.src.deduct_fee(value),
            SwapDirection::Swapout => self.dst.deduct_fee(value),
        }
    }

    /// Amount paid out on the outbound chain: fee, then rescale to its decimals
    pub fn calc_swapped_value(&self, value: U256, direction: SwapDirection) -> U256 {
        let after_fee = self.apply_swap_fee(value, direction);
        match direction {
            SwapDirection::Swapin => rescale(after_fee, self.src.decimals, self.dst.decimals),
            SwapDirection::Swapout => rescale(after_fee, self.dst.decimals, self.src.decimals),
        }
    }
}

/// Convert an amount between two decimal precisions, truncating on the way down
pub fn rescale(value: U256, from_decimals: u32, to_decimals: u32) -> U256 {
    use std::cmp::Ordering;

    match to_decimals.cmp(&from_decimals) {
        Ordering::Equal => value,
        Ordering::Greater => value.saturating_mul(U256::exp10((to_decimals - from_decimals) as usize)),
        Ordering::Less => value / U256::exp10((from_decimals - to_decimals) as usize),
    }
}
