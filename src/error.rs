//! Error types for the bridge relayer

use thiserror::Error;

/// Main error type for the relayer
#[derive(Error, Debug)]
pub enum BridgeError {
    // Verification rejections
    #[error("Transaction {tx_id} is not stable yet")]
    NotStable { tx_id: String },

    #[error("Transaction {tx_id} not found")]
    NotFound { tx_id: String },

    #[error("Transaction {tx_id} has wrong receiver")]
    WrongReceiver { tx_id: String },

    #[error("Transaction {tx_id} has wrong sender")]
    WrongSender { tx_id: String },

    #[error("Transaction {tx_id} has wrong value {value}")]
    WrongValue { tx_id: String, value: String },

    #[error("Transaction {tx_id} has wrong memo")]
    WrongMemo { tx_id: String },

    #[error("Wrong bind address {bind}")]
    WrongBind { bind: String },

    #[error("Transaction {tx_id} was reverted")]
    TxReverted { tx_id: String },

    // Build errors
    #[error("Cannot build {swap_type} transaction on the {endpoint} chain")]
    WrongEndpoint {
        swap_type: String,
        endpoint: &'static str,
    },

    #[error("Insufficient balance: have {have}, need {need}")]
    InsufficientBalance { have: String, need: String },

    // Signing errors
    #[error("Sign protocol violation: {0}")]
    SignProtocolViolation(String),

    #[error("Sign request {request_id} failed: {message}")]
    SignFailed { request_id: String, message: String },

    #[error("Sign request {request_id} timed out")]
    SignTimeout { request_id: String },

    // Infrastructure errors
    #[error("RPC error on {chain}: {message}")]
    Rpc { chain: String, message: String },

    #[error("Malformed swap value {0}")]
    MalformedValue(String),

    #[error("Swap {tx_id} already swapped to {swap_tx}")]
    AlreadySwapped { tx_id: String, swap_tx: String },

    #[error("Swap {tx_id} is not registered")]
    UnknownSwap { tx_id: String },

    #[error("Swap {tx_id} is {status}, not failed")]
    NotFailed { tx_id: String, status: String },

    #[error("{operation} is not supported on {chain}")]
    Unsupported {
        chain: String,
        operation: &'static str,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Build an RPC error for a chain
    pub fn rpc(chain: impl Into<String>, err: impl std::fmt::Display) -> Self {
        BridgeError::Rpc {
            chain: chain.into(),
            message: err.to_string(),
        }
    }

    /// Check if error is transient and the operation may be retried later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BridgeError::Rpc { .. }
                | BridgeError::NotStable { .. }
                | BridgeError::Database(_)
                | BridgeError::MalformedValue(_)
        )
    }

    /// Check if error is one of the verifier rejection kinds
    pub fn is_verify_rejection(&self) -> bool {
        matches!(
            self,
            BridgeError::NotStable { .. }
                | BridgeError::NotFound { .. }
                | BridgeError::WrongReceiver { .. }
                | BridgeError::WrongSender { .. }
                | BridgeError::WrongValue { .. }
                | BridgeError::WrongMemo { .. }
                | BridgeError::WrongBind { .. }
                | BridgeError::TxReverted { .. }
        )
    }

    /// Check if error should trigger an operator alert
    pub fn should_alert(&self) -> bool {
        matches!(
            self,
            BridgeError::InsufficientBalance { .. }
                | BridgeError::SignProtocolViolation(_)
                | BridgeError::SignFailed { .. }
        )
    }
}

/// Result type for relayer operations
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let wrong_sender = BridgeError::WrongSender {
            tx_id: "tx".to_string(),
        };
        assert!(wrong_sender.is_verify_rejection());
        assert!(!wrong_sender.is_retryable());
        assert!(!wrong_sender.should_alert());

        let not_stable = BridgeError::NotStable {
            tx_id: "tx".to_string(),
        };
        assert!(not_stable.is_verify_rejection());
        assert!(not_stable.is_retryable());

        let rpc = BridgeError::rpc("FSN", "connection refused");
        assert!(rpc.is_retryable());
        assert!(!rpc.is_verify_rejection());

        let balance = BridgeError::InsufficientBalance {
            have: "1".to_string(),
            need: "2".to_string(),
        };
        assert!(balance.should_alert());
        assert!(!balance.is_retryable());
        assert!(BridgeError::SignProtocolViolation("bad signer".to_string()).should_alert());

        let unknown = BridgeError::UnknownSwap {
            tx_id: "tx".to_string(),
        };
        assert!(!unknown.should_alert());
        assert!(!unknown.is_retryable());
    }
}
