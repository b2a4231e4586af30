//! Remote signing through the MPC (DCRM) service
//!
//! The private key never enters this process. A message hash is submitted with
//! its signing context, then the service is polled until it returns exactly one
//! 65-byte `r || s || v` signature.

use crate::config::MpcConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::metrics;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Length of an `r || s || v` signature
pub const SIGNATURE_LENGTH: usize = 65;

/// Outcome of a sign status poll that carries no signature
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignStatusError {
    /// The signing group reported failure
    #[error("sign request failed: {0}")]
    Failed(String),

    /// The signing group gave up waiting for participants
    #[error("sign request timed out")]
    Timeout,

    #[error("sign request still pending")]
    Pending,

    #[error("sign service unreachable: {0}")]
    Transport(String),
}

impl SignStatusError {
    /// Fatal outcomes end polling immediately
    pub fn is_fatal(&self) -> bool {
        matches!(self, SignStatusError::Failed(_) | SignStatusError::Timeout)
    }
}

/// External multi-party signing service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SignService: Send + Sync {
    /// Submit a hash for signing, returning the request id
    async fn submit_sign_request(&self, msg_hash: &str, context: &str) -> BridgeResult<String>;

    /// Signature components of a finished request
    async fn get_sign_status(&self, request_id: &str) -> Result<Vec<String>, SignStatusError>;
}

/// Drives one sign request from submission to a validated signature
pub struct SignCoordinator {
    service: Arc<dyn SignService>,
    settle_interval: Duration,
    retry_count: u32,
    retry_interval: Duration,
}

impl SignCoordinator {
    pub fn new(service: Arc<dyn SignService>, config: &MpcConfig) -> Self {
        Self::with_intervals(
            service,
            Duration::from_secs(config.settle_interval_secs),
            config.retry_count,
            Duration::from_secs(config.retry_interval_secs),
        )
    }

    pub fn with_intervals(
        service: Arc<dyn SignService>,
        settle_interval: Duration,
        retry_count: u32,
        retry_interval: Duration,
    ) -> Self {
        Self {
            service,
            settle_interval,
            retry_count,
            retry_interval,
        }
    }

    /// Sign `msg_hash`, returning the 65-byte signature
    pub async fn sign(&self, msg_hash: &str, context: &str, swap_id: &str) -> BridgeResult<Vec<u8>> {
        let request_id = self.service.submit_sign_request(msg_hash, context).await?;
        info!(
            "Sign request {} submitted for swap {} (msg hash {})",
            request_id, swap_id, msg_hash
        );

        tokio::time::sleep(self.settle_interval).await;

        let result = self.poll(&request_id, swap_id).await;
        metrics::record_sign_request(result.is_ok());
        let rsv = result?;

        let signature = hex::decode(rsv.trim_start_matches("0x")).map_err(|e| {
            BridgeError::SignProtocolViolation(format!(
                "undecodable signature from request {}: {}",
                request_id, e
            ))
        })?;

        if signature.len() != SIGNATURE_LENGTH {
            return Err(BridgeError::SignProtocolViolation(format!(
                "signature of request {} has {} bytes",
                request_id,
                signature.len()
            )));
        }

        Ok(signature)
    }

    async fn poll(&self, request_id: &str, swap_id: &str) -> BridgeResult<String> {
        for attempt in 0..self.retry_count {
            if attempt > 0 {
                tokio::time::sleep(self.retry_interval).await;
            }

            match self.service.get_sign_status(request_id).await {
                Ok(mut rsv) => {
                    if rsv.len() != 1 {
                        return Err(BridgeError::SignProtocolViolation(format!(
                            "request {} returned {} signatures, want exactly one",
                            request_id,
                            rsv.len()
                        )));
                    }
                    return Ok(rsv.remove(0));
                }
                Err(SignStatusError::Failed(message)) => {
                    return Err(BridgeError::SignFailed {
                        request_id: request_id.to_string(),
                        message,
                    });
                }
                Err(SignStatusError::Timeout) => {
                    return Err(BridgeError::SignTimeout {
                        request_id: request_id.to_string(),
                    });
                }
                Err(e) => {
                    warn!("Retry sign status of {} for swap {}: {}", request_id, swap_id, e);
                }
            }
        }

        Err(BridgeError::SignTimeout {
            request_id: request_id.to_string(),
        })
    }
}
