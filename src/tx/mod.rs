//! Outbound transaction support: nonce allocation, gas pricing and remote signing

mod dcrm;
mod gas;
mod nonce;
mod signer;

pub use dcrm::DcrmClient;
pub use gas::GasEstimator;
pub use nonce::{NonceAllocator, NonceKey};
pub use signer::{SignCoordinator, SignService, SignStatusError, SIGNATURE_LENGTH};

#[cfg(test)]
pub use signer::MockSignService;

use crate::error::BridgeResult;

use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Run an RPC call up to `count` times with a fixed pause between attempts
pub(crate) async fn retry_rpc<T, F, Fut>(
    count: u32,
    interval: Duration,
    what: &str,
    mut call: F,
) -> BridgeResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = BridgeResult<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < count => {
                warn!("{} failed (attempt {}/{}): {}", what, attempt, count, e);
                tokio::time::sleep(interval).await;
            }
            Err(e) => return Err(e),
        }
    }
}
