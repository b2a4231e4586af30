//! UTXO chain access through an electrs (esplora) REST endpoint

use crate::config::ChainConfig;
use crate::error::{BridgeError, BridgeResult};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Output script type of a null-data output
pub const OP_RETURN_TYPE: &str = "op_return";
pub const P2PKH_TYPE: &str = "p2pkh";
pub const P2SH_TYPE: &str = "p2sh";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectTx {
    pub txid: String,
    #[serde(default)]
    pub vin: Vec<ElectTxin>,
    #[serde(default)]
    pub vout: Vec<ElectTxOut>,
    #[serde(default)]
    pub status: Option<ElectTxStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectTxin {
    #[serde(default)]
    pub txid: Option<String>,
    #[serde(default)]
    pub vout: Option<u32>,
    #[serde(default)]
    pub is_coinbase: bool,
    #[serde(default)]
    pub prevout: Option<ElectTxOut>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectTxOut {
    #[serde(default)]
    pub scriptpubkey: String,
    #[serde(default)]
    pub scriptpubkey_asm: String,
    #[serde(default)]
    pub scriptpubkey_type: String,
    #[serde(default)]
    pub scriptpubkey_address: Option<String>,
    #[serde(default)]
    pub value: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectTxStatus {
    #[serde(default)]
    pub confirmed: bool,
    #[serde(default)]
    pub block_height: Option<u64>,
    #[serde(default)]
    pub block_hash: Option<String>,
    #[serde(default)]
    pub block_time: Option<u64>,
}

/// Indexer operations the bridge needs from a UTXO chain
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UtxoClient: Send + Sync {
    /// Fetch a transaction, `None` when the indexer does not know it
    async fn get_transaction_by_hash(&self, txid: &str) -> BridgeResult<Option<ElectTx>>;

    async fn get_transaction_status(&self, txid: &str) -> BridgeResult<ElectTxStatus>;

    async fn get_latest_block_number(&self) -> BridgeResult<u64>;
}

/// electrs REST client trying each configured endpoint in turn
pub struct ElectrsClient {
    name: String,
    client: Client,
    api_addresses: Vec<String>,
}

impl ElectrsClient {
    pub fn new(config: &ChainConfig) -> BridgeResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| BridgeError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let api_addresses = config
            .rpc_urls
            .iter()
            .map(|url| url.trim_end_matches('/').to_string())
            .collect();

        Ok(Self {
            name: config.name.clone(),
            client,
            api_addresses,
        })
    }

    /// GET a path, returning `None` on 404 and the body otherwise
    async fn get_text(&self, path: &str) -> BridgeResult<Option<String>> {
        let mut last_error = String::from("no api address configured");

        for base in &self.api_addresses {
            let url = format!("{}{}", base, path);
            match self.client.get(&url).send().await {
                Ok(response) if response.status() == StatusCode::NOT_FOUND => {
                    debug!("{} returned not found for {}", self.name, path);
                    return Ok(None);
                }
                Ok(response) if response.status().is_success() => {
                    let body = response
                        .text()
                        .await
                        .map_err(|e| BridgeError::rpc(&self.name, e))?;
                    return Ok(Some(body));
                }
                Ok(response) => {
                    last_error = format!("{} returned {}", url, response.status());
                    warn!("electrs request failed on {}: {}", self.name, last_error);
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!("electrs request to {} failed: {}", url, e);
                }
            }
        }

        Err(BridgeError::rpc(&self.name, last_error))
    }

    fn decode<T: for<'de> Deserialize<'de>>(&self, body: &str) -> BridgeResult<T> {
        serde_json::from_str(body).map_err(|e| BridgeError::rpc(&self.name, e))
    }
}

#[async_trait]
impl UtxoClient for ElectrsClient {
    async fn get_transaction_by_hash(&self, txid: &str) -> BridgeResult<Option<ElectTx>> {
        match self.get_text(&format!("/tx/{}", txid)).await? {
            Some(body) => self.decode(&body).map(Some),
            None => Ok(None),
        }
    }

    async fn get_transaction_status(&self, txid: &str) -> BridgeResult<ElectTxStatus> {
        match self.get_text(&format!("/tx/{}/status", txid)).await? {
            Some(body) => self.decode(&body),
            None => Ok(ElectTxStatus::default()),
        }
    }

    async fn get_latest_block_number(&self) -> BridgeResult<u64> {
        let body = self
            .get_text("/blocks/tip/height")
            .await?
            .ok_or_else(|| BridgeError::rpc(&self.name, "tip height not found"))?;

        body.trim()
            .parse()
            .map_err(|e| BridgeError::rpc(&self.name, format!("bad tip height {}: {}", body, e)))
    }
}
