//! JSON-RPC client of the DCRM signing node

use super::signer::{SignService, SignStatusError};
use crate::config::MpcConfig;
use crate::error::{BridgeError, BridgeResult};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const STATUS_SUCCESS: &str = "Success";

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Vec<Value>,
    id: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<DataResult>,
    #[serde(default)]
    error: Option<Value>,
}

/// Envelope every DCRM method answers with
#[derive(Debug, Deserialize)]
struct DataResult {
    #[serde(rename = "Status")]
    status: String,
    #[serde(rename = "Tip", default)]
    tip: String,
    #[serde(rename = "Error", default)]
    error: String,
    #[serde(rename = "Data", default)]
    data: Option<DataPayload>,
}

#[derive(Debug, Deserialize)]
struct DataPayload {
    #[serde(default)]
    result: String,
}

/// Status document of one sign request
#[derive(Debug, Deserialize)]
struct SignStatus {
    #[serde(rename = "Status")]
    status: String,
    #[serde(rename = "Rsv", default)]
    rsv: Vec<String>,
    #[serde(rename = "Tip", default)]
    tip: String,
    #[serde(rename = "Error", default)]
    error: String,
}

/// DCRM node client
pub struct DcrmClient {
    client: Client,
    api_address: String,
    key_id: String,
}

impl DcrmClient {
    pub fn new(config: &MpcConfig) -> BridgeResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.rpc_timeout_secs))
            .build()
            .map_err(|e| BridgeError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_address: config.api_address.clone(),
            key_id: config.key_id.clone(),
        })
    }

    async fn call(&self, method: &str, params: Vec<Value>) -> Result<DataResult, String> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: uuid::Uuid::new_v4().to_string(),
        };

        let response: RpcResponse = self
            .client
            .post(&self.api_address)
            .json(&request)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .json()
            .await
            .map_err(|e| e.to_string())?;

        if let Some(error) = response.error {
            return Err(format!("{} returned error: {}", method, error));
        }
        response
            .result
            .ok_or_else(|| format!("{} returned no result", method))
    }
}

#[async_trait]
impl SignService for DcrmClient {
    async fn submit_sign_request(&self, msg_hash: &str, context: &str) -> BridgeResult<String> {
        let params = vec![json!({
            "PubKey": self.key_id,
            "MsgHash": [msg_hash],
            "MsgContext": [context],
            "Keytype": "ECDSA",
            "Mode": "1",
        })];

        let result = self
            .call("dcrm_sign", params)
            .await
            .map_err(|e| BridgeError::rpc("dcrm", e))?;

        parse_submit_result(result).map_err(|e| BridgeError::rpc("dcrm", e))
    }

    async fn get_sign_status(&self, request_id: &str) -> Result<Vec<String>, SignStatusError> {
        let result = self
            .call("dcrm_getSignStatus", vec![json!(request_id)])
            .await
            .map_err(SignStatusError::Transport)?;

        debug!("Sign status of {}: {}", request_id, result.status);
        parse_sign_status(result)
    }
}

fn parse_submit_result(result: DataResult) -> Result<String, String> {
    if result.status != STATUS_SUCCESS {
        return Err(format!("dcrm_sign {}: {} {}", result.status, result.tip, result.error));
    }

    match result.data {
        Some(data) if !data.result.is_empty() => Ok(data.result),
        _ => Err("dcrm_sign returned an empty key id".to_string()),
    }
}

fn parse_sign_status(result: DataResult) -> Result<Vec<String>, SignStatusError> {
    if result.status != STATUS_SUCCESS {
        return Err(SignStatusError::Transport(format!(
            "getSignStatus {}: {} {}",
            result.status, result.tip, result.error
        )));
    }

    let payload = result.data.map(|d| d.result).unwrap_or_default();
    let status: SignStatus = serde_json::from_str(&payload)
        .map_err(|e| SignStatusError::Transport(format!("bad sign status {}: {}", payload, e)))?;

    match status.status.as_str() {
        "Success" => Ok(status.rsv),
        "Pending" => Err(SignStatusError::Pending),
        "Timeout" => Err(SignStatusError::Timeout),
        "Failure" => Err(SignStatusError::Failed(format!("{} {}", status.tip, status.error))),
        other => Err(SignStatusError::Transport(format!("unknown sign status {}", other))),
    }
}
