// src/client.rs
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use ethers::core::rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::SmartAccountConfig;
use crate::error::{AaError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Remote account abstraction service. Implementations receive the active chain id
/// separately since it travels outside the JSON-RPC body.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn call(&self, chain_id: u64, method: &str, params: Vec<Value>) -> Result<Value>;
}

#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: Vec<Value>,
}

impl<'a> JsonRpcRequest<'a> {
    pub fn new(method: &'a str, params: Vec<Value>) -> Self {
        Self { jsonrpc: "2.0", id: payload_id(), method, params }
    }
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcErrorObject>,
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcErrorObject {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    pub fn into_result(self) -> Result<Value> {
        match self.error {
            Some(err) => Err(AaError::Backend { code: err.code, message: err.message, data: err.data }),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Request id: milliseconds since epoch scaled by 1000 plus a random sub-millisecond part,
/// so that calls issued within the same millisecond do not collide.
pub fn payload_id() -> u64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();
    millis * 1_000 + thread_rng().gen_range(0..1_000)
}

/// JSON-RPC over HTTPS. Chain id and project credentials go in the query string.
pub struct HttpBackend {
    http: reqwest::Client,
    endpoint: String,
    project_id: String,
    client_key: String,
}

impl HttpBackend {
    pub fn new(config: &SmartAccountConfig) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            endpoint: config.endpoint(),
            project_id: config.project_id.clone(),
            client_key: config.client_key.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn call(&self, chain_id: u64, method: &str, params: Vec<Value>) -> Result<Value> {
        let body = JsonRpcRequest::new(method, params);
        debug!("Calling {} (id {}) on chain {}", method, body.id, chain_id);

        let chain_id = chain_id.to_string();
        let response: JsonRpcResponse = self
            .http
            .post(&self.endpoint)
            .query(&[
                ("method", method),
                ("chainId", chain_id.as_str()),
                ("projectUuid", self.project_id.as_str()),
                ("projectKey", self.client_key.as_str()),
            ])
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        response.into_result()
    }
}
