//! HTTP client for the operator API.

use std::sync::atomic::{AtomicU64, Ordering};

use reqwest::Url;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use super::rpc::{
    METHOD_LOG_LIST, METHOD_LOG_SET_LEVEL, METHOD_VERSION, RPC_PATH, RpcRequest, RpcResponse,
};
use super::{Operator, OperatorError};

/// Where `run` serves the operator API unless told otherwise.
pub const DEFAULT_OPERATOR_API: &str = "http://127.0.0.1:5101";

#[derive(Debug)]
pub struct OperatorClient {
    http: reqwest::Client,
    endpoint: Url,
    next_id: AtomicU64,
}

impl OperatorClient {
    /// `base` is the operator listener's root URL, e.g. `http://127.0.0.1:5101`.
    pub fn new(base: &str) -> Result<Self, OperatorError> {
        let endpoint = Url::parse(base)
            .and_then(|url| url.join(RPC_PATH))
            .map_err(|e| OperatorError::InvalidUrl(format!("{base}: {e}")))?;
        Ok(OperatorClient {
            http: reqwest::Client::new(),
            endpoint,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn call<P, R>(&self, method: &str, params: P) -> Result<R, OperatorError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let request = RpcRequest {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params: serde_json::to_value(params)?,
            id: json!(self.next_id.fetch_add(1, Ordering::Relaxed)),
        };
        debug!(method, endpoint = %self.endpoint, "Calling operator API");

        let response: RpcResponse = self
            .http
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = response.error {
            return Err(OperatorError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        Ok(serde_json::from_value(
            response.result.unwrap_or(Value::Null),
        )?)
    }
}

impl Operator for OperatorClient {
    async fn version(&self) -> Result<String, OperatorError> {
        self.call(METHOD_VERSION, json!([])).await
    }

    async fn log_list(&self) -> Result<Vec<String>, OperatorError> {
        self.call(METHOD_LOG_LIST, json!([])).await
    }

    async fn log_set_level(&self, subsystem: &str, level: &str) -> Result<(), OperatorError> {
        self.call(METHOD_LOG_SET_LEVEL, (subsystem, level)).await
    }
}
