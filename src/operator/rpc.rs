//! JSON-RPC 2.0 wire format and the axum endpoint serving it.
//!
//! Every well-formed JSON request gets HTTP 200; failures travel in the
//! `error` member with the standard codes.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::{Operator, OperatorError};

/// Path of the operator JSON-RPC endpoint.
pub const RPC_PATH: &str = "/rpc/v0";

pub const METHOD_VERSION: &str = "Operator.Version";
pub const METHOD_LOG_LIST: &str = "Operator.LogList";
pub const METHOD_LOG_SET_LEVEL: &str = "Operator.LogSetLevel";

const JSONRPC_VERSION: &str = "2.0";

const CODE_INVALID_REQUEST: i64 = -32600;
const CODE_METHOD_NOT_FOUND: i64 = -32601;
const CODE_INVALID_PARAMS: i64 = -32602;
const CODE_INTERNAL: i64 = -32603;
const CODE_OPERATOR: i64 = -32000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub id: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
    pub id: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

impl RpcErrorObject {
    fn new(code: i64, message: impl Into<String>) -> Self {
        RpcErrorObject {
            code,
            message: message.into(),
        }
    }
}

impl From<OperatorError> for RpcErrorObject {
    fn from(err: OperatorError) -> Self {
        RpcErrorObject::new(CODE_OPERATOR, err.to_string())
    }
}

impl RpcResponse {
    fn from_result(id: Value, result: Result<Value, RpcErrorObject>) -> Self {
        let (result, error) = match result {
            Ok(value) => (Some(value), None),
            Err(err) => (None, Some(err)),
        };
        RpcResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result,
            error,
            id,
        }
    }
}

/// Router serving the operator API at [`RPC_PATH`].
pub fn rpc_router<O: Operator + 'static>(operator: Arc<O>) -> Router {
    Router::new()
        .route(RPC_PATH, post(rpc_handler::<O>))
        .with_state(operator)
}

async fn rpc_handler<O: Operator + 'static>(
    State(operator): State<Arc<O>>,
    Json(request): Json<RpcRequest>,
) -> Json<RpcResponse> {
    debug!(method = %request.method, "Operator call");

    let result = if request.jsonrpc != JSONRPC_VERSION {
        Err(RpcErrorObject::new(
            CODE_INVALID_REQUEST,
            format!("unsupported jsonrpc version {:?}", request.jsonrpc),
        ))
    } else {
        dispatch(operator.as_ref(), &request.method, request.params).await
    };

    if let Err(err) = &result {
        warn!(method = %request.method, code = err.code, error = %err.message, "Operator call failed");
    }
    Json(RpcResponse::from_result(request.id, result))
}

async fn dispatch<O: Operator>(
    operator: &O,
    method: &str,
    params: Value,
) -> Result<Value, RpcErrorObject> {
    match method {
        METHOD_VERSION => to_result(operator.version().await?),
        METHOD_LOG_LIST => to_result(operator.log_list().await?),
        METHOD_LOG_SET_LEVEL => {
            let (subsystem, level): (String, String) = serde_json::from_value(params)
                .map_err(|e| RpcErrorObject::new(CODE_INVALID_PARAMS, e.to_string()))?;
            operator.log_set_level(&subsystem, &level).await?;
            Ok(Value::Null)
        }
        other => Err(RpcErrorObject::new(
            CODE_METHOD_NOT_FOUND,
            format!("method '{other}' not found"),
        )),
    }
}

fn to_result<T: Serialize>(value: T) -> Result<Value, RpcErrorObject> {
    serde_json::to_value(value).map_err(|e| RpcErrorObject::new(CODE_INTERNAL, e.to_string()))
}
