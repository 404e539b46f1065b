//! Operator control plane.
//!
//! A small JSON-RPC 2.0 API served on the operator listener, separate from
//! journey traffic. It reports the build version and lets an operator list
//! log subsystems and change their levels without a restart.
//!
//! [`OperatorImpl`] serves the calls in-process; [`OperatorClient`] makes the
//! same calls over HTTP and backs the `operator` CLI subcommand.

mod client;
mod rpc;

use std::future::Future;

use thiserror::Error;
use tracing::info;

use crate::logging::{LogControl, LogError};

pub use client::{DEFAULT_OPERATOR_API, OperatorClient};
pub use rpc::{
    METHOD_LOG_LIST, METHOD_LOG_SET_LEVEL, METHOD_VERSION, RPC_PATH, RpcErrorObject, RpcRequest,
    RpcResponse, rpc_router,
};

#[derive(Debug, Error)]
pub enum OperatorError {
    #[error(transparent)]
    Log(#[from] LogError),

    #[error("invalid operator API url: {0}")]
    InvalidUrl(String),

    #[error("operator API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("operator API error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("unexpected operator API result: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Calls available on the operator API.
pub trait Operator: Send + Sync {
    fn version(&self) -> impl Future<Output = Result<String, OperatorError>> + Send;

    /// Known log subsystems, sorted.
    fn log_list(&self) -> impl Future<Output = Result<Vec<String>, OperatorError>> + Send;

    fn log_set_level(
        &self,
        subsystem: &str,
        level: &str,
    ) -> impl Future<Output = Result<(), OperatorError>> + Send;
}

/// The in-process operator, backed by the running service's log control.
pub struct OperatorImpl {
    log: LogControl,
}

impl OperatorImpl {
    pub fn new(log: LogControl) -> Self {
        OperatorImpl { log }
    }
}

impl Operator for OperatorImpl {
    async fn version(&self) -> Result<String, OperatorError> {
        Ok(crate::VERSION.to_string())
    }

    async fn log_list(&self) -> Result<Vec<String>, OperatorError> {
        Ok(self.log.subsystems())
    }

    async fn log_set_level(&self, subsystem: &str, level: &str) -> Result<(), OperatorError> {
        self.log.set_level(subsystem, level)?;
        info!(subsystem, level, "Log level changed");
        Ok(())
    }
}
