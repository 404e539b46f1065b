//! Liveness and readiness probes, served on the operator listener.

use std::sync::{Arc, PoisonError, RwLock};

use axum::extract::State;
use axum::http::StatusCode;

/// Shared readiness flag.
///
/// Set once the service router has been built, cleared when shutdown starts
/// so load balancers stop sending traffic before the listener closes.
#[derive(Clone, Debug, Default)]
pub struct Readiness(Arc<RwLock<bool>>);

impl Readiness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ready(&self) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = true;
    }

    pub fn set_not_ready(&self) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = false;
    }

    pub fn is_ready(&self) -> bool {
        *self.0.read().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Always 200 while the process is serving.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// 200 when ready, 503 otherwise.
pub async fn readiness_handler(State(readiness): State<Readiness>) -> StatusCode {
    if readiness.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
