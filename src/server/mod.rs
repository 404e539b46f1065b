//! HTTP surface of the relay.
//!
//! Two routers are built here:
//!
//! - The service router mounts every enabled journey from the service
//!   config at its `RoutePath`.
//! - The operator router carries the JSON-RPC control API plus
//!   `GET /liveness` and `GET /readiness`.
//!
//! A journey that cannot be set up (unknown name, bad config, unusable route)
//! is logged and skipped; the rest of the service still comes up.

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use crate::config::{JourneyConfig, ServiceConfig};
use crate::operator::{Operator, rpc_router};
use crate::registry::Registry;

pub mod health;
pub mod webhook;

pub use health::{Readiness, liveness_handler, readiness_handler};
pub use webhook::{EventHandler, HandlerError, WebhookError, WebhookJourney};

/// The journey host: a registry of journey kinds plus the readiness flag the
/// operator router reports.
pub struct JourneyService {
    registry: Registry,
    readiness: Readiness,
}

impl JourneyService {
    pub fn new(registry: Registry) -> Self {
        JourneyService {
            registry,
            readiness: Readiness::new(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn readiness(&self) -> &Readiness {
        &self.readiness
    }

    /// Builds the service router and marks the service ready.
    pub fn setup_service(&self, config: &ServiceConfig) -> Router {
        let mut router = Router::new();
        let mut mounted = BTreeSet::new();

        for journey in &config.journeys {
            if !journey.enabled {
                debug!(journey_name = %journey.name, "Journey disabled");
                continue;
            }
            if mounted.contains(&journey.route_path) {
                error!(
                    journey_name = %journey.name,
                    route_path = %journey.route_path,
                    "Route already taken by another journey"
                );
                continue;
            }
            if let Some(route) = self.build_journey(journey) {
                router = router.route(&journey.route_path, route);
                mounted.insert(journey.route_path.clone());
                info!(
                    journey_name = %journey.name,
                    route_path = %journey.route_path,
                    "Journey mounted"
                );
            }
        }

        for route in &mounted {
            debug!(route = %route, "Route");
        }

        self.readiness.set_ready();
        router.layer(TraceLayer::new_for_http())
    }

    fn build_journey(&self, journey: &JourneyConfig) -> Option<axum::routing::MethodRouter> {
        if let Err(reason) = validate_route_path(&journey.route_path) {
            error!(
                journey_name = %journey.name,
                route_path = %journey.route_path,
                reason,
                "Invalid route path"
            );
            return None;
        }

        let entry = match self.registry.get(&journey.name) {
            Ok(entry) => entry,
            Err(e) => {
                error!(journey_name = %journey.name, error = %e, "Failed to find journey");
                return None;
            }
        };

        match entry.construct(journey) {
            Ok(route) => Some(route),
            Err(e) => {
                error!(journey_name = %journey.name, error = %e, "Failed to construct journey");
                None
            }
        }
    }

    /// Builds the operator router: JSON-RPC API and health probes.
    pub fn operator_router<O: Operator + 'static>(&self, operator: Arc<O>) -> Router {
        let probes = Router::new()
            .route("/liveness", get(liveness_handler))
            .route("/readiness", get(readiness_handler))
            .with_state(self.readiness.clone());
        rpc_router(operator).merge(probes)
    }

    /// Marks the service not ready. Called first on shutdown.
    pub fn shutdown(&self) {
        self.readiness.set_not_ready();
        info!("Service no longer ready");
    }
}

/// Journey routes are plain absolute paths; no captures or wildcards.
fn validate_route_path(path: &str) -> Result<(), &'static str> {
    if !path.starts_with('/') {
        return Err("must start with '/'");
    }
    if path.contains(['{', '}']) {
        return Err("must not contain path parameters");
    }
    if path
        .split('/')
        .any(|segment| segment.starts_with(':') || segment.starts_with('*'))
    {
        return Err("must not contain path parameters");
    }
    Ok(())
}
