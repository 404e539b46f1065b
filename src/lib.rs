//! journey-relay - hosts pluggable "journeys" behind HTTP routes.
//!
//! A journey is a small service mounted at its own path. Webhook journeys
//! authenticate GitHub deliveries against a rotating secret, parse them into
//! typed events and act on them, e.g. starting a CircleCI pipeline when a
//! release is published.

pub mod circleci;
pub mod config;
pub mod journeys;
pub mod logging;
pub mod operator;
pub mod registry;
pub mod secret;
pub mod server;
pub mod webhooks;

/// Version reported by the operator API.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
