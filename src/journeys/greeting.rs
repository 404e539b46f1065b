//! `greeting`: answers every request with a fixed body.
//!
//! Useful as a smoke test for routing. It is not a webhook journey, so no
//! signature is checked.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{MethodRouter, any};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::JourneyConfig;
use crate::registry::{Journey, JourneyError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct GreetingConfig {
    /// Body returned on every request.
    pub response: String,
}

impl Default for GreetingConfig {
    fn default() -> Self {
        GreetingConfig {
            response: "Save Travels!".to_string(),
        }
    }
}

pub struct Greeting;

impl Journey for Greeting {
    const NAME: &'static str = "greeting";
    type Config = GreetingConfig;

    fn build(common: &JourneyConfig, config: GreetingConfig) -> Result<MethodRouter, JourneyError> {
        let state = GreetingState {
            journey_name: Arc::from(common.name.as_str()),
            response: Arc::from(config.response),
        };
        Ok(any(greet).with_state(state))
    }
}

#[derive(Clone)]
struct GreetingState {
    journey_name: Arc<str>,
    response: Arc<str>,
}

async fn greet(State(state): State<GreetingState>) -> (StatusCode, String) {
    info!(journey_name = %state.journey_name, "New request");
    (StatusCode::OK, state.response.to_string())
}
