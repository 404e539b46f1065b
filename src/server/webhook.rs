//! Webhook authentication and dispatch.
//!
//! [`WebhookJourney`] wraps an [`EventHandler`] with everything a journey
//! needs to accept GitHub deliveries. Each request goes through these steps,
//! and stops at the first one that fails:
//!
//! 1. Load the webhook secret (rotating, see [`crate::secret`]): 500 on failure
//! 2. Verify `X-Hub-Signature-256` over the raw body: 400 on failure
//! 3. Parse the body according to `X-GitHub-Event`: 400 on failure
//! 4. Hand the typed event to the handler: 200, or 400 for events the
//!    handler does not handle, or 500 for any other handler error
//!
//! Parsing never happens before the signature has been checked, and the
//! handler never sees an event that failed to parse.

use std::error::Error as StdError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodRouter, post};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::JourneyConfig;
use crate::secret::{FileSecretLoader, SecretError, SecretLoader};
use crate::webhooks::{GitHubEvent, ParseError, SignatureError, parse_webhook, verify_signature};

/// Header name for GitHub event type.
pub const HEADER_EVENT: &str = "x-github-event";
/// Header name for GitHub delivery ID.
pub const HEADER_DELIVERY: &str = "x-github-delivery";
/// Header name for GitHub signature.
pub const HEADER_SIGNATURE: &str = "x-hub-signature-256";

/// Upper bound on how long a handler may run for one delivery.
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Business logic of a webhook-driven journey.
pub trait EventHandler: Send + Sync + 'static {
    /// Acts on one authenticated event.
    ///
    /// Return [`HandlerError::Unhandled`] for events this journey has no logic
    /// for; the delivery is then answered with 400 rather than 500.
    fn handle_event(
        &self,
        event: GitHubEvent,
    ) -> impl Future<Output = Result<(), HandlerError>> + Send;
}

/// Errors returned by an [`EventHandler`].
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The event is valid and authentic but this journey ignores it.
    #[error("event not handled")]
    Unhandled,

    /// A secret the handler needs could not be loaded.
    #[error(transparent)]
    Secret(#[from] SecretError),

    /// Any other failure, typically from a downstream API.
    #[error(transparent)]
    Failed(Box<dyn StdError + Send + Sync>),
}

impl HandlerError {
    pub fn failed(err: impl StdError + Send + Sync + 'static) -> Self {
        HandlerError::Failed(Box::new(err))
    }
}

/// Errors that terminate a webhook request.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("webhook secret unavailable: {0}")]
    Secret(#[source] SecretError),

    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    #[error("invalid signature: {0}")]
    InvalidSignature(#[from] SignatureError),

    #[error("unparseable payload: {0}")]
    Parse(#[from] ParseError),

    #[error("event not handled")]
    Unhandled,

    #[error("handler failed: {0}")]
    Handler(#[source] HandlerError),

    #[error("handler timed out after {0:?}")]
    Timeout(Duration),
}

impl WebhookError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebhookError::Secret(_) => StatusCode::INTERNAL_SERVER_ERROR,
            WebhookError::MissingHeader(_) => StatusCode::BAD_REQUEST,
            WebhookError::InvalidSignature(_) => StatusCode::BAD_REQUEST,
            WebhookError::Parse(_) => StatusCode::BAD_REQUEST,
            WebhookError::Unhandled => StatusCode::BAD_REQUEST,
            WebhookError::Handler(_) => StatusCode::INTERNAL_SERVER_ERROR,
            WebhookError::Timeout(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        // Status only: error details stay in the logs.
        self.status().into_response()
    }
}

impl From<HandlerError> for WebhookError {
    fn from(err: HandlerError) -> Self {
        match err {
            HandlerError::Unhandled => WebhookError::Unhandled,
            other => WebhookError::Handler(other),
        }
    }
}

/// A journey that authenticates GitHub webhooks and forwards them to `H`.
pub struct WebhookJourney<H> {
    name: String,
    secret: Box<dyn SecretLoader>,
    handler: H,
    dispatch_timeout: Duration,
}

impl<H: EventHandler> WebhookJourney<H> {
    pub fn new(name: impl Into<String>, secret: impl SecretLoader + 'static, handler: H) -> Self {
        WebhookJourney {
            name: name.into(),
            secret: Box::new(secret),
            handler,
            dispatch_timeout: DEFAULT_DISPATCH_TIMEOUT,
        }
    }

    /// Builds a journey whose webhook secret is read from
    /// [`JourneyConfig::secret_path`].
    pub fn from_config(common: &JourneyConfig, handler: H) -> Self {
        Self::new(
            common.name.clone(),
            FileSecretLoader::with_default_expiry(&common.secret_path),
            handler,
        )
    }

    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// A `POST` route serving this journey.
    pub fn into_method_router(self) -> MethodRouter {
        post(webhook_handler::<H>).with_state(Arc::new(self))
    }

    /// Runs one delivery through authentication, parsing and dispatch.
    pub async fn process(&self, headers: &HeaderMap, body: &[u8]) -> Result<(), WebhookError> {
        let delivery_id = header_str(headers, HEADER_DELIVERY).unwrap_or("-");

        // The secret is never logged, only its loader's errors.
        let (_, secret) = self.secret.get().map_err(|e| {
            error!(journey_name = %self.name, error = %e, "Failed to load webhook secret");
            WebhookError::Secret(e)
        })?;

        let signature = header_str(headers, HEADER_SIGNATURE).ok_or_else(|| {
            warn!(journey_name = %self.name, delivery_id, "Missing webhook signature");
            WebhookError::MissingHeader(HEADER_SIGNATURE)
        })?;

        if let Err(e) = verify_signature(body, signature, &secret) {
            warn!(journey_name = %self.name, delivery_id, error = %e, "Failed to validate webhook");
            return Err(e.into());
        }

        let event_type = header_str(headers, HEADER_EVENT).ok_or_else(|| {
            error!(journey_name = %self.name, delivery_id, "Missing webhook event type");
            WebhookError::MissingHeader(HEADER_EVENT)
        })?;

        let event = parse_webhook(event_type, body).map_err(|e| {
            error!(
                journey_name = %self.name,
                webhook_type = event_type,
                delivery_id,
                error = %e,
                "Failed to parse incoming webhook"
            );
            WebhookError::Parse(e)
        })?;

        info!(
            journey_name = %self.name,
            webhook_type = event_type,
            delivery_id,
            "Incoming webhook"
        );

        let outcome = tokio::time::timeout(self.dispatch_timeout, self.handler.handle_event(event))
            .await
            .map_err(|_| WebhookError::Timeout(self.dispatch_timeout))
            .and_then(|result| result.map_err(WebhookError::from));

        match &outcome {
            Ok(()) => debug!(journey_name = %self.name, delivery_id, "Webhook handled"),
            Err(WebhookError::Unhandled) => warn!(
                journey_name = %self.name,
                webhook_type = event_type,
                delivery_id,
                "Unhandled event"
            ),
            Err(e) => warn!(journey_name = %self.name, delivery_id, error = %e, "Unhandled error"),
        }

        outcome
    }
}

async fn webhook_handler<H: EventHandler>(
    State(journey): State<Arc<WebhookJourney<H>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, WebhookError> {
    journey.process(&headers, &body).await?;
    Ok(StatusCode::OK)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
