//! `lotus`: launches the release automation pipeline on CircleCI when a
//! release is published on GitHub.
//!
//! Only `release` events with action `released` or `prereleased` trigger a
//! pipeline. The CircleCI token is a rotating secret, read from
//! `CircleTokenPath` the same way the webhook secret is.

use std::path::PathBuf;

use axum::routing::MethodRouter;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::circleci::{CircleClient, DEFAULT_BASE_URL, PipelineParameters};
use crate::config::JourneyConfig;
use crate::registry::{Journey, JourneyError};
use crate::secret::{FileSecretLoader, SecretLoader};
use crate::server::webhook::{EventHandler, HandlerError, WebhookJourney};
use crate::webhooks::{GitHubEvent, ReleaseAction, ReleaseEvent};

/// Release actions that trigger a pipeline.
const TRIGGER_ACTIONS: [ReleaseAction; 2] = [ReleaseAction::Released, ReleaseAction::Prereleased];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LotusConfig {
    /// Git branch the pipeline is created on.
    pub pipeline_branch: String,

    /// File holding the CircleCI API token.
    pub circle_token_path: PathBuf,

    /// CircleCI API root; overridden in tests.
    #[serde(rename = "CircleBaseURL")]
    pub circle_base_url: String,

    /// Project slug, e.g. `filecoin-project/lotus-infra`.
    pub circle_project: String,

    /// Value of the `api_workflow_requested` pipeline parameter.
    pub pipeline_workflow: String,
}

impl Default for LotusConfig {
    fn default() -> Self {
        LotusConfig {
            pipeline_branch: "master".to_string(),
            circle_token_path: PathBuf::new(),
            circle_base_url: DEFAULT_BASE_URL.to_string(),
            circle_project: "filecoin-project/lotus-infra".to_string(),
            pipeline_workflow: "api-lotus-release-automation".to_string(),
        }
    }
}

pub struct Lotus {
    circle_token: Box<dyn SecretLoader>,
    http: reqwest::Client,
    circle_base_url: Url,
    circle_project: String,
    pipeline_branch: String,
    pipeline_workflow: String,
}

impl Lotus {
    pub fn new(config: LotusConfig) -> Result<Self, JourneyError> {
        let circle_base_url =
            Url::parse(&config.circle_base_url).map_err(|e| JourneyError::InvalidConfig {
                field: "CircleBaseURL",
                reason: e.to_string(),
            })?;

        if config.circle_project.split('/').filter(|s| !s.is_empty()).count() != 2 {
            return Err(JourneyError::InvalidConfig {
                field: "CircleProject",
                reason: format!("expected owner/repo, got {:?}", config.circle_project),
            });
        }

        Ok(Lotus {
            circle_token: Box::new(FileSecretLoader::with_default_expiry(
                config.circle_token_path,
            )),
            http: reqwest::Client::new(),
            circle_base_url,
            circle_project: config.circle_project,
            pipeline_branch: config.pipeline_branch,
            pipeline_workflow: config.pipeline_workflow,
        })
    }

    async fn process_release_event(&self, event: ReleaseEvent) -> Result<(), HandlerError> {
        debug!(
            github_release_name = event.release.name.as_deref().unwrap_or(""),
            github_tag_name = %event.release.tag_name,
            github_prerelease = event.release.prerelease,
            action = %event.action,
            "Processing release event"
        );

        if !TRIGGER_ACTIONS.contains(&event.action) {
            return Err(HandlerError::Unhandled);
        }

        let (_, token) = self.circle_token.get().map_err(|e| {
            warn!(error = %e, "Failed to load circle token");
            HandlerError::from(e)
        })?;
        let token = String::from_utf8_lossy(&token).trim().to_string();

        let client = CircleClient::new(self.circle_base_url.clone(), token, &self.circle_project)
            .with_http_client(self.http.clone());

        let mut parameters = PipelineParameters::new();
        parameters.insert(
            "api_workflow_requested".to_string(),
            json!(self.pipeline_workflow),
        );
        parameters.insert("release".to_string(), json!(event.release.tag_name));

        let resp = client
            .create_pipeline(&self.pipeline_branch, parameters)
            .await
            .map_err(HandlerError::failed)?;

        info!(
            circleci_pipeline_id = %resp.id,
            circleci_pipeline_number = resp.number,
            github_tag_name = %event.release.tag_name,
            github_prerelease = event.release.prerelease,
            "Pipeline created"
        );

        Ok(())
    }
}

impl EventHandler for Lotus {
    async fn handle_event(&self, event: GitHubEvent) -> Result<(), HandlerError> {
        match event {
            GitHubEvent::Release(release) => self.process_release_event(release).await,
            GitHubEvent::Push(_) | GitHubEvent::Ping(_) => Err(HandlerError::Unhandled),
        }
    }
}

impl Journey for Lotus {
    const NAME: &'static str = "lotus";
    type Config = LotusConfig;

    fn build(common: &JourneyConfig, config: LotusConfig) -> Result<MethodRouter, JourneyError> {
        let handler = Lotus::new(config)?;
        Ok(WebhookJourney::from_config(common, handler).into_method_router())
    }
}
