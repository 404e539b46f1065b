//! CircleCI v2 client scoped to one project.

use std::fmt;

use chrono::{DateTime, Utc};
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::CircleCiError;

/// Public CircleCI v2 API root.
pub const DEFAULT_BASE_URL: &str = "https://circleci.com/api/v2/";

/// Pipeline parameters, as declared in the project's `.circleci/config.yml`.
pub type PipelineParameters = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineCreateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    pub parameters: PipelineParameters,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PipelineCreateResponse {
    pub id: String,
    pub state: String,
    pub number: u64,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    message: String,
}

/// A CircleCI API client for a single project.
///
/// `project` is the slug without the VCS prefix, e.g. `filecoin-project/lotus`.
#[derive(Clone)]
pub struct CircleClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
    project: String,
}

impl CircleClient {
    pub fn new(base_url: Url, token: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: with_trailing_slash(base_url),
            token: token.into(),
            project: project.into(),
        }
    }

    /// Reuses an existing connection pool instead of creating a new one.
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// Triggers a new pipeline on `branch`.
    ///
    /// `POST project/gh/{project}/pipeline`
    pub async fn create_pipeline(
        &self,
        branch: &str,
        parameters: PipelineParameters,
    ) -> Result<PipelineCreateResponse, CircleCiError> {
        let body = PipelineCreateRequest {
            branch: Some(branch.to_string()),
            tag: None,
            parameters,
        };
        let path = format!("project/gh/{}/pipeline", self.project);
        self.request(Method::POST, &path, Some(&body)).await
    }

    async fn request<B, R>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<R, CircleCiError>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| CircleCiError::InvalidUrl(format!("{path}: {e}")))?;

        // Never log the token.
        debug!(method = %method, url = %url, "CircleCI request");

        let mut request = self
            .http
            .request(method, url)
            .header("Accept", "application/json")
            .header("Circle-Token", &self.token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        debug!(status = %status, "CircleCI response");

        if !status.is_success() {
            let message = match response.text().await {
                Ok(text) => api_error_message(&text),
                Err(e) => format!("unable to read API response: {e}"),
            };
            return Err(CircleCiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }
}

impl fmt::Debug for CircleClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircleClient")
            .field("base_url", &self.base_url.as_str())
            .field("project", &self.project)
            .field("token", &"**REDACTED**")
            .finish_non_exhaustive()
    }
}

/// Without a trailing slash `Url::join` would replace the last path segment
/// (`/api/v2` + `project` = `/api/project`).
fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn api_error_message(body: &str) -> String {
    if body.trim().is_empty() {
        return String::new();
    }
    match serde_json::from_str::<ApiMessage>(body) {
        Ok(msg) => msg.message,
        Err(e) => format!("unable to parse API response: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, base_path: &str) -> CircleClient {
        let base = Url::parse(&format!("{}{}", server.uri(), base_path)).unwrap();
        CircleClient::new(base, "t0ken", "org/repo")
    }

    fn params() -> PipelineParameters {
        let mut p = PipelineParameters::new();
        p.insert("release".into(), json!("v1.2.3"));
        p
    }

    #[tokio::test]
    async fn create_pipeline_posts_branch_and_parameters() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/project/gh/org/repo/pipeline"))
            .and(header("Circle-Token", "t0ken"))
            .and(body_json(json!({
                "branch": "master",
                "parameters": { "release": "v1.2.3" }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "5034460f-c7c4-4c43-9457-de07e2029e7b",
                "state": "created",
                "number": 25,
                "created_at": "2021-08-01T12:00:00Z"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let resp = client(&server, "/api/v2/")
            .create_pipeline("master", params())
            .await
            .unwrap();

        assert_eq!(resp.number, 25);
        assert_eq!(resp.state, "created");
        assert!(resp.created_at.is_some());
    }

    #[tokio::test]
    async fn base_url_without_trailing_slash_keeps_prefix() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/project/gh/org/repo/pipeline"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "x", "state": "pending", "number": 1, "created_at": null
            })))
            .expect(1)
            .mount(&server)
            .await;

        let c = client(&server, "/api/v2");
        assert!(c.base_url().as_str().ends_with("/api/v2/"));
        c.create_pipeline("main", params()).await.unwrap();
    }

    #[tokio::test]
    async fn api_error_carries_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({ "message": "Project not found" })),
            )
            .mount(&server)
            .await;

        let err = client(&server, "/api/v2/")
            .create_pipeline("master", params())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CircleCiError::Api { status: 404, ref message } if message == "Project not found"
        ));
    }

    #[tokio::test]
    async fn api_error_with_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = client(&server, "/api/v2/")
            .create_pipeline("master", params())
            .await
            .unwrap_err();

        assert!(matches!(err, CircleCiError::Api { status: 401, ref message } if message.is_empty()));
    }

    #[tokio::test]
    async fn truncated_error_body_is_reported() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.ends_with(b"}") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            // Promise more body than is sent, then hang up.
            socket
                .write_all(b"HTTP/1.1 502 Bad Gateway\r\ncontent-length: 100\r\n\r\n{\"mess")
                .await
                .unwrap();
        });

        let base = Url::parse(&format!("http://{addr}/api/v2/")).unwrap();
        let err = CircleClient::new(base, "t0ken", "org/repo")
            .create_pipeline("master", params())
            .await
            .unwrap_err();

        assert!(
            matches!(
                err,
                CircleCiError::Api { status: 502, ref message }
                    if message.starts_with("unable to read API response")
            ),
            "{err:?}"
        );
    }

    #[test]
    fn non_json_error_body_is_described() {
        assert!(api_error_message("<html>").starts_with("unable to parse API response"));
        assert_eq!(api_error_message("  "), "");
    }

    #[test]
    fn debug_output_redacts_token() {
        let c = CircleClient::new(Url::parse(DEFAULT_BASE_URL).unwrap(), "s3cr3t", "org/repo");
        let out = format!("{c:?}");
        assert!(!out.contains("s3cr3t"));
        assert!(out.contains("REDACTED"));
    }
}
