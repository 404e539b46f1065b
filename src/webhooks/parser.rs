//! Webhook payload parser.
//!
//! Turns an authenticated raw payload into a [`GitHubEvent`]. The event kind
//! comes from the `X-GitHub-Event` header; the body is decoded into loosely
//! typed raw structs first and then validated into the public event types.
//!
//! Callers must only parse payloads whose signature has already been checked.

use serde::Deserialize;
use thiserror::Error;

use super::events::{
    GitHubEvent, PingEvent, PushEvent, Release, ReleaseAction, ReleaseEvent, RepoId,
};

/// Error type for webhook parsing failures.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The `X-GitHub-Event` value names an event kind we do not model.
    #[error("unsupported event kind: {0}")]
    UnsupportedEvent(String),

    /// JSON deserialization failed (includes missing required fields).
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// A field had a value outside the documented set.
    #[error("invalid field value for {field}: {value}")]
    InvalidField { field: &'static str, value: String },
}

/// Parses a webhook payload into a typed event.
///
/// ```
/// use journey_relay::webhooks::{GitHubEvent, parse_webhook};
///
/// let payload = br#"{
///     "action": "released",
///     "release": { "id": 1, "tag_name": "v1.2.3", "name": null, "prerelease": false, "draft": false },
///     "repository": { "name": "lotus", "owner": { "login": "filecoin-project" } }
/// }"#;
///
/// match parse_webhook("release", payload).unwrap() {
///     GitHubEvent::Release(e) => assert_eq!(e.release.tag_name, "v1.2.3"),
///     other => panic!("unexpected event {other:?}"),
/// }
/// ```
pub fn parse_webhook(event_type: &str, payload: &[u8]) -> Result<GitHubEvent, ParseError> {
    match event_type {
        "release" => parse_release(payload).map(GitHubEvent::Release),
        "push" => parse_push(payload).map(GitHubEvent::Push),
        "ping" => parse_ping(payload).map(GitHubEvent::Ping),
        other => Err(ParseError::UnsupportedEvent(other.to_string())),
    }
}

#[derive(Debug, Deserialize)]
struct RawRepository {
    owner: RawOwner,
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawOwner {
    login: String,
}

impl From<RawRepository> for RepoId {
    fn from(raw: RawRepository) -> Self {
        RepoId::new(raw.owner.login, raw.name)
    }
}

// ─── release ───

#[derive(Debug, Deserialize)]
struct RawReleasePayload {
    action: String,
    release: RawRelease,
    repository: RawRepository,
}

#[derive(Debug, Deserialize)]
struct RawRelease {
    id: u64,
    tag_name: String,
    name: Option<String>,
    #[serde(default)]
    prerelease: bool,
    #[serde(default)]
    draft: bool,
}

fn parse_release(payload: &[u8]) -> Result<ReleaseEvent, ParseError> {
    let raw: RawReleasePayload = serde_json::from_slice(payload)?;

    let action = match raw.action.as_str() {
        "created" => ReleaseAction::Created,
        "deleted" => ReleaseAction::Deleted,
        "edited" => ReleaseAction::Edited,
        // Older deliveries and some tooling spell this without the trailing "d".
        "prereleased" | "prerelease" => ReleaseAction::Prereleased,
        "published" => ReleaseAction::Published,
        "released" => ReleaseAction::Released,
        "unpublished" => ReleaseAction::Unpublished,
        other => {
            return Err(ParseError::InvalidField {
                field: "action",
                value: other.to_string(),
            });
        }
    };

    Ok(ReleaseEvent {
        repo: raw.repository.into(),
        action,
        release: Release {
            id: raw.release.id,
            tag_name: raw.release.tag_name,
            name: raw.release.name.filter(|n| !n.is_empty()),
            prerelease: raw.release.prerelease,
            draft: raw.release.draft,
        },
    })
}

// ─── push ───

#[derive(Debug, Deserialize)]
struct RawPushPayload {
    #[serde(rename = "ref")]
    git_ref: String,
    before: String,
    after: String,
    #[serde(default)]
    deleted: bool,
    pusher: Option<RawPusher>,
    repository: RawRepository,
}

#[derive(Debug, Deserialize)]
struct RawPusher {
    name: String,
}

fn parse_push(payload: &[u8]) -> Result<PushEvent, ParseError> {
    let raw: RawPushPayload = serde_json::from_slice(payload)?;

    if !raw.git_ref.starts_with("refs/") {
        return Err(ParseError::InvalidField {
            field: "ref",
            value: raw.git_ref,
        });
    }

    Ok(PushEvent {
        repo: raw.repository.into(),
        git_ref: raw.git_ref,
        before: raw.before,
        after: raw.after,
        deleted: raw.deleted,
        pusher: raw.pusher.map(|p| p.name),
    })
}

// ─── ping ───

#[derive(Debug, Deserialize)]
struct RawPingPayload {
    hook_id: u64,
    zen: String,
    repository: Option<RawRepository>,
}

fn parse_ping(payload: &[u8]) -> Result<PingEvent, ParseError> {
    let raw: RawPingPayload = serde_json::from_slice(payload)?;

    Ok(PingEvent {
        hook_id: raw.hook_id,
        zen: raw.zen,
        repo: raw.repository.map(Into::into),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn release_payload(action: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "action": action,
            "release": {
                "id": 42,
                "tag_name": "v1.2.3",
                "name": "",
                "prerelease": true,
                "draft": false,
                "body": "ignored"
            },
            "repository": {
                "name": "lotus",
                "full_name": "filecoin-project/lotus",
                "owner": { "login": "filecoin-project" }
            },
            "sender": { "login": "octocat" }
        }))
        .unwrap()
    }

    #[test]
    fn release_event_is_parsed() {
        let event = parse_webhook("release", &release_payload("prereleased")).unwrap();
        let GitHubEvent::Release(release) = event else {
            panic!("expected release event");
        };
        assert_eq!(release.action, ReleaseAction::Prereleased);
        assert_eq!(release.repo, RepoId::new("filecoin-project", "lotus"));
        assert_eq!(release.release.tag_name, "v1.2.3");
        assert!(release.release.prerelease);
        // Empty names are normalised to None.
        assert_eq!(release.release.name, None);
    }

    #[test]
    fn prerelease_spelling_is_accepted() {
        let event = parse_webhook("release", &release_payload("prerelease")).unwrap();
        assert!(matches!(
            event,
            GitHubEvent::Release(ReleaseEvent {
                action: ReleaseAction::Prereleased,
                ..
            })
        ));
    }

    #[test]
    fn unknown_release_action_is_invalid() {
        let err = parse_webhook("release", &release_payload("exploded")).unwrap_err();
        assert!(matches!(
            err,
            ParseError::InvalidField { field: "action", ref value } if value == "exploded"
        ));
    }

    #[test]
    fn release_without_tag_is_json_error() {
        let payload = json!({
            "action": "released",
            "release": { "id": 1 },
            "repository": { "name": "r", "owner": { "login": "o" } }
        });
        let err = parse_webhook("release", &serde_json::to_vec(&payload).unwrap()).unwrap_err();
        assert!(matches!(err, ParseError::Json(_)));
    }

    #[test]
    fn push_event_is_parsed() {
        let payload = json!({
            "ref": "refs/tags/v0.9.0",
            "before": "0000000000000000000000000000000000000000",
            "after": "b7c0a5b1b7c0a5b1b7c0a5b1b7c0a5b1b7c0a5b1",
            "created": true,
            "deleted": false,
            "pusher": { "name": "octocat", "email": "octocat@example.com" },
            "repository": { "name": "lotus", "owner": { "login": "filecoin-project" } }
        });
        let event = parse_webhook("push", &serde_json::to_vec(&payload).unwrap()).unwrap();
        let GitHubEvent::Push(push) = event else {
            panic!("expected push event");
        };
        assert_eq!(push.tag(), Some("v0.9.0"));
        assert_eq!(push.pusher.as_deref(), Some("octocat"));
        assert!(!push.deleted);
    }

    #[test]
    fn push_with_bare_ref_is_invalid() {
        let payload = json!({
            "ref": "master",
            "before": "a",
            "after": "b",
            "repository": { "name": "r", "owner": { "login": "o" } }
        });
        let err = parse_webhook("push", &serde_json::to_vec(&payload).unwrap()).unwrap_err();
        assert!(matches!(err, ParseError::InvalidField { field: "ref", .. }));
    }

    #[test]
    fn org_ping_has_no_repository() {
        let payload = json!({ "hook_id": 7, "zen": "Anything added dilutes everything else." });
        let event = parse_webhook("ping", &serde_json::to_vec(&payload).unwrap()).unwrap();
        assert_eq!(
            event,
            GitHubEvent::Ping(PingEvent {
                hook_id: 7,
                zen: "Anything added dilutes everything else.".to_string(),
                repo: None,
            })
        );
    }

    #[test]
    fn unmodelled_kinds_are_unsupported() {
        let err = parse_webhook("issue_comment", b"{}").unwrap_err();
        assert!(matches!(err, ParseError::UnsupportedEvent(ref k) if k == "issue_comment"));
    }

    #[test]
    fn non_json_body_is_rejected() {
        assert!(matches!(
            parse_webhook("release", b"action=released"),
            Err(ParseError::Json(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_parser_never_panics(kind in "release|push|ping|[a-z_]{1,12}", body: Vec<u8>) {
            let _ = parse_webhook(&kind, &body);
        }
    }
}
