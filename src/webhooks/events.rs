//! Typed GitHub webhook events.
//!
//! Only the event kinds a journey can act on are modelled. Anything else is
//! rejected by the parser before a journey sees it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A repository identifier (`owner/name`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoId {
    pub owner: String,
    pub name: String,
}

impl RepoId {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        RepoId {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// A parsed, authenticated webhook event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GitHubEvent {
    /// A release was created, published, edited, etc.
    Release(ReleaseEvent),

    /// Commits or tags were pushed.
    Push(PushEvent),

    /// Sent once when a webhook is first configured.
    Ping(PingEvent),
}

impl GitHubEvent {
    /// The `X-GitHub-Event` value this event was parsed from.
    pub fn kind(&self) -> &'static str {
        match self {
            GitHubEvent::Release(_) => "release",
            GitHubEvent::Push(_) => "push",
            GitHubEvent::Ping(_) => "ping",
        }
    }
}

/// Action performed on a release.
///
/// See <https://docs.github.com/en/webhooks/webhook-events-and-payloads#release>.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseAction {
    Created,
    Deleted,
    Edited,
    /// A pre-release was published.
    Prereleased,
    Published,
    /// A full release was published, or a pre-release promoted to release.
    Released,
    Unpublished,
}

impl ReleaseAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseAction::Created => "created",
            ReleaseAction::Deleted => "deleted",
            ReleaseAction::Edited => "edited",
            ReleaseAction::Prereleased => "prereleased",
            ReleaseAction::Published => "published",
            ReleaseAction::Released => "released",
            ReleaseAction::Unpublished => "unpublished",
        }
    }
}

impl fmt::Display for ReleaseAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `release` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseEvent {
    pub repo: RepoId,
    pub action: ReleaseAction,
    pub release: Release,
}

/// The release object carried by a `release` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub id: u64,

    /// The git tag the release points at (e.g. `v1.2.3`).
    pub tag_name: String,

    /// Display name; GitHub sends `null` when unset.
    pub name: Option<String>,

    pub prerelease: bool,
    pub draft: bool,
}

/// A `push` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEvent {
    pub repo: RepoId,

    /// Full ref that was pushed, e.g. `refs/heads/master` or `refs/tags/v1.0.0`.
    pub git_ref: String,

    pub before: String,
    pub after: String,
    pub deleted: bool,
    pub pusher: Option<String>,
}

impl PushEvent {
    /// The tag name when this push created or moved a tag.
    pub fn tag(&self) -> Option<&str> {
        self.git_ref.strip_prefix("refs/tags/")
    }

    /// The branch name when this push updated a branch.
    pub fn branch(&self) -> Option<&str> {
        self.git_ref.strip_prefix("refs/heads/")
    }
}

/// A `ping` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingEvent {
    pub hook_id: u64,
    pub zen: String,

    /// Absent for organization-level hooks.
    pub repo: Option<RepoId>,
}
