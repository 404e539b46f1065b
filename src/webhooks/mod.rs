//! GitHub webhook primitives.
//!
//! - Signature verification (HMAC-SHA256 over the raw body)
//! - Typed events and the payload parser

pub mod events;
pub mod parser;
pub mod signature;

pub use events::{
    GitHubEvent, PingEvent, PushEvent, Release, ReleaseAction, ReleaseEvent, RepoId,
};
pub use parser::{ParseError, parse_webhook};
pub use signature::{
    SignatureError, compute_signature, format_signature_header, parse_signature_header,
    verify_signature,
};
