//! CircleCI API client.
//!
//! Only pipeline creation is implemented; that is all a journey needs to kick
//! off a workflow. Errors are returned as-is, with no retry.

mod client;
mod error;

pub use client::{
    CircleClient, DEFAULT_BASE_URL, PipelineCreateRequest, PipelineCreateResponse,
    PipelineParameters,
};
pub use error::CircleCiError;
