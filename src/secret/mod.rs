//! File-backed secrets with time-based rotation.
//!
//! A [`FileSecretLoader`] caches the bytes of a secret file and re-reads the
//! file at most once per expiry period. Rotating a secret is therefore just a
//! matter of replacing the file; the new value is picked up within one period
//! without restarting the process.
//!
//! Time is measured with [`tokio::time::Instant`], so tests can pause and
//! advance the clock.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

/// How long a loaded secret is trusted before the file is read again.
pub const DEFAULT_EXPIRY_PERIOD: Duration = Duration::from_secs(15);

/// Errors from loading a secret.
///
/// Neither variant carries the secret value.
#[derive(Debug, Error)]
pub enum SecretError {
    /// The secret file does not exist (not yet provisioned, or removed).
    #[error("secret not found at {}", path.display())]
    NotFound { path: PathBuf },

    /// The secret file exists but holds no bytes (not yet provisioned, or
    /// truncated mid-rotation).
    #[error("secret at {} is empty", path.display())]
    Empty { path: PathBuf },

    /// The secret file exists but could not be read.
    #[error("failed to read secret at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Source of a rotating secret.
pub trait SecretLoader: Send + Sync {
    /// Returns the current secret and whether it differs from the value
    /// returned by the previous successful call.
    fn get(&self) -> Result<(bool, Vec<u8>), SecretError>;
}

/// A [`SecretLoader`] that reads a file and caches it for `expiry_period`.
#[derive(Debug)]
pub struct FileSecretLoader {
    path: PathBuf,
    expiry_period: Duration,
    state: Mutex<SecretState>,
}

#[derive(Debug, Default)]
struct SecretState {
    current: Vec<u8>,

    /// `None` until the first successful load.
    deadline: Option<Instant>,
}

impl FileSecretLoader {
    /// Creates a loader for `path`. Nothing is read until the first [`get`].
    ///
    /// [`get`]: SecretLoader::get
    pub fn new(path: impl Into<PathBuf>, expiry_period: Duration) -> Self {
        FileSecretLoader {
            path: path.into(),
            expiry_period,
            state: Mutex::new(SecretState::default()),
        }
    }

    /// Creates a loader with [`DEFAULT_EXPIRY_PERIOD`].
    pub fn with_default_expiry(path: impl Into<PathBuf>) -> Self {
        Self::new(path, DEFAULT_EXPIRY_PERIOD)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn expiry_period(&self) -> Duration {
        self.expiry_period
    }

    fn read(&self) -> Result<Vec<u8>, SecretError> {
        let secret = std::fs::read(&self.path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => SecretError::NotFound {
                path: self.path.clone(),
            },
            _ => SecretError::Io {
                path: self.path.clone(),
                source,
            },
        })?;
        if secret.is_empty() {
            return Err(SecretError::Empty {
                path: self.path.clone(),
            });
        }
        Ok(secret)
    }
}

impl SecretLoader for FileSecretLoader {
    fn get(&self) -> Result<(bool, Vec<u8>), SecretError> {
        // A panic while holding the lock cannot leave the state half-written:
        // `current` and `deadline` are only assigned after a successful read.
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let now = Instant::now();
        if state.deadline.is_some_and(|deadline| now < deadline) {
            return Ok((false, state.current.clone()));
        }

        let secret = match self.read() {
            Ok(secret) => secret,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to reload secret");
                return Err(e);
            }
        };

        let changed = secret != state.current;
        if changed {
            debug!(path = %self.path.display(), "Secret value changed");
        }

        state.current = secret;
        state.deadline = Some(now + self.expiry_period);

        Ok((changed, state.current.clone()))
    }
}
