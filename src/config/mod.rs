//! TOML configuration.
//!
//! The service config lists the journeys to mount. Each journey also has its
//! own config file, opened by the journey's constructor. Both kinds of file
//! are optional: a missing file means "use the defaults".

use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::Registry;

/// Errors from loading or rendering configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to encode config: {0}")]
    Encode(#[from] toml::ser::Error),
}

/// Top-level service configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ServiceConfig {
    pub journeys: Vec<JourneyConfig>,
}

/// Settings shared by every journey, independent of its kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct JourneyConfig {
    /// Disabled journeys are not mounted.
    pub enabled: bool,

    /// Registered journey name.
    pub name: String,

    /// Path the journey is mounted at on the service router.
    pub route_path: String,

    /// File holding the webhook secret used to authenticate requests.
    pub secret_path: PathBuf,

    /// File holding the journey's own configuration.
    pub config_path: PathBuf,
}

impl JourneyConfig {
    /// The conventional layout used for generated configs.
    pub fn conventional(name: &str) -> Self {
        JourneyConfig {
            enabled: false,
            name: name.to_string(),
            route_path: format!("/journey/{name}"),
            secret_path: PathBuf::from(format!("/secrets/{name}")),
            config_path: PathBuf::from(format!("/configs/{name}")),
        }
    }
}

/// Loads `T` from `path`, or `T::default()` when the file does not exist.
pub fn from_file<T>(path: impl AsRef<Path>) -> Result<T, ConfigError>
where
    T: DeserializeOwned + Default,
{
    let path = path.as_ref();
    match std::fs::read_to_string(path) {
        Ok(contents) => from_str(&contents),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(T::default()),
        Err(source) => Err(ConfigError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Parses `T` from a TOML document. Keys absent from the document keep the
/// values from `T::default()` when `T` is annotated with `#[serde(default)]`.
pub fn from_str<T: DeserializeOwned>(contents: &str) -> Result<T, ConfigError> {
    Ok(toml::from_str(contents)?)
}

/// Renders `value` as a commented-out TOML template.
///
/// Table headers stay uncommented so the template keeps its structure when a
/// user uncomments only a few keys.
pub fn config_comment<T: Serialize>(value: &T) -> Result<String, ConfigError> {
    let rendered = toml::to_string(value)?;

    let mut out = String::from("# Default config:\n");
    for line in rendered.lines() {
        let trimmed = line.trim_start();
        if !(line.is_empty() || trimmed.starts_with('[')) {
            out.push('#');
        }
        out.push_str(line);
        out.push('\n');
    }
    Ok(out)
}

/// A service config with one disabled entry per registered journey.
pub fn default_service_config(registry: &Registry) -> ServiceConfig {
    ServiceConfig {
        journeys: registry
            .registered()
            .iter()
            .map(|name| JourneyConfig::conventional(name))
            .collect(),
    }
}
