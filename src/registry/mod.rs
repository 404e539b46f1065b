//! Journey registry.
//!
//! Maps a journey name to the constructor that builds its route handler and
//! to its default configuration. A registry is filled once at startup (see
//! [`crate::journeys::default_registry`]) and only read afterwards.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use axum::routing::MethodRouter;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::config::{self, ConfigError, JourneyConfig};

/// Errors from looking up a journey.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("journey not found: {0}")]
    NotFound(String),
}

/// Errors from constructing a journey.
#[derive(Debug, Error)]
pub enum JourneyError {
    /// The journey's own config file could not be loaded.
    #[error("loading journey config: {0}")]
    Config(#[from] ConfigError),

    /// The journey config loaded but holds an unusable value.
    #[error("invalid journey config field {field}: {reason}")]
    InvalidConfig { field: &'static str, reason: String },
}

/// Builds a journey's route handler from its common config.
pub type JourneyConstructor =
    Arc<dyn Fn(&JourneyConfig) -> Result<MethodRouter, JourneyError> + Send + Sync>;

/// A kind of journey that can be registered.
///
/// `Config` is the journey's own configuration, read from
/// [`JourneyConfig::config_path`] before [`Journey::build`] is called.
pub trait Journey: 'static {
    /// Unique registry name.
    const NAME: &'static str;

    type Config: Serialize + DeserializeOwned + Default;

    /// Configuration emitted by `default-config` and used when the journey's
    /// config file is absent.
    fn default_config() -> Self::Config {
        Self::Config::default()
    }

    fn build(common: &JourneyConfig, config: Self::Config) -> Result<MethodRouter, JourneyError>;
}

/// One registered journey.
#[derive(Clone)]
pub struct RegistryEntry {
    name: String,
    constructor: JourneyConstructor,
    default_config: toml::Value,
}

impl RegistryEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_config(&self) -> &toml::Value {
        &self.default_config
    }

    /// Runs the journey's constructor.
    pub fn construct(&self, common: &JourneyConfig) -> Result<MethodRouter, JourneyError> {
        (self.constructor)(common)
    }
}

impl fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("name", &self.name)
            .field("default_config", &self.default_config)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    journeys: BTreeMap<String, RegistryEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers journey kind `J` under [`Journey::NAME`].
    ///
    /// The constructor loads `J::Config` from the journey's config file,
    /// falling back to [`Journey::default_config`] when the file is absent.
    ///
    /// # Panics
    ///
    /// If a journey with the same name is already registered, or if the
    /// default config cannot be represented as TOML.
    pub fn register<J: Journey>(&mut self) {
        self.register_with(
            J::NAME,
            |common: &JourneyConfig| {
                let cfg = load_journey_config::<J>(common)?;
                J::build(common, cfg)
            },
            &J::default_config(),
        );
    }

    /// Registers an arbitrary constructor under `name`.
    ///
    /// # Panics
    ///
    /// If `name` is already registered, or if `default_config` cannot be
    /// represented as TOML.
    pub fn register_with<F, C>(&mut self, name: &str, constructor: F, default_config: &C)
    where
        F: Fn(&JourneyConfig) -> Result<MethodRouter, JourneyError> + Send + Sync + 'static,
        C: Serialize,
    {
        if self.journeys.contains_key(name) {
            panic!("journey already registered: {name}");
        }

        let default_config = toml::Value::try_from(default_config)
            .unwrap_or_else(|e| panic!("default config for journey {name} is not TOML: {e}"));

        self.journeys.insert(
            name.to_string(),
            RegistryEntry {
                name: name.to_string(),
                constructor: Arc::new(constructor),
                default_config,
            },
        );
    }

    pub fn get(&self, name: &str) -> Result<&RegistryEntry, RegistryError> {
        self.journeys
            .get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Registered names in lexicographic order.
    pub fn registered(&self) -> Vec<String> {
        self.journeys.keys().cloned().collect()
    }
}

fn load_journey_config<J: Journey>(common: &JourneyConfig) -> Result<J::Config, JourneyError> {
    if common.config_path.as_os_str().is_empty() {
        return Ok(J::default_config());
    }

    match std::fs::read_to_string(&common.config_path) {
        Ok(contents) => Ok(merge_over_defaults::<J>(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(J::default_config()),
        Err(source) => Err(ConfigError::Read {
            path: common.config_path.clone(),
            source,
        }
        .into()),
    }
}

/// Parses `contents` with keys missing from the file taken from
/// [`Journey::default_config`] rather than from `Config::default()`.
fn merge_over_defaults<J: Journey>(contents: &str) -> Result<J::Config, ConfigError> {
    let mut merged = match toml::Value::try_from(J::default_config())? {
        toml::Value::Table(table) => table,
        _ => toml::Table::new(),
    };
    let overrides: toml::Table = config::from_str(contents)?;
    for (key, value) in overrides {
        merged.insert(key, value);
    }
    Ok(toml::Value::Table(merged).try_into()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use serde::Deserialize;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct EchoConfig {
        reply: String,
        volume: u8,
    }

    struct Echo;

    impl Journey for Echo {
        const NAME: &'static str = "echo";
        type Config = EchoConfig;

        fn default_config() -> EchoConfig {
            EchoConfig {
                reply: "echo".to_string(),
                volume: 3,
            }
        }

        fn build(_: &JourneyConfig, cfg: EchoConfig) -> Result<MethodRouter, JourneyError> {
            if cfg.volume > 10 {
                return Err(JourneyError::InvalidConfig {
                    field: "Volume",
                    reason: "too loud".to_string(),
                });
            }
            let reply = cfg.reply;
            Ok(get(move || std::future::ready(reply.clone())))
        }
    }

    fn noop(_: &JourneyConfig) -> Result<MethodRouter, JourneyError> {
        Ok(get(|| async { "" }))
    }

    fn common_with_config(path: PathBuf) -> JourneyConfig {
        JourneyConfig {
            config_path: path,
            ..JourneyConfig::conventional("echo")
        }
    }

    #[test]
    fn distinct_names_are_retrievable_and_sorted() {
        let mut registry = Registry::new();
        registry.register_with("zeta", noop, &toml::Table::new());
        registry.register_with("alpha", noop, &toml::Table::new());
        registry.register::<Echo>();

        assert_eq!(registry.registered(), vec!["alpha", "echo", "zeta"]);
        assert_eq!(registry.get("alpha").unwrap().name(), "alpha");
        assert_eq!(registry.get("zeta").unwrap().name(), "zeta");
    }

    #[test]
    #[should_panic(expected = "journey already registered: echo")]
    fn duplicate_registration_panics() {
        let mut registry = Registry::new();
        registry.register::<Echo>();
        registry.register_with("echo", noop, &toml::Table::new());
    }

    #[test]
    fn unknown_name_is_not_found() {
        let registry = Registry::new();
        let err = registry.get("lotus").unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(ref n) if n == "lotus"));
        assert_eq!(err.to_string(), "journey not found: lotus");
    }

    #[test]
    fn default_config_is_exposed_as_toml() {
        let mut registry = Registry::new();
        registry.register::<Echo>();

        let default = registry.get("echo").unwrap().default_config();
        assert_eq!(default.get("Reply").and_then(|v| v.as_str()), Some("echo"));
        assert_eq!(default.get("Volume").and_then(|v| v.as_integer()), Some(3));
    }

    #[test]
    fn missing_config_file_uses_journey_defaults() {
        let dir = tempdir().unwrap();
        let common = common_with_config(dir.path().join("absent.toml"));

        let cfg = load_journey_config::<Echo>(&common).unwrap();
        assert_eq!(cfg, Echo::default_config());
    }

    #[test]
    fn partial_config_file_is_merged_over_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("echo.toml");
        std::fs::write(&path, "Volume = 7\n").unwrap();

        let cfg = load_journey_config::<Echo>(&common_with_config(path)).unwrap();
        assert_eq!(
            cfg,
            EchoConfig {
                reply: "echo".to_string(),
                volume: 7
            }
        );
    }

    #[test]
    fn malformed_config_file_fails_construction() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("echo.toml");
        std::fs::write(&path, "Volume = \"loud\"\n").unwrap();

        let mut registry = Registry::new();
        registry.register::<Echo>();
        let result = registry
            .get("echo")
            .unwrap()
            .construct(&common_with_config(path));
        assert!(matches!(result, Err(JourneyError::Config(_))));
    }

    #[test]
    fn constructor_validation_errors_surface() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("echo.toml");
        std::fs::write(&path, "Volume = 11\n").unwrap();

        let mut registry = Registry::new();
        registry.register::<Echo>();
        let result = registry
            .get("echo")
            .unwrap()
            .construct(&common_with_config(path));
        assert!(matches!(
            result,
            Err(JourneyError::InvalidConfig { field: "Volume", .. })
        ));
    }
}
