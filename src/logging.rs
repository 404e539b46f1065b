//! Logging setup and runtime level control.
//!
//! Installs a `tracing-subscriber` registry whose [`EnvFilter`] sits behind a
//! reload layer, so the operator API can change levels per subsystem while
//! the service is running. A subsystem is a `tracing` target, i.e. a module
//! path such as `journey_relay::secret`.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Registry, fmt, reload};

/// Log targets emitted by this crate, plus the HTTP tracing middleware.
pub const SUBSYSTEMS: &[&str] = &[
    "journey_relay",
    "journey_relay::circleci",
    "journey_relay::journeys::greeting",
    "journey_relay::journeys::lotus",
    "journey_relay::operator",
    "journey_relay::registry",
    "journey_relay::secret",
    "journey_relay::server",
    "journey_relay::server::webhook",
    "tower_http",
];

#[derive(Debug, Error)]
pub enum LogError {
    #[error("invalid log level {0:?}")]
    InvalidLevel(String),

    #[error("no such subsystem: {0}")]
    UnknownSubsystem(String),

    #[error("invalid named log level format: {0:?}")]
    InvalidNamedLevel(String),

    #[error("invalid filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("failed to reload log filter: {0}")]
    Reload(#[from] reload::Error),

    #[error("failed to install subscriber: {0}")]
    Init(#[from] TryInitError),
}

/// Handle for inspecting and changing log levels at runtime.
#[derive(Clone)]
pub struct LogControl {
    inner: Arc<LogControlInner>,
}

struct LogControlInner {
    /// `None` for a detached control that has no subscriber behind it.
    handle: Option<reload::Handle<EnvFilter, Registry>>,
    directives: Mutex<Directives>,
}

struct Directives {
    /// Directive applied before any per-subsystem override.
    base: String,
    named: BTreeMap<String, LevelFilter>,
}

impl Directives {
    fn render(&self) -> String {
        let mut parts = vec![self.base.clone()];
        parts.extend(
            self.named
                .iter()
                .map(|(target, level)| format!("{target}={level}")),
        );
        parts.join(",")
    }
}

impl LogControl {
    /// Installs the global subscriber.
    ///
    /// `RUST_LOG`, when set, replaces `default_level` as the base directive.
    /// `named` overrides are applied on top.
    pub fn init(default_level: &str, named: &str) -> Result<Self, LogError> {
        let base = match std::env::var(EnvFilter::DEFAULT_ENV) {
            Ok(env) if !env.trim().is_empty() => env,
            _ => parse_level(default_level)?.to_string(),
        };
        let directives = Directives {
            base,
            named: parse_named_levels(named)?.into_iter().collect(),
        };

        let filter = EnvFilter::try_new(directives.render())?;
        let (filter_layer, handle) = reload::Layer::new(filter);
        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()?;

        Ok(LogControl {
            inner: Arc::new(LogControlInner {
                handle: Some(handle),
                directives: Mutex::new(directives),
            }),
        })
    }

    /// A control that records level changes without a subscriber to apply
    /// them to.
    pub fn detached(default_level: &str) -> Result<Self, LogError> {
        Ok(LogControl {
            inner: Arc::new(LogControlInner {
                handle: None,
                directives: Mutex::new(Directives {
                    base: parse_level(default_level)?.to_string(),
                    named: BTreeMap::new(),
                }),
            }),
        })
    }

    /// Known subsystems, sorted.
    pub fn subsystems(&self) -> Vec<String> {
        let mut names: Vec<String> = SUBSYSTEMS.iter().map(|s| s.to_string()).collect();
        names.sort();
        names
    }

    /// Sets the level of one subsystem.
    pub fn set_level(&self, subsystem: &str, level: &str) -> Result<(), LogError> {
        if !SUBSYSTEMS.contains(&subsystem) {
            return Err(LogError::UnknownSubsystem(subsystem.to_string()));
        }
        let level = parse_level(level)?;

        let mut directives = self
            .inner
            .directives
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let previous = directives.named.insert(subsystem.to_string(), level);

        let filter = EnvFilter::try_new(directives.render())?;
        if let Some(handle) = &self.inner.handle {
            if let Err(e) = handle.reload(filter) {
                match previous {
                    Some(prev) => directives.named.insert(subsystem.to_string(), prev),
                    None => directives.named.remove(subsystem),
                };
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// The filter currently in effect, in `EnvFilter` directive syntax.
    pub fn current_filter(&self) -> String {
        self.inner
            .directives
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .render()
    }
}

/// Parses `trace|debug|info|warn|error|off` (case-insensitive).
pub fn parse_level(level: &str) -> Result<LevelFilter, LogError> {
    LevelFilter::from_str(level.trim()).map_err(|_| LogError::InvalidLevel(level.to_string()))
}

/// Parses `name:level,name:level`. An empty string yields no overrides.
pub fn parse_named_levels(directives: &str) -> Result<Vec<(String, LevelFilter)>, LogError> {
    directives
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            let (name, level) = part
                .split_once(':')
                .filter(|(name, _)| !name.is_empty())
                .ok_or_else(|| LogError::InvalidNamedLevel(part.to_string()))?;
            Ok((name.to_string(), parse_level(level)?))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_levels_case_insensitively() {
        assert_eq!(parse_level("WARN").unwrap(), LevelFilter::WARN);
        assert_eq!(parse_level("off").unwrap(), LevelFilter::OFF);
        assert!(matches!(parse_level("loud"), Err(LogError::InvalidLevel(_))));
    }

    #[test]
    fn parses_named_levels() {
        let named = parse_named_levels("journey_relay::secret:debug, tower_http:info").unwrap();
        assert_eq!(
            named,
            vec![
                ("journey_relay::secret".to_string(), LevelFilter::DEBUG),
                ("tower_http".to_string(), LevelFilter::INFO),
            ]
        );
        assert!(parse_named_levels("").unwrap().is_empty());
    }

    #[test]
    fn rejects_malformed_named_levels() {
        assert!(matches!(
            parse_named_levels("journey_relay"),
            Err(LogError::InvalidNamedLevel(_))
        ));
        assert!(matches!(
            parse_named_levels(":debug"),
            Err(LogError::InvalidNamedLevel(_))
        ));
        assert!(matches!(
            parse_named_levels("tower_http:chatty"),
            Err(LogError::InvalidLevel(_))
        ));
    }

    #[test]
    fn set_level_updates_filter() {
        let control = LogControl::detached("warn").unwrap();
        control.set_level("journey_relay::secret", "debug").unwrap();
        control.set_level("tower_http", "error").unwrap();

        assert_eq!(
            control.current_filter(),
            "warn,journey_relay::secret=debug,tower_http=error"
        );
    }

    #[test]
    fn set_level_rejects_unknown_subsystem() {
        let control = LogControl::detached("info").unwrap();
        let err = control.set_level("hyper", "debug").unwrap_err();
        assert!(matches!(err, LogError::UnknownSubsystem(ref s) if s == "hyper"));
        assert_eq!(control.current_filter(), "info");
    }

    #[test]
    fn subsystems_are_sorted() {
        let control = LogControl::detached("info").unwrap();
        let subsystems = control.subsystems();
        let mut sorted = subsystems.clone();
        sorted.sort();
        assert_eq!(subsystems, sorted);
        assert!(subsystems.contains(&"journey_relay::server::webhook".to_string()));
    }
}
