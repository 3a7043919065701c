//! Host-provided state, captured once per puzzle session.

use serde_json::{Map, Value};
use thiserror::Error;

pub const HOST_STATE_VAR: &str = "PUZZLE_HOST_STATE";

#[derive(Debug, Error)]
pub enum HostStateError {
    #[error("host state is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("host state unreadable: {0}")]
    Unreadable(String),
}

/// Source of the state a host injects before a puzzle starts.
///
/// `Ok(None)` means no host is present.
pub trait HostStateProvider: Send {
    fn host_state(&self) -> Result<Option<Value>, HostStateError>;
}

impl<F> HostStateProvider for F
where
    F: Fn() -> Result<Option<Value>, HostStateError> + Send,
{
    fn host_state(&self) -> Result<Option<Value>, HostStateError> {
        self()
    }
}

#[derive(Debug, Clone)]
pub struct EnvStateProvider {
    var: String,
}

impl EnvStateProvider {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvStateProvider {
    fn default() -> Self {
        Self::new(HOST_STATE_VAR)
    }
}

impl HostStateProvider for EnvStateProvider {
    fn host_state(&self) -> Result<Option<Value>, HostStateError> {
        match std::env::var(&self.var) {
            Ok(raw) if raw.trim().is_empty() => Ok(None),
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(err) => Err(HostStateError::Unreadable(format!("{}: {err}", self.var))),
        }
    }
}

/// Fixed host state, mostly for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct StaticStateProvider(pub Option<Value>);

impl HostStateProvider for StaticStateProvider {
    fn host_state(&self) -> Result<Option<Value>, HostStateError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentSource {
    Host,
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostEnvironment {
    preview: bool,
    config: Value,
    data: Value,
    source: EnvironmentSource,
}

impl HostEnvironment {
    /// `{ preview: false, config: {}, data: {} }`
    pub fn fallback() -> Self {
        Self {
            preview: false,
            config: Value::Object(Map::new()),
            data: Value::Object(Map::new()),
            source: EnvironmentSource::Fallback,
        }
    }

    /// Snapshots whatever the provider has. Never fails: anything unusable
    /// becomes [`HostEnvironment::fallback`].
    pub fn capture(provider: &dyn HostStateProvider) -> Self {
        match provider.host_state() {
            Ok(Some(state)) => Self::from_value(state),
            Ok(None) => {
                tracing::debug!("no host state present; using fallback environment");
                Self::fallback()
            }
            Err(err) => {
                tracing::debug!("host state unavailable ({err}); using fallback environment");
                Self::fallback()
            }
        }
    }

    pub fn from_value(state: Value) -> Self {
        let Value::Object(mut map) = state else {
            tracing::debug!("host state is not an object; using fallback environment");
            return Self::fallback();
        };

        let preview = map
            .get("preview")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let config = match map.remove("config") {
            Some(Value::Null) | None => Value::Object(Map::new()),
            Some(config) => config,
        };
        let data = map.remove("data").unwrap_or(Value::Null);

        Self {
            preview,
            config,
            data,
            source: EnvironmentSource::Host,
        }
    }

    pub fn preview(&self) -> bool {
        self.preview
    }

    pub fn config(&self) -> &Value {
        &self.config
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn source(&self) -> EnvironmentSource {
        self.source
    }
}
