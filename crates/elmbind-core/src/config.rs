#![forbid(unsafe_code)]

//! Adapter configuration.
//!
//! [`BindConfig`] is plain data. It can be built in code, parsed from TOML,
//! and overlaid with environment variables:
//!
//! | variable                   | field              |
//! |----------------------------|--------------------|
//! | `ELMBIND_LOG_UPDATES`      | `log_updates`      |
//! | `ELMBIND_MEASURE`          | `measure`          |
//! | `ELMBIND_MEASURE_LIMIT_MS` | `measure_limit_ms` |
//! | `ELMBIND_STRICT`           | `strict_bindings`  |
//!
//! Booleans accept `1/0`, `true/false`, `yes/no`, `on/off`.

use serde::Deserialize;
use web_time::Duration;

use crate::error::{BindError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BindConfig {
    /// Emit a `debug` event for every node update.
    pub log_updates: bool,
    /// Time node updates and warn when one exceeds `measure_limit_ms`.
    pub measure: bool,
    pub measure_limit_ms: u64,
    /// Panic when the UI asks for an undeclared binding name.
    pub strict_bindings: bool,
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            log_updates: false,
            measure: false,
            measure_limit_ms: 1,
            strict_bindings: false,
        }
    }
}

impl BindConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| BindError::invalid_config(e.message()))
    }

    /// Overlay `ELMBIND_*` environment variables.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(raw) = lookup("ELMBIND_LOG_UPDATES") {
            self.log_updates = parse_flag("ELMBIND_LOG_UPDATES", &raw)?;
        }
        if let Some(raw) = lookup("ELMBIND_MEASURE") {
            self.measure = parse_flag("ELMBIND_MEASURE", &raw)?;
        }
        if let Some(raw) = lookup("ELMBIND_MEASURE_LIMIT_MS") {
            self.measure_limit_ms = raw.trim().parse().map_err(|_| {
                BindError::invalid_config(format!("ELMBIND_MEASURE_LIMIT_MS: not a number: {raw}"))
            })?;
        }
        if let Some(raw) = lookup("ELMBIND_STRICT") {
            self.strict_bindings = parse_flag("ELMBIND_STRICT", &raw)?;
        }
        Ok(self)
    }

    #[must_use]
    pub fn measure_limit(&self) -> Duration {
        Duration::from_millis(self.measure_limit_ms)
    }

    #[must_use]
    pub fn with_log_updates(mut self, on: bool) -> Self {
        self.log_updates = on;
        self
    }

    #[must_use]
    pub fn with_measure(mut self, limit_ms: u64) -> Self {
        self.measure = true;
        self.measure_limit_ms = limit_ms;
        self
    }

    #[must_use]
    pub fn with_strict_bindings(mut self, on: bool) -> Self {
        self.strict_bindings = on;
        self
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(BindError::invalid_config(format!(
            "{key}: not a boolean: {other}"
        ))),
    }
}
