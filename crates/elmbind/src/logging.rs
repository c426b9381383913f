#![forbid(unsafe_code)]

//! Process-wide log output.
//!
//! Libraries in this workspace only emit `tracing` events. Applications that
//! have no subscriber of their own can install one here, once, at startup.
//! Filters use the `EnvFilter` directive syntax (`warn,elmbind_runtime=debug`).

use tracing_subscriber::EnvFilter;

/// Environment variable consulted by [`init_from_env`].
pub const LOG_ENV: &str = "ELMBIND_LOG";

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log filter {filter:?}: {reason}")]
    InvalidFilter { filter: String, reason: String },
    #[error("a global subscriber is already installed: {0}")]
    AlreadyInitialized(String),
}

fn parse_filter(filter: &str) -> Result<EnvFilter, LoggingError> {
    EnvFilter::try_new(filter).map_err(|err| LoggingError::InvalidFilter {
        filter: filter.to_owned(),
        reason: err.to_string(),
    })
}

/// Install a human-readable subscriber filtered by `filter`.
pub fn init(filter: &str) -> Result<(), LoggingError> {
    let env_filter = parse_filter(filter)?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
        .map_err(|err| LoggingError::AlreadyInitialized(err.to_string()))?;
    tracing::debug!(filter, "logging initialized");
    Ok(())
}

/// Install a JSON subscriber filtered by `filter`.
#[cfg(feature = "logging-json")]
pub fn init_json(filter: &str) -> Result<(), LoggingError> {
    let env_filter = parse_filter(filter)?;
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter)
        .with_current_span(false)
        .try_init()
        .map_err(|err| LoggingError::AlreadyInitialized(err.to_string()))?;
    tracing::debug!(filter, "logging initialized");
    Ok(())
}

/// [`init`] with the filter taken from `ELMBIND_LOG`, or `default` when the
/// variable is unset.
pub fn init_from_env(default: &str) -> Result<(), LoggingError> {
    let filter = std::env::var(LOG_ENV).unwrap_or_else(|_| default.to_owned());
    init(&filter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_directive_is_rejected_before_install() {
        let err = init("elmbind_runtime=loud").unwrap_err();
        assert!(matches!(
            err,
            LoggingError::InvalidFilter { ref filter, .. } if filter == "elmbind_runtime=loud"
        ));
    }

    #[test]
    fn valid_directives_parse() {
        assert!(parse_filter("warn,elmbind_runtime=debug").is_ok());
        assert!(parse_filter("").is_ok());
    }

    #[test]
    fn second_install_fails() {
        // The only test in this binary that installs a global subscriber.
        let first = init("warn");
        assert!(first.is_ok());
        assert!(matches!(init("warn"), Err(LoggingError::AlreadyInitialized(_))));
    }
}
