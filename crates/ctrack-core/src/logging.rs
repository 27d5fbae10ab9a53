#![forbid(unsafe_code)]

//! Production log output.
//!
//! Every crate in the workspace emits `tracing` events named
//! `component.event` (`registry.listener_panicked`, `entity.dirty`, ...)
//! with structured `registry` / `listener` / `entity` fields. Hosting
//! applications usually install their own subscriber; with the
//! `tracing-json` feature this module offers a ready-made JSON one.

#[cfg(feature = "tracing-json")]
use tracing_subscriber::EnvFilter;

/// Filter used when neither the caller nor `RUST_LOG` provide one.
pub const DEFAULT_FILTER: &str = "ctrack_core=info,ctrack_runtime=info";

/// Failure to install the JSON subscriber.
#[cfg(feature = "tracing-json")]
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log filter {filter:?}: {message}")]
    InvalidFilter { filter: String, message: String },

    #[error("a global tracing subscriber is already installed")]
    AlreadyInstalled,
}

/// Build the filter: `filter` if given, else `RUST_LOG`, else
/// [`DEFAULT_FILTER`].
#[cfg(feature = "tracing-json")]
pub fn env_filter(filter: Option<&str>) -> Result<EnvFilter, LoggingError> {
    match filter {
        Some(directives) => {
            EnvFilter::try_new(directives).map_err(|err| LoggingError::InvalidFilter {
                filter: directives.to_string(),
                message: err.to_string(),
            })
        }
        None => Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))),
    }
}

/// Install a global JSON-lines subscriber writing to stderr.
#[cfg(feature = "tracing-json")]
pub fn init_json_logging(filter: Option<&str>) -> Result<(), LoggingError> {
    let filter = env_filter(filter)?;
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInstalled)
}

#[cfg(all(test, feature = "tracing-json"))]
mod tests {
    use super::*;

    #[test]
    fn explicit_filter_parses() {
        assert!(env_filter(Some("ctrack_core=debug")).is_ok());
    }

    #[test]
    fn bad_filter_is_reported() {
        let err = env_filter(Some("ctrack_core=loud")).unwrap_err();
        assert!(matches!(err, LoggingError::InvalidFilter { .. }));
    }

    #[test]
    fn second_install_fails() {
        let first = init_json_logging(Some("warn"));
        let second = init_json_logging(Some("warn"));
        assert!(first.is_ok() || matches!(first, Err(LoggingError::AlreadyInstalled)));
        assert!(matches!(second, Err(LoggingError::AlreadyInstalled)));
    }
}
