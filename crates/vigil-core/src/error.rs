//! Configuration error types.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// A target address that could not be normalized.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
    #[error("empty target")]
    Empty,

    #[error("missing host in {0:?}")]
    MissingHost(String),

    #[error("missing port in {0:?}")]
    MissingPort(String),

    #[error("invalid port in {0:?}")]
    InvalidPort(String),

    #[error("invalid host in {0:?}")]
    InvalidHost(String),
}

/// Errors that stop the daemon from starting.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid duration for `{field}`: {value:?}")]
    InvalidDuration { field: &'static str, value: String },

    #[error("`{0}` must be greater than zero")]
    Zero(&'static str),

    #[error("missing required setting `{0}`")]
    Missing(&'static str),

    #[error("targets line {line}: {source}")]
    TargetLine {
        line: usize,
        #[source]
        source: EndpointError,
    },

    #[error("target {name:?}: {source}")]
    TargetEndpoint {
        name: String,
        #[source]
        source: EndpointError,
    },

    #[error("reference host: {0}")]
    Reference(#[source] EndpointError),

    #[error("duplicate target name {0:?}")]
    DuplicateTarget(String),

    #[error("no targets configured")]
    NoTargets,
}
