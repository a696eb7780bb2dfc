use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration-specific errors
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("TOML parse error: {0}")]
    TomlParse(String),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for field {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Failures reported by the homeserver or the transport underneath it.
///
/// `NotFound` is split out so call sites can treat a missing resource as an
/// ordinary answer (alias lookups) instead of a fault.
#[derive(Error, Diagnostic, Debug, Clone)]
pub enum MatrixError {
    #[error("Not found: {message}")]
    #[diagnostic(code(spaceconvert::matrix::not_found))]
    NotFound { message: String },

    #[error("Forbidden: {message}")]
    #[diagnostic(
        code(spaceconvert::matrix::forbidden),
        help("The bot account lacks permission for this operation")
    )]
    Forbidden { message: String },

    #[error("Rate limited by homeserver (retry after {retry_after_ms}ms)")]
    #[diagnostic(code(spaceconvert::matrix::rate_limited))]
    RateLimited { retry_after_ms: u64 },

    #[error("Homeserver returned {status} {errcode}: {message}")]
    #[diagnostic(code(spaceconvert::matrix::api))]
    Api {
        status: u16,
        errcode: String,
        message: String,
    },

    #[error("Transport error: {0}")]
    #[diagnostic(
        code(spaceconvert::matrix::transport),
        help("Check that the homeserver URL is reachable")
    )]
    Transport(String),

    #[error("Failed to decode homeserver response: {0}")]
    #[diagnostic(code(spaceconvert::matrix::decode))]
    Decode(String),
}

impl MatrixError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[derive(Error, Diagnostic, Debug)]
pub enum CoreError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Matrix(#[from] MatrixError),

    #[error("Invalid {kind} '{value}': {reason}")]
    #[diagnostic(
        code(spaceconvert::invalid_id),
        help("Matrix identifiers look like {sigil}localpart:server.name")
    )]
    InvalidId {
        kind: &'static str,
        sigil: char,
        value: String,
        reason: &'static str,
    },

    #[error("Configuration error for field '{field}'")]
    #[diagnostic(
        code(spaceconvert::configuration_error),
        help("Check configuration file at {config_path}\nExpected: {expected}")
    )]
    ConfigurationError {
        config_path: String,
        field: String,
        expected: String,
        #[source]
        cause: ConfigError,
    },

    #[error("Serialization error")]
    #[diagnostic(
        code(spaceconvert::serialization_error),
        help("Failed to serialize/deserialize {data_type}")
    )]
    SerializationError {
        data_type: String,
        #[source]
        cause: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, CoreError>;
pub type MatrixResult<T> = std::result::Result<T, MatrixError>;

impl CoreError {
    pub fn missing_config(field: impl Into<String>, config_path: impl Into<String>) -> Self {
        let field = field.into();
        Self::ConfigurationError {
            config_path: config_path.into(),
            expected: format!("a value for {field}"),
            cause: ConfigError::MissingField(field.clone()),
            field,
        }
    }

    pub fn serialization(data_type: impl Into<String>, cause: serde_json::Error) -> Self {
        Self::SerializationError {
            data_type: data_type.into(),
            cause,
        }
    }
}
