//! Error types for dbconnect.
//!
//! Parse failures are raised immediately. Connect and statement failures carry the
//! vendor error as their source so strict callers can inspect it; lenient callers
//! only ever see them in the log.

use thiserror::Error;

use crate::registry::BackendType;

/// Template shown to the user when a connection string does not parse.
pub const EXPECTED_FORMAT: &str = "dbtype[-odbc]://hostname[:port][/dbname[?user[&password]]]";

#[derive(Error, Debug)]
pub enum Error {
    #[error("Wrong format for connection string. Given: {given}, expected: {expected}")]
    MalformedConnectionString {
        given: String,
        expected: &'static str,
    },

    #[error("Unsupported transport '{transport}' for backend '{backend}'")]
    UnsupportedTransport { backend: String, transport: String },

    #[error("This type of database is unknown: {0}")]
    UnknownBackendType(String),

    #[error("DSN template '{key}' not found: {reason}")]
    DsnTemplateNotFound { key: String, reason: String },

    #[error("Connection to {backend} failed: {source}")]
    Connection {
        backend: BackendType,
        source: anyhow::Error,
    },

    #[error("Statement failed on {backend}: {source}")]
    Statement {
        backend: BackendType,
        source: anyhow::Error,
    },

    #[error("No open connection to {0}")]
    NotConnected(BackendType),

    #[error(
        "No credentials for {0}: give '?user&password' in the connection string or set connector.credentials"
    )]
    MissingCredentials(BackendType),
}

impl Error {
    pub(crate) fn malformed(given: impl Into<String>) -> Self {
        Self::MalformedConnectionString {
            given: given.into(),
            expected: EXPECTED_FORMAT,
        }
    }

    pub(crate) fn template_not_found(key: impl Into<String>, reason: impl ToString) -> Self {
        Self::DsnTemplateNotFound {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn connection(backend: BackendType, source: impl Into<anyhow::Error>) -> Self {
        Self::Connection {
            backend,
            source: source.into(),
        }
    }

    pub(crate) fn statement(backend: BackendType, source: impl Into<anyhow::Error>) -> Self {
        Self::Statement {
            backend,
            source: source.into(),
        }
    }

    /// Returns true for errors raised before any driver was contacted.
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedConnectionString { .. }
                | Self::UnsupportedTransport { .. }
                | Self::UnknownBackendType(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
