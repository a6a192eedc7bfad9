//! Error types for mailarc-core.

use thiserror::Error;

/// Result type alias using mailarc-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for mailarc-core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Path discovery error.
    #[error("path error: {0}")]
    Path(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Login rejected by the server.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Remote mail server error (connect, list, select, search, fetch, logout).
    #[error("remote error: {0}")]
    Remote(String),

    /// Bytes are not a well-formed message.
    #[error("parse error: {0}")]
    Parse(String),
}

impl From<imap::Error> for Error {
    fn from(err: imap::Error) -> Self {
        Error::Remote(err.to_string())
    }
}

impl From<native_tls::Error> for Error {
    fn from(err: native_tls::Error) -> Self {
        Error::Remote(format!("TLS: {err}"))
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Self {
        Error::Io(err.into())
    }
}
