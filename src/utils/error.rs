//! The `error` module defines the error type shared by the whole crate.
//!
//! Errors fall into a few kinds: connection establishment (`dial`), local
//! address validation, deadline expiry, transport failures reported by the
//! messaging client, and use of a closed connection. Only `Timeout` is
//! retryable; `Error::is_timeout` lets callers tell it apart.

use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid connection uri: {0}")]
    InvalidUri(String),

    #[error("unsupported uri scheme `{0}` (expected `mqtt` or `mqtts`)")]
    UnsupportedScheme(String),

    #[error("broker connection failed: {0}")]
    Connect(String),

    #[error("unexpected address network `{network}`")]
    AddressType { network: String },

    #[error("no default destination topic set")]
    NoDestination,

    #[error("invalid qos level {0} (expected 0, 1 or 2)")]
    InvalidQos(u8),

    #[error("{op} timed out")]
    Timeout { op: &'static str },

    #[error("mqtt client request failed: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("connection closed")]
    Closed,

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl Error {
    /// Whether the error is a deadline miss. The connection stays usable.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::InvalidUri(err.to_string())
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        let kind = match &err {
            Error::Timeout { .. } => io::ErrorKind::TimedOut,
            Error::Closed => io::ErrorKind::NotConnected,
            Error::AddressType { .. } | Error::NoDestination => io::ErrorKind::InvalidInput,
            Error::InvalidUri(_) | Error::UnsupportedScheme(_) | Error::InvalidQos(_) => {
                io::ErrorKind::InvalidInput
            }
            Error::Connect(_) => io::ErrorKind::ConnectionRefused,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}
