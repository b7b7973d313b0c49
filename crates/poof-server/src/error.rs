//! Server error types.

use std::fmt;

use crate::storage::StoreError;

/// Errors that can occur while starting or running the server.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error (invalid bind address, unusable options, etc.).
    ///
    /// Fatal: fix configuration and restart.
    Config(String),

    /// Store could not be opened or closed.
    ///
    /// Fatal at startup: the server must not serve traffic with a
    /// non-functional store.
    Storage(StoreError),

    /// Transport/network error (bind failure, I/O error while serving).
    Transport(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Storage(err) => write!(f, "storage error: {err}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        Self::Storage(err)
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
