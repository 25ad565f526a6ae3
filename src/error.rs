use std::io;
use thiserror::Error;

use crate::common::{Handle, RemoteError};

/// Error type for kvrpc operations.
#[derive(Error, Debug)]
pub enum KvError {
    /// IO error from sockets or files.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization error on the wire.
    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Error reported by the sled storage engine.
    #[error("Sled error: {0}")]
    Sled(#[from] sled::Error),

    /// The handle does not name a live connection.
    #[error("Invalid handle {0}")]
    InvalidHandle(Handle),

    /// One or more keys of a batched lookup failed.
    #[error("MultiGet failed for keys at {failed:?}: {message}")]
    BatchFailed {
        /// Positions of the failing keys in the request.
        failed: Vec<usize>,
        /// Diagnostic of the first failure.
        message: String,
    },

    /// A batched lookup produced a different number of values than keys.
    #[error("MultiGet returned {actual} values for {expected} keys")]
    BatchMismatch {
        /// Number of keys requested.
        expected: usize,
        /// Number of values produced.
        actual: usize,
    },

    /// The server answered with an error.
    #[error("{0}")]
    Remote(#[from] RemoteError),

    /// The connection to the server can no longer be used.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The server answered with a response of the wrong kind.
    #[error("Unexpected response")]
    UnexpectedResponse,

    /// A bind address could not be parsed.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Error with a string message.
    #[error("{0}")]
    StringError(String),
}

impl KvError {
    /// Returns `true` for failures between client and server, as opposed to
    /// errors the server reported. Such calls are safe to retry on a new
    /// connection.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            KvError::Io(_) | KvError::Serde(_) | KvError::Transport(_) | KvError::UnexpectedResponse
        )
    }

    /// Converts a server-side error into its wire form.
    pub fn into_remote(self) -> RemoteError {
        match self {
            KvError::InvalidHandle(handle) => RemoteError::InvalidHandle(handle),
            KvError::BatchFailed { failed, message } => RemoteError::BatchFailed { failed, message },
            e @ KvError::BatchMismatch { .. } => RemoteError::Protocol(e.to_string()),
            KvError::Remote(e) => e,
            e => RemoteError::Engine(e.to_string()),
        }
    }
}

/// Result type alias for kvrpc operations.
pub type Result<T> = std::result::Result<T, KvError>;
