use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Result;

/// Opaque identifier of one open database connection on the server.
///
/// Handles are allocated from a counter that only grows, so a value is
/// never handed out twice by the same server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(u64);

impl Handle {
    /// Wraps a raw handle value.
    pub fn new(raw: u64) -> Self {
        Handle(raw)
    }

    /// Returns the raw handle value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Request sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    /// Open (or share) the database at a path.
    Open {
        /// Database path on the server.
        path: String,
    },
    /// Drop one reference to a handle.
    Close {
        /// Handle returned by `Open`.
        handle: Handle,
    },
    /// Point lookup.
    Get {
        /// Handle returned by `Open`.
        handle: Handle,
        /// The key to look up.
        key: Vec<u8>,
    },
    /// Point write.
    Put {
        /// Handle returned by `Open`.
        handle: Handle,
        /// The key to write.
        key: Vec<u8>,
        /// The value to associate with the key.
        value: Vec<u8>,
    },
    /// Batched lookup, answered in key order.
    MultiGet {
        /// Handle returned by `Open`.
        handle: Handle,
        /// The keys to look up.
        keys: Vec<Vec<u8>>,
    },
}

/// Response sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    /// Reply to `Open`.
    Handle(Handle),
    /// Reply to `Get`; `None` when the key is absent.
    Value(Option<Vec<u8>>),
    /// Reply to `MultiGet`, one entry per requested key.
    Values(Vec<Option<Vec<u8>>>),
    /// Reply to `Close` and `Put`.
    Done,
    /// The operation failed.
    Err(RemoteError),
}

/// Error reported by the server.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteError {
    /// The storage engine failed.
    #[error("Engine error: {0}")]
    Engine(String),

    /// The handle is unknown or already closed.
    #[error("Invalid handle {0}")]
    InvalidHandle(Handle),

    /// The request was malformed.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Some keys of a MultiGet failed; no values are returned.
    #[error("MultiGet failed for keys at {failed:?}: {message}")]
    BatchFailed {
        /// Positions of the failing keys in the request.
        failed: Vec<usize>,
        /// Diagnostic of the first failure.
        message: String,
    },
}

/// Outcome of an `Open` call.
pub type HandleOrError = Result<Handle>;

/// Outcome of a `Get` call.
pub type BytesOrError = Result<Option<Vec<u8>>>;

/// Outcome of a `MultiGet` call.
pub type BytesListOrError = Result<Vec<Option<Vec<u8>>>>;

/// Outcome of a `Close` or `Put` call.
pub type PossibleError = Result<()>;
