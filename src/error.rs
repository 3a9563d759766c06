use std::io;
use thiserror::Error;

/// type alias for all operations on a [`Store`] that could fail with a [`SkullError`]
///
/// [`Store`]: ./struct.Store.html
pub type Result<T> = std::result::Result<T, SkullError>;

/// The Error variants used by [`Store`], the record types and the client/server.
///
/// Only failures that can be detected *before* memory is mutated are ever returned from a
/// store operation. Malformed lines found while loading and failed background writes are
/// logged where they happen and never surface here.
///
/// [`Store`]: ./struct.Store.html
#[derive(Error, Debug)]
pub enum SkullError {
    /// the user is the unknown sentinel, or has no directory under the storage root
    #[error("unknown user: {0}")]
    UnknownUser(String),

    /// an edit or remove target does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// raw fields could not be turned into a record
    #[error("parse error: {0}")]
    Parse(String),

    /// variant for errors caused from file or socket IO
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// serde_json error on the wire protocol
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// the store's settings contradict each other
    #[error("invalid configuration: {0}")]
    Config(String),

    /// a thread pool could not be built or refused a job
    #[error("thread pool error: {0}")]
    Pool(String),

    /// an error message returned by the server
    #[error("{0}")]
    Server(String),
}
