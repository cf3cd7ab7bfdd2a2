//! Error types produced by the storage engine core.

use std::io;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StrataError>;

/// Errors the core can produce. See spec §7 for the propagation policy:
/// I/O errors always propagate; a failed mutation leaves the in-memory root
/// unchanged; cursor errors are terminal for that cursor.
#[derive(Debug, Error)]
pub enum StrataError {
    /// Underlying file I/O error; not retried above the page-I/O layer.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Null key/value where not permitted, a non-positive page size after
    /// normalization, or an unknown codec name.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Signaled only by explicit get-or-fail operations; `find` returns
    /// `None` instead of this.
    #[error("key not found")]
    KeyNotFound,

    /// Attempted read past the backing file's end.
    #[error("attempted read past end of file")]
    EndOfFile,

    /// Page metadata is structurally inconsistent (bad payload size,
    /// next-page pointing past EOF, element count outside `0..=page_size`).
    #[error("corrupt page: {0}")]
    CorruptPage(String),

    /// A second tree was registered under a name already in use.
    #[error("a tree named {0:?} is already managed by this file")]
    AlreadyManaged(String),

    /// A cursor operation was attempted on a closed or force-expired
    /// transaction.
    #[error("transaction is closed")]
    TransactionClosed,
}
