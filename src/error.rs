//! Error types for transaction operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while running a transaction.
#[derive(Error, Debug)]
pub enum TxError {
    #[error("original file does not exist and CREATE was not requested: {0}")]
    NotFound(PathBuf),

    #[error("path too long to build a temporary name: {0}")]
    PathTooLong(PathBuf),

    #[error("source was modified concurrently while seeding the temporary")]
    Busy,

    #[error("lock is held by another process or thread")]
    WouldBlock,

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl TxError {
    /// Wrap an [`io::Error`] with a short description of what was attempted.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        TxError::Io { context: context.into(), source }
    }

    /// True if this error represents lock contention or a busy source,
    /// i.e. what `NONBLOCKING` mode surfaces instead of waiting.
    pub fn is_busy(&self) -> bool {
        matches!(self, TxError::Busy | TxError::WouldBlock)
    }
}

impl From<TxError> for io::Error {
    fn from(e: TxError) -> Self {
        let message = e.to_string();
        match e {
            TxError::NotFound(_) => io::Error::new(io::ErrorKind::NotFound, message),
            TxError::Busy => io::Error::new(io::ErrorKind::Other, message),
            TxError::WouldBlock => io::Error::new(io::ErrorKind::WouldBlock, message),
            TxError::PathTooLong(_) => io::Error::new(io::ErrorKind::InvalidInput, message),
            TxError::Io { source, .. } => source,
        }
    }
}

pub type Result<T> = std::result::Result<T, TxError>;
