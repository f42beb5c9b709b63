//! Atomic file update transactions: `begin`, write, `end(commit)` or `end(abort)`.
//!
//! Built directly on POSIX primitives (`flock`, `rename`, `ioctl`); Unix only.

pub mod copy;
pub mod error;
pub mod immutable;
pub mod registry;
#[cfg(unix)]
pub mod signals;
pub mod transaction;
pub mod whack;

pub use error::{Result, TxError};
pub use transaction::{begin, end, TxFlags};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
