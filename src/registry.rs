//! Process-wide registry of live transactions (spec §4.5).
//!
//! `end` is handed only an fd; this registry is how it recovers the
//! transaction's metadata (original path, temp path, captured mode).

use std::os::unix::io::RawFd;
use std::path::PathBuf;
use std::sync::Mutex;

use ahash::HashMap;
use once_cell::sync::Lazy;

/// Metadata for one open transaction, keyed by its fd in the registry.
#[derive(Debug, Clone)]
pub struct Entry {
    pub orig_path: PathBuf,
    pub temp_path: PathBuf,
    pub mode: u32,
    pub handle_immutable: bool,
    pub nonblocking: bool,
}

static REGISTRY: Lazy<Mutex<HashMap<RawFd, Entry>>> = Lazy::new(|| Mutex::new(HashMap::default()));

/// Register a newly created transaction under its fd.
///
/// The map is injective by construction: `begin` always creates a fresh fd
/// via `File::open`/`OpenOptions`, and no fd is registered twice without an
/// intervening `remove`.
pub fn insert(fd: RawFd, entry: Entry) {
    REGISTRY.lock().unwrap().insert(fd, entry);
}

/// Remove and return the transaction registered under `fd`, if any.
pub fn remove(fd: RawFd) -> Option<Entry> {
    REGISTRY.lock().unwrap().remove(&fd)
}

/// Snapshot every temp path still registered, for signal/exit cleanup.
///
/// Does not drain the registry — cleanup only needs to know what to unlink,
/// not to mutate live process state mid-shutdown.
pub fn live_temp_paths() -> Vec<PathBuf> {
    REGISTRY.lock().unwrap().values().map(|e| e.temp_path.clone()).collect()
}
