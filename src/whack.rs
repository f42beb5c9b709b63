//! Convergent rename protocol ("whack-a-mole", spec §4.4).

use std::ffi::OsStr;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use log::{debug, warn};

use crate::error::{Result, TxError};
use crate::immutable::{self, ImmutableCapability};

const MOLE_SUFFIX: &str = ".mole";

/// `<path>.mole`
fn mole_path(temp_path: &Path) -> PathBuf {
    let mut name = temp_path.as_os_str().to_os_string();
    name.push(MOLE_SUFFIX);
    PathBuf::from(name)
}

/// True if `entry` is a mole of `orig_basename`: same length as
/// `orig_basename + ".XXXXXX" + ".mole"`, starting with `orig_basename` and
/// ending with `.mole` (spec Glossary: "Mole predicate").
fn is_a_mole(orig_basename: &OsStr, entry: &OsStr) -> bool {
    let orig_bytes = orig_basename.as_encoded_bytes();
    let entry_bytes = entry.as_encoded_bytes();

    let expected_len = orig_bytes.len() + 7 + MOLE_SUFFIX.len();
    if entry_bytes.len() != expected_len {
        return false;
    }
    if !entry_bytes.starts_with(orig_bytes) {
        return false;
    }
    entry_bytes.ends_with(MOLE_SUFFIX.as_bytes())
}

/// Scan `dir` for every mole of `orig_basename`, keeping only the
/// lexicographically greatest as the survivor and unlinking the rest.
///
/// Returns the survivor's full path. `initial_mole` is always a candidate —
/// it is the caller's own promoted temporary and must be included even if
/// the scan somehow misses it (e.g. a racing unlink).
fn scan_and_eliminate(dir: &Path, orig_basename: &OsStr, initial_mole: &Path) -> Result<PathBuf> {
    let mut survivor: Option<PathBuf> = None;

    let entries = fs::read_dir(dir).map_err(|e| TxError::io("open target directory", e))?;
    for entry in entries {
        let entry = entry.map_err(|e| TxError::io("read target directory", e))?;
        let name = entry.file_name();
        if !is_a_mole(orig_basename, &name) {
            continue;
        }
        let challenger = dir.join(&name);
        debug!("found mole challenger {}", challenger.display());

        survivor = Some(match survivor {
            None => challenger,
            Some(current) => {
                if challenger.as_os_str() > current.as_os_str() {
                    let _ = fs::remove_file(&current);
                    debug!("wacked previous survivor {}", current.display());
                    challenger
                } else {
                    let _ = fs::remove_file(&challenger);
                    debug!("wacked challenger {}", challenger.display());
                    current
                }
            },
        });
    }

    Ok(survivor.unwrap_or_else(|| initial_mole.to_path_buf()))
}

/// Run the convergent rename protocol: promote `temp_path` to a mole, find
/// the cohort-wide survivor, and rename it onto `orig_path` under an
/// exclusive lock.
pub fn whack_a_mole(orig_path: &Path, temp_path: &Path, handle_immutable: bool, nonblocking: bool) -> Result<()> {
    let mole = mole_path(temp_path);
    fs::rename(temp_path, &mole).map_err(|e| TxError::io("promote temp to mole", e))?;
    debug!("promoted {} to mole {}", temp_path.display(), mole.display());

    let dir = orig_path.parent().unwrap_or_else(|| Path::new("."));
    let orig_basename = orig_path.file_name().ok_or_else(|| TxError::PathTooLong(orig_path.to_path_buf()))?;

    let survivor = scan_and_eliminate(dir, orig_basename, &mole)?;
    debug!("survivor chosen: {}", survivor.display());

    let lock_file = match OpenOptions::new().read(true).open(orig_path) {
        Ok(f) => Some(f),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(TxError::io("open original for locking", e)),
    };

    if let Some(ref f) = lock_file {
        if nonblocking {
            f.try_lock_exclusive().map_err(|e| {
                if e.kind() == std::io::ErrorKind::WouldBlock {
                    TxError::WouldBlock
                } else {
                    TxError::io("lock original (exclusive)", e)
                }
            })?;
        } else {
            f.lock_exclusive().map_err(|e| TxError::io("lock original (exclusive)", e))?;
        }
        debug!("acquired exclusive lock on {}", orig_path.display());
    }

    let cap = immutable::platform();
    let was_immutable = handle_immutable && cap.is_immutable(orig_path);
    if was_immutable {
        if let Err(e) = cap.clear_immutable(orig_path) {
            warn!("failed to clear immutable attribute on {}: {e}", orig_path.display());
        }
    }

    let rename_result = fs::rename(&survivor, orig_path);

    let mut teardown_err = None;

    if was_immutable {
        if let Err(e) = cap.set_immutable(orig_path) {
            warn!("failed to restore immutable attribute on {}: {e}", orig_path.display());
            teardown_err.get_or_insert(TxError::io("restore immutable attribute", e));
        }
    }
    if let Some(f) = lock_file {
        if let Err(e) = f.unlock() {
            warn!("failed to release exclusive lock on {}: {e}", orig_path.display());
            teardown_err.get_or_insert(TxError::io("release exclusive lock", e));
        }
    }

    match rename_result {
        Ok(()) => {
            debug!("replaced {} with survivor {}", orig_path.display(), survivor.display());
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(
                "survivor {} already adopted by another committer before our rename",
                survivor.display()
            );
        },
        Err(e) => return Err(TxError::io("rename survivor onto original", e)),
    }

    // Rename success wins: a teardown error is surfaced, but does not undo
    // the fact that the cohort's content is now at `orig_path`.
    if let Some(e) = teardown_err {
        return Err(e);
    }

    Ok(())
}
