//! Transaction lifecycle: `begin` and `end` (spec §4.6).

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
use std::path::{Path, PathBuf};

use bitflags::bitflags;
use log::{debug, warn};

use crate::error::{Result, TxError};
use crate::registry::{self, Entry};
use crate::whack;

bitflags! {
    /// Flags recognized by [`begin`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TxFlags: u32 {
        /// Create the original if it does not exist.
        const CREATE = 1 << 0;
        /// Position the write offset at EOF once, at `begin` time (not
        /// `O_APPEND` semantics — writes after that do not re-seek).
        const APPEND = 1 << 1;
        /// Skip seeding; the temporary starts empty and `mode` is always
        /// taken from the caller's argument.
        const TRUNCATE = 1 << 2;
        /// Use non-blocking lock variants; contention fails with a busy
        /// error instead of waiting.
        const NONBLOCKING = 1 << 3;
    }
}

const TEMP_SUFFIX_LEN: usize = 6;
const TEMP_SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const MAX_CREATE_ATTEMPTS: u32 = 64;

fn random_suffix() -> String {
    (0..TEMP_SUFFIX_LEN)
        .map(|_| {
            let idx = fastrand::usize(..TEMP_SUFFIX_ALPHABET.len());
            TEMP_SUFFIX_ALPHABET[idx] as char
        })
        .collect()
}

/// Create `<orig_path>.<6-char-unique>` with `O_CREAT|O_EXCL` semantics,
/// retrying on name collision. The unique suffix is generated here, never
/// supplied by the caller.
fn create_temp(orig_path: &Path) -> Result<(File, PathBuf)> {
    for _ in 0..MAX_CREATE_ATTEMPTS {
        let mut name = orig_path.as_os_str().to_os_string();
        name.push(".");
        name.push(random_suffix());
        let temp_path = PathBuf::from(&name);

        match OpenOptions::new().read(true).write(true).create_new(true).open(&temp_path) {
            Ok(file) => return Ok((file, temp_path)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(TxError::io("create temporary", e)),
        }
    }

    Err(TxError::PathTooLong(orig_path.to_path_buf()))
}

/// Begin a transaction against `path` (spec §4.6.1).
///
/// Returns the writable fd into the temporary. The fd is the transaction's
/// identity: pass it to [`end`] to commit or abort.
pub fn begin(path: &Path, flags: TxFlags, mode: u32) -> Result<RawFd> {
    debug!("begin({}, {flags:?}, {mode:#o})", path.display());

    let (mut temp_file, temp_path) = create_temp(path)?;

    let orig_meta = fs::metadata(path);
    let original_exists = orig_meta.is_ok();

    if !original_exists && !flags.contains(TxFlags::CREATE) {
        cleanup_failed_temp(temp_file, &temp_path);
        return Err(TxError::NotFound(path.to_path_buf()));
    }

    let captured_mode = if flags.contains(TxFlags::TRUNCATE) || !original_exists {
        mode & 0o777
    } else {
        match &orig_meta {
            Ok(meta) => meta.permissions().mode() & 0o777,
            Err(_) => mode & 0o777,
        }
    };

    if !flags.contains(TxFlags::TRUNCATE) && original_exists {
        if let Err(e) = seed(path, &mut temp_file, flags.contains(TxFlags::NONBLOCKING)) {
            cleanup_failed_temp(temp_file, &temp_path);
            return Err(e);
        }
    }

    if flags.contains(TxFlags::APPEND) {
        temp_file.seek(SeekFrom::End(0)).map_err(|e| TxError::io("seek to end", e))?;
    } else {
        temp_file.seek(SeekFrom::Start(0)).map_err(|e| TxError::io("seek to start", e))?;
    }

    let fd = temp_file.as_raw_fd();
    // The fd must outlive this call; registry ownership takes over from the
    // caller's perspective, so leak the File's lifetime management — `end`
    // reconstructs it from the raw fd to close it.
    std::mem::forget(temp_file);

    registry::insert(
        fd,
        Entry {
            orig_path: path.to_path_buf(),
            temp_path,
            mode: captured_mode,
            handle_immutable: true,
            nonblocking: flags.contains(TxFlags::NONBLOCKING),
        },
    );

    debug!("begin({}) -> fd {fd}", path.display());
    Ok(fd)
}

fn seed(orig_path: &Path, temp_file: &mut File, nonblocking: bool) -> Result<()> {
    let mut src = File::open(orig_path).map_err(|e| TxError::io("open original for seeding", e))?;
    crate::copy::verified_copy(&mut src, temp_file, nonblocking)?;
    Ok(())
}

fn cleanup_failed_temp(file: File, path: &Path) {
    drop(file);
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("failed to unlink abandoned temporary {}: {e}", path.display());
        }
    }
}

/// End a transaction (spec §4.6.2): `fd == -1` is a no-op; otherwise close
/// the fd, look up its registry entry, and commit or abort.
pub fn end(fd: RawFd, commit: bool) -> Result<()> {
    if fd == -1 {
        return Ok(());
    }

    // SAFETY: `fd` was produced by `begin`, which handed ownership to the
    // registry via `mem::forget`; reconstructing it here and letting it drop
    // is the one place that fd is closed.
    let file = unsafe { File::from_raw_fd(fd) };
    drop(file);

    let entry = match registry::remove(fd) {
        Some(e) => e,
        None => {
            debug!("end({fd}): fd was not produced by begin(), nothing to do");
            return Ok(());
        },
    };

    if commit {
        fs::set_permissions(&entry.temp_path, fs::Permissions::from_mode(entry.mode))
            .map_err(|e| TxError::io("chmod temporary", e))?;

        whack::whack_a_mole(&entry.orig_path, &entry.temp_path, entry.handle_immutable, entry.nonblocking)
    } else {
        match fs::remove_file(&entry.temp_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TxError::io("unlink temporary on abort", e)),
        }
    }
}
