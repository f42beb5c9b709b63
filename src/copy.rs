//! Stream Copier and Verified Copier (spec §4.1, §4.2).

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::unix::io::AsRawFd;

use fs2::FileExt;
use log::{debug, trace, warn};

use crate::error::{Result, TxError};

const COPY_BUFFER_SIZE: usize = 4 * 1024;

/// Copy all bytes from `src` to `dst`, retrying on `EINTR` and short reads/writes.
///
/// Mirrors a plain `read`/`write` loop rather than buffered I/O: short reads
/// are accumulated until EOF or the buffer is full, short writes are retried
/// until the whole chunk lands.
pub fn copy_stream(src: &mut File, dst: &mut File) -> Result<u64> {
    let mut buffer = [0u8; COPY_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let n_read = read_full_or_eof(src, &mut buffer)?;
        trace!("read {n_read} bytes from source");
        if n_read == 0 {
            break;
        }

        write_all_retrying(dst, &buffer[..n_read])?;
        trace!("wrote {n_read} bytes to destination");
        total += n_read as u64;
    }

    Ok(total)
}

/// Read until the buffer is full or EOF, retrying on `EINTR`.
fn read_full_or_eof(src: &mut File, buffer: &mut [u8]) -> Result<usize> {
    let mut n_read = 0;
    loop {
        match src.read(&mut buffer[n_read..]) {
            Ok(0) => return Ok(n_read),
            Ok(n) => {
                n_read += n;
                if n_read == buffer.len() {
                    return Ok(n_read);
                }
            },
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(TxError::io("read from source", e)),
        }
    }
}

/// Write the whole chunk, retrying short writes and `EINTR`.
fn write_all_retrying(dst: &mut File, mut chunk: &[u8]) -> Result<()> {
    while !chunk.is_empty() {
        match dst.write(chunk) {
            Ok(0) => return Err(TxError::io("write to destination", io::ErrorKind::WriteZero.into())),
            Ok(n) => chunk = &chunk[n..],
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(TxError::io("write to destination", e)),
        }
    }
    Ok(())
}

/// `fstat`'s mtime at (seconds, nanoseconds) precision — `SystemTime` alone
/// loses the granularity the source-mutation double-check needs.
fn mtime(file: &File) -> Result<(i64, i64)> {
    #[cfg(unix)]
    {
        let mut stat: libc::stat = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::fstat(file.as_raw_fd(), &mut stat) };
        if rc != 0 {
            return Err(TxError::io("fstat source", io::Error::last_os_error()));
        }
        Ok((stat.st_mtime as i64, stat.st_mtime_nsec as i64))
    }
    #[cfg(not(unix))]
    {
        let modified = file.metadata().map_err(|e| TxError::io("stat source", e))?.modified()
            .map_err(|e| TxError::io("read mtime", e))?;
        let dur = modified.duration_since(std::time::UNIX_EPOCH).unwrap_or_default();
        Ok((dur.as_secs() as i64, dur.subsec_nanos() as i64))
    }
}

/// Verified Copier (spec §4.2): shared-lock the source, copy, and confirm via
/// an mtime double-check that nothing mutated it mid-copy. Retries the copy
/// in blocking mode; reports busy in non-blocking mode.
pub fn verified_copy(src: &mut File, dst: &mut File, nonblocking: bool) -> Result<u64> {
    if nonblocking {
        src.try_lock_shared().map_err(|e| {
            if e.kind() == io::ErrorKind::WouldBlock {
                TxError::WouldBlock
            } else {
                TxError::io("lock source (shared)", e)
            }
        })?;
    } else {
        src.lock_shared().map_err(|e| TxError::io("lock source (shared)", e))?;
    }
    debug!("acquired shared lock on source for seeding");

    let result = verified_copy_locked(src, dst, nonblocking);

    if let Err(e) = src.unlock() {
        warn!("failed to release shared lock on source: {e}");
    }

    result
}

fn verified_copy_locked(src: &mut File, dst: &mut File, nonblocking: bool) -> Result<u64> {
    loop {
        let before = mtime(src)?;

        dst.seek(SeekFrom::Start(0)).map_err(|e| TxError::io("rewind temp", e))?;
        dst.set_len(0).map_err(|e| TxError::io("truncate temp", e))?;
        src.seek(SeekFrom::Start(0)).map_err(|e| TxError::io("rewind source", e))?;

        let copied = copy_stream(src, dst)?;

        let after = mtime(src)?;

        if before == after {
            return Ok(copied);
        }

        debug!("source mtime changed during seed copy, {}", if nonblocking { "reporting busy" } else { "retrying" });
        if nonblocking {
            return Err(TxError::Busy);
        }
    }
}
