//! BSD/macOS immutable attribute via `st_flags`/`chflags`.

use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use log::debug;

use super::ImmutableCapability;

pub struct BsdImmutable;

impl BsdImmutable {
    pub fn new() -> Self {
        BsdImmutable
    }

    fn flags(&self, path: &Path) -> io::Result<libc::c_uint> {
        let mut stat: libc::stat = unsafe { std::mem::zeroed() };
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let rc = unsafe { libc::stat(c_path.as_ptr(), &mut stat) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(stat.st_flags)
    }

    fn chflags(&self, path: &Path, flags: libc::c_uint) -> io::Result<()> {
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let rc = unsafe { libc::chflags(c_path.as_ptr(), flags) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl ImmutableCapability for BsdImmutable {
    fn is_immutable(&self, path: &Path) -> bool {
        match self.flags(path) {
            Ok(flags) => (flags & (libc::UF_IMMUTABLE | libc::SF_IMMUTABLE)) != 0,
            Err(e) => {
                debug!("failed to get attributes for {}: {e}", path.display());
                false
            },
        }
    }

    fn clear_immutable(&self, path: &Path) -> io::Result<()> {
        let flags = self.flags(path)?;
        self.chflags(path, flags & !(libc::UF_IMMUTABLE | libc::SF_IMMUTABLE))
    }

    fn set_immutable(&self, path: &Path) -> io::Result<()> {
        let flags = self.flags(path)?;
        self.chflags(path, flags | libc::UF_IMMUTABLE)
    }
}
