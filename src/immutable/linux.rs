//! Linux immutable attribute via `ioctl(FS_IOC_GETFLAGS/FS_IOC_SETFLAGS)`.

use std::fs::OpenOptions;
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use log::debug;

use super::ImmutableCapability;

// Not exposed by libc on all targets; matches <linux/fs.h>.
const FS_IOC_GETFLAGS: libc::c_ulong = 0x8004_7601;
const FS_IOC_SETFLAGS: libc::c_ulong = 0x4004_7602;
const FS_IMMUTABLE_FL: libc::c_int = 0x0000_0010;

pub struct LinuxImmutable;

impl LinuxImmutable {
    pub fn new() -> Self {
        LinuxImmutable
    }

    fn get_flags(&self, path: &Path) -> io::Result<libc::c_int> {
        let file = OpenOptions::new().read(true).open(path)?;
        let mut flags: libc::c_int = 0;
        let rc = unsafe { libc::ioctl(file.as_raw_fd(), FS_IOC_GETFLAGS, &mut flags) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(flags)
    }

    fn set_flags(&self, path: &Path, flags: libc::c_int) -> io::Result<()> {
        let file = OpenOptions::new().read(true).open(path)?;
        let rc = unsafe { libc::ioctl(file.as_raw_fd(), FS_IOC_SETFLAGS, &flags) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl ImmutableCapability for LinuxImmutable {
    fn is_immutable(&self, path: &Path) -> bool {
        match self.get_flags(path) {
            Ok(flags) => (flags & FS_IMMUTABLE_FL) != 0,
            Err(e) => {
                debug!("failed to get attributes for {}: {e}", path.display());
                false
            },
        }
    }

    fn clear_immutable(&self, path: &Path) -> io::Result<()> {
        let flags = self.get_flags(path)?;
        if flags & FS_IMMUTABLE_FL == 0 {
            return Ok(());
        }
        self.set_flags(path, flags & !FS_IMMUTABLE_FL)
    }

    fn set_immutable(&self, path: &Path) -> io::Result<()> {
        let flags = self.get_flags(path)?;
        self.set_flags(path, flags | FS_IMMUTABLE_FL)
    }
}
