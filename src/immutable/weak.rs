//! No-op immutable capability for platforms without the concept.

use std::io;
use std::path::Path;

use log::debug;

use super::ImmutableCapability;

pub struct WeakImmutable;

impl WeakImmutable {
    pub fn new() -> Self {
        WeakImmutable
    }
}

impl ImmutableCapability for WeakImmutable {
    fn is_immutable(&self, path: &Path) -> bool {
        debug!("immutable attributes not supported on this platform ({})", path.display());
        false
    }

    fn clear_immutable(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }

    fn set_immutable(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }
}
