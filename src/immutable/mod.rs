//! Platform-specific immutable-attribute capability (spec §4.3).
//!
//! Exposed as one trait with a `cfg(target_os = ...)`-selected
//! implementation so the commit path (`whack.rs`) is written once against
//! the trait.

use std::path::Path;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(any(target_os = "macos", target_os = "freebsd", target_os = "openbsd", target_os = "netbsd"))]
mod bsd;
#[cfg(not(any(
    target_os = "linux",
    target_os = "macos",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd"
)))]
mod weak;

#[cfg(target_os = "linux")]
pub use linux::LinuxImmutable as PlatformImmutable;
#[cfg(any(target_os = "macos", target_os = "freebsd", target_os = "openbsd", target_os = "netbsd"))]
pub use bsd::BsdImmutable as PlatformImmutable;
#[cfg(not(any(
    target_os = "linux",
    target_os = "macos",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd"
)))]
pub use weak::WeakImmutable as PlatformImmutable;

/// Test/clear/set the immutable attribute of a file.
///
/// Implementations are best-effort: a platform with no such concept reports
/// `is_immutable() == false` always and treats `clear`/`set` as successful
/// no-ops, so callers never need to special-case platform support.
pub trait ImmutableCapability {
    fn is_immutable(&self, path: &Path) -> bool;
    fn clear_immutable(&self, path: &Path) -> std::io::Result<()>;
    fn set_immutable(&self, path: &Path) -> std::io::Result<()>;
}

/// Get the immutable-attribute handler for the current platform.
pub fn platform() -> PlatformImmutable {
    PlatformImmutable::new()
}
