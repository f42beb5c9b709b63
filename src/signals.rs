//! Process-termination cleanup: unlink live temporaries on signal or exit.
//!
//! Grounded directly on raw `sigaction` rather than a crate like `ctrlc`,
//! because a crash handler needs to chain to whatever disposition the
//! process already had installed (another library's handler, or the
//! default), not replace it outright.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use log::{debug, warn};
use once_cell::sync::Lazy;

static INSTALLED: AtomicBool = AtomicBool::new(false);

static OLD_HANDLERS: Lazy<Mutex<[libc::sigaction; 4]>> =
    Lazy::new(|| Mutex::new([unsafe { std::mem::zeroed() }; 4]));

const TRACKED_SIGNALS: [libc::c_int; 4] = [libc::SIGINT, libc::SIGTERM, libc::SIGHUP, libc::SIGQUIT];

fn slot_for(sig: libc::c_int) -> Option<usize> {
    TRACKED_SIGNALS.iter().position(|&s| s == sig)
}

fn cleanup_live_temporaries() {
    for path in crate::registry::live_temp_paths() {
        if let Err(e) = std::fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("failed to unlink {} during shutdown cleanup: {e}", path.display());
            }
        }
    }
}

extern "C" fn handle_signal(sig: libc::c_int) {
    cleanup_live_temporaries();

    let Some(idx) = slot_for(sig) else { return };
    let old = OLD_HANDLERS.lock().unwrap()[idx];

    unsafe {
        libc::sigaction(sig, &old, std::ptr::null_mut());

        let handler = old.sa_sigaction;
        if handler == libc::SIG_DFL || handler == libc::SIG_IGN {
            libc::raise(sig);
        } else if old.sa_flags & libc::SA_SIGINFO != 0 {
            // Can't reconstruct the siginfo_t/ucontext_t this handler
            // expects; re-raise so the chained disposition still runs.
            libc::raise(sig);
        } else {
            let plain_handler: extern "C" fn(libc::c_int) = std::mem::transmute(handler);
            plain_handler(sig);
        }
    }
}

extern "C" fn atexit_cleanup() {
    cleanup_live_temporaries();
}

/// Install handlers for SIGINT/SIGTERM/SIGHUP/SIGQUIT and an `atexit` hook
/// that unlink every temporary still registered in the process, then chain
/// to whatever disposition was previously installed. Idempotent: a second
/// call is a no-op.
pub fn install_cleanup() {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        return;
    }

    unsafe {
        if libc::atexit(atexit_cleanup) != 0 {
            debug!("failed to register atexit cleanup hook");
        }
    }

    let mut sa: libc::sigaction = unsafe { std::mem::zeroed() };
    sa.sa_sigaction = handle_signal as usize;
    unsafe {
        libc::sigemptyset(&mut sa.sa_mask);
    }

    let mut old_handlers = OLD_HANDLERS.lock().unwrap();
    for (idx, &sig) in TRACKED_SIGNALS.iter().enumerate() {
        let rc = unsafe { libc::sigaction(sig, &sa, &mut old_handlers[idx]) };
        if rc != 0 {
            debug!("failed to install handler for signal {sig}");
        }
    }
    drop(old_handlers);

    debug!("installed cleanup handlers for process termination");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_cleanup_is_idempotent() {
        install_cleanup();
        install_cleanup();
        assert!(INSTALLED.load(Ordering::SeqCst));
    }
}
