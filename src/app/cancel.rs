use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

use crate::app::error::AppError;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigint(_signal: nix::libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Routes Ctrl-C into every `CancelToken` so waits unwind through the run guard instead
/// of the process dying with a patched ramdisk in place.
pub fn install_interrupt_handler(trace_id: &str) -> Result<(), AppError> {
    let action = SigAction::new(
        SigHandler::Handler(on_sigint),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    // SAFETY: the handler only performs an atomic store, which is async-signal-safe.
    unsafe { sigaction(Signal::SIGINT, &action) }.map_err(|err| {
        AppError::system(format!("Failed to install SIGINT handler: {err}"), trace_id)
    })?;
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || INTERRUPTED.load(Ordering::SeqCst)
    }
}

/// Sleeps in short chunks; returns false when cancelled before `duration` elapsed.
pub fn sleep_with_cancel(duration: Duration, token: &CancelToken) -> bool {
    let mut remaining = duration;
    let chunk = Duration::from_millis(50);
    while remaining > Duration::ZERO {
        if token.is_cancelled() {
            return false;
        }
        let step = remaining.min(chunk);
        std::thread::sleep(step);
        remaining = remaining.saturating_sub(step);
    }
    !token.is_cancelled()
}
