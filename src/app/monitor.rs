use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::app::adb::bridge::DeviceBridge;
use crate::app::cancel::{sleep_with_cancel, CancelToken};
use crate::app::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Equals(&'static str),
    NonEmpty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootProbe {
    pub label: &'static str,
    pub property: &'static str,
    pub readiness: Readiness,
}

pub const BOOT_ANIMATION: BootProbe = BootProbe {
    label: "boot animation",
    property: "init.svc.bootanim",
    readiness: Readiness::Equals("stopped"),
};

pub const BOOT_COMPLETED: BootProbe = BootProbe {
    label: "boot completed",
    property: "sys.boot_completed",
    readiness: Readiness::NonEmpty,
};

impl BootProbe {
    pub fn is_ready(&self, value: &str) -> bool {
        match self.readiness {
            Readiness::Equals(expected) => value == expected,
            Readiness::NonEmpty => !value.is_empty(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootSignal {
    Ready,
    TimedOut,
    Cancelled,
}

/// Polls `probe.property` every `interval` until it reads ready, `deadline` passes, or
/// `cancel` fires. Bridge errors during boot count as "not ready yet".
pub fn wait_for_signal(
    bridge: &dyn DeviceBridge,
    probe: &BootProbe,
    deadline: Duration,
    interval: Duration,
    cancel: &CancelToken,
    trace_id: &str,
) -> BootSignal {
    let start = Instant::now();
    let mut device_seen = false;
    let mut queries = 0u32;

    loop {
        if cancel.is_cancelled() {
            return BootSignal::Cancelled;
        }
        let remaining = deadline.saturating_sub(start.elapsed());

        if !device_seen {
            match bridge.wait_for_device(remaining) {
                Ok(()) => device_seen = true,
                Err(err) => debug!(trace_id = %trace_id, error = %err.error, "device not visible yet"),
            }
        }

        if device_seen {
            queries += 1;
            match bridge.get_prop(probe.property) {
                Ok(value) if probe.is_ready(&value) => {
                    info!(
                        trace_id = %trace_id,
                        signal = probe.label,
                        queries,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "boot signal ready"
                    );
                    return BootSignal::Ready;
                }
                Ok(value) => {
                    debug!(trace_id = %trace_id, property = probe.property, value = %value, "not ready")
                }
                Err(err) => {
                    debug!(trace_id = %trace_id, property = probe.property, error = %err.error, "property query failed")
                }
            }
        }

        let remaining = deadline.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            return BootSignal::TimedOut;
        }
        if !sleep_with_cancel(interval.min(remaining), cancel) {
            return BootSignal::Cancelled;
        }
    }
}

/// `wait_for_signal` with the non-ready outcomes mapped onto cycle errors.
pub fn require_signal(
    bridge: &dyn DeviceBridge,
    probe: &BootProbe,
    deadline: Duration,
    interval: Duration,
    cancel: &CancelToken,
    trace_id: &str,
) -> Result<(), AppError> {
    match wait_for_signal(bridge, probe, deadline, interval, cancel, trace_id) {
        BootSignal::Ready => Ok(()),
        BootSignal::TimedOut => Err(AppError::signal_timeout(
            format!(
                "Timed out after {}s waiting for {} ({})",
                deadline.as_secs(),
                probe.label,
                probe.property
            ),
            trace_id,
        )),
        BootSignal::Cancelled => Err(AppError::cancelled(
            format!("Cancelled while waiting for {}", probe.label),
            trace_id,
        )),
    }
}
