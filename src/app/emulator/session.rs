use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::app::emulator::process::{EmulatorLauncher, EmulatorProcess};
use crate::app::error::AppError;

/// Handle for the one live emulator. The process itself stays in the controller so
/// the run guard can still reach it after a cycle bails out.
#[derive(Debug, PartialEq, Eq)]
pub struct EmulatorSession {
    id: u64,
    pub pid: u32,
    pub profile: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    AlreadyExited,
    Interrupted,
    Killed,
}

struct LiveSession {
    id: u64,
    profile: String,
    process: Box<dyn EmulatorProcess>,
}

struct Registry {
    live: Option<LiveSession>,
    next_id: u64,
}

pub struct EmulatorController<'a> {
    launcher: &'a dyn EmulatorLauncher,
    grace: Duration,
    registry: Mutex<Registry>,
    trace_id: String,
}

impl<'a> EmulatorController<'a> {
    pub fn new(launcher: &'a dyn EmulatorLauncher, grace: Duration, trace_id: impl Into<String>) -> Self {
        Self {
            launcher,
            grace,
            registry: Mutex::new(Registry {
                live: None,
                next_id: 1,
            }),
            trace_id: trace_id.into(),
        }
    }

    fn registry(&self) -> Result<std::sync::MutexGuard<'_, Registry>, AppError> {
        self.registry
            .lock()
            .map_err(|_| AppError::system("Emulator registry locked", &self.trace_id))
    }

    pub fn has_live_session(&self) -> bool {
        self.registry
            .lock()
            .map(|guard| guard.live.is_some())
            .unwrap_or(false)
    }

    pub fn launch(
        &self,
        profile: &str,
        flags: &[String],
        log_path: Option<&Path>,
    ) -> Result<EmulatorSession, AppError> {
        let mut guard = self.registry()?;
        if let Some(live) = guard.live.as_ref() {
            return Err(AppError::launch(
                format!(
                    "Emulator for @{} (pid {}) is still running",
                    live.profile,
                    live.process.id()
                ),
                &self.trace_id,
            ));
        }
        let process = self.launcher.spawn(profile, flags, log_path)?;
        let id = guard.next_id;
        guard.next_id += 1;
        let session = EmulatorSession {
            id,
            pid: process.id(),
            profile: profile.to_string(),
        };
        guard.live = Some(LiveSession {
            id,
            profile: profile.to_string(),
            process,
        });
        Ok(session)
    }

    /// Interrupts the session and waits for it to exit, escalating to a kill after the
    /// grace period.
    pub fn terminate(&self, session: EmulatorSession) -> Result<Termination, AppError> {
        let live = {
            let mut guard = self.registry()?;
            match guard.live.as_ref() {
                Some(live) if live.id == session.id => guard.live.take(),
                _ => None,
            }
        };
        let Some(mut live) = live else {
            return Ok(Termination::AlreadyExited);
        };
        match stop_process(live.process.as_mut(), self.grace, &self.trace_id) {
            Ok(outcome) => {
                info!(
                    trace_id = %self.trace_id,
                    pid = session.pid,
                    profile = %session.profile,
                    outcome = ?outcome,
                    "emulator terminated"
                );
                Ok(outcome)
            }
            Err(err) => {
                // Still possibly running; keep it reachable for interrupt_all.
                warn!(trace_id = %self.trace_id, pid = session.pid, error = %err.error, "emulator stop failed");
                let mut guard = match self.registry.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                if guard.live.is_none() {
                    guard.live = Some(live);
                }
                Err(err)
            }
        }
    }

    /// Stops whatever is still registered. Used on the failure path only; never fails.
    pub fn interrupt_all(&self) -> usize {
        let live = match self.registry.lock() {
            Ok(mut guard) => guard.live.take(),
            Err(poisoned) => poisoned.into_inner().live.take(),
        };
        let Some(mut live) = live else {
            return 0;
        };
        match stop_process(live.process.as_mut(), self.grace, &self.trace_id) {
            Ok(outcome) => {
                warn!(trace_id = %self.trace_id, profile = %live.profile, outcome = ?outcome, "stopped leftover emulator")
            }
            Err(err) => {
                warn!(trace_id = %self.trace_id, profile = %live.profile, error = %err.error, "failed to stop leftover emulator, killing");
                if let Err(err) = live.process.kill() {
                    warn!(trace_id = %self.trace_id, profile = %live.profile, error = %err, "kill of leftover emulator failed");
                }
            }
        }
        1
    }
}

fn poll_exit(process: &mut dyn EmulatorProcess, trace_id: &str) -> Result<bool, AppError> {
    process
        .try_wait()
        .map_err(|err| AppError::system(format!("Failed to poll emulator: {err}"), trace_id))
}

fn stop_process(
    process: &mut dyn EmulatorProcess,
    grace: Duration,
    trace_id: &str,
) -> Result<Termination, AppError> {
    if poll_exit(process, trace_id)? {
        return Ok(Termination::AlreadyExited);
    }
    if let Err(err) = process.interrupt() {
        warn!(trace_id = %trace_id, pid = process.id(), error = %err, "failed to interrupt emulator");
    }

    let start = Instant::now();
    while start.elapsed() < grace {
        if poll_exit(process, trace_id)? {
            return Ok(Termination::Interrupted);
        }
        std::thread::sleep(Duration::from_millis(100).min(grace));
    }
    if poll_exit(process, trace_id)? {
        return Ok(Termination::Interrupted);
    }

    warn!(
        trace_id = %trace_id,
        pid = process.id(),
        grace_secs = grace.as_secs(),
        "emulator ignored interrupt, killing"
    );
    process
        .kill()
        .map_err(|err| AppError::system(format!("Failed to kill emulator: {err}"), trace_id))?;
    Ok(Termination::Killed)
}
