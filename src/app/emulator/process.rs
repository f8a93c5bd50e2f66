use std::fs::File;
use std::io;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tracing::info;

use crate::app::error::AppError;

/// A running emulator as the session controller sees it.
pub trait EmulatorProcess: Send {
    fn id(&self) -> u32;
    /// Asks the emulator to shut down cleanly. Succeeds if it has already exited.
    fn interrupt(&mut self) -> io::Result<()>;
    /// Non-blocking; true once the process has exited and been reaped.
    fn try_wait(&mut self) -> io::Result<bool>;
    /// Forced kill followed by a blocking reap.
    fn kill(&mut self) -> io::Result<()>;
}

pub trait EmulatorLauncher {
    fn spawn(
        &self,
        profile: &str,
        flags: &[String],
        log_path: Option<&Path>,
    ) -> Result<Box<dyn EmulatorProcess>, AppError>;
}

pub struct ChildProcess {
    child: Child,
    reaped: bool,
}

impl ChildProcess {
    pub fn new(child: Child) -> Self {
        Self {
            child,
            reaped: false,
        }
    }
}

impl EmulatorProcess for ChildProcess {
    fn id(&self) -> u32 {
        self.child.id()
    }

    fn interrupt(&mut self) -> io::Result<()> {
        // Once reaped the pid may belong to someone else.
        if self.reaped {
            return Ok(());
        }
        let pid = Pid::from_raw(self.child.id() as i32);
        match kill(pid, Signal::SIGINT) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(errno) => Err(io::Error::from(errno)),
        }
    }

    fn try_wait(&mut self) -> io::Result<bool> {
        if !self.reaped {
            self.reaped = self.child.try_wait()?.is_some();
        }
        Ok(self.reaped)
    }

    fn kill(&mut self) -> io::Result<()> {
        if self.reaped {
            return Ok(());
        }
        self.child.kill()?;
        self.child.wait()?;
        self.reaped = true;
        Ok(())
    }
}

/// Spawns `emulator @{profile} {flags}` in the background.
pub struct CommandLauncher {
    program: String,
    trace_id: String,
}

impl CommandLauncher {
    pub fn new(program: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            trace_id: trace_id.into(),
        }
    }
}

impl EmulatorLauncher for CommandLauncher {
    fn spawn(
        &self,
        profile: &str,
        flags: &[String],
        log_path: Option<&Path>,
    ) -> Result<Box<dyn EmulatorProcess>, AppError> {
        let (stdout, stderr) = match log_path {
            Some(path) => {
                let file = File::create(path).map_err(|err| {
                    AppError::launch(
                        format!("Failed to open emulator log {}: {err}", path.display()),
                        &self.trace_id,
                    )
                })?;
                let dup = file.try_clone().map_err(|err| {
                    AppError::launch(format!("Failed to open emulator log: {err}"), &self.trace_id)
                })?;
                (Stdio::from(file), Stdio::from(dup))
            }
            None => (Stdio::null(), Stdio::null()),
        };

        let child = Command::new(&self.program)
            .arg(format!("@{profile}"))
            .args(flags)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|err| {
                AppError::launch(format!("Failed to spawn emulator: {err}"), &self.trace_id)
            })?;
        info!(trace_id = %self.trace_id, pid = child.id(), profile = %profile, "emulator spawned");
        Ok(Box::new(ChildProcess::new(child)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn wait_exit(process: &mut dyn EmulatorProcess, timeout: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if process.try_wait().expect("try_wait") {
                return true;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        false
    }

    #[test]
    fn interrupt_stops_sleeping_child() {
        let child = Command::new("sh")
            .args(["-c", "sleep 30"])
            .spawn()
            .expect("spawn sleep");
        let mut process = ChildProcess::new(child);
        assert!(!process.try_wait().expect("try_wait"));
        process.interrupt().expect("interrupt");
        assert!(wait_exit(&mut process, Duration::from_secs(5)));
        // Already reaped; a second interrupt must not fail.
        process.interrupt().expect("interrupt again");
    }

    #[test]
    fn kill_handles_signal_ignoring_child() {
        let child = Command::new("sh")
            .args(["-c", "trap '' INT; sleep 30"])
            .spawn()
            .expect("spawn");
        let mut process = ChildProcess::new(child);
        std::thread::sleep(Duration::from_millis(100));
        process.interrupt().expect("interrupt");
        assert!(!wait_exit(&mut process, Duration::from_millis(300)));
        process.kill().expect("kill");
        assert!(process.try_wait().expect("try_wait"));
    }

    #[test]
    fn launcher_reports_missing_binary() {
        let launcher = CommandLauncher::new("/no/such/emulator", "trace-launch");
        let err = launcher.spawn("test", &[], None).err().expect("spawn error");
        assert_eq!(err.code, "ERR_LAUNCH");
    }

    #[test]
    fn launcher_writes_log_file() {
        let dir = tempfile::TempDir::new().expect("tmp");
        let log = dir.path().join("emulator.log");
        let launcher = CommandLauncher::new("echo", "trace-log");
        let mut process = launcher
            .spawn("test", &["-no-window".to_string()], Some(&log))
            .expect("spawn");
        assert!(wait_exit(process.as_mut(), Duration::from_secs(5)));
        assert_eq!(std::fs::read_to_string(&log).expect("log").trim(), "@test -no-window");
    }
}
