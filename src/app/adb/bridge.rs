use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::app::adb::parse::{
    normalize_prop_value, parse_am_start_status, parse_install_failure, ActivityStartStatus,
};
use crate::app::adb::runner::{run_command_with_timeout, CommandOutput};
use crate::app::error::AppError;
use crate::app::sdk::locator::resolve_adb_program;

/// Everything the harness asks of the device side. Exactly one emulator is attached at a
/// time, so no serial is passed around.
pub trait DeviceBridge {
    /// Blocks until a device is visible or `timeout` passes.
    fn wait_for_device(&self, timeout: Duration) -> Result<(), AppError>;
    /// Returns the property value, empty when unset.
    fn get_prop(&self, name: &str) -> Result<String, AppError>;
    /// Raw `getprop` output for diagnostics.
    fn dump_props(&self) -> Result<String, AppError>;
    fn shell(&self, command: &[String]) -> Result<CommandOutput, AppError>;
    fn install(&self, apk: &Path, grant_permissions: bool) -> Result<(), AppError>;
    fn start_activity(&self, component: &str) -> Result<(), AppError>;
    fn restart_server(&self) -> Result<(), AppError>;
}

enum AdbProgram {
    Fixed(String),
    /// Looked up on every call; platform-tools may only appear after host setup.
    FromSdk(PathBuf),
}

pub struct AdbBridge {
    program: AdbProgram,
    timeout: Duration,
    trace_id: String,
}

impl AdbBridge {
    pub fn new(program: impl Into<String>, timeout: Duration, trace_id: impl Into<String>) -> Self {
        Self {
            program: AdbProgram::Fixed(program.into()),
            timeout,
            trace_id: trace_id.into(),
        }
    }

    /// Prefers `{sdk_root}/platform-tools/adb` as soon as it exists.
    pub fn for_sdk(sdk_root: impl Into<PathBuf>, timeout: Duration, trace_id: impl Into<String>) -> Self {
        Self {
            program: AdbProgram::FromSdk(sdk_root.into()),
            timeout,
            trace_id: trace_id.into(),
        }
    }

    pub fn program(&self) -> String {
        match &self.program {
            AdbProgram::Fixed(program) => program.clone(),
            AdbProgram::FromSdk(sdk_root) => resolve_adb_program(sdk_root),
        }
    }

    fn run(&self, args: &[&str], timeout: Duration) -> Result<CommandOutput, AppError> {
        let args = args.iter().map(|arg| arg.to_string()).collect::<Vec<_>>();
        run_command_with_timeout(&self.program(), &args, timeout, &self.trace_id)
    }

    fn run_checked(&self, args: &[&str]) -> Result<CommandOutput, AppError> {
        let output = self.run(args, self.timeout)?;
        if !output.success() {
            return Err(AppError::system(
                format!("adb {} failed: {}", args.join(" "), output.failure_detail()),
                &self.trace_id,
            ));
        }
        Ok(output)
    }
}

impl DeviceBridge for AdbBridge {
    fn wait_for_device(&self, timeout: Duration) -> Result<(), AppError> {
        let output = self.run(&["wait-for-device"], timeout)?;
        if !output.success() {
            return Err(AppError::system(
                format!("adb wait-for-device failed: {}", output.failure_detail()),
                &self.trace_id,
            ));
        }
        Ok(())
    }

    fn get_prop(&self, name: &str) -> Result<String, AppError> {
        let output = self.run_checked(&["exec-out", "getprop", name])?;
        Ok(normalize_prop_value(&output.stdout))
    }

    fn dump_props(&self) -> Result<String, AppError> {
        Ok(self.run_checked(&["shell", "getprop"])?.stdout)
    }

    fn shell(&self, command: &[String]) -> Result<CommandOutput, AppError> {
        let mut args = vec!["shell"];
        args.extend(command.iter().map(String::as_str));
        self.run(&args, self.timeout)
    }

    fn install(&self, apk: &Path, grant_permissions: bool) -> Result<(), AppError> {
        let apk = apk.to_string_lossy().to_string();
        let mut args = vec!["install", "-r"];
        if grant_permissions {
            args.push("-g");
        }
        args.push(&apk);
        let output = self
            .run(&args, self.timeout.max(Duration::from_secs(120)))
            .map_err(|err| AppError::install_or_launch(err.error, &self.trace_id))?;
        let combined = format!("{}\n{}", output.stdout, output.stderr);
        if let Some(reason) = parse_install_failure(&combined) {
            return Err(AppError::install_or_launch(
                format!("Install of {apk} failed: {reason}"),
                &self.trace_id,
            ));
        }
        if !output.success() {
            return Err(AppError::install_or_launch(
                format!("Install of {apk} failed: {}", output.failure_detail()),
                &self.trace_id,
            ));
        }
        info!(trace_id = %self.trace_id, apk = %apk, "installed apk");
        Ok(())
    }

    fn start_activity(&self, component: &str) -> Result<(), AppError> {
        let output = self
            .run(&["shell", "am", "start", "-W", "-n", component], self.timeout)
            .map_err(|err| AppError::install_or_launch(err.error, &self.trace_id))?;
        if !output.success() {
            return Err(AppError::install_or_launch(
                format!("am start {component} failed: {}", output.failure_detail()),
                &self.trace_id,
            ));
        }
        match parse_am_start_status(&output.stdout) {
            ActivityStartStatus::Ok => Ok(()),
            ActivityStartStatus::Failed(reason) => Err(AppError::install_or_launch(
                format!("am start {component} failed: {reason}"),
                &self.trace_id,
            )),
        }
    }

    fn restart_server(&self) -> Result<(), AppError> {
        // kill-server fails harmlessly when no server is running.
        let _ = self.run(&["kill-server"], self.timeout);
        self.run_checked(&["start-server"])?;
        debug!(trace_id = %self.trace_id, "adb server restarted");
        Ok(())
    }
}
