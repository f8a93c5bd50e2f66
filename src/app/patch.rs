use std::path::Path;
use std::time::Duration;

use regex::Regex;
use tracing::info;

use crate::app::adb::bridge::DeviceBridge;
use crate::app::adb::runner::run_command_with_timeout;
use crate::app::error::AppError;

/// Mutates the live ramdisk in place. Runs while the unpatched emulator is up.
pub trait PatchInvoker {
    fn patch(&self, ramdisk: &Path) -> Result<(), AppError>;
}

pub struct CommandPatcher {
    command: Vec<String>,
    timeout: Duration,
    trace_id: String,
}

impl CommandPatcher {
    pub fn new(command: Vec<String>, timeout: Duration, trace_id: impl Into<String>) -> Self {
        Self {
            command,
            timeout,
            trace_id: trace_id.into(),
        }
    }
}

impl PatchInvoker for CommandPatcher {
    fn patch(&self, ramdisk: &Path) -> Result<(), AppError> {
        let Some((program, leading)) = self.command.split_first() else {
            return Err(AppError::validation("Patch command is empty", &self.trace_id));
        };
        let mut args = leading.to_vec();
        args.push(ramdisk.to_string_lossy().to_string());
        let output = run_command_with_timeout(program, &args, self.timeout, &self.trace_id)
            .map_err(|err| AppError::patch(err.error, &self.trace_id))?;
        if !output.success() {
            return Err(AppError::patch(
                format!(
                    "Patch command exited with {:?}: {}",
                    output.exit_code,
                    output.failure_detail()
                ),
                &self.trace_id,
            ));
        }
        info!(trace_id = %self.trace_id, ramdisk = %ramdisk.display(), "ramdisk patched");
        Ok(())
    }
}

/// Asks the patched system for its version string and checks it against `pattern`.
pub fn verify_patch(
    bridge: &dyn DeviceBridge,
    command: &[String],
    pattern: &Regex,
    trace_id: &str,
) -> Result<String, AppError> {
    let output = bridge
        .shell(command)
        .map_err(|err| AppError::verification(err.error, trace_id))?;
    if !output.success() {
        return Err(AppError::verification(
            format!(
                "`{}` exited with {:?}: {}",
                command.join(" "),
                output.exit_code,
                output.failure_detail()
            ),
            trace_id,
        ));
    }
    let reported = output.stdout.trim().to_string();
    if !pattern.is_match(&reported) {
        return Err(AppError::verification(
            format!("`{}` reported {reported:?}, expected /{}/", command.join(" "), pattern.as_str()),
            trace_id,
        ));
    }
    info!(trace_id = %trace_id, version = %reported, "patch verified");
    Ok(reported)
}
