use std::time::Duration;

use tracing::{info, warn};

use crate::app::adb::runner::{run_command_with_input, CommandOutput};
use crate::app::error::AppError;

/// sdkmanager and avdmanager, reduced to what the harness needs.
pub trait SdkTools {
    fn accept_licenses(&self) -> Result<(), AppError>;
    /// Installs host-side packages (platform-tools, emulator) from the given channel.
    fn install_host_packages(&self, packages: &[&str], channel: u32) -> Result<(), AppError>;
    /// Downloads a system image. Re-running with an installed package is a no-op.
    fn provision(&self, package: &str) -> Result<(), AppError>;
    /// Creates the profile, replacing any existing one with the same name.
    fn create_profile(&self, name: &str, package: &str) -> Result<(), AppError>;
    fn delete_profile(&self, name: &str) -> Result<(), AppError>;
}

pub struct SdkManagerTools {
    sdkmanager: String,
    avdmanager: String,
    timeout: Duration,
    trace_id: String,
}

impl SdkManagerTools {
    pub fn new(
        sdkmanager: impl Into<String>,
        avdmanager: impl Into<String>,
        timeout: Duration,
        trace_id: impl Into<String>,
    ) -> Self {
        Self {
            sdkmanager: sdkmanager.into(),
            avdmanager: avdmanager.into(),
            timeout,
            trace_id: trace_id.into(),
        }
    }

    fn sdkmanager(&self, args: Vec<String>, input: Option<Vec<u8>>) -> Result<CommandOutput, AppError> {
        let output = run_command_with_input(&self.sdkmanager, &args, input, self.timeout, &self.trace_id)
            .map_err(|err| AppError::provisioning(err.error, &self.trace_id))?;
        if !output.success() {
            return Err(AppError::provisioning(
                format!("sdkmanager {} failed: {}", args.join(" "), output.failure_detail()),
                &self.trace_id,
            ));
        }
        Ok(output)
    }

    fn avdmanager(&self, args: Vec<String>, input: Option<Vec<u8>>) -> Result<CommandOutput, AppError> {
        let output = run_command_with_input(&self.avdmanager, &args, input, self.timeout, &self.trace_id)
            .map_err(|err| AppError::profile(err.error, &self.trace_id))?;
        if !output.success() {
            return Err(AppError::profile(
                format!("avdmanager {} failed: {}", args.join(" "), output.failure_detail()),
                &self.trace_id,
            ));
        }
        Ok(output)
    }
}

fn license_answers() -> Vec<u8> {
    "y\n".repeat(64).into_bytes()
}

impl SdkTools for SdkManagerTools {
    fn accept_licenses(&self) -> Result<(), AppError> {
        self.sdkmanager(vec!["--licenses".to_string()], Some(license_answers()))?;
        info!(trace_id = %self.trace_id, "sdk licenses accepted");
        Ok(())
    }

    fn install_host_packages(&self, packages: &[&str], channel: u32) -> Result<(), AppError> {
        let mut args = vec![format!("--channel={channel}")];
        args.extend(packages.iter().map(|pkg| pkg.to_string()));
        self.sdkmanager(args, Some(license_answers()))?;
        info!(trace_id = %self.trace_id, packages = ?packages, channel, "host packages installed");
        Ok(())
    }

    fn provision(&self, package: &str) -> Result<(), AppError> {
        self.sdkmanager(vec![package.to_string()], Some(license_answers()))?;
        info!(trace_id = %self.trace_id, package = %package, "system image provisioned");
        Ok(())
    }

    fn create_profile(&self, name: &str, package: &str) -> Result<(), AppError> {
        let args = vec![
            "create".to_string(),
            "avd".to_string(),
            "-f".to_string(),
            "-n".to_string(),
            name.to_string(),
            "-k".to_string(),
            package.to_string(),
        ];
        // avdmanager asks whether to create a custom hardware profile.
        self.avdmanager(args, Some(b"no\n".to_vec()))?;
        info!(trace_id = %self.trace_id, profile = %name, package = %package, "device profile created");
        Ok(())
    }

    fn delete_profile(&self, name: &str) -> Result<(), AppError> {
        let args = vec![
            "delete".to_string(),
            "avd".to_string(),
            "-n".to_string(),
            name.to_string(),
        ];
        match self.avdmanager(args, None) {
            Ok(_) => {
                info!(trace_id = %self.trace_id, profile = %name, "device profile deleted");
                Ok(())
            }
            Err(err) => {
                warn!(trace_id = %self.trace_id, profile = %name, error = %err.error, "device profile delete failed");
                Err(err)
            }
        }
    }
}
