use std::fs;
use std::path::PathBuf;

use regex::Regex;
use tracing::{error, info, warn};

use crate::app::adb::bridge::DeviceBridge;
use crate::app::artifacts;
use crate::app::cancel::CancelToken;
use crate::app::config::HarnessConfig;
use crate::app::cycle::{CycleDeps, CycleTiming, TestCycle};
use crate::app::diagnostics::export_failure_bundle;
use crate::app::emulator::process::EmulatorLauncher;
use crate::app::emulator::session::EmulatorController;
use crate::app::error::AppError;
use crate::app::logging::{banner, BannerStyle};
use crate::app::models::{RunSummary, VersionReport};
use crate::app::patch::PatchInvoker;
use crate::app::sdk::paths::resolve_environment;
use crate::app::sdk::tools::SdkTools;

const HOST_PACKAGES: [&str; 2] = ["platform-tools", "emulator"];

pub struct Toolchain<'a> {
    pub sdk: &'a dyn SdkTools,
    pub bridge: &'a dyn DeviceBridge,
    pub launcher: &'a dyn EmulatorLauncher,
    pub patcher: &'a dyn PatchInvoker,
}

/// Rolls the host back after a failed run: dumps device state, stops leftover
/// emulators, restores every configured version's artifacts and deletes the profile.
///
/// Armed on creation. Dropping an armed guard runs the rollback, so panics and early
/// returns are covered; `disarm` after a clean finish.
pub struct RunGuard<'g, 'a> {
    config: &'g HarnessConfig,
    sdk: &'g dyn SdkTools,
    bridge: &'g dyn DeviceBridge,
    sessions: &'g EmulatorController<'a>,
    trace_id: &'g str,
    armed: bool,
    finalized: bool,
    profile_deleted: bool,
}

impl<'g, 'a> RunGuard<'g, 'a> {
    pub fn new(
        config: &'g HarnessConfig,
        sdk: &'g dyn SdkTools,
        bridge: &'g dyn DeviceBridge,
        sessions: &'g EmulatorController<'a>,
        trace_id: &'g str,
    ) -> Self {
        Self {
            config,
            sdk,
            bridge,
            sessions,
            trace_id,
            armed: true,
            finalized: false,
            profile_deleted: false,
        }
    }

    pub fn mark_profile_deleted(&mut self) {
        self.profile_deleted = true;
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Runs the rollback once; later calls return `None` without touching anything.
    /// Every step is best-effort.
    pub fn finalize(&mut self, failure: Option<&AppError>) -> Option<PathBuf> {
        if !self.armed || self.finalized {
            return None;
        }
        self.finalized = true;

        let bundle = match export_failure_bundle(
            self.bridge,
            &self.config.output_dir(),
            failure,
            self.trace_id,
        ) {
            Ok(path) => Some(path),
            Err(err) => {
                warn!(trace_id = %self.trace_id, error = %err.error, "diagnostics bundle failed");
                None
            }
        };

        let stopped = self.sessions.interrupt_all();
        if stopped > 0 {
            info!(trace_id = %self.trace_id, stopped, "leftover emulators stopped");
        }

        let sdk_root = self.config.sdk_root();
        let variant = self.config.variant();
        for version in &self.config.platforms {
            let context = resolve_environment(&sdk_root, version, &variant);
            if let Err(err) = artifacts::restore(&context, self.trace_id) {
                warn!(
                    trace_id = %self.trace_id,
                    api_level = version.api_level,
                    error = %err.error,
                    "restore during cleanup failed"
                );
            }
        }

        if !self.profile_deleted {
            match self.sdk.delete_profile(&self.config.profile_name) {
                Ok(()) => self.profile_deleted = true,
                Err(err) => warn!(
                    trace_id = %self.trace_id,
                    error = %err.error,
                    "profile delete during cleanup failed"
                ),
            }
        }
        bundle
    }
}

impl Drop for RunGuard<'_, '_> {
    fn drop(&mut self) {
        if self.armed && !self.finalized {
            banner("An error occurred", BannerStyle::Failure);
            self.finalize(None);
        }
    }
}

/// Runs the test cycle for every configured platform version, in order.
pub struct Driver<'a> {
    config: &'a HarnessConfig,
    tools: Toolchain<'a>,
    timing: CycleTiming,
    cancel: CancelToken,
    trace_id: String,
}

impl<'a> Driver<'a> {
    pub fn new(
        config: &'a HarnessConfig,
        tools: Toolchain<'a>,
        cancel: CancelToken,
        trace_id: impl Into<String>,
    ) -> Self {
        Self {
            config,
            tools,
            timing: CycleTiming::from_config(config),
            cancel,
            trace_id: trace_id.into(),
        }
    }

    pub fn with_timing(mut self, timing: CycleTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn run(&self) -> RunSummary {
        self.run_with_grace(self.config.terminate_grace())
    }

    pub fn run_with_grace(&self, grace: std::time::Duration) -> RunSummary {
        let sessions = EmulatorController::new(self.tools.launcher, grace, self.trace_id.as_str());
        let mut guard = RunGuard::new(
            self.config,
            self.tools.sdk,
            self.tools.bridge,
            &sessions,
            &self.trace_id,
        );
        let mut reports = Vec::new();

        let outcome = self
            .run_versions(&sessions, &mut reports)
            .and_then(|()| self.tools.sdk.delete_profile(&self.config.profile_name));

        match outcome {
            Ok(()) => {
                guard.mark_profile_deleted();
                guard.disarm();
                info!(trace_id = %self.trace_id, versions = reports.len(), "all platform versions passed");
                self.summary("pass", reports, None, None)
            }
            Err(err) => {
                banner("An error occurred", BannerStyle::Failure);
                error!(trace_id = %self.trace_id, code = %err.code, error = %err.error, "run failed");
                let bundle = guard.finalize(Some(&err));
                self.summary("fail", reports, Some(&err), bundle)
            }
        }
    }

    fn run_versions(
        &self,
        sessions: &EmulatorController<'a>,
        reports: &mut Vec<VersionReport>,
    ) -> Result<(), AppError> {
        let trace_id = self.trace_id.as_str();
        fs::create_dir_all(self.config.output_dir()).map_err(|err| {
            AppError::system(format!("Failed to create output dir: {err}"), trace_id)
        })?;
        let verify_pattern = Regex::new(&self.config.patch.verify_pattern).map_err(|err| {
            AppError::validation(format!("Invalid verify pattern: {err}"), trace_id)
        })?;

        self.prepare_host()?;

        let deps = CycleDeps {
            config: self.config,
            timing: self.timing,
            sdk: self.tools.sdk,
            bridge: self.tools.bridge,
            patcher: self.tools.patcher,
            sessions,
            verify_pattern: &verify_pattern,
            cancel: &self.cancel,
            trace_id,
        };

        for version in &self.config.platforms {
            banner(&format!("Testing {version}"), BannerStyle::Title);
            let mut cycle = TestCycle::new(&deps, version);
            let result = cycle.run();
            reports.push(cycle.into_report(result.as_ref().err()));
            result?;
        }
        Ok(())
    }

    fn prepare_host(&self) -> Result<(), AppError> {
        self.tools.sdk.accept_licenses()?;
        self.tools
            .sdk
            .install_host_packages(&HOST_PACKAGES, self.config.sdk_channel)?;
        self.tools.bridge.restart_server()?;
        Ok(())
    }

    fn summary(
        &self,
        status: &'static str,
        versions: Vec<VersionReport>,
        failure: Option<&AppError>,
        bundle: Option<PathBuf>,
    ) -> RunSummary {
        let variant = self.config.variant();
        RunSummary {
            tool: "avd_boot_harness",
            status,
            trace_id: self.trace_id.clone(),
            image_type: variant.image_type,
            arch: variant.arch,
            versions,
            error_code: failure.map(|err| err.code.clone()),
            error: failure.map(|err| err.error.clone()),
            diagnostics_bundle: bundle.map(|path| path.to_string_lossy().to_string()),
        }
    }
}
