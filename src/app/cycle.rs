use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info};

use crate::app::adb::bridge::DeviceBridge;
use crate::app::artifacts;
use crate::app::cancel::CancelToken;
use crate::app::config::HarnessConfig;
use crate::app::emulator::session::{EmulatorController, EmulatorSession};
use crate::app::error::AppError;
use crate::app::models::{CycleState, EnvironmentContext, PlatformVersion, VersionReport};
use crate::app::monitor::{require_signal, BootProbe, BOOT_ANIMATION, BOOT_COMPLETED};
use crate::app::patch::{verify_patch, PatchInvoker};
use crate::app::sdk::paths::resolve_environment;
use crate::app::sdk::tools::SdkTools;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleTiming {
    pub boot_anim_deadline: Duration,
    pub boot_complete_deadline: Duration,
    pub poll_interval: Duration,
}

impl CycleTiming {
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            boot_anim_deadline: config.boot_anim_deadline(),
            boot_complete_deadline: config.boot_complete_deadline(),
            poll_interval: config.poll_interval(),
        }
    }
}

/// Collaborators shared by every cycle of a run.
pub struct CycleDeps<'a> {
    pub config: &'a HarnessConfig,
    pub timing: CycleTiming,
    pub sdk: &'a dyn SdkTools,
    pub bridge: &'a dyn DeviceBridge,
    pub patcher: &'a dyn PatchInvoker,
    pub sessions: &'a EmulatorController<'a>,
    pub verify_pattern: &'a Regex,
    pub cancel: &'a CancelToken,
    pub trace_id: &'a str,
}

/// Two boots of one platform version: the first applies the patch, the second proves the
/// patched image still boots and runs the app.
pub struct TestCycle<'d, 'a> {
    deps: &'d CycleDeps<'a>,
    version: PlatformVersion,
    context: EnvironmentContext,
    states: Vec<CycleState>,
    restores: usize,
}

impl<'d, 'a> TestCycle<'d, 'a> {
    pub fn new(deps: &'d CycleDeps<'a>, version: &PlatformVersion) -> Self {
        let context = resolve_environment(&deps.config.sdk_root(), version, &deps.config.variant());
        Self {
            deps,
            version: version.clone(),
            context,
            states: Vec::new(),
            restores: 0,
        }
    }

    pub fn context(&self) -> &EnvironmentContext {
        &self.context
    }

    pub fn states(&self) -> &[CycleState] {
        &self.states
    }

    pub fn state(&self) -> Option<CycleState> {
        self.states.last().copied()
    }

    pub fn restore_count(&self) -> usize {
        self.restores
    }

    /// Runs every transition in order. The first failure stops the cycle; an emulator
    /// that is still up stays registered for the run guard.
    pub fn run(&mut self) -> Result<(), AppError> {
        let deps = self.deps;
        let config = deps.config;
        let profile = config.profile_name.as_str();

        deps.sdk.provision(&self.context.package)?;
        artifacts::ensure_backup(&self.context, deps.trace_id)?;
        self.advance(CycleState::Provisioned);

        deps.sdk.create_profile(profile, &self.context.package)?;
        self.advance(CycleState::ProfileCreated);

        // First boot: stock ramdisk, patched while the emulator is up.
        self.restore()?;
        let session = self.launch(1)?;
        self.advance(CycleState::Cycle1Launched);

        self.wait(&BOOT_ANIMATION, deps.timing.boot_anim_deadline)?;
        self.advance(CycleState::Cycle1Ready);

        deps.patcher.patch(&self.context.ramdisk_path)?;
        self.advance(CycleState::Patched);

        deps.sessions.terminate(session)?;
        self.advance(CycleState::Cycle1Terminated);

        // Second boot: the patched ramdisk must stay in place.
        let session = self.launch(2)?;
        self.advance(CycleState::Cycle2Launched);

        self.wait(&BOOT_ANIMATION, deps.timing.boot_anim_deadline)?;
        self.advance(CycleState::Cycle2Ready);

        verify_patch(
            deps.bridge,
            &config.patch.verify_command,
            deps.verify_pattern,
            deps.trace_id,
        )?;
        self.wait(&BOOT_COMPLETED, deps.timing.boot_complete_deadline)?;
        self.advance(CycleState::Cycle2FullyBooted);

        deps.bridge
            .install(Path::new(&config.app.apk_path), config.app.grant_permissions)?;
        self.advance(CycleState::AppInstalled);

        deps.bridge.start_activity(&config.app.activity)?;
        self.advance(CycleState::AppLaunched);

        deps.sessions.terminate(session)?;
        self.advance(CycleState::Cycle2Terminated);

        self.restore()?;
        self.advance(CycleState::ArtifactsRestored);
        Ok(())
    }

    pub fn into_report(self, failure: Option<&AppError>) -> VersionReport {
        VersionReport {
            api_level: self.version.api_level,
            codename: self.version.codename,
            states: self.states,
            error_code: failure.map(|err| err.code.clone()),
            error: failure.map(|err| err.error.clone()),
        }
    }

    fn advance(&mut self, state: CycleState) {
        info!(
            trace_id = %self.deps.trace_id,
            api_level = self.version.api_level,
            state = ?state,
            "cycle state"
        );
        self.states.push(state);
    }

    fn restore(&mut self) -> Result<(), AppError> {
        let restored = artifacts::restore(&self.context, self.deps.trace_id)?;
        self.restores += 1;
        debug!(trace_id = %self.deps.trace_id, api_level = self.version.api_level, restored, "restore");
        Ok(())
    }

    fn launch(&self, boot: u8) -> Result<EmulatorSession, AppError> {
        let config = self.deps.config;
        let log_path = self.log_path(boot);
        self.deps
            .sessions
            .launch(&config.profile_name, &config.emulator_flags, Some(&log_path))
    }

    fn wait(&self, probe: &BootProbe, deadline: Duration) -> Result<(), AppError> {
        require_signal(
            self.deps.bridge,
            probe,
            deadline,
            self.deps.timing.poll_interval,
            self.deps.cancel,
            self.deps.trace_id,
        )
    }

    fn log_path(&self, boot: u8) -> PathBuf {
        self.deps
            .config
            .output_dir()
            .join(format!("emulator-android-{}-boot{}.log", self.version.api_level, boot))
    }
}
