//! In-memory stand-ins for the device bridge, SDK tools, emulator and patcher.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use regex::Regex;
use tempfile::TempDir;

use crate::app::adb::bridge::DeviceBridge;
use crate::app::adb::runner::CommandOutput;
use crate::app::cancel::CancelToken;
use crate::app::config::HarnessConfig;
use crate::app::cycle::{CycleDeps, CycleTiming};
use crate::app::driver::{Driver, Toolchain};
use crate::app::emulator::process::{EmulatorLauncher, EmulatorProcess};
use crate::app::emulator::session::EmulatorController;
use crate::app::error::AppError;
use crate::app::models::{Arch, PlatformVersion};
use crate::app::patch::PatchInvoker;
use crate::app::sdk::paths::resolve_environment;
use crate::app::sdk::tools::SdkTools;

const TRACE: &str = "trace-fixture";

#[derive(Default)]
struct BridgeState {
    props: HashMap<String, VecDeque<String>>,
    queries: HashMap<String, usize>,
    failing_queries: usize,
    device_absent_checks: usize,
    device_checks: usize,
    shell: HashMap<String, (i32, String)>,
    prop_dump: String,
    prop_dump_fails: bool,
    prop_dumps: usize,
    installed: Vec<String>,
    started: Vec<String>,
    server_restarts: usize,
}

/// Property values are served in order; the last one repeats forever.
#[derive(Default)]
pub struct ScriptedBridge {
    state: Mutex<BridgeState>,
}

impl ScriptedBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_prop(&self, name: &str, values: &[&str]) {
        let mut state = self.state.lock().expect("bridge state");
        state.props.insert(
            name.to_string(),
            values.iter().map(|value| value.to_string()).collect(),
        );
    }

    pub fn fail_prop_queries(&self, count: usize) {
        self.state.lock().expect("bridge state").failing_queries = count;
    }

    /// The next `count` device checks fail; `usize::MAX` keeps the device away.
    pub fn fail_wait_for_device(&self, count: usize) {
        self.state.lock().expect("bridge state").device_absent_checks = count;
    }

    pub fn device_checks(&self) -> usize {
        self.state.lock().expect("bridge state").device_checks
    }

    pub fn prop_queries(&self, name: &str) -> usize {
        let state = self.state.lock().expect("bridge state");
        state.queries.get(name).copied().unwrap_or(0)
    }

    pub fn script_shell(&self, command: &str, exit_code: i32, stdout: &str) {
        let mut state = self.state.lock().expect("bridge state");
        state
            .shell
            .insert(command.to_string(), (exit_code, stdout.to_string()));
    }

    pub fn set_prop_dump(&self, dump: &str) {
        self.state.lock().expect("bridge state").prop_dump = dump.to_string();
    }

    pub fn fail_prop_dump(&self) {
        self.state.lock().expect("bridge state").prop_dump_fails = true;
    }

    pub fn prop_dumps(&self) -> usize {
        self.state.lock().expect("bridge state").prop_dumps
    }

    pub fn installed(&self) -> Vec<String> {
        self.state.lock().expect("bridge state").installed.clone()
    }

    pub fn started(&self) -> Vec<String> {
        self.state.lock().expect("bridge state").started.clone()
    }

    pub fn server_restarts(&self) -> usize {
        self.state.lock().expect("bridge state").server_restarts
    }
}

impl DeviceBridge for ScriptedBridge {
    fn wait_for_device(&self, _timeout: Duration) -> Result<(), AppError> {
        let mut state = self.state.lock().expect("bridge state");
        state.device_checks += 1;
        if state.device_absent_checks > 0 {
            state.device_absent_checks -= 1;
            return Err(AppError::system("adb wait-for-device timed out", TRACE));
        }
        Ok(())
    }

    fn get_prop(&self, name: &str) -> Result<String, AppError> {
        let mut state = self.state.lock().expect("bridge state");
        *state.queries.entry(name.to_string()).or_insert(0) += 1;
        if state.failing_queries > 0 {
            state.failing_queries -= 1;
            return Err(AppError::system("device offline", TRACE));
        }
        let Some(values) = state.props.get_mut(name) else {
            return Ok(String::new());
        };
        let value = if values.len() > 1 {
            values.pop_front()
        } else {
            values.front().cloned()
        };
        Ok(value.unwrap_or_default())
    }

    fn dump_props(&self) -> Result<String, AppError> {
        let mut state = self.state.lock().expect("bridge state");
        state.prop_dumps += 1;
        if state.prop_dump_fails {
            return Err(AppError::system("device offline", TRACE));
        }
        Ok(state.prop_dump.clone())
    }

    fn shell(&self, command: &[String]) -> Result<CommandOutput, AppError> {
        let state = self.state.lock().expect("bridge state");
        let (exit_code, stdout) = state
            .shell
            .get(&command.join(" "))
            .cloned()
            .unwrap_or((127, String::new()));
        Ok(CommandOutput {
            stdout,
            stderr: String::new(),
            exit_code: Some(exit_code),
        })
    }

    fn install(&self, apk: &Path, _grant_permissions: bool) -> Result<(), AppError> {
        let mut state = self.state.lock().expect("bridge state");
        state.installed.push(apk.to_string_lossy().to_string());
        Ok(())
    }

    fn start_activity(&self, component: &str) -> Result<(), AppError> {
        let mut state = self.state.lock().expect("bridge state");
        state.started.push(component.to_string());
        Ok(())
    }

    fn restart_server(&self) -> Result<(), AppError> {
        self.state.lock().expect("bridge state").server_restarts += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProcessBehavior {
    /// Exits as soon as it is interrupted.
    #[default]
    ExitsOnInterrupt,
    ExitsImmediately,
    IgnoresInterrupt,
    /// Ignores interrupts and cannot be polled; only a kill stops it.
    PollFails,
}

#[derive(Default)]
struct LauncherState {
    behavior: ProcessBehavior,
    live: usize,
    max_live: usize,
    spawn_count: usize,
    kill_count: usize,
    fail_next_spawn: bool,
    watched: Option<PathBuf>,
    ramdisk_at_launch: Vec<Vec<u8>>,
}

#[derive(Default)]
pub struct MockLauncher {
    state: Arc<Mutex<LauncherState>>,
}

impl MockLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshots `path` every time an emulator is spawned.
    pub fn watching(path: PathBuf) -> Self {
        let launcher = Self::new();
        launcher.state.lock().expect("launcher state").watched = Some(path);
        launcher
    }

    pub fn set_behavior(&self, behavior: ProcessBehavior) {
        self.state.lock().expect("launcher state").behavior = behavior;
    }

    pub fn fail_next_spawn(&self) {
        self.state.lock().expect("launcher state").fail_next_spawn = true;
    }

    pub fn live(&self) -> usize {
        self.state.lock().expect("launcher state").live
    }

    pub fn max_live(&self) -> usize {
        self.state.lock().expect("launcher state").max_live
    }

    pub fn spawn_count(&self) -> usize {
        self.state.lock().expect("launcher state").spawn_count
    }

    pub fn kill_count(&self) -> usize {
        self.state.lock().expect("launcher state").kill_count
    }

    pub fn ramdisk_at_launch(&self) -> Vec<Vec<u8>> {
        self.state.lock().expect("launcher state").ramdisk_at_launch.clone()
    }
}

impl EmulatorLauncher for MockLauncher {
    fn spawn(
        &self,
        profile: &str,
        _flags: &[String],
        _log_path: Option<&Path>,
    ) -> Result<Box<dyn EmulatorProcess>, AppError> {
        let mut state = self.state.lock().expect("launcher state");
        if state.fail_next_spawn {
            state.fail_next_spawn = false;
            return Err(AppError::launch(format!("Failed to spawn @{profile}"), TRACE));
        }
        if let Some(path) = state.watched.clone() {
            let snapshot = fs::read(path).unwrap_or_default();
            state.ramdisk_at_launch.push(snapshot);
        }
        state.spawn_count += 1;
        let behavior = state.behavior;
        let exited = behavior == ProcessBehavior::ExitsImmediately;
        if !exited {
            state.live += 1;
            state.max_live = state.max_live.max(state.live);
        }
        Ok(Box::new(MockProcess {
            pid: 4000 + state.spawn_count as u32,
            behavior,
            exited,
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockProcess {
    pid: u32,
    behavior: ProcessBehavior,
    exited: bool,
    state: Arc<Mutex<LauncherState>>,
}

impl MockProcess {
    fn exit(&mut self) {
        if !self.exited {
            self.exited = true;
            self.state.lock().expect("launcher state").live -= 1;
        }
    }
}

impl EmulatorProcess for MockProcess {
    fn id(&self) -> u32 {
        self.pid
    }

    fn interrupt(&mut self) -> io::Result<()> {
        if !matches!(
            self.behavior,
            ProcessBehavior::IgnoresInterrupt | ProcessBehavior::PollFails
        ) {
            self.exit();
        }
        Ok(())
    }

    fn try_wait(&mut self) -> io::Result<bool> {
        if self.behavior == ProcessBehavior::PollFails && !self.exited {
            return Err(io::Error::other("wait failed"));
        }
        Ok(self.exited)
    }

    fn kill(&mut self) -> io::Result<()> {
        self.state.lock().expect("launcher state").kill_count += 1;
        self.exit();
        Ok(())
    }
}

#[derive(Default)]
struct SdkState {
    licenses_accepted: usize,
    fail_licenses: bool,
    host_packages: Vec<String>,
    provisioned: Vec<String>,
    profiles_created: usize,
    fail_create_profile: bool,
    delete_attempts: usize,
    profiles_deleted: usize,
    fail_delete_profile: bool,
}

#[derive(Default)]
pub struct MockSdk {
    state: Mutex<SdkState>,
}

impl MockSdk {
    pub fn fail_licenses(&self) {
        self.state.lock().expect("sdk state").fail_licenses = true;
    }

    pub fn fail_create_profile(&self) {
        self.state.lock().expect("sdk state").fail_create_profile = true;
    }

    pub fn fail_delete_profile(&self) {
        self.state.lock().expect("sdk state").fail_delete_profile = true;
    }

    pub fn licenses_accepted(&self) -> usize {
        self.state.lock().expect("sdk state").licenses_accepted
    }

    pub fn host_packages(&self) -> Vec<String> {
        self.state.lock().expect("sdk state").host_packages.clone()
    }

    pub fn provisioned(&self) -> Vec<String> {
        self.state.lock().expect("sdk state").provisioned.clone()
    }

    pub fn profiles_created(&self) -> usize {
        self.state.lock().expect("sdk state").profiles_created
    }

    pub fn profiles_deleted(&self) -> usize {
        self.state.lock().expect("sdk state").profiles_deleted
    }

    pub fn delete_attempts(&self) -> usize {
        self.state.lock().expect("sdk state").delete_attempts
    }
}

impl SdkTools for MockSdk {
    fn accept_licenses(&self) -> Result<(), AppError> {
        let mut state = self.state.lock().expect("sdk state");
        if state.fail_licenses {
            return Err(AppError::provisioning("sdkmanager --licenses failed", TRACE));
        }
        state.licenses_accepted += 1;
        Ok(())
    }

    fn install_host_packages(&self, packages: &[&str], _channel: u32) -> Result<(), AppError> {
        let mut state = self.state.lock().expect("sdk state");
        state
            .host_packages
            .extend(packages.iter().map(|package| package.to_string()));
        Ok(())
    }

    fn provision(&self, package: &str) -> Result<(), AppError> {
        let mut state = self.state.lock().expect("sdk state");
        state.provisioned.push(package.to_string());
        Ok(())
    }

    fn create_profile(&self, name: &str, _package: &str) -> Result<(), AppError> {
        let mut state = self.state.lock().expect("sdk state");
        if state.fail_create_profile {
            return Err(AppError::profile(format!("Failed to create AVD {name}"), TRACE));
        }
        state.profiles_created += 1;
        Ok(())
    }

    fn delete_profile(&self, name: &str) -> Result<(), AppError> {
        let mut state = self.state.lock().expect("sdk state");
        state.delete_attempts += 1;
        if state.fail_delete_profile {
            return Err(AppError::profile(format!("Failed to delete AVD {name}"), TRACE));
        }
        state.profiles_deleted += 1;
        Ok(())
    }
}

#[derive(Default)]
pub struct MockPatcher {
    fail_exit: Mutex<Option<i32>>,
}

impl MockPatcher {
    pub fn fail_with_exit(&self, code: i32) {
        *self.fail_exit.lock().expect("patcher state") = Some(code);
    }
}

impl PatchInvoker for MockPatcher {
    fn patch(&self, ramdisk: &Path) -> Result<(), AppError> {
        if let Some(code) = *self.fail_exit.lock().expect("patcher state") {
            return Err(AppError::patch(
                format!("Patch command exited with Some({code})"),
                TRACE,
            ));
        }
        fs::write(ramdisk, b"patched")
            .map_err(|err| AppError::patch(format!("Failed to patch: {err}"), TRACE))
    }
}

/// A throwaway SDK root and output dir wired to the mocks above, with millisecond
/// deadlines.
pub struct Fixture {
    _dir: TempDir,
    pub config: HarnessConfig,
    pub bridge: ScriptedBridge,
    pub launcher: MockLauncher,
    pub sdk: MockSdk,
    pub patcher: MockPatcher,
    pub cancel: CancelToken,
    pub verify_pattern: Regex,
}

impl Fixture {
    pub const GRACE: Duration = Duration::from_millis(50);

    pub fn new(platforms: &[PlatformVersion]) -> Self {
        let dir = TempDir::new().expect("tmp");
        let config = HarnessConfig {
            sdk_root: dir.path().join("sdk").to_string_lossy().to_string(),
            output_path: dir.path().join("out").to_string_lossy().to_string(),
            arch: Some(Arch::X86_64),
            platforms: platforms.to_vec(),
            ..HarnessConfig::default()
        };
        let launcher = match platforms.first() {
            Some(first) => MockLauncher::watching(ramdisk_path(&config, first)),
            None => MockLauncher::new(),
        };
        let verify_pattern = Regex::new(&config.patch.verify_pattern).expect("regex");
        Self {
            _dir: dir,
            config,
            bridge: ScriptedBridge::new(),
            launcher,
            sdk: MockSdk::default(),
            patcher: MockPatcher::default(),
            cancel: CancelToken::new(),
            verify_pattern,
        }
    }

    pub fn ramdisk(&self, version: &PlatformVersion) -> PathBuf {
        ramdisk_path(&self.config, version)
    }

    pub fn stock_bytes(&self, version: &PlatformVersion) -> Vec<u8> {
        format!("stock-{}", version.api_level).into_bytes()
    }

    /// Lays out a stock ramdisk and features file for every configured version.
    pub fn seed_images(&self) {
        for version in &self.config.platforms {
            let context =
                resolve_environment(&self.config.sdk_root(), version, &self.config.variant());
            if let Some(parent) = context.ramdisk_path.parent() {
                fs::create_dir_all(parent).expect("image dir");
            }
            fs::write(&context.ramdisk_path, self.stock_bytes(version)).expect("ramdisk");
            fs::write(&context.features_path, self.stock_bytes(version)).expect("features");
        }
    }

    pub fn script_successful_boots(&self) {
        self.bridge
            .script_prop("init.svc.bootanim", &["running", "running", "stopped"]);
        self.bridge.script_prop("sys.boot_completed", &["", "", "1"]);
        self.bridge.script_shell("magisk -v", 0, "27.0:MAGISK\n");
    }

    pub fn timing(&self) -> CycleTiming {
        CycleTiming {
            boot_anim_deadline: Duration::from_millis(300),
            boot_complete_deadline: Duration::from_millis(200),
            poll_interval: Duration::from_millis(1),
        }
    }

    pub fn sessions(&self) -> EmulatorController<'_> {
        EmulatorController::new(&self.launcher, Self::GRACE, TRACE)
    }

    pub fn deps<'a>(&'a self, sessions: &'a EmulatorController<'a>) -> CycleDeps<'a> {
        CycleDeps {
            config: &self.config,
            timing: self.timing(),
            sdk: &self.sdk,
            bridge: &self.bridge,
            patcher: &self.patcher,
            sessions,
            verify_pattern: &self.verify_pattern,
            cancel: &self.cancel,
            trace_id: TRACE,
        }
    }

    pub fn driver(&self) -> Driver<'_> {
        let tools = Toolchain {
            sdk: &self.sdk,
            bridge: &self.bridge,
            launcher: &self.launcher,
            patcher: &self.patcher,
        };
        Driver::new(&self.config, tools, self.cancel.clone(), TRACE).with_timing(self.timing())
    }
}

fn ramdisk_path(config: &HarnessConfig, version: &PlatformVersion) -> PathBuf {
    resolve_environment(&config.sdk_root(), version, &config.variant()).ramdisk_path
}
