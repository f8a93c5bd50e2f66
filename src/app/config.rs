use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::app::error::AppError;
use crate::app::models::{Arch, ImageType, ImageVariant, PlatformVersion};

fn default_platforms() -> Vec<PlatformVersion> {
    // 23: legacy rootfs, 26: rootfs with Treble, 28: system-as-root,
    // 29: two stage init, 34: latest.
    vec![
        PlatformVersion::new(23, "M"),
        PlatformVersion::new(26, "O"),
        PlatformVersion::new(28, "P"),
        PlatformVersion::new(29, "Q"),
        PlatformVersion::new(34, "U"),
    ]
}

fn default_emulator_flags() -> Vec<String> {
    [
        "-no-window",
        "-gpu",
        "swiftshader_indirect",
        "-no-snapshot",
        "-noaudio",
        "-no-boot-anim",
        "-show-kernel",
    ]
    .iter()
    .map(|flag| flag.to_string())
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimingSettings {
    pub boot_anim_deadline_secs: u64,
    pub boot_complete_deadline_secs: u64,
    pub poll_interval_secs: u64,
    pub terminate_grace_secs: u64,
    pub tool_timeout_secs: u64,
    pub bridge_timeout_secs: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            boot_anim_deadline_secs: 180,
            boot_complete_deadline_secs: 360,
            poll_interval_secs: 2,
            terminate_grace_secs: 60,
            tool_timeout_secs: 1800,
            bridge_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PatchSettings {
    /// Program and leading args; the live ramdisk path is appended.
    pub command: Vec<String>,
    /// Shell command run on the patched device to report the patch version.
    pub verify_command: Vec<String>,
    /// Regex the verification output must match.
    pub verify_pattern: String,
}

impl Default for PatchSettings {
    fn default() -> Self {
        Self {
            command: vec!["./build.py".to_string(), "avd_patch".to_string()],
            verify_command: vec!["magisk".to_string(), "-v".to_string()],
            verify_pattern: r"\S".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppSettings {
    pub apk_path: String,
    pub activity: String,
    pub grant_permissions: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            apk_path: "out/test.apk".to_string(),
            activity: "com.topjohnwu.magisk/.ui.MainActivity".to_string(),
            grant_permissions: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HarnessConfig {
    #[serde(default)]
    pub sdk_root: String,
    #[serde(default = "default_image_type")]
    pub image_type: ImageType,
    #[serde(default)]
    pub arch: Option<Arch>,
    #[serde(default = "default_platforms")]
    pub platforms: Vec<PlatformVersion>,
    #[serde(default = "default_profile_name")]
    pub profile_name: String,
    #[serde(default = "default_emulator_flags")]
    pub emulator_flags: Vec<String>,
    #[serde(default = "default_sdk_channel")]
    pub sdk_channel: u32,
    #[serde(default)]
    pub timing: TimingSettings,
    #[serde(default)]
    pub patch: PatchSettings,
    #[serde(default)]
    pub app: AppSettings,
    #[serde(default)]
    pub output_path: String,
}

fn default_image_type() -> ImageType {
    ImageType::GoogleApis
}

fn default_profile_name() -> String {
    "test".to_string()
}

fn default_sdk_channel() -> u32 {
    3
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            sdk_root: String::new(),
            image_type: default_image_type(),
            arch: None,
            platforms: default_platforms(),
            profile_name: default_profile_name(),
            emulator_flags: default_emulator_flags(),
            sdk_channel: default_sdk_channel(),
            timing: TimingSettings::default(),
            patch: PatchSettings::default(),
            app: AppSettings::default(),
            output_path: String::new(),
        }
    }
}

impl HarnessConfig {
    pub fn variant(&self) -> ImageVariant {
        ImageVariant {
            image_type: self.image_type,
            arch: self
                .arch
                .unwrap_or_else(|| Arch::from_host(std::env::consts::ARCH)),
        }
    }

    pub fn sdk_root(&self) -> PathBuf {
        if !self.sdk_root.trim().is_empty() {
            return PathBuf::from(self.sdk_root.trim());
        }
        default_sdk_root()
    }

    pub fn output_dir(&self) -> PathBuf {
        if !self.output_path.trim().is_empty() {
            return PathBuf::from(self.output_path.trim());
        }
        std::env::temp_dir().join("avd_boot_harness")
    }

    pub fn boot_anim_deadline(&self) -> Duration {
        Duration::from_secs(self.timing.boot_anim_deadline_secs)
    }

    pub fn boot_complete_deadline(&self) -> Duration {
        Duration::from_secs(self.timing.boot_complete_deadline_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.timing.poll_interval_secs)
    }

    pub fn terminate_grace(&self) -> Duration {
        Duration::from_secs(self.timing.terminate_grace_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.timing.tool_timeout_secs)
    }

    pub fn bridge_timeout(&self) -> Duration {
        Duration::from_secs(self.timing.bridge_timeout_secs)
    }
}

pub fn default_sdk_root() -> PathBuf {
    for key in ["ANDROID_SDK_ROOT", "ANDROID_HOME"] {
        if let Ok(value) = std::env::var(key) {
            if !value.trim().is_empty() {
                return PathBuf::from(value.trim());
            }
        }
    }
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    if cfg!(target_os = "macos") {
        home.join("Library").join("Android").join("sdk")
    } else {
        home.join("Android").join("Sdk")
    }
}

pub fn config_path() -> Option<PathBuf> {
    std::env::var("AVD_HARNESS_CONFIG_PATH")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
}

pub fn load_config(explicit: Option<&Path>, trace_id: &str) -> Result<HarnessConfig, AppError> {
    match explicit.map(Path::to_path_buf).or_else(config_path) {
        Some(path) => load_config_from_path(&path, trace_id),
        None => Ok(validate_config(HarnessConfig::default())),
    }
}

pub fn load_config_from_path(path: &Path, trace_id: &str) -> Result<HarnessConfig, AppError> {
    if !path.exists() {
        return Err(AppError::validation(
            format!("Config file not found: {}", path.display()),
            trace_id,
        ));
    }
    let raw = fs::read_to_string(path)
        .map_err(|err| AppError::system(format!("Failed to read config: {err}"), trace_id))?;
    let config: HarnessConfig = serde_json::from_str(&raw)
        .map_err(|err| AppError::validation(format!("Failed to parse config: {err}"), trace_id))?;
    Ok(validate_config(config))
}

pub fn validate_config(mut config: HarnessConfig) -> HarnessConfig {
    let defaults = TimingSettings::default();
    if config.timing.poll_interval_secs == 0 {
        config.timing.poll_interval_secs = defaults.poll_interval_secs;
    }
    if config.timing.boot_anim_deadline_secs < config.timing.poll_interval_secs {
        config.timing.boot_anim_deadline_secs = defaults.boot_anim_deadline_secs;
    }
    if config.timing.boot_complete_deadline_secs < config.timing.poll_interval_secs {
        config.timing.boot_complete_deadline_secs = defaults.boot_complete_deadline_secs;
    }
    if config.timing.terminate_grace_secs == 0 {
        config.timing.terminate_grace_secs = defaults.terminate_grace_secs;
    }
    if config.timing.tool_timeout_secs == 0 {
        config.timing.tool_timeout_secs = defaults.tool_timeout_secs;
    }
    if config.timing.bridge_timeout_secs == 0 {
        config.timing.bridge_timeout_secs = defaults.bridge_timeout_secs;
    }
    if config.profile_name.trim().is_empty() {
        config.profile_name = default_profile_name();
    }
    let mut seen = HashSet::new();
    config.platforms.retain(|version| seen.insert(version.api_level));
    config
}

/// Checks what cannot be defaulted away. Run before any side effect.
pub fn ensure_runnable(config: &HarnessConfig, trace_id: &str) -> Result<(), AppError> {
    if config.platforms.is_empty() {
        return Err(AppError::validation("No platform versions configured", trace_id));
    }
    if config.patch.command.is_empty() || config.patch.command[0].trim().is_empty() {
        return Err(AppError::validation("patch.command is required", trace_id));
    }
    if config.app.apk_path.trim().is_empty() {
        return Err(AppError::validation("app.apk_path is required", trace_id));
    }
    if !config.app.activity.contains('/') {
        return Err(AppError::validation(
            "app.activity must be a component name like pkg/.Activity",
            trace_id,
        ));
    }
    regex::Regex::new(&config.patch.verify_pattern).map_err(|err| {
        AppError::validation(format!("patch.verify_pattern is invalid: {err}"), trace_id)
    })?;
    Ok(())
}
