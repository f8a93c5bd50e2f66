use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlatformVersion {
    pub api_level: u32,
    #[serde(default)]
    pub codename: String,
}

impl PlatformVersion {
    pub fn new(api_level: u32, codename: impl Into<String>) -> Self {
        Self {
            api_level,
            codename: codename.into(),
        }
    }

    /// Parses `28` or `28:P`.
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        let (level, codename) = match trimmed.split_once(':') {
            Some((level, codename)) => (level.trim(), codename.trim()),
            None => (trimmed, ""),
        };
        let api_level = level.parse::<u32>().ok().filter(|level| *level > 0)?;
        Some(Self::new(api_level, codename))
    }
}

impl fmt::Display for PlatformVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.codename.is_empty() {
            write!(f, "API {}", self.api_level)
        } else {
            write!(f, "API {} ({})", self.api_level, self.codename)
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ImageType {
    #[serde(rename = "google_apis")]
    GoogleApis,
    #[serde(rename = "default")]
    Default,
}

impl ImageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageType::GoogleApis => "google_apis",
            ImageType::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Arch {
    #[serde(rename = "arm64-v8a")]
    Arm64V8a,
    #[serde(rename = "x86_64")]
    X86_64,
}

impl Arch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::Arm64V8a => "arm64-v8a",
            Arch::X86_64 => "x86_64",
        }
    }

    pub fn from_host(host_arch: &str) -> Self {
        match host_arch {
            "aarch64" | "arm64" => Arch::Arm64V8a,
            _ => Arch::X86_64,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ImageVariant {
    pub image_type: ImageType,
    pub arch: Arch,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EnvironmentContext {
    pub package: String,
    pub ramdisk_path: PathBuf,
    pub features_path: PathBuf,
}

impl EnvironmentContext {
    pub fn artifacts(&self) -> [&PathBuf; 2] {
        [&self.ramdisk_path, &self.features_path]
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum CycleState {
    Provisioned,
    ProfileCreated,
    Cycle1Launched,
    Cycle1Ready,
    Patched,
    Cycle1Terminated,
    Cycle2Launched,
    Cycle2Ready,
    Cycle2FullyBooted,
    AppInstalled,
    AppLaunched,
    Cycle2Terminated,
    ArtifactsRestored,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct VersionReport {
    pub api_level: u32,
    pub codename: String,
    pub states: Vec<CycleState>,
    pub error_code: Option<String>,
    pub error: Option<String>,
}

impl VersionReport {
    pub fn final_state(&self) -> Option<CycleState> {
        self.states.last().copied()
    }

    pub fn passed(&self) -> bool {
        self.error_code.is_none() && self.final_state() == Some(CycleState::ArtifactsRestored)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub tool: &'static str,
    pub status: &'static str,
    pub trace_id: String,
    pub image_type: ImageType,
    pub arch: Arch,
    pub versions: Vec<VersionReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics_bundle: Option<String>,
}

impl RunSummary {
    pub fn passed(&self) -> bool {
        self.status == "pass"
    }
}
