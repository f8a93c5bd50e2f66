use std::path::Path;

pub fn normalize_command_path(value: &str) -> String {
    let trimmed = value.trim();
    if let Some(inner) = trimmed
        .strip_prefix('"')
        .and_then(|candidate| candidate.strip_suffix('"'))
    {
        return inner.trim().to_string();
    }
    if let Some(inner) = trimmed
        .strip_prefix('\'')
        .and_then(|candidate| candidate.strip_suffix('\''))
    {
        return inner.trim().to_string();
    }
    trimmed.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub sdkmanager: String,
    pub avdmanager: String,
    pub emulator: String,
    pub adb: String,
}

impl ToolPaths {
    pub fn from_sdk_root(sdk_root: &Path) -> Self {
        let cmdline_bin = sdk_root.join("cmdline-tools").join("latest").join("bin");
        Self {
            sdkmanager: path_string(&cmdline_bin.join("sdkmanager")),
            avdmanager: path_string(&cmdline_bin.join("avdmanager")),
            emulator: path_string(&sdk_root.join("emulator").join("emulator")),
            adb: resolve_adb_program(sdk_root),
        }
    }
}

/// platform-tools is only installed during host setup, so a missing bundled adb falls back
/// to whatever is on PATH.
pub fn resolve_adb_program(sdk_root: &Path) -> String {
    let bundled = sdk_root.join("platform-tools").join("adb");
    if bundled.is_file() {
        return path_string(&bundled);
    }
    std::env::var("ADB")
        .ok()
        .map(|value| normalize_command_path(&value))
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "adb".to_string())
}

pub fn validate_program(program: &str, label: &str) -> Result<(), String> {
    if program.trim().is_empty() {
        return Err(format!("{label} command is empty"));
    }
    let path = Path::new(program);
    if path.components().count() == 1 {
        // Bare name; resolved through PATH at spawn time.
        return Ok(());
    }
    if path.is_dir() {
        return Err(format!("{label} path must point to an executable file"));
    }
    if !path.exists() {
        return Err(format!("{label} executable not found at {}", path.display()));
    }
    Ok(())
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
