use std::collections::BTreeMap;

pub fn parse_getprop_map(output: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for line in output.lines() {
        let trimmed = line.trim();
        if !trimmed.starts_with('[') {
            continue;
        }
        let Some((key_part, value_part)) = trimmed.split_once("]: [") else {
            continue;
        };
        let key = key_part.trim_start_matches('[').trim();
        let value = value_part.trim_end_matches(']').trim();
        if !key.is_empty() {
            map.insert(key.to_string(), value.to_string());
        }
    }
    map
}

/// `adb exec-out getprop NAME` prints the bare value; older devices add `\r\n`.
pub fn normalize_prop_value(output: &str) -> String {
    output.trim_matches(|c: char| c == '\r' || c == '\n' || c.is_whitespace()).to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityStartStatus {
    Ok,
    Failed(String),
}

/// Interprets `am start -W` output. `am` exits 0 even when the component is missing,
/// so the text is authoritative.
pub fn parse_am_start_status(output: &str) -> ActivityStartStatus {
    let mut saw_ok = false;
    for line in output.lines() {
        let trimmed = line.trim();
        if let Some(message) = trimmed.strip_prefix("Error:") {
            return ActivityStartStatus::Failed(message.trim().to_string());
        }
        if let Some(status) = trimmed.strip_prefix("Status:") {
            let status = status.trim();
            if status.eq_ignore_ascii_case("ok") {
                saw_ok = true;
            } else {
                return ActivityStartStatus::Failed(format!("status {status}"));
            }
        }
        if trimmed.starts_with("Exception") || trimmed.contains("SecurityException") {
            return ActivityStartStatus::Failed(trimmed.to_string());
        }
    }
    if saw_ok {
        ActivityStartStatus::Ok
    } else {
        ActivityStartStatus::Failed("no completion status reported".to_string())
    }
}

/// `adb install` prints `Success` on the last line; failures look like
/// `Failure [INSTALL_FAILED_...]` or `adb: failed to install ...`.
pub fn parse_install_failure(output: &str) -> Option<String> {
    for line in output.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("Failure") || trimmed.starts_with("adb: failed") {
            return Some(trimmed.to_string());
        }
    }
    None
}
