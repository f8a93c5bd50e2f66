use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use zip::write::FileOptions;

use crate::app::adb::bridge::DeviceBridge;
use crate::app::adb::parse::parse_getprop_map;
use crate::app::error::AppError;

#[derive(Debug, Serialize)]
struct DiagnosticsManifest {
    tool_version: &'static str,
    os: &'static str,
    arch: &'static str,
    timestamp_utc: String,
    trace_id: String,
    failure: Option<String>,
}

pub fn sanitize_filename_component(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

fn emulator_logs(output_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(output_dir) else {
        return Vec::new();
    };
    let mut logs = entries
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.starts_with("emulator-") && name.ends_with(".log"))
                .unwrap_or(false)
        })
        .collect::<Vec<_>>();
    logs.sort();
    logs
}

/// Captures every device property plus the emulator logs into a zip bundle in
/// `output_dir`. A device that cannot be reached still yields a bundle.
pub fn export_failure_bundle(
    bridge: &dyn DeviceBridge,
    output_dir: &Path,
    failure: Option<&AppError>,
    trace_id: &str,
) -> Result<PathBuf, AppError> {
    fs::create_dir_all(output_dir).map_err(|err| {
        AppError::system(format!("Failed to create output dir: {err}"), trace_id)
    })?;

    let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
    let safe_trace = sanitize_filename_component(trace_id);
    let trace_short = safe_trace.chars().take(8).collect::<String>();
    let bundle_path = output_dir.join(format!("diagnostics_{}_{}.zip", timestamp, trace_short));

    let manifest = DiagnosticsManifest {
        tool_version: env!("CARGO_PKG_VERSION"),
        os: std::env::consts::OS,
        arch: std::env::consts::ARCH,
        timestamp_utc: Utc::now().to_rfc3339(),
        trace_id: trace_id.to_string(),
        failure: failure.map(|err| err.to_string()),
    };

    let (raw_props, props): (String, BTreeMap<String, String>) = match bridge.dump_props() {
        Ok(raw) => {
            let parsed = parse_getprop_map(&raw);
            warn!(trace_id = %trace_id, properties = parsed.len(), getprop = %raw, "device state at failure");
            (raw, parsed)
        }
        Err(err) => {
            warn!(trace_id = %trace_id, error = %err.error, "failed to dump device properties");
            (format!("getprop failed: {}", err.error), BTreeMap::new())
        }
    };

    let write_err =
        |err: &dyn std::fmt::Display| AppError::system(format!("Failed to write bundle: {err}"), trace_id);

    let manifest_json = serde_json::to_vec_pretty(&manifest).map_err(|err| write_err(&err))?;
    let props_json = serde_json::to_vec_pretty(&props).map_err(|err| write_err(&err))?;

    let file = fs::File::create(&bundle_path)
        .map_err(|err| AppError::system(format!("Failed to create bundle: {err}"), trace_id))?;
    let mut zip = zip::ZipWriter::new(file);
    let entries: [(&str, &[u8]); 3] = [
        ("manifest.json", &manifest_json),
        ("getprop.txt", raw_props.as_bytes()),
        ("properties.json", &props_json),
    ];
    for (name, bytes) in entries {
        zip.start_file(name, FileOptions::<()>::default())
            .map_err(|err| write_err(&err))?;
        zip.write_all(bytes).map_err(|err| write_err(&err))?;
    }
    for log in emulator_logs(output_dir) {
        let Ok(bytes) = fs::read(&log) else {
            continue;
        };
        let name = log
            .file_name()
            .map(|name| format!("logs/{}", name.to_string_lossy()))
            .unwrap_or_else(|| "logs/emulator.log".to_string());
        zip.start_file(name, FileOptions::<()>::default())
            .map_err(|err| write_err(&err))?;
        zip.write_all(&bytes).map_err(|err| write_err(&err))?;
    }
    zip.finish()
        .map_err(|err| AppError::system(format!("Failed to finalize bundle: {err}"), trace_id))?;

    info!(trace_id = %trace_id, bundle = %bundle_path.display(), "diagnostics bundle written");
    Ok(bundle_path)
}
