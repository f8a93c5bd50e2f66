//! Pristine copies of the two system-image files the patch step touches.
//!
//! A backup lives next to its artifact as `{path}.bak`. Once written it is never
//! overwritten or removed, and restoring always copies backup over live.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::app::error::AppError;
use crate::app::models::EnvironmentContext;

pub const BACKUP_SUFFIX: &str = ".bak";

pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// Copies each live artifact to its backup slot unless a backup already exists.
/// Must run before the first patch touches the ramdisk.
pub fn ensure_backup(context: &EnvironmentContext, trace_id: &str) -> Result<(), AppError> {
    for path in context.artifacts() {
        let backup = backup_path(path);
        if backup.exists() {
            debug!(trace_id = %trace_id, path = %backup.display(), "backup already present");
            continue;
        }
        if !path.exists() {
            warn!(trace_id = %trace_id, path = %path.display(), "artifact missing, nothing to back up");
            continue;
        }
        fs::copy(path, &backup).map_err(|err| {
            AppError::system(
                format!("Failed to back up {}: {err}", path.display()),
                trace_id,
            )
        })?;
        info!(trace_id = %trace_id, path = %path.display(), "artifact backed up");
    }
    Ok(())
}

/// Returns how many artifacts were restored. A missing backup is not an error.
pub fn restore(context: &EnvironmentContext, trace_id: &str) -> Result<usize, AppError> {
    let mut restored = 0;
    for path in context.artifacts() {
        let backup = backup_path(path);
        if !backup.is_file() {
            continue;
        }
        fs::copy(&backup, path).map_err(|err| {
            AppError::system(
                format!("Failed to restore {}: {err}", path.display()),
                trace_id,
            )
        })?;
        restored += 1;
    }
    debug!(trace_id = %trace_id, package = %context.package, restored, "artifacts restored");
    Ok(restored)
}
