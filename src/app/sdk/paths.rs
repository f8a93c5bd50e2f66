use std::path::Path;

use crate::app::models::{EnvironmentContext, ImageVariant, PlatformVersion};

pub const RAMDISK_FILE: &str = "ramdisk.img";
pub const FEATURES_FILE: &str = "advancedFeatures.ini";

pub fn system_image_package(version: &PlatformVersion, variant: &ImageVariant) -> String {
    format!(
        "system-images;android-{};{};{}",
        version.api_level,
        variant.image_type.as_str(),
        variant.arch.as_str()
    )
}

/// Maps a platform version onto the SDK's system-image layout. Pure; the paths are only
/// expected to exist after the package has been provisioned.
pub fn resolve_environment(
    sdk_root: &Path,
    version: &PlatformVersion,
    variant: &ImageVariant,
) -> EnvironmentContext {
    let image_dir = sdk_root
        .join("system-images")
        .join(format!("android-{}", version.api_level))
        .join(variant.image_type.as_str())
        .join(variant.arch.as_str());
    EnvironmentContext {
        package: system_image_package(version, variant),
        ramdisk_path: image_dir.join(RAMDISK_FILE),
        features_path: image_dir.join(FEATURES_FILE),
    }
}
