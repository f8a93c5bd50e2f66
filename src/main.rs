use std::path::PathBuf;

use avd_boot_harness_lib::app::adb::bridge::AdbBridge;
use avd_boot_harness_lib::app::cancel::{install_interrupt_handler, CancelToken};
use avd_boot_harness_lib::app::config::{ensure_runnable, load_config, validate_config, HarnessConfig};
use avd_boot_harness_lib::app::driver::{Driver, Toolchain};
use avd_boot_harness_lib::app::emulator::process::CommandLauncher;
use avd_boot_harness_lib::app::error::AppError;
use avd_boot_harness_lib::app::logging::init_logging;
use avd_boot_harness_lib::app::models::PlatformVersion;
use avd_boot_harness_lib::app::patch::CommandPatcher;
use avd_boot_harness_lib::app::sdk::locator::{validate_program, ToolPaths};
use avd_boot_harness_lib::app::sdk::tools::SdkManagerTools;
use clap::Parser;
use tracing::{error, info};
use uuid::Uuid;

const EXIT_FAIL: i32 = 1;
const EXIT_CONFIG: i32 = 2;

/// Boots each configured Android platform version twice to check that a patched ramdisk
/// survives a real boot.
#[derive(Debug, Parser)]
#[command(name = "avd_boot_harness", version)]
struct Args {
    /// JSON config file (defaults to $AVD_HARNESS_CONFIG_PATH, else built-in defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Android SDK root
    #[arg(long)]
    sdk_root: Option<String>,

    /// Platform version as API[:CODENAME]; repeat to test several in order
    #[arg(long = "api", value_parser = parse_version)]
    apis: Vec<PlatformVersion>,

    /// APK installed on the second boot
    #[arg(long)]
    apk: Option<String>,

    /// Activity component started after install
    #[arg(long)]
    activity: Option<String>,

    /// Directory for emulator logs and diagnostics bundles
    #[arg(long)]
    out: Option<PathBuf>,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    json: bool,
}

fn parse_version(value: &str) -> Result<PlatformVersion, String> {
    PlatformVersion::parse(value).ok_or_else(|| format!("invalid platform version: {value}"))
}

fn apply_overrides(mut config: HarnessConfig, args: &Args) -> HarnessConfig {
    if let Some(sdk_root) = &args.sdk_root {
        config.sdk_root = sdk_root.clone();
    }
    if !args.apis.is_empty() {
        config.platforms = args.apis.clone();
    }
    if let Some(apk) = &args.apk {
        config.app.apk_path = apk.clone();
    }
    if let Some(activity) = &args.activity {
        config.app.activity = activity.clone();
    }
    if let Some(out) = &args.out {
        config.output_path = out.to_string_lossy().to_string();
    }
    validate_config(config)
}

fn prepare(args: &Args, trace_id: &str) -> Result<(HarnessConfig, ToolPaths), AppError> {
    let config = load_config(args.config.as_deref(), trace_id)?;
    let config = apply_overrides(config, args);
    ensure_runnable(&config, trace_id)?;

    let paths = ToolPaths::from_sdk_root(&config.sdk_root());
    // emulator and platform-tools are installed by host setup, so only the
    // provisioning tools have to exist up front.
    validate_program(&paths.sdkmanager, "sdkmanager")
        .and_then(|()| validate_program(&paths.avdmanager, "avdmanager"))
        .map_err(|message| AppError::validation(message, trace_id))?;
    Ok((config, paths))
}

fn main() {
    let args = Args::parse();
    init_logging();
    let trace_id = Uuid::new_v4().to_string();

    let (config, paths) = match prepare(&args, &trace_id) {
        Ok(prepared) => prepared,
        Err(err) => {
            error!(trace_id = %trace_id, code = %err.code, error = %err.error, "invalid configuration");
            eprintln!("{err}");
            std::process::exit(EXIT_CONFIG);
        }
    };
    if let Err(err) = install_interrupt_handler(&trace_id) {
        eprintln!("{err}");
        std::process::exit(EXIT_FAIL);
    }

    let variant = config.variant();
    info!(
        trace_id = %trace_id,
        sdk_root = %config.sdk_root().display(),
        image_type = variant.image_type.as_str(),
        arch = variant.arch.as_str(),
        versions = config.platforms.len(),
        "starting run"
    );

    let sdk = SdkManagerTools::new(
        paths.sdkmanager.clone(),
        paths.avdmanager.clone(),
        config.tool_timeout(),
        trace_id.clone(),
    );
    let bridge = AdbBridge::for_sdk(config.sdk_root(), config.bridge_timeout(), trace_id.clone());
    let launcher = CommandLauncher::new(paths.emulator.clone(), trace_id.clone());
    let patcher = CommandPatcher::new(
        config.patch.command.clone(),
        config.tool_timeout(),
        trace_id.clone(),
    );
    let tools = Toolchain {
        sdk: &sdk,
        bridge: &bridge,
        launcher: &launcher,
        patcher: &patcher,
    };

    let summary = Driver::new(&config, tools, CancelToken::new(), trace_id.clone()).run();

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).unwrap_or_default()
        );
    } else {
        match (&summary.error, &summary.diagnostics_bundle) {
            (Some(error), Some(bundle)) => println!("{}: {error} (diagnostics: {bundle})", summary.status),
            (Some(error), None) => println!("{}: {error}", summary.status),
            _ => println!("{}: {} platform versions", summary.status, summary.versions.len()),
        }
    }

    if !summary.passed() {
        std::process::exit(EXIT_FAIL);
    }
}
