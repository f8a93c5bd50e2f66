use std::io::{stderr, IsTerminal, Write};

use tracing_subscriber::EnvFilter;

pub fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if cfg!(debug_assertions) {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .json()
            .with_target(false)
            .try_init();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerStyle {
    Title,
    Failure,
}

fn format_banner(message: &str, style: BannerStyle, color: bool) -> String {
    let (marker, ansi) = match style {
        BannerStyle::Title => ('*', "\x1b[1;32m"),
        BannerStyle::Failure => ('!', "\x1b[41m"),
    };
    if color {
        format!("\n{ansi}{marker} {message}\x1b[0m\n")
    } else {
        format!("\n{marker} {message}\n")
    }
}

/// Writes a marked console line, bypassing the log filter so it shows up even when
/// structured logs go to a collector.
pub fn banner(message: &str, style: BannerStyle) {
    let mut err = stderr();
    let color = err.is_terminal();
    let _ = err.write_all(format_banner(message, style, color).as_bytes());
}
