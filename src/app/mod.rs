pub mod adb;
pub mod artifacts;
pub mod cancel;
pub mod config;
pub mod cycle;
pub mod diagnostics;
pub mod driver;
pub mod emulator;
pub mod error;
pub mod logging;
pub mod models;
pub mod monitor;
pub mod patch;
pub mod sdk;

#[cfg(test)]
pub(crate) mod testing;
