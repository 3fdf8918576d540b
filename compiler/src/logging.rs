//! Logging configuration for the vesper compiler
//!
//! Utilities for initializing and configuring logging using the `log` and
//! `env_logger` crates.
//!
//! # Log Levels
//!
//! The vesper compiler uses log levels as follows:
//!
//! - `error!` - Actual errors that should always be shown
//! - `warn!` - Warnings that may indicate problems
//! - `info!` - High-level progress (compilation phases)
//! - `debug!` - Detailed debugging (per-function flow graph construction)
//! - `trace!` - Very verbose (per-node linearization, dominator iterations)
//!
//! # Environment Variable
//!
//! Set `RUST_LOG` to control logging at runtime:
//!
//! ```bash
//! RUST_LOG=info vesper build main.vsp   # Show compilation phases
//! RUST_LOG=compiler::flowgraph=trace vesper build main.vsp
//! ```

use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;
use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize logging with sensible defaults (Warn level).
///
/// This only initializes once; subsequent calls are no-ops.
pub fn init() {
    init_with_level(LevelFilter::Warn);
}

/// Initialize logging with a specific level.
///
/// This only initializes once; subsequent calls are no-ops.
pub fn init_with_level(level: LevelFilter) {
    INIT.call_once(|| {
        Builder::new()
            .filter_level(level)
            .format(|buf, record| {
                writeln!(
                    buf,
                    "[{:5}] {}:{} - {}",
                    record.level(),
                    record.file().unwrap_or("unknown"),
                    record.line().unwrap_or(0),
                    record.args()
                )
            })
            .init();
    });
}

/// Initialize logging from the RUST_LOG environment variable.
///
/// If RUST_LOG is not set, defaults to Warn level.
pub fn init_from_env() {
    INIT.call_once(|| {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    });
}

/// Initialize logging for tests.
///
/// Suppresses most output unless RUST_LOG is explicitly set; safe to call
/// from any number of tests.
pub fn init_test() {
    let _ = env_logger::builder()
        .filter_level(LevelFilter::Warn)
        .is_test(true)
        .try_init();
}
