//! Logging setup shared by the kvfs crates.
//!
//! The level is read from the `KVFS_LOG` environment variable:
//! - `off` (default): nothing is emitted
//! - `error`, `warn`, `info`, `debug`: minimum level written to stderr
//!
//! Library code only uses the `log_*` macros below; binaries call
//! [`init_diagnostics`] once at startup.

use std::sync::Once;

// Re-export emit so the macros resolve from any crate
pub use emit;

/// Environment variable holding the log level.
pub const LOG_ENV: &str = "KVFS_LOG";

static INIT: Once = Once::new();

/// Parsed value of `KVFS_LOG`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSetting {
    Off,
    Min(emit::Level),
    /// Unrecognized value, treated as `info`.
    Unknown,
}

/// Interpret a `KVFS_LOG` value.
#[must_use]
pub fn parse_level(value: &str) -> LogSetting {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "off" => LogSetting::Off,
        "debug" => LogSetting::Min(emit::Level::Debug),
        "info" => LogSetting::Min(emit::Level::Info),
        "warn" => LogSetting::Min(emit::Level::Warn),
        "error" => LogSetting::Min(emit::Level::Error),
        _ => LogSetting::Unknown,
    }
}

/// Initialize diagnostics based on the `KVFS_LOG` environment variable.
///
/// Safe to call more than once; only the first call has an effect.
pub fn init_diagnostics() {
    INIT.call_once(|| {
        let raw = std::env::var(LOG_ENV).unwrap_or_else(|_| "off".to_string());

        let min = match parse_level(&raw) {
            LogSetting::Off => return,
            LogSetting::Min(level) => level,
            LogSetting::Unknown => {
                // Emitter is not up yet, so this one goes straight to stderr
                eprintln!("Warning: unknown {LOG_ENV} value '{raw}', using 'info'");
                emit::Level::Info
            }
        };

        let rt = emit::setup()
            .emit_to(emit_term::stderr())
            .emit_when(emit::level::min_filter(min))
            .init();

        // The runtime must outlive every emitting thread
        std::mem::forget(rt);
    });
}

/// Operation-level messages a user may want to see (root created, store opened).
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::emit::info!($($arg)*)
    };
}

/// Detailed tracing: block reads, lookups, flush progress.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::emit::debug!($($arg)*)
    };
}

/// Recoverable problems, including the best-effort delete and flush paths.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::emit::warn!($($arg)*)
    };
}

/// Failures that abort an operation.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::emit::error!($($arg)*)
    };
}

pub use init_diagnostics as init;
