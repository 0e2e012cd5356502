//! Logging initialization for femtoclaw.
//!
//! Supports three formats:
//! - `pretty`: multi-line human-readable output
//! - `component`: compact single-line output; use the [`log_component!`] macro
//!   to add a `component` field for per-subsystem filtering
//! - `json`: structured JSON lines, optionally appended to `logging.file`

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};

/// Initialize the global tracing subscriber from config.
///
/// Call this once at startup before any tracing events are emitted.
/// `RUST_LOG` wins over `cfg.level` when set. A second call is a no-op.
pub fn init_logging(cfg: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level));

    match cfg.format {
        LogFormat::Json => {
            let file = cfg.file.as_ref().and_then(|path| {
                match OpenOptions::new().create(true).append(true).open(path) {
                    Ok(file) => Some(file),
                    Err(e) => {
                        eprintln!("cannot open log file {}: {}, logging to stderr", path, e);
                        None
                    }
                }
            });
            let _ = match file {
                Some(file) => tracing_subscriber::fmt()
                    .json()
                    .with_env_filter(filter)
                    .with_writer(Mutex::new(file))
                    .try_init(),
                None => tracing_subscriber::fmt()
                    .json()
                    .with_env_filter(filter)
                    .with_writer(std::io::stderr)
                    .try_init(),
            };
        }
        LogFormat::Pretty => {
            let _ = tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init();
        }
        LogFormat::Component => {
            let _ = tracing_subscriber::fmt()
                .compact()
                .with_env_filter(filter)
                .with_target(true)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
}

/// Emit a component-tagged tracing event.
///
/// ```
/// # use femtoclaw::log_component;
/// log_component!(info, "bus", "dispatcher started");
/// log_component!(warn, "cron", "firing skipped", job_id = "abc123");
/// ```
#[macro_export]
macro_rules! log_component {
    ($level:ident, $component:expr, $msg:expr) => {
        tracing::$level!(component = $component, $msg)
    };
    ($level:ident, $component:expr, $msg:expr, $($key:ident = $val:expr),+ $(,)?) => {
        tracing::$level!(component = $component, $($key = $val,)+ $msg)
    };
}
