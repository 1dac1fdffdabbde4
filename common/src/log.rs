//! Tracing setup: a real `tracing_subscriber::fmt` layer plus an
//! optional non-blocking file appender via `tracing-appender`.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::BaseConfig;

/// Initializes the global tracing subscriber. The returned guard must be
/// held for the process lifetime when file logging is enabled, or the
/// non-blocking writer drops pending lines on drop.
pub fn init_tracing(base: &BaseConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match &base.log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "neuract-agent.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(non_blocking)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}
