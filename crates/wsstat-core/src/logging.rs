//! Diagnostics for the measurement tools.
//!
//! Logs go to stderr so stdout carries only the measurement. With a log
//! directory, a daily-rotating file is written through a non-blocking writer;
//! keep the returned guard alive until exit or buffered lines are lost.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber. `RUST_LOG` wins over `log_level`.
pub fn init_logging(log_level: &str, log_dir: Option<&Path>, file_prefix: &str) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let stderr = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let (file, guard) = match log_dir {
        Some(dir) => {
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, file_prefix));
            let layer = fmt::layer().with_writer(writer).with_ansi(false).with_thread_ids(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry().with(env_filter).with(stderr).with(file).init();
    guard
}
