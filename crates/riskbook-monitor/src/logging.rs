//! Logging setup.

use std::path::Path;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

const LOG_FILE: &str = "riskbook.log";

/// Setup logging with the given level.
///
/// `RUST_LOG` overrides `level`. When `log_dir` is set, JSON lines are also
/// written to a daily-rolling `riskbook.log` there; keep the returned guard
/// alive until shutdown so buffered lines are flushed. If the directory cannot
/// be used, logging continues on stdout only and `None` is returned.
/// Installing a second subscriber is a no-op.
pub fn setup_logging(level: &str, json: bool, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout: BoxedLayer = if json {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().pretty().boxed()
    };

    let mut layers = vec![stdout];
    let mut file_error = None;
    let guard = match log_dir.map(|dir| (dir, file_appender(dir))) {
        Some((_, Ok(appender))) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .json()
                    .boxed(),
            );
            Some(guard)
        }
        Some((dir, Err(err))) => {
            file_error = Some((dir.display().to_string(), err));
            None
        }
        None => None,
    };

    let _ = tracing_subscriber::registry()
        .with(layers.with_filter(filter))
        .try_init();

    if let Some((dir, err)) = file_error {
        warn!(dir = %dir, error = %err, "Log directory unusable, logging to stdout only");
    }
    guard
}

fn file_appender(dir: &Path) -> Result<RollingFileAppender, InitError> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE)
        .build(dir)
}
