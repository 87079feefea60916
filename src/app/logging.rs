//! Usage: Process-wide tracing setup (stderr + daily rolling file under `{data_dir}/logs`).

use crate::infra::app_paths;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const LOG_FILTER_ENV: &str = "COMPOSER_HUB_LOG";
const LOG_FILE_PREFIX: &str = "composer-hub.log";
const DEFAULT_FILTER: &str = "info";

fn env_filter(verbose: bool) -> EnvFilter {
    let fallback = if verbose { "debug" } else { DEFAULT_FILTER };
    EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Installs the global subscriber. Keep the returned guard alive until exit so the file writer
/// flushes; `None` means file logging could not be set up and only stderr is active.
pub fn init(data_dir: &Path, verbose: bool) -> Option<WorkerGuard> {
    let log_dir = app_paths::logs_dir(data_dir);
    let file_ready = match std::fs::create_dir_all(&log_dir) {
        Ok(()) => true,
        Err(err) => {
            eprintln!("failed to create log dir {}: {err}", log_dir.display());
            false
        }
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(env_filter(verbose));

    let (file_layer, guard) = if file_ready {
        let appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_thread_ids(true)
            .with_filter(env_filter(verbose));
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    if tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .is_err()
    {
        // Already installed (tests, embedding host); keep the existing subscriber.
        return None;
    }

    if let Err(err) = tracing_log::LogTracer::init() {
        tracing::debug!("log bridge already installed: {err}");
    }

    install_panic_hook();
    tracing::info!(log_dir = %log_dir.display(), "logging initialized");
    guard
}

fn install_panic_hook() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!("panic: {info}");
        previous(info);
    }));
}

