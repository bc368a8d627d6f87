use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use vidqueue_core::fs_paths::{AppPaths, DesktopPaths};

const LOG_FILE: &str = "vidqueue.log";

fn default_directives(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    format!("{},reqwest=warn,hyper=warn,hyper_util=warn", level)
}

/// `RUST_LOG` wins over the `--verbose` default.
pub fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)))
}

fn open_log_file(dir: &Path) -> std::io::Result<File> {
    fs::create_dir_all(dir)?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(LOG_FILE))
}

/// Installs the global subscriber: stderr always, plus the log file under the
/// data dir when it can be opened.
pub fn init(verbose: bool) {
    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let log_dir = DesktopPaths.log_dir();
    let (file_layer, file_error) = match open_log_file(&log_dir) {
        Ok(file) => (
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            ),
            None,
        ),
        Err(e) => (None, Some(e)),
    };

    let result = tracing_subscriber::registry()
        .with(env_filter(verbose))
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    if result.is_err() {
        return;
    }

    match file_error {
        Some(e) => tracing::warn!("logging to stderr only, cannot open {}: {}", log_dir.display(), e),
        None => tracing::debug!("logging to {}", log_dir.join(LOG_FILE).display()),
    }
}
