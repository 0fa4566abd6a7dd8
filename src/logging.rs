use std::env;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "shelfkeeper=info,warn";
const DEFAULT_LOG_FILE: &str = "./logs/shelfkeeper.log";

/// Stdout plus a plain-text log file. Keep the returned guard alive for the
/// whole run or buffered file output is lost.
pub fn init_logger() -> impl Drop {
    let requested = env::var("TRACING_LEVEL").ok();
    let filter_layer = requested
        .as_deref()
        .and_then(|filter| EnvFilter::try_new(filter).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER));

    let log_file_path = env::var("LOG_FILE_PATH").unwrap_or_else(|_| DEFAULT_LOG_FILE.to_string());
    let (log_dir, log_file) = split_log_path(&log_file_path);

    let file_appender = tracing_appender::rolling::never(&log_dir, &log_file);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stdout)
                .compact()
                .with_target(false)
                .without_time()
                .with_ansi(true),
        )
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_thread_names(true)
                .with_ansi(false),
        )
        .with(filter_layer)
        .init();

    if let Some(bad) = requested.filter(|f| EnvFilter::try_new(f).is_err()) {
        warn!("Ignoring invalid TRACING_LEVEL '{}', using '{}'", bad, DEFAULT_FILTER);
    }
    info!("Logging to stdout and {}", log_dir.join(&log_file).display());

    guard
}

/// Splits a log file path into the directory the appender writes in and the
/// file name. A bare name lands in the working directory.
fn split_log_path(path: &str) -> (PathBuf, String) {
    let path = Path::new(path);
    let file = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "shelfkeeper.log".to_string());
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    (dir, file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_log_path() {
        assert_eq!(
            split_log_path("./logs/shelfkeeper.log"),
            (PathBuf::from("./logs"), "shelfkeeper.log".to_string())
        );
        assert_eq!(split_log_path("run.log"), (PathBuf::from("."), "run.log".to_string()));
        assert_eq!(
            split_log_path("/var/log/"),
            (PathBuf::from("/var"), "log".to_string())
        );
    }
}
