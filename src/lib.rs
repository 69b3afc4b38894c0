pub mod models;
pub mod services;

pub use models::{HumanizeOptions, HumanizeOutput, OutputFormat};
pub use services::{humanize, HumanizeError};

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::info;
use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;

const LOG_FILE_PREFIX: &str = "humanizer_";
const LOG_FILES_KEPT: usize = 30;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

fn env_flag(name: &str) -> bool {
    matches!(
        std::env::var(name).as_deref(),
        Ok("1") | Ok("true") | Ok("TRUE")
    )
}

/// Initialize logging with one timestamped log file per process.
///
/// `RUST_LOG` sets the filter (default `info`). `HUMANIZER_DISABLE_FILE_LOG`
/// keeps output on the console, `HUMANIZER_LOG_DIR` overrides the directory.
pub fn init_logging() {
    let disable_file_log = env_flag("HUMANIZER_DISABLE_FILE_LOG");
    let disable_cleanup = env_flag("HUMANIZER_DISABLE_LOG_CLEANUP");

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if disable_file_log {
        init_console_only_logging(env_filter);
        info!("File logging disabled via HUMANIZER_DISABLE_FILE_LOG");
        return;
    }

    let logs_dir = match std::env::var("HUMANIZER_LOG_DIR") {
        Ok(p) if !p.trim().is_empty() => PathBuf::from(p),
        _ => get_logs_dir(),
    };

    if let Err(e) = fs::create_dir_all(&logs_dir) {
        eprintln!("Failed to create logs directory: {}", e);
        init_console_only_logging(env_filter);
        info!("Falling back to console-only logging (log dir not writable)");
        return;
    }

    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let log_filename = format!("{}{}.log", LOG_FILE_PREFIX, timestamp);

    let file_appender = rolling::never(&logs_dir, &log_filename);
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(file_guard);

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true);

    // stderr keeps stdout free for rewritten output
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(cfg!(debug_assertions))
        .with_target(true);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init();

    info!("=== Humanizer Started ===");
    info!("Log file: {}/{}", logs_dir.display(), log_filename);
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    if !disable_cleanup {
        std::thread::spawn(move || {
            cleanup_old_logs(&logs_dir, LOG_FILES_KEPT);
        });
    }
}

/// Get the logs directory path
fn get_logs_dir() -> PathBuf {
    #[cfg(debug_assertions)]
    {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("logs")
    }

    #[cfg(not(debug_assertions))]
    {
        if let Some(data_dir) = dirs::data_local_dir() {
            return data_dir.join("humanizer").join("logs");
        }
        PathBuf::from("logs")
    }
}

fn cleanup_old_logs(logs_dir: &Path, keep: usize) {
    let mut entries: Vec<_> = match fs::read_dir(logs_dir) {
        Ok(rd) => rd.filter_map(|e| e.ok()).collect(),
        Err(_) => return,
    };

    entries.retain(|e| {
        let name = e.file_name().to_string_lossy().to_string();
        name.starts_with(LOG_FILE_PREFIX) && name.ends_with(".log")
    });

    if entries.len() <= keep {
        return;
    }

    entries.sort_by_key(|e| {
        (
            e.metadata()
                .and_then(|m| m.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH),
            e.file_name(),
        )
    });

    let remove_count = entries.len().saturating_sub(keep);
    for entry in entries.into_iter().take(remove_count) {
        let _ = fs::remove_file(entry.path());
    }
}

fn init_console_only_logging(env_filter: EnvFilter) {
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(cfg!(debug_assertions))
        .with_target(true);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_keeps_newest_logs_only() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            fs::write(dir.path().join(format!("humanizer_2026010{}_000000.log", i)), "x").unwrap();
        }
        fs::write(dir.path().join("other.log"), "x").unwrap();

        cleanup_old_logs(dir.path(), 3);

        let mut left: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        left.sort();
        assert_eq!(left.len(), 4);
        assert!(left.contains(&"other.log".to_string()));
        assert!(!left.contains(&"humanizer_20260100_000000.log".to_string()));
        assert!(!left.contains(&"humanizer_20260101_000000.log".to_string()));
    }

    #[test]
    fn test_cleanup_missing_dir_is_noop() {
        cleanup_old_logs(Path::new("/nonexistent/humanizer/logs"), 1);
    }
}
