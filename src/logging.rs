//! File logging for charade using the tracing crate.
//!
//! Logs go to a daily-rotated file under the XDG state directory and never to
//! the terminal, which belongs to the recorder UI. Only the newest week of
//! log files is kept.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing_appender::rolling;
use tracing_subscriber::prelude::*;

/// Prefix of every log file name.
pub const LOG_FILE_PREFIX: &str = "charade.log";

/// Number of daily log files kept.
const MAX_LOG_FILES: usize = 7;

/// Keeps the non-blocking writer alive for the program lifetime.
static APPENDER_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// Initializes the logging system with file-based output.
///
/// Log level comes from RUST_LOG and defaults to "info".
///
/// # Errors
/// - If the log directory cannot be determined or created
/// - If logging was already initialized
pub fn init_logging() -> Result<(), anyhow::Error> {
    let log_dir = log_dir()?;
    fs::create_dir_all(&log_dir)?;

    if let Err(e) = cleanup_old_logs(&log_dir) {
        eprintln!("Warning: Failed to cleanup old logs: {e}");
    }

    let file_appender = rolling::daily(&log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    APPENDER_GUARD
        .set(guard)
        .map_err(|_| anyhow::anyhow!("Logging already initialized"))?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_ansi(false),
        )
        .init();

    tracing::debug!("Logging initialized. Log directory: {}", log_dir.display());
    Ok(())
}

/// The log directory: `$XDG_STATE_HOME/charade` or `~/.local/state/charade`.
///
/// # Errors
/// - If the home directory cannot be determined
pub fn log_dir() -> Result<PathBuf, anyhow::Error> {
    if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME") {
        if !xdg_state.is_empty() {
            return Ok(PathBuf::from(xdg_state).join("charade"));
        }
    }
    let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;
    Ok(home.join(".local/state/charade"))
}

/// Removes all but the newest [`MAX_LOG_FILES`] dated log files.
///
/// # Errors
/// - If the log directory cannot be read
fn cleanup_old_logs(log_dir: &Path) -> Result<(), anyhow::Error> {
    let mut log_files: Vec<_> = fs::read_dir(log_dir)?
        .filter_map(|entry| {
            let path = entry.ok()?.path();
            let file_name = path.file_name()?.to_string_lossy().to_string();

            // Dated files look like charade.log.YYYY-MM-DD
            let date = file_name.strip_prefix(&format!("{LOG_FILE_PREFIX}."))?;
            if date.matches('-').count() != 2 {
                return None;
            }
            let modified = fs::metadata(&path).ok()?.modified().ok()?;
            Some((path, modified))
        })
        .collect();

    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    for (path, _) in log_files.iter().skip(MAX_LOG_FILES) {
        if let Err(e) = fs::remove_file(path) {
            tracing::warn!("Failed to delete old log file {}: {}", path.display(), e);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    #[test]
    fn test_cleanup_keeps_newest_week() {
        let dir = tempfile::tempdir().unwrap();
        let now = SystemTime::now();

        for day in 1..=10u64 {
            let path = dir.path().join(format!("{LOG_FILE_PREFIX}.2026-01-{day:02}"));
            let file = fs::File::create(&path).unwrap();
            file.set_modified(now - Duration::from_secs((10 - day) * 86_400))
                .unwrap();
        }
        fs::write(dir.path().join("unrelated.txt"), "keep").unwrap();

        cleanup_old_logs(dir.path()).unwrap();

        let remaining: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(remaining.len(), MAX_LOG_FILES + 1);
        assert!(remaining.contains(&"unrelated.txt".to_string()));
        assert!(remaining.contains(&format!("{LOG_FILE_PREFIX}.2026-01-10")));
        assert!(!remaining.contains(&format!("{LOG_FILE_PREFIX}.2026-01-01")));
    }
}
