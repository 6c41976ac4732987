//! Print the tail of the newest log file.

use anyhow::anyhow;
use std::fs;
use std::path::{Path, PathBuf};

use crate::logging::{log_dir, LOG_FILE_PREFIX};

const DEFAULT_LINES: usize = 50;

/// Shows the last lines of the most recent charade log.
///
/// # Errors
/// - If the log directory cannot be determined
/// - If the log file cannot be read
pub fn handle_logs() -> Result<(), anyhow::Error> {
    let log_dir = log_dir()?;

    if !log_dir.exists() {
        println!("No logs yet. They will appear in {}", log_dir.display());
        return Ok(());
    }

    let Some(log_file) = find_latest_log(&log_dir)? else {
        println!("No log files found in {}", log_dir.display());
        return Ok(());
    };

    let content =
        fs::read_to_string(&log_file).map_err(|e| anyhow!("Failed to read log file: {e}"))?;
    let lines = tail(&content, DEFAULT_LINES);

    if lines.is_empty() {
        println!("Log file is empty: {}", log_file.display());
        return Ok(());
    }

    println!("{}", log_file.display());
    println!();
    for line in lines {
        println!("{line}");
    }
    Ok(())
}

/// The last `count` lines of `content`.
fn tail(content: &str, count: usize) -> Vec<&str> {
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].to_vec()
}

/// The most recently modified charade log file, if any.
fn find_latest_log(log_dir: &Path) -> Result<Option<PathBuf>, anyhow::Error> {
    let entries =
        fs::read_dir(log_dir).map_err(|e| anyhow!("Failed to read log directory: {e}"))?;

    let latest = entries
        .filter_map(|entry| {
            let path = entry.ok()?.path();
            let name = path.file_name()?.to_str()?;
            if !name.starts_with(LOG_FILE_PREFIX) {
                return None;
            }
            let modified = fs::metadata(&path).ok()?.modified().ok()?;
            Some((path, modified))
        })
        .max_by_key(|(_, modified)| *modified)
        .map(|(path, _)| path);

    Ok(latest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    #[test]
    fn test_tail_keeps_last_lines() {
        assert_eq!(tail("a\nb\nc\n", 2), vec!["b", "c"]);
        assert_eq!(tail("a\n", 5), vec!["a"]);
        assert!(tail("", 5).is_empty());
    }

    #[test]
    fn test_find_latest_log_ignores_other_files() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(find_latest_log(dir.path()).unwrap(), None);

        let now = SystemTime::now();
        let old = dir.path().join(format!("{LOG_FILE_PREFIX}.2026-01-01"));
        let new = dir.path().join(format!("{LOG_FILE_PREFIX}.2026-01-02"));
        fs::File::create(&old)
            .unwrap()
            .set_modified(now - Duration::from_secs(86_400))
            .unwrap();
        fs::File::create(&new).unwrap().set_modified(now).unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();

        assert_eq!(find_latest_log(dir.path()).unwrap(), Some(new));
    }
}
