//! Deletes downloaded files once they outlive the retention window.

use crate::ConfigState;
use std::path::{Path, PathBuf};
use std::sync::PoisonError;
use std::time::{Duration, SystemTime};
use walkdir::WalkDir;

/// Runs forever. Directory, TTL and interval are re-read from `config` on
/// every pass, so `POST /config` takes effect without a restart.
pub async fn run(config: ConfigState) {
    loop {
        let (dir, ttl, interval) = current_settings(&config);
        match tokio::task::spawn_blocking(move || sweep(&dir, ttl)).await {
            Ok(0) => {}
            Ok(removed) => tracing::info!("Janitor removed {} expired file(s)", removed),
            Err(e) => tracing::error!("Janitor task failed: {}", e),
        }
        tokio::time::sleep(interval).await;
    }
}

fn current_settings(config: &ConfigState) -> (PathBuf, Duration, Duration) {
    let config = config.read().unwrap_or_else(PoisonError::into_inner);
    (PathBuf::from(&config.download_directory), config.file_ttl(), config.cleanup_interval())
}

/// Removes regular files directly inside `dir` whose modification time is
/// older than `ttl`. Returns how many were deleted.
pub fn sweep(dir: &Path, ttl: Duration) -> usize {
    let now = SystemTime::now();
    let mut removed = 0;

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let modified = match entry.metadata().ok().and_then(|m| m.modified().ok()) {
            Some(modified) => modified,
            None => continue,
        };
        let age = now.duration_since(modified).unwrap_or_default();
        if age <= ttl {
            continue;
        }
        match std::fs::remove_file(entry.path()) {
            Ok(()) => {
                tracing::info!("Deleted old file: {}", entry.file_name().to_string_lossy());
                removed += 1;
            }
            Err(e) => tracing::warn!("Could not delete {}: {}", entry.path().display(), e),
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::fs::File;
    use std::sync::{Arc, RwLock};
    use tempfile::TempDir;

    fn age_file(path: &Path, age: Duration) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }

    #[test]
    fn removes_only_expired_files() {
        let temp_dir = TempDir::new().unwrap();
        let stale = temp_dir.path().join("old_123.mp4");
        let fresh = temp_dir.path().join("new_456.mp3");
        std::fs::write(&stale, b"old").unwrap();
        std::fs::write(&fresh, b"new").unwrap();
        age_file(&stale, Duration::from_secs(2 * 3600));

        let removed = sweep(temp_dir.path(), Duration::from_secs(3600));

        assert_eq!(removed, 1);
        assert!(!stale.exists());
        assert!(fresh.exists());
    }

    #[test]
    fn leaves_subdirectories_alone() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("keep");
        std::fs::create_dir(&nested).unwrap();
        let inner = nested.join("inner.mp4");
        std::fs::write(&inner, b"x").unwrap();
        age_file(&inner, Duration::from_secs(2 * 3600));

        assert_eq!(sweep(temp_dir.path(), Duration::from_secs(3600)), 0);
        assert!(inner.exists());
    }

    #[tokio::test]
    async fn follows_directory_and_ttl_changes() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        let config: ConfigState = Arc::new(RwLock::new(Config {
            download_directory: first.path().to_string_lossy().to_string(),
            file_ttl_secs: 3600,
            cleanup_interval_secs: 1,
            ..Config::default()
        }));
        let task = tokio::spawn(run(config.clone()));

        let moved = second.path().join("moved_1.mp4");
        std::fs::write(&moved, b"x").unwrap();
        age_file(&moved, Duration::from_secs(600));
        {
            let mut config = config.write().unwrap();
            config.download_directory = second.path().to_string_lossy().to_string();
            config.file_ttl_secs = 300;
        }

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while moved.exists() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        task.abort();

        assert!(!moved.exists());
    }

    #[test]
    fn missing_directory_is_not_an_error() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(sweep(&temp_dir.path().join("absent"), Duration::from_secs(1)), 0);
    }
}
