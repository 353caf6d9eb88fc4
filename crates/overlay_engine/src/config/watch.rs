//! Reload the configuration file when it changes on disk
//!
//! The file's modification time is compared against the one seen at the
//! last load, at most once per poll interval.

use std::time::{Duration, Instant, SystemTime};

use super::{Config, ConfigError, OverlayConfig};

/// Watches one configuration file for modifications
pub struct ConfigWatcher {
    path: String,
    modified: Option<SystemTime>,
    interval: Duration,
    last_check: Instant,
}

impl ConfigWatcher {
    /// Start watching `path`; its current contents count as already loaded
    pub fn new(path: impl Into<String>, interval: Duration) -> Self {
        let path = path.into();
        let modified = modified_time(&path);
        Self {
            path,
            modified,
            interval,
            last_check: Instant::now(),
        }
    }

    /// Path being watched
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The reloaded configuration if the file changed since the last load
    ///
    /// A missing file is ignored. A change that fails to parse or validate is
    /// reported once; the next successful save is picked up again.
    pub fn poll(&mut self) -> Option<Result<OverlayConfig, ConfigError>> {
        if self.last_check.elapsed() < self.interval {
            return None;
        }
        self.last_check = Instant::now();

        let current = modified_time(&self.path)?;
        if self.modified.is_some_and(|previous| current <= previous) {
            return None;
        }
        self.modified = Some(current);

        log::info!("Configuration {} changed, reloading", self.path);
        Some(OverlayConfig::load_from_file(&self.path).and_then(|config| {
            config.validate()?;
            Ok(config)
        }))
    }
}

fn modified_time(path: &str) -> Option<SystemTime> {
    std::fs::metadata(path).ok().and_then(|metadata| metadata.modified().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> String {
        let dir = std::env::temp_dir().join(format!("overlay_watch_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name).to_string_lossy().into_owned()
    }

    fn touch_later(path: &str, seconds: u64) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(seconds)).unwrap();
    }

    #[test]
    fn test_unchanged_file_is_not_reloaded() {
        let path = temp_path("unchanged.toml");
        OverlayConfig::transparent_text().save_to_file(&path).unwrap();

        let mut watcher = ConfigWatcher::new(&path, Duration::ZERO);
        assert!(watcher.poll().is_none());
        assert!(watcher.poll().is_none());
    }

    #[test]
    fn test_modified_file_is_reloaded_once() {
        let path = temp_path("modified.toml");
        OverlayConfig::transparent_text().save_to_file(&path).unwrap();
        let mut watcher = ConfigWatcher::new(&path, Duration::ZERO);

        let mut edited = OverlayConfig::transparent_text();
        edited.text.content = "Edited".to_string();
        edited.save_to_file(&path).unwrap();
        touch_later(&path, 10);

        let reloaded = watcher.poll().expect("change detected").unwrap();
        assert_eq!(reloaded.text.content, "Edited");
        assert!(watcher.poll().is_none());
    }

    #[test]
    fn test_invalid_edit_is_reported() {
        let path = temp_path("invalid.toml");
        OverlayConfig::transparent_text().save_to_file(&path).unwrap();
        let mut watcher = ConfigWatcher::new(&path, Duration::ZERO);

        std::fs::write(&path, "[renderer]\nmax_frames_in_flight = \"two\"\n").unwrap();
        touch_later(&path, 10);
        assert!(matches!(watcher.poll(), Some(Err(ConfigError::Parse(_)))));

        // Fixed on the next save
        OverlayConfig::transparent_text().save_to_file(&path).unwrap();
        touch_later(&path, 20);
        assert!(matches!(watcher.poll(), Some(Ok(_))));
    }

    #[test]
    fn test_interval_limits_checks() {
        let path = temp_path("interval.toml");
        OverlayConfig::transparent_text().save_to_file(&path).unwrap();
        let mut watcher = ConfigWatcher::new(&path, Duration::from_secs(3600));

        touch_later(&path, 10);
        assert!(watcher.poll().is_none());
    }

    #[test]
    fn test_missing_file_is_ignored() {
        let mut watcher = ConfigWatcher::new("/nonexistent/overlay.toml", Duration::ZERO);
        assert!(watcher.poll().is_none());
        assert_eq!(watcher.path(), "/nonexistent/overlay.toml");
    }
}
