//! Runtime configuration
//!
//! Loaded from JSON (every field optional) or built in code with the
//! `with_*` setters.
//!
//! ```json
//! { "code_dir": "./scripts", "clock": "realtime", "event_poll_ms": 5 }
//! ```

use crate::error::{Error, Result};
use crate::modules::normalize;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How the loop clock advances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockMode {
    /// Jump straight to the next timer's fire time
    #[default]
    Virtual,
    /// Sleep until timers are actually due
    Realtime,
}

/// Configuration for a [`Runtime`](crate::Runtime)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Directory entry paths and module sources are resolved against
    pub code_dir: PathBuf,
    /// Clock mode for timers
    pub clock: ClockMode,
    /// How long the idle loop blocks waiting for external events (ms)
    pub event_poll_ms: u64,
    /// Forward unhandled rejections to the host
    pub report_unhandled_rejections: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            code_dir: PathBuf::from("."),
            clock: ClockMode::Virtual,
            event_poll_ms: 10,
            report_unhandled_rejections: true,
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_json_str(&json)
    }

    pub fn with_code_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.code_dir = dir.into();
        self
    }

    pub fn with_clock(mut self, clock: ClockMode) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_event_poll_ms(mut self, ms: u64) -> Self {
        self.event_poll_ms = ms;
        self
    }

    pub fn with_unhandled_rejection_reports(mut self, enabled: bool) -> Self {
        self.report_unhandled_rejections = enabled;
        self
    }

    /// Absolute, normalised code directory (relative paths are taken from
    /// the current working directory)
    pub fn resolved_code_dir(&self) -> PathBuf {
        if self.code_dir.is_absolute() {
            return normalize(&self.code_dir);
        }
        let dir = std::env::current_dir()
            .map(|cwd| cwd.join(&self.code_dir))
            .unwrap_or_else(|_| self.code_dir.clone());
        normalize(&dir)
    }

    /// Reject settings the loop cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.code_dir.as_os_str().is_empty() {
            return Err(Error::Config("code_dir must not be empty".into()));
        }
        if self.event_poll_ms == 0 {
            return Err(Error::Config("event_poll_ms must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.code_dir, PathBuf::from("."));
        assert_eq!(config.clock, ClockMode::Virtual);
        assert!(config.report_unhandled_rejections);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = RuntimeConfig::from_json_str(r#"{ "clock": "realtime" }"#).unwrap();
        assert_eq!(config.clock, ClockMode::Realtime);
        assert_eq!(config.event_poll_ms, 10);
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let err = RuntimeConfig::from_json_str(r#"{ "clock": "sundial" }"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = RuntimeConfig::from_json_str(r#"{ "event_poll_ms": 0 }"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{ "code_dir": "/srv/js", "event_poll_ms": 3 }}"#).unwrap();
        let config = RuntimeConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.code_dir, PathBuf::from("/srv/js"));
        assert_eq!(config.event_poll_ms, 3);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = RuntimeConfig::from_json_file(Path::new("/nonexistent/jobloop.json"))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::IoError);
    }

    #[test]
    fn test_resolved_code_dir() {
        let config = RuntimeConfig::new().with_code_dir("/srv/./js/../code");
        assert_eq!(config.resolved_code_dir(), PathBuf::from("/srv/code"));
        assert!(RuntimeConfig::default().resolved_code_dir().is_absolute());
    }

    #[test]
    fn test_builder() {
        let config = RuntimeConfig::new()
            .with_code_dir("/tmp/code")
            .with_clock(ClockMode::Realtime)
            .with_unhandled_rejection_reports(false);
        assert_eq!(config.code_dir, PathBuf::from("/tmp/code"));
        assert!(!config.report_unhandled_rejections);
    }
}
