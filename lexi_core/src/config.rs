//! Tunable thresholds and limits

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LexiResult;
use crate::recognition::DEFAULT_RECOGNITION_TIMEOUT;
use crate::scoring::FeedbackLocale;
use crate::stages::DEFAULT_STAGES_PER_TRACK;
use crate::wrong_answers::DEFAULT_MISS_THRESHOLD;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LexiConfig {
    /// Overall score needed for an attempt to count as correct
    pub pass_threshold: u8,
    /// Misses before an item shows up in the wrong-answer notes
    pub miss_threshold: u32,
    pub recognition_timeout_ms: u64,
    /// Failed attempts after which a stage session moves on
    pub max_attempts_per_item: u32,
    pub stages_per_track: u32,
    pub feedback_locale: FeedbackLocale,
}

impl Default for LexiConfig {
    fn default() -> Self {
        Self {
            pass_threshold: 70,
            miss_threshold: DEFAULT_MISS_THRESHOLD,
            recognition_timeout_ms: DEFAULT_RECOGNITION_TIMEOUT.as_millis() as u64,
            max_attempts_per_item: 3,
            stages_per_track: DEFAULT_STAGES_PER_TRACK,
            feedback_locale: FeedbackLocale::Korean,
        }
    }
}

impl LexiConfig {
    /// Read a JSON config file; absent fields keep their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> LexiResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(contents: &str) -> LexiResult<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    pub fn recognition_timeout(&self) -> Duration {
        Duration::from_millis(self.recognition_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = LexiConfig::default();
        assert_eq!(config.pass_threshold, 70);
        assert_eq!(config.miss_threshold, 3);
        assert_eq!(config.recognition_timeout(), Duration::from_millis(4000));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = LexiConfig::from_json_str(r#"{"pass_threshold": 60, "feedback_locale": "english"}"#).unwrap();
        assert_eq!(config.pass_threshold, 60);
        assert_eq!(config.feedback_locale, FeedbackLocale::English);
        assert_eq!(config.miss_threshold, 3);
        assert_eq!(config.stages_per_track, 30);
    }

    #[test]
    fn test_from_file_and_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"recognition_timeout_ms": 2500}"#).unwrap();
        let config = LexiConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.recognition_timeout_ms, 2500);

        assert!(LexiConfig::from_json_str("{not json").is_err());
    }
}
