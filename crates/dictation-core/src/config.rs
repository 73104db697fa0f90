//! Exercise configuration and persisted settings

use serde::{Deserialize, Serialize};

use crate::cadence::CadenceType;
use crate::error::{DictationError, Result};
use crate::key::Key;
use crate::scheduler::Scheduler;

/// How answers are graded. The two flows are exclusive within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradingMode {
    /// Every press is checked against the next melody degree
    #[default]
    Incremental,
    /// Slots are filled freely, then the whole answer is checked at once
    Batch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExerciseConfig {
    pub key: String,
    pub cadence_type: CadenceType,
    pub melody_length: usize,
    /// Widest allowed step between neighbours; `None` is unbounded
    pub max_interval: Option<u32>,
    /// `None` runs until stopped
    pub num_questions: Option<u32>,
    pub playback_speed: f64,
    pub random_keys: bool,
    pub grading_mode: GradingMode,
}

impl Default for ExerciseConfig {
    fn default() -> Self {
        Self {
            key: "Bb".to_string(),
            cadence_type: CadenceType::OneFourFive,
            melody_length: 4,
            max_interval: Some(12),
            num_questions: Some(100),
            playback_speed: 1.0,
            random_keys: false,
            grading_mode: GradingMode::Incremental,
        }
    }
}

impl ExerciseConfig {
    /// Check every field, resolving the configured key
    pub fn validate(&self) -> Result<&'static Key> {
        let key = Key::from_name(&self.key)?;

        if self.melody_length == 0 {
            return Err(DictationError::invalid("melodyLength", "must be at least 1"));
        }
        validate_speed(self.playback_speed)?;
        if self.num_questions == Some(0) {
            return Err(DictationError::invalid("numQuestions", "must be at least 1"));
        }
        Ok(key)
    }

    /// Replace the speed with a previously saved one, if it is usable
    pub fn apply_saved_speed(&mut self, store: &dyn SettingsStore) {
        if let Some(speed) = store.load_speed().filter(|s| validate_speed(*s).is_ok()) {
            self.playback_speed = speed;
        }
    }
}

pub fn validate_speed(speed: f64) -> Result<()> {
    Scheduler::new(speed).map(|_| ())
}

/// Where the playback speed survives between runs
pub trait SettingsStore: Send {
    fn load_speed(&self) -> Option<f64>;
    fn save_speed(&mut self, speed: f64);
}

/// In-memory store, for hosts without persistence
#[derive(Debug, Clone, Default)]
pub struct MemorySettings {
    speed: Option<f64>,
}

impl SettingsStore for MemorySettings {
    fn load_speed(&self) -> Option<f64> {
        self.speed
    }

    fn save_speed(&mut self, speed: f64) {
        self.speed = Some(speed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = ExerciseConfig::default();
        assert_eq!(config.validate().unwrap().name(), "Bb");
    }

    #[test]
    fn test_parse_camel_case_json() {
        let config: ExerciseConfig = serde_json::from_str(
            r#"{
                "key": "Am",
                "cadenceType": "i-iv-v",
                "melodyLength": 3,
                "maxInterval": null,
                "numQuestions": 5,
                "playbackSpeed": 1.5,
                "gradingMode": "batch"
            }"#,
        )
        .unwrap();

        assert_eq!(config.key, "Am");
        assert_eq!(config.cadence_type, CadenceType::OneFourFive);
        assert_eq!(config.max_interval, None);
        assert_eq!(config.num_questions, Some(5));
        assert_eq!(config.grading_mode, GradingMode::Batch);
        assert!(!config.random_keys);
    }

    #[test]
    fn test_rejections_name_the_field() {
        let bad_key = ExerciseConfig { key: "X#".into(), ..Default::default() };
        assert_eq!(bad_key.validate().unwrap_err(), DictationError::UnknownKey("X#".into()));

        let cases = [
            (ExerciseConfig { melody_length: 0, ..Default::default() }, "melodyLength"),
            (ExerciseConfig { playback_speed: 0.0, ..Default::default() }, "playbackSpeed"),
            (ExerciseConfig { playback_speed: -2.0, ..Default::default() }, "playbackSpeed"),
            (ExerciseConfig { num_questions: Some(0), ..Default::default() }, "numQuestions"),
        ];
        for (config, expected) in cases {
            match config.validate() {
                Err(DictationError::InvalidConfig { field, .. }) => assert_eq!(field, expected),
                other => panic!("expected {expected} rejection, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_saved_speed_applies_when_valid() {
        let mut store = MemorySettings::default();
        let mut config = ExerciseConfig::default();

        config.apply_saved_speed(&store);
        assert_eq!(config.playback_speed, 1.0);

        store.save_speed(1.4);
        config.apply_saved_speed(&store);
        assert_eq!(config.playback_speed, 1.4);

        store.save_speed(-1.0);
        config.apply_saved_speed(&store);
        assert_eq!(config.playback_speed, 1.4);
    }
}
