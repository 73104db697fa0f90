//! Error types for dictation

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DictationError {
    #[error("Unknown key: {0}")]
    UnknownKey(String),
    #[error("Invalid {field}: {reason}")]
    InvalidConfig { field: &'static str, reason: String },
    #[error("Sounder not ready: no instrument loaded")]
    SounderNotReady,
    #[error("Playback already in progress")]
    PlaybackBusy,
    #[error("Instrument load failed: {0}")]
    InstrumentLoad(String),
}

impl DictationError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig { field, reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, DictationError>;
