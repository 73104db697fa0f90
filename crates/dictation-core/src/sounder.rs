//! The sound-producing capability the engine plays through

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::debug;

use crate::error::{DictationError, Result};

/// A backend that can render a pitch at a scheduled time.
///
/// Times are absolute seconds on the sounder's own transport clock, the same
/// clock `current_time` reads. Pitch is a MIDI note number.
pub trait NoteSounder: Send {
    /// Sound `pitch` from `start_time` for `duration` seconds
    fn play(&mut self, pitch: u8, start_time: f64, duration: f64, gain: f32);

    /// Begin switching to the named instrument; readiness drops until it lands
    fn load_instrument(&mut self, name: &str) -> LoadHandle;

    /// Whether an instrument is loaded and playable
    fn is_ready(&self) -> bool;

    /// Current transport time in seconds
    fn current_time(&self) -> f64;
}

/// Completion signal for an instrument load
pub struct LoadHandle {
    done_rx: Receiver<Result<()>>,
}

impl LoadHandle {
    /// Handle plus the sender the loader reports through
    pub fn channel() -> (Sender<Result<()>>, Self) {
        let (done_tx, done_rx) = bounded(1);
        (done_tx, Self { done_rx })
    }

    /// Handle that has already resolved
    pub fn resolved(result: Result<()>) -> Self {
        let (done_tx, handle) = Self::channel();
        let _ = done_tx.send(result);
        handle
    }

    /// Block until the load finishes
    pub fn wait(self) -> Result<()> {
        self.done_rx
            .recv()
            .unwrap_or_else(|_| Err(DictationError::InstrumentLoad("loader went away".into())))
    }

    pub fn is_done(&self) -> bool {
        !self.done_rx.is_empty()
    }

    /// Outcome if the load already finished
    pub fn try_result(&self) -> Option<Result<()>> {
        self.done_rx.try_recv().ok()
    }
}

/// A `play` call as received by [`RecordingSounder`]
#[derive(Debug, Clone, PartialEq)]
pub struct PlayedNote {
    pub pitch: u8,
    pub start_time: f64,
    pub duration: f64,
    pub gain: f32,
}

/// Silent sounder that records calls against a manually advanced clock.
/// Useful for headless hosts and for exercising the engine without audio.
#[derive(Debug, Clone)]
pub struct RecordingSounder {
    now: f64,
    instrument: Option<String>,
    played: Vec<PlayedNote>,
}

impl Default for RecordingSounder {
    fn default() -> Self {
        Self {
            now: 0.0,
            instrument: Some("recording".to_string()),
            played: Vec::new(),
        }
    }
}

impl RecordingSounder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sounder with nothing loaded yet
    pub fn unloaded() -> Self {
        Self { instrument: None, ..Self::default() }
    }

    pub fn advance(&mut self, secs: f64) {
        self.now += secs;
    }

    pub fn set_time(&mut self, now: f64) {
        self.now = now;
    }

    pub fn instrument(&self) -> Option<&str> {
        self.instrument.as_deref()
    }

    pub fn played(&self) -> &[PlayedNote] {
        &self.played
    }

    pub fn take_played(&mut self) -> Vec<PlayedNote> {
        std::mem::take(&mut self.played)
    }
}

impl NoteSounder for RecordingSounder {
    fn play(&mut self, pitch: u8, start_time: f64, duration: f64, gain: f32) {
        self.played.push(PlayedNote { pitch, start_time, duration, gain });
    }

    fn load_instrument(&mut self, name: &str) -> LoadHandle {
        debug!(instrument = name, "Recording sounder switched instrument");
        self.instrument = Some(name.to_string());
        LoadHandle::resolved(Ok(()))
    }

    fn is_ready(&self) -> bool {
        self.instrument.is_some()
    }

    fn current_time(&self) -> f64 {
        self.now
    }
}
