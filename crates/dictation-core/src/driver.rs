//! Exercise driver: sequences playback around a session
//!
//! Follow-up work (cue the cadence, play the melody after it, auto-advance
//! after a batch grade) is queued as continuations stamped with the session
//! generation. `tick` runs the ones that are due and drops any whose
//! generation has moved on, so a stop or manual advance can never be
//! overtaken by work queued for an earlier question. A cue that finds an
//! earlier question's playback still sounding waits for it to finish.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{ExerciseConfig, GradingMode, SettingsStore};
use crate::error::{DictationError, Result};
use crate::key::ScaleDegree;
use crate::playback::{PlaybackEngine, PlaybackKind, PlaybackTicket, FEEDBACK_NOTE_SECS};
use crate::session::{ExerciseSession, SessionSnapshot, SessionStatus};
use crate::sounder::NoteSounder;

/// Delay between a new question and its cadence
pub const CADENCE_CUE_SECS: f64 = 0.5;
/// Pause between the end of the cadence and the melody
pub const MELODY_AFTER_CADENCE_SECS: f64 = 1.0;
/// How long a graded batch answer stays up before moving on
pub const BATCH_ADVANCE_SECS: f64 = 3.0;
/// Same, when the next step finishes the exercise
pub const BATCH_FINISH_SECS: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DriverPhase {
    #[default]
    Idle,
    PlayingCadence,
    PlayingMelody,
    AwaitingAnswer,
    /// Batch answer graded; held until the scheduled advance
    Grading,
    /// Melody complete; waiting for a manual advance
    AwaitingAdvance,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    PlayCadence,
    PlayMelody,
    Advance,
}

#[derive(Debug, Clone, Copy)]
struct Continuation {
    due: f64,
    generation: u64,
    step: Step,
}

pub struct ExerciseDriver<S: NoteSounder> {
    session: ExerciseSession,
    engine: PlaybackEngine<S>,
    pending: Vec<Continuation>,
    phase: DriverPhase,
    /// Generation whose cadence should be followed by the melody
    chained_cadence: Option<u64>,
    settings: Option<Box<dyn SettingsStore>>,
}

impl<S: NoteSounder> ExerciseDriver<S> {
    pub fn new(session: ExerciseSession, sounder: S) -> Self {
        Self {
            session,
            engine: PlaybackEngine::new(sounder),
            pending: Vec::new(),
            phase: DriverPhase::Idle,
            chained_cadence: None,
            settings: None,
        }
    }

    pub fn with_settings(mut self, store: Box<dyn SettingsStore>) -> Self {
        self.settings = Some(store);
        self
    }

    pub fn session(&self) -> &ExerciseSession {
        &self.session
    }

    pub fn engine(&self) -> &PlaybackEngine<S> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut PlaybackEngine<S> {
        &mut self.engine
    }

    pub fn phase(&self) -> DriverPhase {
        self.phase
    }

    /// Continuations still queued, stale ones included
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Default configuration with the persisted playback speed applied
    pub fn initial_config(&self) -> ExerciseConfig {
        let mut config = ExerciseConfig::default();
        if let Some(store) = &self.settings {
            config.apply_saved_speed(store.as_ref());
        }
        config
    }

    pub fn start(&mut self, config: ExerciseConfig) -> Result<SessionSnapshot> {
        let snapshot = self.session.start(config)?;
        self.cue_question();
        Ok(snapshot)
    }

    /// Run whatever has come due on the sounder's clock
    pub fn tick(&mut self) {
        if let Some(ticket) = self.engine.poll() {
            self.on_playback_finished(ticket);
        }

        let now = self.engine.now();
        let generation = self.session.generation();
        let (due, waiting): (Vec<_>, Vec<_>) = self.pending.drain(..).partition(|c| c.due <= now);
        self.pending = waiting;

        for continuation in due {
            if continuation.generation != generation {
                debug!(step = ?continuation.step, "Dropping stale continuation");
                continue;
            }
            self.run(continuation.step);
        }
    }

    pub fn submit_degree(&mut self, degree: ScaleDegree) -> Result<SessionSnapshot> {
        let snapshot = self.session.submit_degree(degree)?;
        if snapshot.status != SessionStatus::InProgress {
            return Ok(snapshot);
        }

        let speed = self.session.config().playback_speed;
        if let Err(e) = self.engine.play_single_note(degree, self.session.key(), FEEDBACK_NOTE_SECS, speed) {
            debug!(degree, error = %e, "Feedback note dropped");
        }

        if snapshot.melody_complete {
            self.phase = DriverPhase::AwaitingAdvance;
        }
        Ok(snapshot)
    }

    /// Grade a batch answer and schedule the move to the next question
    pub fn submit_answer(&mut self) -> SessionSnapshot {
        let was_graded = self.session.melody_complete();
        let snapshot = self.session.submit_answer();
        if was_graded || snapshot.grading_mode != GradingMode::Batch || snapshot.batch_grade.is_none() {
            return snapshot;
        }

        let delay = if self.session.is_last_question() {
            BATCH_FINISH_SECS
        } else {
            BATCH_ADVANCE_SECS
        };
        self.schedule(delay, Step::Advance);
        self.phase = DriverPhase::Grading;
        snapshot
    }

    pub fn clear_answer(&mut self) -> SessionSnapshot {
        self.session.clear_answer()
    }

    pub fn advance(&mut self) -> Result<SessionSnapshot> {
        let snapshot = self.session.advance()?;
        self.after_advance(snapshot.status);
        Ok(snapshot)
    }

    pub fn stop(&mut self) -> SessionSnapshot {
        let snapshot = self.session.stop();
        self.chained_cadence = None;
        self.phase = DriverPhase::Idle;
        snapshot
    }

    pub fn replay_cadence(&mut self) -> Option<PlaybackTicket> {
        self.play(PlaybackKind::Cadence)
    }

    pub fn replay_melody(&mut self) -> Option<PlaybackTicket> {
        self.play(PlaybackKind::Melody)
    }

    pub fn set_playback_speed(&mut self, speed: f64) -> Result<SessionSnapshot> {
        let snapshot = self.session.set_playback_speed(speed)?;
        if let Some(store) = self.settings.as_mut() {
            store.save_speed(speed);
        }
        Ok(snapshot)
    }

    pub fn set_random_keys(&mut self, enabled: bool) -> SessionSnapshot {
        self.session.set_random_keys(enabled)
    }

    pub fn set_key(&mut self, name: &str) -> Result<SessionSnapshot> {
        self.session.set_key(name)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    fn cue_question(&mut self) {
        self.chained_cadence = None;
        self.phase = DriverPhase::PlayingCadence;
        self.schedule(CADENCE_CUE_SECS, Step::PlayCadence);
    }

    fn after_advance(&mut self, status: SessionStatus) {
        match status {
            SessionStatus::InProgress => self.cue_question(),
            SessionStatus::Complete => {
                self.phase = DriverPhase::Complete;
                info!("Exercise driver finished");
            }
            SessionStatus::Idle => self.phase = DriverPhase::Idle,
        }
    }

    fn schedule(&mut self, delay: f64, step: Step) {
        self.pending.push(Continuation {
            due: self.engine.now() + delay,
            generation: self.session.generation(),
            step,
        });
    }

    /// Re-queue a cue for when the in-flight playback ends
    fn defer_until_idle(&mut self, step: Step) {
        let due = self.engine.in_flight().map_or_else(|| self.engine.now(), |t| t.finishes_at);
        debug!(?step, due, "Playback busy, deferring cue");
        self.pending.push(Continuation {
            due,
            generation: self.session.generation(),
            step,
        });
    }

    fn run(&mut self, step: Step) {
        match step {
            Step::PlayCadence | Step::PlayMelody if self.engine.is_playing() => self.defer_until_idle(step),
            Step::PlayCadence => {
                let Some(ticket) = self.play(PlaybackKind::Cadence) else {
                    self.phase = DriverPhase::AwaitingAnswer;
                    return;
                };
                if ticket.finishes_at <= self.engine.now() {
                    // nothing sounded, go straight to the melody
                    self.schedule(MELODY_AFTER_CADENCE_SECS, Step::PlayMelody);
                } else {
                    self.chained_cadence = Some(self.session.generation());
                }
            }
            Step::PlayMelody => {
                if self.play(PlaybackKind::Melody).is_none() {
                    self.phase = DriverPhase::AwaitingAnswer;
                }
            }
            Step::Advance => match self.session.advance() {
                Ok(snapshot) => self.after_advance(snapshot.status),
                Err(e) => warn!(error = %e, "Auto-advance failed"),
            },
        }
    }

    fn on_playback_finished(&mut self, ticket: PlaybackTicket) {
        match ticket.kind {
            PlaybackKind::Cadence => {
                if self.chained_cadence.take() == Some(self.session.generation()) {
                    self.pending.push(Continuation {
                        due: ticket.finishes_at + MELODY_AFTER_CADENCE_SECS,
                        generation: self.session.generation(),
                        step: Step::PlayMelody,
                    });
                } else if self.phase == DriverPhase::PlayingCadence {
                    self.phase = DriverPhase::AwaitingAnswer;
                }
            }
            PlaybackKind::Melody => {
                if self.phase == DriverPhase::PlayingMelody {
                    self.phase = DriverPhase::AwaitingAnswer;
                }
            }
        }
    }

    fn play(&mut self, kind: PlaybackKind) -> Option<PlaybackTicket> {
        if self.session.status() != SessionStatus::InProgress {
            debug!(?kind, "No question to play");
            return None;
        }
        let key = self.session.key();
        let speed = self.session.config().playback_speed;

        let outcome = match kind {
            PlaybackKind::Cadence => self.engine.play_cadence(key, self.session.config().cadence_type, speed),
            PlaybackKind::Melody => match self.session.melody() {
                Some(melody) => self.engine.play_melody(melody, key, speed),
                None => return None,
            },
        };

        match outcome {
            Ok(ticket) => {
                if !self.session.melody_complete() {
                    self.phase = match kind {
                        PlaybackKind::Cadence => DriverPhase::PlayingCadence,
                        PlaybackKind::Melody => DriverPhase::PlayingMelody,
                    };
                }
                Some(ticket)
            }
            Err(e @ (DictationError::PlaybackBusy | DictationError::SounderNotReady)) => {
                debug!(?kind, error = %e, "Playback request dropped");
                None
            }
            Err(e) => {
                warn!(?kind, error = %e, "Playback failed");
                None
            }
        }
    }
}
