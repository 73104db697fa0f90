//! Playback engine: turns cadences and melodies into sounder calls
//!
//! At most one cadence or melody is in flight. A request made while one is
//! playing is rejected with `PlaybackBusy` and nothing is scheduled; requests
//! made before the sounder has an instrument get `SounderNotReady`. Neither is
//! queued or retried.

use serde::Serialize;
use tracing::{debug, info};

use crate::cadence::CadenceType;
use crate::error::{DictationError, Result};
use crate::key::{Key, ScaleDegree};
use crate::melody::Melody;
use crate::scheduler::{Chord, Schedule, Scheduler};
use crate::sounder::{LoadHandle, NoteSounder};

/// Offset between a request and its first onset
pub const LEAD_IN_SECS: f64 = 0.05;
/// Nominal cadence chord length
pub const CHORD_SECS: f64 = 0.8;
/// Nominal melody note length
pub const MELODY_NOTE_SECS: f64 = 0.5;
/// Nominal silence between consecutive chords or notes
pub const NOTE_GAP_SECS: f64 = 0.1;
/// Nominal length of the note sounded when a degree is pressed
pub const FEEDBACK_NOTE_SECS: f64 = 0.3;
/// Per-note gain; the voice bank's envelope already sets the level
pub const NOTE_GAIN: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackKind {
    Cadence,
    Melody,
}

/// Receipt for a submitted playback; it completes at `finishes_at`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackTicket {
    pub kind: PlaybackKind,
    pub start_time: f64,
    pub finishes_at: f64,
}

pub struct PlaybackEngine<S: NoteSounder> {
    sounder: S,
    active: Option<PlaybackTicket>,
}

impl<S: NoteSounder> PlaybackEngine<S> {
    pub fn new(sounder: S) -> Self {
        Self { sounder, active: None }
    }

    pub fn sounder(&self) -> &S {
        &self.sounder
    }

    pub fn sounder_mut(&mut self) -> &mut S {
        &mut self.sounder
    }

    /// Transport time of the underlying sounder
    pub fn now(&self) -> f64 {
        self.sounder.current_time()
    }

    pub fn is_playing(&self) -> bool {
        self.active.is_some_and(|t| self.now() < t.finishes_at)
    }

    /// Ticket of the playback still sounding, if any
    pub fn in_flight(&self) -> Option<PlaybackTicket> {
        self.active.filter(|t| self.now() < t.finishes_at)
    }

    pub fn is_ready(&self) -> bool {
        self.sounder.is_ready()
    }

    /// Take the in-flight ticket once its span has elapsed
    pub fn poll(&mut self) -> Option<PlaybackTicket> {
        match self.active {
            Some(ticket) if self.now() >= ticket.finishes_at => self.active.take(),
            _ => None,
        }
    }

    pub fn switch_instrument(&mut self, name: &str) -> LoadHandle {
        info!(instrument = name, "Switching instrument");
        self.sounder.load_instrument(name)
    }

    pub fn play_cadence(&mut self, key: &Key, cadence: CadenceType, speed: f64) -> Result<PlaybackTicket> {
        let scheduler = Scheduler::new(speed)?;
        self.ensure_idle()?;

        if cadence == CadenceType::None {
            let now = self.now();
            return Ok(PlaybackTicket {
                kind: PlaybackKind::Cadence,
                start_time: now,
                finishes_at: now,
            });
        }
        self.ensure_ready()?;

        let plan = scheduler.schedule_cadence(
            &cadence.chords(key.mode()),
            self.now() + LEAD_IN_SECS,
            CHORD_SECS * cadence.length_factor(),
            NOTE_GAP_SECS,
        );
        self.perform(PlaybackKind::Cadence, key, plan)
    }

    pub fn play_melody(&mut self, melody: &Melody, key: &Key, speed: f64) -> Result<PlaybackTicket> {
        let scheduler = Scheduler::new(speed)?;
        self.ensure_idle()?;
        self.ensure_ready()?;

        let plan = scheduler.schedule_sequence(
            melody.degrees().iter().map(|&d| vec![d]),
            self.now() + LEAD_IN_SECS,
            MELODY_NOTE_SECS,
            NOTE_GAP_SECS,
        );
        self.perform(PlaybackKind::Melody, key, plan)
    }

    /// Sound one degree right away. Bypasses the in-flight guard.
    pub fn play_single_note(&mut self, degree: ScaleDegree, key: &Key, duration: f64, speed: f64) -> Result<()> {
        let scheduler = Scheduler::new(speed)?;
        self.ensure_ready()?;

        let pitch = key.midi_note(degree)?;
        let plan = scheduler.schedule_sequence([pitch], self.now(), duration, 0.0);
        for event in &plan.events {
            self.sounder.play(event.payload, event.start_time, event.duration, NOTE_GAIN);
        }
        Ok(())
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.is_playing() {
            return Err(DictationError::PlaybackBusy);
        }
        Ok(())
    }

    fn ensure_ready(&self) -> Result<()> {
        if !self.sounder.is_ready() {
            return Err(DictationError::SounderNotReady);
        }
        Ok(())
    }

    fn perform(&mut self, kind: PlaybackKind, key: &Key, plan: Schedule<Chord>) -> Result<PlaybackTicket> {
        // Resolve every pitch before sounding anything
        let mut notes = Vec::new();
        for event in &plan.events {
            for &degree in &event.payload {
                notes.push((key.midi_note(degree)?, event.start_time, event.duration));
            }
        }

        for &(pitch, start, duration) in &notes {
            self.sounder.play(pitch, start, duration, NOTE_GAIN);
        }

        let ticket = PlaybackTicket {
            kind,
            start_time: plan.start_time,
            finishes_at: plan.completion_time(),
        };
        debug!(?kind, key = key.name(), notes = notes.len(), finishes_at = ticket.finishes_at, "Playback scheduled");
        self.active = Some(ticket);
        Ok(ticket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sounder::RecordingSounder;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn engine() -> PlaybackEngine<RecordingSounder> {
        PlaybackEngine::new(RecordingSounder::new())
    }

    #[test]
    fn test_minor_cadence_chords_and_timing() {
        let mut engine = engine();
        let am = Key::from_name("Am").unwrap();
        let ticket = engine.play_cadence(am, CadenceType::OneFourFive, 1.0).unwrap();

        let played = engine.sounder().played();
        assert_eq!(played.len(), 12);

        let t0 = LEAD_IN_SECS;
        let first: Vec<u8> = played[..3].iter().map(|n| n.pitch).collect();
        assert_eq!(first, vec![69, 72, 76]); // A C E
        assert!(played[..3].iter().all(|n| close(n.start_time, t0)));

        let last: Vec<u8> = played[9..].iter().map(|n| n.pitch).collect();
        assert_eq!(last, first);
        let step = CHORD_SECS + NOTE_GAP_SECS;
        assert!(played[9..].iter().all(|n| close(n.start_time, t0 + 3.0 * step)));

        // iv chord reaches above the octave: D F A(+12)
        let iv: Vec<u8> = played[3..6].iter().map(|n| n.pitch).collect();
        assert_eq!(iv, vec![74, 77, 81]);

        assert!(close(ticket.finishes_at, t0 + 3.0 * step + CHORD_SECS + 0.05));
    }

    #[test]
    fn test_melody_rejected_while_cadence_in_flight() {
        let mut engine = engine();
        let c = Key::from_name("C").unwrap();
        let melody = Melody::from(vec![5, 4, 6]);

        let cadence = engine.play_cadence(c, CadenceType::OneFourFive, 1.0).unwrap();
        assert!(engine.is_playing());
        assert_eq!(engine.in_flight(), Some(cadence));
        assert_eq!(engine.play_melody(&melody, c, 1.0), Err(DictationError::PlaybackBusy));
        assert_eq!(engine.sounder().played().len(), 12);
        assert_eq!(engine.poll(), None);

        engine.sounder_mut().set_time(cadence.finishes_at);
        assert!(!engine.is_playing());
        assert_eq!(engine.in_flight(), None);
        assert_eq!(engine.poll(), Some(cadence));
        assert_eq!(engine.poll(), None);

        let ticket = engine.play_melody(&melody, c, 1.0).unwrap();
        assert_eq!(ticket.kind, PlaybackKind::Melody);
        let pitches: Vec<u8> = engine.sounder().played()[12..].iter().map(|n| n.pitch).collect();
        assert_eq!(pitches, vec![64, 63, 65]);
    }

    #[test]
    fn test_not_ready_is_a_no_op() {
        let mut engine = PlaybackEngine::new(RecordingSounder::unloaded());
        let c = Key::from_name("C").unwrap();

        assert_eq!(
            engine.play_cadence(c, CadenceType::Root, 1.0),
            Err(DictationError::SounderNotReady)
        );
        assert_eq!(
            engine.play_single_note(1, c, FEEDBACK_NOTE_SECS, 1.0),
            Err(DictationError::SounderNotReady)
        );
        assert!(engine.sounder().played().is_empty());
        assert!(!engine.is_playing());

        assert!(engine.switch_instrument("piano").wait().is_ok());
        assert!(engine.play_cadence(c, CadenceType::Root, 1.0).is_ok());
    }

    #[test]
    fn test_none_cadence_completes_immediately() {
        let mut engine = engine();
        engine.sounder_mut().set_time(4.0);
        let c = Key::from_name("C").unwrap();
        let ticket = engine.play_cadence(c, CadenceType::None, 1.0).unwrap();

        assert_eq!(ticket.finishes_at, 4.0);
        assert!(!engine.is_playing());
        assert!(engine.sounder().played().is_empty());
    }

    #[test]
    fn test_root_cadence_doubles_chord_length() {
        let mut engine = engine();
        let g = Key::from_name("G").unwrap();
        engine.play_cadence(g, CadenceType::Root, 2.0).unwrap();

        let played = engine.sounder().played();
        assert_eq!(played.len(), 1);
        assert_eq!(played[0].pitch, 67);
        assert!(close(played[0].duration, CHORD_SECS * 2.0 / 2.0));
    }

    #[test]
    fn test_speed_scales_melody() {
        let mut engine = engine();
        let c = Key::from_name("C").unwrap();
        let melody = Melody::from(vec![1, 13]);
        let ticket = engine.play_melody(&melody, c, 2.0).unwrap();

        let played = engine.sounder().played();
        assert_eq!(played[1].pitch, 72);
        assert!(close(played[0].duration, 0.25));
        assert!(close(played[1].start_time, LEAD_IN_SECS + 0.3));
        assert!(close(ticket.finishes_at, LEAD_IN_SECS + 0.3 + 0.25 + 0.05));
    }

    #[test]
    fn test_feedback_note_ignores_busy_guard() {
        let mut engine = engine();
        let c = Key::from_name("C").unwrap();
        engine.play_melody(&Melody::from(vec![1, 2, 3]), c, 1.0).unwrap();
        engine.play_single_note(3, c, FEEDBACK_NOTE_SECS, 1.5).unwrap();

        let note = engine.sounder().played().last().unwrap().clone();
        assert_eq!(note.pitch, 62);
        assert!(close(note.start_time, 0.0));
        assert!(close(note.duration, 0.2));
    }

    #[test]
    fn test_invalid_degree_sounds_nothing() {
        let mut engine = engine();
        let c = Key::from_name("C").unwrap();
        let err = engine.play_melody(&Melody::from(vec![1, 0]), c, 1.0).unwrap_err();
        assert!(matches!(err, DictationError::InvalidConfig { field: "degree", .. }));
        assert!(engine.sounder().played().is_empty());
        assert!(!engine.is_playing());
    }
}
