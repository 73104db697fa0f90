//! Exercise session: questions, answers and grading
//!
//! One mutable object owns the progress of an exercise. Every mutating call
//! returns a [`SessionSnapshot`] describing the state after the change, so
//! hosts render from snapshots instead of reaching into the session.

use std::sync::Arc;
use std::time::Instant;

use fastrand::Rng;
use serde::Serialize;
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::config::{validate_speed, ExerciseConfig, GradingMode};
use crate::error::{DictationError, Result};
use crate::key::{DisplayAccidental, Key, ScaleDegree, KEYS};
use crate::melody::{self, Melody, DEGREES};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Idle,
    InProgress,
    Complete,
}

/// One entered degree, spelled in the current key
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerSlot {
    pub degree: ScaleDegree,
    pub note_name: &'static str,
    pub accidental: Option<DisplayAccidental>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotGrade {
    pub given: ScaleDegree,
    pub expected: ScaleDegree,
    pub correct: bool,
}

/// Outcome of a batch submission, with the expected degree revealed per slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchGrade {
    pub correct: bool,
    pub slots: Vec<SlotGrade>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    /// 1-based; 0 while idle
    pub question_index: u32,
    pub total_questions: Option<u32>,
    pub key: &'static str,
    pub note_names: [&'static str; 12],
    pub answer: Vec<AnswerSlot>,
    pub melody_length: usize,
    pub completed_count: u32,
    pub correct_melodies: u32,
    pub error_count: u32,
    pub score_percent: u32,
    pub elapsed_seconds: f64,
    pub avg_melody_time_seconds: Option<f64>,
    pub last_wrong: Option<ScaleDegree>,
    pub melody_complete: bool,
    pub batch_grade: Option<BatchGrade>,
    pub grading_mode: GradingMode,
}

/// Summary shown once the last question has been answered
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResults {
    pub correct_melodies: u32,
    pub questions_asked: u32,
    pub percent: u32,
    pub score_percent: u32,
    pub error_count: u32,
    pub elapsed_seconds: f64,
    pub avg_melody_time_seconds: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    completed: u32,
    correct_melodies: u32,
    errors: u32,
    correct_presses: u32,
    wrong_presses: u32,
}

impl Counters {
    fn score_percent(&self) -> u32 {
        let total = self.correct_presses + self.wrong_presses;
        if total == 0 {
            return 0;
        }
        (self.correct_presses as f64 / total as f64 * 100.0).round() as u32
    }
}

pub struct ExerciseSession {
    status: SessionStatus,
    config: ExerciseConfig,
    key: &'static Key,
    melody: Option<Melody>,
    answer: Vec<ScaleDegree>,
    last_wrong: Option<ScaleDegree>,
    question_index: u32,
    counters: Counters,
    melody_times: Vec<f64>,
    session_started: Option<Instant>,
    melody_started: Option<Instant>,
    finished_at: Option<Instant>,
    batch_grade: Option<BatchGrade>,
    generation: u64,
    rng: Rng,
    clock: Arc<dyn Clock>,
}

impl Default for ExerciseSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ExerciseSession {
    pub fn new() -> Self {
        Self::with_parts(Rng::new(), Arc::new(SystemClock))
    }

    /// Session with a deterministic random source
    pub fn with_seed(seed: u64) -> Self {
        Self::with_parts(Rng::with_seed(seed), Arc::new(SystemClock))
    }

    pub fn with_parts(rng: Rng, clock: Arc<dyn Clock>) -> Self {
        let config = ExerciseConfig::default();
        let key = config.validate().unwrap_or(&KEYS[0]);
        Self {
            status: SessionStatus::Idle,
            config,
            key,
            melody: None,
            answer: Vec::new(),
            last_wrong: None,
            question_index: 0,
            counters: Counters::default(),
            melody_times: Vec::new(),
            session_started: None,
            melody_started: None,
            finished_at: None,
            batch_grade: None,
            generation: 0,
            rng,
            clock,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn config(&self) -> &ExerciseConfig {
        &self.config
    }

    pub fn key(&self) -> &'static Key {
        self.key
    }

    pub fn melody(&self) -> Option<&Melody> {
        self.melody.as_ref()
    }

    /// Bumped whenever pending follow-up work should be abandoned
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_last_question(&self) -> bool {
        self.config.num_questions.is_some_and(|n| self.question_index >= n)
    }

    pub fn start(&mut self, config: ExerciseConfig) -> Result<SessionSnapshot> {
        let key = config.validate()?;

        self.config = config;
        self.key = key;
        self.counters = Counters::default();
        self.melody_times.clear();
        self.question_index = 0;
        self.finished_at = None;
        self.session_started = Some(self.clock.now());
        self.status = SessionStatus::InProgress;
        self.generation += 1;

        info!(
            key = self.config.key.as_str(),
            mode = ?self.config.grading_mode,
            questions = ?self.config.num_questions,
            "Exercise started"
        );
        self.next_question()?;
        Ok(self.snapshot())
    }

    pub fn submit_degree(&mut self, degree: ScaleDegree) -> Result<SessionSnapshot> {
        if !(1..=DEGREES).contains(&degree) {
            return Err(DictationError::invalid("degree", format!("{degree} is outside 1..=12")));
        }
        let Some(expected) = self.expected_next() else {
            debug!(degree, "Ignoring degree, no answer expected");
            return Ok(self.snapshot());
        };

        match self.config.grading_mode {
            GradingMode::Incremental => {
                if degree == expected {
                    self.answer.push(degree);
                    self.last_wrong = None;
                    self.counters.correct_presses += 1;
                    if self.melody.as_ref().is_some_and(|m| self.answer.len() == m.len()) {
                        self.counters.completed += 1;
                        self.counters.correct_melodies += 1;
                        self.record_melody_time();
                    }
                } else {
                    self.last_wrong = Some(degree);
                    self.counters.errors += 1;
                    self.counters.wrong_presses += 1;
                }
            }
            GradingMode::Batch => self.answer.push(degree),
        }
        Ok(self.snapshot())
    }

    /// Grade a fully entered batch answer
    pub fn submit_answer(&mut self) -> SessionSnapshot {
        if self.config.grading_mode != GradingMode::Batch || self.status != SessionStatus::InProgress {
            debug!("Ignoring submit outside batch grading");
            return self.snapshot();
        }
        let Some(melody) = &self.melody else {
            return self.snapshot();
        };
        if self.batch_grade.is_some() || self.answer.len() < melody.len() {
            debug!(filled = self.answer.len(), needed = melody.len(), "Batch answer not ready to grade");
            return self.snapshot();
        }

        let slots: Vec<SlotGrade> = self
            .answer
            .iter()
            .zip(melody.degrees())
            .map(|(&given, &expected)| SlotGrade { given, expected, correct: given == expected })
            .collect();

        for slot in &slots {
            if slot.correct {
                self.counters.correct_presses += 1;
            } else {
                self.counters.errors += 1;
                self.counters.wrong_presses += 1;
            }
        }

        let correct = slots.iter().all(|s| s.correct);
        if correct {
            self.counters.completed += 1;
            self.counters.correct_melodies += 1;
            self.record_melody_time();
        }
        debug!(correct, question = self.question_index, "Batch answer graded");
        self.batch_grade = Some(BatchGrade { correct, slots });
        self.snapshot()
    }

    /// Drop the entered answer. Graded answers stay on screen.
    pub fn clear_answer(&mut self) -> SessionSnapshot {
        if self.melody_complete() {
            debug!("Answer already graded, nothing to clear");
            return self.snapshot();
        }
        self.answer.clear();
        self.last_wrong = None;
        self.snapshot()
    }

    pub fn advance(&mut self) -> Result<SessionSnapshot> {
        if self.status != SessionStatus::InProgress {
            debug!(status = ?self.status, "Ignoring advance");
            return Ok(self.snapshot());
        }
        self.generation += 1;

        if self.is_last_question() {
            self.status = SessionStatus::Complete;
            self.finished_at = Some(self.clock.now());
            info!(
                correct = self.counters.correct_melodies,
                asked = self.question_index,
                "Exercise complete"
            );
            return Ok(self.snapshot());
        }
        self.next_question()?;
        Ok(self.snapshot())
    }

    pub fn stop(&mut self) -> SessionSnapshot {
        if self.status != SessionStatus::Idle {
            info!(question = self.question_index, "Exercise stopped");
        }
        self.status = SessionStatus::Idle;
        self.generation += 1;
        self.counters = Counters::default();
        self.melody_times.clear();
        self.melody = None;
        self.answer.clear();
        self.last_wrong = None;
        self.batch_grade = None;
        self.question_index = 0;
        self.session_started = None;
        self.melody_started = None;
        self.finished_at = None;
        self.snapshot()
    }

    /// Takes effect from the next question
    pub fn set_random_keys(&mut self, enabled: bool) -> SessionSnapshot {
        self.config.random_keys = enabled;
        self.snapshot()
    }

    /// Respell the current question in another key
    pub fn set_key(&mut self, name: &str) -> Result<SessionSnapshot> {
        self.key = Key::from_name(name)?;
        self.config.key = self.key.name().to_string();
        Ok(self.snapshot())
    }

    pub fn set_playback_speed(&mut self, speed: f64) -> Result<SessionSnapshot> {
        validate_speed(speed)?;
        self.config.playback_speed = speed;
        Ok(self.snapshot())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let answer = self
            .answer
            .iter()
            .map(|&degree| AnswerSlot {
                degree,
                note_name: self.key.note_name(degree).unwrap_or_default(),
                accidental: self.key.display_accidental(degree).ok().flatten(),
            })
            .collect();

        SessionSnapshot {
            status: self.status,
            question_index: self.question_index,
            total_questions: self.config.num_questions,
            key: self.key.name(),
            note_names: *self.key.note_names(),
            answer,
            melody_length: self.melody.as_ref().map_or(self.config.melody_length, Melody::len),
            completed_count: self.counters.completed,
            correct_melodies: self.counters.correct_melodies,
            error_count: self.counters.errors,
            score_percent: self.counters.score_percent(),
            elapsed_seconds: self.elapsed_seconds(),
            avg_melody_time_seconds: self.avg_melody_time(),
            last_wrong: self.last_wrong,
            melody_complete: self.melody_complete(),
            batch_grade: self.batch_grade.clone(),
            grading_mode: self.config.grading_mode,
        }
    }

    /// Final figures; only available once the exercise is complete
    pub fn results(&self) -> Option<SessionResults> {
        if self.status != SessionStatus::Complete {
            return None;
        }
        let asked = self.question_index;
        let percent = match asked {
            0 => 0,
            n => (self.counters.correct_melodies as f64 / n as f64 * 100.0).round() as u32,
        };
        Some(SessionResults {
            correct_melodies: self.counters.correct_melodies,
            questions_asked: asked,
            percent,
            score_percent: self.counters.score_percent(),
            error_count: self.counters.errors,
            elapsed_seconds: self.elapsed_seconds(),
            avg_melody_time_seconds: self.avg_melody_time(),
        })
    }

    /// Whether the current melody needs no further input
    pub fn melody_complete(&self) -> bool {
        match (&self.melody, self.config.grading_mode) {
            (Some(m), GradingMode::Incremental) => self.answer.len() == m.len(),
            (Some(_), GradingMode::Batch) => self.batch_grade.is_some(),
            (None, _) => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn replace_melody(&mut self, degrees: Vec<ScaleDegree>) {
        self.melody = Some(Melody::from(degrees));
        self.answer.clear();
    }

    fn expected_next(&self) -> Option<ScaleDegree> {
        if self.status != SessionStatus::InProgress || self.melody_complete() {
            return None;
        }
        self.melody.as_ref()?.get(self.answer.len())
    }

    fn next_question(&mut self) -> Result<()> {
        if self.config.random_keys {
            self.key = &KEYS[self.rng.usize(..KEYS.len())];
        }
        let melody = melody::generate(self.config.melody_length, self.config.max_interval, &mut self.rng)?;

        self.question_index += 1;
        self.melody = Some(melody);
        self.answer.clear();
        self.last_wrong = None;
        self.batch_grade = None;
        self.melody_started = Some(self.clock.now());
        debug!(question = self.question_index, key = self.key.name(), "New question");
        Ok(())
    }

    fn record_melody_time(&mut self) {
        if let Some(started) = self.melody_started {
            let secs = self.clock.now().saturating_duration_since(started).as_secs_f64();
            self.melody_times.push(secs);
        }
    }

    fn elapsed_seconds(&self) -> f64 {
        let Some(started) = self.session_started else {
            return 0.0;
        };
        let end = self.finished_at.unwrap_or_else(|| self.clock.now());
        end.saturating_duration_since(started).as_secs_f64()
    }

    fn avg_melody_time(&self) -> Option<f64> {
        if self.melody_times.is_empty() {
            return None;
        }
        Some(self.melody_times.iter().sum::<f64>() / self.melody_times.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::melody::circular_interval;

    fn session() -> (ExerciseSession, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (ExerciseSession::with_parts(Rng::with_seed(7), clock.clone()), clock)
    }

    fn c_major(length: usize) -> ExerciseConfig {
        ExerciseConfig {
            key: "C".into(),
            melody_length: length,
            max_interval: Some(2),
            num_questions: Some(3),
            ..Default::default()
        }
    }

    #[test]
    fn test_start_validates_config() {
        let (mut session, _) = session();
        let bad = ExerciseConfig { key: "H".into(), ..Default::default() };
        assert_eq!(session.start(bad).unwrap_err(), DictationError::UnknownKey("H".into()));
        assert_eq!(session.status(), SessionStatus::Idle);

        let snap = session.start(c_major(3)).unwrap();
        assert_eq!(snap.status, SessionStatus::InProgress);
        assert_eq!(snap.question_index, 1);
        assert_eq!(snap.key, "C");
        assert_eq!(snap.melody_length, 3);
        assert_eq!(snap.score_percent, 0);
    }

    #[test]
    fn test_seeded_melody_respects_interval_and_grades() {
        let (mut session, _) = session();
        session.start(c_major(3)).unwrap();

        let degrees = session.melody().unwrap().degrees().to_vec();
        assert_eq!(degrees.len(), 3);
        assert!(degrees.windows(2).all(|w| circular_interval(w[0], w[1]) <= 2));

        let mut snap = session.snapshot();
        for d in degrees {
            snap = session.submit_degree(d).unwrap();
        }
        assert!(snap.melody_complete);
        assert_eq!(snap.completed_count, 1);
        assert_eq!(snap.error_count, 0);
        assert_eq!(snap.score_percent, 100);
    }

    #[test]
    fn test_wrong_pick_holds_position() {
        let (mut session, clock) = session();
        session.start(c_major(3)).unwrap();
        session.replace_melody(vec![5, 4, 6]);

        session.submit_degree(5).unwrap();
        let snap = session.submit_degree(3).unwrap();
        assert_eq!(snap.last_wrong, Some(3));
        assert_eq!(snap.error_count, 1);
        assert_eq!(snap.answer.len(), 1);

        let snap = session.submit_degree(4).unwrap();
        assert_eq!(snap.last_wrong, None);
        assert_eq!(snap.answer.len(), 2);
        assert_eq!(snap.answer[1].note_name, "D#");
        assert_eq!(snap.answer[1].accidental, Some(DisplayAccidental::Sharp));

        clock.advance_secs(4.0);
        let snap = session.submit_degree(6).unwrap();
        assert!(snap.melody_complete);
        assert_eq!(snap.completed_count, 1);
        assert_eq!(snap.correct_melodies, 1);
        assert_eq!(snap.error_count, 1);
        assert_eq!(snap.score_percent, 75);
        assert_eq!(snap.avg_melody_time_seconds, Some(4.0));

        // further presses are ignored once the melody is done
        let snap = session.submit_degree(1).unwrap();
        assert_eq!(snap.error_count, 1);
        assert_eq!(snap.completed_count, 1);

        let snap = session.advance().unwrap();
        assert_eq!(snap.question_index, 2);
        assert_eq!(snap.completed_count, 1);
        assert_eq!(snap.error_count, 1);
        assert!(snap.answer.is_empty());
    }

    #[test]
    fn test_rejects_out_of_range_degree() {
        let (mut session, _) = session();
        session.start(c_major(3)).unwrap();
        assert!(session.submit_degree(0).is_err());
        assert!(session.submit_degree(13).is_err());
        assert_eq!(session.snapshot().error_count, 0);
    }

    #[test]
    fn test_clear_keeps_counters() {
        let (mut session, _) = session();
        session.start(c_major(3)).unwrap();
        session.replace_melody(vec![5, 4, 6]);
        session.submit_degree(5).unwrap();
        session.submit_degree(9).unwrap();

        let snap = session.clear_answer();
        assert!(snap.answer.is_empty());
        assert_eq!(snap.last_wrong, None);
        assert_eq!(snap.error_count, 1);
        assert_eq!(snap.score_percent, 50);
    }

    #[test]
    fn test_advance_to_complete_and_results() {
        let (mut session, clock) = session();
        session.start(c_major(2)).unwrap();

        for question in 1..=3 {
            assert_eq!(session.snapshot().question_index, question);
            if question != 2 {
                let degrees = session.melody().unwrap().degrees().to_vec();
                for d in degrees {
                    session.submit_degree(d).unwrap();
                }
            }
            clock.advance_secs(10.0);
            session.advance().unwrap();
        }

        assert_eq!(session.status(), SessionStatus::Complete);
        let results = session.results().unwrap();
        assert_eq!(results.correct_melodies, 2);
        assert_eq!(results.questions_asked, 3);
        assert_eq!(results.percent, 67);
        assert_eq!(results.elapsed_seconds, 30.0);

        // elapsed time is frozen after completion
        clock.advance_secs(100.0);
        assert_eq!(session.snapshot().elapsed_seconds, 30.0);
        assert_eq!(session.advance().unwrap().status, SessionStatus::Complete);
    }

    #[test]
    fn test_stop_resets() {
        let (mut session, _) = session();
        session.start(c_major(3)).unwrap();
        session.submit_degree(12).unwrap();
        let generation = session.generation();

        let snap = session.stop();
        assert_eq!(snap.status, SessionStatus::Idle);
        assert_eq!(snap.error_count, 0);
        assert_eq!(snap.question_index, 0);
        assert!(session.melody().is_none());
        assert!(session.generation() > generation);
        assert!(session.results().is_none());
    }

    #[test]
    fn test_batch_grades_all_slots() {
        let (mut session, clock) = session();
        let config = ExerciseConfig { grading_mode: GradingMode::Batch, ..c_major(3) };
        session.start(config).unwrap();
        session.replace_melody(vec![5, 4, 6]);

        session.submit_degree(5).unwrap();
        session.submit_degree(3).unwrap();
        let early = session.submit_answer();
        assert!(early.batch_grade.is_none());
        assert_eq!(early.error_count, 0);

        let snap = session.submit_degree(6).unwrap();
        assert_eq!(snap.last_wrong, None);
        assert!(!snap.melody_complete);

        clock.advance_secs(2.0);
        let snap = session.submit_answer();
        let grade = snap.batch_grade.unwrap();
        assert!(!grade.correct);
        assert_eq!(grade.slots[1], SlotGrade { given: 3, expected: 4, correct: false });
        assert_eq!(snap.error_count, 1);
        assert_eq!(snap.completed_count, 0);
        assert_eq!(snap.score_percent, 67);
        assert!(snap.melody_complete);

        // a second submit does not count twice
        assert_eq!(session.submit_answer().error_count, 1);
        assert_eq!(session.submit_degree(1).unwrap().answer.len(), 3);
    }

    #[test]
    fn test_batch_correct_answer_counts_melody() {
        let (mut session, _) = session();
        let config = ExerciseConfig { grading_mode: GradingMode::Batch, ..c_major(3) };
        session.start(config).unwrap();
        session.replace_melody(vec![1, 2, 1]);
        for d in [1, 2, 1] {
            session.submit_degree(d).unwrap();
        }
        let snap = session.submit_answer();
        assert!(snap.batch_grade.unwrap().correct);
        assert_eq!(snap.correct_melodies, 1);
        assert_eq!(snap.score_percent, 100);
    }

    #[test]
    fn test_submit_ignored_in_incremental_mode() {
        let (mut session, _) = session();
        session.start(c_major(3)).unwrap();
        let snap = session.submit_answer();
        assert!(snap.batch_grade.is_none());
    }

    #[test]
    fn test_random_keys_redraws() {
        let (mut session, _) = session();
        let config = ExerciseConfig { random_keys: true, num_questions: None, ..c_major(2) };
        session.start(config).unwrap();

        let mut seen = std::collections::HashSet::new();
        for _ in 0..40 {
            seen.insert(session.key().name());
            session.advance().unwrap();
        }
        assert!(seen.len() > 1);
        assert_eq!(session.status(), SessionStatus::InProgress);
    }

    #[test]
    fn test_set_key_respells_current_answer() {
        let (mut session, _) = session();
        session.start(c_major(3)).unwrap();
        session.replace_melody(vec![2, 2, 2]);
        session.submit_degree(2).unwrap();

        let snap = session.set_key("Bb").unwrap();
        assert_eq!(snap.key, "Bb");
        assert_eq!(snap.answer[0].note_name, "B");
        assert_eq!(snap.answer[0].accidental, Some(DisplayAccidental::Natural));
        assert!(session.set_key("Q").is_err());

        assert!(session.set_playback_speed(0.0).is_err());
        assert_eq!(session.set_playback_speed(1.5).unwrap().status, SessionStatus::InProgress);
        assert_eq!(session.config().playback_speed, 1.5);
    }
}
