//! dictation-core: Music theory, scheduling and grading for melodic dictation

pub mod cadence;
pub mod clock;
pub mod config;
pub mod driver;
mod error;
pub mod key;
pub mod melody;
pub mod playback;
pub mod scheduler;
pub mod session;
pub mod sounder;

pub use cadence::CadenceType;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ExerciseConfig, GradingMode, MemorySettings, SettingsStore};
pub use driver::{DriverPhase, ExerciseDriver};
pub use error::{DictationError, Result};
pub use key::{
    accidentals_for, is_minor, note_names_for, root_pitch_class,
    DisplayAccidental, Key, KeySignature, Mode, ScaleDegree, SignatureKind,
};
pub use melody::{circular_interval, Melody};
pub use playback::{PlaybackEngine, PlaybackKind, PlaybackTicket};
pub use scheduler::{Chord, Schedule, ScheduledEvent, Scheduler};
pub use session::{
    AnswerSlot, BatchGrade, ExerciseSession, SessionResults, SessionSnapshot, SessionStatus, SlotGrade,
};
pub use sounder::{LoadHandle, NoteSounder, PlayedNote, RecordingSounder};
