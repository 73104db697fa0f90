//! Key tables: enharmonic spellings, key signatures and pitch resolution
//!
//! Spellings are fixed per key by convention rather than derived, so every
//! supported key carries its own 12-entry table. Degree 1 is always the tonic.

use serde::Serialize;

use crate::error::{DictationError, Result};

/// 1-based chromatic step from the tonic. Values above 12 denote the same
/// step in a higher octave (13 = tonic one octave up).
pub type ScaleDegree = u8;

/// MIDI number of C4; roots of every key sit in the octave starting here.
pub const MIDDLE_C: u8 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Major,
    Minor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureKind {
    None,
    Sharp,
    Flat,
}

/// Key signature: which letters are altered, in staff order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KeySignature {
    pub kind: SignatureKind,
    pub letters: &'static [char],
}

impl KeySignature {
    /// Accidental the signature applies to `letter`, if any
    pub fn accidental_for(&self, letter: char) -> Option<DisplayAccidental> {
        if !self.letters.contains(&letter) {
            return None;
        }
        match self.kind {
            SignatureKind::None => None,
            SignatureKind::Sharp => Some(DisplayAccidental::Sharp),
            SignatureKind::Flat => Some(DisplayAccidental::Flat),
        }
    }
}

/// Accidental a staff needs in front of a note, given the key signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayAccidental {
    Sharp,
    Flat,
    Natural,
}

impl DisplayAccidental {
    pub fn symbol(&self) -> char {
        match self {
            Self::Sharp => '♯',
            Self::Flat => '♭',
            Self::Natural => '♮',
        }
    }
}

/// One of the 24 supported keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Key {
    name: &'static str,
    root_pitch_class: u8,
    mode: Mode,
    note_names: [&'static str; 12],
    signature: KeySignature,
}

const fn key(
    name: &'static str,
    root_pitch_class: u8,
    mode: Mode,
    note_names: [&'static str; 12],
    kind: SignatureKind,
    letters: &'static [char],
) -> Key {
    Key {
        name,
        root_pitch_class,
        mode,
        note_names,
        signature: KeySignature { kind, letters },
    }
}

use Mode::{Major, Minor};
use SignatureKind::{Flat, None as Plain, Sharp};

/// All supported keys, majors first. Random key draws index into this table.
pub static KEYS: [Key; 24] = [
    key("C", 0, Major, ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"], Plain, &[]),
    key("Db", 1, Major, ["Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B", "C"], Flat, &['B', 'E', 'A', 'D', 'G']),
    key("D", 2, Major, ["D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B", "C", "C#"], Sharp, &['F', 'C']),
    key("Eb", 3, Major, ["Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B", "C", "Db", "D"], Flat, &['B', 'E', 'A']),
    key("E", 4, Major, ["E", "F", "F#", "G", "G#", "A", "A#", "B", "C", "C#", "D", "D#"], Sharp, &['F', 'C', 'G', 'D']),
    key("F", 5, Major, ["F", "Gb", "G", "Ab", "A", "Bb", "B", "C", "Db", "D", "Eb", "E"], Flat, &['B']),
    key("Gb", 6, Major, ["Gb", "G", "Ab", "A", "Bb", "Cb", "C", "Db", "D", "Eb", "E", "F"], Flat, &['B', 'E', 'A', 'D', 'G', 'C']),
    key("G", 7, Major, ["G", "G#", "A", "A#", "B", "C", "C#", "D", "D#", "E", "F", "F#"], Sharp, &['F']),
    key("Ab", 8, Major, ["Ab", "A", "Bb", "B", "C", "Db", "D", "Eb", "E", "F", "Gb", "G"], Flat, &['B', 'E', 'A', 'D']),
    key("A", 9, Major, ["A", "A#", "B", "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#"], Sharp, &['F', 'C', 'G']),
    key("Bb", 10, Major, ["Bb", "B", "C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A"], Flat, &['B', 'E']),
    key("B", 11, Major, ["B", "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#"], Sharp, &['F', 'C', 'G', 'D', 'A']),
    key("Cm", 0, Minor, ["C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B"], Flat, &['B', 'E', 'A']),
    key("Dbm", 1, Minor, ["Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "Cb", "C"], Sharp, &['F', 'C', 'G', 'D', 'A']),
    key("Dm", 2, Minor, ["D", "Eb", "E", "F", "F#", "G", "Ab", "A", "Bb", "B", "C", "C#"], Flat, &['B']),
    key("Ebm", 3, Minor, ["Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "Cb", "C", "Db", "D"], Flat, &['B', 'E', 'A', 'D', 'G', 'C']),
    key("Em", 4, Minor, ["E", "F", "F#", "G", "G#", "A", "Bb", "B", "C", "C#", "D", "D#"], Sharp, &['F']),
    key("Fm", 5, Minor, ["F", "Gb", "G", "Ab", "A", "Bb", "Cb", "C", "Db", "D", "Eb", "E"], Flat, &['B', 'E', 'A', 'D']),
    key("Gbm", 6, Minor, ["Gb", "G", "Ab", "A", "Bb", "Cb", "C", "Db", "D", "Eb", "Fb", "F"], Sharp, &['F', 'C', 'G']),
    key("Gm", 7, Minor, ["G", "Ab", "A", "Bb", "B", "C", "Db", "D", "Eb", "E", "F", "F#"], Flat, &['B', 'E']),
    key("Abm", 8, Minor, ["Ab", "A", "Bb", "Cb", "C", "Db", "D", "Eb", "Fb", "F", "Gb", "G"], Flat, &['B', 'E', 'A', 'D', 'G', 'C', 'F']),
    key("Am", 9, Minor, ["A", "Bb", "B", "C", "C#", "D", "Eb", "E", "F", "F#", "G", "G#"], Plain, &[]),
    key("Bbm", 10, Minor, ["Bb", "Cb", "C", "Db", "D", "Eb", "Fb", "F", "Gb", "G", "Ab", "A"], Flat, &['B', 'E', 'A', 'D', 'G']),
    key("Bm", 11, Minor, ["B", "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#"], Sharp, &['F', 'C']),
];

impl Key {
    /// Look up a key by name ("Bb", "F", "Gbm", ...)
    pub fn from_name(name: &str) -> Result<&'static Key> {
        let name = name.trim();
        KEYS.iter()
            .find(|k| k.name == name)
            .ok_or_else(|| DictationError::UnknownKey(name.to_string()))
    }

    pub fn all() -> &'static [Key] {
        &KEYS
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_minor(&self) -> bool {
        self.mode == Mode::Minor
    }

    pub fn root_pitch_class(&self) -> u8 {
        self.root_pitch_class
    }

    /// MIDI number of the tonic in the reference octave
    pub fn root_midi(&self) -> u8 {
        MIDDLE_C + self.root_pitch_class
    }

    pub fn note_names(&self) -> &[&'static str; 12] {
        &self.note_names
    }

    pub fn signature(&self) -> &KeySignature {
        &self.signature
    }

    /// Spelled name of a degree, octave shifts ignored
    pub fn note_name(&self, degree: ScaleDegree) -> Result<&'static str> {
        let (step, _) = resolve_degree(degree)?;
        Ok(self.note_names[(step - 1) as usize])
    }

    /// Pitch identity handed to sounders: root + semitone offset + octave * 12
    pub fn midi_note(&self, degree: ScaleDegree) -> Result<u8> {
        let (step, octave) = resolve_degree(degree)?;
        let midi = self.root_midi() as u16 + (step - 1) as u16 + octave as u16 * 12;
        u8::try_from(midi)
            .ok()
            .filter(|m| *m <= 127)
            .ok_or_else(|| DictationError::invalid("degree", format!("{degree} is beyond the MIDI range")))
    }

    /// Accidental to print before `degree` on a staff in this key
    pub fn display_accidental(&self, degree: ScaleDegree) -> Result<Option<DisplayAccidental>> {
        let (letter, written) = split_note_name(self.note_name(degree)?);
        let in_signature = self.signature.accidental_for(letter);

        Ok(match (written, in_signature) {
            (w, s) if w == s => None,
            (Some(w), _) => Some(w),
            (None, Some(_)) => Some(DisplayAccidental::Natural),
            (None, None) => None,
        })
    }
}

/// Fold a degree into 1..=12, counting how many octaves were removed
pub fn resolve_degree(degree: ScaleDegree) -> Result<(u8, u8)> {
    if degree == 0 {
        return Err(DictationError::invalid("degree", "scale degrees start at 1"));
    }
    let mut step = degree;
    let mut octave = 0;
    while step > 12 {
        step -= 12;
        octave += 1;
    }
    Ok((step, octave))
}

fn split_note_name(name: &str) -> (char, Option<DisplayAccidental>) {
    let mut chars = name.chars();
    let letter = chars.next().unwrap_or('C');
    let accidental = match chars.next() {
        Some('#') => Some(DisplayAccidental::Sharp),
        Some('b') => Some(DisplayAccidental::Flat),
        _ => None,
    };
    (letter, accidental)
}

pub fn note_names_for(key: &str) -> Result<[&'static str; 12]> {
    Ok(*Key::from_name(key)?.note_names())
}

pub fn accidentals_for(key: &str) -> Result<KeySignature> {
    Ok(*Key::from_name(key)?.signature())
}

pub fn is_minor(key: &str) -> Result<bool> {
    Ok(Key::from_name(key)?.is_minor())
}

pub fn root_pitch_class(key: &str) -> Result<u8> {
    Ok(Key::from_name(key)?.root_pitch_class())
}
