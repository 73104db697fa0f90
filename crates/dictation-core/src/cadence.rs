//! Cadences played before a melody to establish the key

use serde::{Deserialize, Serialize};

use crate::key::Mode;
use crate::scheduler::Chord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CadenceType {
    #[serde(rename = "none")]
    None,
    /// Tonic alone, held for two chord lengths
    #[serde(rename = "root")]
    Root,
    /// I-IV-V-I, or i-iv-v-i in minor keys
    #[default]
    #[serde(rename = "i-iv-v")]
    OneFourFive,
}

impl CadenceType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Root => "root",
            Self::OneFourFive => "i-iv-v",
        }
    }

    /// Chord definitions as degrees; voices above 12 sit an octave up
    pub fn chords(&self, mode: Mode) -> Vec<Chord> {
        match (self, mode) {
            (Self::None, _) => Vec::new(),
            (Self::Root, _) => vec![vec![1]],
            (Self::OneFourFive, Mode::Major) => vec![
                vec![1, 5, 8],
                vec![6, 10, 13],
                vec![8, 12, 15],
                vec![1, 5, 8],
            ],
            (Self::OneFourFive, Mode::Minor) => vec![
                vec![1, 4, 8],
                vec![6, 9, 13],
                vec![8, 11, 15],
                vec![1, 4, 8],
            ],
        }
    }

    /// How many nominal chord lengths each chord lasts
    pub fn length_factor(&self) -> f64 {
        match self {
            Self::Root => 2.0,
            _ => 1.0,
        }
    }
}
