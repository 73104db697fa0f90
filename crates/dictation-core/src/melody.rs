//! Constrained random melodies over the chromatic degree ring

use fastrand::Rng;
use serde::Serialize;

use crate::error::{DictationError, Result};
use crate::key::ScaleDegree;

/// Number of chromatic steps on the degree ring
pub const DEGREES: u8 = 12;

/// A generated melody. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Melody(Vec<ScaleDegree>);

impl Melody {
    pub fn degrees(&self) -> &[ScaleDegree] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<ScaleDegree> {
        self.0.get(position).copied()
    }
}

impl From<Vec<ScaleDegree>> for Melody {
    fn from(degrees: Vec<ScaleDegree>) -> Self {
        Self(degrees)
    }
}

/// Shortest distance between two degrees on the 12-point ring
pub fn circular_interval(a: ScaleDegree, b: ScaleDegree) -> u8 {
    let diff = a.abs_diff(b) % DEGREES;
    diff.min(DEGREES - diff)
}

/// Generate `length` degrees in 1..=12 where every adjacent pair is at most
/// `max_interval` apart on the ring (`None` = unbounded).
pub fn generate(length: usize, max_interval: Option<u32>, rng: &mut Rng) -> Result<Melody> {
    if length == 0 {
        return Err(DictationError::invalid("melodyLength", "must be at least 1"));
    }

    let mut degrees = Vec::with_capacity(length);
    let mut prev = rng.u8(1..=DEGREES);
    degrees.push(prev);

    for _ in 1..length {
        let candidates: Vec<ScaleDegree> = (1..=DEGREES)
            .filter(|&d| max_interval.is_none_or(|max| circular_interval(prev, d) as u32 <= max))
            .collect();

        // prev itself always qualifies, so the fallback never triggers
        let next = if candidates.is_empty() {
            rng.u8(1..=DEGREES)
        } else {
            candidates[rng.usize(..candidates.len())]
        };

        degrees.push(next);
        prev = next;
    }

    Ok(Melody(degrees))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circular_interval() {
        assert_eq!(circular_interval(1, 1), 0);
        assert_eq!(circular_interval(1, 12), 1);
        assert_eq!(circular_interval(12, 1), 1);
        assert_eq!(circular_interval(1, 7), 6);
        assert_eq!(circular_interval(3, 10), 5);
        assert_eq!(circular_interval(5, 3), 2);
    }

    #[test]
    fn test_generated_melodies_respect_constraints() {
        for seed in 0..200 {
            let mut rng = Rng::with_seed(seed);
            let max = (seed % 7) as u32;
            let melody = generate(8, Some(max), &mut rng).unwrap();

            assert_eq!(melody.len(), 8);
            assert!(melody.degrees().iter().all(|d| (1..=12).contains(d)));
            for pair in melody.degrees().windows(2) {
                assert!(
                    circular_interval(pair[0], pair[1]) as u32 <= max,
                    "seed {seed}: {pair:?} exceeds {max}"
                );
            }
        }
    }

    #[test]
    fn test_zero_interval_repeats_first_degree() {
        let mut rng = Rng::with_seed(7);
        let melody = generate(5, Some(0), &mut rng).unwrap();
        let first = melody.degrees()[0];
        assert!(melody.degrees().iter().all(|&d| d == first));
    }

    #[test]
    fn test_unbounded_reaches_wide_leaps() {
        let mut rng = Rng::with_seed(42);
        let melody = generate(400, None, &mut rng).unwrap();
        let widest = melody
            .degrees()
            .windows(2)
            .map(|p| circular_interval(p[0], p[1]))
            .max()
            .unwrap();
        assert_eq!(widest, 6);
    }

    #[test]
    fn test_seeded_generation_replays() {
        let a = generate(6, Some(2), &mut Rng::with_seed(99)).unwrap();
        let b = generate(6, Some(2), &mut Rng::with_seed(99)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_length_rejected() {
        let err = generate(0, None, &mut Rng::with_seed(1)).unwrap_err();
        assert!(matches!(err, DictationError::InvalidConfig { field: "melodyLength", .. }));
    }
}
