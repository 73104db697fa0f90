//! Instrument lookup: built-in oscillators or WAV samples from a directory

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use dictation_core::DictationError;

use crate::voices::{SampleData, Timbre, Waveform};

/// Pitch a sample file is assumed to be recorded at
const SAMPLE_BASE_PITCH: u8 = 60;

#[derive(Debug, Error)]
pub enum InstrumentError {
    #[error("Unknown instrument: {0}")]
    Unknown(String),
    #[error("Failed to read {}: {source}", .path.display())]
    Wav {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },
    #[error("Sample file is empty: {}", .0.display())]
    Empty(PathBuf),
}

impl From<InstrumentError> for DictationError {
    fn from(e: InstrumentError) -> Self {
        DictationError::InstrumentLoad(e.to_string())
    }
}

/// Resolves instrument names. Built-in waveform names always work; any other
/// name is looked up as `<name>.wav` in the sample directory.
#[derive(Debug, Clone, Default)]
pub struct InstrumentLibrary {
    sample_dir: Option<PathBuf>,
}

impl InstrumentLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sample_dir(dir: impl Into<PathBuf>) -> Self {
        Self { sample_dir: Some(dir.into()) }
    }

    pub fn builtin(name: &str) -> Option<Waveform> {
        match name {
            "sine" => Some(Waveform::Sine),
            "triangle" => Some(Waveform::Triangle),
            "square" => Some(Waveform::Square),
            _ => None,
        }
    }

    pub fn resolve(&self, name: &str) -> Result<Timbre, InstrumentError> {
        if let Some(waveform) = Self::builtin(name) {
            return Ok(Timbre::Oscillator(waveform));
        }
        let path = self
            .sample_dir
            .as_ref()
            .map(|dir| dir.join(format!("{name}.wav")))
            .filter(|p| p.is_file())
            .ok_or_else(|| InstrumentError::Unknown(name.to_string()))?;

        let sample = load_sample(&path)?;
        info!(instrument = name, frames = sample.frames.len(), sample_rate = sample.sample_rate, "Loaded sample instrument");
        Ok(Timbre::Sample(Arc::new(sample)))
    }
}

/// Read a WAV file as mono f32 frames
pub fn load_sample(path: &Path) -> Result<SampleData, InstrumentError> {
    let wav_err = |source: hound::Error| InstrumentError::Wav { path: path.to_path_buf(), source };
    let reader = hound::WavReader::open(path).map_err(wav_err)?;

    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let raw: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(wav_err)?,
        hound::SampleFormat::Int => {
            let max_val = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<_, _>>()
                .map_err(wav_err)?
        }
    };

    if raw.is_empty() {
        return Err(InstrumentError::Empty(path.to_path_buf()));
    }

    let frames = if channels == 1 {
        raw
    } else {
        raw.chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    Ok(SampleData {
        frames,
        sample_rate: spec.sample_rate,
        base_pitch: SAMPLE_BASE_PITCH,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_stereo_wav(path: &Path) {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..100 {
            writer.write_sample(16384_i16).unwrap();
            writer.write_sample(0_i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_builtin_names() {
        let library = InstrumentLibrary::new();
        assert!(matches!(library.resolve("triangle"), Ok(Timbre::Oscillator(Waveform::Triangle))));
        assert!(matches!(
            library.resolve("acoustic_grand_piano"),
            Err(InstrumentError::Unknown(_))
        ));
    }

    #[test]
    fn test_sample_from_directory_is_mixed_to_mono() {
        let dir = std::env::temp_dir().join(format!("dictation-instruments-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        write_stereo_wav(&dir.join("organ.wav"));

        let library = InstrumentLibrary::with_sample_dir(&dir);
        let Ok(Timbre::Sample(sample)) = library.resolve("organ") else {
            panic!("expected a sample timbre");
        };
        assert_eq!(sample.frames.len(), 100);
        assert_eq!(sample.sample_rate, 8000);
        assert!((sample.frames[0] - 0.25).abs() < 1e-4);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_error_converts() {
        let err: DictationError = InstrumentError::Unknown("harp".into()).into();
        assert_eq!(err, DictationError::InstrumentLoad("Unknown instrument: harp".into()));
    }
}
