//! Buffer-backed sounder: renders on demand and writes WAV files

use std::path::Path;

use tracing::{info, warn};

use dictation_core::{LoadHandle, NoteSounder};

use crate::instrument::InstrumentLibrary;
use crate::voices::VoiceBank;

/// Sounder whose clock moves only as audio is rendered.
/// Instruments load synchronously, so it is ready as soon as a load returns.
pub struct OfflineSounder {
    bank: VoiceBank,
    library: InstrumentLibrary,
    frames: u64,
    rendered: Vec<f32>,
}

impl OfflineSounder {
    pub fn new(library: InstrumentLibrary, sample_rate: u32) -> Self {
        Self {
            bank: VoiceBank::new(sample_rate),
            library,
            frames: 0,
            rendered: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.bank.sample_rate()
    }

    /// Render the next `secs` seconds and keep them
    pub fn render_secs(&mut self, secs: f64) -> &[f32] {
        let frames = (secs.max(0.0) * self.sample_rate() as f64).round() as usize;
        self.render_frames(frames)
    }

    pub fn render_frames(&mut self, frames: usize) -> &[f32] {
        let offset = self.rendered.len();
        self.rendered.resize(offset + frames, 0.0);
        self.bank.render(self.frames, &mut self.rendered[offset..]);
        self.frames += frames as u64;
        &self.rendered[offset..]
    }

    /// Render until every queued note has finished
    pub fn render_to_end(&mut self) -> &[f32] {
        let offset = self.rendered.len();
        let block = (self.sample_rate() / 100).max(1) as usize;
        while self.bank.active_voices() > 0 {
            self.render_frames(block);
        }
        &self.rendered[offset..]
    }

    pub fn rendered(&self) -> &[f32] {
        &self.rendered
    }

    pub fn take_rendered(&mut self) -> Vec<f32> {
        std::mem::take(&mut self.rendered)
    }

    /// Write everything rendered so far as mono 16-bit PCM
    pub fn write_wav(&self, path: &Path) -> Result<(), hound::Error> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate(),
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec)?;
        for &sample in &self.rendered {
            writer.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
        }
        writer.finalize()?;
        info!(path = %path.display(), frames = self.rendered.len(), "Wrote rendered audio");
        Ok(())
    }
}

impl NoteSounder for OfflineSounder {
    fn play(&mut self, pitch: u8, start_time: f64, duration: f64, gain: f32) {
        self.bank.schedule(pitch, start_time, duration, gain);
    }

    fn load_instrument(&mut self, name: &str) -> LoadHandle {
        match self.library.resolve(name) {
            Ok(timbre) => {
                self.bank.set_timbre(Some(timbre));
                info!(instrument = name, "Instrument loaded");
                LoadHandle::resolved(Ok(()))
            }
            Err(e) => {
                warn!(instrument = name, error = %e, "Instrument load failed");
                LoadHandle::resolved(Err(e.into()))
            }
        }
    }

    fn is_ready(&self) -> bool {
        self.bank.timbre().is_some()
    }

    fn current_time(&self) -> f64 {
        self.frames as f64 / self.sample_rate() as f64
    }
}
