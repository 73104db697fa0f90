//! Scheduled-note renderer shared by the live and offline sounders
//!
//! Notes are queued with absolute start times in seconds and rendered frame by
//! frame against a running frame counter, so a note lands on the frame its
//! start time maps to regardless of how the output is chunked.

use std::sync::Arc;

use fundsp::hacker::{midi_hz, sine_hz, square_hz, triangle_hz, AudioUnit};

/// Linear rise at the start of an oscillator note
const ATTACK_SECS: f64 = 0.01;
/// Oscillator level reached at the end of the attack, before note gain
const PEAK_LEVEL: f64 = 0.3;
/// Level the exponential decay reaches when the note ends
const FLOOR_LEVEL: f64 = 0.01;
/// Fade applied to sample voices after their note ends
const SAMPLE_RELEASE_SECS: f64 = 0.005;
const MAX_VOICES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Triangle,
    Square,
}

impl Waveform {
    fn unit(&self, hz: f32) -> Box<dyn AudioUnit + Send> {
        match self {
            Self::Sine => Box::new(sine_hz(hz)),
            Self::Triangle => Box::new(triangle_hz(hz)),
            Self::Square => Box::new(square_hz(hz)),
        }
    }
}

/// Mono recording played back pitched relative to `base_pitch`
#[derive(Debug, Clone, PartialEq)]
pub struct SampleData {
    pub frames: Vec<f32>,
    pub sample_rate: u32,
    pub base_pitch: u8,
}

#[derive(Debug, Clone)]
pub enum Timbre {
    Oscillator(Waveform),
    Sample(Arc<SampleData>),
}

enum Source {
    Oscillator(Box<dyn AudioUnit + Send>),
    Sample {
        data: Arc<SampleData>,
        position: f64,
        step: f64,
    },
}

struct Voice {
    start_frame: u64,
    end_frame: u64,
    gain: f32,
    source: Source,
    release_gain: f32,
    done: bool,
}

impl Voice {
    fn envelope(&self, frame: u64, sample_rate: f64) -> f32 {
        let t = (frame - self.start_frame) as f64 / sample_rate;
        let length = (self.end_frame - self.start_frame) as f64 / sample_rate;
        let attack = ATTACK_SECS.min(length);

        let level = if t < attack {
            PEAK_LEVEL * t / attack
        } else if length > attack {
            let progress = (t - attack) / (length - attack);
            PEAK_LEVEL * (FLOOR_LEVEL / PEAK_LEVEL).powf(progress)
        } else {
            PEAK_LEVEL
        };
        level as f32
    }

    fn tick(&mut self, frame: u64, sample_rate: f64) -> f32 {
        if self.done || frame < self.start_frame {
            return 0.0;
        }

        let envelope = match &self.source {
            Source::Oscillator(_) if frame >= self.end_frame => {
                self.done = true;
                return 0.0;
            }
            Source::Oscillator(_) => self.envelope(frame, sample_rate),
            Source::Sample { .. } => {
                if frame >= self.end_frame {
                    self.release_gain -= (1.0 / (sample_rate * SAMPLE_RELEASE_SECS)) as f32;
                    if self.release_gain <= 0.0 {
                        self.done = true;
                        return 0.0;
                    }
                }
                self.release_gain
            }
        };

        let raw = match &mut self.source {
            Source::Oscillator(unit) => unit.get_mono(),
            Source::Sample { data, position, step } => {
                let idx = *position as usize;
                if idx + 1 >= data.frames.len() {
                    self.done = true;
                    return 0.0;
                }
                let frac = (*position - idx as f64) as f32;
                let s0 = data.frames[idx];
                let s1 = data.frames[idx + 1];
                *position += *step;
                s0 + frac * (s1 - s0)
            }
        };

        raw * envelope * self.gain
    }
}

pub struct VoiceBank {
    sample_rate: u32,
    timbre: Option<Timbre>,
    voices: Vec<Voice>,
}

impl VoiceBank {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            timbre: None,
            voices: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Queued notes keep their start times in seconds across a rate change
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        let sample_rate = sample_rate.max(1);
        if sample_rate == self.sample_rate {
            return;
        }
        let ratio = sample_rate as f64 / self.sample_rate as f64;
        for voice in &mut self.voices {
            voice.start_frame = (voice.start_frame as f64 * ratio).round() as u64;
            voice.end_frame = (voice.end_frame as f64 * ratio).round() as u64;
            match &mut voice.source {
                Source::Oscillator(unit) => unit.set_sample_rate(sample_rate as f64),
                Source::Sample { step, .. } => *step *= self.sample_rate as f64 / sample_rate as f64,
            }
        }
        self.sample_rate = sample_rate;
    }

    pub fn timbre(&self) -> Option<&Timbre> {
        self.timbre.as_ref()
    }

    pub fn set_timbre(&mut self, timbre: Option<Timbre>) {
        self.timbre = timbre;
    }

    /// Voices not yet finished, including ones still waiting to start
    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|v| !v.done).count()
    }

    /// Queue a note. Ignored while no timbre is set.
    pub fn schedule(&mut self, pitch: u8, start_time: f64, duration: f64, gain: f32) {
        let Some(timbre) = &self.timbre else {
            return;
        };
        let rate = self.sample_rate as f64;
        let start_frame = (start_time.max(0.0) * rate).round() as u64;
        let end_frame = start_frame + (duration.max(0.0) * rate).round().max(1.0) as u64;

        let source = match timbre {
            Timbre::Oscillator(waveform) => {
                let mut unit = waveform.unit(midi_hz(pitch as f32));
                unit.set_sample_rate(rate);
                Source::Oscillator(unit)
            }
            Timbre::Sample(data) => Source::Sample {
                data: Arc::clone(data),
                position: 0.0,
                step: 2.0_f64.powf((pitch as f64 - data.base_pitch as f64) / 12.0) * data.sample_rate as f64 / rate,
            },
        };

        self.voices.retain(|v| !v.done);
        if self.voices.len() >= MAX_VOICES {
            // steal the voice that started first
            if let Some(oldest) = self.voices.iter().enumerate().min_by_key(|(_, v)| v.start_frame).map(|(i, _)| i) {
                self.voices.remove(oldest);
            }
        }
        self.voices.push(Voice {
            start_frame,
            end_frame,
            gain,
            source,
            release_gain: 1.0,
            done: false,
        });
    }

    /// Mix every voice into `out` (mono), `out[0]` being frame `start_frame`
    pub fn render(&mut self, start_frame: u64, out: &mut [f32]) {
        let rate = self.sample_rate as f64;
        for (i, sample) in out.iter_mut().enumerate() {
            let frame = start_frame + i as u64;
            let mix: f32 = self.voices.iter_mut().map(|v| v.tick(frame, rate)).sum();
            *sample = mix.clamp(-1.0, 1.0);
        }
        self.voices.retain(|v| !v.done);
    }

    pub fn clear(&mut self) {
        self.voices.clear();
    }
}
