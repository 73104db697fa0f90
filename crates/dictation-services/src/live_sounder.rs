//! Device-backed sounder rendering through the default output

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use tracing::{info, warn};

use dictation_core::{DictationError, LoadHandle, NoteSounder};

use crate::audio_io::{AudioOutputError, OutputDeviceInfo, RealtimeOutputStream};
use crate::instrument::InstrumentLibrary;
use crate::voices::VoiceBank;

/// Rate assumed until the device reports its own
const FALLBACK_SAMPLE_RATE: u32 = 48_000;

/// State shared between the engine thread, loader threads and the audio callback
struct Shared {
    bank: Mutex<VoiceBank>,
    /// Frames rendered so far; the transport clock
    frames: AtomicU64,
    sample_rate: AtomicU32,
    loading: AtomicBool,
}

impl Shared {
    fn new(sample_rate: u32) -> Self {
        Self {
            bank: Mutex::new(VoiceBank::new(sample_rate)),
            frames: AtomicU64::new(0),
            sample_rate: AtomicU32::new(sample_rate),
            loading: AtomicBool::new(false),
        }
    }

    /// Switch to a new device rate, keeping the transport time where it was
    fn retune(&self, bank: &mut VoiceBank, sample_rate: u32) {
        let old_rate = bank.sample_rate();
        if old_rate == sample_rate.max(1) {
            return;
        }
        bank.set_sample_rate(sample_rate);
        let ratio = bank.sample_rate() as f64 / old_rate as f64;
        let frames = self.frames.load(Ordering::SeqCst);
        self.frames.store((frames as f64 * ratio).round() as u64, Ordering::SeqCst);
        self.sample_rate.store(bank.sample_rate(), Ordering::SeqCst);
    }

    /// Fill an interleaved device buffer and move the clock forward
    fn fill(&self, data: &mut [f32], sample_rate: u32, channels: u16, scratch: &mut Vec<f32>) {
        let channels = channels.max(1) as usize;
        let frames = data.len() / channels;
        scratch.resize(frames, 0.0);

        let start = match self.bank.lock() {
            Ok(mut bank) => {
                self.retune(&mut bank, sample_rate);
                let start = self.frames.load(Ordering::SeqCst);
                bank.render(start, scratch);
                start
            }
            Err(_) => {
                scratch.fill(0.0);
                self.frames.load(Ordering::SeqCst)
            }
        };

        for (frame, &sample) in data.chunks_mut(channels).zip(scratch.iter()) {
            frame.fill(sample);
        }
        self.frames.store(start + frames as u64, Ordering::SeqCst);
    }
}

pub struct LiveSounder {
    shared: Arc<Shared>,
    library: InstrumentLibrary,
    stream: Option<RealtimeOutputStream>,
}

impl LiveSounder {
    /// Open the default output device and start rendering
    pub fn start(library: InstrumentLibrary) -> Result<Self, AudioOutputError> {
        let mut sounder = Self::detached(library, FALLBACK_SAMPLE_RATE);

        let shared = Arc::clone(&sounder.shared);
        let mut scratch = Vec::new();
        let stream = RealtimeOutputStream::start(move |data, sample_rate, channels| {
            shared.fill(data, sample_rate, channels, &mut scratch);
        })?;

        let rate = stream.info().sample_rate;
        if let Ok(mut bank) = sounder.shared.bank.lock() {
            sounder.shared.retune(&mut bank, rate);
        }
        sounder.stream = Some(stream);
        Ok(sounder)
    }

    /// Sounder with no device attached; nothing advances the clock
    fn detached(library: InstrumentLibrary, sample_rate: u32) -> Self {
        Self {
            shared: Arc::new(Shared::new(sample_rate)),
            library,
            stream: None,
        }
    }

    pub fn device_info(&self) -> Option<&OutputDeviceInfo> {
        self.stream.as_ref().map(RealtimeOutputStream::info)
    }

    pub fn stop(&self) {
        if let Some(stream) = &self.stream {
            stream.stop();
        }
    }
}

impl NoteSounder for LiveSounder {
    fn play(&mut self, pitch: u8, start_time: f64, duration: f64, gain: f32) {
        if let Ok(mut bank) = self.shared.bank.lock() {
            bank.schedule(pitch, start_time, duration, gain);
        }
    }

    fn load_instrument(&mut self, name: &str) -> LoadHandle {
        if self.shared.loading.swap(true, Ordering::SeqCst) {
            warn!(instrument = name, "Instrument load already in progress");
            return LoadHandle::resolved(Err(DictationError::InstrumentLoad(format!(
                "{name}: another instrument is still loading"
            ))));
        }

        let previous = self.shared.bank.lock().ok().and_then(|mut bank| {
            let previous = bank.timbre().cloned();
            bank.set_timbre(None);
            previous
        });

        let (done_tx, handle) = LoadHandle::channel();
        let shared = Arc::clone(&self.shared);
        let library = self.library.clone();
        let name = name.to_string();

        thread::spawn(move || {
            let result = library.resolve(&name);
            let outcome = match result {
                Ok(timbre) => {
                    if let Ok(mut bank) = shared.bank.lock() {
                        bank.set_timbre(Some(timbre));
                    }
                    info!(instrument = %name, "Instrument loaded");
                    Ok(())
                }
                Err(e) => {
                    warn!(instrument = %name, error = %e, "Instrument load failed, keeping previous");
                    if let Ok(mut bank) = shared.bank.lock() {
                        bank.set_timbre(previous);
                    }
                    Err(e.into())
                }
            };
            shared.loading.store(false, Ordering::SeqCst);
            let _ = done_tx.send(outcome);
        });

        handle
    }

    fn is_ready(&self) -> bool {
        !self.shared.loading.load(Ordering::SeqCst)
            && self.shared.bank.lock().is_ok_and(|bank| bank.timbre().is_some())
    }

    fn current_time(&self) -> f64 {
        let rate = self.shared.sample_rate.load(Ordering::SeqCst).max(1);
        self.shared.frames.load(Ordering::SeqCst) as f64 / rate as f64
    }
}
