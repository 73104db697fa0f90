//! dictation-services: Audio backends and persistence for melodic dictation

pub mod audio_io;
pub mod instrument;
pub mod live_sounder;
pub mod offline_sounder;
pub mod settings;
pub mod voices;

pub use audio_io::{default_device_info, AudioOutputError, OutputDeviceInfo, RealtimeOutputStream};
pub use instrument::{load_sample, InstrumentError, InstrumentLibrary};
pub use live_sounder::LiveSounder;
pub use offline_sounder::OfflineSounder;
pub use settings::{settings_path, Settings, SettingsError, TomlSettingsStore};
pub use voices::{SampleData, Timbre, VoiceBank, Waveform};
