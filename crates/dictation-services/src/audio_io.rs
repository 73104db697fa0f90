//! Default output device access

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum AudioOutputError {
    #[error("No audio output devices found")]
    NoDevices,
    #[error("Failed to get default output config: {0}")]
    ConfigError(String),
    #[error("Failed to build output stream: {0}")]
    StreamError(String),
}

/// Name, sample rate and channel count of the default output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDeviceInfo {
    pub name: String,
    pub sample_rate: u32,
    pub channels: u16,
}

fn default_output() -> Result<(cpal::Device, cpal::SupportedStreamConfig), AudioOutputError> {
    let device = cpal::default_host()
        .default_output_device()
        .ok_or(AudioOutputError::NoDevices)?;
    let config = device
        .default_output_config()
        .map_err(|e| AudioOutputError::ConfigError(e.to_string()))?;
    Ok((device, config))
}

pub fn default_device_info() -> Result<OutputDeviceInfo, AudioOutputError> {
    let (device, config) = default_output()?;
    Ok(OutputDeviceInfo {
        name: device.name().unwrap_or_default(),
        sample_rate: config.sample_rate().0,
        channels: config.channels(),
    })
}

/// Output stream that pulls interleaved f32 frames from a callback.
/// The callback receives the buffer, the device sample rate and channel count.
pub struct RealtimeOutputStream {
    stop_flag: Arc<AtomicBool>,
    info: OutputDeviceInfo,
    _stream: cpal::Stream,
}

impl RealtimeOutputStream {
    pub fn start<F>(fill: F) -> Result<Self, AudioOutputError>
    where
        F: FnMut(&mut [f32], u32, u16) + Send + 'static,
    {
        let (device, supported) = default_output()?;
        let info = OutputDeviceInfo {
            name: device.name().unwrap_or_default(),
            sample_rate: supported.sample_rate().0,
            channels: supported.channels(),
        };

        let stop_flag = Arc::new(AtomicBool::new(false));
        let stopped = stop_flag.clone();
        let fill = Arc::new(Mutex::new(fill));
        let (sample_rate, channels) = (info.sample_rate, info.channels);

        let config: StreamConfig = supported.into();
        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if stopped.load(Ordering::SeqCst) {
                        data.fill(0.0);
                        return;
                    }
                    let Ok(mut fill) = fill.lock() else {
                        data.fill(0.0);
                        return;
                    };
                    fill(data, sample_rate, channels);
                },
                move |err| error!("Output stream error: {}", err),
                None,
            )
            .map_err(|e| AudioOutputError::StreamError(e.to_string()))?;

        stream.play().map_err(|e| AudioOutputError::StreamError(e.to_string()))?;

        info!(device = %info.name, sample_rate, channels, "Started realtime output stream");
        Ok(Self { stop_flag, info, _stream: stream })
    }

    pub fn info(&self) -> &OutputDeviceInfo {
        &self.info
    }

    /// Output silence from now on; the device stays open until drop
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }
}

impl Drop for RealtimeOutputStream {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }
}
