//! Output device access through cpal

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AudioOutputError {
    #[error("No audio output devices found")]
    NoDevices,
    #[error("Failed to get default output config: {0}")]
    ConfigError(String),
    #[error("Failed to build output stream: {0}")]
    StreamError(String),
}

/// The device playback would use
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDeviceInfo {
    pub name: String,
    pub sample_rate: u32,
    pub channels: u16,
}

fn open_default() -> Result<(cpal::Device, cpal::SupportedStreamConfig), AudioOutputError> {
    let device = cpal::default_host().default_output_device().ok_or(AudioOutputError::NoDevices)?;
    let config = device
        .default_output_config()
        .map_err(|e| AudioOutputError::ConfigError(e.to_string()))?;
    Ok((device, config))
}

/// Probe the default output device without opening a stream
pub fn default_output_device() -> Result<OutputDeviceInfo, AudioOutputError> {
    let (device, config) = open_default()?;
    Ok(OutputDeviceInfo {
        name: device.name().unwrap_or_default(),
        sample_rate: config.sample_rate().0,
        channels: config.channels(),
    })
}

/// Running output stream on the default device.
///
/// The callback fills interleaved f32 buffers on the audio thread. Once
/// stopped, the stream outputs silence until dropped.
pub struct RealtimeOutputStream {
    info: OutputDeviceInfo,
    silenced: Arc<AtomicBool>,
    _stream: cpal::Stream,
}

impl RealtimeOutputStream {
    pub fn start<F>(mut fill: F) -> Result<Self, AudioOutputError>
    where
        F: FnMut(&mut [f32], u32, u16) + Send + 'static,
    {
        let (device, supported) = open_default()?;
        let info = OutputDeviceInfo {
            name: device.name().unwrap_or_default(),
            sample_rate: supported.sample_rate().0,
            channels: supported.channels(),
        };

        let silenced = Arc::new(AtomicBool::new(false));
        let silenced_cb = silenced.clone();
        let (sample_rate, channels) = (info.sample_rate, info.channels);

        let stream = device
            .build_output_stream(
                &supported.into(),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if silenced_cb.load(Ordering::Relaxed) {
                        data.fill(0.0);
                    } else {
                        fill(data, sample_rate, channels);
                    }
                },
                |err| error!(error = %err, "Output stream error"),
                None,
            )
            .map_err(|e| AudioOutputError::StreamError(e.to_string()))?;
        stream.play().map_err(|e| AudioOutputError::StreamError(e.to_string()))?;

        info!(device = %info.name, sample_rate, channels, "Output stream started");
        Ok(Self { info, silenced, _stream: stream })
    }

    pub fn info(&self) -> &OutputDeviceInfo {
        &self.info
    }

    pub fn sample_rate(&self) -> u32 {
        self.info.sample_rate
    }

    pub fn stop(&self) {
        self.silenced.store(true, Ordering::Relaxed);
    }
}

impl Drop for RealtimeOutputStream {
    fn drop(&mut self) {
        self.stop();
    }
}
