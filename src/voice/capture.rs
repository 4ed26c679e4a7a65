//! Audio capture from microphone

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, SizedSample, Stream, StreamConfig};

use super::audio::{AudioBuffer, downmix};
use crate::{Error, Result};

/// Records fixed-duration audio buffers
///
/// Implementations hold the microphone only while `record` runs.
#[async_trait(?Send)]
pub trait Records {
    /// Record `duration` of mono audio
    async fn record(&mut self, duration: Duration) -> Result<AudioBuffer>;
}

/// Captures audio from the default input device
pub struct AudioCapture {
    device: Device,
    config: StreamConfig,
    format: SampleFormat,
    target_rate: u32,
    buffer: Arc<Mutex<Vec<f32>>>,
}

impl AudioCapture {
    /// Open the default input device for capture at `target_rate`
    ///
    /// A mono config at the target rate is preferred. Otherwise the device
    /// default is used and recordings are downmixed and resampled.
    ///
    /// # Errors
    ///
    /// Returns error if no input device or usable config is available
    pub fn new(target_rate: u32) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let preferred = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.sample_format() == SampleFormat::F32
                    && c.min_sample_rate() <= SampleRate(target_rate)
                    && c.max_sample_rate() >= SampleRate(target_rate)
            })
            .map(|c| c.with_sample_rate(SampleRate(target_rate)));

        let supported = match preferred {
            Some(config) => config,
            None => device
                .default_input_config()
                .map_err(|e| Error::Audio(format!("no suitable input config: {e}")))?,
        };

        let format = supported.sample_format();
        let config = supported.config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            format = ?format,
            "audio capture initialized"
        );

        Ok(Self {
            device,
            config,
            format,
            target_rate,
            buffer: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Rate of the buffers this capture produces
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.target_rate
    }

    fn build_stream(&self) -> Result<Stream> {
        let buffer = Arc::clone(&self.buffer);
        match self.format {
            SampleFormat::F32 => input_stream::<f32>(&self.device, &self.config, buffer),
            SampleFormat::I16 => input_stream::<i16>(&self.device, &self.config, buffer),
            SampleFormat::U16 => input_stream::<u16>(&self.device, &self.config, buffer),
            other => Err(Error::Audio(format!("unsupported input format: {other:?}"))),
        }
    }

    fn take_buffer(&self) -> Vec<f32> {
        self.buffer
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default()
    }
}

#[async_trait(?Send)]
impl Records for AudioCapture {
    async fn record(&mut self, duration: Duration) -> Result<AudioBuffer> {
        drop(self.take_buffer());

        let stream = self.build_stream()?;
        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        tracing::trace!(duration_ms = duration.as_millis(), "audio capture started");

        tokio::time::sleep(duration).await;

        // Dropping the stream releases the device
        drop(stream);
        tracing::trace!("audio capture stopped");

        let interleaved = self.take_buffer();
        let mono = downmix(&interleaved, usize::from(self.config.channels));
        let audio = AudioBuffer::new(mono, self.config.sample_rate.0).resampled(self.target_rate)?;

        tracing::debug!(
            samples = audio.samples().len(),
            rms = audio.rms(),
            "recorded audio"
        );
        Ok(audio)
    }
}

fn input_stream<T>(device: &Device, config: &StreamConfig, buffer: Arc<Mutex<Vec<f32>>>) -> Result<Stream>
where
    T: SizedSample,
    f32: cpal::FromSample<T>,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                if let Ok(mut buf) = buffer.lock() {
                    buf.extend(data.iter().map(|&s| s.to_sample::<f32>()));
                }
            },
            |err| {
                tracing::error!(error = %err, "audio capture error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))
}
