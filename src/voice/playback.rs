//! Audio playback to speakers

use std::f32::consts::TAU;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, StreamConfig};

use super::audio::AudioBuffer;
use crate::{Error, Result};

/// Plays audio buffers to completion
#[async_trait(?Send)]
pub trait Plays {
    /// Play `audio`, returning once it has finished
    async fn play(&mut self, audio: &AudioBuffer) -> Result<()>;
}

/// Plays audio to the default output device
pub struct AudioPlayback {
    device: Device,
    fallback: StreamConfig,
}

impl AudioPlayback {
    /// Open the default output device
    ///
    /// # Errors
    ///
    /// Returns error if no output device is available or it has no f32 config
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let default = device
            .default_output_config()
            .map_err(|e| Error::Audio(e.to_string()))?;

        if default.sample_format() != SampleFormat::F32 {
            return Err(Error::Audio(format!(
                "unsupported output format: {:?}",
                default.sample_format()
            )));
        }

        let fallback = default.config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = fallback.sample_rate.0,
            channels = fallback.channels,
            "audio playback initialized"
        );

        Ok(Self { device, fallback })
    }

    /// Pick a mono or stereo f32 config at `rate`, if the device has one
    fn config_for(&self, rate: u32) -> Option<StreamConfig> {
        let supports = |channels: u16| {
            self.device.supported_output_configs().ok()?.find(|c| {
                c.channels() == channels
                    && c.sample_format() == SampleFormat::F32
                    && c.min_sample_rate() <= SampleRate(rate)
                    && c.max_sample_rate() >= SampleRate(rate)
            })
        };

        supports(1)
            .or_else(|| supports(2))
            .map(|c| c.with_sample_rate(SampleRate(rate)).config())
    }
}

#[async_trait(?Send)]
impl Plays for AudioPlayback {
    async fn play(&mut self, audio: &AudioBuffer) -> Result<()> {
        if audio.is_empty() {
            return Ok(());
        }

        let (config, audio) = match self.config_for(audio.sample_rate()) {
            Some(config) => (config, audio.clone()),
            None => {
                let rate = self.fallback.sample_rate.0;
                (self.fallback.clone(), audio.clone().resampled(rate)?)
            }
        };

        let channels = usize::from(config.channels);
        let total = audio.samples().len();
        let duration = audio.duration();

        let samples = Arc::new(audio.into_samples());
        let position = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let stream = {
            let samples = Arc::clone(&samples);
            let position = Arc::clone(&position);
            let finished = Arc::clone(&finished);

            self.device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let mut pos = position.load(Ordering::Relaxed);

                        for frame in data.chunks_mut(channels) {
                            let sample = samples.get(pos).copied().unwrap_or_else(|| {
                                finished.store(true, Ordering::Relaxed);
                                0.0
                            });
                            frame.fill(sample);
                            if pos < samples.len() {
                                pos += 1;
                            }
                        }

                        position.store(pos, Ordering::Relaxed);
                    },
                    |err| {
                        tracing::error!(error = %err, "audio playback error");
                    },
                    None,
                )
                .map_err(|e| Error::Audio(e.to_string()))?
        };

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        // Poll for completion with timeout
        let start = Instant::now();
        let timeout = duration + Duration::from_millis(500);

        while !finished.load(Ordering::Relaxed) {
            if start.elapsed() > timeout {
                tracing::warn!("playback timed out");
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        // Small delay to let the device drain
        tokio::time::sleep(Duration::from_millis(100)).await;

        drop(stream);
        tracing::debug!(samples = total, "playback complete");

        Ok(())
    }
}

/// Generate a sine tone, for speaker checks
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn sine_tone(frequency: f32, duration: Duration, sample_rate: u32) -> AudioBuffer {
    let count = (duration.as_secs_f64() * f64::from(sample_rate)) as usize;
    let samples = (0..count)
        .map(|i| (TAU * frequency * i as f32 / sample_rate as f32).sin() * 0.3)
        .collect();
    AudioBuffer::new(samples, sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tone_has_requested_length_and_level() {
        let tone = sine_tone(440.0, Duration::from_millis(250), 16000);
        assert_eq!(tone.samples().len(), 4000);
        assert!(tone.samples().iter().all(|s| s.abs() <= 0.3 + f32::EPSILON));
        assert!(tone.rms() > 0.1);
    }
}
