//! PCM audio buffers and their WAV interchange format

use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use crate::{Error, Result};

/// Sample rate for captured speech and written artifacts (16kHz)
pub const SAMPLE_RATE: u32 = 16000;

/// Mono PCM samples in [-1.0, 1.0] at a known sample rate
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Wrap mono samples recorded at `sample_rate`
    #[must_use]
    pub const fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Build a buffer from signed 16-bit little-endian mono PCM bytes
    ///
    /// A trailing odd byte is ignored.
    #[must_use]
    pub fn from_pcm16_le(bytes: &[u8], sample_rate: u32) -> Self {
        let samples = bytes
            .chunks_exact(2)
            .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
            .collect();
        Self::new(samples, sample_rate)
    }

    /// Samples in playback order
    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Consume the buffer, returning its samples
    #[must_use]
    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Length of the buffer in wall-clock time
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }

    /// RMS energy of the whole buffer
    #[must_use]
    pub fn rms(&self) -> f32 {
        calculate_energy(&self.samples)
    }

    /// Encode as 16-bit mono WAV bytes (for STT APIs)
    ///
    /// # Errors
    ///
    /// Returns error if WAV encoding fails
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>> {
        samples_to_wav(&self.samples, self.sample_rate)
    }

    /// Decode WAV bytes, downmixing to mono
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are not a supported WAV stream
    pub fn from_wav_bytes(bytes: &[u8]) -> Result<Self> {
        let reader = hound::WavReader::new(Cursor::new(bytes))?;
        read_wav(reader)
    }

    /// Write the buffer to a 16-bit mono WAV file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be created or written
    pub fn write_wav(&self, path: &Path) -> Result<()> {
        let bytes = self.to_wav_bytes()?;
        std::fs::write(path, bytes)?;
        tracing::debug!(path = %path.display(), samples = self.samples.len(), "wrote wav file");
        Ok(())
    }

    /// Read a WAV file, downmixing to mono
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be opened or decoded
    pub fn read_wav(path: &Path) -> Result<Self> {
        let reader = hound::WavReader::open(path)?;
        read_wav(reader)
    }

    /// Return this buffer at `target_rate`, resampling if needed
    ///
    /// # Errors
    ///
    /// Returns error if the resampler cannot be constructed
    pub fn resampled(self, target_rate: u32) -> Result<Self> {
        if self.sample_rate == target_rate || self.samples.is_empty() {
            return Ok(Self::new(self.samples, target_rate));
        }
        let samples = resample_audio(&self.samples, self.sample_rate, target_rate)?;
        Ok(Self::new(samples, target_rate))
    }
}

/// Convert f32 samples to WAV bytes
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;

        for &sample in samples {
            // Convert f32 [-1.0, 1.0] to i16
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer.write_sample(sample_i16)?;
        }

        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}

fn read_wav<R: std::io::Read>(mut reader: hound::WavReader<R>) -> Result<AudioBuffer> {
    let spec = reader.spec();
    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = int_scale(spec.bits_per_sample)?;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| pcm_to_f32(v, scale)))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    let samples = downmix(&interleaved, usize::from(spec.channels));
    Ok(AudioBuffer::new(samples, spec.sample_rate))
}

fn int_scale(bits: u16) -> Result<f32> {
    match bits {
        8 => Ok(128.0),
        16 => Ok(32768.0),
        24 => Ok(8_388_608.0),
        32 => Ok(2_147_483_648.0),
        other => Err(Error::Audio(format!("unsupported bit depth: {other}"))),
    }
}

#[allow(clippy::cast_precision_loss)]
fn pcm_to_f32(value: i32, scale: f32) -> f32 {
    value as f32 / scale
}

/// Average interleaved frames down to a single channel
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Resample mono audio using rubato
///
/// Input is fed in the block size the resampler asks for; the tail is
/// zero-padded and the resampler's startup delay is trimmed so the output
/// lines up with the input.
///
/// # Errors
///
/// Returns error if the resampler cannot be constructed or fails
#[allow(clippy::cast_possible_truncation)]
pub fn resample_audio(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    use rubato::{FftFixedIn, Resampler};

    let chunk_size = 1024;
    let sub_chunks = 2;

    let mut resampler =
        FftFixedIn::<f64>::new(from_rate as usize, to_rate as usize, chunk_size, sub_chunks, 1)
            .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?;

    // Convert to f64
    let input: Vec<f64> = samples.iter().map(|&s| f64::from(s)).collect();
    let expected = samples.len() * to_rate as usize / from_rate as usize;
    let delay = resampler.output_delay();
    let needed = expected + delay;

    let mut output = Vec::with_capacity(needed + chunk_size);
    let mut pos = 0;

    while output.len() < needed {
        let frames = resampler.input_frames_next();
        let end = (pos + frames).min(input.len());
        let mut block = input.get(pos..end).map(<[f64]>::to_vec).unwrap_or_default();
        block.resize(frames, 0.0);
        pos += frames;

        let result = resampler
            .process(&[block], None)
            .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
        output.extend_from_slice(&result[0]);

        // Padding alone can always cover the delay within a few blocks
        if pos > input.len() + 8 * frames {
            break;
        }
    }

    output.drain(..delay.min(output.len()));
    output.truncate(expected);

    // Convert back to f32
    Ok(output.iter().map(|&s| s as f32).collect())
}

/// Calculate RMS energy of audio samples
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
