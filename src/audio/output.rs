//! Audio output

use anyhow::{Context, Result};
use std::path::Path;

/// 16-bit PCM full scale
pub const PCM16_SCALE: f32 = 32768.0;

/// WAV writer
pub struct AudioOutput;

impl AudioOutput {
    /// Save samples already in 16-bit PCM scale as a mono WAV
    ///
    /// Values are rounded and saturated to the `i16` range. An existing file at
    /// `path` is overwritten.
    pub fn save_pcm16<P: AsRef<Path>>(samples: &[f32], sample_rate: u32, path: P) -> Result<()> {
        let path = path.as_ref();
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer = hound::WavWriter::create(path, spec)
            .with_context(|| format!("Failed to create WAV file: {:?}", path))?;
        for &sample in samples {
            let value = if sample.is_nan() { 0.0 } else { sample.round() };
            writer.write_sample(value.clamp(i16::MIN as f32, i16::MAX as f32) as i16)?;
        }
        writer.finalize()?;

        tracing::debug!("Wrote {} samples at {} Hz to {:?}", samples.len(), sample_rate, path);
        Ok(())
    }

    /// Save float samples in `[-1, 1]` as a mono 16-bit WAV
    pub fn save<P: AsRef<Path>>(samples: &[f32], sample_rate: u32, path: P) -> Result<()> {
        let scaled: Vec<f32> = samples.iter().map(|s| s * PCM16_SCALE).collect();
        Self::save_pcm16(&scaled, sample_rate, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_pcm16_saturates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        AudioOutput::save_pcm16(&[0.0, 40000.0, -40000.0, 1.4, f32::NAN], 44100, &path).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 44100);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0, i16::MAX, i16::MIN, 1, 0]);
    }

    #[test]
    fn test_save_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        AudioOutput::save(&[0.5; 100], 22050, &path).unwrap();
        AudioOutput::save(&[0.5; 10], 22050, &path).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.len(), 10);
    }
}
