//! Audio file loading

use anyhow::{Context, Result};
use std::path::Path;

/// WAV loader producing float samples at a requested sample rate
pub struct AudioLoader;

impl AudioLoader {
    /// Load audio, mixed down to mono, at `target_sr`
    pub fn load<P: AsRef<Path>>(path: P, target_sr: u32) -> Result<Vec<f32>> {
        let channels = Self::load_channels(path, target_sr)?;
        let n = channels.len() as f32;
        let len = channels.iter().map(Vec::len).min().unwrap_or(0);
        Ok((0..len)
            .map(|i| channels.iter().map(|c| c[i]).sum::<f32>() / n)
            .collect())
    }

    /// Load every channel separately, each resampled to `target_sr`
    ///
    /// Integer PCM is scaled into `[-1, 1)`; float WAVs are returned as stored.
    pub fn load_channels<P: AsRef<Path>>(path: P, target_sr: u32) -> Result<Vec<Vec<f32>>> {
        let path = path.as_ref();
        if !path.extension().is_some_and(|e| e.eq_ignore_ascii_case("wav")) {
            anyhow::bail!("Unsupported audio format: {:?}", path);
        }

        let reader = hound::WavReader::open(path)
            .with_context(|| format!("Failed to open WAV file: {:?}", path))?;
        let spec = reader.spec();

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<Vec<f32>, _>>()
                .with_context(|| format!("Failed to decode {:?}", path))?,
            hound::SampleFormat::Int => {
                let max_value = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|s| s as f32 / max_value))
                    .collect::<std::result::Result<Vec<f32>, _>>()
                    .with_context(|| format!("Failed to decode {:?}", path))?
            }
        };

        let num_channels = spec.channels.max(1) as usize;
        let mut channels = vec![Vec::with_capacity(interleaved.len() / num_channels); num_channels];
        for frame in interleaved.chunks_exact(num_channels) {
            for (channel, &sample) in channels.iter_mut().zip(frame) {
                channel.push(sample);
            }
        }

        tracing::debug!(
            "Loaded {:?}: {} channel(s), {} samples at {} Hz",
            path,
            num_channels,
            channels[0].len(),
            spec.sample_rate
        );

        if spec.sample_rate == target_sr {
            return Ok(channels);
        }
        channels
            .iter()
            .map(|c| super::Resampler::resample(c, spec.sample_rate, target_sr))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_stereo(path: &Path, sample_rate: u32) {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..100 {
            writer.write_sample(16384i16).unwrap();
            writer.write_sample(-16384i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_load_channels_deinterleaves() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_stereo(&path, 44100);

        let channels = AudioLoader::load_channels(&path, 44100).unwrap();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].len(), 100);
        assert!(channels[0].iter().all(|&s| (s - 0.5).abs() < 1e-6));
        assert!(channels[1].iter().all(|&s| (s + 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_load_mono_mix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_stereo(&path, 44100);

        let mono = AudioLoader::load(&path, 44100).unwrap();
        assert_eq!(mono.len(), 100);
        assert!(mono.iter().all(|&s| s.abs() < 1e-6));
    }

    #[test]
    fn test_rejects_non_wav() {
        assert!(AudioLoader::load_channels("clip.mp3", 44100).is_err());
    }
}
