//! Pretrained vocoder wrapper
//!
//! Owns the generator, the analysis settings it was trained with and the
//! cached mel weighting curve:
//! 1. `synthesize`: externally computed mel batch → waveform batch
//! 2. `oracle`: wave file → mel → resynthesized wave file

use anyhow::Result;
use candle_core::{DType, Device, IndexOp, Tensor};
use std::path::Path;
use std::time::Instant;

use super::device::DeviceSelection;
use crate::audio::{features, AudioLoader, AudioOutput, MelSpectrogram};
use crate::config::{VocoderConfig, MEL_BINS};
use crate::debug::LoadReport;
use crate::error::VocoderError;
use crate::models::vocoder::{Generator, ParamLoader};

/// Inference-only wrapper around the pretrained generator
///
/// Parameters are frozen after construction and the device is fixed, so
/// every method takes `&self`.
pub struct Vocoder {
    device: Device,
    config: VocoderConfig,
    generator: Generator,
    /// Mel weighting curve, `[1, 1, 1, num_mels]`
    mel_weight: Tensor,
    analyzer: MelSpectrogram,
    load_report: LoadReport,
}

impl Vocoder {
    /// Load the vocoder for `sample_rate` on the CPU
    pub fn new<P: AsRef<Path>>(sample_rate: u32, checkpoint: P) -> Result<Self> {
        let checkpoint = checkpoint.as_ref();
        Self::ensure_checkpoint(checkpoint)?;
        let config = VocoderConfig::for_sample_rate(sample_rate)?;
        Self::with_options(config, checkpoint, DeviceSelection::Cpu)
    }

    /// Load with an explicit configuration and device
    pub fn with_options<P: AsRef<Path>>(
        config: VocoderConfig,
        checkpoint: P,
        selection: DeviceSelection,
    ) -> Result<Self> {
        let checkpoint = checkpoint.as_ref();
        Self::ensure_checkpoint(checkpoint)?;
        config.validate()?;
        let device = selection.resolve()?;

        tracing::info!(
            "Loading vocoder: {} Hz, hop {}, {} mels, device {:?}",
            config.sample_rate,
            config.hop_length,
            config.num_mels,
            device
        );
        let start = Instant::now();

        let mut loader = ParamLoader::from_checkpoint(checkpoint, &device)?;
        let mut generator = Generator::new(config.generator.clone(), &mut loader)?;
        let load_report = loader.finish();
        load_report.log_summary();

        let folded = generator.remove_weight_norm()?;
        tracing::debug!("Removed weight normalization from {} layers", folded);

        let mel_weight = features::mel_weight(&config, 1.0, &device)?;
        let analyzer = MelSpectrogram::from_config(&config);

        tracing::info!("Vocoder ready in {:.2?}", start.elapsed());

        Ok(Self {
            device,
            config,
            generator,
            mel_weight,
            analyzer,
            load_report,
        })
    }

    fn ensure_checkpoint(path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(VocoderError::CheckpointNotFound {
                path: path.to_path_buf(),
            }
            .into());
        }
        Ok(())
    }

    /// Synthesize waveforms from a mel batch
    ///
    /// # Arguments
    /// * `mel` - Mel magnitudes still carrying the energy weighting,
    ///   `(batch, 1, frames, 128)`
    ///
    /// # Returns
    /// * Waveform `(batch, 1, samples)` in `[-1, 1]`; no PCM scaling is applied
    pub fn synthesize(&self, mel: &Tensor) -> Result<Tensor> {
        let dims = mel.dims();
        if dims.len() != 4 || dims[3] != MEL_BINS {
            return Err(VocoderError::InvalidMelShape {
                expected: MEL_BINS,
                shape: dims.to_vec(),
            }
            .into());
        }

        let mel = mel.to_device(&self.device)?;
        let mel = if mel.dtype().is_float() {
            mel
        } else {
            mel.to_dtype(DType::F32)?
        };

        let weight = self.mel_weight.to_dtype(mel.dtype())?;
        let mel = mel.broadcast_div(&weight)?;
        let conditions = features::condition(&mel.i((.., 0))?, &self.config)?;
        tracing::debug!("Generator input {:?}", conditions.dims());

        self.generator.forward(&conditions.to_dtype(DType::F32)?)
    }

    /// Resynthesize a wave file through the vocoder
    ///
    /// Reads `input` at the configured rate (first channel only),
    /// peak-normalizes it, extracts mel features with the training analysis
    /// settings, runs the generator and writes 16-bit PCM to `output`,
    /// overwriting any existing file.
    pub fn oracle<P: AsRef<Path>, Q: AsRef<Path>>(&self, input: P, output: Q) -> Result<()> {
        let input = input.as_ref();
        let start = Instant::now();

        let channels = AudioLoader::load_channels(input, self.config.sample_rate)?;
        let mut wav = channels.into_iter().next().unwrap_or_default();

        let peak = wav.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        if peak <= 0.0 || !peak.is_finite() {
            return Err(VocoderError::SilentInput {
                path: input.to_path_buf(),
            }
            .into());
        }
        wav.iter_mut().for_each(|s| *s /= peak);

        let conditions = self.mel_features(&wav)?;
        let audio = self.generator.forward(&conditions)?;
        let samples: Vec<f32> = audio.i((0, 0))?.to_dtype(DType::F32)?.to_vec1()?;

        AudioOutput::save(&samples, self.config.sample_rate, output.as_ref())?;

        tracing::info!(
            "Oracle resynthesis of {:?}: {} samples in {:.2?}",
            input,
            samples.len(),
            start.elapsed()
        );
        Ok(())
    }

    /// Generator conditioning for raw samples, `(1, num_mels, frames')`
    ///
    /// Magnitude STFT, mel projection, decibels minus the reference level,
    /// bounded normalization and silence padding.
    pub fn mel_features(&self, samples: &[f32]) -> Result<Tensor> {
        let mel = self.analyzer.compute(samples)?;
        let frames = mel.len();
        let flat: Vec<f32> = mel.into_iter().flatten().collect();
        let mel = Tensor::from_vec(flat, (1, frames, self.config.num_mels), &self.device)?;
        Ok(features::condition(&mel, &self.config)?)
    }

    /// Output sample rate
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    /// Active configuration
    pub fn config(&self) -> &VocoderConfig {
        &self.config
    }

    /// Device the model runs on
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Outcome of the checkpoint load
    pub fn load_report(&self) -> &LoadReport {
        &self.load_report
    }

    /// Samples produced per mel frame
    pub fn hop_length(&self) -> usize {
        self.generator.upsample_factor()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeneratorConfig;
    use crate::error::{error_kind, ErrorKind};
    use std::collections::HashMap;

    fn small_config() -> VocoderConfig {
        let mut config = VocoderConfig::for_sample_rate(44100).unwrap();
        config.generator = GeneratorConfig {
            in_channels: MEL_BINS,
            channels: 16,
            upsample_scales: vec![7, 7, 3, 3],
            resstack_depth: vec![1, 1, 1, 1],
            out_channels: 1,
        };
        config
    }

    fn write_checkpoint(dir: &Path) -> std::path::PathBuf {
        let device = Device::Cpu;
        let path = dir.join("vocoder.safetensors");
        let mut tensors = HashMap::new();
        tensors.insert(
            "generator.conv_post.bias".to_string(),
            Tensor::zeros(1, DType::F32, &device).unwrap(),
        );
        candle_core::safetensors::save(&tensors, &path).unwrap();
        path
    }

    #[test]
    fn test_missing_checkpoint_is_configuration_error() {
        let err = Vocoder::new(44100, "/nonexistent/model.ckpt-1490000_trimed.pt").err().unwrap();
        assert_eq!(error_kind(&err), Some(ErrorKind::Configuration));
        assert!(err.to_string().contains("zenodo"));
    }

    #[test]
    fn test_synthesize_shape_and_determinism() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = write_checkpoint(dir.path());
        let vocoder = Vocoder::with_options(small_config(), &ckpt, DeviceSelection::Cpu).unwrap();
        assert!(vocoder.load_report().found_keys.contains("conv_post.bias"));

        let mel = Tensor::full(0.5f32, (2, 1, 10, 128), &Device::Cpu).unwrap();
        let a = vocoder.synthesize(&mel).unwrap();
        // 10 frames + 4 tail frames, 441 samples each
        assert_eq!(a.dims3().unwrap(), (2, 1, 14 * 441));

        let b = vocoder.synthesize(&mel).unwrap();
        let a: Vec<f32> = a.flatten_all().unwrap().to_vec1().unwrap();
        let b: Vec<f32> = b.flatten_all().unwrap().to_vec1().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_synthesize_rejects_wrong_bins() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = write_checkpoint(dir.path());
        let vocoder = Vocoder::with_options(small_config(), &ckpt, DeviceSelection::Cpu).unwrap();

        for shape in [vec![1, 1, 10, 64], vec![1, 1, 10, 256], vec![1, 10, 128]] {
            let mel = Tensor::zeros(shape.as_slice(), DType::F32, &Device::Cpu).unwrap();
            let err = vocoder.synthesize(&mel).unwrap_err();
            assert_eq!(error_kind(&err), Some(ErrorKind::Validation));
        }
    }

    #[test]
    fn test_synthesize_removes_mel_weighting() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = write_checkpoint(dir.path());
        let vocoder = Vocoder::with_options(small_config(), &ckpt, DeviceSelection::Cpu).unwrap();

        // Unweighted magnitudes spanning the dB range around the reference level
        let mel = Tensor::rand(0.001f32, 3.0, (2, 1, 9, 128), &Device::Cpu).unwrap();
        let weighted = mel.broadcast_mul(&vocoder.mel_weight).unwrap();

        let actual = vocoder.synthesize(&weighted).unwrap();
        let conditions = features::condition(&mel.i((.., 0)).unwrap(), &vocoder.config).unwrap();
        let expected = vocoder.generator.forward(&conditions).unwrap();

        assert_eq!(actual.dims(), expected.dims());
        let max_diff = (actual - expected)
            .unwrap()
            .abs()
            .unwrap()
            .flatten_all()
            .unwrap()
            .max(0)
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        assert!(max_diff < 1e-4, "max difference {}", max_diff);
    }

    #[test]
    fn test_condition_applies_reference_level() {
        let config = small_config();
        // Unit magnitude is 0 dB, shifted down to -ref_level_db before normalizing
        let mel = Tensor::ones((1, 2, 128), DType::F32, &Device::Cpu).unwrap();
        let c = features::condition(&mel, &config).unwrap();
        let first: f32 = c.i((0, 0, 0)).unwrap().to_scalar().unwrap();
        let expected = 2.0 * config.max_abs_value * (-config.ref_level_db - config.min_level_db)
            / -config.min_level_db
            - config.max_abs_value;
        assert!((first - expected).abs() < 1e-4);
    }

    #[test]
    fn test_mel_features_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = write_checkpoint(dir.path());
        let vocoder = Vocoder::with_options(small_config(), &ckpt, DeviceSelection::Cpu).unwrap();

        let samples: Vec<f32> = (0..4410).map(|i| (i as f32 * 0.05).sin() * 0.3).collect();
        let features = vocoder.mel_features(&samples).unwrap();
        // 11 frames, odd: 5 tail frames
        assert_eq!(features.dims3().unwrap(), (1, 128, 16));
        let values: Vec<f32> = features.flatten_all().unwrap().to_vec1().unwrap();
        assert!(values.iter().all(|v| v.abs() <= 4.0));
    }
}
