//! Configuration types for the pretrained mel vocoder

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::VocoderError;

/// Number of mel bins the pretrained generator consumes
pub const MEL_BINS: usize = 128;

/// Generator network sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Input (conditioning) channels, equal to the number of mel bins
    pub in_channels: usize,

    /// Hidden channels after the input convolution
    pub channels: usize,

    /// Upsampling factor per stage; the product equals the hop length
    pub upsample_scales: Vec<usize>,

    /// Residual blocks per upsampling stage
    pub resstack_depth: Vec<usize>,

    /// Output waveform channels
    #[serde(default = "default_out_channels")]
    pub out_channels: usize,
}

fn default_out_channels() -> usize {
    1
}

impl GeneratorConfig {
    /// Total upsampling factor (samples per mel frame)
    pub fn upsample_factor(&self) -> usize {
        self.upsample_scales.iter().product()
    }
}

/// Immutable analysis and model configuration for one sample rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocoderConfig {
    /// Audio sample rate
    pub sample_rate: u32,

    /// FFT size
    pub n_fft: usize,

    /// Hop length between frames
    pub hop_length: usize,

    /// Analysis window length (defaults to `n_fft`)
    #[serde(default)]
    pub win_size: Option<usize>,

    /// Number of mel bands
    pub num_mels: usize,

    /// Lowest mel filter frequency
    pub fmin: f32,

    /// Highest mel filter frequency
    pub fmax: f32,

    /// Decibel floor, also the lower edge of normalization
    pub min_level_db: f32,

    /// Reference level subtracted after decibel conversion
    pub ref_level_db: f32,

    /// Normalized features are clamped to `[-max_abs_value, max_abs_value]`
    pub max_abs_value: f32,

    /// Mel energy weighting curve `a * exp(b * i)`
    pub mel_weight_a: f32,
    /// See `mel_weight_a`
    pub mel_weight_b: f32,

    /// Generator sizing
    pub generator: GeneratorConfig,
}

impl VocoderConfig {
    /// Preset for the given sample rate
    pub fn for_sample_rate(sample_rate: u32) -> Result<Self> {
        match sample_rate {
            44100 => Ok(Self::sr_44100()),
            other => Err(VocoderError::UnsupportedSampleRate(other).into()),
        }
    }

    fn sr_44100() -> Self {
        Self {
            sample_rate: 44100,
            n_fft: 2048,
            hop_length: 441,
            win_size: None,
            num_mels: MEL_BINS,
            fmin: 50.0,
            fmax: 22000.0,
            min_level_db: -115.0,
            ref_level_db: 20.0,
            max_abs_value: 4.0,
            mel_weight_a: 18.892_741,
            mel_weight_b: 0.026_986_36,
            generator: GeneratorConfig {
                in_channels: MEL_BINS,
                channels: 768,
                upsample_scales: vec![7, 7, 3, 3],
                resstack_depth: vec![8, 8, 8, 8],
                out_channels: 1,
            },
        }
    }

    /// Load a configuration from a YAML file and validate it
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| "Failed to parse vocoder config YAML")?;
        config.validate()?;
        Ok(config)
    }

    /// Effective analysis window length
    pub fn win_size(&self) -> usize {
        self.win_size.unwrap_or(self.n_fft)
    }

    /// Check internal consistency
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| -> anyhow::Error { VocoderError::InvalidConfig(msg).into() };

        if self.num_mels != MEL_BINS {
            return Err(invalid(format!("num_mels must be {}, got {}", MEL_BINS, self.num_mels)));
        }
        if self.generator.in_channels != self.num_mels {
            return Err(invalid(format!(
                "generator.in_channels ({}) must equal num_mels ({})",
                self.generator.in_channels, self.num_mels
            )));
        }
        if self.n_fft == 0 || self.hop_length == 0 {
            return Err(invalid("n_fft and hop_length must be non-zero".to_string()));
        }
        if self.win_size() == 0 || self.win_size() > self.n_fft {
            return Err(invalid(format!(
                "win_size ({}) must be in 1..={}",
                self.win_size(),
                self.n_fft
            )));
        }
        if self.fmin < 0.0 || self.fmin >= self.fmax {
            return Err(invalid(format!("fmin ({}) must be below fmax ({})", self.fmin, self.fmax)));
        }
        if self.fmax > self.sample_rate as f32 / 2.0 {
            return Err(invalid(format!(
                "fmax ({}) exceeds Nyquist ({})",
                self.fmax,
                self.sample_rate as f32 / 2.0
            )));
        }
        if self.min_level_db >= 0.0 {
            return Err(invalid("min_level_db must be negative".to_string()));
        }
        if self.max_abs_value <= 0.0 {
            return Err(invalid("max_abs_value must be positive".to_string()));
        }

        let g = &self.generator;
        if g.upsample_scales.is_empty() || g.upsample_scales.contains(&0) {
            return Err(invalid("upsample_scales must be non-empty and non-zero".to_string()));
        }
        if g.upsample_scales.len() != g.resstack_depth.len() {
            return Err(invalid(format!(
                "upsample_scales ({}) and resstack_depth ({}) differ in length",
                g.upsample_scales.len(),
                g.resstack_depth.len()
            )));
        }
        if g.upsample_factor() != self.hop_length {
            return Err(invalid(format!(
                "product of upsample_scales ({}) must equal hop_length ({})",
                g.upsample_factor(),
                self.hop_length
            )));
        }
        if g.out_channels == 0 || g.channels >> g.upsample_scales.len() == 0 {
            return Err(invalid(format!(
                "channels ({}) cannot be halved over {} upsampling stages",
                g.channels,
                g.upsample_scales.len()
            )));
        }

        Ok(())
    }

    /// Mel weighting curve covering `percent` of the energy-weighted range
    pub fn mel_weight(&self, percent: f32) -> Vec<f32> {
        let b = percent * self.mel_weight_b;
        (0..self.num_mels)
            .map(|i| self.mel_weight_a * (b * i as f32).exp())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{error_kind, ErrorKind};

    #[test]
    fn test_preset_44100() {
        let config = VocoderConfig::for_sample_rate(44100).unwrap();
        assert_eq!(config.hop_length, 441);
        assert_eq!(config.n_fft, 2048);
        assert_eq!(config.win_size(), 2048);
        assert_eq!(config.num_mels, 128);
        assert_eq!(config.generator.upsample_factor(), 441);
        config.validate().unwrap();
    }

    #[test]
    fn test_unsupported_rate() {
        let err = VocoderConfig::for_sample_rate(16000).unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::Configuration));
    }

    #[test]
    fn test_validate_rejects_hop_mismatch() {
        let mut config = VocoderConfig::for_sample_rate(44100).unwrap();
        config.generator.upsample_scales = vec![7, 7, 3, 2];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("hop_length"));
    }

    #[test]
    fn test_validate_rejects_wrong_mel_count() {
        let mut config = VocoderConfig::for_sample_rate(44100).unwrap();
        config.num_mels = 80;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mel_weight_curve() {
        let config = VocoderConfig::for_sample_rate(44100).unwrap();
        let weight = config.mel_weight(1.0);
        assert_eq!(weight.len(), 128);
        assert!((weight[0] - 18.8927).abs() < 1e-3);
        assert!(weight.windows(2).all(|w| w[1] > w[0]));

        let flat = config.mel_weight(0.0);
        assert!(flat.iter().all(|&w| (w - 18.8927).abs() < 1e-3));
    }

    #[test]
    fn test_yaml_roundtrip_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocoder.yaml");
        let config = VocoderConfig::for_sample_rate(44100).unwrap();
        std::fs::write(&path, serde_yaml::to_string(&config).unwrap()).unwrap();

        let loaded = VocoderConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
