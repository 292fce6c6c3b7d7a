//! Mel feature normalization
//!
//! Maps mel magnitudes into the bounded range the generator was trained on:
//! decibels, shifted by the reference level, affinely mapped onto
//! `[-max_abs, max_abs]`, then padded with silence frames.

use candle_core::{DType, Device, Result, Tensor};

use crate::config::VocoderConfig;

/// `20 * log10(max(x, 10^(min_level_db / 20)))`
pub fn amp_to_db(x: &Tensor, min_level_db: f32) -> Result<Tensor> {
    let min_level = 10f64.powf(min_level_db as f64 / 20.0);
    let scale = 20.0 / std::f64::consts::LN_10;
    x.maximum(min_level)?.log()?.affine(scale, 0.0)
}

/// Affine map of `[min_level_db, 0]` dB onto `[-max_abs, max_abs]`, clamped
pub fn normalize(s: &Tensor, min_level_db: f32, max_abs: f32) -> Result<Tensor> {
    let min_db = min_level_db as f64;
    let max_abs = max_abs as f64;
    let mul = 2.0 * max_abs / -min_db;
    s.affine(mul, -mul * min_db - max_abs)?.clamp(-max_abs, max_abs)
}

/// `[batch, frames, mels]` to `[batch, mels, frames + pad]`
///
/// Appends `frames % 2 + 4` frames at the normalized floor (`-max_abs`), the
/// tail the generator saw during training.
pub fn pre(x: &Tensor, max_abs: f32) -> Result<Tensor> {
    let (batch, frames, mels) = x.dims3()?;
    let conditions = x.transpose(1, 2)?;
    let pad_tail = frames % 2 + 4;
    let tail = Tensor::full(-max_abs, (batch, mels, pad_tail), x.device())?.to_dtype(x.dtype())?;
    Tensor::cat(&[&conditions, &tail], 2)?.contiguous()
}

/// Full normalization chain for mel magnitudes laid out `[batch, frames, mels]`
///
/// Returns generator conditioning `[batch, mels, frames']`.
pub fn condition(mel: &Tensor, config: &VocoderConfig) -> Result<Tensor> {
    let db = (amp_to_db(&mel.abs()?, config.min_level_db)? - config.ref_level_db as f64)?;
    let normalized = normalize(&db, config.min_level_db, config.max_abs_value)?;
    pre(&normalized, config.max_abs_value)
}

/// Mel weighting curve as a `[1, 1, 1, mels]` tensor
pub fn mel_weight(config: &VocoderConfig, percent: f32, device: &Device) -> Result<Tensor> {
    let weight = config.mel_weight(percent);
    Tensor::from_vec(weight, (1, 1, 1, config.num_mels), device)?.to_dtype(DType::F32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(t: &Tensor) -> Vec<f32> {
        t.flatten_all().unwrap().to_vec1().unwrap()
    }

    #[test]
    fn test_amp_to_db() {
        let x = Tensor::new(&[1.0f32, 10.0, 0.1, 0.0], &Device::Cpu).unwrap();
        let db = values(&amp_to_db(&x, -115.0).unwrap());
        assert!(db[0].abs() < 1e-4);
        assert!((db[1] - 20.0).abs() < 1e-4);
        assert!((db[2] + 20.0).abs() < 1e-4);
        // Zero is floored at min_level_db
        assert!((db[3] + 115.0).abs() < 1e-3);
    }

    #[test]
    fn test_normalize_range() {
        let s = Tensor::new(&[-115.0f32, -57.5, 0.0, -200.0, 30.0], &Device::Cpu).unwrap();
        let n = values(&normalize(&s, -115.0, 4.0).unwrap());
        assert!((n[0] + 4.0).abs() < 1e-5);
        assert!(n[1].abs() < 1e-5);
        assert!((n[2] - 4.0).abs() < 1e-5);
        assert_eq!(n[3], -4.0);
        assert_eq!(n[4], 4.0);
    }

    #[test]
    fn test_pre_pads_and_transposes() {
        let x = Tensor::ones((2, 5, 3), DType::F32, &Device::Cpu).unwrap();
        let y = pre(&x, 4.0).unwrap();
        // 5 frames: 5 % 2 + 4 = 5 padding frames
        assert_eq!(y.dims3().unwrap(), (2, 3, 10));

        let row: Vec<f32> = y.get(0).unwrap().get(0).unwrap().to_vec1().unwrap();
        assert_eq!(&row[..5], &[1.0; 5]);
        assert_eq!(&row[5..], &[-4.0; 5]);

        let even = Tensor::ones((1, 4, 3), DType::F32, &Device::Cpu).unwrap();
        assert_eq!(pre(&even, 4.0).unwrap().dims3().unwrap(), (1, 3, 8));
    }

    #[test]
    fn test_pre_output_feeds_reflection_pad() {
        let x = Tensor::randn(0.0f32, 1.0, (2, 9, 6), &Device::Cpu).unwrap();
        let y = pre(&x, 4.0).unwrap();
        assert!(y.is_contiguous());

        let padded = crate::utils::tensor_utils::reflect_pad1d(&y, 3).unwrap();
        assert_eq!(padded.dims3().unwrap(), (2, 6, 14 + 6));
    }

    #[test]
    fn test_condition_bounded() {
        let config = VocoderConfig::for_sample_rate(44100).unwrap();
        let mel = Tensor::randn(0.0f32, 100.0, (1, 7, 128), &Device::Cpu).unwrap();
        let c = condition(&mel, &config).unwrap();
        assert_eq!(c.dims3().unwrap(), (1, 128, 12));
        assert!(values(&c).iter().all(|v| v.abs() <= 4.0 && v.is_finite()));
    }

    #[test]
    fn test_mel_weight_tensor_shape() {
        let config = VocoderConfig::for_sample_rate(44100).unwrap();
        let w = mel_weight(&config, 1.0, &Device::Cpu).unwrap();
        assert_eq!(w.dims(), &[1, 1, 1, 128]);
    }
}
