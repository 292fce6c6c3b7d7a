//! Mel spectrogram computation
//!
//! Matches librosa's defaults for `stft(center=True, pad_mode="reflect")`
//! followed by `filters.mel(htk=False, norm="slaney")`: magnitudes, not power.

use anyhow::Result;
use rustfft::{num_complex::Complex, FftPlanner};
use std::f32::consts::PI;

use crate::config::VocoderConfig;

/// Magnitude STFT + mel projection
pub struct MelSpectrogram {
    /// FFT size
    pub n_fft: usize,
    /// Hop length
    pub hop_length: usize,
    /// Window length
    pub win_length: usize,
    /// Number of mel bands
    pub n_mels: usize,
    /// Sample rate
    pub sample_rate: u32,
    /// Minimum frequency
    pub fmin: f32,
    /// Maximum frequency
    pub fmax: f32,
    /// Mel filterbank, `[n_mels][n_fft / 2 + 1]`
    mel_filters: Vec<Vec<f32>>,
    /// Hann window zero-padded to `n_fft`
    window: Vec<f32>,
}

impl MelSpectrogram {
    /// Create a new mel spectrogram computer
    pub fn new(
        n_fft: usize,
        hop_length: usize,
        win_length: usize,
        n_mels: usize,
        sample_rate: u32,
        fmin: f32,
        fmax: f32,
    ) -> Self {
        let window = Self::padded_hann_window(win_length.min(n_fft), n_fft);
        let mel_filters = Self::mel_filterbank(n_fft, n_mels, sample_rate, fmin, fmax);

        Self {
            n_fft,
            hop_length,
            win_length,
            n_mels,
            sample_rate,
            fmin,
            fmax,
            mel_filters,
            window,
        }
    }

    /// Analysis settings the vocoder was trained with
    pub fn from_config(config: &VocoderConfig) -> Self {
        Self::new(
            config.n_fft,
            config.hop_length,
            config.win_size(),
            config.num_mels,
            config.sample_rate,
            config.fmin,
            config.fmax,
        )
    }

    /// Number of frames produced for `num_samples` input samples
    pub fn num_frames(&self, num_samples: usize) -> usize {
        num_samples / self.hop_length + 1
    }

    /// Mel magnitudes, `[frames][n_mels]`
    pub fn compute(&self, audio: &[f32]) -> Result<Vec<Vec<f32>>> {
        let stft = self.magnitude_stft(audio)?;
        Ok(self.apply_mel_filters(&stft))
    }

    /// Centered magnitude STFT, `[frames][n_fft / 2 + 1]`
    pub fn magnitude_stft(&self, audio: &[f32]) -> Result<Vec<Vec<f32>>> {
        if audio.is_empty() {
            anyhow::bail!("Cannot compute a spectrogram of empty audio");
        }

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(self.n_fft);

        let pad = self.n_fft / 2;
        let padded: Vec<f32> = (0..audio.len() + 2 * pad)
            .map(|i| audio[reflect_index(i as isize - pad as isize, audio.len())])
            .collect();

        let num_frames = self.num_frames(audio.len());
        let n_bins = self.n_fft / 2 + 1;
        let mut frames = Vec::with_capacity(num_frames);
        let mut buffer = vec![Complex::new(0.0f32, 0.0); self.n_fft];

        for i in 0..num_frames {
            let start = i * self.hop_length;
            for (j, slot) in buffer.iter_mut().enumerate() {
                *slot = Complex::new(padded[start + j] * self.window[j], 0.0);
            }
            fft.process(&mut buffer);
            frames.push(buffer[..n_bins].iter().map(|c| c.norm()).collect());
        }

        Ok(frames)
    }

    /// Project spectrogram frames onto the mel filterbank
    pub fn apply_mel_filters(&self, spec: &[Vec<f32>]) -> Vec<Vec<f32>> {
        spec.iter()
            .map(|frame| {
                self.mel_filters
                    .iter()
                    .map(|filter| filter.iter().zip(frame).map(|(f, p)| f * p).sum())
                    .collect()
            })
            .collect()
    }

    /// Mel filterbank, `[n_mels][n_fft / 2 + 1]`
    pub fn filters(&self) -> &[Vec<f32>] {
        &self.mel_filters
    }

    /// Periodic Hann window of `win_length`, centered in `n_fft` zeros
    fn padded_hann_window(win_length: usize, n_fft: usize) -> Vec<f32> {
        let offset = (n_fft - win_length) / 2;
        let mut window = vec![0.0; n_fft];
        for i in 0..win_length {
            window[offset + i] = 0.5 * (1.0 - (2.0 * PI * i as f32 / win_length as f32).cos());
        }
        window
    }

    /// Hz to mel, Slaney scale (linear below 1 kHz, logarithmic above)
    fn hz_to_mel(hz: f32) -> f32 {
        const F_SP: f32 = 200.0 / 3.0;
        const MIN_LOG_HZ: f32 = 1000.0;
        let min_log_mel = MIN_LOG_HZ / F_SP;
        let logstep = 6.4f32.ln() / 27.0;

        if hz >= MIN_LOG_HZ {
            min_log_mel + (hz / MIN_LOG_HZ).ln() / logstep
        } else {
            hz / F_SP
        }
    }

    /// Mel to Hz, Slaney scale
    fn mel_to_hz(mel: f32) -> f32 {
        const F_SP: f32 = 200.0 / 3.0;
        const MIN_LOG_HZ: f32 = 1000.0;
        let min_log_mel = MIN_LOG_HZ / F_SP;
        let logstep = 6.4f32.ln() / 27.0;

        if mel >= min_log_mel {
            MIN_LOG_HZ * (logstep * (mel - min_log_mel)).exp()
        } else {
            mel * F_SP
        }
    }

    /// Triangular filters with Slaney area normalization
    fn mel_filterbank(n_fft: usize, n_mels: usize, sr: u32, fmin: f32, fmax: f32) -> Vec<Vec<f32>> {
        let n_freqs = n_fft / 2 + 1;
        let fft_freqs: Vec<f32> = (0..n_freqs)
            .map(|i| i as f32 * sr as f32 / n_fft as f32)
            .collect();

        let mel_min = Self::hz_to_mel(fmin);
        let mel_max = Self::hz_to_mel(fmax);
        let mel_f: Vec<f32> = (0..n_mels + 2)
            .map(|i| Self::mel_to_hz(mel_min + (mel_max - mel_min) * i as f32 / (n_mels + 1) as f32))
            .collect();

        (0..n_mels)
            .map(|i| {
                let (left, center, right) = (mel_f[i], mel_f[i + 1], mel_f[i + 2]);
                let enorm = 2.0 / (right - left);
                fft_freqs
                    .iter()
                    .map(|&freq| {
                        let lower = (freq - left) / (center - left);
                        let upper = (right - freq) / (right - center);
                        lower.min(upper).max(0.0) * enorm
                    })
                    .collect()
            })
            .collect()
    }
}

/// Index into `len` samples with reflection at both edges (no edge repeat)
fn reflect_index(i: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let period = 2 * (len as isize - 1);
    let mut i = i.rem_euclid(period);
    if i >= len as isize {
        i = period - i;
    }
    i as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sr: u32, secs: f32) -> Vec<f32> {
        (0..(sr as f32 * secs) as usize)
            .map(|i| (2.0 * PI * freq * i as f32 / sr as f32).sin())
            .collect()
    }

    #[test]
    fn test_reflect_index() {
        let idx: Vec<usize> = (-3..7).map(|i| reflect_index(i, 4)).collect();
        assert_eq!(idx, vec![3, 2, 1, 0, 1, 2, 3, 2, 1, 0]);
        assert_eq!(reflect_index(-5, 1), 0);
    }

    #[test]
    fn test_slaney_scale_roundtrip() {
        for hz in [0.0f32, 50.0, 700.0, 1000.0, 4000.0, 22000.0] {
            let back = MelSpectrogram::mel_to_hz(MelSpectrogram::hz_to_mel(hz));
            assert!((back - hz).abs() < 0.05 * hz.max(1.0), "{} -> {}", hz, back);
        }
        assert!((MelSpectrogram::hz_to_mel(1000.0) - 15.0).abs() < 1e-4);
    }

    #[test]
    fn test_frame_count_matches_centered_stft() {
        let config = VocoderConfig::for_sample_rate(44100).unwrap();
        let mel = MelSpectrogram::from_config(&config);
        let audio = sine(440.0, 44100, 0.5);

        let spec = mel.compute(&audio).unwrap();
        assert_eq!(spec.len(), audio.len() / 441 + 1);
        assert_eq!(spec[0].len(), 128);
    }

    #[test]
    fn test_sine_energy_lands_in_matching_band() {
        let config = VocoderConfig::for_sample_rate(44100).unwrap();
        let mel = MelSpectrogram::from_config(&config);
        let stft = mel.magnitude_stft(&sine(1000.0, 44100, 0.2)).unwrap();

        let mid = &stft[stft.len() / 2];
        let peak_bin = mid
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        let peak_hz = peak_bin as f32 * 44100.0 / 2048.0;
        assert!((peak_hz - 1000.0).abs() < 44100.0 / 2048.0);
    }

    #[test]
    fn test_filterbank_shape_and_nonnegative() {
        let mel = MelSpectrogram::new(2048, 441, 2048, 128, 44100, 50.0, 22000.0);
        assert_eq!(mel.filters().len(), 128);
        assert_eq!(mel.filters()[0].len(), 1025);
        for filter in mel.filters() {
            assert!(filter.iter().all(|&w| w >= 0.0));
            assert!(filter.iter().any(|&w| w > 0.0));
        }
    }

    #[test]
    fn test_empty_audio_rejected() {
        let mel = MelSpectrogram::new(2048, 441, 2048, 128, 44100, 50.0, 22000.0);
        assert!(mel.compute(&[]).is_err());
    }
}
