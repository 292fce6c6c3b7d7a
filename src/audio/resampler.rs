//! Audio resampling using rubato

use anyhow::Result;
use rubato::{
    Resampler as RubatoResampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType,
    WindowFunction,
};

/// Audio resampler
pub struct Resampler;

impl Resampler {
    /// Resample a single channel from one sample rate to another
    ///
    /// The filter delay is trimmed so the output lines up with the input and
    /// holds `round(len * to_sr / from_sr)` samples.
    pub fn resample(samples: &[f32], from_sr: u32, to_sr: u32) -> Result<Vec<f32>> {
        if from_sr == to_sr || samples.is_empty() {
            return Ok(samples.to_vec());
        }

        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };

        let ratio = to_sr as f64 / from_sr as f64;
        let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, samples.len(), 1)?;
        let delay = resampler.output_delay();

        let mut output = resampler.process(&[samples], None)?.remove(0);
        let tail = resampler.process_partial(None::<&[Vec<f32>]>, None)?.remove(0);
        output.extend(tail);

        let expected = (samples.len() as f64 * ratio).round() as usize;
        Ok(output.into_iter().skip(delay).take(expected).collect())
    }
}
