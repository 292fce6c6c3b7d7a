//! Audio processing modules
//!
//! - WAV loading with per-channel access
//! - Sample rate conversion
//! - Magnitude STFT and Slaney mel projection (librosa-compatible)
//! - Mel feature normalization for the generator
//! - 16-bit PCM WAV output

pub mod features;
mod loader;
mod mel;
mod output;
mod resampler;

pub use loader::AudioLoader;
pub use mel::MelSpectrogram;
pub use output::{AudioOutput, PCM16_SCALE};
pub use resampler::Resampler;
