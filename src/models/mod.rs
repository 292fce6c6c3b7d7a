//! Neural network models
//!
//! - GAN vocoder generator (mel spectrogram to waveform)

pub mod vocoder;

// Re-exports
pub use vocoder::Generator;
