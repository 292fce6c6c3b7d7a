//! # Neural Vocoder
//!
//! Inference wrapper around a pretrained GAN mel-spectrogram vocoder.
//!
//! ## Features
//!
//! - Mel spectrogram batches to raw waveforms
//! - Round-trip "oracle" resynthesis of wave files for sanity checks
//! - Tolerant checkpoint loading with a coverage report
//! - CPU or GPU inference via Candle
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use neural_vocoder::Vocoder;
//!
//! let vocoder = Vocoder::new(44100, "checkpoints/model.ckpt-1490000_trimed.pt")?;
//! let wav = vocoder.synthesize(&mel)?; // mel: (batch, 1, frames, 128)
//! vocoder.oracle("input.wav", "resynthesized.wav")?;
//! ```

#![warn(missing_docs)]

pub mod audio;
pub mod config;
pub mod debug;
pub mod error;
pub mod inference;
pub mod models;
pub mod utils;

// Re-exports for convenience
pub use config::{GeneratorConfig, VocoderConfig, MEL_BINS};
pub use debug::LoadReport;
pub use error::{error_kind, ErrorKind, VocoderError};
pub use inference::{DeviceSelection, Vocoder};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Sample rate of the pretrained checkpoint
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;
