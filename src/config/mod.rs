//! Vocoder configuration
//!
//! Sample-rate keyed STFT/mel analysis constants and generator sizing.

mod vocoder_config;

pub use vocoder_config::{GeneratorConfig, VocoderConfig, MEL_BINS};
