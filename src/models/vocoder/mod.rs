//! Vocoder module for mel-to-waveform conversion
//!
//! The pretrained GAN generator and its tolerant checkpoint loader.

mod generator;
pub mod weights;

pub use generator::Generator;
pub use weights::{load_checkpoint, ConvWeight, ParamLoader, GENERATOR_KEY};
