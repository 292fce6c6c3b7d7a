//! Inference entry points
//!
//! - Vocoder: checkpoint loading, mel-to-waveform synthesis, oracle resynthesis
//! - DeviceSelection: CPU or accelerated execution, fixed per instance

mod device;
mod vocoder;

pub use device::DeviceSelection;
pub use vocoder::Vocoder;
