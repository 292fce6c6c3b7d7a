//! Typed errors surfaced by the vocoder
//!
//! Library functions return `anyhow::Result`; callers that need to branch on
//! the failure class downcast to [`VocoderError`] and inspect [`VocoderError::kind`].

use std::path::PathBuf;
use thiserror::Error;

/// Manual download location for the pretrained 44.1 kHz checkpoint
pub const CHECKPOINT_DOWNLOAD_URL: &str =
    "https://zenodo.org/record/5600188/files/model.ckpt-1490000_trimed.pt?download=1";

/// Broad failure class of a [`VocoderError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing resources or an unusable configuration
    Configuration,
    /// Caller-supplied input violates a precondition
    Validation,
    /// Accelerated device requested but absent
    DeviceUnavailable,
}

/// Vocoder error taxonomy
#[derive(Error, Debug, Clone)]
pub enum VocoderError {
    /// Checkpoint file does not exist
    #[error(
        "Vocoder checkpoint not found at {path:?}. The checkpoint is normally downloaded \
         ahead of time; you can also fetch it manually from {url} and place it at that path.",
        url = CHECKPOINT_DOWNLOAD_URL
    )]
    CheckpointNotFound {
        /// Expected checkpoint location
        path: PathBuf,
    },

    /// No preset exists for the requested sample rate
    #[error("Unsupported sample rate {0} Hz (the pretrained vocoder supports 44100 Hz)")]
    UnsupportedSampleRate(u32),

    /// Configuration values are inconsistent
    #[error("Invalid vocoder configuration: {0}")]
    InvalidConfig(String),

    /// Mel input does not have the expected shape
    #[error(
        "Expected a mel spectrogram of shape [batch, 1, frames, {expected}], got {shape:?}"
    )]
    InvalidMelShape {
        /// Required size of the last dimension
        expected: usize,
        /// Shape actually received
        shape: Vec<usize>,
    },

    /// Waveform has zero peak amplitude and cannot be peak-normalized
    #[error("Input audio {path:?} is silent (peak amplitude is zero)")]
    SilentInput {
        /// Source file
        path: PathBuf,
    },

    /// Accelerated device requested but none is present
    #[error("Accelerated device requested but no CUDA or Metal device is available")]
    DeviceUnavailable,
}

impl VocoderError {
    /// Failure class of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CheckpointNotFound { .. }
            | Self::UnsupportedSampleRate(_)
            | Self::InvalidConfig(_) => ErrorKind::Configuration,
            Self::InvalidMelShape { .. } | Self::SilentInput { .. } => ErrorKind::Validation,
            Self::DeviceUnavailable => ErrorKind::DeviceUnavailable,
        }
    }
}

/// Failure class of an `anyhow` error, if it wraps a [`VocoderError`]
pub fn error_kind(err: &anyhow::Error) -> Option<ErrorKind> {
    err.downcast_ref::<VocoderError>().map(VocoderError::kind)
}
