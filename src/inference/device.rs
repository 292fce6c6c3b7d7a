//! Compute device selection

use anyhow::Result;
use candle_core::Device;

use crate::error::VocoderError;

/// Which device a vocoder instance runs on, fixed at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceSelection {
    /// Default CPU execution
    #[default]
    Cpu,
    /// CUDA, or Metal when CUDA is absent
    Accelerated,
}

impl DeviceSelection {
    /// Map the boolean "use accelerated device" flag
    pub fn from_flag(accelerated: bool) -> Self {
        if accelerated {
            Self::Accelerated
        } else {
            Self::Cpu
        }
    }

    /// Whether an accelerated device can actually be opened
    pub fn accelerated_available() -> bool {
        Self::open_accelerated().is_some()
    }

    /// CUDA device 0, else Metal device 0
    ///
    /// The `*_is_available` checks only report compiled-in support, so the
    /// device is opened to confirm it exists.
    fn open_accelerated() -> Option<Device> {
        if candle_core::utils::cuda_is_available() {
            match Device::new_cuda(0) {
                Ok(device) => return Some(device),
                Err(e) => tracing::warn!(error = %e, "CUDA device could not be opened"),
            }
        }
        if candle_core::utils::metal_is_available() {
            match Device::new_metal(0) {
                Ok(device) => return Some(device),
                Err(e) => tracing::warn!(error = %e, "Metal device could not be opened"),
            }
        }
        None
    }

    /// Resolve to a concrete device
    ///
    /// `Accelerated` fails with [`VocoderError::DeviceUnavailable`] rather than
    /// silently falling back to the CPU.
    pub fn resolve(self) -> Result<Device> {
        match self {
            Self::Cpu => Ok(Device::Cpu),
            Self::Accelerated => {
                Self::open_accelerated().ok_or_else(|| VocoderError::DeviceUnavailable.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{error_kind, ErrorKind};

    #[test]
    fn test_cpu_always_resolves() {
        assert!(DeviceSelection::Cpu.resolve().unwrap().is_cpu());
        assert_eq!(DeviceSelection::from_flag(false), DeviceSelection::Cpu);
        assert_eq!(DeviceSelection::default(), DeviceSelection::Cpu);
    }

    #[test]
    fn test_accelerated_is_gpu_or_typed_error() {
        match DeviceSelection::from_flag(true).resolve() {
            Ok(device) => assert!(!device.is_cpu()),
            Err(err) => {
                assert_eq!(error_kind(&err), Some(ErrorKind::DeviceUnavailable));
                assert!(!DeviceSelection::accelerated_available());
            }
        }
    }
}
