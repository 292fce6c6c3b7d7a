//! Debug and diagnostics utilities
//!
//! - Checkpoint load reports (found / missing / mismatched / unused tensors)
//! - NPY loading for externally computed mel spectrograms

mod npy_loader;
mod weight_diagnostics;

pub use npy_loader::{load_npy, load_npy_tensor, NpyArray};
pub use weight_diagnostics::LoadReport;
