//! Checkpoint loading diagnostics
//!
//! Checkpoint parameters that don't match the generator are skipped rather
//! than treated as fatal. This report makes that leniency visible: which
//! parameters were taken from the checkpoint, which kept their initial
//! values, and which checkpoint tensors went unused.

use std::collections::{BTreeMap, BTreeSet};

/// Outcome of a tolerant checkpoint load
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Name of the component (e.g., "generator")
    pub component_name: String,
    /// Checkpoint file the parameters came from
    pub file_path: String,
    /// All keys available in the checkpoint
    pub available_keys: BTreeSet<String>,
    /// Parameters the component asked for
    pub expected_keys: BTreeSet<String>,
    /// Parameters loaded from the checkpoint
    pub found_keys: BTreeSet<String>,
    /// Parameters absent from the checkpoint
    pub missing_keys: BTreeSet<String>,
    /// Parameters present with the wrong shape: (checkpoint shape, expected shape)
    pub mismatched_keys: BTreeMap<String, (Vec<usize>, Vec<usize>)>,
    /// Checkpoint keys nothing consumed
    pub extra_keys: BTreeSet<String>,
}

impl LoadReport {
    /// Create an empty report
    pub fn new(component_name: &str, file_path: &str) -> Self {
        Self {
            component_name: component_name.to_string(),
            file_path: file_path.to_string(),
            ..Default::default()
        }
    }

    /// Ratio of loaded parameters to expected parameters
    pub fn success_rate(&self) -> f32 {
        if self.expected_keys.is_empty() {
            return 1.0;
        }
        self.found_keys.len() as f32 / self.expected_keys.len() as f32
    }

    /// True when every expected parameter came from the checkpoint
    pub fn is_complete(&self) -> bool {
        self.missing_keys.is_empty() && self.mismatched_keys.is_empty()
    }

    /// Parameters that kept their initial values
    pub fn skipped(&self) -> usize {
        self.missing_keys.len() + self.mismatched_keys.len()
    }

    /// Log a summary of the load through `tracing`
    pub fn log_summary(&self) {
        tracing::info!(
            "{} checkpoint {}: {}/{} parameters loaded ({:.1}%), {} unused tensors",
            self.component_name,
            self.file_path,
            self.found_keys.len(),
            self.expected_keys.len(),
            self.success_rate() * 100.0,
            self.extra_keys.len()
        );

        if self.is_complete() {
            return;
        }
        tracing::warn!(
            "{}: partial checkpoint load, {} parameters kept their initial values",
            self.component_name,
            self.skipped()
        );
        for key in self.missing_keys.iter().take(10) {
            tracing::warn!("  missing: {}", key);
        }
        if self.missing_keys.len() > 10 {
            tracing::warn!("  ... and {} more", self.missing_keys.len() - 10);
        }
        for (key, (found, expected)) in self.mismatched_keys.iter().take(10) {
            tracing::warn!("  shape mismatch: {} {:?} (expected {:?})", key, found, expected);
        }
    }

    /// Multi-line human readable summary
    pub fn summary(&self) -> String {
        let mut out = format!(
            "=== {} Weight Loading ===\n  File: {}\n  Available in file: {} tensors\n  Expected: {} | Found: {} | Missing: {} | Mismatched: {} | Unused: {}\n",
            self.component_name,
            self.file_path,
            self.available_keys.len(),
            self.expected_keys.len(),
            self.found_keys.len(),
            self.missing_keys.len(),
            self.mismatched_keys.len(),
            self.extra_keys.len()
        );
        for key in &self.missing_keys {
            out.push_str(&format!("  MISSING: {}\n", key));
        }
        for (key, (found, expected)) in &self.mismatched_keys {
            out.push_str(&format!("  MISMATCH: {} {:?} != {:?}\n", key, found, expected));
        }
        for key in &self.extra_keys {
            out.push_str(&format!("  UNUSED: {}\n", key));
        }
        out
    }
}
