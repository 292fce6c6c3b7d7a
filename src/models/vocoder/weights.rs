//! Generator checkpoint loading
//!
//! Reads the generator's state dict from a safetensors file or a PyTorch
//! archive and hands tensors out by parameter name. Loading is tolerant:
//! parameters the checkpoint lacks, or stores with a different shape, keep
//! their initial values and are recorded in a [`LoadReport`].

use anyhow::{Context, Result};
use candle_core::{pickle, safetensors, DType, Device, Tensor};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::debug::LoadReport;

/// Sub-dictionary of the training checkpoint holding generator weights
pub const GENERATOR_KEY: &str = "generator";

/// Read all generator tensors from a checkpoint as f32 on `device`
///
/// `.safetensors` files may store keys flat or under a `generator.` prefix;
/// anything else is read as a PyTorch pickle archive, preferring the
/// `generator` entry and falling back to the root state dict.
pub fn load_checkpoint<P: AsRef<Path>>(path: P, device: &Device) -> Result<HashMap<String, Tensor>> {
    let path = path.as_ref();
    tracing::info!("Loading generator checkpoint from {:?}", path);

    let is_safetensors = path.extension().is_some_and(|e| e == "safetensors");
    let raw: Vec<(String, Tensor)> = if is_safetensors {
        let tensors = safetensors::load(path, device)
            .with_context(|| format!("Failed to load safetensors checkpoint {:?}", path))?;
        let prefix = format!("{}.", GENERATOR_KEY);
        if tensors.keys().any(|k| k.starts_with(&prefix)) {
            tensors
                .into_iter()
                .filter_map(|(k, t)| k.strip_prefix(&prefix).map(|s| (s.to_string(), t)))
                .collect()
        } else {
            tensors.into_iter().collect()
        }
    } else {
        match pickle::read_all_with_key(path, Some(GENERATOR_KEY)) {
            Ok(tensors) if !tensors.is_empty() => tensors,
            _ => {
                tracing::debug!("No '{}' entry in {:?}, reading root state dict", GENERATOR_KEY, path);
                pickle::read_all_with_key(path, None)
                    .with_context(|| format!("Failed to read PyTorch checkpoint {:?}", path))?
            }
        }
    };

    let mut tensors = HashMap::with_capacity(raw.len());
    for (name, tensor) in raw {
        let name = name.strip_prefix("module.").map(str::to_string).unwrap_or(name);
        let tensor = tensor.to_dtype(DType::F32)?.to_device(device)?;
        tensors.insert(name, tensor);
    }

    tracing::info!("Loaded {} tensors", tensors.len());
    Ok(tensors)
}

/// Weight-normalised convolution: `w = g * v / ||v||` with the norm taken
/// over every dimension but the first
pub fn apply_weight_norm(weight_g: &Tensor, weight_v: &Tensor) -> candle_core::Result<Tensor> {
    let rows = weight_v.dim(0)?;
    let mut norm_shape = vec![1usize; weight_v.rank()];
    norm_shape[0] = rows;

    let norm = weight_v
        .flatten_from(1)?
        .sqr()?
        .sum_keepdim(1)?
        .sqrt()?
        .clamp(1e-12, f64::MAX)?
        .reshape(norm_shape.as_slice())?;
    let g = weight_g.reshape(norm_shape.as_slice())?;
    g.broadcast_mul(&weight_v.broadcast_div(&norm)?)
}

/// Convolution kernel, either plain or still in weight-norm form
#[derive(Debug, Clone)]
pub enum ConvWeight {
    /// Inference-ready weight
    Plain(Tensor),
    /// Magnitude/direction pair from training
    Normalized {
        /// Per-row magnitude
        g: Tensor,
        /// Direction
        v: Tensor,
    },
}

impl ConvWeight {
    /// Effective kernel
    pub fn weight(&self) -> candle_core::Result<Tensor> {
        match self {
            Self::Plain(w) => Ok(w.clone()),
            Self::Normalized { g, v } => apply_weight_norm(g, v),
        }
    }

    /// Whether the kernel is still reparameterized
    pub fn is_normalized(&self) -> bool {
        matches!(self, Self::Normalized { .. })
    }

    /// Replace the `(g, v)` pair with its plain weight; returns true if it changed
    pub fn remove_weight_norm(&mut self) -> candle_core::Result<bool> {
        if let Self::Normalized { g, v } = self {
            *self = Self::Plain(apply_weight_norm(g, v)?);
            return Ok(true);
        }
        Ok(false)
    }
}

/// Hands checkpoint tensors to the generator by name, tracking coverage
pub struct ParamLoader {
    tensors: HashMap<String, Tensor>,
    consumed: HashSet<String>,
    report: LoadReport,
    device: Device,
}

impl ParamLoader {
    /// Wrap tensors read from `source`
    pub fn new(tensors: HashMap<String, Tensor>, source: &str, device: &Device) -> Self {
        let mut report = LoadReport::new(GENERATOR_KEY, source);
        report.available_keys = tensors.keys().cloned().collect();
        Self {
            tensors,
            consumed: HashSet::new(),
            report,
            device: device.clone(),
        }
    }

    /// Loader with no checkpoint; every parameter is initialized
    #[cfg(test)]
    pub(crate) fn empty(device: &Device) -> Self {
        Self::new(HashMap::new(), "<none>", device)
    }

    /// Read a checkpoint file and wrap it
    pub fn from_checkpoint<P: AsRef<Path>>(path: P, device: &Device) -> Result<Self> {
        let tensors = load_checkpoint(path.as_ref(), device)?;
        Ok(Self::new(tensors, &path.as_ref().display().to_string(), device))
    }

    /// Device tensors are placed on
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Take `key` if present with a compatible element layout
    ///
    /// Returns `Err(found_shape)` when the key exists with the wrong shape.
    fn take(&mut self, key: &str, shape: &[usize]) -> Option<std::result::Result<Tensor, Vec<usize>>> {
        let tensor = self.tensors.get(key)?;
        self.consumed.insert(key.to_string());
        if tensor.dims() == shape {
            return Some(Ok(tensor.clone()));
        }
        Some(Err(tensor.dims().to_vec()))
    }

    fn record(&mut self, name: &str, outcome: Option<std::result::Result<(), Vec<usize>>>, shape: &[usize]) {
        self.report.expected_keys.insert(name.to_string());
        match outcome {
            Some(Ok(())) => {
                self.report.found_keys.insert(name.to_string());
            }
            Some(Err(found)) => {
                self.report
                    .mismatched_keys
                    .insert(name.to_string(), (found, shape.to_vec()));
            }
            None => {
                self.report.missing_keys.insert(name.to_string());
            }
        }
    }

    /// Bias (or any plain vector); zeros when absent
    pub fn bias(&mut self, prefix: &str, len: usize) -> Result<Tensor> {
        let name = format!("{}.bias", prefix);
        let shape = [len];
        match self.take(&name, &shape) {
            Some(Ok(t)) => {
                self.record(&name, Some(Ok(())), &shape);
                Ok(t)
            }
            other => {
                self.record(&name, other.map(|r| r.map(|_| ())), &shape);
                Ok(Tensor::zeros(len, DType::F32, &self.device)?)
            }
        }
    }

    /// Convolution kernel of `shape`, accepting `weight_g`/`weight_v` or `weight`
    ///
    /// Falls back to a normal(0, 0.02) initialization when neither form fits.
    pub fn conv_weight(&mut self, prefix: &str, shape: &[usize]) -> Result<ConvWeight> {
        let name = format!("{}.weight", prefix);
        let g_key = format!("{}.weight_g", prefix);
        let v_key = format!("{}.weight_v", prefix);

        if self.tensors.contains_key(&v_key) && self.tensors.contains_key(&g_key) {
            let v = self.take(&v_key, shape);
            let g = self.tensors.get(&g_key).cloned();
            self.consumed.insert(g_key.clone());
            match (v, g) {
                (Some(Ok(v)), Some(g)) if g.elem_count() == shape[0] => {
                    self.record(&name, Some(Ok(())), shape);
                    return Ok(ConvWeight::Normalized { g, v });
                }
                (Some(Err(found)), _) => self.record(&name, Some(Err(found)), shape),
                (_, Some(g)) => self.record(&name, Some(Err(g.dims().to_vec())), shape),
                _ => self.record(&name, None, shape),
            }
        } else {
            let outcome = self.take(&name, shape);
            match outcome {
                Some(Ok(w)) => {
                    self.record(&name, Some(Ok(())), shape);
                    return Ok(ConvWeight::Plain(w));
                }
                other => self.record(&name, other.map(|r| r.map(|_| ())), shape),
            }
        }

        let init = Tensor::randn(0.0f32, 0.02, shape, &self.device)?;
        Ok(ConvWeight::Plain(init))
    }

    /// Finish loading: unused checkpoint keys become `extra_keys`
    pub fn finish(mut self) -> LoadReport {
        self.report.extra_keys = self
            .tensors
            .keys()
            .filter(|k| !self.consumed.contains(*k))
            .cloned()
            .collect();
        self.report
    }
}
