//! NPY file loading
//!
//! Reads NumPy `.npy` arrays so externally computed mel spectrograms can be
//! fed to the vocoder from the command line.

use anyhow::{Context, Result};
use candle_core::{Device, Tensor};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// NPY array data
#[derive(Debug, Clone)]
pub struct NpyArray {
    /// Shape of the array
    pub shape: Vec<usize>,
    /// Data type string (e.g., "<f4", "<f8")
    pub dtype: String,
    /// Raw little-endian data bytes in C order
    pub data: Vec<u8>,
}

impl NpyArray {
    /// Total number of elements
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values as f32, widening or narrowing from the stored float type
    pub fn to_f32(&self) -> Result<Vec<f32>> {
        match self.dtype.as_str() {
            "<f4" | "|f4" => Ok(self
                .data
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect()),
            "<f8" | "|f8" => Ok(self
                .data
                .chunks_exact(8)
                .map(|b| {
                    f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f32
                })
                .collect()),
            other => anyhow::bail!("Expected little-endian float32/float64, got {}", other),
        }
    }

    /// Convert to an f32 tensor with the array's shape
    pub fn to_tensor(&self, device: &Device) -> Result<Tensor> {
        let values = self.to_f32()?;
        Tensor::from_vec(values, self.shape.as_slice(), device).map_err(Into::into)
    }
}

/// Load an NPY file
pub fn load_npy<P: AsRef<Path>>(path: P) -> Result<NpyArray> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Failed to open NPY file: {:?}", path))?;
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 6];
    reader.read_exact(&mut magic)?;
    if &magic[..] != b"\x93NUMPY" {
        anyhow::bail!("Invalid NPY magic number in {:?}", path);
    }

    let mut version = [0u8; 2];
    reader.read_exact(&mut version)?;
    let header_len = match version[0] {
        1 => {
            let mut len = [0u8; 2];
            reader.read_exact(&mut len)?;
            u16::from_le_bytes(len) as usize
        }
        2 | 3 => {
            let mut len = [0u8; 4];
            reader.read_exact(&mut len)?;
            u32::from_le_bytes(len) as usize
        }
        v => anyhow::bail!("Unsupported NPY version {}", v),
    };

    let mut header = vec![0u8; header_len];
    reader.read_exact(&mut header)?;
    let header = String::from_utf8_lossy(&header);

    let dtype = parse_dtype(&header)?;
    let shape = parse_shape(&header)?;
    if header_value(&header, "fortran_order").is_some_and(|v| v.starts_with("True")) {
        anyhow::bail!("Fortran-ordered NPY arrays are not supported: {:?}", path);
    }

    let elem_size: usize = dtype
        .get(2..)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| anyhow::anyhow!("Unsupported dtype: {}", dtype))?;
    let byte_len = shape
        .iter()
        .try_fold(elem_size, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| anyhow::anyhow!("NPY shape {:?} overflows in {:?}", shape, path))?;

    let mut data = Vec::new();
    reader
        .take(byte_len as u64)
        .read_to_end(&mut data)
        .with_context(|| format!("Failed to read NPY data in {:?}", path))?;
    if data.len() != byte_len {
        anyhow::bail!(
            "Truncated NPY data in {:?}: expected {} bytes, found {}",
            path,
            byte_len,
            data.len()
        );
    }

    Ok(NpyArray { shape, dtype, data })
}

/// Load an NPY file straight into an f32 tensor
pub fn load_npy_tensor<P: AsRef<Path>>(path: P, device: &Device) -> Result<Tensor> {
    load_npy(path)?.to_tensor(device)
}

/// Text following `'key':` in the header dictionary
fn header_value<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    let start = header
        .find(&format!("'{}'", key))
        .or_else(|| header.find(&format!("\"{}\"", key)))?;
    let rest = &header[start + key.len() + 2..];
    let colon = rest.find(':')?;
    Some(rest[colon + 1..].trim_start())
}

/// Parse dtype from NPY header
fn parse_dtype(header: &str) -> Result<String> {
    let value = header_value(header, "descr").ok_or_else(|| anyhow::anyhow!("No descr in header"))?;
    let quote = value
        .chars()
        .next()
        .filter(|c| *c == '\'' || *c == '"')
        .ok_or_else(|| anyhow::anyhow!("No dtype string"))?;
    let end = value[1..]
        .find(quote)
        .ok_or_else(|| anyhow::anyhow!("Unclosed dtype string"))?;
    Ok(value[1..1 + end].to_string())
}

/// Parse shape from NPY header
fn parse_shape(header: &str) -> Result<Vec<usize>> {
    let value = header_value(header, "shape").ok_or_else(|| anyhow::anyhow!("No shape in header"))?;
    let open = value.find('(').ok_or_else(|| anyhow::anyhow!("No shape tuple"))?;
    let close = value.find(')').ok_or_else(|| anyhow::anyhow!("Unclosed shape tuple"))?;

    value[open + 1..close]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>().with_context(|| format!("Invalid shape element: {}", s)))
        .collect()
}
