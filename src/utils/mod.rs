//! Utility functions and helpers
//!
//! This module provides common utilities used across the crate.

/// Tensor utilities
pub mod tensor_utils {
    use candle_core::{Result, Tensor, D};

    /// Reflection padding along the last dimension
    ///
    /// Mirrors `pad` samples on each side without repeating the edge sample,
    /// so `[a, b, c, d]` padded by 2 becomes `[c, b, a, b, c, d, c, b]`.
    pub fn reflect_pad1d(x: &Tensor, pad: usize) -> Result<Tensor> {
        if pad == 0 {
            return Ok(x.clone());
        }
        let len = x.dim(D::Minus1)?;
        if pad >= len {
            candle_core::bail!("reflection pad {pad} must be smaller than input length {len}");
        }
        let x = &x.contiguous()?;

        let left: Vec<u32> = (1..=pad).rev().map(|i| i as u32).collect();
        let right: Vec<u32> = (len - 1 - pad..len - 1).rev().map(|i| i as u32).collect();

        let left = x.index_select(&Tensor::new(left.as_slice(), x.device())?, D::Minus1)?;
        let right = x.index_select(&Tensor::new(right.as_slice(), x.device())?, D::Minus1)?;
        Tensor::cat(&[&left, x, &right], D::Minus1)
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use candle_core::Device;

        #[test]
        fn test_reflect_pad1d() {
            let x = Tensor::new(&[[[1.0f32, 2.0, 3.0, 4.0]]], &Device::Cpu).unwrap();
            let y = reflect_pad1d(&x, 2).unwrap();
            let values: Vec<f32> = y.flatten_all().unwrap().to_vec1().unwrap();
            assert_eq!(values, vec![3.0, 2.0, 1.0, 2.0, 3.0, 4.0, 3.0, 2.0]);
        }

        #[test]
        fn test_reflect_pad1d_transposed_input() {
            // (1, 4, 2) transposed to a strided (1, 2, 4) view
            let x = Tensor::new(&[[[1.0f32, 5.0], [2.0, 6.0], [3.0, 7.0], [4.0, 8.0]]], &Device::Cpu)
                .unwrap()
                .transpose(1, 2)
                .unwrap();
            assert!(!x.is_contiguous());

            let y = reflect_pad1d(&x, 1).unwrap();
            let rows: Vec<Vec<f32>> = y.squeeze(0).unwrap().to_vec2().unwrap();
            assert_eq!(rows[0], vec![2.0, 1.0, 2.0, 3.0, 4.0, 3.0]);
            assert_eq!(rows[1], vec![6.0, 5.0, 6.0, 7.0, 8.0, 7.0]);
        }

        #[test]
        fn test_reflect_pad1d_too_short() {
            let x = Tensor::new(&[[[1.0f32, 2.0]]], &Device::Cpu).unwrap();
            assert!(reflect_pad1d(&x, 2).is_err());
            assert_eq!(reflect_pad1d(&x, 0).unwrap().dims3().unwrap(), (1, 1, 2));
        }
    }
}
