//! GAN mel-to-waveform generator
//!
//! MelGAN-style architecture:
//! - Input conditioning: (batch, mel_channels, frames)
//! - Reflection-padded input convolution
//! - Per stage: LeakyReLU, transposed convolution (upsample by `s`), residual stack
//! - Reflection-padded output convolution and tanh
//! - Output waveform: (batch, 1, frames * prod(upsample_scales))
//!
//! All convolutions are trained with weight normalization; call
//! [`Generator::remove_weight_norm`] before inference to fold them.

use anyhow::Result;
use candle_core::{Device, Tensor};
use candle_nn::{ops::leaky_relu, Module};

use super::weights::{ConvWeight, ParamLoader};
use crate::config::GeneratorConfig;
use crate::utils::tensor_utils::reflect_pad1d;

const LRELU_SLOPE: f64 = 0.2;

/// Reflection padding, falling back to zeros when the signal is shorter than the pad
fn pad1d(x: &Tensor, pad: usize) -> candle_core::Result<Tensor> {
    let len = x.dim(candle_core::D::Minus1)?;
    if pad < len {
        reflect_pad1d(x, pad)
    } else {
        x.pad_with_zeros(candle_core::D::Minus1, pad, pad)
    }
}

/// Weight-normalised 1D convolution (no implicit padding)
struct WnConv1d {
    weight: ConvWeight,
    bias: Tensor,
    dilation: usize,
}

impl WnConv1d {
    fn load(
        loader: &mut ParamLoader,
        prefix: &str,
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        dilation: usize,
    ) -> Result<Self> {
        let weight = loader.conv_weight(prefix, &[out_channels, in_channels, kernel_size])?;
        let bias = loader.bias(prefix, out_channels)?;
        Ok(Self { weight, bias, dilation })
    }

    fn remove_weight_norm(&mut self) -> candle_core::Result<bool> {
        self.weight.remove_weight_norm()
    }
}

impl Module for WnConv1d {
    fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        let x = x.conv1d(&self.weight.weight()?, 0, 1, self.dilation, 1)?;
        x.broadcast_add(&self.bias.reshape((1, (), 1))?)
    }
}

/// Weight-normalised transposed convolution upsampling by `stride`
struct WnConvTranspose1d {
    weight: ConvWeight,
    bias: Tensor,
    stride: usize,
    padding: usize,
    output_padding: usize,
}

impl WnConvTranspose1d {
    /// Kernel `2 * stride`, padding chosen so the output is exactly `stride` times longer
    fn load(
        loader: &mut ParamLoader,
        prefix: &str,
        in_channels: usize,
        out_channels: usize,
        stride: usize,
    ) -> Result<Self> {
        let weight = loader.conv_weight(prefix, &[in_channels, out_channels, 2 * stride])?;
        let bias = loader.bias(prefix, out_channels)?;
        Ok(Self {
            weight,
            bias,
            stride,
            padding: stride / 2 + stride % 2,
            output_padding: stride % 2,
        })
    }

    fn remove_weight_norm(&mut self) -> candle_core::Result<bool> {
        self.weight.remove_weight_norm()
    }
}

impl Module for WnConvTranspose1d {
    fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        let x = x.conv_transpose1d(
            &self.weight.weight()?,
            self.padding,
            self.output_padding,
            self.stride,
            1,
            1,
        )?;
        x.broadcast_add(&self.bias.reshape((1, (), 1))?)
    }
}

/// Dilated residual block with a 1x1 shortcut
struct ResBlock {
    conv1: WnConv1d,
    conv2: WnConv1d,
    shortcut: WnConv1d,
    dilation: usize,
}

impl ResBlock {
    fn load(loader: &mut ParamLoader, prefix: &str, channels: usize, dilation: usize) -> Result<Self> {
        Ok(Self {
            conv1: WnConv1d::load(loader, &format!("{prefix}.conv1"), channels, channels, 3, dilation)?,
            conv2: WnConv1d::load(loader, &format!("{prefix}.conv2"), channels, channels, 1, 1)?,
            shortcut: WnConv1d::load(loader, &format!("{prefix}.shortcut"), channels, channels, 1, 1)?,
            dilation,
        })
    }

    fn remove_weight_norm(&mut self) -> candle_core::Result<usize> {
        let mut n = 0;
        for conv in [&mut self.conv1, &mut self.conv2, &mut self.shortcut] {
            n += conv.remove_weight_norm()? as usize;
        }
        Ok(n)
    }
}

impl Module for ResBlock {
    fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        let h = leaky_relu(x, LRELU_SLOPE)?;
        let h = self.conv1.forward(&pad1d(&h, self.dilation)?)?;
        let h = leaky_relu(&h, LRELU_SLOPE)?;
        let h = self.conv2.forward(&h)?;
        self.shortcut.forward(x)? + h
    }
}

/// Residual blocks with dilations cycling 1, 3, 9, 27
struct ResStack {
    blocks: Vec<ResBlock>,
}

impl ResStack {
    fn load(loader: &mut ParamLoader, prefix: &str, channels: usize, depth: usize) -> Result<Self> {
        let blocks = (0..depth)
            .map(|j| {
                let dilation = 3usize.pow((j % 4) as u32);
                ResBlock::load(loader, &format!("{prefix}.blocks.{j}"), channels, dilation)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { blocks })
    }

    fn remove_weight_norm(&mut self) -> candle_core::Result<usize> {
        let mut n = 0;
        for block in &mut self.blocks {
            n += block.remove_weight_norm()?;
        }
        Ok(n)
    }
}

impl Module for ResStack {
    fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        self.blocks.iter().try_fold(x.clone(), |h, block| block.forward(&h))
    }
}

/// Pretrained mel-to-waveform generator
pub struct Generator {
    device: Device,
    config: GeneratorConfig,
    /// Input convolution
    conv_pre: WnConv1d,
    /// Upsampling layers
    ups: Vec<WnConvTranspose1d>,
    /// Residual stack after each upsampling layer
    resstacks: Vec<ResStack>,
    /// Output convolution
    conv_post: WnConv1d,
}

impl Generator {
    /// Build the network, taking parameters from `loader` where available
    pub fn new(config: GeneratorConfig, loader: &mut ParamLoader) -> Result<Self> {
        let device = loader.device().clone();
        let conv_pre = WnConv1d::load(loader, "conv_pre", config.in_channels, config.channels, 7, 1)?;

        let mut ups = Vec::with_capacity(config.upsample_scales.len());
        let mut resstacks = Vec::with_capacity(config.upsample_scales.len());
        let mut ch = config.channels;
        for (i, (&scale, &depth)) in config
            .upsample_scales
            .iter()
            .zip(config.resstack_depth.iter())
            .enumerate()
        {
            let out_ch = ch / 2;
            ups.push(WnConvTranspose1d::load(loader, &format!("ups.{i}"), ch, out_ch, scale)?);
            resstacks.push(ResStack::load(loader, &format!("resstacks.{i}"), out_ch, depth)?);
            ch = out_ch;
        }

        let conv_post = WnConv1d::load(loader, "conv_post", ch, config.out_channels, 7, 1)?;

        Ok(Self {
            device,
            config,
            conv_pre,
            ups,
            resstacks,
            conv_post,
        })
    }

    /// Generator with freshly initialized parameters
    #[cfg(test)]
    pub(crate) fn random(config: GeneratorConfig, device: &Device) -> Result<Self> {
        Self::new(config, &mut ParamLoader::empty(device))
    }

    /// Fold every weight-normalised kernel into a plain weight
    ///
    /// Returns how many layers changed; a second call returns 0.
    pub fn remove_weight_norm(&mut self) -> Result<usize> {
        let mut n = self.conv_pre.remove_weight_norm()? as usize;
        for (up, stack) in self.ups.iter_mut().zip(self.resstacks.iter_mut()) {
            n += up.remove_weight_norm()? as usize;
            n += stack.remove_weight_norm()?;
        }
        n += self.conv_post.remove_weight_norm()? as usize;
        Ok(n)
    }

    /// Whether any layer still carries a weight-norm reparameterization
    #[cfg(test)]
    pub(crate) fn has_weight_norm(&self) -> bool {
        self.conv_pre.weight.is_normalized()
            || self.conv_post.weight.is_normalized()
            || self.ups.iter().any(|u| u.weight.is_normalized())
            || self.resstacks.iter().flat_map(|s| &s.blocks).any(|b| {
                b.conv1.weight.is_normalized()
                    || b.conv2.weight.is_normalized()
                    || b.shortcut.weight.is_normalized()
            })
    }

    /// Forward pass
    ///
    /// # Arguments
    /// * `conditions` - Normalized mel features (batch, mel_channels, frames)
    ///
    /// # Returns
    /// * Audio waveform (batch, out_channels, frames * upsample_factor)
    pub fn forward(&self, conditions: &Tensor) -> Result<Tensor> {
        let (_batch, channels, frames) = conditions.dims3()?;
        if channels != self.config.in_channels {
            anyhow::bail!(
                "Generator expects {} input channels, got {}",
                self.config.in_channels,
                channels
            );
        }
        if frames == 0 {
            anyhow::bail!("Generator input has no frames");
        }

        let mut x = self.conv_pre.forward(&pad1d(conditions, 3)?)?;
        for (up, stack) in self.ups.iter().zip(self.resstacks.iter()) {
            x = leaky_relu(&x, LRELU_SLOPE)?;
            x = up.forward(&x)?;
            x = stack.forward(&x)?;
        }
        x = leaky_relu(&x, LRELU_SLOPE)?;
        x = self.conv_post.forward(&pad1d(&x, 3)?)?;

        Ok(x.tanh()?)
    }

    /// Samples produced per input frame
    pub fn upsample_factor(&self) -> usize {
        self.config.upsample_factor()
    }

    /// Network sizing
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Device the parameters live on
    pub fn device(&self) -> &Device {
        &self.device
    }
}
