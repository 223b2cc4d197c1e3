//! Inference-mode building blocks.
//!
//! - [`Dense`] – linear layer with an optional ReLU (the "fc block").
//! - [`ConvBlock`] – convolution → batch-norm → ReLU.
//!
//! Dropout sits between the affine step and the activation in the trained
//! network.  At inference it is the identity and owns no parameters, so it
//! does not appear here.

use cil_types::CilError;
use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView3};

use crate::params::ParamSet;
use crate::tensor;

/// Batch-norm epsilon used at training time.
pub const BATCH_NORM_EPS: f32 = 1e-5;

/// Output non-linearity of a [`Dense`] layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Relu,
    Identity,
}

/// Fully-connected layer.
#[derive(Debug, Clone)]
pub struct Dense {
    weight: Array2<f32>,
    bias: Array1<f32>,
    activation: Activation,
}

impl Dense {
    pub fn new(
        weight: Array2<f32>,
        bias: Array1<f32>,
        activation: Activation,
    ) -> Result<Self, CilError> {
        if weight.nrows() != bias.len() {
            return Err(CilError::Load(format!(
                "dense weight has {} rows but bias has {} entries",
                weight.nrows(),
                bias.len()
            )));
        }
        Ok(Self {
            weight,
            bias,
            activation,
        })
    }

    /// Read `<prefix>.weight` and `<prefix>.bias` from `params`.
    pub fn from_params(
        params: &ParamSet,
        prefix: &str,
        activation: Activation,
    ) -> Result<Self, CilError> {
        Self::new(
            params.array2(&format!("{prefix}.weight"))?,
            params.array1(&format!("{prefix}.bias"))?,
            activation,
        )
    }

    pub fn in_features(&self) -> usize {
        self.weight.ncols()
    }

    pub fn out_features(&self) -> usize {
        self.weight.nrows()
    }

    pub fn forward(&self, input: ArrayView1<f32>) -> Result<Array1<f32>, CilError> {
        if input.len() != self.in_features() {
            return Err(CilError::shape(
                format!("{} features", self.in_features()),
                format!("{}", input.len()),
            ));
        }
        let mut out = tensor::linear(input, &self.weight, &self.bias);
        if self.activation == Activation::Relu {
            out.mapv_inplace(tensor::relu);
        }
        Ok(out)
    }
}

/// Run `input` through a stack of dense layers.
pub fn forward_stack(layers: &[Dense], input: Array1<f32>) -> Result<Array1<f32>, CilError> {
    layers.iter().try_fold(input, |x, layer| layer.forward(x.view()))
}

/// Convolution block with frozen batch-norm statistics.
#[derive(Debug, Clone)]
pub struct ConvBlock {
    /// `(out, in * k * k)`
    kernel: Array2<f32>,
    bias: Array1<f32>,
    k: usize,
    stride: usize,
    // gamma / sqrt(var + eps) and beta - mean * scale, folded at load time.
    bn_scale: Array1<f32>,
    bn_shift: Array1<f32>,
}

impl ConvBlock {
    /// Read conv block `index` (`image.conv{index}.*`, `image.bn{index}.*`).
    pub fn from_params(params: &ParamSet, index: usize, stride: usize) -> Result<Self, CilError> {
        let weight = params.array4(&format!("image.conv{index}.weight"))?;
        let (out, inp, k, k2) = weight.dim();
        if k != k2 {
            return Err(CilError::Load(format!("image.conv{index}.weight has a non-square kernel")));
        }
        let kernel = weight
            .into_shape_with_order((out, inp * k * k))
            .map_err(|e| CilError::Load(format!("image.conv{index}.weight: {e}")))?;
        let bias = params.array1(&format!("image.conv{index}.bias"))?;

        let gamma = params.array1(&format!("image.bn{index}.gamma"))?;
        let beta = params.array1(&format!("image.bn{index}.beta"))?;
        let mean = params.array1(&format!("image.bn{index}.running_mean"))?;
        let var = params.array1(&format!("image.bn{index}.running_var"))?;
        for (name, len) in [
            ("bias", bias.len()),
            ("gamma", gamma.len()),
            ("beta", beta.len()),
            ("running_mean", mean.len()),
            ("running_var", var.len()),
        ] {
            if len != out {
                return Err(CilError::Load(format!(
                    "conv block {index}: {name} has {len} entries, expected {out}"
                )));
            }
        }

        let bn_scale = &gamma / &var.mapv(|v| (v + BATCH_NORM_EPS).sqrt());
        let bn_shift = &beta - &(&mean * &bn_scale);

        Ok(Self {
            kernel,
            bias,
            k,
            stride,
            bn_scale,
            bn_shift,
        })
    }

    pub fn in_channels(&self) -> usize {
        self.kernel.ncols() / (self.k * self.k)
    }

    pub fn out_channels(&self) -> usize {
        self.kernel.nrows()
    }

    pub fn forward(&self, input: ArrayView3<f32>) -> Result<Array3<f32>, CilError> {
        let mut x = tensor::conv2d(input, &self.kernel, &self.bias, self.k, self.stride)?;
        tensor::channel_affine(&mut x, &self.bn_scale, &self.bn_shift);
        x.mapv_inplace(tensor::relu);
        Ok(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamTensor;
    use ndarray::array;

    #[test]
    fn dense_applies_relu() {
        let layer =
            Dense::new(array![[1.0f32], [-1.0]], array![0.0, 0.0], Activation::Relu).unwrap();
        let y = layer.forward(array![2.0f32].view()).unwrap();
        assert_eq!(y, array![2.0, 0.0]);
    }

    #[test]
    fn dense_identity_keeps_negatives() {
        let layer =
            Dense::new(array![[1.0f32], [-1.0]], array![0.0, 0.0], Activation::Identity)
                .unwrap();
        let y = layer.forward(array![2.0f32].view()).unwrap();
        assert_eq!(y, array![2.0, -2.0]);
    }

    #[test]
    fn dense_rejects_wrong_input_width() {
        let layer = Dense::new(array![[1.0f32, 1.0]], array![0.0], Activation::Relu).unwrap();
        assert!(matches!(
            layer.forward(array![1.0f32].view()),
            Err(CilError::Shape { .. })
        ));
    }

    #[test]
    fn dense_rejects_mismatched_bias() {
        assert!(Dense::new(array![[1.0f32, 1.0]], array![0.0, 0.0], Activation::Relu).is_err());
    }

    #[test]
    fn conv_block_folds_batch_norm() {
        let mut params = ParamSet::new("bn");
        params.insert("image.conv0.weight", ParamTensor::filled(vec![1, 1, 1, 1], 1.0));
        params.insert("image.conv0.bias", ParamTensor::filled(vec![1], 0.0));
        params.insert("image.bn0.gamma", ParamTensor::filled(vec![1], 2.0));
        params.insert("image.bn0.beta", ParamTensor::filled(vec![1], 1.0));
        params.insert("image.bn0.running_mean", ParamTensor::filled(vec![1], 3.0));
        params.insert("image.bn0.running_var", ParamTensor::filled(vec![1], 4.0 - BATCH_NORM_EPS));

        let block = ConvBlock::from_params(&params, 0, 1).unwrap();
        assert_eq!(block.in_channels(), 1);
        assert_eq!(block.out_channels(), 1);

        // (5 - 3) * 2 / 2 + 1 = 3 ; (1 - 3) * 2 / 2 + 1 = -1 → relu → 0
        let input = Array3::from_shape_vec((1, 1, 2), vec![5.0f32, 1.0]).unwrap();
        let y = block.forward(input.view()).unwrap();
        assert!((y[[0, 0, 0]] - 3.0).abs() < 1e-4);
        assert_eq!(y[[0, 0, 1]], 0.0);
    }
}
