//! CPU tensor kernels used by the towers and branches.
//!
//! All kernels are pure: they read their inputs and return new arrays.
//! Convolution is computed as im2col followed by a single GEMM.

use cil_types::CilError;
use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView3, Axis};

/// Valid (unpadded) 2-D convolution.
///
/// - `input` – `(in_channels, rows, cols)`.
/// - `kernel` – weights flattened to `(out_channels, in_channels * k * k)`.
/// - `bias` – `(out_channels,)`.
///
/// Returns `(out_channels, out_rows, out_cols)`.
pub fn conv2d(
    input: ArrayView3<f32>,
    kernel: &Array2<f32>,
    bias: &Array1<f32>,
    k: usize,
    stride: usize,
) -> Result<Array3<f32>, CilError> {
    let (in_channels, rows, cols) = input.dim();
    let (out_channels, patch) = kernel.dim();
    if patch != in_channels * k * k {
        return Err(CilError::shape(
            format!("{} input channels", patch / (k * k).max(1)),
            format!("{in_channels}"),
        ));
    }
    if rows < k || cols < k || stride == 0 {
        return Err(CilError::shape(
            format!("feature map of at least {k}x{k}"),
            format!("{rows}x{cols}"),
        ));
    }

    let out_rows = (rows - k) / stride + 1;
    let out_cols = (cols - k) / stride + 1;
    let positions = out_rows * out_cols;

    let mut columns = Array2::<f32>::zeros((patch, positions));
    for c in 0..in_channels {
        let plane = input.index_axis(Axis(0), c);
        for ki in 0..k {
            for kj in 0..k {
                let mut dst = columns.row_mut((c * k + ki) * k + kj);
                for r in 0..out_rows {
                    for q in 0..out_cols {
                        dst[r * out_cols + q] = plane[[r * stride + ki, q * stride + kj]];
                    }
                }
            }
        }
    }

    let mut out = kernel.dot(&columns);
    out += &bias.view().insert_axis(Axis(1));
    out.into_shape_with_order((out_channels, out_rows, out_cols))
        .map_err(|e| {
            CilError::shape(format!("{out_channels}x{out_rows}x{out_cols}"), e.to_string())
        })
}

/// Per-channel affine transform `x * scale[c] + shift[c]`, applied in place.
///
/// Batch-norm with frozen running statistics reduces to this form.
pub fn channel_affine(x: &mut Array3<f32>, scale: &Array1<f32>, shift: &Array1<f32>) {
    for (c, mut plane) in x.outer_iter_mut().enumerate() {
        let (s, b) = (scale[c], shift[c]);
        plane.mapv_inplace(|v| v * s + b);
    }
}

/// `weight · input + bias` with `weight` laid out `[out, in]`.
pub fn linear(input: ArrayView1<f32>, weight: &Array2<f32>, bias: &Array1<f32>) -> Array1<f32> {
    weight.dot(&input) + bias
}

/// Rectified linear unit.  NaN is propagated rather than clipped so that
/// downstream anomaly checks still see it.
#[inline]
pub fn relu(v: f32) -> f32 {
    if v < 0.0 { 0.0 } else { v }
}
