use ndarray::Array3;

use crate::network::{ConvStage, NetworkSpec};
use crate::params::ParamSet;

/// Small architecture that keeps unit tests fast.
pub(crate) fn tiny_spec() -> NetworkSpec {
    NetworkSpec {
        image_width: 12,
        image_height: 10,
        image_channels: 3,
        conv: vec![ConvStage::new(4, 3, 2), ConvStage::new(6, 3, 1)],
        image_fc: vec![16],
        measurement_fc: vec![4],
        joint_width: 8,
        branch_hidden: vec![6],
    }
}

pub(crate) fn tiny_params(seed: u64) -> ParamSet {
    ParamSet::initialise(&tiny_spec(), seed).unwrap()
}

/// Deterministic image with every pixel distinct, values in `[0, 1)`.
pub(crate) fn gradient_image(spec: &NetworkSpec) -> Array3<f32> {
    let (h, w) = (spec.image_height, spec.image_width);
    let total = (h * w * 3) as f32;
    Array3::from_shape_fn((h, w, 3), |(y, x, c)| ((y * w + x) * 3 + c) as f32 / total)
}
