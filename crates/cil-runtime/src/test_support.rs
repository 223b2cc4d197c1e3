use cil_perception::{
    CONTROL_OUTPUTS, ConvStage, JointRepresentation, NetworkSpec, ParamSet, ParamTensor,
};
use cil_types::{CommandCode, Observation};
use ndarray::{Array1, Array3};

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

/// Parameters whose `branch` head emits NaN acceleration for every input.
pub(crate) fn nan_head_params(seed: u64, branch: &str) -> ParamSet {
    let mut params = tiny_params(seed);
    params.insert(
        format!("branch.{branch}.out.bias"),
        ParamTensor::new(vec![CONTROL_OUTPUTS], vec![0.0, f32::NAN, 0.0]).unwrap(),
    );
    params
}

pub(crate) fn joint(spec: &NetworkSpec, value: f32) -> JointRepresentation {
    JointRepresentation::new(Array1::from_elem(spec.joint_width, value))
}

/// Gradient image scaled by `scale`, values in `[0, scale)`.
pub(crate) fn image(spec: &NetworkSpec, scale: f32) -> Array3<f32> {
    let (h, w) = (spec.image_height, spec.image_width);
    let total = (h * w * 3) as f32;
    Array3::from_shape_fn((h, w, 3), |(y, x, c)| scale * ((y * w + x) * 3 + c) as f32 / total)
}

pub(crate) fn observation(
    spec: &NetworkSpec,
    scale: f32,
    speed: f32,
    command: CommandCode,
) -> Observation {
    Observation::new(image(spec, scale), speed, command)
}
