//! Sensor fusion.
//!
//! Combines the image-derived and speed-derived [`FeatureVector`]s into one
//! [`JointRepresentation`]:
//!
//! ```text
//! joint = relu(W · [image_features ‖ measurement_features] + b)
//! ```
//!
//! The concatenation order (image first) is baked into the stored weights.
//! Swapping the operands does not fail, it silently produces a different
//! vector, so both [`FusionStage::forward`] arguments are typed by role.
//!
//! [`SensorFusion`] bundles both towers and the fusion stage into the
//! observation → joint representation pipeline used by the engine.
//!
//! # Example
//!
//! ```rust
//! use cil_perception::fusion::SensorFusion;
//! use cil_perception::network::{ConvStage, NetworkSpec};
//! use cil_perception::params::ParamSet;
//! use cil_types::Observation;
//! use ndarray::Array3;
//!
//! let spec = NetworkSpec {
//!     image_width: 8,
//!     image_height: 6,
//!     image_channels: 3,
//!     conv: vec![ConvStage::new(2, 3, 1)],
//!     image_fc: vec![4],
//!     measurement_fc: vec![2],
//!     joint_width: 4,
//!     branch_hidden: vec![3],
//! };
//! let params = ParamSet::initialise(&spec, 0).unwrap();
//! let fusion = SensorFusion::from_params(&spec, &params).unwrap();
//!
//! let obs = Observation::new(Array3::zeros((6, 8, 3)), 1.0, 2);
//! let joint = fusion.fuse(&obs).unwrap();
//! assert_eq!(joint.len(), 4);
//! ```

use cil_types::{CilError, Observation};
use ndarray::{Array1, ArrayView1, Axis};

use crate::layers::{Activation, Dense};
use crate::network::NetworkSpec;
use crate::params::ParamSet;
use crate::towers::{FeatureVector, MeasurementTower, PerceptionTower};

// ────────────────────────────────────────────────────────────────────────────
// Output type
// ────────────────────────────────────────────────────────────────────────────

/// Fused visual + kinematic representation consumed by exactly one branch.
///
/// Not `Clone`: one representation per observation, moved into the router.
#[derive(Debug, PartialEq)]
pub struct JointRepresentation(Array1<f32>);

impl JointRepresentation {
    pub fn new(values: Array1<f32>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn view(&self) -> ArrayView1<'_, f32> {
        self.0.view()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// FusionStage
// ────────────────────────────────────────────────────────────────────────────

/// Concatenate-and-project stage (`joint.fc0`).
#[derive(Debug, Clone)]
pub struct FusionStage {
    image_len: usize,
    measurement_len: usize,
    projection: Dense,
}

impl FusionStage {
    pub fn from_params(spec: &NetworkSpec, params: &ParamSet) -> Result<Self, CilError> {
        let projection = Dense::from_params(params, "joint.fc0", Activation::Relu)?;
        let image_len = spec.image_features()?;
        let measurement_len = spec.measurement_features();
        if projection.in_features() != image_len + measurement_len {
            return Err(CilError::Load(format!(
                "joint.fc0 expects {} inputs, towers produce {}",
                projection.in_features(),
                image_len + measurement_len
            )));
        }
        Ok(Self {
            image_len,
            measurement_len,
            projection,
        })
    }

    pub fn output_len(&self) -> usize {
        self.projection.out_features()
    }

    pub fn forward(
        &self,
        image: &FeatureVector,
        measurement: &FeatureVector,
    ) -> Result<JointRepresentation, CilError> {
        if image.len() != self.image_len || measurement.len() != self.measurement_len {
            return Err(CilError::shape(
                format!("{} + {} features", self.image_len, self.measurement_len),
                format!("{} + {}", image.len(), measurement.len()),
            ));
        }
        let joined = ndarray::concatenate(Axis(0), &[image.view(), measurement.view()])
            .map_err(|e| CilError::shape("concatenable feature vectors", e.to_string()))?;
        Ok(JointRepresentation::new(self.projection.forward(joined.view())?))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SensorFusion
// ────────────────────────────────────────────────────────────────────────────

/// Observation → [`JointRepresentation`] pipeline.
#[derive(Debug, Clone)]
pub struct SensorFusion {
    perception: PerceptionTower,
    measurement: MeasurementTower,
    stage: FusionStage,
}

impl SensorFusion {
    pub fn from_params(spec: &NetworkSpec, params: &ParamSet) -> Result<Self, CilError> {
        Ok(Self {
            perception: PerceptionTower::from_params(spec, params)?,
            measurement: MeasurementTower::from_params(spec, params)?,
            stage: FusionStage::from_params(spec, params)?,
        })
    }

    pub fn perception(&self) -> &PerceptionTower {
        &self.perception
    }

    /// Shape checks that can run before any compute.
    pub fn check(&self, obs: &Observation) -> Result<(), CilError> {
        self.perception.check_input(obs.image.view())?;
        if !obs.speed.is_finite() {
            return Err(CilError::shape("finite speed", format!("{}", obs.speed)));
        }
        Ok(())
    }

    pub fn fuse(&self, obs: &Observation) -> Result<JointRepresentation, CilError> {
        let image = self.perception.forward(obs.image.view())?;
        let speed = self.measurement.forward(obs.speed)?;
        self.stage.forward(&image, &speed)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{gradient_image, tiny_params, tiny_spec};
    use ndarray::Array1;

    fn features(len: usize, value: f32) -> FeatureVector {
        FeatureVector::new(Array1::from_elem(len, value))
    }

    #[test]
    fn fusion_output_has_joint_width() {
        let spec = tiny_spec();
        let stage = FusionStage::from_params(&spec, &tiny_params(1)).unwrap();
        let joint = stage
            .forward(
                &features(spec.image_features().unwrap(), 0.5),
                &features(spec.measurement_features(), 0.5),
            )
            .unwrap();
        assert_eq!(joint.len(), spec.joint_width);
        assert_eq!(stage.output_len(), spec.joint_width);
    }

    #[test]
    fn fusion_rejects_wrong_lengths() {
        let spec = tiny_spec();
        let stage = FusionStage::from_params(&spec, &tiny_params(1)).unwrap();
        let err = stage
            .forward(&features(3, 0.0), &features(spec.measurement_features(), 0.0))
            .unwrap_err();
        assert!(matches!(err, CilError::Shape { .. }));
    }

    #[test]
    fn image_features_come_first() {
        // Weight row 0 looks only at the first input column (image), row 1
        // only at the last (measurement).
        let spec = tiny_spec();
        let mut params = tiny_params(1);
        let n_in = spec.joint_input_len().unwrap();
        let mut weight = vec![0.0; spec.joint_width * n_in];
        weight[0] = 1.0;
        weight[n_in + n_in - 1] = 1.0;
        params.insert(
            "joint.fc0.weight",
            crate::params::ParamTensor::new(vec![spec.joint_width, n_in], weight).unwrap(),
        );
        params.insert(
            "joint.fc0.bias",
            crate::params::ParamTensor::filled(vec![spec.joint_width], 0.0),
        );

        let stage = FusionStage::from_params(&spec, &params).unwrap();
        let joint = stage
            .forward(
                &features(spec.image_features().unwrap(), 2.0),
                &features(spec.measurement_features(), 5.0),
            )
            .unwrap();
        assert_eq!(joint.view()[0], 2.0);
        assert_eq!(joint.view()[1], 5.0);
    }

    #[test]
    fn sensor_fusion_end_to_end() {
        let spec = tiny_spec();
        let fusion = SensorFusion::from_params(&spec, &tiny_params(4)).unwrap();
        let obs = Observation::new(gradient_image(&spec), 3.0, 2);
        assert!(fusion.check(&obs).is_ok());
        let joint = fusion.fuse(&obs).unwrap();
        assert_eq!(joint.len(), spec.joint_width);
    }

    #[test]
    fn sensor_fusion_check_rejects_bad_image() {
        let spec = tiny_spec();
        let fusion = SensorFusion::from_params(&spec, &tiny_params(4)).unwrap();
        let obs = Observation::new(ndarray::Array3::zeros((1, 1, 3)), 3.0, 2);
        assert!(matches!(fusion.check(&obs), Err(CilError::Shape { .. })));
    }
}
