//! Perception and measurement towers.
//!
//! Both towers turn one modality into a [`FeatureVector`]:
//!
//! - [`PerceptionTower`] – normalised RGB image → conv blocks → flatten →
//!   fc blocks.
//! - [`MeasurementTower`] – scalar speed → fc blocks.

use cil_types::CilError;
use ndarray::{Array1, ArrayView1, ArrayView3};

use crate::layers::{Activation, ConvBlock, Dense, forward_stack};
use crate::network::NetworkSpec;
use crate::params::ParamSet;

/// Fixed-length feature vector produced by a tower.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(Array1<f32>);

impl FeatureVector {
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
// PerceptionTower
// ────────────────────────────────────────────────────────────────────────────

/// Image encoder.
///
/// Expects a `height × width × 3` image already resized to the canonical
/// size and scaled into `[0, 1]`.  Only the shape is checked; the value range
/// is the caller's contract.
///
/// Internally the image is read as `(channels, width, height)`, which is the
/// axis order the stored conv weights were trained with.
#[derive(Debug, Clone)]
pub struct PerceptionTower {
    width: usize,
    height: usize,
    channels: usize,
    conv: Vec<ConvBlock>,
    fc: Vec<Dense>,
}

impl PerceptionTower {
    pub fn from_params(spec: &NetworkSpec, params: &ParamSet) -> Result<Self, CilError> {
        let conv = spec
            .conv
            .iter()
            .enumerate()
            .map(|(i, stage)| ConvBlock::from_params(params, i, stage.stride))
            .collect::<Result<Vec<_>, _>>()?;
        let fc = (0..spec.image_fc.len())
            .map(|i| Dense::from_params(params, &format!("image.fc{i}"), Activation::Relu))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            width: spec.image_width,
            height: spec.image_height,
            channels: spec.image_channels,
            conv,
            fc,
        })
    }

    /// `(height, width, channels)` accepted by [`PerceptionTower::forward`].
    pub fn input_shape(&self) -> (usize, usize, usize) {
        (self.height, self.width, self.channels)
    }

    /// Reject images whose dimensions differ from the canonical shape.
    pub fn check_input(&self, image: ArrayView3<f32>) -> Result<(), CilError> {
        let (h, w, c) = image.dim();
        if (h, w, c) != self.input_shape() {
            return Err(CilError::shape(
                format!("{}x{}x{} image", self.height, self.width, self.channels),
                format!("{h}x{w}x{c}"),
            ));
        }
        Ok(())
    }

    pub fn forward(&self, image: ArrayView3<f32>) -> Result<FeatureVector, CilError> {
        self.check_input(image)?;

        let mut x = image.permuted_axes([2, 1, 0]).as_standard_layout().into_owned();
        for block in &self.conv {
            x = block.forward(x.view())?;
        }
        let flat: Array1<f32> = x.iter().copied().collect();
        Ok(FeatureVector::new(forward_stack(&self.fc, flat)?))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// MeasurementTower
// ────────────────────────────────────────────────────────────────────────────

/// Speed encoder.
#[derive(Debug, Clone)]
pub struct MeasurementTower {
    fc: Vec<Dense>,
}

impl MeasurementTower {
    pub fn from_params(spec: &NetworkSpec, params: &ParamSet) -> Result<Self, CilError> {
        let fc = (0..spec.measurement_fc.len())
            .map(|i| Dense::from_params(params, &format!("measurement.fc{i}"), Activation::Relu))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { fc })
    }

    pub fn forward(&self, speed: f32) -> Result<FeatureVector, CilError> {
        self.forward_measurements(ndarray::arr1(&[speed]).view())
    }

    /// Encode a raw measurement vector.  Only a single finite scalar is
    /// accepted.
    pub fn forward_measurements(&self, input: ArrayView1<f32>) -> Result<FeatureVector, CilError> {
        if input.len() != 1 {
            return Err(CilError::shape("scalar speed", format!("{} values", input.len())));
        }
        if !input[0].is_finite() {
            return Err(CilError::shape("finite speed", format!("{}", input[0])));
        }
        Ok(FeatureVector::new(forward_stack(&self.fc, input.to_owned())?))
    }
}
