//! `cil-perception` – sensor encoding layer.
//!
//! Turns a normalised camera frame and the current speed into the joint
//! representation that the control branches consume.
//!
//! # Modules
//!
//! - [`network`] – [`NetworkSpec`][network::NetworkSpec]: declared layer
//!   widths and the parameter manifest derived from them.
//! - [`params`] – [`ParamSet`][params::ParamSet]: versioned, named parameter
//!   blob with MessagePack persistence, validation, and initialisation.
//! - [`tensor`] – CPU kernels (im2col convolution, linear, ReLU).
//! - [`layers`] – [`Dense`][layers::Dense] and
//!   [`ConvBlock`][layers::ConvBlock] in inference mode.
//! - [`towers`] – [`PerceptionTower`][towers::PerceptionTower] (image) and
//!   [`MeasurementTower`][towers::MeasurementTower] (speed).
//! - [`fusion`] – [`FusionStage`][fusion::FusionStage] and the
//!   [`SensorFusion`][fusion::SensorFusion] pipeline producing a
//!   [`JointRepresentation`][fusion::JointRepresentation].

pub mod fusion;
pub mod layers;
pub mod network;
pub mod params;
pub mod tensor;
pub mod towers;

#[cfg(test)]
pub(crate) mod test_support;

pub use fusion::{FusionStage, JointRepresentation, SensorFusion};
pub use layers::{Activation, Dense};
pub use network::{CONTROL_OUTPUTS, ConvStage, NetworkSpec};
pub use params::{ParamSet, ParamTensor};
pub use towers::{FeatureVector, MeasurementTower, PerceptionTower};
