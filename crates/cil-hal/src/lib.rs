//! `cil-hal` – sensor and actuator boundary.
//!
//! # Modules
//!
//! - [`camera`] – [`CameraFrame`][camera::CameraFrame] and the
//!   [`Camera`][camera::Camera] driver trait.
//! - [`preprocess`] – [`normalize_frame`][preprocess::normalize_frame]:
//!   colour conversion, resize, and scaling into the engine's input format.
//! - [`actuator`] – [`VehicleActuator`][actuator::VehicleActuator]: consumer
//!   of the final control command.

pub mod actuator;
pub mod camera;
pub mod preprocess;

pub use actuator::{RecordingActuator, VehicleActuator};
pub use camera::{Camera, CameraFrame, PixelLayout};
pub use preprocess::normalize_frame;
