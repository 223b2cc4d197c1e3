//! [`ImitationAgent`] – camera frame + speed + command → vehicle control.
//!
//! The agent is the thin layer between sensors and the engine: it normalises
//! a raw [`CameraFrame`] to the engine's canonical size, runs single-sample
//! inference, and optionally hands the result to a [`VehicleActuator`].

use std::path::Path;
use std::sync::Arc;

use cil_hal::{Camera, CameraFrame, VehicleActuator, normalize_frame};
use cil_types::{CilError, CommandCode, ControlCommand};
use tracing::{debug, instrument};

use crate::config::EngineConfig;
use crate::engine::InferenceEngine;

#[derive(Debug, Clone)]
pub struct ImitationAgent {
    engine: Arc<InferenceEngine>,
}

impl ImitationAgent {
    pub fn new(engine: Arc<InferenceEngine>) -> Self {
        Self { engine }
    }

    /// Load weights from `path` and wrap the resulting engine.
    pub fn from_weights(path: &Path, config: &EngineConfig) -> Result<Self, CilError> {
        Ok(Self::new(Arc::new(InferenceEngine::load(path, config)?)))
    }

    pub fn engine(&self) -> &Arc<InferenceEngine> {
        &self.engine
    }

    /// Compute the control for one frame.
    #[instrument(skip(self, frame), fields(width = frame.width, height = frame.height))]
    pub fn run_step(
        &self,
        speed: f32,
        command: CommandCode,
        frame: &CameraFrame,
    ) -> Result<ControlCommand, CilError> {
        let (width, height) = self.engine.image_size();
        let image = normalize_frame(frame, width, height)?;
        self.engine.infer(image.view(), speed, command)
    }

    /// Compute the control for one frame and apply it.
    ///
    /// Nothing is sent to the actuator when inference fails.
    pub fn drive(
        &self,
        speed: f32,
        command: CommandCode,
        frame: &CameraFrame,
        actuator: &mut dyn VehicleActuator,
    ) -> Result<ControlCommand, CilError> {
        let control = self.run_step(speed, command, frame)?;
        actuator.apply(&control)?;
        debug!(actuator = actuator.id(), ?control, "control applied");
        Ok(control)
    }

    /// Capture a frame from `camera`, then [`drive`](Self::drive).
    pub fn step_camera(
        &self,
        camera: &mut dyn Camera,
        speed: f32,
        command: CommandCode,
        actuator: &mut dyn VehicleActuator,
    ) -> Result<ControlCommand, CilError> {
        let frame = camera.capture()?;
        debug!(camera = camera.id(), "frame captured");
        self.drive(speed, command, &frame, actuator)
    }
}
