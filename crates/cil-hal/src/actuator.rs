//! `VehicleActuator` trait – the downstream side of the control path.
//!
//! The engine produces [`ControlCommand`]s and never touches hardware.
//! Drivers (a simulator actor, a CAN bridge, a test double) implement this
//! trait so the agent can hand each command to whichever backend is wired in.

use cil_types::{CilError, ControlCommand};

/// Anything that can apply a steer/throttle/brake command to a vehicle.
pub trait VehicleActuator: Send + Sync {
    /// Stable identifier, e.g. `"ego_vehicle"`.
    fn id(&self) -> &str;

    /// Apply `control` to the vehicle.
    ///
    /// # Errors
    ///
    /// Returns [`CilError::HardwareFault`] if the command cannot be applied
    /// (e.g. the actor was destroyed or the link is down).
    fn apply(&mut self, control: &ControlCommand) -> Result<(), CilError>;
}

/// In-process actuator that records every command it receives.
///
/// Useful for dry runs and replay; it never fails.
#[derive(Debug, Default)]
pub struct RecordingActuator {
    id: String,
    history: Vec<ControlCommand>,
}

impl RecordingActuator {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            history: Vec::new(),
        }
    }

    pub fn history(&self) -> &[ControlCommand] {
        &self.history
    }

    pub fn last(&self) -> Option<&ControlCommand> {
        self.history.last()
    }
}

impl VehicleActuator for RecordingActuator {
    fn id(&self) -> &str {
        &self.id
    }

    fn apply(&mut self, control: &ControlCommand) -> Result<(), CilError> {
        self.history.push(*control);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_actuator_keeps_history_in_order() {
        let mut act = RecordingActuator::new("ego");
        assert_eq!(act.id(), "ego");
        assert!(act.last().is_none());

        let mut first = ControlCommand::idle();
        first.throttle = 0.4;
        act.apply(&first).unwrap();
        act.apply(&ControlCommand::idle()).unwrap();

        assert_eq!(act.history().len(), 2);
        assert!((act.history()[0].throttle - 0.4).abs() < f32::EPSILON);
        assert_eq!(act.last(), Some(&ControlCommand::idle()));
    }
}
