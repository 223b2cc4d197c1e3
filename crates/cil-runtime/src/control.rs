//! [`ControlPostProcessor`] – raw branch output → actuator command.
//!
//! The rules run in a fixed order and later rules see the values already
//! rewritten by earlier ones:
//!
//! 1. `brake < brake_noise_floor` → `brake = 0`.
//! 2. `acceleration > brake` → `brake = 0`.
//! 3. `speed > coast_speed && brake == 0` → `acceleration = 0`.
//! 4. `steer` is passed through.
//! 5. `hand_brake` and `reverse` are always `false`.
//!
//! The result is finally saturated to the actuator domain (steer in
//! `[-1, 1]`, throttle and brake in `[0, 1]`).
//!
//! # Example
//!
//! ```rust
//! use cil_runtime::control::ControlPostProcessor;
//! use cil_types::RawControl;
//!
//! let post = ControlPostProcessor::default();
//! let raw = RawControl { steer: 0.0, acceleration: 0.6, brake: 0.02 };
//!
//! // Small brake is noise, and above 5 m/s without braking the car coasts.
//! let cmd = post.apply(raw, 8.0);
//! assert_eq!(cmd.throttle, 0.0);
//! assert_eq!(cmd.brake, 0.0);
//! ```

use cil_types::{ControlCommand, RawControl};
use serde::{Deserialize, Serialize};

/// Brake activations below this are treated as noise.
pub const DEFAULT_BRAKE_NOISE_FLOOR: f32 = 0.1;
/// Above this speed (m/s) throttle is cut unless the model is braking.
pub const DEFAULT_COAST_SPEED: f32 = 5.0;

/// Deterministic rule engine applied to every branch output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlPostProcessor {
    pub brake_noise_floor: f32,
    pub coast_speed: f32,
}

impl Default for ControlPostProcessor {
    fn default() -> Self {
        Self {
            brake_noise_floor: DEFAULT_BRAKE_NOISE_FLOOR,
            coast_speed: DEFAULT_COAST_SPEED,
        }
    }
}

impl ControlPostProcessor {
    pub fn new(brake_noise_floor: f32, coast_speed: f32) -> Self {
        Self {
            brake_noise_floor,
            coast_speed,
        }
    }

    /// Turn `raw` into a [`ControlCommand`] given the current `speed` (m/s).
    pub fn apply(&self, raw: RawControl, speed: f32) -> ControlCommand {
        let mut acceleration = raw.acceleration;
        let mut brake = raw.brake;

        if brake < self.brake_noise_floor {
            brake = 0.0;
        }

        if acceleration > brake {
            brake = 0.0;
        }

        // Literal behaviour of the trained agent: throttle is dropped even
        // when the model asks for it.
        if speed > self.coast_speed && brake == 0.0 {
            acceleration = 0.0;
        }

        ControlCommand {
            steer: raw.steer.clamp(-1.0, 1.0),
            throttle: acceleration.clamp(0.0, 1.0),
            brake: brake.clamp(0.0, 1.0),
            ..ControlCommand::idle()
        }
    }
}
