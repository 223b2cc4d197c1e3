use ndarray::Array3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raw navigation code as it arrives from the route planner.
pub type CommandCode = i32;

/// High-level navigation command that conditions the control branches.
///
/// Two raw codes (`0` and `2`) both mean "follow the lane".  The collapse is
/// intentional: recordings use `0` when no explicit directive is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    FollowLane,
    Left,
    Right,
    Straight,
}

impl Command {
    /// Every command, in branch order.
    pub const ALL: [Command; 4] = [
        Command::FollowLane,
        Command::Left,
        Command::Right,
        Command::Straight,
    ];

    /// Decode a raw navigation code.
    ///
    /// # Errors
    ///
    /// Returns [`CilError::UnknownCommand`] for any code outside
    /// `{0, 2, 3, 4, 5}`.  Unknown codes are never mapped to a default.
    pub fn from_code(code: CommandCode) -> Result<Self, CilError> {
        match code {
            0 | 2 => Ok(Command::FollowLane),
            3 => Ok(Command::Left),
            4 => Ok(Command::Right),
            5 => Ok(Command::Straight),
            other => Err(CilError::UnknownCommand(other)),
        }
    }

    /// Canonical raw code for this command.
    pub fn code(self) -> CommandCode {
        match self {
            Command::FollowLane => 2,
            Command::Left => 3,
            Command::Right => 4,
            Command::Straight => 5,
        }
    }
}

impl TryFrom<CommandCode> for Command {
    type Error = CilError;

    fn try_from(code: CommandCode) -> Result<Self, Self::Error> {
        Command::from_code(code)
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::FollowLane => write!(f, "follow_lane"),
            Command::Left => write!(f, "left"),
            Command::Right => write!(f, "right"),
            Command::Straight => write!(f, "straight"),
        }
    }
}

/// Identifier of one command-specific control branch.
///
/// The set is closed: every [`Command`] maps to exactly one branch and there
/// is no catch-all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchId {
    FollowLane,
    Left,
    Right,
    Straight,
}

impl BranchId {
    pub const ALL: [BranchId; 4] = [
        BranchId::FollowLane,
        BranchId::Left,
        BranchId::Right,
        BranchId::Straight,
    ];

    /// Name used in parameter keys (`branch.<name>.fc0.weight`, …).
    pub fn name(self) -> &'static str {
        match self {
            BranchId::FollowLane => "follow_lane",
            BranchId::Left => "left",
            BranchId::Right => "right",
            BranchId::Straight => "straight",
        }
    }
}

impl std::fmt::Display for BranchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One sensor snapshot handed to the engine.
///
/// `image` is a `height × width × 3` RGB grid already resized to the
/// engine's canonical size and scaled into `[0, 1]`.  The caller owns that
/// conversion; the engine only checks the shape.
#[derive(Debug, Clone)]
pub struct Observation {
    pub image: Array3<f32>,
    /// Forward speed (m/s).
    pub speed: f32,
    /// Raw navigation code, decoded by the branch router.
    pub command: CommandCode,
}

impl Observation {
    pub fn new(image: Array3<f32>, speed: f32, command: CommandCode) -> Self {
        Self {
            image,
            speed,
            command,
        }
    }
}

/// Unprocessed output of a single control branch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawControl {
    pub steer: f32,
    pub acceleration: f32,
    /// Always non-negative; see [`RawControl::from_outputs`].
    pub brake: f32,
}

impl RawControl {
    /// Build a triplet from the three branch outputs `[steer, acc, brake]`.
    ///
    /// The brake head is unconstrained during training, so its absolute value
    /// is taken here.
    pub fn from_outputs(outputs: [f32; 3]) -> Self {
        Self {
            steer: outputs[0],
            acceleration: outputs[1],
            brake: outputs[2].abs(),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.steer.is_finite() && self.acceleration.is_finite() && self.brake.is_finite()
    }
}

/// Final vehicle command handed to the actuation layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlCommand {
    /// Steering in `[-1, 1]`.
    pub steer: f32,
    /// Throttle in `[0, 1]`.
    pub throttle: f32,
    /// Brake in `[0, 1]`.
    pub brake: f32,
    pub hand_brake: bool,
    pub reverse: bool,
}

impl ControlCommand {
    /// A fully released command (no steer, throttle, or brake).
    pub fn idle() -> Self {
        Self {
            steer: 0.0,
            throttle: 0.0,
            brake: 0.0,
            hand_brake: false,
            reverse: false,
        }
    }
}

/// Error type shared by every `cil-*` crate.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CilError {
    #[error("Shape Error: expected {expected}, got {actual}")]
    Shape { expected: String, actual: String },

    #[error("Unknown Command: raw code {0} is not a recognised navigation command")]
    UnknownCommand(CommandCode),

    #[error("Load Error: {0}")]
    Load(String),

    #[error("Numeric Anomaly in {branch} branch: {details}")]
    NumericAnomaly { branch: String, details: String },

    #[error("Timeout: batch of {batch} observations exceeded {timeout_ms} ms")]
    Timeout { batch: usize, timeout_ms: u64 },

    #[error("Worker Error: {0}")]
    Worker(String),

    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },
}

impl CilError {
    /// Convenience constructor for [`CilError::Shape`].
    pub fn shape(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        CilError::Shape {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follow_lane_codes_are_aliased() {
        assert_eq!(Command::from_code(0).unwrap(), Command::FollowLane);
        assert_eq!(Command::from_code(2).unwrap(), Command::FollowLane);
    }

    #[test]
    fn directional_codes_map_one_to_one() {
        assert_eq!(Command::from_code(3).unwrap(), Command::Left);
        assert_eq!(Command::from_code(4).unwrap(), Command::Right);
        assert_eq!(Command::from_code(5).unwrap(), Command::Straight);
    }

    #[test]
    fn unknown_codes_are_rejected() {
        for code in [-1, 1, 6, 42] {
            assert_eq!(
                Command::try_from(code),
                Err(CilError::UnknownCommand(code)),
                "code {code} must not fall through to a default branch"
            );
        }
    }

    #[test]
    fn canonical_code_decodes_back() {
        for cmd in Command::ALL {
            assert_eq!(Command::from_code(cmd.code()).unwrap(), cmd);
        }
    }

    #[test]
    fn raw_control_takes_absolute_brake() {
        let raw = RawControl::from_outputs([0.1, 0.4, -0.7]);
        assert!((raw.brake - 0.7).abs() < f32::EPSILON);
        assert!((raw.steer - 0.1).abs() < f32::EPSILON);
    }

    #[test]
    fn raw_control_detects_non_finite() {
        assert!(RawControl::from_outputs([0.0, 0.0, 0.0]).is_finite());
        assert!(!RawControl::from_outputs([f32::NAN, 0.0, 0.0]).is_finite());
        assert!(!RawControl::from_outputs([0.0, 0.0, f32::NEG_INFINITY]).is_finite());
    }

    #[test]
    fn control_command_json_roundtrip() {
        let cmd = ControlCommand {
            steer: -0.25,
            throttle: 0.5,
            brake: 0.0,
            hand_brake: false,
            reverse: false,
        };
        let json = serde_json::to_string(&cmd).unwrap();
        let back: ControlCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(cmd, back);
    }

    #[test]
    fn cil_error_display() {
        let err = CilError::UnknownCommand(9);
        assert!(err.to_string().contains("raw code 9"));

        let err = CilError::shape("88x200x3", "88x200x4");
        assert!(err.to_string().contains("88x200x4"));
    }
}
