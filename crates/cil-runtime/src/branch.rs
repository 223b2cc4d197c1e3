//! Command-conditioned control branches.
//!
//! Routing is a total mapping from [`Command`] to [`BranchId`]; raw codes
//! outside the recognised set are rejected by [`route`] and never reach a
//! branch.  Every branch has the same shape (fc blocks followed by a 3-wide
//! linear head) and its own parameters.  Evaluation only reads weights, so
//! any number of samples may run through the same or different branches at
//! once.

use cil_perception::layers::forward_stack;
use cil_perception::{
    Activation, CONTROL_OUTPUTS, Dense, JointRepresentation, NetworkSpec, ParamSet,
};
use cil_types::{BranchId, CilError, Command, CommandCode, RawControl};

/// Branch that handles `command`.
pub fn branch_for(command: Command) -> BranchId {
    match command {
        Command::FollowLane => BranchId::FollowLane,
        Command::Left => BranchId::Left,
        Command::Right => BranchId::Right,
        Command::Straight => BranchId::Straight,
    }
}

/// Decode a raw navigation code and select its branch.
///
/// # Errors
///
/// [`CilError::UnknownCommand`] for codes outside the recognised set.
pub fn route(code: CommandCode) -> Result<BranchId, CilError> {
    Command::from_code(code).map(branch_for)
}

/// One control branch.
#[derive(Debug, Clone)]
pub struct Branch {
    id: BranchId,
    hidden: Vec<Dense>,
    head: Dense,
}

impl Branch {
    pub fn from_params(
        spec: &NetworkSpec,
        params: &ParamSet,
        id: BranchId,
    ) -> Result<Self, CilError> {
        let prefix = format!("branch.{}", id.name());
        let hidden = (0..spec.branch_hidden.len())
            .map(|i| Dense::from_params(params, &format!("{prefix}.fc{i}"), Activation::Relu))
            .collect::<Result<Vec<_>, _>>()?;
        let head = Dense::from_params(params, &format!("{prefix}.out"), Activation::Identity)?;
        if head.out_features() != CONTROL_OUTPUTS {
            return Err(CilError::Load(format!(
                "{prefix}.out produces {} values, expected {CONTROL_OUTPUTS}",
                head.out_features()
            )));
        }
        Ok(Self { id, hidden, head })
    }

    pub fn id(&self) -> BranchId {
        self.id
    }

    /// Map a joint representation to a raw control triplet.
    ///
    /// # Errors
    ///
    /// - [`CilError::Shape`] – the representation has the wrong width.
    /// - [`CilError::NumericAnomaly`] – the head produced NaN or ±∞.
    pub fn evaluate(&self, joint: &JointRepresentation) -> Result<RawControl, CilError> {
        let hidden = forward_stack(&self.hidden, joint.view().to_owned())?;
        let out = self.head.forward(hidden.view())?;
        let raw = RawControl::from_outputs([out[0], out[1], out[2]]);
        if !raw.is_finite() {
            return Err(CilError::NumericAnomaly {
                branch: self.id.to_string(),
                details: format!(
                    "steer={} acceleration={} brake={}",
                    raw.steer, raw.acceleration, raw.brake
                ),
            });
        }
        Ok(raw)
    }
}

/// The four branches, one per [`BranchId`].
#[derive(Debug, Clone)]
pub struct BranchSet {
    follow_lane: Branch,
    left: Branch,
    right: Branch,
    straight: Branch,
}

impl BranchSet {
    pub fn from_params(spec: &NetworkSpec, params: &ParamSet) -> Result<Self, CilError> {
        Ok(Self {
            follow_lane: Branch::from_params(spec, params, BranchId::FollowLane)?,
            left: Branch::from_params(spec, params, BranchId::Left)?,
            right: Branch::from_params(spec, params, BranchId::Right)?,
            straight: Branch::from_params(spec, params, BranchId::Straight)?,
        })
    }

    pub fn get(&self, id: BranchId) -> &Branch {
        match id {
            BranchId::FollowLane => &self.follow_lane,
            BranchId::Left => &self.left,
            BranchId::Right => &self.right,
            BranchId::Straight => &self.straight,
        }
    }

    pub fn evaluate(
        &self,
        id: BranchId,
        joint: &JointRepresentation,
    ) -> Result<RawControl, CilError> {
        self.get(id).evaluate(joint)
    }
}
