//! `cil-runtime` – conditional imitation inference.
//!
//! Turns an observation (image, speed, navigation command) into a vehicle
//! control.  The network's shared trunk lives in `cil-perception`; this
//! crate adds the command-selected branches, the batch executor, and the
//! rule-based control post-processing.
//!
//! # Modules
//!
//! - [`branch`] – [`route`][branch::route] maps raw command codes to one of
//!   four [`Branch`][branch::Branch]es.
//! - [`executor`] – [`BatchExecutor`][executor::BatchExecutor]: a rayon pool
//!   that evaluates batch samples concurrently and merges results back into
//!   input order.
//! - [`control`] – [`ControlPostProcessor`][control::ControlPostProcessor]:
//!   raw `(steer, acceleration, brake)` → [`ControlCommand`][cil_types::ControlCommand].
//! - [`engine`] – [`InferenceEngine`][engine::InferenceEngine] ties the
//!   above together; [`infer_batch_with_timeout`][engine::infer_batch_with_timeout]
//!   adds a whole-batch deadline.
//! - [`agent`] – [`ImitationAgent`][agent::ImitationAgent]: camera frame in,
//!   actuator command out.
//! - [`config`] – [`EngineConfig`][config::EngineConfig].
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing].

pub mod agent;
pub mod branch;
pub mod config;
pub mod control;
pub mod engine;
pub mod executor;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod test_support;

pub use agent::ImitationAgent;
pub use branch::{Branch, BranchSet, route};
pub use config::EngineConfig;
pub use control::ControlPostProcessor;
pub use engine::{InferenceEngine, infer_batch_with_timeout};
pub use executor::BatchExecutor;
pub use telemetry::{TracerProviderGuard, init_tracing};
