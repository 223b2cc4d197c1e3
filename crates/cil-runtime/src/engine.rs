//! [`InferenceEngine`] – observation(s) in, control command(s) out.
//!
//! The engine owns an immutable copy of the network (towers, fusion stage,
//! branch set) built from a validated [`ParamSet`], a worker pool, and the
//! control post-processor.  Every call is independent: nothing computed for
//! one call is kept for the next.
//!
//! A batch call runs in three phases:
//!
//! 1. **Validate** – image shape, speed, and command of every observation.
//!    The first failure aborts the call before any compute.
//! 2. **Encode** – towers + fusion per observation, in parallel.
//! 3. **Branch** – [`BatchExecutor::run_branches`], then post-processing.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use cil_perception::{NetworkSpec, ParamSet, SensorFusion};
use cil_types::{CilError, CommandCode, ControlCommand, Observation, RawControl};
use ndarray::ArrayView3;
use tracing::{debug, info, warn};

use crate::branch::{BranchSet, route};
use crate::config::EngineConfig;
use crate::control::ControlPostProcessor;
use crate::executor::BatchExecutor;

/// Conditional imitation network in inference mode.
#[derive(Debug)]
pub struct InferenceEngine {
    model_name: String,
    spec: NetworkSpec,
    fusion: SensorFusion,
    branches: BranchSet,
    executor: BatchExecutor,
    post: ControlPostProcessor,
}

impl InferenceEngine {
    /// Load a parameter set from `path` and build the standard network at
    /// the configured image size.
    ///
    /// # Errors
    ///
    /// [`CilError::Load`] when the file is missing or corrupt, or when its
    /// keys or shapes differ from the declared architecture.
    pub fn load(path: &Path, config: &EngineConfig) -> Result<Self, CilError> {
        let params = ParamSet::load(path)?;
        Self::new(&params, config)
    }

    /// Build the standard network from an in-memory parameter set.
    pub fn new(params: &ParamSet, config: &EngineConfig) -> Result<Self, CilError> {
        Self::with_spec(params, config.network_spec(), config)
    }

    /// Build a network with a custom architecture.
    pub fn with_spec(
        params: &ParamSet,
        spec: NetworkSpec,
        config: &EngineConfig,
    ) -> Result<Self, CilError> {
        params.validate(&spec)?;
        let fusion = SensorFusion::from_params(&spec, params)?;
        let branches = BranchSet::from_params(&spec, params)?;
        let executor = BatchExecutor::new(config.workers)?;

        info!(
            model = %params.name,
            parameters = params.parameter_count(),
            image_width = spec.image_width,
            image_height = spec.image_height,
            workers = executor.workers(),
            "inference engine ready"
        );

        Ok(Self {
            model_name: params.name.clone(),
            spec,
            fusion,
            branches,
            executor,
            post: config.post_processor(),
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn spec(&self) -> &NetworkSpec {
        &self.spec
    }

    pub fn post_processor(&self) -> &ControlPostProcessor {
        &self.post
    }

    /// `(width, height)` the engine expects images at.
    pub fn image_size(&self) -> (usize, usize) {
        let (height, width, _) = self.fusion.perception().input_shape();
        (width, height)
    }

    /// Single-observation inference.  Runs on the calling thread.
    pub fn infer(
        &self,
        image: ArrayView3<f32>,
        speed: f32,
        command: CommandCode,
    ) -> Result<ControlCommand, CilError> {
        let branch = route(command)?;
        let obs = Observation::new(image.to_owned(), speed, command);
        self.fusion.check(&obs)?;
        let joint = self.fusion.fuse(&obs)?;
        let raw = self.branches.evaluate(branch, &joint)?;
        let control = self.post.apply(raw, speed);
        debug!(branch = %branch, ?raw, ?control, "inferred control");
        Ok(control)
    }

    /// Batched inference.  `output[i]` always belongs to `batch[i]`.
    ///
    /// All-or-nothing: any invalid observation or failing branch aborts the
    /// whole call.
    pub fn infer_batch(&self, batch: &[Observation]) -> Result<Vec<ControlCommand>, CilError> {
        let raw = self.infer_raw_batch(batch)?;
        Ok(raw
            .into_iter()
            .zip(batch)
            .map(|(raw, obs)| self.post.apply(raw, obs.speed))
            .collect())
    }

    /// Batched inference without post-processing.
    pub fn infer_raw_batch(&self, batch: &[Observation]) -> Result<Vec<RawControl>, CilError> {
        for (index, obs) in batch.iter().enumerate() {
            if let Err(e) = self.fusion.check(obs).and_then(|_| route(obs.command).map(|_| ())) {
                warn!(sample = index, batch = batch.len(), error = %e, "rejecting batch");
                return Err(e);
            }
        }

        let refs: Vec<&Observation> = batch.iter().collect();
        let joints = self.executor.map_ordered(refs, |_, obs| self.fusion.fuse(obs))?;
        let routed = joints
            .into_iter()
            .zip(batch)
            .map(|(joint, obs)| (joint, obs.command))
            .collect();
        let raw = self.executor.run_branches(&self.branches, routed)?;

        debug!(batch = batch.len(), "batch complete");
        Ok(raw)
    }
}

/// Run [`InferenceEngine::infer_batch`] on a blocking thread with a deadline
/// covering the whole batch.
///
/// On expiry the call returns [`CilError::Timeout`]; the abandoned batch
/// finishes in the background and its results are discarded.
pub async fn infer_batch_with_timeout(
    engine: Arc<InferenceEngine>,
    batch: Vec<Observation>,
    timeout: Duration,
) -> Result<Vec<ControlCommand>, CilError> {
    let len = batch.len();
    run_with_deadline(len, timeout, move || engine.infer_batch(&batch)).await
}

async fn run_with_deadline<R, F>(len: usize, timeout: Duration, work: F) -> Result<R, CilError>
where
    R: Send + 'static,
    F: FnOnce() -> Result<R, CilError> + Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(work)).await {
        Ok(Ok(result)) => result,
        Ok(Err(join)) => Err(CilError::Worker(format!("inference task failed: {join}"))),
        Err(_) => {
            let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
            warn!(batch = len, timeout_ms, "batch deadline exceeded");
            Err(CilError::Timeout {
                batch: len,
                timeout_ms,
            })
        }
    }
}
