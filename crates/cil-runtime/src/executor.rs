//! [`BatchExecutor`] – parallel map with ordered merge.
//!
//! # Algorithm
//!
//! 1. **Partition** – every sample is tagged with its position in the input
//!    batch and grouped by the branch its command selects.  Routing errors
//!    surface here, before any branch runs.
//! 2. **Dispatch** – each `(branch, index, joint)` task runs on the worker
//!    pool.  Branch weights are read-only, so tasks need no locking.
//! 3. **Barrier** – the pool call returns only after every task finished or
//!    one failed; a failure discards all other results.
//! 4. **Merge** – results are written back into the slot named by the index
//!    captured in step 1.  Completion order is never consulted.
//!
//! The same machinery backs [`BatchExecutor::map_ordered`], which the engine
//! uses for the per-sample tower and fusion work.

use std::collections::BTreeMap;

use cil_perception::JointRepresentation;
use cil_types::{BranchId, CilError, CommandCode, RawControl};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

use crate::branch::{BranchSet, route};

/// Worker pool that evaluates batches and returns results in input order.
pub struct BatchExecutor {
    pool: ThreadPool,
}

impl BatchExecutor {
    /// Build a pool with `workers` threads (`0` lets rayon pick one per core).
    pub fn new(workers: usize) -> Result<Self, CilError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("cil-worker-{i}"))
            .build()
            .map_err(|e| CilError::Worker(format!("failed to build worker pool: {e}")))?;
        Ok(Self { pool })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Apply `f` to every item concurrently and return the results in input
    /// order.  `f` receives the item's original index.
    ///
    /// All-or-nothing: if any call fails the error is returned and every
    /// other result is dropped.
    pub fn map_ordered<T, R, F>(&self, items: Vec<T>, f: F) -> Result<Vec<R>, CilError>
    where
        T: Send,
        R: Send,
        F: Fn(usize, T) -> Result<R, CilError> + Sync,
    {
        let len = items.len();
        let tagged = self.pool.install(|| {
            items
                .into_par_iter()
                .enumerate()
                .map(|(index, item)| f(index, item).map(|r| (index, r)))
                .collect::<Result<Vec<_>, _>>()
        })?;
        merge_by_index(len, tagged)
    }

    /// Route each `(joint, command)` pair to its branch, evaluate all of them
    /// concurrently, and return the raw triplets in input order.
    ///
    /// # Errors
    ///
    /// - [`CilError::UnknownCommand`] – a code outside the recognised set;
    ///   nothing is evaluated.
    /// - any error from [`Branch::evaluate`][crate::branch::Branch::evaluate];
    ///   the whole batch fails.
    pub fn run_branches(
        &self,
        branches: &BranchSet,
        batch: Vec<(JointRepresentation, CommandCode)>,
    ) -> Result<Vec<RawControl>, CilError> {
        let len = batch.len();
        let partitions = partition(batch)?;
        debug!(
            batch = len,
            branches = partitions.len(),
            workers = self.workers(),
            "dispatching branch evaluations"
        );

        let tasks: Vec<(BranchId, usize, JointRepresentation)> = partitions
            .into_iter()
            .flat_map(|(id, samples)| {
                samples.into_iter().map(move |(index, joint)| (id, index, joint))
            })
            .collect();

        // `install` blocks until the parallel collect has joined every task.
        let tagged = self.pool.install(|| {
            tasks
                .into_par_iter()
                .map(|(id, index, joint)| branches.evaluate(id, &joint).map(|raw| (index, raw)))
                .collect::<Result<Vec<_>, _>>()
        })?;
        merge_by_index(len, tagged)
    }
}

impl std::fmt::Debug for BatchExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchExecutor")
            .field("workers", &self.workers())
            .finish()
    }
}

/// Group samples by branch, keeping each sample's original index.
pub fn partition(
    batch: Vec<(JointRepresentation, CommandCode)>,
) -> Result<BTreeMap<BranchId, Vec<(usize, JointRepresentation)>>, CilError> {
    let mut groups: BTreeMap<BranchId, Vec<(usize, JointRepresentation)>> = BTreeMap::new();
    for (index, (joint, code)) in batch.into_iter().enumerate() {
        groups.entry(route(code)?).or_default().push((index, joint));
    }
    Ok(groups)
}

/// Place each `(index, value)` into slot `index` of a `len`-long vector.
fn merge_by_index<R>(len: usize, tagged: Vec<(usize, R)>) -> Result<Vec<R>, CilError> {
    let mut slots: Vec<Option<R>> = std::iter::repeat_with(|| None).take(len).collect();
    for (index, value) in tagged {
        let Some(slot) = slots.get_mut(index) else {
            return Err(CilError::Worker(format!("result index {index} outside batch of {len}")));
        };
        if slot.is_some() {
            return Err(CilError::Worker(format!("duplicate result for sample {index}")));
        }
        *slot = Some(value);
    }
    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.ok_or_else(|| CilError::Worker(format!("no result for sample {index}")))
        })
        .collect()
}
