//! [`ParamSet`] – versioned, named parameter blob.
//!
//! A parameter set maps layer keys (`image.conv0.weight`,
//! `branch.left.out.bias`, …) to dense `f32` tensors.  It is the only data
//! structure shared between training and inference: trainers write it,
//! the inference engine reads it once at construction and never mutates it.
//!
//! On disk the set is stored as MessagePack.  Loading checks the format
//! version and the internal consistency of every tensor; checking the key
//! set against an architecture is a separate step ([`ParamSet::validate`])
//! because the same blob format serves every [`NetworkSpec`].

use std::collections::BTreeMap;
use std::path::Path;

use cil_types::CilError;
use ndarray::{Array1, Array2, Array4};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::network::NetworkSpec;

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

/// Bias value given to freshly initialised linear layers.
const LINEAR_BIAS_INIT: f32 = 0.1;

/// A single dense tensor in row-major order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamTensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl ParamTensor {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self, CilError> {
        let expected = element_count(&shape)?;
        if expected != data.len() {
            return Err(CilError::Load(format!(
                "tensor of shape {shape:?} needs {expected} values, got {}",
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    /// Tensor of the given shape filled with `value`.
    pub fn filled(shape: Vec<usize>, value: f32) -> Self {
        let len = shape.iter().product();
        Self {
            shape,
            data: vec![value; len],
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Named parameter blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSet {
    pub format_version: u32,
    /// Free-form model name, e.g. the checkpoint it was exported from.
    pub name: String,
    pub tensors: BTreeMap<String, ParamTensor>,
}

impl ParamSet {
    /// Create an empty set at the current format version.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            name: name.into(),
            tensors: BTreeMap::new(),
        }
    }

    /// Insert or replace the tensor stored under `key`.
    pub fn insert(&mut self, key: impl Into<String>, tensor: ParamTensor) {
        self.tensors.insert(key.into(), tensor);
    }

    pub fn get(&self, key: &str) -> Result<&ParamTensor, CilError> {
        self.tensors
            .get(key)
            .ok_or_else(|| CilError::Load(format!("missing parameter '{key}'")))
    }

    /// Total number of scalar parameters.
    pub fn parameter_count(&self) -> usize {
        self.tensors.values().map(ParamTensor::len).sum()
    }

    /// Build a fresh parameter set for `spec`.
    ///
    /// Weights are Xavier-uniform, linear biases are 0.1, conv biases are
    /// zero and batch-norm statistics are the identity.  The same `seed`
    /// always yields the same set.
    pub fn initialise(spec: &NetworkSpec, seed: u64) -> Result<Self, CilError> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut set = ParamSet::new(format!("init-{seed}"));

        for (key, shape) in spec.manifest()? {
            let tensor = if key.ends_with(".weight") {
                xavier_uniform(&mut rng, shape)
            } else if key.ends_with(".running_var") || key.ends_with(".gamma") {
                ParamTensor::filled(shape, 1.0)
            } else if key.starts_with("image.conv") || key.starts_with("image.bn") {
                ParamTensor::filled(shape, 0.0)
            } else {
                ParamTensor::filled(shape, LINEAR_BIAS_INIT)
            };
            set.insert(key, tensor);
        }

        debug!(parameters = set.parameter_count(), seed, "initialised parameter set");
        Ok(set)
    }

    /// Check that the key set and every shape match `spec` exactly.
    ///
    /// # Errors
    ///
    /// [`CilError::Load`] naming the missing, unexpected, or mis-shaped keys.
    pub fn validate(&self, spec: &NetworkSpec) -> Result<(), CilError> {
        if self.format_version != FORMAT_VERSION {
            return Err(CilError::Load(format!(
                "unsupported format version {} (expected {FORMAT_VERSION})",
                self.format_version
            )));
        }

        let manifest = spec.manifest()?;
        let mut problems = Vec::new();

        for (key, shape) in &manifest {
            match self.tensors.get(key) {
                None => problems.push(format!("missing '{key}'")),
                Some(t) if &t.shape != shape => problems.push(format!(
                    "'{key}' has shape {:?}, expected {shape:?}",
                    t.shape
                )),
                Some(t) => match element_count(shape) {
                    Ok(expected) if expected == t.data.len() => {}
                    Ok(_) => problems.push(format!("'{key}' holds {} values", t.data.len())),
                    Err(_) => problems.push(format!("'{key}' shape {shape:?} overflows")),
                },
            }
        }
        for key in self.tensors.keys() {
            if !manifest.contains_key(key) {
                problems.push(format!("unexpected '{key}'"));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(CilError::Load(format!(
                "parameter set '{}' does not match the declared architecture: {}",
                self.name,
                problems.join("; ")
            )))
        }
    }

    /// Encode as MessagePack.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CilError> {
        rmp_serde::to_vec_named(self)
            .map_err(|e| CilError::Load(format!("failed to encode parameter set: {e}")))
    }

    /// Decode from MessagePack, checking version and tensor consistency.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CilError> {
        let set: ParamSet = rmp_serde::from_slice(bytes)
            .map_err(|e| CilError::Load(format!("corrupt parameter set: {e}")))?;
        if set.format_version != FORMAT_VERSION {
            return Err(CilError::Load(format!(
                "unsupported format version {} (expected {FORMAT_VERSION})",
                set.format_version
            )));
        }
        for (key, t) in &set.tensors {
            let expected = element_count(&t.shape).map_err(|_| {
                CilError::Load(format!(
                    "corrupt parameter set: '{key}' shape {:?} overflows",
                    t.shape
                ))
            })?;
            if expected != t.data.len() {
                return Err(CilError::Load(format!(
                    "corrupt parameter set: '{key}' has shape {:?} but {} values",
                    t.shape,
                    t.data.len()
                )));
            }
        }
        Ok(set)
    }

    pub fn save(&self, path: &Path) -> Result<(), CilError> {
        let bytes = self.to_bytes()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                CilError::Load(format!("failed to create {}: {e}", parent.display()))
            })?;
        }
        std::fs::write(path, bytes)
            .map_err(|e| CilError::Load(format!("failed to write {}: {e}", path.display())))?;
        info!(path = %path.display(), tensors = self.tensors.len(), "saved parameter set");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, CilError> {
        let bytes = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                CilError::Load(format!("parameter set not found at {}", path.display()))
            }
            _ => CilError::Load(format!("failed to read {}: {e}", path.display())),
        })?;
        let set = Self::from_bytes(&bytes)?;
        info!(
            path = %path.display(),
            name = %set.name,
            tensors = set.tensors.len(),
            "loaded parameter set"
        );
        Ok(set)
    }

    pub fn array1(&self, key: &str) -> Result<Array1<f32>, CilError> {
        let t = self.get(key)?;
        Array1::from_shape_vec(t.data.len(), t.data.clone())
            .map_err(|e| CilError::Load(format!("'{key}': {e}")))
    }

    pub fn array2(&self, key: &str) -> Result<Array2<f32>, CilError> {
        let t = self.get(key)?;
        match t.shape.as_slice() {
            &[rows, cols] => Array2::from_shape_vec((rows, cols), t.data.clone())
                .map_err(|e| CilError::Load(format!("'{key}': {e}"))),
            other => Err(CilError::Load(format!("'{key}' is {other:?}, expected 2-D"))),
        }
    }

    pub fn array4(&self, key: &str) -> Result<Array4<f32>, CilError> {
        let t = self.get(key)?;
        match t.shape.as_slice() {
            &[a, b, c, d] => Array4::from_shape_vec((a, b, c, d), t.data.clone())
                .map_err(|e| CilError::Load(format!("'{key}': {e}"))),
            other => Err(CilError::Load(format!("'{key}' is {other:?}, expected 4-D"))),
        }
    }
}

/// Number of elements a tensor of `shape` holds, or a load error when the
/// product does not fit in `usize`.
fn element_count(shape: &[usize]) -> Result<usize, CilError> {
    shape
        .iter()
        .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
        .ok_or_else(|| CilError::Load(format!("tensor shape {shape:?} overflows")))
}

fn xavier_uniform(rng: &mut StdRng, shape: Vec<usize>) -> ParamTensor {
    // [out, in] or [out, in, k, k]
    let receptive: usize = shape.iter().skip(2).product();
    let fan_out = shape.first().copied().unwrap_or(1) * receptive;
    let fan_in = shape.get(1).copied().unwrap_or(1) * receptive;
    let bound = (6.0 / (fan_in + fan_out) as f32).sqrt();
    let len = shape.iter().product();
    let data = (0..len).map(|_| rng.gen_range(-bound..=bound)).collect();
    ParamTensor { shape, data }
}
