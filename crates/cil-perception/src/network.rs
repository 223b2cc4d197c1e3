//! [`NetworkSpec`] – declared architecture of the conditional network.
//!
//! A `NetworkSpec` is the single source of truth for layer widths.  Every tower,
//! the fusion stage, and each branch read their dimensions from it, and the
//! parameter manifest ([`NetworkSpec::manifest`]) derived from it is what a
//! persisted [`ParamSet`][crate::params::ParamSet] is validated against.
//!
//! # Example
//!
//! ```rust
//! use cil_perception::network::NetworkSpec;
//!
//! let spec = NetworkSpec::standard(200, 88);
//! assert_eq!(spec.flatten_len().unwrap(), 8192);
//! assert_eq!(spec.joint_input_len().unwrap(), 640);
//! ```

use std::collections::BTreeMap;

use cil_types::{BranchId, CilError};
use serde::{Deserialize, Serialize};

/// Width of a branch output: steer, acceleration, brake.
pub const CONTROL_OUTPUTS: usize = 3;

/// Default canonical image width (pixels).
pub const DEFAULT_IMAGE_WIDTH: usize = 200;
/// Default canonical image height (pixels).
pub const DEFAULT_IMAGE_HEIGHT: usize = 88;

/// One convolution block of the perception tower.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvStage {
    pub out_channels: usize,
    pub kernel: usize,
    pub stride: usize,
}

impl ConvStage {
    pub const fn new(out_channels: usize, kernel: usize, stride: usize) -> Self {
        Self {
            out_channels,
            kernel,
            stride,
        }
    }
}

/// Full architecture description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub image_width: usize,
    pub image_height: usize,
    pub image_channels: usize,
    /// Convolution blocks, applied in order without padding.
    pub conv: Vec<ConvStage>,
    /// Fully-connected widths after the flatten.
    pub image_fc: Vec<usize>,
    /// Fully-connected widths of the measurement tower (input is one scalar).
    pub measurement_fc: Vec<usize>,
    /// Output width of the fusion projection.
    pub joint_width: usize,
    /// Hidden widths of each branch before the control projection.
    pub branch_hidden: Vec<usize>,
}

impl NetworkSpec {
    /// The layout the driving checkpoints are trained with.
    pub fn standard(image_width: usize, image_height: usize) -> Self {
        Self {
            image_width,
            image_height,
            image_channels: 3,
            conv: vec![
                ConvStage::new(32, 5, 2),
                ConvStage::new(32, 3, 1),
                ConvStage::new(64, 3, 2),
                ConvStage::new(64, 3, 1),
                ConvStage::new(128, 3, 2),
                ConvStage::new(128, 3, 1),
                ConvStage::new(256, 3, 1),
                ConvStage::new(256, 3, 1),
            ],
            image_fc: vec![512, 512],
            measurement_fc: vec![128, 128],
            joint_width: 512,
            branch_hidden: vec![256, 256],
        }
    }

    /// Shape of the last feature map as `(channels, rows, cols)`.
    ///
    /// The tower reads images as `(channels, width, height)`, so `rows`
    /// follows the image width and `cols` the image height.
    ///
    /// # Errors
    ///
    /// [`CilError::Shape`] when the image is too small for the conv stack or
    /// a stage has a zero kernel/stride.
    pub fn conv_output(&self) -> Result<(usize, usize, usize), CilError> {
        let mut channels = self.image_channels;
        let mut rows = self.image_width;
        let mut cols = self.image_height;
        for (i, stage) in self.conv.iter().enumerate() {
            if stage.kernel == 0 || stage.stride == 0 {
                return Err(CilError::shape(
                    "non-zero kernel and stride",
                    format!("conv{i} kernel={} stride={}", stage.kernel, stage.stride),
                ));
            }
            if rows < stage.kernel || cols < stage.kernel {
                return Err(CilError::shape(
                    format!("feature map of at least {0}x{0} at conv{i}", stage.kernel),
                    format!("{rows}x{cols}"),
                ));
            }
            rows = (rows - stage.kernel) / stage.stride + 1;
            cols = (cols - stage.kernel) / stage.stride + 1;
            channels = stage.out_channels;
        }
        Ok((channels, rows, cols))
    }

    /// Number of values produced by the flatten step.
    pub fn flatten_len(&self) -> Result<usize, CilError> {
        let (c, r, k) = self.conv_output()?;
        Ok(c * r * k)
    }

    pub fn image_features(&self) -> Result<usize, CilError> {
        match self.image_fc.last() {
            Some(&n) => Ok(n),
            None => self.flatten_len(),
        }
    }

    pub fn measurement_features(&self) -> usize {
        self.measurement_fc.last().copied().unwrap_or(1)
    }

    /// Width of the concatenated `[image, measurement]` vector.
    pub fn joint_input_len(&self) -> Result<usize, CilError> {
        Ok(self.image_features()? + self.measurement_features())
    }

    /// Every parameter key this architecture expects, with its shape.
    ///
    /// Linear weights are `[out, in]`; conv weights are `[out, in, k, k]`.
    pub fn manifest(&self) -> Result<BTreeMap<String, Vec<usize>>, CilError> {
        let mut manifest = BTreeMap::new();

        let mut in_channels = self.image_channels;
        for (i, stage) in self.conv.iter().enumerate() {
            let out = stage.out_channels;
            manifest.insert(
                format!("image.conv{i}.weight"),
                vec![out, in_channels, stage.kernel, stage.kernel],
            );
            manifest.insert(format!("image.conv{i}.bias"), vec![out]);
            for field in ["gamma", "beta", "running_mean", "running_var"] {
                manifest.insert(format!("image.bn{i}.{field}"), vec![out]);
            }
            in_channels = out;
        }

        insert_dense_stack(&mut manifest, "image", self.flatten_len()?, &self.image_fc);
        insert_dense_stack(&mut manifest, "measurement", 1, &self.measurement_fc);
        insert_dense(&mut manifest, "joint.fc0", self.joint_input_len()?, self.joint_width);

        for branch in BranchId::ALL {
            let prefix = format!("branch.{}", branch.name());
            let width =
                insert_dense_stack(&mut manifest, &prefix, self.joint_width, &self.branch_hidden);
            insert_dense(&mut manifest, &format!("{prefix}.out"), width, CONTROL_OUTPUTS);
        }

        Ok(manifest)
    }
}

impl Default for NetworkSpec {
    fn default() -> Self {
        Self::standard(DEFAULT_IMAGE_WIDTH, DEFAULT_IMAGE_HEIGHT)
    }
}

fn insert_dense(
    manifest: &mut BTreeMap<String, Vec<usize>>,
    prefix: &str,
    input: usize,
    output: usize,
) {
    manifest.insert(format!("{prefix}.weight"), vec![output, input]);
    manifest.insert(format!("{prefix}.bias"), vec![output]);
}

// Returns the output width of the stack.
fn insert_dense_stack(
    manifest: &mut BTreeMap<String, Vec<usize>>,
    prefix: &str,
    input: usize,
    widths: &[usize],
) -> usize {
    let mut width = input;
    for (i, &out) in widths.iter().enumerate() {
        insert_dense(manifest, &format!("{prefix}.fc{i}"), width, out);
        width = out;
    }
    width
}
