//! [`EngineConfig`] – explicit engine configuration.
//!
//! Everything the engine needs beyond its parameter set is passed in here;
//! there is no ambient device context and no training-mode switch.

use std::time::Duration;

use cil_perception::NetworkSpec;
use cil_perception::network::{DEFAULT_IMAGE_HEIGHT, DEFAULT_IMAGE_WIDTH};
use serde::{Deserialize, Serialize};

use crate::control::{ControlPostProcessor, DEFAULT_BRAKE_NOISE_FLOOR, DEFAULT_COAST_SPEED};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Canonical input width (pixels).
    #[serde(default = "default_image_width")]
    pub image_width: usize,

    /// Canonical input height (pixels).
    #[serde(default = "default_image_height")]
    pub image_height: usize,

    /// Worker threads for batch evaluation; `0` uses one per core.
    #[serde(default)]
    pub workers: usize,

    #[serde(default = "default_brake_noise_floor")]
    pub brake_noise_floor: f32,

    #[serde(default = "default_coast_speed")]
    pub coast_speed: f32,

    /// Deadline for a whole batch when run through the async wrapper.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_timeout_ms: Option<u64>,
}

fn default_image_width() -> usize {
    DEFAULT_IMAGE_WIDTH
}
fn default_image_height() -> usize {
    DEFAULT_IMAGE_HEIGHT
}
fn default_brake_noise_floor() -> f32 {
    DEFAULT_BRAKE_NOISE_FLOOR
}
fn default_coast_speed() -> f32 {
    DEFAULT_COAST_SPEED
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            image_width: default_image_width(),
            image_height: default_image_height(),
            workers: 0,
            brake_noise_floor: default_brake_noise_floor(),
            coast_speed: default_coast_speed(),
            batch_timeout_ms: None,
        }
    }
}

impl EngineConfig {
    /// Standard architecture at the configured image size.
    pub fn network_spec(&self) -> NetworkSpec {
        NetworkSpec::standard(self.image_width, self.image_height)
    }

    pub fn post_processor(&self) -> ControlPostProcessor {
        ControlPostProcessor::new(self.brake_noise_floor, self.coast_speed)
    }

    pub fn batch_timeout(&self) -> Option<Duration> {
        self.batch_timeout_ms.map(Duration::from_millis)
    }
}
