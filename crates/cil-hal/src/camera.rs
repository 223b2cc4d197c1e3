//! Generic `Camera` trait and supporting types for image-capture hardware.

use cil_types::CilError;
use serde::{Deserialize, Serialize};

/// Byte order of the colour channels in a [`CameraFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelLayout {
    Rgb,
    Bgr,
    /// Four bytes per pixel, alpha last (the simulator's native format).
    Bgra,
}

impl PixelLayout {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelLayout::Rgb | PixelLayout::Bgr => 3,
            PixelLayout::Bgra => 4,
        }
    }

    /// Read pixel `p` from `data` as `[r, g, b]`.
    #[inline]
    pub fn rgb_at(self, data: &[u8], p: usize) -> [u8; 3] {
        let i = p * self.bytes_per_pixel();
        match self {
            PixelLayout::Rgb => [data[i], data[i + 1], data[i + 2]],
            PixelLayout::Bgr | PixelLayout::Bgra => [data[i + 2], data[i + 1], data[i]],
        }
    }
}

/// A raw image frame returned by a camera driver.
#[derive(Debug, Clone)]
pub struct CameraFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    pub layout: PixelLayout,
    /// Row-major pixel data.
    pub data: Vec<u8>,
}

impl CameraFrame {
    /// Build a frame, checking that `data` matches the declared geometry.
    pub fn new(
        width: u32,
        height: u32,
        layout: PixelLayout,
        data: Vec<u8>,
    ) -> Result<Self, CilError> {
        let expected = width as usize * height as usize * layout.bytes_per_pixel();
        if data.len() != expected {
            return Err(CilError::shape(
                format!("{expected} bytes for {width}x{height} {layout:?}"),
                format!("{} bytes", data.len()),
            ));
        }
        Ok(Self {
            width,
            height,
            layout,
            data,
        })
    }
}

/// A camera or image-capture device.
pub trait Camera: Send + Sync {
    /// Stable identifier for this camera, e.g. `"front_rgb"`.
    fn id(&self) -> &str;

    /// Capture and return the next available frame.
    ///
    /// # Errors
    ///
    /// Returns [`CilError::HardwareFault`] if the frame cannot be captured
    /// (e.g. the device is disconnected or the buffer is unavailable).
    fn capture(&mut self) -> Result<CameraFrame, CilError>;
}
