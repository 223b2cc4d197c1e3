//! Frame normalisation for the perception tower.
//!
//! The engine only accepts `height × width × 3` RGB grids scaled into
//! `[0, 1]` at its canonical size.  [`normalize_frame`] is the conversion a
//! sensor layer performs before calling it:
//!
//! 1. colour layout → RGB,
//! 2. bilinear resize (half-pixel centres) to `width × height`,
//! 3. scale by `1 / 255`.

use cil_types::CilError;
use ndarray::Array3;
use tracing::trace;

use crate::camera::CameraFrame;

const INV_255: f32 = 1.0 / 255.0;

/// Convert `frame` to a normalised `height × width × 3` RGB image.
///
/// # Errors
///
/// [`CilError::Shape`] when the frame or the target size is empty, or the
/// buffer length disagrees with the frame geometry.
pub fn normalize_frame(
    frame: &CameraFrame,
    width: usize,
    height: usize,
) -> Result<Array3<f32>, CilError> {
    let (src_w, src_h) = (frame.width as usize, frame.height as usize);
    if src_w == 0 || src_h == 0 || width == 0 || height == 0 {
        return Err(CilError::shape(
            "non-empty frame and target",
            format!("{src_w}x{src_h} → {width}x{height}"),
        ));
    }
    let expected = src_w * src_h * frame.layout.bytes_per_pixel();
    if frame.data.len() != expected {
        return Err(CilError::shape(
            format!("{expected} bytes"),
            format!("{} bytes", frame.data.len()),
        ));
    }

    let xs = sample_axis(src_w, width);
    let ys = sample_axis(src_h, height);
    let layout = frame.layout;
    let data = &frame.data;

    let mut out = Array3::<f32>::zeros((height, width, 3));
    for (y, &(y0, y1, wy)) in ys.iter().enumerate() {
        for (x, &(x0, x1, wx)) in xs.iter().enumerate() {
            let p00 = layout.rgb_at(data, y0 * src_w + x0);
            let p01 = layout.rgb_at(data, y0 * src_w + x1);
            let p10 = layout.rgb_at(data, y1 * src_w + x0);
            let p11 = layout.rgb_at(data, y1 * src_w + x1);
            for c in 0..3 {
                let top = f32::from(p00[c]) * (1.0 - wx) + f32::from(p01[c]) * wx;
                let bottom = f32::from(p10[c]) * (1.0 - wx) + f32::from(p11[c]) * wx;
                out[[y, x, c]] = (top * (1.0 - wy) + bottom * wy) * INV_255;
            }
        }
    }

    trace!(src_w, src_h, width, height, "normalised frame");
    Ok(out)
}

// For each destination index: (lower source index, upper source index, weight of upper).
fn sample_axis(src: usize, dst: usize) -> Vec<(usize, usize, f32)> {
    let scale = src as f32 / dst as f32;
    let last = src - 1;
    (0..dst)
        .map(|i| {
            let pos = ((i as f32 + 0.5) * scale - 0.5).clamp(0.0, last as f32);
            let lo = pos.floor() as usize;
            let hi = (lo + 1).min(last);
            (lo, hi, pos - lo as f32)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::PixelLayout;

    fn solid(width: u32, height: u32, layout: PixelLayout, px: &[u8]) -> CameraFrame {
        let data = px.repeat(width as usize * height as usize);
        CameraFrame::new(width, height, layout, data).unwrap()
    }

    #[test]
    fn output_has_target_shape() {
        let frame = solid(40, 30, PixelLayout::Rgb, &[0, 0, 0]);
        let img = normalize_frame(&frame, 20, 10).unwrap();
        assert_eq!(img.dim(), (10, 20, 3));
    }

    #[test]
    fn values_are_scaled_into_unit_range() {
        let frame = solid(4, 4, PixelLayout::Rgb, &[255, 0, 51]);
        let img = normalize_frame(&frame, 4, 4).unwrap();
        assert!((img[[0, 0, 0]] - 1.0).abs() < 1e-6);
        assert_eq!(img[[0, 0, 1]], 0.0);
        assert!((img[[3, 3, 2]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn bgr_input_is_reordered() {
        let frame = solid(2, 2, PixelLayout::Bgr, &[255, 0, 0]);
        let img = normalize_frame(&frame, 2, 2).unwrap();
        // blue in BGR is the last RGB channel
        assert_eq!(img[[0, 0, 0]], 0.0);
        assert!((img[[0, 0, 2]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn bgra_alpha_is_dropped() {
        let frame = solid(3, 2, PixelLayout::Bgra, &[0, 255, 0, 128]);
        let img = normalize_frame(&frame, 3, 2).unwrap();
        assert!((img[[1, 2, 1]] - 1.0).abs() < 1e-6);
        assert_eq!(img[[1, 2, 0]], 0.0);
    }

    #[test]
    fn same_size_is_exact_copy() {
        let data: Vec<u8> = (0..2 * 3 * 3).map(|v| (v * 10) as u8).collect();
        let frame = CameraFrame::new(3, 2, PixelLayout::Rgb, data.clone()).unwrap();
        let img = normalize_frame(&frame, 3, 2).unwrap();
        for (i, &byte) in data.iter().enumerate() {
            let (y, x, c) = (i / 9, (i / 3) % 3, i % 3);
            assert!((img[[y, x, c]] - byte as f32 / 255.0).abs() < 1e-6);
        }
    }

    #[test]
    fn downscale_averages_neighbours() {
        // Columns alternate 0 / 255; halving the width lands between them.
        let mut data = Vec::new();
        for _ in 0..2 {
            for x in 0..4 {
                let v = if x % 2 == 0 { 0 } else { 255 };
                data.extend_from_slice(&[v, v, v]);
            }
        }
        let frame = CameraFrame::new(4, 2, PixelLayout::Rgb, data).unwrap();
        let img = normalize_frame(&frame, 2, 2).unwrap();
        assert!((img[[0, 0, 0]] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn empty_target_is_rejected() {
        let frame = solid(2, 2, PixelLayout::Rgb, &[0, 0, 0]);
        assert!(matches!(normalize_frame(&frame, 0, 2), Err(CilError::Shape { .. })));
    }
}
