//! Temporal difference between two frames.
//!
//! Both frames are normalised to a small fixed raster so the metric is cheap
//! and tolerant of resolution drift between captures. The result is the mean
//! per-pixel, channel-averaged absolute difference, in `[0, 255]`.

use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::frame::{DecodeError, Frame};

/// Side length of the square comparison raster.
pub const DIFF_RASTER: u32 = 50;

/// Dissimilarity of two frames, or the decode error of whichever failed first.
pub fn try_diff(a: &Frame, b: &Frame) -> Result<f64, DecodeError> {
    let a = normalize(a.decode()?);
    let b = normalize(b.decode()?);
    Ok(raster_difference(&a, &b))
}

/// Dissimilarity of two frames; `0.0` when either cannot be decoded.
///
/// Callers that must not mistake an unreadable frame for a perfectly still
/// one should use [`try_diff`].
pub fn diff(a: &Frame, b: &Frame) -> f64 {
    try_diff(a, b).unwrap_or_else(|e| {
        tracing::debug!(error = %e, "frame diff: decode failed, reporting no difference");
        0.0
    })
}

fn normalize(img: RgbImage) -> RgbImage {
    if img.dimensions() == (DIFF_RASTER, DIFF_RASTER) {
        img
    } else {
        imageops::resize(&img, DIFF_RASTER, DIFF_RASTER, FilterType::Triangle)
    }
}

/// Mean channel-averaged absolute difference of two equally sized rasters.
fn raster_difference(a: &RgbImage, b: &RgbImage) -> f64 {
    debug_assert_eq!(a.dimensions(), b.dimensions());

    let pixel_count = a.width() as usize * a.height() as usize;
    if pixel_count == 0 {
        return 0.0;
    }

    let total: f64 = a
        .pixels()
        .zip(b.pixels())
        .map(|(pa, pb)| {
            let sum: u32 = pa
                .0
                .iter()
                .zip(pb.0.iter())
                .map(|(&ca, &cb)| ca.abs_diff(cb) as u32)
                .sum();
            sum as f64 / 3.0
        })
        .sum();

    total / pixel_count as f64
}
