//! Per-frame plausibility scoring.
//!
//! A frame is a usable face candidate when it is neither too dark nor blown
//! out, carries enough tonal variation to not be a blank or heavily blurred
//! capture, and is large enough to say anything at all. This is a lighting
//! and exposure gate, not a face detector.

use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::Serialize;

use crate::frame::{decode_rgb, DecodeError, Frame};

/// Frames are downscaled so that neither side exceeds this before measuring.
pub const MAX_ANALYSIS_DIM: u32 = 200;

/// Mean luma must be strictly above this (rejects near-black frames).
pub const MIN_BRIGHTNESS: f64 = 40.0;
/// Mean luma must be strictly below this (rejects overexposed frames).
pub const MAX_BRIGHTNESS: f64 = 200.0;
/// RMS luma deviation must be strictly above this (rejects flat or blurred frames).
pub const MIN_CONTRAST: f64 = 15.0;
/// Analysed pixel count must be strictly above this (rejects degenerate captures).
pub const MIN_PIXELS: usize = 1000;

/// Brightness/contrast statistics of one analysed frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrameStats {
    /// Mean per-pixel luma, in `[0, 255]`.
    pub brightness: f64,
    /// Root-mean-square deviation of per-pixel luma from `brightness`.
    pub contrast: f64,
    /// Number of pixels in the analysed (possibly downscaled) raster.
    pub pixel_count: usize,
}

impl FrameStats {
    /// Compute statistics over every pixel of `img`.
    ///
    /// Luma is the unweighted mean of the three channels.
    pub fn of(img: &RgbImage) -> Self {
        let pixel_count = img.width() as usize * img.height() as usize;
        if pixel_count == 0 {
            return Self {
                brightness: 0.0,
                contrast: 0.0,
                pixel_count: 0,
            };
        }

        let luma = |p: &image::Rgb<u8>| (p[0] as f64 + p[1] as f64 + p[2] as f64) / 3.0;

        let brightness = img.pixels().map(luma).sum::<f64>() / pixel_count as f64;
        let variance = img
            .pixels()
            .map(|p| {
                let d = luma(p) - brightness;
                d * d
            })
            .sum::<f64>()
            / pixel_count as f64;

        Self {
            brightness,
            contrast: variance.sqrt(),
            pixel_count,
        }
    }

    /// Whether these statistics describe a plausible face capture.
    pub fn is_valid_face(&self) -> bool {
        self.brightness > MIN_BRIGHTNESS
            && self.brightness < MAX_BRIGHTNESS
            && self.contrast > MIN_CONTRAST
            && self.pixel_count > MIN_PIXELS
    }
}

/// Decode encoded image bytes and measure them.
///
/// Each side is capped at [`MAX_ANALYSIS_DIM`]; the aspect ratio is not
/// preserved, matching how the capture surface stretches into a bounded
/// analysis canvas.
pub fn measure(data: &[u8]) -> Result<FrameStats, DecodeError> {
    let img = decode_rgb(data)?;
    let (w, h) = img.dimensions();
    let (tw, th) = (w.min(MAX_ANALYSIS_DIM), h.min(MAX_ANALYSIS_DIM));

    let stats = if (tw, th) == (w, h) {
        FrameStats::of(&img)
    } else {
        FrameStats::of(&imageops::resize(&img, tw, th, FilterType::Triangle))
    };
    Ok(stats)
}

/// Accept or reject a frame. Undecodable frames are rejected, never raised.
pub fn score(frame: &Frame) -> bool {
    match measure(frame.data()) {
        Ok(stats) => {
            let accepted = stats.is_valid_face();
            tracing::trace!(
                brightness = stats.brightness,
                contrast = stats.contrast,
                pixels = stats.pixel_count,
                accepted,
                "frame scored"
            );
            accepted
        }
        Err(e) => {
            tracing::debug!(error = %e, "frame rejected: decode failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{encode_png, noise, uniform};
    use image::Rgb;

    fn frame(img: &RgbImage) -> Frame {
        Frame::new(encode_png(img))
    }

    #[test]
    fn test_uniform_gray_always_rejected() {
        // Zero contrast fails regardless of brightness
        for g in [0u8, 20, 40, 120, 200, 230, 255] {
            assert!(!score(&frame(&uniform(64, 64, g))), "gray {g} accepted");
        }
    }

    #[test]
    fn test_uniform_gray_stats() {
        let stats = measure(&encode_png(&uniform(64, 64, 120))).unwrap();
        assert!((stats.brightness - 120.0).abs() < 1e-9);
        assert!(stats.contrast.abs() < 1e-9);
        assert_eq!(stats.pixel_count, 64 * 64);
    }

    #[test]
    fn test_noisy_midtone_accepted() {
        let img = noise(64, 64, 120, 60, 7);
        let stats = measure(&encode_png(&img)).unwrap();
        assert!(stats.contrast > MIN_CONTRAST, "contrast {}", stats.contrast);
        assert!(stats.brightness > MIN_BRIGHTNESS && stats.brightness < MAX_BRIGHTNESS);
        assert!(score(&frame(&img)));
    }

    #[test]
    fn test_dark_noise_rejected() {
        // Plenty of contrast but mean luma around 25
        let img = noise(64, 64, 25, 25, 11);
        assert!(!score(&frame(&img)));
    }

    #[test]
    fn test_bright_noise_rejected() {
        let img = noise(64, 64, 230, 25, 13);
        assert!(!score(&frame(&img)));
    }

    #[test]
    fn test_too_small_rejected() {
        // 30x30 = 900 pixels, below the minimum even with good exposure
        let img = noise(30, 30, 120, 60, 3);
        let stats = measure(&encode_png(&img)).unwrap();
        assert_eq!(stats.pixel_count, 900);
        assert!(!stats.is_valid_face());
    }

    #[test]
    fn test_large_frame_downscaled() {
        // Wide vertical bands survive downscaling with their contrast intact
        let img = RgbImage::from_fn(640, 480, |x, _| {
            if (x / 64) % 2 == 0 {
                Rgb([80, 80, 80])
            } else {
                Rgb([160, 160, 160])
            }
        });
        let stats = measure(&encode_png(&img)).unwrap();
        assert_eq!(stats.pixel_count, 200 * 200);
        assert!((stats.brightness - 120.0).abs() < 5.0);
        assert!(stats.contrast > 30.0);
        assert!(stats.is_valid_face());
    }

    #[test]
    fn test_only_oversized_side_is_capped() {
        let img = noise(300, 60, 120, 60, 5);
        let stats = measure(&encode_png(&img)).unwrap();
        assert_eq!(stats.pixel_count, 200 * 60);
    }

    #[test]
    fn test_corrupt_frame_rejected() {
        assert!(!score(&Frame::new(b"not an image".to_vec())));
        assert!(measure(b"not an image").is_err());
    }

    #[test]
    fn test_contrast_is_rms_deviation() {
        // Half the pixels at 100, half at 140: mean 120, every deviation 20
        let img = RgbImage::from_fn(40, 40, |x, _| {
            if x < 20 {
                Rgb([100, 100, 100])
            } else {
                Rgb([140, 140, 140])
            }
        });
        let stats = FrameStats::of(&img);
        assert!((stats.brightness - 120.0).abs() < 1e-9);
        assert!((stats.contrast - 20.0).abs() < 1e-9);
        assert!(stats.is_valid_face());
    }
}
