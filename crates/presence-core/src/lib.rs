//! Presence core: the per-frame and per-sequence analysis behind liveness-gated
//! attendance capture.
//!
//! Everything here is synchronous and side-effect free: decoding, measuring and
//! comparing encoded still images, and deciding whether a sequence of accepted
//! frames looks like a live subject. Scheduling, camera access and submission
//! live in `presence-capture`.

pub mod differ;
pub mod frame;
pub mod geo;
pub mod liveness;
pub mod scorer;

pub use differ::{diff, try_diff};
pub use frame::{DecodeError, Frame};
pub use geo::{GeoLocation, Geofence, GeofenceArea, GeofenceDecision};
pub use liveness::{evaluate, LivenessRejection, LivenessResult, LivenessThresholds};
pub use scorer::{measure, score, FrameStats};

#[cfg(test)]
pub(crate) mod fixtures {
    use image::{ImageFormat, Rgb, RgbImage};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::io::Cursor;

    pub fn encode_png(img: &RgbImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    pub fn uniform(width: u32, height: u32, gray: u8) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([gray, gray, gray]))
    }

    /// Gray noise in `[center - spread, center + spread]`, reproducible per seed.
    pub fn noise(width: u32, height: u32, center: u8, spread: u8, seed: u64) -> RgbImage {
        let mut rng = StdRng::seed_from_u64(seed);
        let lo = center.saturating_sub(spread);
        let hi = center.saturating_add(spread);
        RgbImage::from_fn(width, height, |_, _| {
            let v = rng.gen_range(lo..=hi);
            Rgb([v, v, v])
        })
    }

    /// Add `delta` to every channel of every pixel, saturating.
    pub fn shifted(img: &RgbImage, delta: u8) -> RgbImage {
        let mut out = img.clone();
        for px in out.pixels_mut() {
            for c in px.0.iter_mut() {
                *c = c.saturating_add(delta);
            }
        }
        out
    }
}
