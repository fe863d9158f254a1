//! Passive liveness detection via temporal frame variation.
//!
//! A printed photograph or a frozen screen held in front of the camera
//! produces near-identical frames across a capture sequence. A live person
//! exhibits small involuntary movement (breathing, blinking, head sway) that
//! shows up as a modest, steady frame-to-frame difference.
//!
//! This module provides a lightweight, zero-model liveness gate over the
//! frames the capture loop already accepted. It adds no inference, no extra
//! frames, and no user interaction.
//!
//! # Threat Coverage
//!
//! - **Blocks:** Static photographs, frozen replays, and sequences with an
//!   abrupt mid-capture swap or heavy flicker.
//! - **Does not block:** Video replay with natural motion, 3D masks, or
//!   adversarial displays.

use serde::{Deserialize, Serialize};

use crate::differ::try_diff;
use crate::frame::Frame;

/// Default lower bound on mean variation. Anything at or below is treated as
/// a static subject (sensor noise alone on a printed photo stays under 1.0).
pub const DEFAULT_MIN_AVG_VARIATION: f64 = 1.0;
/// Default upper bound on mean variation. Sustained variation above this is
/// instability, flicker, or replay artifacts rather than a person holding still.
pub const DEFAULT_MAX_AVG_VARIATION: f64 = 15.0;
/// Default upper bound on any single pair. A jump this large means the scene
/// changed abruptly, e.g. a photo swapped in mid-sequence.
pub const DEFAULT_MAX_PEAK_VARIATION: f64 = 25.0;

/// Motion bounds a sequence must fall inside to be judged live.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessThresholds {
    /// Mean variation must be strictly above this.
    pub min_avg_variation: f64,
    /// Mean variation must be strictly below this.
    pub max_avg_variation: f64,
    /// Every pairwise variation must be strictly below this.
    pub max_peak_variation: f64,
}

impl Default for LivenessThresholds {
    fn default() -> Self {
        Self {
            min_avg_variation: DEFAULT_MIN_AVG_VARIATION,
            max_avg_variation: DEFAULT_MAX_AVG_VARIATION,
            max_peak_variation: DEFAULT_MAX_PEAK_VARIATION,
        }
    }
}

/// Why a sequence was judged not live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LivenessRejection {
    /// Fewer frames than the session requires.
    TooFewFrames,
    /// No consecutive pair to compare.
    NoPairs,
    /// At least one frame could not be decoded for comparison.
    Undecodable,
    /// Mean variation at or below the lower bound.
    Static,
    /// Mean variation at or above the upper bound.
    Unstable,
    /// A single pair at or above the peak bound.
    AbruptChange,
}

/// Result of a temporal-variation liveness check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LivenessResult {
    /// Whether the frames passed the liveness check (true = likely live).
    pub is_live: bool,
    /// Mean frame-to-frame variation across consecutive pairs.
    pub avg_variation: f64,
    /// Largest single frame-to-frame variation.
    pub max_variation: f64,
    /// Number of frame pairs analysed.
    pub frame_pairs_analysed: usize,
    /// First failed criterion, when not live.
    pub rejection: Option<LivenessRejection>,
}

impl LivenessResult {
    fn rejected(rejection: LivenessRejection) -> Self {
        Self {
            is_live: false,
            avg_variation: 0.0,
            max_variation: 0.0,
            frame_pairs_analysed: 0,
            rejection: Some(rejection),
        }
    }
}

/// Check whether a sequence of accepted frames varies the way a live subject does.
///
/// # Arguments
///
/// * `frames`: Accepted frames in capture order.
/// * `required_frames`: Minimum sequence length the session demands.
/// * `thresholds`: Motion bounds; see [`LivenessThresholds`].
///
/// # Returns
///
/// A [`LivenessResult`]. Unlike [`crate::diff`], a frame that fails to decode
/// fails the whole check instead of counting as "no difference": every
/// frame here was already decoded once by the scorer, so a failure now means
/// the buffer cannot be trusted.
pub fn evaluate(
    frames: &[Frame],
    required_frames: usize,
    thresholds: &LivenessThresholds,
) -> LivenessResult {
    if frames.len() < required_frames {
        return LivenessResult::rejected(LivenessRejection::TooFewFrames);
    }

    let mut variations = Vec::with_capacity(frames.len().saturating_sub(1));
    for (i, pair) in frames.windows(2).enumerate() {
        match try_diff(&pair[0], &pair[1]) {
            Ok(v) => variations.push(v),
            Err(e) => {
                tracing::warn!(pair = i, error = %e, "liveness: frame pair undecodable");
                return LivenessResult {
                    frame_pairs_analysed: i,
                    ..LivenessResult::rejected(LivenessRejection::Undecodable)
                };
            }
        }
    }

    let result = check_variations(&variations, thresholds);
    tracing::debug!(
        avg_variation = result.avg_variation,
        max_variation = result.max_variation,
        frames = frames.len(),
        is_live = result.is_live,
        "liveness evaluated"
    );
    result
}

/// Apply the motion bounds to an already computed variation sequence.
pub fn check_variations(variations: &[f64], thresholds: &LivenessThresholds) -> LivenessResult {
    if variations.is_empty() {
        return LivenessResult::rejected(LivenessRejection::NoPairs);
    }

    let avg = variations.iter().sum::<f64>() / variations.len() as f64;
    let max = variations.iter().copied().fold(f64::MIN, f64::max);

    let rejection = if avg <= thresholds.min_avg_variation {
        Some(LivenessRejection::Static)
    } else if avg >= thresholds.max_avg_variation {
        Some(LivenessRejection::Unstable)
    } else if max >= thresholds.max_peak_variation {
        Some(LivenessRejection::AbruptChange)
    } else {
        None
    };

    LivenessResult {
        is_live: rejection.is_none(),
        avg_variation: avg,
        max_variation: max,
        frame_pairs_analysed: variations.len(),
        rejection,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{encode_png, noise, shifted, uniform};

    const REQUIRED: usize = 8;

    fn frames_from(images: &[image::RgbImage]) -> Vec<Frame> {
        images.iter().map(|img| Frame::new(encode_png(img))).collect()
    }

    /// Helper: alternate between `base` and `base` brightened by `delta`.
    fn alternating(base: &image::RgbImage, delta: u8, count: usize) -> Vec<Frame> {
        let bright = shifted(base, delta);
        let images: Vec<_> = (0..count)
            .map(|i| if i % 2 == 0 { base.clone() } else { bright.clone() })
            .collect();
        frames_from(&images)
    }

    #[test]
    fn test_identical_frames_rejected() {
        // Perfectly identical frames = static photo
        let img = noise(50, 50, 120, 40, 1);
        let frames = frames_from(&vec![img; REQUIRED]);
        let result = evaluate(&frames, REQUIRED, &LivenessThresholds::default());
        assert!(!result.is_live);
        assert_eq!(result.avg_variation, 0.0);
        assert_eq!(result.frame_pairs_analysed, REQUIRED - 1);
        assert_eq!(result.rejection, Some(LivenessRejection::Static));
    }

    #[test]
    fn test_black_white_alternation_rejected() {
        let images: Vec<_> = (0..REQUIRED)
            .map(|i| uniform(50, 50, if i % 2 == 0 { 0 } else { 255 }))
            .collect();
        let result = evaluate(&frames_from(&images), REQUIRED, &LivenessThresholds::default());
        assert!(!result.is_live);
        assert!((result.max_variation - 255.0).abs() < 1e-9);
        assert_eq!(result.rejection, Some(LivenessRejection::Unstable));
    }

    #[test]
    fn test_natural_motion_passes() {
        // Every pair differs by exactly 6 levels
        let base = noise(50, 50, 120, 40, 2);
        let result = evaluate(
            &alternating(&base, 6, REQUIRED),
            REQUIRED,
            &LivenessThresholds::default(),
        );
        assert!(result.is_live);
        assert!((result.avg_variation - 6.0).abs() < 1e-9);
        assert!((result.max_variation - 6.0).abs() < 1e-9);
        assert_eq!(result.frame_pairs_analysed, REQUIRED - 1);
        assert_eq!(result.rejection, None);
    }

    #[test]
    fn test_single_swap_rejected() {
        // Steady small motion, then one abrupt jump of 30 levels
        let base = noise(50, 50, 100, 30, 3);
        let mut images: Vec<_> = (0..REQUIRED - 1)
            .map(|i| if i % 2 == 0 { base.clone() } else { shifted(&base, 4) })
            .collect();
        images.push(shifted(&base, 30));
        let result = evaluate(&frames_from(&images), REQUIRED, &LivenessThresholds::default());
        // 6 pairs at 4 + 1 pair at 30: mean ~7.7, peak 30
        assert!(!result.is_live);
        assert!(result.avg_variation < DEFAULT_MAX_AVG_VARIATION);
        assert_eq!(result.rejection, Some(LivenessRejection::AbruptChange));
    }

    #[test]
    fn test_too_few_frames_rejected() {
        let base = noise(50, 50, 120, 40, 4);
        let result = evaluate(
            &alternating(&base, 6, REQUIRED - 1),
            REQUIRED,
            &LivenessThresholds::default(),
        );
        assert!(!result.is_live);
        assert_eq!(result.frame_pairs_analysed, 0);
        assert_eq!(result.rejection, Some(LivenessRejection::TooFewFrames));
    }

    #[test]
    fn test_empty_pairs_not_live() {
        // A single frame satisfies required_frames = 1 but yields no pairs
        let frames = frames_from(&[noise(50, 50, 120, 40, 5)]);
        let result = evaluate(&frames, 1, &LivenessThresholds::default());
        assert!(!result.is_live);
        assert_eq!(result.rejection, Some(LivenessRejection::NoPairs));

        let result = check_variations(&[], &LivenessThresholds::default());
        assert!(!result.is_live);
    }

    #[test]
    fn test_undecodable_frame_fails_closed() {
        let base = noise(50, 50, 120, 40, 6);
        let mut frames = alternating(&base, 6, REQUIRED);
        frames[3] = Frame::new(b"corrupt".to_vec());
        let result = evaluate(&frames, REQUIRED, &LivenessThresholds::default());
        assert!(!result.is_live);
        assert_eq!(result.frame_pairs_analysed, 2);
        assert_eq!(result.rejection, Some(LivenessRejection::Undecodable));
    }

    #[test]
    fn test_bounds_are_strict() {
        let t = LivenessThresholds::default();
        assert!(!check_variations(&[1.0, 1.0], &t).is_live);
        assert!(check_variations(&[1.01, 1.01], &t).is_live);
        assert!(!check_variations(&[15.0, 15.0], &t).is_live);
        assert!(!check_variations(&[2.0, 25.0], &t).is_live);
        assert!(check_variations(&[2.0, 24.9], &t).is_live);
    }

    #[test]
    fn test_mean_and_max_across_pairs() {
        let result = check_variations(&[2.0, 4.0, 9.0], &LivenessThresholds::default());
        assert!((result.avg_variation - 5.0).abs() < 1e-9);
        assert!((result.max_variation - 9.0).abs() < 1e-9);
        assert_eq!(result.frame_pairs_analysed, 3);
    }

    #[test]
    fn test_custom_thresholds() {
        // Tighter ceiling turns otherwise acceptable motion into instability
        let strict = LivenessThresholds {
            max_avg_variation: 5.0,
            ..LivenessThresholds::default()
        };
        let result = check_variations(&[6.0, 6.0], &strict);
        assert!(!result.is_live);
        assert_eq!(result.rejection, Some(LivenessRejection::Unstable));
    }
}
