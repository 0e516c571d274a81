// SPDX-License-Identifier: GPL-3.0-only

//! Frame quality validation
//!
//! Detects the common failure modes of unattended cameras: glitched or
//! flat images (entropy), signal loss (white screens), black screens,
//! and focus problems (blur). All checks run on the luminance plane.

use crate::constants::health;
use image::GrayImage;
use image::RgbImage;
use image::buffer::ConvertBuffer;

/// Why a frame (or the stream) was classified unhealthy
#[derive(Debug, Clone, PartialEq)]
pub enum HealthIssue {
    /// Frame carries no pixels
    EmptyFrame,
    /// Shannon entropy below threshold (flat colors, grey/green screens)
    LowEntropy(f64),
    /// Too many near-white pixels (overexposure or signal loss)
    WhiteScreen(f64),
    /// Mean intensity below threshold
    BlackScreen(f64),
    /// Laplacian variance below threshold
    Blurry(f64),
    /// No fresh frame within the staleness window
    Disconnected,
}

impl std::fmt::Display for HealthIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthIssue::EmptyFrame => write!(f, "Empty Frame"),
            HealthIssue::LowEntropy(v) => write!(f, "Low Entropy/Glitch (Ent: {:.2})", v),
            HealthIssue::WhiteScreen(r) => write!(f, "White Screen (Ratio: {:.2})", r),
            HealthIssue::BlackScreen(v) => write!(f, "Black Screen (Intensity: {:.1})", v),
            HealthIssue::Blurry(v) => write!(f, "Blurry (Var: {:.1})", v),
            HealthIssue::Disconnected => write!(f, "Disconnected"),
        }
    }
}

/// Configurable thresholds for the image checks
#[derive(Debug, Clone, Copy)]
pub struct HealthThresholds {
    /// Min entropy; lower values indicate flat colors
    pub entropy: f64,
    /// Max ratio of white pixels; higher values indicate signal loss
    pub white_ratio: f64,
    /// Intensity above which a pixel counts as white
    pub white_level: u8,
    /// Min Laplacian variance; lower values indicate blur
    pub blur: f64,
    /// Max mean intensity for the black-screen check
    pub black: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            entropy: health::ENTROPY_THRESHOLD,
            white_ratio: health::WHITE_RATIO_THRESHOLD,
            white_level: health::WHITE_LEVEL,
            blur: health::BLUR_THRESHOLD,
            black: health::BLACK_THRESHOLD,
        }
    }
}

/// Runs all quality checks on a single frame
#[derive(Debug, Clone, Default)]
pub struct FrameHealthValidator {
    thresholds: HealthThresholds,
}

impl FrameHealthValidator {
    pub fn new(thresholds: HealthThresholds) -> Self {
        Self { thresholds }
    }

    /// Validate a frame. Deterministic: identical input yields identical
    /// output. Healthy iff no issue fires.
    pub fn validate(&self, frame: &RgbImage) -> (bool, Vec<HealthIssue>) {
        if frame.width() == 0 || frame.height() == 0 {
            return (false, vec![HealthIssue::EmptyFrame]);
        }

        let gray: GrayImage = frame.convert();
        let mut issues = Vec::new();

        let entropy = shannon_entropy(&gray);
        if entropy < self.thresholds.entropy {
            issues.push(HealthIssue::LowEntropy(entropy));
        }

        let white = white_ratio(&gray, self.thresholds.white_level);
        if white > self.thresholds.white_ratio {
            issues.push(HealthIssue::WhiteScreen(white));
        }

        let mean = mean_intensity(&gray);
        if mean < self.thresholds.black {
            issues.push(HealthIssue::BlackScreen(mean));
        }

        let variance = laplacian_variance(&gray);
        if variance < self.thresholds.blur {
            issues.push(HealthIssue::Blurry(variance));
        }

        (issues.is_empty(), issues)
    }
}

/// Shannon entropy of the 256-bin intensity histogram
pub fn shannon_entropy(gray: &GrayImage) -> f64 {
    let mut histogram = [0u64; 256];
    for pixel in gray.pixels() {
        histogram[pixel[0] as usize] += 1;
    }
    let total = (gray.width() as u64 * gray.height() as u64) as f64;
    if total <= 0.0 {
        return 0.0;
    }

    let mut entropy = 0.0;
    for &count in &histogram {
        if count > 0 {
            let p = count as f64 / total;
            entropy -= p * p.log2();
        }
    }
    entropy
}

/// Fraction of pixels brighter than `level`
pub fn white_ratio(gray: &GrayImage, level: u8) -> f64 {
    let total = gray.width() as u64 * gray.height() as u64;
    if total == 0 {
        return 0.0;
    }
    let white = gray.pixels().filter(|p| p[0] > level).count();
    white as f64 / total as f64
}

/// Mean luminance
pub fn mean_intensity(gray: &GrayImage) -> f64 {
    let total = gray.width() as u64 * gray.height() as u64;
    if total == 0 {
        return 0.0;
    }
    let sum: u64 = gray.pixels().map(|p| p[0] as u64).sum();
    sum as f64 / total as f64
}

/// Variance of the discrete Laplacian over interior pixels
pub fn laplacian_variance(gray: &GrayImage) -> f64 {
    let (width, height) = gray.dimensions();
    if width < 3 || height < 3 {
        return 0.0;
    }

    let mut responses = Vec::with_capacity(((width - 2) * (height - 2)) as usize);
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let center = gray.get_pixel(x, y)[0] as f64;
            let up = gray.get_pixel(x, y - 1)[0] as f64;
            let down = gray.get_pixel(x, y + 1)[0] as f64;
            let left = gray.get_pixel(x - 1, y)[0] as f64;
            let right = gray.get_pixel(x + 1, y)[0] as f64;
            responses.push(up + down + left + right - 4.0 * center);
        }
    }

    let n = responses.len() as f64;
    let mean = responses.iter().sum::<f64>() / n;
    responses.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    fn validator() -> FrameHealthValidator {
        FrameHealthValidator::default()
    }

    fn noisy_frame(w: u32, h: u32) -> RgbImage {
        // Deterministic pseudo-noise with wide intensity spread and
        // strong local gradients: passes every check.
        RgbImage::from_fn(w, h, |x, y| {
            let v = ((x * 97 + y * 151) % 251) as u8;
            Rgb([v, v.wrapping_add(31), v.wrapping_mul(3)])
        })
    }

    #[test]
    fn empty_frame_is_unhealthy() {
        let frame = RgbImage::new(0, 0);
        let (healthy, issues) = validator().validate(&frame);
        assert!(!healthy);
        assert_eq!(issues, vec![HealthIssue::EmptyFrame]);
    }

    #[test]
    fn noisy_frame_is_healthy() {
        let (healthy, issues) = validator().validate(&noisy_frame(64, 64));
        assert!(healthy, "unexpected issues: {:?}", issues);
    }

    #[test]
    fn mostly_white_frame_reports_white_screen() {
        // 95% white
        let frame = RgbImage::from_fn(64, 64, |x, y| {
            if (y * 64 + x) % 20 == 0 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        });
        let (healthy, issues) = validator().validate(&frame);
        assert!(!healthy);
        assert!(
            issues
                .iter()
                .any(|i| matches!(i, HealthIssue::WhiteScreen(_)))
        );
    }

    #[test]
    fn dark_frame_reports_black_screen() {
        let frame = RgbImage::from_pixel(32, 32, Rgb([3, 3, 3]));
        let (healthy, issues) = validator().validate(&frame);
        assert!(!healthy);
        assert!(
            issues
                .iter()
                .any(|i| matches!(i, HealthIssue::BlackScreen(_)))
        );
    }

    #[test]
    fn flat_grey_frame_reports_low_entropy() {
        let frame = RgbImage::from_pixel(32, 32, Rgb([128, 128, 128]));
        let (_, issues) = validator().validate(&frame);
        assert!(
            issues
                .iter()
                .any(|i| matches!(i, HealthIssue::LowEntropy(_)))
        );
    }

    #[test]
    fn smooth_gradient_reports_blur() {
        let frame = RgbImage::from_fn(64, 64, |x, _| {
            let v = (x * 4) as u8;
            Rgb([v, v, v])
        });
        let (_, issues) = validator().validate(&frame);
        assert!(issues.iter().any(|i| matches!(i, HealthIssue::Blurry(_))));
    }

    #[test]
    fn validation_is_deterministic() {
        let frame = noisy_frame(48, 48);
        let first = validator().validate(&frame);
        let second = validator().validate(&frame);
        assert_eq!(first.0, second.0);
        assert_eq!(first.1, second.1);
    }

    #[test]
    fn entropy_of_uniform_noise_is_high() {
        let gray = GrayImage::from_fn(256, 16, |x, _| Luma([x as u8]));
        assert!(shannon_entropy(&gray) > 7.9);
    }
}
