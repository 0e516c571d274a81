// SPDX-License-Identifier: GPL-3.0-only

//! Frame and rotation types shared across the capture path

use chrono::{DateTime, Utc};
use image::RgbImage;
use image::imageops;

/// One decoded frame from the video source
///
/// Frames published to the single-slot buffer are immutable; `read()`
/// hands out deep copies, so holders can transform pixels freely without
/// affecting later reads.
#[derive(Clone, Debug)]
pub struct Frame {
    /// RGB pixel matrix (height x width x 3)
    pub pixels: RgbImage,
    /// UTC capture timestamp (microsecond precision)
    pub timestamp: DateTime<Utc>,
    /// Monotonically increasing sequence number assigned by the reader
    pub number: u64,
    /// Source device tag
    pub device: String,
}

impl Frame {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// True when the frame carries no pixels
    pub fn is_empty(&self) -> bool {
        self.pixels.width() == 0 || self.pixels.height() == 0
    }
}

/// Sensor rotation in degrees (clockwise)
///
/// Applied inside the reader thread so every consumer sees the canonical
/// orientation; negotiated frame dimensions reflect the post-rotation
/// shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    /// No rotation
    #[default]
    None,
    /// 90 degrees clockwise
    Cw90,
    /// 180 degrees
    Cw180,
    /// 270 degrees clockwise
    Cw270,
}

impl Rotation {
    /// Create rotation from an integer degree value (normalised to 0-360)
    pub fn from_degrees(degrees: i32) -> Self {
        match degrees.rem_euclid(360) {
            90 => Rotation::Cw90,
            180 => Rotation::Cw180,
            270 => Rotation::Cw270,
            _ => Rotation::None,
        }
    }

    /// Get the rotation in degrees
    pub fn degrees(&self) -> u32 {
        match self {
            Rotation::None => 0,
            Rotation::Cw90 => 90,
            Rotation::Cw180 => 180,
            Rotation::Cw270 => 270,
        }
    }

    /// Check if rotation swaps width and height
    pub fn swaps_dimensions(&self) -> bool {
        matches!(self, Rotation::Cw90 | Rotation::Cw270)
    }

    /// Rotate pixels into the canonical orientation
    pub fn apply(&self, pixels: RgbImage) -> RgbImage {
        match self {
            Rotation::None => pixels,
            Rotation::Cw90 => imageops::rotate90(&pixels),
            Rotation::Cw180 => imageops::rotate180(&pixels),
            Rotation::Cw270 => imageops::rotate270(&pixels),
        }
    }
}

impl std::fmt::Display for Rotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn gradient(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| Rgb([x as u8, y as u8, 0]))
    }

    #[test]
    fn rotation_from_degrees_normalises() {
        assert_eq!(Rotation::from_degrees(0), Rotation::None);
        assert_eq!(Rotation::from_degrees(90), Rotation::Cw90);
        assert_eq!(Rotation::from_degrees(450), Rotation::Cw90);
        assert_eq!(Rotation::from_degrees(-90), Rotation::Cw270);
        assert_eq!(Rotation::from_degrees(45), Rotation::None);
    }

    #[test]
    fn quarter_turns_swap_dimensions() {
        let img = gradient(8, 4);
        let rotated = Rotation::Cw90.apply(img.clone());
        assert_eq!((rotated.width(), rotated.height()), (4, 8));
        assert!(Rotation::Cw90.swaps_dimensions());
        assert!(!Rotation::Cw180.swaps_dimensions());

        let upside_down = Rotation::Cw180.apply(img);
        assert_eq!((upside_down.width(), upside_down.height()), (8, 4));
    }

    #[test]
    fn full_turn_is_identity() {
        let img = gradient(6, 3);
        let mut out = img.clone();
        for _ in 0..4 {
            out = Rotation::Cw90.apply(out);
        }
        assert_eq!(out, img);
    }
}
