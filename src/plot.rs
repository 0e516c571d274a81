// SPDX-License-Identifier: GPL-3.0-only

//! Zone overlays on annotated frames
//!
//! Draws each zone's polygon outline onto the plotted frame so the
//! persisted artifact shows where the regions sit.

use crate::zones::Zone;
use image::{Rgb, RgbImage};
use tracing::debug;

const DEFAULT_COLOUR: Rgb<u8> = Rgb([9, 70, 124]);

/// Draw the outline of every zone onto `frame`
pub fn draw_zones(frame: &mut RgbImage, zones: &[Zone]) {
    for zone in zones {
        if zone.roi.len() < 2 {
            continue;
        }
        let colour = parse_hex_colour(&zone.colour_hex).unwrap_or(DEFAULT_COLOUR);
        for window in zone.roi.windows(2) {
            draw_line(frame, window[0], window[1], colour);
        }
        // Close the polygon
        if zone.roi.len() > 2 {
            if let (Some(first), Some(last)) = (zone.roi.first(), zone.roi.last()) {
                draw_line(frame, *last, *first, colour);
            }
        }
        debug!(zone = %zone.name, vertices = zone.roi.len(), "Zone outline drawn");
    }
}

/// Parse "#rrggbb" (leading '#' optional) into an RGB pixel
pub fn parse_hex_colour(hex: &str) -> Option<Rgb<u8>> {
    let digits = hex.strip_prefix('#').unwrap_or(hex);
    if digits.len() != 6 {
        return None;
    }
    let r = u8::from_str_radix(&digits[0..2], 16).ok()?;
    let g = u8::from_str_radix(&digits[2..4], 16).ok()?;
    let b = u8::from_str_radix(&digits[4..6], 16).ok()?;
    Some(Rgb([r, g, b]))
}

/// Bresenham line between two points, clamped to the frame
fn draw_line(frame: &mut RgbImage, from: (f64, f64), to: (f64, f64), colour: Rgb<u8>) {
    let (width, height) = (frame.width() as i64, frame.height() as i64);
    if width == 0 || height == 0 {
        return;
    }

    let mut x0 = from.0.round() as i64;
    let mut y0 = from.1.round() as i64;
    let x1 = to.0.round() as i64;
    let y1 = to.1.round() as i64;

    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if x0 >= 0 && x0 < width && y0 >= 0 && y0 < height {
            frame.put_pixel(x0 as u32, y0 as u32, colour);
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}
