//! Test patterns shared by the generator and the verifier.

use crate::frame::{FrameFormat, PixelFormat};
use std::fmt;
use std::str::FromStr;

/// Side length of a checkers square in pixels.
const CHECKER_SIZE: u32 = 8;

/// Solid fill color.
const SOLID: (u8, u8, u8) = (0x40, 0x80, 0xC0);

/// Test pattern kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pattern {
    /// Red ramps left to right, green top to bottom, blue follows the sequence.
    #[default]
    Gradient,
    /// Black and white squares.
    Checkers,
    /// One flat color.
    Solid,
}

impl Pattern {
    /// Names accepted in layouts.
    pub const NAMES: [&'static str; 3] = ["gradient", "checkers", "solid"];

    /// Lowercase name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Pattern::Gradient => "gradient",
            Pattern::Checkers => "checkers",
            Pattern::Solid => "solid",
        }
    }

    /// Color of pixel (`x`, `y`) in frame number `sequence`.
    pub fn rgb(&self, format: &FrameFormat, x: u32, y: u32, sequence: u64) -> (u8, u8, u8) {
        match self {
            Pattern::Gradient => (
                ramp(x, format.width),
                ramp(y, format.height),
                (sequence % 256) as u8,
            ),
            Pattern::Checkers => {
                if ((x / CHECKER_SIZE) + (y / CHECKER_SIZE)) % 2 == 0 {
                    (255, 255, 255)
                } else {
                    (0, 0, 0)
                }
            }
            Pattern::Solid => SOLID,
        }
    }

    /// Fill a whole frame.
    pub fn fill(&self, format: &FrameFormat, sequence: u64, data: &mut [u8]) {
        let bpp = format.pixel_format.bytes_per_pixel();
        for y in 0..format.height {
            let row = y as usize * format.stride();
            for x in 0..format.width {
                let offset = row + x as usize * bpp;
                let (r, g, b) = self.rgb(format, x, y, sequence);
                write_pixel(format.pixel_format, &mut data[offset..offset + bpp], r, g, b);
            }
        }
    }

    /// Check the corners and the center of `data` against the pattern.
    pub fn matches(&self, format: &FrameFormat, sequence: u64, data: &[u8]) -> bool {
        if format.width == 0 || format.height == 0 || data.len() != format.frame_size() {
            return false;
        }
        let bpp = format.pixel_format.bytes_per_pixel();
        let (w, h) = (format.width - 1, format.height - 1);
        let samples = [(0, 0), (w, 0), (0, h), (w, h), (w / 2, h / 2)];

        let mut expected = [0u8; 4];
        samples.iter().all(|&(x, y)| {
            let offset = y as usize * format.stride() + x as usize * bpp;
            let (r, g, b) = self.rgb(format, x, y, sequence);
            write_pixel(format.pixel_format, &mut expected[..bpp], r, g, b);
            data[offset..offset + bpp] == expected[..bpp]
        })
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Pattern {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gradient" => Ok(Pattern::Gradient),
            "checkers" => Ok(Pattern::Checkers),
            "solid" => Ok(Pattern::Solid),
            _ => Err(format!("unknown pattern '{s}'")),
        }
    }
}

fn ramp(position: u32, extent: u32) -> u8 {
    let span = extent.saturating_sub(1).max(1);
    ((position.min(span) as u64 * 255) / span as u64) as u8
}

fn write_pixel(format: PixelFormat, buf: &mut [u8], r: u8, g: u8, b: u8) {
    match format {
        PixelFormat::Rgb24 => buf.copy_from_slice(&[r, g, b]),
        PixelFormat::Bgr24 => buf.copy_from_slice(&[b, g, r]),
        PixelFormat::Rgba32 => buf.copy_from_slice(&[r, g, b, 255]),
        PixelFormat::Gray8 => {
            buf[0] = ((r as u16 * 77 + g as u16 * 150 + b as u16 * 29) >> 8) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_then_match() {
        for pixel_format in PixelFormat::ALL {
            let format = FrameFormat::new(33, 17, pixel_format);
            for pattern in [Pattern::Gradient, Pattern::Checkers, Pattern::Solid] {
                let mut data = vec![0u8; format.frame_size()];
                pattern.fill(&format, 3, &mut data);
                assert!(pattern.matches(&format, 3, &data), "{pattern} {pixel_format}");
            }
        }
    }

    #[test]
    fn test_gradient_depends_on_sequence() {
        let format = FrameFormat::new(8, 8, PixelFormat::Rgb24);
        let mut data = vec![0u8; format.frame_size()];
        Pattern::Gradient.fill(&format, 1, &mut data);
        assert!(!Pattern::Gradient.matches(&format, 2, &data));
    }

    #[test]
    fn test_truncated_frame_never_matches() {
        let format = FrameFormat::new(4, 4, PixelFormat::Gray8);
        assert!(!Pattern::Solid.matches(&format, 0, &[0u8; 3]));
    }

    #[test]
    fn test_single_pixel_frame() {
        let format = FrameFormat::new(1, 1, PixelFormat::Rgba32);
        let mut data = vec![0u8; 4];
        Pattern::Gradient.fill(&format, 0, &mut data);
        assert!(Pattern::Gradient.matches(&format, 0, &data));
    }
}
