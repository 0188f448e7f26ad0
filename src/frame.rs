//! Frames passed between cells.
//!
//! A frame owns its payload through [`Bytes`], so handing a frame to the next
//! cell moves a reference-counted view rather than copying pixels. Adjacent
//! cells exchange exactly one frame at a time.

use bytes::Bytes;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Largest payload the built-in sources will allocate for one frame
/// (256 MiB).
pub const MAX_FRAME_BYTES: usize = 256 * 1024 * 1024;

/// Pixel layouts understood by the built-in cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    /// RGB 8-bit per channel, packed (24 bits/pixel).
    #[default]
    Rgb24,
    /// BGR 8-bit per channel, packed (24 bits/pixel).
    Bgr24,
    /// RGBA 8-bit per channel, packed (32 bits/pixel).
    Rgba32,
    /// Single 8-bit luma channel.
    Gray8,
}

impl PixelFormat {
    /// All formats, in the order they are advertised in parameter schemas.
    pub const ALL: [PixelFormat; 4] = [
        PixelFormat::Rgb24,
        PixelFormat::Bgr24,
        PixelFormat::Rgba32,
        PixelFormat::Gray8,
    ];

    /// Bytes used by a single pixel.
    pub const fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => 3,
            PixelFormat::Rgba32 => 4,
            PixelFormat::Gray8 => 1,
        }
    }

    /// Lowercase name used in layouts (`rgb24`).
    pub const fn as_str(&self) -> &'static str {
        match self {
            PixelFormat::Rgb24 => "rgb24",
            PixelFormat::Bgr24 => "bgr24",
            PixelFormat::Rgba32 => "rgba32",
            PixelFormat::Gray8 => "gray8",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PixelFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        PixelFormat::ALL
            .into_iter()
            .find(|format| format.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown pixel format '{s}'"))
    }
}

/// Geometry and pixel layout of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameFormat {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel layout.
    pub pixel_format: PixelFormat,
}

impl FrameFormat {
    /// Create a new frame format.
    pub const fn new(width: u32, height: u32, pixel_format: PixelFormat) -> Self {
        Self {
            width,
            height,
            pixel_format,
        }
    }

    /// Bytes in one row.
    pub const fn stride(&self) -> usize {
        (self.width as usize).saturating_mul(self.pixel_format.bytes_per_pixel())
    }

    /// Bytes in a whole frame, or `None` if that does not fit in `usize`.
    pub fn try_frame_size(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.pixel_format.bytes_per_pixel())?
            .checked_mul(self.height as usize)
    }

    /// Bytes in a whole frame, saturating at `usize::MAX`.
    pub fn frame_size(&self) -> usize {
        self.try_frame_size().unwrap_or(usize::MAX)
    }
}

impl Default for FrameFormat {
    fn default() -> Self {
        Self::new(640, 480, PixelFormat::Rgb24)
    }
}

impl fmt::Display for FrameFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} {}", self.width, self.height, self.pixel_format)
    }
}

/// A unit of streamed data.
#[derive(Clone)]
pub struct Frame {
    data: Bytes,
    format: FrameFormat,
    sequence: u64,
    timestamp: Duration,
}

impl Frame {
    /// Create a frame from a payload.
    pub fn new(data: impl Into<Bytes>, format: FrameFormat, sequence: u64) -> Self {
        Self {
            data: data.into(),
            format,
            sequence,
            timestamp: Duration::ZERO,
        }
    }

    /// Attach a presentation timestamp.
    pub fn with_timestamp(mut self, timestamp: Duration) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// The payload.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Frame geometry.
    pub fn format(&self) -> FrameFormat {
        self.format
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.format.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.format.height
    }

    /// Sequence number assigned by the producing source.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Time since the producing source started.
    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    /// Whether the payload length matches the declared format.
    pub fn is_consistent(&self) -> bool {
        self.data.len() == self.format.frame_size()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("format", &self.format)
            .field("sequence", &self.sequence)
            .field("len", &self.data.len())
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size() {
        let format = FrameFormat::new(4, 2, PixelFormat::Rgba32);
        assert_eq!(format.stride(), 16);
        assert_eq!(format.frame_size(), 32);
        assert_eq!(FrameFormat::new(4, 2, PixelFormat::Gray8).frame_size(), 8);
    }

    #[test]
    fn test_huge_frame_size_does_not_overflow() {
        let huge = FrameFormat::new(u32::MAX, u32::MAX, PixelFormat::Rgba32);
        assert_eq!(huge.try_frame_size(), None);
        assert_eq!(huge.frame_size(), usize::MAX);
        let big = FrameFormat::new(70_000, 70_000, PixelFormat::Rgb24);
        assert!(big.frame_size() > MAX_FRAME_BYTES);
    }

    #[test]
    fn test_pixel_format_parse() {
        assert_eq!("RGB24".parse::<PixelFormat>(), Ok(PixelFormat::Rgb24));
        assert_eq!("gray8".parse::<PixelFormat>(), Ok(PixelFormat::Gray8));
        assert!("yuv".parse::<PixelFormat>().is_err());
    }

    #[test]
    fn test_frame_consistency() {
        let format = FrameFormat::new(2, 2, PixelFormat::Rgb24);
        let frame = Frame::new(vec![0u8; 12], format, 7);
        assert!(frame.is_consistent());
        assert_eq!(frame.sequence(), 7);
        assert_eq!(frame.width(), 2);

        let short = Frame::new(vec![0u8; 5], format, 0);
        assert!(!short.is_consistent());
    }
}
