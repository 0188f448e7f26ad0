//! TestImage: a synthetic frame source.

use super::pattern::Pattern;
use crate::cell::{InitContext, ParamFormat, ParamSpec, ParamValue, Source, StepContext};
use crate::error::{Error, Result};
use crate::frame::{Frame, FrameFormat, MAX_FRAME_BYTES, PixelFormat};
use crate::registry::CellDescriptor;
use std::time::{Duration, Instant};

/// Registered type identifier.
pub const TYPE_NAME: &str = "TestImage";

/// Generates frames of a configurable size and pattern.
///
/// Parameters:
/// - `Dimension` (`640x480`): frame size, may change while streaming
/// - `PixelFormat` (`rgb24`): one of `rgb24`, `bgr24`, `rgba32`, `gray8`
/// - `Pattern` (`gradient`): one of `gradient`, `checkers`, `solid`
/// - `FrameRate` (`0`): frames per second, `0` produces as fast as pulled
#[derive(Debug, Default)]
pub struct TestImage {
    format: FrameFormat,
    pattern: Pattern,
    frame_rate: f64,
    sequence: u64,
    started: Option<Instant>,
    next_due: Option<Instant>,
}

impl TestImage {
    /// Create a source with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Describe the type for a registry.
    pub fn descriptor() -> CellDescriptor {
        let defaults = FrameFormat::default();
        CellDescriptor::source(TYPE_NAME, TestImage::new)
            .with_description("Synthetic test pattern source")
            .with_param(ParamSpec::new(
                "Dimension",
                ParamFormat::Dimension,
                ParamValue::Dimension {
                    width: defaults.width,
                    height: defaults.height,
                },
            ))
            .with_param(ParamSpec::new(
                "PixelFormat",
                ParamFormat::choice(PixelFormat::ALL.iter().map(|f| f.as_str())),
                ParamValue::Text(defaults.pixel_format.as_str().to_string()),
            ))
            .with_param(ParamSpec::new(
                "Pattern",
                ParamFormat::choice(Pattern::NAMES),
                ParamValue::Text(Pattern::default().as_str().to_string()),
            ))
            .with_param(ParamSpec::new(
                "FrameRate",
                ParamFormat::float_range(0.0, 1000.0),
                ParamValue::Float(0.0),
            ))
    }

    /// Frames produced since initialization.
    pub fn frames_produced(&self) -> u64 {
        self.sequence
    }

    fn apply(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        let invalid = |message: String| Error::validation(name, message);
        match name {
            "Dimension" => {
                let (width, height) = value
                    .as_dimension()
                    .ok_or_else(|| invalid(format!("expected a dimension, got {value}")))?;
                self.format.width = width;
                self.format.height = height;
            }
            "PixelFormat" => {
                self.format.pixel_format = value
                    .as_str()
                    .unwrap_or_default()
                    .parse()
                    .map_err(invalid)?;
            }
            "Pattern" => {
                self.pattern = value.as_str().unwrap_or_default().parse().map_err(invalid)?;
            }
            "FrameRate" => {
                self.frame_rate = value.as_f64().unwrap_or(0.0);
                self.next_due = None;
            }
            _ => {}
        }
        Ok(())
    }

    /// Sleep until the next frame is due when paced.
    fn pace(&mut self) {
        if self.frame_rate <= 0.0 {
            return;
        }
        let period = Duration::from_secs_f64(1.0 / self.frame_rate);
        let now = Instant::now();
        let due = match self.next_due {
            Some(due) => due,
            None => now,
        };
        if due > now {
            std::thread::sleep(due - now);
        }
        // Avoid a burst after a long stall by never scheduling in the past.
        self.next_due = Some(due.max(now) + period);
    }
}

/// Accept `format` only if one frame of it can be allocated.
fn check_size(format: &FrameFormat) -> std::result::Result<usize, String> {
    match format.try_frame_size() {
        Some(0) => Err("frame size is zero".to_string()),
        Some(size) if size <= MAX_FRAME_BYTES => Ok(size),
        _ => Err(format!("{format} frames exceed the {MAX_FRAME_BYTES}-byte limit")),
    }
}

impl Source for TestImage {
    fn initialize(&mut self, ctx: &InitContext<'_>) -> Result<()> {
        for param in ctx.params().iter() {
            self.apply(param.name(), &param.get())
                .map_err(|e| ctx.fail(e.to_string()))?;
        }
        check_size(&self.format).map_err(|message| ctx.fail(message))?;
        self.sequence = 0;
        self.started = Some(Instant::now());
        self.next_due = None;
        tracing::debug!(cell = %ctx.cell_name(), format = %self.format, pattern = %self.pattern, "test image ready");
        Ok(())
    }

    fn produce(&mut self, _ctx: &mut StepContext<'_>) -> Result<Option<Frame>> {
        self.pace();

        let mut data = vec![0u8; self.format.frame_size()];
        self.pattern.fill(&self.format, self.sequence, &mut data);

        let timestamp = self.started.map(|s| s.elapsed()).unwrap_or_default();
        let frame = Frame::new(data, self.format, self.sequence).with_timestamp(timestamp);
        self.sequence += 1;
        Ok(Some(frame))
    }

    fn renegotiate(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        let previous = self.format;
        self.apply(name, value)?;
        if let Err(message) = check_size(&self.format) {
            self.format = previous;
            return Err(Error::validation(name, message));
        }
        tracing::debug!(parameter = name, %value, format = %self.format, "test image renegotiated");
        Ok(())
    }

    fn shutdown(&mut self) {
        self.started = None;
        self.next_due = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Cell;

    fn cell() -> Cell {
        crate::registry::CellRegistry::with_builtin()
            .instantiate("src", TYPE_NAME)
            .unwrap()
    }

    #[test]
    fn test_default_frame() {
        let src = cell();
        src.initialize().unwrap();
        let frame = src.step(None, 0).unwrap().unwrap();
        assert_eq!((frame.width(), frame.height()), (640, 480));
        assert_eq!(frame.len(), 640 * 480 * 3);
        assert!(Pattern::Gradient.matches(&frame.format(), 0, frame.data()));
    }

    #[test]
    fn test_dimension_renegotiation() {
        let src = cell();
        src.initialize().unwrap();
        src.set_parameter("Dimension", "1024x512").unwrap();
        let frame = src.step(None, 0).unwrap().unwrap();
        assert_eq!((frame.width(), frame.height()), (1024, 512));

        src.set_parameter("Dimension", [32, 16]).unwrap();
        let frame = src.step(None, 1).unwrap().unwrap();
        assert_eq!((frame.width(), frame.height()), (32, 16));
        assert_eq!(frame.sequence(), 1);
    }

    #[test]
    fn test_layout_style_overrides_apply_on_initialize() {
        let src = cell();
        src.set_parameter("PixelFormat", "GRAY8").unwrap();
        src.set_parameter("Pattern", "solid").unwrap();
        src.set_parameter("Dimension", "4x4").unwrap();
        src.initialize().unwrap();

        let frame = src.step(None, 0).unwrap().unwrap();
        assert_eq!(frame.len(), 16);
        assert!(Pattern::Solid.matches(&frame.format(), 0, frame.data()));
    }

    #[test]
    fn test_pacing() {
        let src = cell();
        src.set_parameter("Dimension", "2x2").unwrap();
        src.set_parameter("FrameRate", 200.0).unwrap();
        src.initialize().unwrap();

        let start = Instant::now();
        for tick in 0..5 {
            src.step(None, tick).unwrap();
        }
        // Four full periods of 5ms between five frames.
        assert!(start.elapsed() >= Duration::from_millis(19));
    }

    #[test]
    fn test_oversized_dimension_is_refused_while_streaming() {
        let src = cell();
        src.set_parameter("Dimension", "8x8").unwrap();
        src.initialize().unwrap();

        for huge in ["4294967295x4294967295", "70000x70000"] {
            let err = src.set_parameter("Dimension", huge).unwrap_err();
            assert!(matches!(err, Error::Validation { .. }), "{huge}: {err}");
            assert_eq!(src.parameters().dimension("Dimension"), Some((8, 8)));
        }
        let frame = src.step(None, 0).unwrap().unwrap();
        assert_eq!((frame.width(), frame.height()), (8, 8));
    }

    #[test]
    fn test_oversized_dimension_fails_initialize() {
        let src = cell();
        src.set_parameter("Dimension", "70000x70000").unwrap();
        assert!(matches!(src.initialize(), Err(Error::Init { .. })));
    }
}
