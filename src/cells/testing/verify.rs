//! TestImageVerify: a sink that checks what it receives.

use super::pattern::Pattern;
use crate::cell::{InitContext, ParamFormat, ParamSpec, ParamValue, Sink, StepContext};
use crate::error::Result;
use crate::frame::Frame;
use crate::metadata::{Metadata, MetadataValue};
use crate::registry::CellDescriptor;
use std::time::Instant;

/// Registered type identifier.
pub const TYPE_NAME: &str = "TestImageVerify";

/// Hook fired after every verified frame.
pub const ON_VERIFY: &str = "on_verify";

/// Weight of the newest sample in the frequency estimate.
const SMOOTHING: f64 = 0.1;

/// Verifies incoming frames and reports the measured frame rate.
///
/// Every frame fires `on_verify` with the frame and, in this order,
/// `frequency` (frames per second), `frames` (count so far) and `valid`.
#[derive(Debug, Default)]
pub struct TestImageVerify {
    strict: bool,
    pattern: Option<Pattern>,
    frames: u64,
    invalid: u64,
    last_arrival: Option<Instant>,
    frequency: f64,
}

impl TestImageVerify {
    /// Create a verifier with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Describe the type for a registry.
    pub fn descriptor() -> CellDescriptor {
        let mut patterns = vec!["any"];
        patterns.extend(Pattern::NAMES);
        CellDescriptor::sink(TYPE_NAME, TestImageVerify::new)
            .with_description("Checks frames and reports their rate")
            .with_param(ParamSpec::new("Strict", ParamFormat::Bool, ParamValue::Bool(false)))
            .with_param(ParamSpec::new(
                "Pattern",
                ParamFormat::choice(patterns),
                ParamValue::Text("any".to_string()),
            ))
            .with_hook(ON_VERIFY)
    }

    fn apply(&mut self, name: &str, value: &ParamValue) {
        match name {
            "Strict" => self.strict = value.as_bool().unwrap_or(false),
            "Pattern" => self.pattern = value.as_str().and_then(|s| s.parse().ok()),
            _ => {}
        }
    }

    fn verify(&self, frame: &Frame) -> bool {
        let format = frame.format();
        if format.width == 0 || format.height == 0 || !frame.is_consistent() {
            return false;
        }
        match self.pattern {
            Some(pattern) => pattern.matches(&format, frame.sequence(), frame.data()),
            None => true,
        }
    }

    fn update_frequency(&mut self) {
        let now = Instant::now();
        if let Some(last) = self.last_arrival {
            let dt = now.duration_since(last).as_secs_f64();
            if dt > 0.0 {
                let sample = 1.0 / dt;
                self.frequency = if self.frequency == 0.0 {
                    sample
                } else {
                    self.frequency + SMOOTHING * (sample - self.frequency)
                };
            }
        }
        self.last_arrival = Some(now);
    }
}

impl Sink for TestImageVerify {
    fn initialize(&mut self, ctx: &InitContext<'_>) -> Result<()> {
        for param in ctx.params().iter() {
            self.apply(param.name(), &param.get());
        }
        self.frames = 0;
        self.invalid = 0;
        self.last_arrival = None;
        self.frequency = 0.0;
        Ok(())
    }

    fn consume(&mut self, frame: Frame, ctx: &mut StepContext<'_>) -> Result<()> {
        self.update_frequency();
        self.frames += 1;

        let valid = self.verify(&frame);
        if !valid {
            self.invalid += 1;
            tracing::warn!(cell = %ctx.cell_name(), sequence = frame.sequence(), format = %frame.format(), "frame failed verification");
            if self.strict {
                return Err(ctx.fail(format!(
                    "frame {} ({}, {} bytes) failed verification",
                    frame.sequence(),
                    frame.format(),
                    frame.len()
                )));
            }
        }

        let metadata = Metadata::new()
            .with("frequency", MetadataValue::Float(self.frequency))
            .with("frames", MetadataValue::Int(self.frames as i64))
            .with("valid", MetadataValue::Bool(valid));
        ctx.emit(ON_VERIFY, Some(frame), metadata);
        Ok(())
    }

    fn renegotiate(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        self.apply(name, value);
        Ok(())
    }

    fn shutdown(&mut self) {
        tracing::debug!(frames = self.frames, invalid = self.invalid, "verifier finished");
        self.last_arrival = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Cell;
    use crate::frame::{FrameFormat, PixelFormat};
    use crate::registry::CellRegistry;
    use std::sync::{Arc, Mutex};

    fn cell() -> Cell {
        CellRegistry::with_builtin()
            .instantiate("dst", TYPE_NAME)
            .unwrap()
    }

    fn solid_frame(sequence: u64) -> Frame {
        let format = FrameFormat::new(4, 4, PixelFormat::Rgb24);
        let mut data = vec![0u8; format.frame_size()];
        Pattern::Solid.fill(&format, sequence, &mut data);
        Frame::new(data, format, sequence)
    }

    #[test]
    fn test_on_verify_reports_metadata() {
        let dst = cell();
        dst.initialize().unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        dst.hook(ON_VERIFY).unwrap().connect(move |frame, meta| {
            let frame = frame.unwrap();
            seen_clone.lock().unwrap().push((
                frame.width(),
                meta.at(1).and_then(|v| v.as_i64()).unwrap(),
                meta.get("valid").and_then(|v| v.as_bool()).unwrap(),
                meta.get("frequency").and_then(|v| v.as_f64()).unwrap(),
            ));
        });

        dst.step(Some(solid_frame(0)), 0).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        dst.step(Some(solid_frame(1)), 1).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!((seen[0].0, seen[0].1, seen[0].2), (4, 1, true));
        assert_eq!(seen[0].3, 0.0);
        assert_eq!(seen[1].1, 2);
        assert!(seen[1].3 > 0.0);
    }

    #[test]
    fn test_strict_rejects_truncated_frame() {
        let dst = cell();
        dst.set_parameter("Strict", true).unwrap();
        dst.initialize().unwrap();

        let format = FrameFormat::new(4, 4, PixelFormat::Rgb24);
        let err = dst
            .step(Some(Frame::new(vec![0u8; 7], format, 0)), 0)
            .unwrap_err();
        assert!(err.is_step_error());
        assert_eq!(err.cell(), Some("dst"));
    }

    #[test]
    fn test_pattern_check() {
        let dst = cell();
        dst.set_parameter("Pattern", "checkers").unwrap();
        dst.initialize().unwrap();

        let valid = Arc::new(Mutex::new(None));
        let valid_clone = Arc::clone(&valid);
        dst.hook(ON_VERIFY).unwrap().connect(move |_, meta| {
            *valid_clone.lock().unwrap() = meta.get("valid").and_then(|v| v.as_bool());
        });

        dst.step(Some(solid_frame(0)), 0).unwrap();
        assert_eq!(*valid.lock().unwrap(), Some(false));
    }
}
