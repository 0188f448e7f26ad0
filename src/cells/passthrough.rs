//! Passthrough filter.

use crate::cell::{Filter, StepContext};
use crate::error::Result;
use crate::frame::Frame;
use crate::registry::CellDescriptor;

/// Registered type identifier.
pub const TYPE_NAME: &str = "Passthrough";

/// Hands every frame on unchanged.
///
/// Handy for measuring scheduling overhead and for padding chains in tests.
#[derive(Debug, Default)]
pub struct Passthrough {
    count: u64,
}

impl Passthrough {
    /// Create a new passthrough.
    pub fn new() -> Self {
        Self::default()
    }

    /// Describe the type for a registry.
    pub fn descriptor() -> CellDescriptor {
        CellDescriptor::filter(TYPE_NAME, Passthrough::new)
            .with_description("Forwards frames unchanged")
    }

    /// Frames forwarded so far.
    pub fn count(&self) -> u64 {
        self.count
    }
}

impl Filter for Passthrough {
    fn process(&mut self, frame: Frame, _ctx: &mut StepContext<'_>) -> Result<Option<Frame>> {
        self.count += 1;
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::ParameterSet;
    use crate::frame::{FrameFormat, PixelFormat};

    #[test]
    fn test_passthrough() {
        let params = ParameterSet::default();
        let mut emissions = Vec::new();
        let mut ctx = StepContext::new("mid", &params, 0, &mut emissions);

        let mut filter = Passthrough::new();
        let frame = Frame::new(vec![1u8, 2, 3], FrameFormat::new(3, 1, PixelFormat::Gray8), 5);
        let out = filter.process(frame, &mut ctx).unwrap().unwrap();
        assert_eq!(out.sequence(), 5);
        assert_eq!(&out.data()[..], &[1, 2, 3]);
        assert_eq!(filter.count(), 1);
    }
}
