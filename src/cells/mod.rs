//! Built-in cell types.
//!
//! | Type | Kind | Purpose |
//! |------|------|---------|
//! | `TestImage` | source | Synthetic test patterns |
//! | `TestImageVerify` | sink | Frame checks, `on_verify` hook |
//! | `Passthrough` | filter | Forwards frames unchanged |
//! | `Decimate` | filter | Keeps every Nth frame |
//! | `NullSink` | sink | Discards frames |

mod decimate;
mod null;
mod passthrough;
pub mod testing;

pub use decimate::Decimate;
pub use null::NullSink;
pub use passthrough::Passthrough;
pub use testing::{Pattern, TestImage, TestImageVerify};

use crate::registry::CellRegistry;

/// Register every built-in type with `registry`.
pub fn register_builtin(registry: &mut CellRegistry) {
    registry.register(TestImage::descriptor());
    registry.register(TestImageVerify::descriptor());
    registry.register(Passthrough::descriptor());
    registry.register(Decimate::descriptor());
    registry.register(NullSink::descriptor());
}
