//! Test cells: a pattern source and a verifying sink.
//!
//! - [`TestImage`]: produces frames of a configurable size and pattern
//! - [`TestImageVerify`]: checks frames and reports their rate via `on_verify`

mod pattern;
mod test_image;
mod verify;

pub use pattern::Pattern;
pub use test_image::TestImage;
pub use verify::{ON_VERIFY, TestImageVerify};
