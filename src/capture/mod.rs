//! Frame acquisition for the Learning Coach Agent.
//!
//! A [`FrameSource`] hands the sampling loop one still image per tick. When
//! no device is available the source reports [`CaptureError::Unavailable`]
//! and the tick is skipped.

pub mod file;
pub mod noop;
pub mod types;

pub use file::FileFrameSource;
pub use noop::NoopFrameSource;
pub use types::{CaptureError, Frame, FrameSource};
