//! Frame source for machines without a capture device.
//!
//! Every capture reports [`CaptureError::Unavailable`], so the sampling loop
//! keeps ticking without producing observations.

use crate::capture::types::{CaptureError, Frame, FrameSource};

/// A source that never yields frames.
#[derive(Debug, Default)]
pub struct NoopFrameSource;

impl NoopFrameSource {
    pub fn new() -> Self {
        Self
    }
}

impl FrameSource for NoopFrameSource {
    fn capture(&mut self) -> Result<Frame, CaptureError> {
        Err(CaptureError::Unavailable("no capture device".to_string()))
    }

    fn describe(&self) -> String {
        "none".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_is_unavailable() {
        let mut source = NoopFrameSource::new();
        assert!(matches!(source.capture(), Err(CaptureError::Unavailable(_))));
    }
}
