//! Frame types shared by all capture sources.
//!
//! Frames are held only for the duration of one tick: they are encoded,
//! sent to the classifier and dropped. Nothing here is persisted.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};

/// A single still image captured from the video source.
#[derive(Debug, Clone)]
pub struct Frame {
    /// When the frame was captured
    pub captured_at: DateTime<Utc>,
    /// MIME type of the encoded image (e.g. `image/jpeg`)
    pub mime_type: String,
    /// Encoded image bytes
    pub bytes: Vec<u8>,
}

impl Frame {
    /// Create a JPEG frame captured now.
    pub fn jpeg(bytes: Vec<u8>) -> Self {
        Self {
            captured_at: Utc::now(),
            mime_type: "image/jpeg".to_string(),
            bytes,
        }
    }

    /// Encode the frame as a `data:` URL, the payload format the classifier expects.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.bytes))
    }

    /// Size of the encoded image in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Anything that can produce a frame on demand.
pub trait FrameSource: Send {
    /// Grab the current frame.
    fn capture(&mut self) -> Result<Frame, CaptureError>;

    /// Short human-readable description for logs.
    fn describe(&self) -> String;
}

/// Errors that can occur while acquiring a frame.
#[derive(Debug)]
pub enum CaptureError {
    /// No frame source is available (device off, nothing to read)
    Unavailable(String),
    /// Reading the frame failed
    Io(String),
    /// The source produced an empty image
    Empty,
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureError::Unavailable(reason) => write!(f, "Capture unavailable: {reason}"),
            CaptureError::Io(e) => write!(f, "Capture IO error: {e}"),
            CaptureError::Empty => write!(f, "Captured frame is empty"),
        }
    }
}

impl std::error::Error for CaptureError {}
