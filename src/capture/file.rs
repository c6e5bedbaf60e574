//! Frame source backed by still images on disk.
//!
//! Points at either a single image (re-read every tick, so an external
//! grabber can keep overwriting it) or a directory of images that are
//! replayed in file-name order, wrapping around at the end.

use crate::capture::types::{CaptureError, Frame, FrameSource};
use chrono::Utc;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Reads frames from a file or a directory of files.
#[derive(Debug)]
pub struct FileFrameSource {
    path: PathBuf,
    cursor: usize,
}

impl FileFrameSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cursor: 0,
        }
    }

    fn next_path(&mut self) -> Result<PathBuf, CaptureError> {
        if self.path.is_file() {
            return Ok(self.path.clone());
        }

        if !self.path.is_dir() {
            return Err(CaptureError::Unavailable(format!(
                "{} does not exist",
                self.path.display()
            )));
        }

        let mut images: Vec<PathBuf> = std::fs::read_dir(&self.path)
            .map_err(|e| CaptureError::Io(e.to_string()))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| is_image(p))
            .collect();

        if images.is_empty() {
            return Err(CaptureError::Unavailable(format!(
                "no images in {}",
                self.path.display()
            )));
        }

        images.sort();
        let index = self.cursor % images.len();
        self.cursor = self.cursor.wrapping_add(1);
        Ok(images.swap_remove(index))
    }
}

impl FrameSource for FileFrameSource {
    fn capture(&mut self) -> Result<Frame, CaptureError> {
        let path = self.next_path()?;
        let bytes = std::fs::read(&path).map_err(|e| CaptureError::Io(e.to_string()))?;
        if bytes.is_empty() {
            return Err(CaptureError::Empty);
        }

        Ok(Frame {
            captured_at: Utc::now(),
            mime_type: mime_for(&path).to_string(),
            bytes,
        })
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_path_is_unavailable() {
        let mut source = FileFrameSource::new("/definitely/not/here");
        assert!(matches!(source.capture(), Err(CaptureError::Unavailable(_))));
    }

    #[test]
    fn test_directory_replay_wraps() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.jpg"), [1u8]).unwrap();
        std::fs::write(dir.path().join("b.png"), [2u8]).unwrap();
        std::fs::write(dir.path().join("notes.txt"), [3u8]).unwrap();

        let mut source = FileFrameSource::new(dir.path());
        let first = source.capture().unwrap();
        let second = source.capture().unwrap();
        let third = source.capture().unwrap();

        assert_eq!(first.bytes, vec![1]);
        assert_eq!(first.mime_type, "image/jpeg");
        assert_eq!(second.bytes, vec![2]);
        assert_eq!(second.mime_type, "image/png");
        assert_eq!(third.bytes, vec![1]);
    }

    #[test]
    fn test_empty_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.jpg");
        std::fs::write(&path, []).unwrap();

        let mut source = FileFrameSource::new(&path);
        assert!(matches!(source.capture(), Err(CaptureError::Empty)));
    }

    #[test]
    fn test_empty_directory_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = FileFrameSource::new(dir.path());
        assert!(matches!(source.capture(), Err(CaptureError::Unavailable(_))));
    }
}
