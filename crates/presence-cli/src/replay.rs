//! A video source backed by a directory of still images.
//!
//! Frames are served in file-name order and wrap around at the end, so a
//! short recording can feed a session of any length.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use presence_capture::{AcquireError, CaptureError, VideoSource};
use presence_core::Frame;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "webp"];

/// Image files directly inside `dir`, sorted by name.
pub fn list_frames(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut frames = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if is_image && path.is_file() {
            frames.push(path);
        }
    }
    frames.sort();
    Ok(frames)
}

pub struct ReplaySource {
    dir: PathBuf,
}

impl ReplaySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

pub struct ReplayHandle {
    frames: Vec<PathBuf>,
    cursor: AtomicUsize,
}

impl VideoSource for ReplaySource {
    type Handle = ReplayHandle;

    async fn acquire(&self) -> Result<ReplayHandle, AcquireError> {
        let frames = list_frames(&self.dir).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => AcquireError::NotFound,
            io::ErrorKind::PermissionDenied => AcquireError::PermissionDenied,
            _ => AcquireError::Other(e.to_string()),
        })?;
        if frames.is_empty() {
            return Err(AcquireError::NotFound);
        }
        tracing::info!(
            dir = %self.dir.display(),
            frames = frames.len(),
            "replay source opened"
        );
        Ok(ReplayHandle {
            frames,
            cursor: AtomicUsize::new(0),
        })
    }

    async fn current_frame(&self, handle: &ReplayHandle) -> Result<Frame, CaptureError> {
        let i = handle.cursor.fetch_add(1, Ordering::Relaxed) % handle.frames.len();
        let path = &handle.frames[i];
        let data = std::fs::read(path)
            .map_err(|e| CaptureError::Read(format!("{}: {e}", path.display())))?;
        tracing::trace!(frame = %path.display(), bytes = data.len(), "replayed frame");
        Ok(Frame::new(data))
    }

    fn release(&self, handle: ReplayHandle) {
        tracing::debug!(
            frames_served = handle.cursor.into_inner(),
            "replay source released"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("presence-replay-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_list_frames_sorted_and_filtered() {
        let dir = scratch_dir("list");
        for name in ["b.png", "a.JPG", "c.txt", "d.webp"] {
            std::fs::write(dir.join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.join("nested.png")).unwrap();

        let names: Vec<_> = list_frames(&dir)
            .unwrap()
            .into_iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.JPG", "b.png", "d.webp"]);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_frames_wrap_around() {
        let dir = scratch_dir("wrap");
        std::fs::write(dir.join("0.png"), b"first").unwrap();
        std::fs::write(dir.join("1.png"), b"second").unwrap();

        let source = ReplaySource::new(&dir);
        let handle = source.acquire().await.unwrap();
        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(source.current_frame(&handle).await.unwrap().data().to_vec());
        }
        assert_eq!(seen, [b"first".to_vec(), b"second".to_vec(), b"first".to_vec()]);
        source.release(handle);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_missing_dir_is_not_found() {
        let source = ReplaySource::new("/nonexistent/presence-frames");
        assert!(matches!(source.acquire().await, Err(AcquireError::NotFound)));
    }

    #[tokio::test]
    async fn test_empty_dir_is_not_found() {
        let dir = scratch_dir("empty");
        let source = ReplaySource::new(&dir);
        assert!(matches!(source.acquire().await, Err(AcquireError::NotFound)));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_deleted_frame_is_capture_error() {
        let dir = scratch_dir("deleted");
        std::fs::write(dir.join("0.png"), b"first").unwrap();

        let source = ReplaySource::new(&dir);
        let handle = source.acquire().await.unwrap();
        std::fs::remove_file(dir.join("0.png")).unwrap();

        assert!(matches!(
            source.current_frame(&handle).await,
            Err(CaptureError::Read(_))
        ));
        std::fs::remove_dir_all(&dir).ok();
    }
}
