//! Frame sources
//!
//! The processing thread pulls frames through `FrameSource`. A source
//! returns `Ok(None)` once it is exhausted; transient read failures come
//! back as errors the caller may skip.

use image::ImageError;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::{CameraConfig, CameraError, VideoFrame};

/// A pull-based supplier of video frames
pub trait FrameSource: Send {
    /// Open the source. Failure here is fatal for the session.
    fn open(&mut self) -> Result<(), CameraError>;

    /// Next frame, `Ok(None)` at end of stream
    fn next_frame(&mut self) -> Result<Option<VideoFrame>, CameraError>;

    /// Release the underlying device or files
    fn close(&mut self);
}

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "pgm"];

/// Replays image files from a directory in file-name order
pub struct DirectorySource {
    dir: PathBuf,
    frame_interval_ns: u64,
    pending: VecDeque<PathBuf>,
    sequence: u32,
    opened: bool,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>, fps: u32) -> Self {
        Self {
            dir: dir.into(),
            frame_interval_ns: 1_000_000_000 / u64::from(fps.max(1)),
            pending: VecDeque::new(),
            sequence: 0,
            opened: false,
        }
    }

    pub fn from_config(config: &CameraConfig) -> Self {
        Self::new(&config.frames_dir, config.fps)
    }

    /// Frames not yet delivered
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    fn is_image(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }
}

impl FrameSource for DirectorySource {
    fn open(&mut self) -> Result<(), CameraError> {
        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| CameraError::Open(format!("{}: {}", self.dir.display(), e)))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && Self::is_image(path))
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(CameraError::Open(format!(
                "{}: no image frames",
                self.dir.display()
            )));
        }

        info!("Replaying {} frames from {}", files.len(), self.dir.display());
        self.pending = files.into();
        self.sequence = 0;
        self.opened = true;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<VideoFrame>, CameraError> {
        if !self.opened {
            return Err(CameraError::NotInitialized);
        }
        let Some(path) = self.pending.pop_front() else {
            return Ok(None);
        };

        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);

        let img = image::open(&path).map_err(|e| match e {
            ImageError::IoError(io) => CameraError::Stream(format!("{}: {}", path.display(), io)),
            other => CameraError::Format(format!("{}: {}", path.display(), other)),
        })?;

        debug!("Frame {} from {}", sequence, path.display());
        let timestamp_ns = u64::from(sequence) * self.frame_interval_ns;
        Ok(Some(VideoFrame::from_rgb(img.to_rgb8(), timestamp_ns, sequence)))
    }

    fn close(&mut self) {
        self.pending.clear();
        self.opened = false;
    }
}

/// Serves frames (or scripted failures) from memory
#[derive(Default)]
pub struct MemorySource {
    frames: VecDeque<Result<VideoFrame, CameraError>>,
    fail_open: bool,
    opened: bool,
}

impl MemorySource {
    pub fn new(frames: impl IntoIterator<Item = VideoFrame>) -> Self {
        Self {
            frames: frames.into_iter().map(Ok).collect(),
            fail_open: false,
            opened: false,
        }
    }

    /// A source whose `open` always fails
    pub fn unavailable() -> Self {
        Self {
            fail_open: true,
            ..Default::default()
        }
    }

    /// Queue a read failure after the frames already queued
    pub fn push_error(&mut self, error: CameraError) {
        self.frames.push_back(Err(error));
    }

    pub fn push_frame(&mut self, frame: VideoFrame) {
        self.frames.push_back(Ok(frame));
    }
}

impl FrameSource for MemorySource {
    fn open(&mut self) -> Result<(), CameraError> {
        if self.fail_open {
            return Err(CameraError::Open("memory source unavailable".into()));
        }
        self.opened = true;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<VideoFrame>, CameraError> {
        if !self.opened {
            return Err(CameraError::NotInitialized);
        }
        self.frames.pop_front().transpose()
    }

    fn close(&mut self) {
        self.opened = false;
    }
}
