//! Sound library and players

use std::path::{Path, PathBuf};
use tracing::info;

use crate::{AlertError, AlertKind};

/// Resolves alert kinds to `<root>/<base>.wav`
#[derive(Debug, Clone)]
pub struct SoundLibrary {
    root: PathBuf,
}

impl SoundLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path the alert would play, whether or not it exists
    pub fn path_for(&self, kind: &AlertKind) -> PathBuf {
        self.root.join(format!("{}.wav", kind.sound_base()))
    }

    /// Existing sound file for the alert
    pub fn resolve(&self, kind: &AlertKind) -> Result<PathBuf, AlertError> {
        let path = self.path_for(kind);
        if path.is_file() {
            Ok(path)
        } else {
            Err(AlertError::SoundMissing(path))
        }
    }
}

/// Plays one sound file to completion. Runs on the blocking pool.
pub trait SoundPlayer: Send + Sync + 'static {
    fn play(&self, path: &Path) -> Result<(), AlertError>;
}

/// Player for headless runs: records the cue in the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPlayer;

impl SoundPlayer for LogPlayer {
    fn play(&self, path: &Path) -> Result<(), AlertError> {
        info!("Alert sound: {}", path.display());
        Ok(())
    }
}
