//! Channel-fed alert worker

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{AlertConfig, AlertError, AlertKind, SoundLibrary, SoundPlayer};

/// Accepts alerts without blocking the caller
pub trait AlertSink: Send + Sync {
    fn alert(&self, kind: AlertKind);
}

/// Sending half of the alert worker. Cheap to clone; the worker stops once
/// every clone is dropped.
#[derive(Clone)]
pub struct AlertDispatcher {
    tx: mpsc::UnboundedSender<AlertKind>,
}

impl AlertDispatcher {
    /// Start the worker on the current tokio runtime
    pub fn spawn(config: AlertConfig, player: Arc<dyn SoundPlayer>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(config, player, rx));
        (Self { tx }, worker)
    }

    /// Queue an alert; fails only when the worker is gone
    pub fn send(&self, kind: AlertKind) -> Result<(), AlertError> {
        self.tx.send(kind).map_err(|_| AlertError::WorkerStopped)
    }
}

impl AlertSink for AlertDispatcher {
    fn alert(&self, kind: AlertKind) {
        if let Err(e) = self.send(kind) {
            debug!("Alert dropped: {}", e);
        }
    }
}

async fn run_worker(
    config: AlertConfig,
    player: Arc<dyn SoundPlayer>,
    mut rx: mpsc::UnboundedReceiver<AlertKind>,
) {
    let library = SoundLibrary::new(&config.sounds_dir);
    info!("Alert worker started (sounds in {})", library.root().display());

    while let Some(kind) = rx.recv().await {
        if !config.enabled {
            debug!("Alerts disabled, skipping {}", kind);
            continue;
        }

        let path = match library.resolve(&kind) {
            Ok(path) => path,
            Err(e) => {
                warn!("No sound for {}: {}", kind, e);
                continue;
            }
        };

        // Playback is not awaited; the next alert may overlap it
        let player = player.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = player.play(&path) {
                warn!("Playing {} failed: {}", path.display(), e);
            }
        });
    }

    info!("Alert worker stopped");
}
