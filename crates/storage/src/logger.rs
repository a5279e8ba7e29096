//! JSON-lines detection log

use dms::{EventSink, GestureEvent};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::StorageError;

/// One log line: `{"timestamp", "event_type", "details"}`.
/// A hand gesture's name is carried as `details.gesture_name`.
pub fn log_line(event: &GestureEvent) -> Value {
    let mut details: Map<String, Value> = event
        .details
        .iter()
        .map(|(k, v)| (k.clone(), json!(v)))
        .collect();
    if let Some(label) = &event.label {
        details.insert("gesture_name".to_string(), Value::String(label.clone()));
    }

    json!({
        "timestamp": event.timestamp.to_rfc3339(),
        "event_type": event.kind.as_str(),
        "details": details,
    })
}

/// Appends every recorded event to the detection log from a background task
#[derive(Clone)]
pub struct EventLogger {
    tx: mpsc::UnboundedSender<GestureEvent>,
    path: PathBuf,
}

impl EventLogger {
    /// Open (or create) the log and start the writer task
    pub async fn spawn(path: &Path) -> Result<(Self, JoinHandle<()>), StorageError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path).await?;
        info!("Detection log at {}", path.display());

        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(run_writer(file, path.to_path_buf(), rx));
        Ok((
            Self {
                tx,
                path: path.to_path_buf(),
            },
            writer,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queue an event for writing
    pub fn send(&self, event: GestureEvent) -> Result<(), StorageError> {
        self.tx.send(event).map_err(|_| StorageError::LoggerStopped)
    }
}

impl EventSink for EventLogger {
    fn record(&self, event: &GestureEvent) {
        if let Err(e) = self.send(event.clone()) {
            debug!("Event {} not logged: {}", event.id, e);
        }
    }
}

async fn run_writer(mut file: tokio::fs::File, path: PathBuf, mut rx: mpsc::UnboundedReceiver<GestureEvent>) {
    while let Some(event) = rx.recv().await {
        let mut line = log_line(&event).to_string();
        line.push('\n');

        // A failed write loses this line only
        if let Err(e) = file.write_all(line.as_bytes()).await {
            warn!("Writing to {} failed: {}", path.display(), e);
            continue;
        }
        if let Err(e) = file.flush().await {
            warn!("Flushing {} failed: {}", path.display(), e);
        }
    }
    debug!("Detection log writer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use dms::EventKind;

    #[test]
    fn test_log_line_shape() {
        let t = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        let event = GestureEvent::new(EventKind::HandGesture, t)
            .with_label("thumbs_up")
            .with_detail("hold_time", 1.5f32);

        let line = log_line(&event);
        assert_eq!(line["event_type"], "hand_gesture");
        assert_eq!(line["timestamp"], "2026-03-01T08:00:00+00:00");
        assert_eq!(line["details"]["gesture_name"], "thumbs_up");
        assert_eq!(line["details"]["hold_time"], 1.5);
    }

    #[tokio::test]
    async fn test_logger_appends_lines() {
        let dir = std::env::temp_dir().join(format!("cockpit-log-{}", std::process::id()));
        let path = dir.join("detection.jsonl");
        let _ = tokio::fs::remove_file(&path).await;

        let (logger, writer) = EventLogger::spawn(&path).await.unwrap();
        logger.record(&GestureEvent::new(EventKind::Nod, Utc::now()).with_detail("total_y", 40.0f32));
        logger.record(&GestureEvent::new(EventKind::Blink, Utc::now()));
        drop(logger);
        writer.await.unwrap();

        let text = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event_type"], "nod");
        assert_eq!(lines[0]["details"]["total_y"], 40.0);
        assert_eq!(lines[1]["event_type"], "blink");

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
