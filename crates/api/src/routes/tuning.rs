//! Live tuning routes

use axum::{extract::State, Json};
use head_gesture::GestureConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::info;

use crate::{ApiError, AppSettings, AppState, SessionCommand};

/// Live-tunable parameters as last applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tuning {
    /// Nod threshold in pixels
    pub nod_sensitivity: u32,
    /// Gesture cooldown (seconds)
    pub cooldown: f64,
    /// Hand gesture hold time (seconds)
    pub hand_hold_time: f64,
    pub face_box_frames: u32,
    pub frame_divisor: u32,
}

impl Default for Tuning {
    fn default() -> Self {
        Self::from_settings(&AppSettings::default())
    }
}

impl Tuning {
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            nod_sensitivity: settings.dms.gesture.nod_threshold.round() as u32,
            cooldown: settings.dms.gesture.cooldown.as_secs_f64(),
            hand_hold_time: settings.dms.hand_hold_time.as_secs_f64(),
            face_box_frames: settings.dms.face_box_frames,
            frame_divisor: settings.session.frame_divisor,
        }
    }
}

/// Partial update; absent fields keep their value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TuningUpdate {
    pub nod_sensitivity: Option<u32>,
    pub cooldown: Option<f64>,
    pub hand_hold_time: Option<f64>,
    pub face_box_frames: Option<u32>,
    pub frame_divisor: Option<u32>,
}

fn seconds(name: &str, value: f64) -> Result<Duration, ApiError> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| ApiError::BadRequest(format!("{} must be a non-negative number of seconds", name)))
}

impl TuningUpdate {
    /// Validate every field before anything is applied
    pub fn commands(&self) -> Result<Vec<SessionCommand>, ApiError> {
        let mut commands = Vec::new();
        if let Some(value) = self.nod_sensitivity {
            GestureConfig::check_nod_sensitivity(value).map_err(|e| ApiError::BadRequest(e.to_string()))?;
            commands.push(SessionCommand::SetNodSensitivity(value));
        }
        if let Some(value) = self.cooldown {
            commands.push(SessionCommand::SetCooldown(seconds("cooldown", value)?));
        }
        if let Some(value) = self.hand_hold_time {
            commands.push(SessionCommand::SetHandHoldTime(seconds("hand_hold_time", value)?));
        }
        if let Some(value) = self.face_box_frames {
            commands.push(SessionCommand::SetFaceBoxFrames(value));
        }
        if let Some(value) = self.frame_divisor {
            if value == 0 {
                return Err(ApiError::BadRequest("frame_divisor must be at least 1".into()));
            }
            commands.push(SessionCommand::SetFrameDivisor(value));
        }
        Ok(commands)
    }

    fn apply_to(&self, tuning: &mut Tuning) {
        if let Some(value) = self.nod_sensitivity {
            tuning.nod_sensitivity = value;
        }
        if let Some(value) = self.cooldown {
            tuning.cooldown = value;
        }
        if let Some(value) = self.hand_hold_time {
            tuning.hand_hold_time = value;
        }
        if let Some(value) = self.face_box_frames {
            tuning.face_box_frames = value;
        }
        if let Some(value) = self.frame_divisor {
            tuning.frame_divisor = value;
        }
    }
}

pub async fn get_tuning(State(state): State<Arc<RwLock<AppState>>>) -> Json<Tuning> {
    Json(state.read().await.tuning.clone())
}

/// Forward new values to the processing thread
pub async fn put_tuning(
    State(state): State<Arc<RwLock<AppState>>>,
    Json(update): Json<TuningUpdate>,
) -> Result<Json<Tuning>, ApiError> {
    let commands = update.commands()?;

    let mut state = state.write().await;
    let sender = state
        .commands
        .as_ref()
        .ok_or_else(|| ApiError::SessionUnavailable("no processing session".into()))?;
    for command in commands {
        sender
            .send(command)
            .map_err(|_| ApiError::SessionUnavailable("processing thread has exited".into()))?;
    }

    update.apply_to(&mut state.tuning);
    info!("Tuning updated: {:?}", state.tuning);
    Ok(Json(state.tuning.clone()))
}
