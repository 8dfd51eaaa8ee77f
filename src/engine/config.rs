use crate::vr::{ControllerType, TrackingOrigin};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Body frame yaw, just short of a half turn.
#[allow(clippy::approx_constant)]
const DEFAULT_BODY_YAW: f32 = 3.141592;

/// How the on-screen preview is produced when enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewStrategy {
    /// Re-renders both eyes side by side into the window.
    SideBySide,
    /// Blits the compositor's mirror texture into the window.
    Mirror,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub show_preview_window: bool,
    pub enable_controllers: bool,
    pub preview_strategy: PreviewStrategy,
    /// Interval the host scheduler should leave between ticks.
    pub tick_interval_ms: u64,
    pub body_yaw: f32,
    pub initial_body_position: [f32; 3],
    pub pixels_per_display_pixel: f32,
    pub tracking_origin: TrackingOrigin,
    pub controller_type: ControllerType,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            show_preview_window: true,
            enable_controllers: true,
            preview_strategy: PreviewStrategy::SideBySide,
            tick_interval_ms: 10,
            body_yaw: DEFAULT_BODY_YAW,
            initial_body_position: [0.0, 0.0, -5.0],
            pixels_per_display_pixel: 1.0,
            tracking_origin: TrackingOrigin::FloorLevel,
            controller_type: ControllerType::Touch,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid pipeline config: {0}")]
    Parse(#[from] serde_json::Error),
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}
