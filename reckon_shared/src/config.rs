//! Configuration system.
//!
//! Loads dead reckoning configuration from JSON strings/files.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Global dead reckoning settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReckonConfig {
    /// Host frame rate used by tools that drive their own loop.
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,
    /// Seconds over which an articulated part moves from one stop to the next.
    #[serde(default = "default_articulation_smooth_time")]
    pub articulation_smooth_time: f32,
    /// Upper bound for the translation smoothing window of new entities.
    #[serde(default = "default_max_translation_smoothing_time")]
    pub max_translation_smoothing_time: f32,
    /// Upper bound for the rotation smoothing window of new entities.
    #[serde(default = "default_max_rotation_smoothing_time")]
    pub max_rotation_smoothing_time: f32,
    /// Every entity is re-clamped at least this often (sim seconds).
    #[serde(default = "default_force_clamp_interval")]
    pub force_clamp_interval: f32,
    /// Within this distance of the eye point, clamping uses three points.
    /// Zero disables the distinction.
    #[serde(default)]
    pub high_res_clamp_range: f32,
}

fn default_tick_hz() -> u32 {
    60
}

fn default_articulation_smooth_time() -> f32 {
    0.5
}

fn default_max_translation_smoothing_time() -> f32 {
    4.0
}

fn default_max_rotation_smoothing_time() -> f32 {
    2.0
}

fn default_force_clamp_interval() -> f32 {
    1.25
}

impl Default for ReckonConfig {
    fn default() -> Self {
        Self {
            tick_hz: default_tick_hz(),
            articulation_smooth_time: default_articulation_smooth_time(),
            max_translation_smoothing_time: default_max_translation_smoothing_time(),
            max_rotation_smoothing_time: default_max_rotation_smoothing_time(),
            force_clamp_interval: default_force_clamp_interval(),
            high_res_clamp_range: 0.0,
        }
    }
}

impl ReckonConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Reads and parses a JSON config file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let cfg = Self::from_json_str(&text)
            .with_context(|| format!("parse config {}", path.display()))?;
        tracing::debug!(path = %path.display(), ?cfg, "Loaded dead reckoning config");
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_yields_defaults() {
        let cfg = ReckonConfig::from_json_str("{}").unwrap();
        assert_eq!(cfg, ReckonConfig::default());
        assert_eq!(cfg.force_clamp_interval, 1.25);
    }

    #[test]
    fn partial_json_overrides() {
        let cfg = ReckonConfig::from_json_str(r#"{"articulation_smooth_time": 1.0, "tick_hz": 30}"#)
            .unwrap();
        assert_eq!(cfg.articulation_smooth_time, 1.0);
        assert_eq!(cfg.tick_hz, 30);
        assert_eq!(cfg.max_rotation_smoothing_time, 2.0);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = ReckonConfig::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(err.to_string().contains("read config"));
    }
}
