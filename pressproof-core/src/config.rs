use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_NAME: &str = "pressproof.toml";

/// Viewer configuration, loaded from the platform config directory. Every
/// field has a default so a missing or partial file is fine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Base URL of the rendering/preflight service.
    pub server_url: String,
    /// Duration of the spread flip animation.
    pub flip_duration_ms: u64,
    /// Zoom change per wheel notch.
    pub wheel_zoom_step: f32,
    /// Raster width requested for the pages of the current view unit.
    pub focused_width: u32,
    /// Raster width requested for speculative neighbor prefetch.
    pub prefetch_width: u32,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8000".to_string(),
            flip_duration_ms: 500,
            wheel_zoom_step: 0.5,
            focused_width: 800,
            prefetch_width: 400,
        }
    }
}

impl ViewerConfig {
    pub fn load_from(config_dir: &Path) -> Result<Self> {
        let path = config_dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        let config = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {:?}", path))?;
        Ok(config)
    }

    pub fn flip_duration(&self) -> Duration {
        Duration::from_millis(self.flip_duration_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let config = ViewerConfig::load_from(dir.path()).unwrap();
        assert_eq!(config.flip_duration_ms, 500);
        assert_eq!(config.focused_width, 800);
    }

    #[test]
    fn partial_file_keeps_defaults_for_the_rest() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "server_url = \"http://render.internal:9000\"\nflip_duration_ms = 250\n",
        )
        .unwrap();

        let config = ViewerConfig::load_from(dir.path()).unwrap();
        assert_eq!(config.server_url, "http://render.internal:9000");
        assert_eq!(config.flip_duration(), Duration::from_millis(250));
        assert_eq!(config.prefetch_width, 400);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), "server_url = [").unwrap();
        assert!(ViewerConfig::load_from(dir.path()).is_err());
    }
}
