//! Config module.
//! Manages I/O for the calibrator's JSON config file (camera host, parameter namespace, point scheme).
//! Uses serde for JSON serialization; every field has a default so a partial file is fine.
//! Command-line flags override whatever the file says.

use crate::points::PointScheme;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Fixed size of the preview and drawing surfaces.
pub const SURFACE_WIDTH: u32 = 1024;
pub const SURFACE_HEIGHT: u32 = 576;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Camera base URL, e.g. `http://192.168.0.90`.
    pub host: String,
    /// Parameter group the calibration points live in.
    pub namespace: String,
    pub scheme: PointScheme,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Request timeout in seconds. Requests never time out when unset.
    pub timeout_secs: Option<u64>,
    /// Still-image endpoint used for the preview backdrop, relative to `host`.
    pub backdrop_path: String,
    /// Screen position of the preview's top-left corner; click coordinates are relative to it.
    pub preview_left: f64,
    pub preview_top: f64,
    /// Where the rendered overlay is written after every update.
    pub output: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "http://192.168.0.90".to_string(),
            namespace: "opcuagaugereader".to_string(),
            scheme: PointScheme::default(),
            username: None,
            password: None,
            timeout_secs: None,
            backdrop_path: format!(
                "/axis-cgi/jpg/image.cgi?resolution={}x{}",
                SURFACE_WIDTH, SURFACE_HEIGHT
            ),
            preview_left: 0.0,
            preview_top: 0.0,
            output: "screenshots/calibration.png".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Config> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, text).with_context(|| format!("Failed to write config file {}", path.display()))
    }

    /// Basic-auth pair, only when a username is configured.
    pub fn credentials(&self) -> Option<(String, String)> {
        self.username
            .as_ref()
            .map(|user| (user.clone(), self.password.clone().unwrap_or_default()))
    }

    pub fn backdrop_url(&self) -> String {
        format!("{}{}", self.host.trim_end_matches('/'), self.backdrop_path)
    }
}
