use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use watch_alarm::AlarmConfig;
use watch_media::DisplayConfig;
use watch_vision::VisionConfig;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub vision: VisionConfig,
    pub alarm: AlarmConfig,
    pub display: DisplayConfig,
}

/// No path means built-in defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let s = std::fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    toml::from_str(&s).context("parse config toml")
}
