use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use clock::ClockConfig;
use graph::CompilerConfig;
use serde::Deserialize;

/// Contents of the optional `--config` file. Missing keys keep defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub compiler: CompilerConfig,
    pub clock: ClockConfig,
}

impl Settings {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let settings = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        tracing::info!(path = %path.display(), "loaded config");
        Ok(settings)
    }
}
