//! Engine configuration loading for the crilog binary

use std::path::Path;

use anyhow::{Context, Result};

use crilog_logs::EngineConfig;

/// Load engine settings from an optional TOML file.
///
/// Missing keys fall back to their defaults; with no file at all the
/// defaults are used as-is. The result is not validated here so that CLI
/// overrides can still be applied.
pub fn load(path: Option<&Path>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;

    parse(&content).with_context(|| format!("Invalid config file {}", path.display()))
}

fn parse(content: &str) -> Result<EngineConfig> {
    Ok(toml::from_str(content)?)
}
