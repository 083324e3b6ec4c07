//! Dataset and configuration files

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use capplan_core::MemoryStore;
use capplan_solver::SchedulerConfig;
use serde::Deserialize;

/// Read a JSON dataset
pub fn load(path: &Path) -> Result<MemoryStore> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read dataset {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("failed to parse dataset {}", path.display()))
}

/// Write a dataset as pretty-printed JSON
pub fn save(store: &MemoryStore, path: &Path) -> Result<()> {
    let text = serde_json::to_string_pretty(store).context("failed to serialize dataset")?;
    fs::write(path, text).with_context(|| format!("failed to write dataset {}", path.display()))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    scheduler: SchedulerConfig,
}

/// Scheduler settings from the `[scheduler]` table of a TOML file
pub fn load_config(path: &Path) -> Result<SchedulerConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let file: ConfigFile = toml::from_str(&text)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    Ok(file.scheduler)
}
