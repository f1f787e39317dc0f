use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// The last selected source, remembered across restarts as an opaque string
/// pair. Nothing else persists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastSource {
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub namespace: String,
}

pub fn load_last_source() -> Option<LastSource> {
    let path = state_path()?;
    let raw = fs::read_to_string(path).ok()?;
    serde_yaml::from_str(&raw).ok()
}

pub fn save_last_source(source: &LastSource) -> Result<()> {
    let Some(path) = state_path() else {
        return Ok(());
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create state directory {}", parent.display()))?;
    }
    let raw = serde_yaml::to_string(source).context("failed to serialize state")?;
    fs::write(&path, raw).with_context(|| format!("failed to write state {}", path.display()))?;
    Ok(())
}

fn state_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("PERISCOPE_STATE")
        && !path.trim().is_empty()
    {
        return Some(PathBuf::from(path));
    }

    std::env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".config/periscope/state.yaml"))
}
