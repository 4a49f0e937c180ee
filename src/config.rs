//! Repository configuration, loadable from `srcfacts.toml`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Options governing the repository and its collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoConfig {
    /// Snapshot file: loaded on initialization, saved on dispose
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
    /// Ingest-pipeline worker count
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Whether the scope lock supports recursive read acquisition
    #[serde(default = "default_true")]
    pub lock_recursion: bool,
    /// Directory scanner period, in seconds
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: f64,
    /// Raise an error event for file units whose language has no parser,
    /// instead of skipping them silently
    #[serde(default)]
    pub strict_unknown_language: bool,
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
}

fn default_true() -> bool {
    true
}

fn default_scan_interval() -> f64 {
    60.0
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            parallelism: default_parallelism(),
            lock_recursion: true,
            scan_interval_secs: default_scan_interval(),
            strict_unknown_language: false,
        }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("srcfacts.toml")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<RepoConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: RepoConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &RepoConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}
