use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Settings consumed by the eviction engine.
///
/// The file is usually shared with the proxy that fills the cache, so keys
/// this crate does not know about are ignored rather than rejected.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Cache root.  Artifacts live under `{cache_dir}/pkgs/{repo}/`.
    pub cache_dir: PathBuf,
    /// Files whose last access is older than this many seconds become
    /// eligible for deletion.  Must be non-zero.
    pub purge_files_after: u64,
    /// Number of most recently modified files per package that are never
    /// purged, whatever their access time.
    #[serde(default)]
    pub keep_files: usize,
    /// Repositories to sweep, keyed by repository identifier.
    #[serde(default)]
    pub repos: BTreeMap<String, RepoConfig>,
}

// ---------------------------------------------------------------------------
// Per-repo overrides
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RepoConfig {
    /// Override `purge_files_after` (seconds) for this repo.
    pub purge_files_after: Option<u64>,
    /// Override `keep_files` for this repo.
    pub keep_files: Option<usize>,
}

impl Config {
    /// Age threshold in effect for `repo`.
    pub fn purge_files_after(&self, repo: &str) -> Duration {
        let secs = self
            .repos
            .get(repo)
            .and_then(|r| r.purge_files_after)
            .unwrap_or(self.purge_files_after);
        Duration::from_secs(secs)
    }

    /// Retention floor in effect for `repo`.
    pub fn keep_files(&self, repo: &str) -> usize {
        self.repos
            .get(repo)
            .and_then(|r| r.keep_files)
            .unwrap_or(self.keep_files)
    }
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Load and validate a [`Config`] from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    parse_config(&contents)
        .with_context(|| format!("failed to load config file: {}", path.display()))
}

fn parse_config(contents: &str) -> Result<Config> {
    let config: Config = serde_yaml::from_str(contents).context("invalid YAML")?;
    validate_config(&config)?;
    Ok(config)
}

/// A zero threshold would make every cached file stale at once, so it is
/// rejected outright instead of being clamped.
fn validate_config(config: &Config) -> Result<()> {
    anyhow::ensure!(
        config.purge_files_after != 0,
        "purge_files_after=0 would purge the whole cache"
    );
    for (repo, settings) in &config.repos {
        anyhow::ensure!(
            settings.purge_files_after != Some(0),
            "repo {repo}: purge_files_after=0 would purge the whole cache"
        );
    }
    Ok(())
}
