use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RollupConfig {
    #[serde(default = "default_ga_dir")]
    pub ga_dir: String,
    #[serde(default = "default_sessions_dir")]
    pub sessions_dir: String,
    #[serde(default = "default_placements_dir")]
    pub placements_dir: String,
    #[serde(default = "default_registry_path")]
    pub registry_path: String,
    #[serde(default = "default_rollup_dir")]
    pub rollup_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub rollup: RollupConfig,
}

impl Default for RollupConfig {
    fn default() -> Self {
        Self {
            ga_dir: default_ga_dir(),
            sessions_dir: default_sessions_dir(),
            placements_dir: default_placements_dir(),
            registry_path: default_registry_path(),
            rollup_dir: default_rollup_dir(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            rollup: RollupConfig::default(),
        }
    }
}

fn default_ga_dir() -> String {
    "~/.cardsight/raw/ga".to_string()
}

fn default_sessions_dir() -> String {
    "~/.cardsight/raw/sessions".to_string()
}

fn default_placements_dir() -> String {
    "~/.cardsight/raw/placements".to_string()
}

fn default_registry_path() -> String {
    "~/.cardsight/fi_registry.json".to_string()
}

fn default_rollup_dir() -> String {
    "~/.cardsight/rollups".to_string()
}

pub fn expand_path(path: &str) -> String {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return format!("{}/{}", home.to_string_lossy(), stripped);
        }
    }
    path.to_string()
}

fn home_config_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".cardsight").join("config.toml"))
}

fn repo_default_config_path() -> PathBuf {
    PathBuf::from("config/cardsight.toml")
}

fn resolve_config_path_with_overrides(
    raw_path: Option<PathBuf>,
    env_keys: &[&str],
    home_path: Option<PathBuf>,
    repo_default: PathBuf,
) -> PathBuf {
    if let Some(path) = raw_path {
        return path;
    }

    for key in env_keys {
        if let Ok(value) = std::env::var(key) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return PathBuf::from(trimmed);
            }
        }
    }

    if let Some(path) = home_path {
        if path.exists() {
            return path;
        }
    }

    if repo_default.exists() {
        return repo_default;
    }

    home_config_path().unwrap_or(repo_default)
}

pub fn resolve_config_path(raw_path: Option<PathBuf>) -> PathBuf {
    resolve_config_path_with_overrides(
        raw_path,
        &["CARDSIGHT_CONFIG"],
        home_config_path(),
        repo_default_config_path(),
    )
}

fn normalize_config(mut cfg: AppConfig) -> AppConfig {
    cfg.rollup.ga_dir = expand_path(&cfg.rollup.ga_dir);
    cfg.rollup.sessions_dir = expand_path(&cfg.rollup.sessions_dir);
    cfg.rollup.placements_dir = expand_path(&cfg.rollup.placements_dir);
    cfg.rollup.registry_path = expand_path(&cfg.rollup.registry_path);
    cfg.rollup.rollup_dir = expand_path(&cfg.rollup.rollup_dir);
    cfg
}

pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read config {}", path.as_ref().display()))?;
    let cfg: AppConfig = toml::from_str(&content).context("failed to parse TOML config")?;
    Ok(normalize_config(cfg))
}
