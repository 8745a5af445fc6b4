// src/config/app.rs
use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::{env, fs};

pub const DEFAULT_CONFIG_PATH: &str = "config/footprint.toml";
pub const ENV_CONFIG_PATH: &str = "FOOTPRINT_CONFIG_PATH";
pub const ENV_LOOKUP_API_KEY: &str = "AIRPORT_LOOKUP_API_KEY";

fn default_timeout_ms() -> u64 {
    3_000
}
fn default_store_path() -> PathBuf {
    PathBuf::from("data/snapshots.jsonl")
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub airports: AirportsConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AirportsConfig {
    /// TOML or JSON reference table. Built-in seed when absent.
    #[serde(default)]
    pub table_path: Option<PathBuf>,
    #[serde(default)]
    pub remote: Option<RemoteLookupConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteLookupConfig {
    pub base_url: String,
    /// "ENV" means: read from AIRPORT_LOOKUP_API_KEY
    pub api_key: String,
    /// Per-call timeout. Clamped to 100..=10_000 ms.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Jsonl,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            path: default_store_path(),
        }
    }
}

impl AppConfig {
    /// $FOOTPRINT_CONFIG_PATH if set (must exist), else `config/footprint.toml`
    /// if present, else defaults.
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                bail!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display());
            }
            return Self::load_from_file(&pb);
        }
        let p = PathBuf::from(DEFAULT_CONFIG_PATH);
        if p.exists() {
            return Self::load_from_file(&p);
        }
        Ok(Self::default())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&data)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: AppConfig = toml::from_str(s).context("parsing config toml")?;

        if let Some(remote) = cfg.airports.remote.as_mut() {
            remote.base_url = remote.base_url.trim().to_string();
            if remote.base_url.is_empty() {
                bail!("airports.remote.base_url must not be empty");
            }

            // Resolve api key if "ENV"
            if remote.api_key.trim().eq_ignore_ascii_case("env") {
                remote.api_key = env::var(ENV_LOOKUP_API_KEY)
                    .map_err(|_| anyhow!("Missing {ENV_LOOKUP_API_KEY} env var"))?;
            }

            remote.timeout_ms = remote.timeout_ms.clamp(100, 10_000);
        }

        Ok(cfg)
    }
}
