use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct EngineConfig {
    /// Seeds the net's shared generator; `None` seeds from the OS.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Upper bound on bindings examined per colored firing attempt.
    #[serde(default)]
    pub binding_limit: Option<usize>,
    /// Maximum retained colored undo entries, oldest dropped first.
    #[serde(default)]
    pub undo_depth: Option<usize>,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SimulationConfig {
    /// Weighted random firings per replication.
    #[serde(default = "default_firings")]
    pub firings: usize,
    #[serde(default = "default_replications")]
    pub replications: usize,
    /// Replication `i` runs with seed `seed + i`.
    #[serde(default)]
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            firings: default_firings(),
            replications: default_replications(),
            seed: 0,
        }
    }
}

impl EngineConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)?;
        Ok(config)
    }
}

fn default_firings() -> usize {
    100
}

fn default_replications() -> usize {
    10
}
