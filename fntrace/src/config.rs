use crate::field::DEFAULT_FIELDS;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub replay: ReplayConfig,
}

/// Defaults for `fntrace replay`; command line flags take precedence.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReplayConfig {
    #[serde(default = "default_fields")]
    pub fields: String,
    #[serde(default)]
    pub depth: Option<usize>,
    #[serde(default)]
    pub notrace: Vec<String>,
    #[serde(default)]
    pub task_newline: bool,
    #[serde(default = "default_header")]
    pub header: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            fields: default_fields(),
            depth: None,
            notrace: Vec::new(),
            task_newline: false,
            header: default_header(),
        }
    }
}

fn default_fields() -> String {
    DEFAULT_FIELDS.to_string()
}

fn default_header() -> bool {
    true
}

impl Config {
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
