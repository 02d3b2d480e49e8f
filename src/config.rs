use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::progress::UnlockRule;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub unlock_rule: UnlockRule,
    pub assistant: Option<AssistantConfig>,
}

/// Credentials for the completion API. Absent means the assistant endpoints
/// answer with "assistant unavailable" instead of calling out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub model: String,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}
