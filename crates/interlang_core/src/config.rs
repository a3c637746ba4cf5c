use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::lang::LanguageTable;

pub const DEFAULT_USER_AGENT: &str = "interlang/0.1";
pub const DEFAULT_EDIT_SUMMARY: &str = "update interlanguage links";
pub const DEFAULT_NAMESPACES: [i32; 5] = [0, 4, 10, 12, 14];

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct InterlangConfig {
    #[serde(default)]
    pub wiki: WikiSection,
    #[serde(default)]
    pub interlanguage: InterlanguageSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiSection {
    pub url: Option<String>,
    pub api_url: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct InterlanguageSection {
    pub namespaces: Option<Vec<i32>>,
    pub edit_summary: Option<String>,
    pub internal_tags: Option<Vec<String>>,
    pub external_tags: Option<Vec<String>>,
}

impl InterlangConfig {
    /// Resolve the wiki API URL: env WIKI_API_URL > config > None.
    pub fn api_url(&self) -> Option<String> {
        env_override("WIKI_API_URL").or_else(|| self.wiki.api_url.clone())
    }

    /// Resolve the wiki base URL: env WIKI_URL > config > derived from api_url.
    pub fn wiki_url(&self) -> Option<String> {
        if let Some(url) = env_override("WIKI_URL") {
            return Some(url);
        }
        if let Some(url) = &self.wiki.url {
            return Some(url.clone());
        }
        self.api_url().and_then(|api| derive_wiki_url(&api))
    }

    /// Resolve user agent: env WIKI_USER_AGENT > config > DEFAULT_USER_AGENT.
    pub fn user_agent(&self) -> String {
        env_override("WIKI_USER_AGENT")
            .or_else(|| self.wiki.user_agent.clone())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    pub fn namespaces(&self) -> Vec<i32> {
        self.interlanguage
            .namespaces
            .clone()
            .unwrap_or_else(|| DEFAULT_NAMESPACES.to_vec())
    }

    pub fn edit_summary(&self) -> &str {
        self.interlanguage
            .edit_summary
            .as_deref()
            .unwrap_or(DEFAULT_EDIT_SUMMARY)
    }

    /// The built-in language table with any configured tag classification applied.
    pub fn language_table(&self) -> LanguageTable {
        LanguageTable::archwiki().with_classification(
            self.interlanguage.internal_tags.as_deref(),
            self.interlanguage.external_tags.as_deref(),
        )
    }
}

/// Load and parse the config file. Returns defaults if the file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<InterlangConfig> {
    if !config_path.exists() {
        return Ok(InterlangConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: InterlangConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

/// Derive wiki base URL from an API URL by stripping `/api.php`.
pub fn derive_wiki_url(api_url: &str) -> Option<String> {
    let trimmed = api_url.trim();
    let stripped = trimmed.strip_suffix("/api.php").unwrap_or(trimmed);
    let result = stripped.trim_end_matches('/').to_string();
    if result.is_empty() { None } else { Some(result) }
}

fn env_override(key: &str) -> Option<String> {
    let value = env::var(key).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
