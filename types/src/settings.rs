//! Application settings schema.
//!
//! Loaded from `config.toml` by `edco-core`; every field has a default so a
//! missing or partial file always deserializes.

use serde::{Deserialize, Serialize};

/// Journal ingestion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// Directory the game client writes `Journal.*.log` files into.
    pub directory: String,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            directory: default_journal_directory(),
        }
    }
}

/// Settings for the optional external enrichment source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// Master switch; when false, aggregation is local-only.
    pub enabled: bool,
    /// Base URL of the enrichment API.
    pub base_url: String,
    pub api_key: String,
    pub commander_name: String,
    /// When true, systems with any local journal data are served purely from
    /// local data and the enrichment source is not consulted for them.
    pub prefer_local_for_visited: bool,
    /// Per-request timeout for enrichment fetches, in seconds.
    pub timeout_secs: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: String::new(),
            api_key: String::new(),
            commander_name: String::new(),
            prefer_local_for_visited: true,
            timeout_secs: 10,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub journal: JournalConfig,
    pub enrichment: EnrichmentConfig,
}

fn default_journal_directory() -> String {
    if cfg!(target_os = "windows") {
        r"C:\Users\%USERNAME%\Saved Games\Frontier Developments\Elite Dangerous".to_string()
    } else {
        "~/.local/share/Frontier Developments/Elite Dangerous".to_string()
    }
}
