use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const CONFIG_FILE: &str = ".gh-analytics.toml";
pub const DEFAULT_API_URL: &str = "https://api.github.com";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration loaded from .gh-analytics.toml.
/// All fields are optional; the tool works with zero config.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubConfig {
    /// GitHub API token. If None, falls back to GITHUB_TOKEN env var.
    pub token: Option<String>,
    /// REST API root, override for GitHub Enterprise.
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: default_api_url(),
        }
    }
}

/// Most hits the search API serves for a single query.
pub const SEARCH_RESULT_LIMIT: usize = 1000;

/// Paging and rate-limit knobs for the search client.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    /// The search API never returns more than 1000 hits for one query.
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_max_rate_limit_retries")]
    pub max_rate_limit_retries: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            per_page: default_per_page(),
            max_results: default_max_results(),
            max_rate_limit_retries: default_max_rate_limit_retries(),
        }
    }
}

impl SearchConfig {
    /// per_page clamped to what the API accepts.
    pub fn page_size(&self) -> u32 {
        self.per_page.clamp(1, 100)
    }

    /// max_results capped at what the search API will page through.
    pub fn result_cap(&self) -> usize {
        self.max_results.min(SEARCH_RESULT_LIMIT)
    }
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_per_page() -> u32 {
    100
}

fn default_max_results() -> usize {
    SEARCH_RESULT_LIMIT
}

fn default_max_rate_limit_retries() -> u32 {
    5
}

impl Config {
    /// Load configuration from .gh-analytics.toml in the current directory.
    /// Returns default config if the file doesn't exist.
    pub fn load() -> Result<Config, ConfigError> {
        let path = Path::new(CONFIG_FILE);
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Config::default())
        }
    }

    /// Load from a specific path (useful for testing).
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Resolve the GitHub token: an explicit `--token` wins, then the config
    /// file value, then the GITHUB_TOKEN env var.
    pub fn github_token(&self, flag: Option<&str>) -> Option<String> {
        flag.map(str::to_string)
            .or_else(|| self.github.token.clone())
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
            .filter(|token| !token.trim().is_empty())
    }
}
