use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Result, anyhow};

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000/chat";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_GREETING: &str =
    "Welcome! I am your AI Tax Assistant. How can I help you today?";

pub fn default_suggestions() -> Vec<String> {
    vec![
        "Can you provide a list of entities where the Effective Tax Rate (%) compared to the Statutory Tax Rate shows more than a 10% ETR positive variance threshold with difference?".to_string(),
        "Can you compare the total disallowed and allowable donations claimed? What is the proportionate percentage of the deduction?".to_string(),
        "Create a pie graph for top 5 ETR vs client with ETR descending".to_string(),
        "Create a line graph for QE vs CA?".to_string(),
        "What's the tax position for Tropicana for the latest YA?".to_string(),
    ]
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub backend_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub download_dir: Option<PathBuf>,
    pub greeting: Option<String>,
    pub suggestions: Option<Vec<String>>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the user's config file (defaults if absent), then apply
    /// `TALLY_BACKEND_URL` / `TALLY_DOWNLOAD_DIR` overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::get_config_path()?)?;
        if let Ok(url) = std::env::var("TALLY_BACKEND_URL") {
            config.backend_url = Some(url);
        }
        if let Ok(dir) = std::env::var("TALLY_DOWNLOAD_DIR") {
            config.download_dir = Some(PathBuf::from(dir));
        }
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn backend_url(&self) -> String {
        self.backend_url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        )
    }

    /// Configured directory, else the platform download dir, else `.`.
    pub fn download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn greeting(&self) -> String {
        self.greeting
            .clone()
            .unwrap_or_else(|| DEFAULT_GREETING.to_string())
    }

    pub fn suggestions(&self) -> Vec<String> {
        self.suggestions.clone().unwrap_or_else(default_suggestions)
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("tally").join("config.json"))
    }
}
