// Configuration Storage Service
// Handles config file read/write and version backup

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::{OutputFormat, SamplingParams};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct HumanizerConfig {
    pub version: String,
    pub default_provider: Option<String>,
    pub proxy: Option<ProxyConfig>,
    #[serde(default)]
    pub rewrite: RewriteConfig,
    #[serde(default)]
    pub detection: DetectionServiceConfig,
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default)]
    pub api_keys: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    pub enabled: bool,
    pub http: Option<String>,
    pub https: Option<String>,
}

impl ProxyConfig {
    /// Proxy URL to route model traffic through, if enabled.
    pub fn active_url(&self) -> Option<&str> {
        if !self.enabled {
            return None;
        }
        self.https.as_deref().or(self.http.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RewriteConfig {
    pub model: String,
    pub wc_tolerance_pct: u32,
    pub sampling: SamplingParams,
    pub max_batch_chars: usize,
    pub max_concurrency: usize,
    pub request_timeout_secs: u64,
    pub max_tokens: u32,
    pub add_words_marker: bool,
    pub output_format: OutputFormat,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            wc_tolerance_pct: 2,
            sampling: SamplingParams::default(),
            max_batch_chars: 12000,
            max_concurrency: 4,
            request_timeout_secs: 120,
            max_tokens: 8192,
            add_words_marker: false,
            output_format: OutputFormat::Html,
        }
    }
}

/// External AI-detection scoring endpoint. Disabled while `url` is unset.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DetectionServiceConfig {
    pub url: Option<String>,
    #[serde(default)]
    pub api_key_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub enabled: bool,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

pub struct ConfigStore {
    config_dir: PathBuf,
    config_file: PathBuf,
}

impl ConfigStore {
    pub fn new(config_dir: PathBuf) -> Self {
        let config_file = config_dir.join("config.json");
        Self { config_dir, config_file }
    }

    /// Get default config directory
    pub fn default_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("humanizer"))
    }

    pub fn ensure_dir(&self) -> Result<(), ConfigError> {
        fs::create_dir_all(&self.config_dir)?;
        Ok(())
    }

    /// Load configuration from file; a missing file yields defaults.
    pub fn load(&self) -> Result<HumanizerConfig, ConfigError> {
        if !self.config_file.exists() {
            return Ok(HumanizerConfig::default());
        }

        let content = fs::read_to_string(&self.config_file)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save configuration to file
    pub fn save(&self, config: &HumanizerConfig) -> Result<(), ConfigError> {
        self.ensure_dir()?;

        if self.config_file.exists() {
            self.create_backup()?;
        }

        let content = serde_json::to_string_pretty(config)?;
        fs::write(&self.config_file, content)?;
        Ok(())
    }

    fn create_backup(&self) -> Result<(), ConfigError> {
        let backup_dir = self.config_dir.join("backups");
        fs::create_dir_all(&backup_dir)?;

        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S%3f");
        let backup_file = backup_dir.join(format!("config_{}.json", timestamp));
        fs::copy(&self.config_file, &backup_file)?;

        self.cleanup_old_backups(&backup_dir, 10)
    }

    /// Remove old backups, keeping only the most recent N
    fn cleanup_old_backups(&self, backup_dir: &Path, keep: usize) -> Result<(), ConfigError> {
        let mut entries: Vec<_> = fs::read_dir(backup_dir)?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map_or(false, |ext| ext == "json"))
            .collect();

        if entries.len() <= keep {
            return Ok(());
        }

        // Oldest first
        entries.sort_by_key(|e| {
            e.metadata()
                .and_then(|m| m.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
        });

        let remove_count = entries.len() - keep;
        for entry in entries.iter().take(remove_count) {
            let _ = fs::remove_file(entry.path());
        }

        Ok(())
    }

    pub fn get_api_key(&self, provider: &str) -> Result<Option<String>, ConfigError> {
        let config = self.load()?;
        Ok(config.api_keys.get(provider).cloned())
    }

    pub fn set_api_key(&self, provider: &str, key: &str) -> Result<(), ConfigError> {
        let mut config = self.load()?;
        config.api_keys.insert(provider.to_string(), key.to_string());
        self.save(&config)
    }

    pub fn delete_api_key(&self, provider: &str) -> Result<(), ConfigError> {
        let mut config = self.load()?;
        config.api_keys.remove(provider);
        self.save(&config)
    }

    pub fn get_provider_url(&self, provider: &str) -> Result<Option<String>, ConfigError> {
        let config = self.load()?;
        Ok(config.providers.get(provider).and_then(|p| p.base_url.clone()))
    }

    pub fn set_provider_url(&self, provider: &str, url: &str) -> Result<(), ConfigError> {
        let mut config = self.load()?;
        let provider_config = config.providers.entry(provider.to_string()).or_default();
        provider_config.base_url = Some(url.to_string());
        self.save(&config)
    }
}
