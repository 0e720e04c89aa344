use crate::fallback::FallbackCatalogue;
use anyhow::{anyhow, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

/// The structure of our configuration file (config.toml)
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Where local `yt-dlp` downloads land. Swept by the janitor.
    pub download_directory: String,
    pub cobalt_api_url: String,
    pub oembed_url: String,
    pub request_timeout_secs: u64,
    pub file_ttl_secs: u64,
    pub cleanup_interval_secs: u64,
    pub fallback: FallbackCatalogue,
}

impl Default for Config {
    fn default() -> Self {
        // Downloads are temporary, so they live in the app's data dir rather
        // than the user's Downloads folder.
        let default_dir = project_dirs()
            .map(|dirs| dirs.data_local_dir().join("downloads").to_string_lossy().to_string())
            .unwrap_or_else(|_| "downloads".to_string()); // Fallback

        Config {
            download_directory: default_dir,
            cobalt_api_url: "https://api.cobalt.tools/api/json".to_string(),
            oembed_url: "https://www.youtube.com/oembed".to_string(),
            request_timeout_secs: 15,
            file_ttl_secs: 3600,
            cleanup_interval_secs: 600,
            fallback: FallbackCatalogue::default(),
        }
    }
}

impl Config {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn file_ttl(&self) -> Duration {
        Duration::from_secs(self.file_ttl_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        // A zero period would make `tokio::time::interval` panic.
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }
}

pub fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("com", "YtFetch", "yt-fetch")
        .ok_or_else(|| anyhow!("Could not find a valid home directory to store config"))
}

/// Returns the cross-platform path to the configuration file, creating the directory if needed.
async fn get_config_path() -> Result<PathBuf> {
    let project_dirs = project_dirs()?;
    let config_dir = project_dirs.config_dir();
    fs::create_dir_all(config_dir).await?;
    Ok(config_dir.join("config.toml"))
}

/// Loads the configuration from the file, or creates a default one if it doesn't exist.
pub async fn load_config() -> Result<Config> {
    let config_path = get_config_path().await?;

    if !config_path.exists() {
        tracing::info!(
            "No config file found. Creating a default one at: {}",
            config_path.display()
        );
        let default_config = Config::default();
        save_config(&default_config).await?;
        return Ok(default_config);
    }

    let config_content = fs::read_to_string(&config_path).await?;
    parse_config(&config_content)
        .map_err(|e| anyhow!("Failed to parse config file at {}: {}", config_path.display(), e))
}

pub fn parse_config(content: &str) -> Result<Config> {
    Ok(toml::from_str(content)?)
}

/// Saves the provided configuration object to the file.
pub async fn save_config(config: &Config) -> Result<()> {
    let config_path = get_config_path().await?;
    let toml_string = toml::to_string_pretty(config)?;
    fs::write(config_path, toml_string).await?;
    Ok(())
}
