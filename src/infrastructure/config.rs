use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::network::config::{
    DEFAULT_PACKET_SIZE, DEFAULT_POLL_INTERVAL, DEFAULT_PORT, ListenerConfig, MIN_PACKET_SIZE,
    default_download_dir,
};
use crate::network::sender::parse_address;

/// Application configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub listen_port: u16,
    pub destination_address: Option<String>,
    pub destination_port: u16,
    pub download_directory: String,
    pub packet_size: usize,
    pub poll_interval_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_port: DEFAULT_PORT,
            destination_address: None,
            destination_port: DEFAULT_PORT,
            download_directory: default_download_dir().to_string_lossy().into_owned(),
            packet_size: DEFAULT_PACKET_SIZE,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
        }
    }
}

impl AppConfig {
    /// Load configuration from file or create default
    pub fn load_or_default(config_path: Option<&str>) -> Self {
        config_path
            .and_then(|path| Self::load(path).ok())
            .unwrap_or_default()
    }

    /// Load configuration from a JSON file
    pub fn load(config_path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(config_path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save configuration to file
    pub fn save_to_file(&self, config_path: &str) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    /// Get the download directory as PathBuf
    pub fn download_dir_path(&self) -> PathBuf {
        PathBuf::from(&self.download_directory)
    }

    /// Ensure all directories exist
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.download_directory)?;
        Ok(())
    }

    pub fn listener_config(&self) -> ListenerConfig {
        ListenerConfig::new(self.listen_port)
            .with_download_dir(self.download_dir_path())
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.packet_size < MIN_PACKET_SIZE {
            return Err(Error::Config(format!(
                "packet size must be at least {MIN_PACKET_SIZE}"
            )));
        }

        if self.poll_interval_ms == 0 {
            return Err(Error::Config("poll interval must be greater than 0".into()));
        }

        if self.download_directory.is_empty() {
            return Err(Error::Config("download directory must be set".into()));
        }

        if let Some(address) = &self.destination_address {
            parse_address(address)?;
        }

        Ok(())
    }
}
