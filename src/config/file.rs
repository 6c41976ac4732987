//! Configuration file management for charade.
//!
//! Configuration lives in `~/.config/charade/charade.toml`. Missing fields
//! fall back to their defaults so older files keep loading.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Microphone and meter settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioConfig {
    /// Audio device to use. Options:
    /// - "default" for system default device
    /// - numeric index (0, 1, 2, etc.) from `charade list-devices`
    /// - device name from `charade list-devices`
    #[serde(default = "default_device")]
    pub device: String,
    /// Requested sample rate in Hz; the device's native rate is used if it differs
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Peak volume threshold for the red indicator (0-100)
    #[serde(default = "default_peak_volume_threshold")]
    pub peak_volume_threshold: u8,
    /// Reference level in dBFS for a 100% meter reading
    #[serde(default = "default_reference_level_db")]
    pub reference_level_db: i8,
    /// Number of recent samples drawn in the live waveform
    #[serde(default = "default_window_size")]
    pub window_size: usize,
}

fn default_device() -> String {
    "default".to_string()
}

fn default_sample_rate() -> u32 {
    44100
}

fn default_peak_volume_threshold() -> u8 {
    90
}

fn default_reference_level_db() -> i8 {
    -20
}

fn default_window_size() -> usize {
    1 << 15
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            sample_rate: default_sample_rate(),
            peak_volume_threshold: default_peak_volume_threshold(),
            reference_level_db: default_reference_level_db(),
            window_size: default_window_size(),
        }
    }
}

/// Remote generation service settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationConfig {
    /// Base URL of the service; clips go to `<endpoint>/generate`
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Optional bearer token sent as `Authorization: Bearer <token>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_endpoint() -> String {
    "http://localhost:8000".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CharadeConfig {
    /// Written by setup; read separately from the first line
    #[serde(default, skip_serializing)]
    pub config_version: Option<String>,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

impl CharadeConfig {
    /// Loads configuration from the user's config directory.
    ///
    /// # Errors
    /// - If the config directory cannot be determined
    /// - If the config file cannot be read
    /// - If the TOML is malformed
    pub fn load() -> anyhow::Result<Self> {
        let config_path = get_config_path()?;
        Self::load_from(&config_path)
    }

    /// Loads configuration from an explicit path.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let config_content = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {}: {e}", path.display()))?;
        let config: CharadeConfig = toml::from_str(&config_content)
            .map_err(|e| anyhow::anyhow!("Invalid config {}: {e}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that would break recording or uploads.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.audio.window_size == 0 {
            return Err(anyhow::anyhow!("audio.window_size must be greater than 0"));
        }
        if self.audio.peak_volume_threshold > 100 {
            return Err(anyhow::anyhow!(
                "audio.peak_volume_threshold must be between 0 and 100"
            ));
        }
        if !self.generation.endpoint.starts_with("http://")
            && !self.generation.endpoint.starts_with("https://")
        {
            return Err(anyhow::anyhow!(
                "generation.endpoint must start with http:// or https:// (got '{}')",
                self.generation.endpoint
            ));
        }
        Ok(())
    }
}

/// Retrieves the path to the config file, creating its directory.
///
/// # Errors
/// - If the home directory cannot be determined
/// - If the config directory cannot be created
pub fn get_config_path() -> anyhow::Result<PathBuf> {
    let config_dir = dirs::home_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?
        .join(".config")
        .join("charade");
    fs::create_dir_all(&config_dir)?;
    Ok(config_dir.join("charade.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: CharadeConfig = toml::from_str(
            r#"
            config_version = "0.1.0"
            [generation]
            endpoint = "https://charade.example.com"
            "#,
        )
        .unwrap();

        assert_eq!(config.config_version.as_deref(), Some("0.1.0"));
        assert_eq!(config.audio, AudioConfig::default());
        assert_eq!(config.audio.window_size, 32768);
        assert_eq!(config.generation.endpoint, "https://charade.example.com");
        assert_eq!(config.generation.token, None);
        assert_eq!(config.generation.timeout_secs, 300);
    }

    #[test]
    fn test_default_template_parses() {
        let template = include_str!("../../environments/charade.toml");
        let config: CharadeConfig = toml::from_str(template).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config, CharadeConfig::default());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = CharadeConfig::default();
        config.generation.endpoint = "localhost:8000".to_string();
        assert!(config.validate().is_err());

        let mut config = CharadeConfig::default();
        config.audio.window_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("charade.toml");
        std::fs::write(&path, "[audio\n").unwrap();
        let err = CharadeConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("charade.toml"));
    }
}
