use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::DEFAULT_SIZE_THRESHOLD;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub erp: ErpConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub sync: SyncConfig,
  /// Where the stores and logs live (defaults to $XDG_DATA_HOME/erpo)
  pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErpConfig {
  /// Site URL, e.g. https://erp.example.com
  pub url: String,
  /// Connect + response timeout applied to every request
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
  /// `limit_page_length` sent with list reads (0 = everything)
  #[serde(default = "default_page_length")]
  pub page_length: u32,
  /// Endpoint that receives location updates
  #[serde(default = "default_location_endpoint")]
  pub location_endpoint: String,
}

impl ErpConfig {
  pub fn new(url: impl Into<String>) -> Self {
    Self {
      url: url.into(),
      timeout_secs: default_timeout_secs(),
      page_length: default_page_length(),
      location_endpoint: default_location_endpoint(),
    }
  }

  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Serialized size above which values go to the bulk store
  #[serde(default = "default_size_threshold")]
  pub size_threshold: usize,
  /// Per-item ceiling of the secure store
  #[serde(default = "default_size_threshold")]
  pub secure_max_value_len: usize,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      size_threshold: default_size_threshold(),
      secure_max_value_len: default_size_threshold(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
  /// Period of the unconditional queue replay
  #[serde(default = "default_sync_interval_secs")]
  pub interval_secs: u64,
  /// How often `watch` probes the server for connectivity
  #[serde(default = "default_probe_interval_secs")]
  pub probe_interval_secs: u64,
}

impl SyncConfig {
  pub fn interval(&self) -> Duration {
    Duration::from_secs(self.interval_secs)
  }

  pub fn probe_interval(&self) -> Duration {
    Duration::from_secs(self.probe_interval_secs)
  }
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      interval_secs: default_sync_interval_secs(),
      probe_interval_secs: default_probe_interval_secs(),
    }
  }
}

fn default_timeout_secs() -> u64 {
  30
}

fn default_page_length() -> u32 {
  500
}

fn default_location_endpoint() -> String {
  "/api/resource/Employee Checkin".to_string()
}

fn default_size_threshold() -> usize {
  DEFAULT_SIZE_THRESHOLD
}

fn default_sync_interval_secs() -> u64 {
  5 * 60
}

fn default_probe_interval_secs() -> u64 {
  15
}

/// API key pair used for token authentication.
#[derive(Clone)]
pub struct ApiCredentials {
  pub key: String,
  pub secret: String,
}

impl std::fmt::Debug for ApiCredentials {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ApiCredentials")
      .field("key", &self.key)
      .field("secret", &"<redacted>")
      .finish()
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./erpo.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/erpo/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/erpo/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("erpo.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("erpo").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    if config.cache.size_threshold > config.cache.secure_max_value_len {
      return Err(eyre!(
        "cache.size_threshold ({}) exceeds cache.secure_max_value_len ({})",
        config.cache.size_threshold,
        config.cache.secure_max_value_len
      ));
    }

    for (field, value) in [
      ("erp.timeout_secs", config.erp.timeout_secs),
      ("sync.interval_secs", config.sync.interval_secs),
      ("sync.probe_interval_secs", config.sync.probe_interval_secs),
    ] {
      if value == 0 {
        return Err(eyre!("{} must be greater than zero", field));
      }
    }

    Ok(config)
  }

  /// Resolved data directory.
  pub fn data_dir(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.data_dir {
      return Ok(dir.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("erpo"))
  }

  /// Get the API key pair from environment variables.
  ///
  /// Reads ERPO_API_KEY and ERPO_API_SECRET. Returns `None` when neither is
  /// set, so public sites still work.
  pub fn get_api_credentials() -> Result<Option<ApiCredentials>> {
    match (
      std::env::var("ERPO_API_KEY").ok(),
      std::env::var("ERPO_API_SECRET").ok(),
    ) {
      (Some(key), Some(secret)) => Ok(Some(ApiCredentials { key, secret })),
      (None, None) => Ok(None),
      _ => Err(eyre!(
        "Set both ERPO_API_KEY and ERPO_API_SECRET, or neither."
      )),
    }
  }
}
