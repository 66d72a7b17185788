use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Address the gateway listens on
  pub listen: SocketAddr,
  pub network: NetworkConfig,
  pub cache: CacheConfig,
  pub precache: PrecacheConfig,
  pub routing: RoutingConfig,
  pub lifecycle: LifecycleConfig,
  /// Where the config was read from, used by update checks
  #[serde(skip)]
  pub source: Option<PathBuf>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      listen: SocketAddr::from(([127, 0, 0, 1], 8080)),
      network: NetworkConfig::default(),
      cache: CacheConfig::default(),
      precache: PrecacheConfig::default(),
      routing: RoutingConfig::default(),
      lifecycle: LifecycleConfig::default(),
      source: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
  /// Origin the gateway forwards to, e.g. "http://127.0.0.1:3000"
  pub upstream: String,
  pub timeout_secs: u64,
}

impl Default for NetworkConfig {
  fn default() -> Self {
    Self {
      upstream: "http://127.0.0.1:3000".to_string(),
      timeout_secs: 30,
    }
  }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
  /// SQLite file under the user data directory
  #[default]
  Sqlite,
  /// Process memory, lost on exit
  Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Build tag appended to both partition names
  pub version: String,
  pub static_prefix: String,
  pub api_prefix: String,
  pub backend: StoreBackend,
  /// Override for the SQLite file location
  pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      version: "v1".to_string(),
      static_prefix: "hotel-pms-static".to_string(),
      api_prefix: "hotel-pms-api".to_string(),
      backend: StoreBackend::Sqlite,
      path: None,
    }
  }
}

impl CacheConfig {
  pub fn static_partition(&self) -> String {
    format!("{}-{}", self.static_prefix, self.version)
  }

  pub fn api_partition(&self) -> String {
    format!("{}-{}", self.api_prefix, self.version)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PrecacheConfig {
  /// Pages and bundles cached at install; any failure fails the install
  pub static_paths: Vec<String>,
  /// API routes snapshotted at install; failures are ignored
  pub api_paths: Vec<String>,
}

impl Default for PrecacheConfig {
  fn default() -> Self {
    Self {
      static_paths: [
        "/",
        "/offline.html",
        "/manifest.json",
        "/static/js/bundle.js",
        "/static/css/main.css",
        "/favicon.ico",
      ]
      .into_iter()
      .map(String::from)
      .collect(),
      api_paths: [
        "/api/rooms",
        "/api/guests",
        "/api/reservations",
        "/api/dashboard/stats",
      ]
      .into_iter()
      .map(String::from)
      .collect(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
  pub api_prefix: String,
  pub offline_page: String,
  pub root_page: String,
}

impl Default for RoutingConfig {
  fn default() -> Self {
    Self {
      api_prefix: "/api/".to_string(),
      offline_page: "/offline.html".to_string(),
      root_page: "/".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
  /// Activate right after install instead of waiting for SKIP_WAITING
  pub skip_waiting_on_install: bool,
}

impl Default for LifecycleConfig {
  fn default() -> Self {
    Self {
      skip_waiting_on_install: true,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./pms-gateway.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/pms-gateway/config.yaml
  ///
  /// Falls back to the built-in defaults when no file is found.
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
      None => Ok(Config::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("pms-gateway.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("pms-gateway").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  pub fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let mut config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;
    config.source = Some(path.to_path_buf());

    config.validate()?;
    Ok(config)
  }

  /// Re-read the file this config came from. Configs built from defaults
  /// have nothing to reload and are returned unchanged.
  pub fn reload(&self) -> Result<Self> {
    match &self.source {
      Some(path) => Self::load_from_path(path),
      None => Ok(self.clone()),
    }
  }

  pub fn validate(&self) -> Result<()> {
    url::Url::parse(&self.network.upstream)
      .map_err(|e| eyre!("Invalid upstream URL '{}': {}", self.network.upstream, e))?;

    if self.cache.version.trim().is_empty() {
      return Err(eyre!("cache.version must not be empty"));
    }

    if self.cache.static_partition() == self.cache.api_partition() {
      return Err(eyre!(
        "Static and API partitions share the name '{}'",
        self.cache.static_partition()
      ));
    }

    if !self.routing.api_prefix.starts_with('/') {
      return Err(eyre!(
        "routing.api_prefix must start with '/': {}",
        self.routing.api_prefix
      ));
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.cache.static_partition(), "hotel-pms-static-v1");
    assert_eq!(config.cache.api_partition(), "hotel-pms-api-v1");
    assert!(config.precache.static_paths.contains(&"/offline.html".to_string()));
    assert!(config.lifecycle.skip_waiting_on_install);
    assert!(config.validate().is_ok());
  }

  #[test]
  fn test_partial_file_keeps_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
      file,
      "network:\n  upstream: http://pms.local:9000\ncache:\n  version: v7\n  backend: memory"
    )
    .unwrap();

    let config = Config::load(Some(file.path())).unwrap();
    assert_eq!(config.network.upstream, "http://pms.local:9000");
    assert_eq!(config.network.timeout_secs, 30);
    assert_eq!(config.cache.api_partition(), "hotel-pms-api-v7");
    assert_eq!(config.cache.backend, StoreBackend::Memory);
    assert_eq!(config.routing.api_prefix, "/api/");
    assert_eq!(config.source.as_deref(), Some(file.path()));
  }

  #[test]
  fn test_missing_explicit_file_is_error() {
    let err = Config::load(Some(Path::new("/nonexistent/pms-gateway.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }

  #[test]
  fn test_invalid_upstream_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "network:\n  upstream: not a url").unwrap();

    assert!(Config::load(Some(file.path())).is_err());
  }

  #[test]
  fn test_reload_picks_up_new_version() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "cache:\n  version: v1").unwrap();
    let config = Config::load(Some(file.path())).unwrap();

    std::fs::write(file.path(), "cache:\n  version: v2\n").unwrap();
    let reloaded = config.reload().unwrap();
    assert_eq!(reloaded.cache.version, "v2");
  }
}
