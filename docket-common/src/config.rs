//! Configuration loading and backend URL resolution

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Result;

/// Environment variable overriding the backend base URL.
pub const BACKEND_URL_ENV: &str = "DOCKET_BACKEND_URL";

/// Compiled default backend base URL.
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";

/// On-disk configuration, `~/.config/docket/config.toml`.
///
/// Every field is optional; a missing file or missing field falls back
/// to the next resolution source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Ingestion backend base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_url: Option<String>,

    /// Log filter override, e.g. `"docket_ingest=debug"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_filter: Option<String>,
}

impl TomlConfig {
    /// Read and parse a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

/// Backend URL resolution following priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable `DOCKET_BACKEND_URL`
/// 3. TOML config file `backend_url` key
/// 4. Compiled default (fallback)
#[derive(Debug, Clone)]
pub struct BackendUrlResolver {
    config_path: Option<PathBuf>,
}

impl BackendUrlResolver {
    /// Resolver using the platform's default config file location.
    pub fn new() -> Self {
        Self {
            config_path: default_config_path(),
        }
    }

    /// Resolver reading a specific config file (tests, `--config` flag).
    pub fn with_config_path(path: PathBuf) -> Self {
        Self {
            config_path: Some(path),
        }
    }

    /// Resolve the backend base URL. Never fails; a missing or
    /// malformed config file degrades to the compiled default.
    pub fn resolve(&self, cli_arg: Option<&str>) -> String {
        // Priority 1: Command-line argument
        if let Some(url) = cli_arg {
            return normalize_base_url(url);
        }

        // Priority 2: Environment variable
        if let Ok(url) = std::env::var(BACKEND_URL_ENV) {
            if !url.is_empty() {
                return normalize_base_url(&url);
            }
        }

        // Priority 3: TOML config file
        if let Some(path) = &self.config_path {
            if let Ok(config) = TomlConfig::load(path) {
                if let Some(url) = config.backend_url {
                    return normalize_base_url(&url);
                }
            }
        }

        // Priority 4: Compiled default
        DEFAULT_BACKEND_URL.to_string()
    }
}

impl Default for BackendUrlResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip trailing slashes so endpoint paths can be appended directly.
pub fn normalize_base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

/// Default configuration file path for the platform.
///
/// Linux: `~/.config/docket/config.toml`, falling back to
/// `/etc/docket/config.toml`. Other platforms use the OS config dir.
/// Returns None when no candidate file exists.
pub fn default_config_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("docket").join("config.toml"));

    if let Some(path) = &user_config {
        if path.exists() {
            return user_config;
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/docket/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}
