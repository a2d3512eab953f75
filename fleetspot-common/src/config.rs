//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the root folder
pub const ROOT_ENV_VAR: &str = "FLEETSPOT_ROOT";

/// Service config file name, looked up inside the root folder
pub const CONFIG_FILE_NAME: &str = "fleetspot.toml";

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. `root_folder` key in the user TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&str>) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(ROOT_ENV_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(config_path) = user_config_file() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                if let Some(root_folder) = config.get("root_folder").and_then(|v| v.as_str()) {
                    return PathBuf::from(root_folder);
                }
            }
        }
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// User-level config file (`~/.config/fleetspot/config.toml` on Linux)
fn user_config_file() -> Option<PathBuf> {
    dirs::config_dir()
        .map(|d| d.join("fleetspot").join("config.toml"))
        .filter(|p| p.exists())
}

/// OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("fleetspot"))
        .unwrap_or_else(|| PathBuf::from("./fleetspot_data"))
}

/// Service settings read from `fleetspot.toml`
///
/// Every key is optional; a missing file means all defaults.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Address the HTTP listener binds to
    pub bind_addr: String,
    /// SQLite database file, relative to the root folder
    pub database_file: String,
    /// Image directory, relative to the root folder
    pub image_dir: String,
    /// Contributor who receives admin notifications
    pub admin_contributor_id: i64,
    /// Publish cap per batch, also the queue-length trigger
    pub batch_size: usize,
    /// Age of the oldest unposted sighting that forces a publish
    pub batch_max_age_hours: i64,
    /// Maximum Hamming distance that flags an image as similar
    pub similar_distance_threshold: u32,
    /// Number of fuzzy plate suggestions offered on a registry miss
    pub fuzzy_max_results: usize,
    /// Longest accepted preferred name
    pub max_name_len: usize,
    /// Denominator for the collection progress bar; registry size when unset
    pub progress_total_override: Option<usize>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5740".to_string(),
            database_file: "fleetspot.db".to_string(),
            image_dir: "sightings".to_string(),
            admin_contributor_id: 1,
            batch_size: 4,
            batch_max_age_hours: 24,
            similar_distance_threshold: 5,
            fuzzy_max_results: 5,
            max_name_len: 50,
            progress_total_override: None,
        }
    }
}

impl ServiceConfig {
    /// Load `fleetspot.toml` from the root folder
    ///
    /// A missing file is not an error: a warning is logged and defaults apply.
    /// A present but malformed file is a configuration error.
    pub fn load(root_folder: &Path) -> Result<Self> {
        let path = root_folder.join(CONFIG_FILE_NAME);
        if !path.exists() {
            warn!("No {} in {}, using defaults", CONFIG_FILE_NAME, root_folder.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let config = Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse settings from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".to_string()));
        }
        if self.batch_max_age_hours <= 0 {
            return Err(Error::Config("batch_max_age_hours must be positive".to_string()));
        }
        Ok(())
    }

    pub fn database_path(&self, root_folder: &Path) -> PathBuf {
        root_folder.join(&self.database_file)
    }

    pub fn image_path(&self, root_folder: &Path) -> PathBuf {
        root_folder.join(&self.image_dir)
    }
}

/// Messaging provider credentials
///
/// Account SID and auth token are required to download inbound media; the
/// sender phone number only enables outbound admin notifications.
#[derive(Debug, Clone)]
pub struct TwilioCredentials {
    pub account_sid: String,
    pub auth_token: String,
    pub phone_number: Option<String>,
}

impl TwilioCredentials {
    /// Read credentials from the environment, failing fast when required ones are missing
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            account_sid: require_env("TWILIO_ACCOUNT_SID")?,
            auth_token: require_env("TWILIO_AUTH_TOKEN")?,
            phone_number: optional_env("TWILIO_PHONE_NUMBER"),
        })
    }
}

fn require_env(name: &str) -> Result<String> {
    optional_env(name).ok_or_else(|| Error::Config(format!("{} is not set", name)))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
