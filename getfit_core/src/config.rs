//! Configuration file support for GetFit.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/getfit/config.toml`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub validation: ValidationConfig,

    #[serde(default)]
    pub security: SecurityConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Aggregate store tuning
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Deadline applied to every store call
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
}

impl StoreConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            operation_timeout_ms: default_operation_timeout_ms(),
        }
    }
}

/// Input limits enforced by the validator
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_username_max_len")]
    pub username_max_len: usize,

    #[serde(default = "default_email_max_len")]
    pub email_max_len: usize,

    #[serde(default = "default_password_min_len")]
    pub password_min_len: usize,

    #[serde(default = "default_password_max_len")]
    pub password_max_len: usize,

    #[serde(default = "default_title_max_len")]
    pub title_max_len: usize,

    /// Upper bound on reps in a single set
    #[serde(default = "default_reps_max")]
    pub reps_max: u32,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            username_max_len: default_username_max_len(),
            email_max_len: default_email_max_len(),
            password_min_len: default_password_min_len(),
            password_max_len: default_password_max_len(),
            title_max_len: default_title_max_len(),
            reps_max: default_reps_max(),
        }
    }
}

/// Credential hashing parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            bcrypt_cost: default_bcrypt_cost(),
        }
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("getfit")
}

fn default_operation_timeout_ms() -> u64 {
    5_000
}

fn default_username_max_len() -> usize {
    50
}

fn default_email_max_len() -> usize {
    50
}

fn default_password_min_len() -> usize {
    8
}

// bcrypt only considers the first 72 bytes
fn default_password_max_len() -> usize {
    72
}

fn default_title_max_len() -> usize {
    100
}

fn default_reps_max() -> u32 {
    1_000
}

/// Cost range accepted by bcrypt
pub const MIN_BCRYPT_COST: u32 = 4;
pub const MAX_BCRYPT_COST: u32 = 31;

fn default_bcrypt_cost() -> u32 {
    bcrypt::DEFAULT_COST
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.check()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("getfit").join("config.toml")
    }

    /// Save the current configuration to the default path
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path();
        self.save_to(&config_path)
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    fn check(&self) -> Result<()> {
        if self.store.operation_timeout_ms == 0 {
            return Err(Error::Config(
                "store.operation_timeout_ms must be positive".into(),
            ));
        }
        let v = &self.validation;
        if v.password_min_len > v.password_max_len {
            return Err(Error::Config(format!(
                "validation.password_min_len ({}) exceeds password_max_len ({})",
                v.password_min_len, v.password_max_len
            )));
        }
        if v.reps_max == 0 {
            return Err(Error::Config("validation.reps_max must be positive".into()));
        }
        if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&self.security.bcrypt_cost) {
            return Err(Error::Config(format!(
                "security.bcrypt_cost must be between {} and {}",
                MIN_BCRYPT_COST, MAX_BCRYPT_COST
            )));
        }
        Ok(())
    }
}
