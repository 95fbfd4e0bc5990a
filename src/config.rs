//! Typed configuration, loaded from an optional TOML file with `REDIS_*`
//! environment overrides (`SPEC_FULL.md` §4.10).

mod error;

pub use error::ConfigError;

use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub persistence: PersistenceConfig,
    pub datastructure: DatastructureConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub aof: AofConfig,
    pub rdb: RdbConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AofConfig {
    pub enabled: bool,
    pub filename: String,
    pub rewrite_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RdbConfig {
    pub enabled: bool,
    pub filename: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatastructureConfig {
    pub expiration: ExpirationConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExpirationConfig {
    pub max_sample_size: usize,
    pub max_sample_rounds: usize,
    pub check_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub secret: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig::default(),
            persistence: PersistenceConfig::default(),
            datastructure: DatastructureConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            addr: "127.0.0.1:6379".to_owned(),
            read_timeout_secs: 300,
            write_timeout_secs: 300,
            shutdown_timeout_secs: 30,
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        PersistenceConfig {
            aof: AofConfig::default(),
            rdb: RdbConfig::default(),
        }
    }
}

impl Default for AofConfig {
    fn default() -> Self {
        AofConfig {
            enabled: true,
            filename: "appendonly.aof".to_owned(),
            rewrite_interval_secs: 300,
        }
    }
}

impl Default for RdbConfig {
    fn default() -> Self {
        RdbConfig {
            enabled: true,
            filename: "dump.rdb".to_owned(),
        }
    }
}

impl Default for DatastructureConfig {
    fn default() -> Self {
        DatastructureConfig {
            expiration: ExpirationConfig::default(),
        }
    }
}

impl Default for ExpirationConfig {
    fn default() -> Self {
        ExpirationConfig {
            max_sample_size: 20,
            max_sample_rounds: 3,
            check_interval_secs: 1,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        AuthConfig { secret: None }
    }
}

impl Config {
    /// Load configuration from `path` if given, falling back to defaults
    /// when no path is provided. Individual keys are then overridden by any
    /// matching `REDIS_*` environment variable. A config file that exists
    /// but fails to parse is a startup-fatal [`ConfigError`].
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })?;
                toml::from_str(&text).map_err(|source| ConfigError::Parse {
                    path: path.display().to_string(),
                    source,
                })?
            }
            None => Config::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = env_var("REDIS_SERVER_ADDR") {
            self.server.addr = value;
        }
        if let Some(value) = env_var("REDIS_AOF_ENABLED") {
            self.persistence.aof.enabled = parse_bool("REDIS_AOF_ENABLED", &value)?;
        }
        if let Some(value) = env_var("REDIS_RDB_ENABLED") {
            self.persistence.rdb.enabled = parse_bool("REDIS_RDB_ENABLED", &value)?;
        }
        if let Some(value) = env_var("REDIS_AUTH_SECRET") {
            self.auth.secret = Some(value);
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidOverride {
            key,
            value: value.to_owned(),
        }),
    }
}
