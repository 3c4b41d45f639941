//! Process configuration.
//!
//! Loaded once at startup from YAML, then overridden by `REM_` environment
//! variables. The file is found with the following precedence:
//! 1. the `--config` flag
//! 2. the `REM_CONFIG` environment variable
//! 3. `$HOME/config.yaml`
//!
//! The first two must exist; a missing `$HOME/config.yaml` leaves every
//! setting at its default.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use remailer_common::ErrorKind;
use remailer_delivery::{DialerConfig, OutputConfig, ProxyAuth, SmtpConfig};
use remailer_pipeline::{StageConfig, processor, transformer};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_PREFIX: &str = "REM_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config from {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("{var} points to non-existent file: {path}")]
    Missing { var: &'static str, path: PathBuf },

    #[error("Invalid value '{value}' for {var}: {reason}")]
    Env {
        var: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Read { .. } => ErrorKind::Io,
            _ => ErrorKind::Config,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub debug: bool,

    #[serde(default)]
    pub read_file: ReadFileConfig,

    /// Processor chain. Empty means the canonical chain without signing.
    #[serde(default)]
    pub mail_processors: Vec<StageConfig>,

    #[serde(default)]
    pub outputs: Vec<OutputConfig>,

    #[serde(default)]
    pub dialer: DialerConfig,

    #[serde(default)]
    pub smtp: SmtpConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReadFileConfig {
    /// The spool directory.
    #[serde(default)]
    pub in_path: Option<PathBuf>,

    /// `host:port` of the Redis tracker. Absent keeps claims in memory.
    #[serde(default)]
    pub redis_addr: Option<String>,

    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    /// `header_from` mode when the stage does not set one.
    #[serde(default)]
    pub from_type: Option<String>,

    /// `header_from` default when the stage does not set one.
    #[serde(default)]
    pub default_from: Option<String>,

    /// Transformer chain. Empty means the sendmail `H??` chain.
    #[serde(default)]
    pub file_mails: Vec<StageConfig>,
}

const fn default_concurrency() -> usize {
    1
}

const fn default_poll_interval() -> Duration {
    Duration::from_secs(10)
}

impl Default for ReadFileConfig {
    fn default() -> Self {
        Self {
            in_path: None,
            redis_addr: None,
            concurrency: default_concurrency(),
            poll_interval: default_poll_interval(),
            from_type: None,
            default_from: None,
            file_mails: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Find, read and parse the configuration, then apply the process
    /// environment.
    pub fn load(flag: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match find_config_file(flag)? {
            Some(path) => {
                let content =
                    std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                        path: path.clone(),
                        source,
                    })?;
                Self::from_yaml(&content)?
            }
            None => Self::default(),
        };

        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Override settings from `REM_*` variables, read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| {
            let name = format!("{ENV_PREFIX}{suffix}");
            lookup(&name).map(|value| (name, value))
        };

        if let Some((name, value)) = var("DEBUG") {
            self.debug = parse_bool(&name, &value)?;
        }
        if let Some((_, value)) = var("READ_FILE_IN_PATH") {
            self.read_file.in_path = Some(PathBuf::from(value));
        }
        if let Some((_, value)) = var("READ_FILE_REDIS_ADDR") {
            self.read_file.redis_addr = Some(value);
        }
        if let Some((name, value)) = var("READ_FILE_CONCURRENCY") {
            self.read_file.concurrency = value.trim().parse().map_err(|err| ConfigError::Env {
                var: name,
                value: value.clone(),
                reason: format!("{err}"),
            })?;
        }
        if let Some((name, value)) = var("READ_FILE_POLL_INTERVAL") {
            self.read_file.poll_interval = parse_duration(name, value)?;
        }
        if let Some((_, value)) = var("READ_FILE_FROM_TYPE") {
            self.read_file.from_type = Some(value);
        }
        if let Some((_, value)) = var("READ_FILE_DEFAULT_FROM") {
            self.read_file.default_from = Some(value);
        }
        if let Some((name, value)) = var("DIALER_TIMEOUT") {
            self.dialer.timeout = parse_duration(name, value)?;
        }
        if let Some((_, value)) = var("DIALER_SOCKS5") {
            self.dialer.socks5 = Some(value);
        }

        let user = var("DIALER_AUTH_USER").map(|(_, value)| value);
        let password = var("DIALER_AUTH_PASSWORD").map(|(_, value)| value);
        if user.is_some() || password.is_some() {
            let auth = self.dialer.auth.get_or_insert_with(|| ProxyAuth {
                user: String::new(),
                password: String::new(),
            });
            if let Some(user) = user {
                auth.user = user;
            }
            if let Some(password) = password {
                auth.password = password;
            }
        }

        Ok(())
    }

    /// The transformer chain to build, with the read-file sender settings
    /// applied.
    pub fn transformer_configs(&self) -> Vec<StageConfig> {
        let mut configs = if self.read_file.file_mails.is_empty() {
            transformer::default_configs()
        } else {
            self.read_file.file_mails.clone()
        };

        transformer::apply_from_defaults(
            &mut configs,
            self.read_file.from_type.as_deref(),
            self.read_file.default_from.as_deref(),
        );
        configs
    }

    pub fn processor_configs(&self) -> Vec<StageConfig> {
        if self.mail_processors.is_empty() {
            processor::default_configs()
        } else {
            self.mail_processors.clone()
        }
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Env {
            var: name.to_string(),
            value: value.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}

fn parse_duration(var: String, value: String) -> Result<Duration, ConfigError> {
    humantime_serde::re::humantime::parse_duration(value.trim()).map_err(|err| ConfigError::Env {
        var,
        value,
        reason: err.to_string(),
    })
}

/// Locate the configuration file. `None` means no file was asked for and
/// `$HOME/config.yaml` does not exist.
pub fn find_config_file(flag: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(path) = flag {
        if path.exists() {
            return Ok(Some(path.to_path_buf()));
        }
        return Err(ConfigError::Missing {
            var: "--config",
            path: path.to_path_buf(),
        });
    }

    if let Ok(env_path) = std::env::var("REM_CONFIG") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(Some(path));
        }
        return Err(ConfigError::Missing {
            var: "REM_CONFIG",
            path,
        });
    }

    Ok(std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join("config.yaml"))
        .filter(|path| path.exists()))
}
