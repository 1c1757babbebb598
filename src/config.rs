// src/config.rs
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use xdg::BaseDirectories;

use crate::errors::ConfigError;

pub const APP_NAME: &str = "proxmox-mcp";
pub const DEFAULT_CONFIG_FILENAME: &str = "config.toml";

pub const ENV_HOST: &str = "PROXMOX_HOST";
pub const ENV_PORT: &str = "PROXMOX_PORT";
pub const ENV_USER: &str = "PROXMOX_USER";
pub const ENV_TOKEN_NAME: &str = "PROXMOX_TOKEN_NAME";
pub const ENV_TOKEN_VALUE: &str = "PROXMOX_TOKEN_VALUE";
pub const ENV_ALLOW_ELEVATED: &str = "PROXMOX_ALLOW_ELEVATED";
pub const ENV_VERIFY_TLS: &str = "PROXMOX_VERIFY_TLS";

// Main configuration structure, mapping to config.toml
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub proxmox: ProxmoxConfig,
    #[serde(default)]
    pub permissions: PermissionsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub fanout: FanOutConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    // Where the file was read from, if any; not part of config.toml itself
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

#[derive(Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ProxmoxConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default)]
    pub token_name: String,
    #[serde(default)]
    pub token_value: String,
    #[serde(default)]
    pub verify_tls: bool,
    #[serde(default = "default_request_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_port() -> u16 {
    8006
}
fn default_user() -> String {
    "root@pam".to_string()
}
fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for ProxmoxConfig {
    fn default() -> Self {
        ProxmoxConfig {
            host: String::new(),
            port: default_port(),
            user: default_user(),
            token_name: String::new(),
            token_value: String::new(),
            verify_tls: false,
            timeout_ms: default_request_timeout_ms(),
        }
    }
}

// Hand-written so the token secret never ends up in logs.
impl fmt::Debug for ProxmoxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secret = if self.token_value.is_empty() { "<unset>" } else { "<redacted>" };
        f.debug_struct("ProxmoxConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("token_name", &self.token_name)
            .field("token_value", &secret)
            .field("verify_tls", &self.verify_tls)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl ProxmoxConfig {
    pub fn base_url(&self) -> String {
        format!("https://{}:{}/api2/json", self.host, self.port)
    }

    pub fn auth_header(&self) -> String {
        format!("PVEAPIToken={}!{}={}", self.user, self.token_name, self.token_value)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct PermissionsConfig {
    #[serde(default)]
    pub allow_elevated: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Stdio,
    Http,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default)]
    pub transport: Transport,
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            transport: Transport::default(),
            bind: default_bind(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct FanOutConfig {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_target_timeout_ms")]
    pub target_timeout_ms: u64,
}

fn default_max_concurrency() -> usize {
    4
}
fn default_target_timeout_ms() -> u64 {
    10_000
}

impl Default for FanOutConfig {
    fn default() -> Self {
        FanOutConfig {
            max_concurrency: default_max_concurrency(),
            target_timeout_ms: default_target_timeout_ms(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl Config {
    /// Reads config.toml (explicit path or XDG lookup) and layers the
    /// `PROXMOX_*` environment on top. A missing XDG file means defaults; a
    /// missing explicit file is an error.
    ///
    /// Runs before the tracing subscriber exists, so it does not log.
    pub fn load(config_path_override: Option<&Path>) -> Result<Self> {
        let config_path = match config_path_override {
            Some(path) => Some(path.to_path_buf()),
            None => BaseDirectories::with_prefix(APP_NAME)
                .map_err(ConfigError::from)?
                .find_config_file(DEFAULT_CONFIG_FILENAME),
        };

        let mut config = match &config_path {
            Some(path) => {
                let config_str = std::fs::read_to_string(path)
                    .map_err(ConfigError::from)
                    .with_context(|| format!("Failed to read config file at {}", path.display()))?;
                let mut config = Config::from_toml_str(&config_str)
                    .with_context(|| format!("Failed to parse TOML configuration at {}", path.display()))?;
                config.source_path = Some(path.clone());
                config
            }
            None => Config::default(),
        };

        config
            .apply_env_overrides(|key| std::env::var(key).ok())
            .context("Invalid PROXMOX_* environment variable")?;
        Ok(config)
    }

    pub fn from_toml_str(config_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(config_str)?)
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_HOST) {
            self.proxmox.host = host;
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.proxmox.port = port.trim().parse().map_err(|_| ConfigError::InvalidValue {
                field: "proxmox.port",
                message: format!("{} is not a valid port: '{}'", ENV_PORT, port),
            })?;
        }
        if let Some(user) = lookup(ENV_USER) {
            self.proxmox.user = user;
        }
        if let Some(token_name) = lookup(ENV_TOKEN_NAME) {
            self.proxmox.token_name = token_name;
        }
        if let Some(token_value) = lookup(ENV_TOKEN_VALUE) {
            self.proxmox.token_value = token_value;
        }
        if let Some(raw) = lookup(ENV_ALLOW_ELEVATED) {
            self.permissions.allow_elevated = parse_bool("permissions.allow_elevated", ENV_ALLOW_ELEVATED, &raw)?;
        }
        if let Some(raw) = lookup(ENV_VERIFY_TLS) {
            self.proxmox.verify_tls = parse_bool("proxmox.verify_tls", ENV_VERIFY_TLS, &raw)?;
        }
        Ok(())
    }

    /// Startup validation. Every error here is fatal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("proxmox.host", ENV_HOST, &self.proxmox.host),
            ("proxmox.user", ENV_USER, &self.proxmox.user),
            ("proxmox.token_name", ENV_TOKEN_NAME, &self.proxmox.token_name),
            ("proxmox.token_value", ENV_TOKEN_VALUE, &self.proxmox.token_value),
        ];
        for (field, env_var, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingSetting { field, env_var });
            }
        }
        if self.proxmox.host.contains("://") || self.proxmox.host.contains('/') {
            return Err(ConfigError::InvalidValue {
                field: "proxmox.host",
                message: format!("expected a bare host name, got '{}'", self.proxmox.host),
            });
        }
        if self.proxmox.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "proxmox.port",
                message: "port must be non-zero".to_string(),
            });
        }
        if self.proxmox.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "proxmox.timeout_ms",
                message: "timeout must be non-zero".to_string(),
            });
        }
        if self.fanout.max_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "fanout.max_concurrency",
                message: "at least one concurrent request is required".to_string(),
            });
        }
        if self.fanout.target_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "fanout.target_timeout_ms",
                message: "timeout must be non-zero".to_string(),
            });
        }
        if self.server.transport == Transport::Http && self.server.bind.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::InvalidValue {
                field: "server.bind",
                message: format!("'{}' is not a socket address", self.server.bind),
            });
        }
        Ok(())
    }
}

fn parse_bool(field: &'static str, env_var: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            field,
            message: format!("{} must be a boolean, got '{}'", env_var, other),
        }),
    }
}
