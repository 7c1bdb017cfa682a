use std::{env, fmt, fs, io, path};

use logger::LogFormat;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    ReadFailed { path: path::PathBuf, source: io::Error },

    #[error("failed to write config {}: {source}", path.display())]
    WriteFailed { path: path::PathBuf, source: io::Error },

    #[error("failed to parse config {}: {source}", path.display())]
    ParseFailed { path: path::PathBuf, source: toml::de::Error },

    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),

    #[error("no config path available: neither XDG_CONFIG_HOME nor HOME is set")]
    ConfigPathUnavailable,

    #[error("invalid config value `{field}`: {reason}")]
    Invalid { field: &'static str, reason: &'static str },
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: Storage,
    pub scheduler: Scheduler,
    pub checks: Checks,
    pub sms: Sms,
    pub logging: Logging,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Storage {
    /// Holds one directory per record collection.
    pub data_dir: path::PathBuf,
    pub logs_dir: path::PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Scheduler {
    pub check_interval_seconds: u64,
    pub log_rotation_interval_seconds: u64,
    pub token_sweep_interval_seconds: u64,
    pub workers: usize,
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Checks {
    pub max_per_user: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Sms {
    pub api_base: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_sid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_phone: Option<String>,
    pub country_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub format: LogFormat,
}

impl Default for Storage {
    fn default() -> Self {
        Self { data_dir: ".data".into(), logs_dir: ".logs".into() }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self {
            check_interval_seconds: 60,
            log_rotation_interval_seconds: 60 * 60 * 24,
            token_sweep_interval_seconds: 60 * 60,
            workers: 16,
            queue_capacity: 256,
        }
    }
}

impl Default for Checks {
    fn default() -> Self {
        Self { max_per_user: 5 }
    }
}

impl Default for Sms {
    fn default() -> Self {
        Self {
            api_base: "https://api.twilio.com".into(),
            account_sid: None,
            auth_token: None,
            from_phone: None,
            country_prefix: "+1".into(),
        }
    }
}

impl Default for Logging {
    fn default() -> Self {
        Self { level: "info".into(), format: LogFormat::Compact }
    }
}

impl Sms {
    pub fn has_credentials(&self) -> bool {
        self.account_sid.is_some() && self.auth_token.is_some() && self.from_phone.is_some()
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// `$XDG_CONFIG_HOME/upwatch/config.toml`, falling back to `$HOME/.config`.
fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("upwatch/config.toml"))
}

fn display_optional(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("<unset>")
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let title = write_title_indented(1);
        let field = write_indented(1);

        writeln!(f, "Effective configuration:")?;

        title(f, "Storage")?;
        field(f, "Data directory", &self.storage.data_dir.display())?;
        field(f, "Logs directory", &self.storage.logs_dir.display())?;

        title(f, "Scheduler")?;
        field(f, "Check interval (s)", &self.scheduler.check_interval_seconds)?;
        field(f, "Log rotation interval (s)", &self.scheduler.log_rotation_interval_seconds)?;
        field(f, "Token sweep interval (s)", &self.scheduler.token_sweep_interval_seconds)?;
        field(f, "Workers", &self.scheduler.workers)?;
        field(f, "Queue capacity", &self.scheduler.queue_capacity)?;

        title(f, "Checks")?;
        field(f, "Max per user", &self.checks.max_per_user)?;

        title(f, "SMS")?;
        field(f, "API base", &self.sms.api_base)?;
        field(f, "Account SID", &display_optional(&self.sms.account_sid))?;
        let token = if self.sms.auth_token.is_some() { "********" } else { "<unset>" };
        field(f, "Auth token", &token)?;
        field(f, "From", &display_optional(&self.sms.from_phone))?;
        field(f, "Country prefix", &self.sms.country_prefix)?;

        title(f, "Logging")?;
        field(f, "Level", &self.logging.level)?;
        field(f, "Format", &self.logging.format)?;

        Ok(())
    }
}

impl Config {
    /// Load the config file, writing one with defaults if none exists.
    ///
    /// With no explicit path this is `~/.config/upwatch/config.toml`.
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        let config = if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| ConfigError::ReadFailed { path: config_path.clone(), source })?;
            toml::from_str(raw_string.as_str())
                .map_err(|source| ConfigError::ParseFailed { path: config_path.clone(), source })?
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            config
        };

        config.validate()?;
        Ok(config)
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), ConfigError> {
        let config_str = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| ConfigError::WriteFailed { path: parent.to_path_buf(), source })?;
        }

        fs::write(path, config_str)
            .map_err(|source| ConfigError::WriteFailed { path: path.to_path_buf(), source })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let scheduler = &self.scheduler;
        let periods = [
            ("scheduler.check_interval_seconds", scheduler.check_interval_seconds),
            ("scheduler.log_rotation_interval_seconds", scheduler.log_rotation_interval_seconds),
            ("scheduler.token_sweep_interval_seconds", scheduler.token_sweep_interval_seconds),
        ];
        for (field, period) in periods {
            if period == 0 {
                return Err(ConfigError::Invalid { field, reason: "must be at least 1 second" });
            }
        }
        if scheduler.workers == 0 {
            return Err(ConfigError::Invalid { field: "scheduler.workers", reason: "must be at least 1" });
        }
        if scheduler.queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "scheduler.queue_capacity",
                reason: "must be at least 1",
            });
        }
        if self.checks.max_per_user == 0 {
            return Err(ConfigError::Invalid { field: "checks.max_per_user", reason: "must be at least 1" });
        }
        Ok(())
    }
}
