//! Runtime settings: optional TOML file, then environment overrides
//!
//! The file lives at `$SNES_CONFIG` or `<config_dir>/snes-link/config.toml`.
//! Every section and field is optional. Environment variables win over the
//! file so existing service units keep working.

use crate::controller::ControllerSettings;
use crate::dispatch::DispatchSettings;
use crate::forwarding::intake::DEFAULT_FIFO_PATH;
use crate::lights::LightsConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const CONFIG_ENV: &str = "SNES_CONFIG";
const CONFIG_DIR: &str = "snes-link";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Config file {0} does not exist")]
    Missing(PathBuf),

    #[error("Invalid value `{value}` for {var}")]
    Env { var: &'static str, value: String },
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Handoff FIFO shared by reader and forwarder
    pub fifo_path: PathBuf,
    pub controller: ControllerSettings,
    pub dispatch: DispatchSettings,
    pub adb: AdbSettings,
    pub lights: LightsConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fifo_path: PathBuf::from(DEFAULT_FIFO_PATH),
            controller: ControllerSettings::default(),
            dispatch: DispatchSettings::default(),
            adb: AdbSettings::default(),
            lights: LightsConfig::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AdbSettings {
    pub host: String,
    pub port: u16,
    /// PEM private key; `<key_path>.pub` is used when present
    pub key_path: PathBuf,
    pub send_timeout_secs: u64,
    pub auth_timeout_secs: u64,
    pub retry_delay_secs: u64,
}

impl Default for AdbSettings {
    fn default() -> Self {
        Self {
            host: "10.0.0.169".to_string(),
            port: 5555,
            key_path: default_key_path(),
            send_timeout_secs: 9,
            auth_timeout_secs: 10,
            retry_delay_secs: 5,
        }
    }
}

impl AdbSettings {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

fn default_key_path() -> PathBuf {
    let mut path = dirs::home_dir().unwrap_or_default();
    path.push(".android");
    path.push("adbkey");
    path
}

fn default_config_path() -> Option<PathBuf> {
    let mut path = dirs::config_dir()?;
    path.push(CONFIG_DIR);
    path.push(CONFIG_FILE);
    Some(path)
}

impl Settings {
    /// Load settings the way both binaries do at startup
    ///
    /// A missing default file means defaults; a missing file named by
    /// `SNES_CONFIG` is an error.
    pub fn load() -> Result<Self, ConfigError> {
        let explicit = std::env::var_os(CONFIG_ENV).map(PathBuf::from);

        let mut settings = match (&explicit, default_config_path()) {
            (Some(path), _) if !path.exists() => return Err(ConfigError::Missing(path.clone())),
            (Some(path), _) => Self::from_file(path)?,
            (None, Some(path)) if path.exists() => Self::from_file(&path)?,
            (None, path) => {
                debug!("No config file at {:?}, using defaults", path);
                Self::default()
            }
        };

        settings.apply_env(|var| std::env::var(var).ok())?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loaded config from {}", path.display());
        Ok(settings)
    }

    /// Override fields from environment variables looked up via `lookup`
    ///
    /// Empty values count as unset.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(host) = get("ADB_TV_IP") {
            self.adb.host = host;
        }
        if let Some(port) = get("ADB_TV_PORT") {
            self.adb.port = parse_port("ADB_TV_PORT", port)?;
        }
        if let Some(path) = get("ADB_KEY_PATH") {
            self.adb.key_path = PathBuf::from(path);
        }
        if let Some(path) = get("SNES_FIFO_PATH") {
            self.fifo_path = PathBuf::from(path);
        }

        let lights = &mut self.lights;
        if let Some(host) = get("MQTT_HOST") {
            lights.host = Some(host);
        }
        if let Some(port) = get("MQTT_PORT") {
            lights.port = Some(parse_port("MQTT_PORT", port)?);
        }
        if let Some(user) = get("MQTT_USER") {
            lights.user = Some(user);
        }
        if let Some(pass) = get("MQTT_PASS") {
            lights.pass = Some(pass);
        }
        if let Some(topic) = get("MQTT_topic_light1") {
            lights.topic_light1 = Some(topic);
        }
        if let Some(topic) = get("MQTT_topic_light2") {
            lights.topic_light2 = Some(topic);
        }
        Ok(())
    }
}

fn parse_port(var: &'static str, value: String) -> Result<u16, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Env { var, value })
}
