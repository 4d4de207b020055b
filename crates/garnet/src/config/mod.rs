use error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub mod error;

const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub network: NetworkConfig,
    pub transport: TransportConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NetworkConfig {
    /// Local UDP address to bind.
    pub bind: String,
    /// Peer to connect to at startup. When absent the endpoint waits for
    /// the first inbound datagram instead.
    pub remote: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TransportConfig {
    pub recv_window: u16,
    pub send_window: u16,
    /// Retransmission timeout, milliseconds.
    pub rt_timeout: u64,
    /// Periodic timer interval, milliseconds.
    pub timer: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:4242".to_string(),
            remote: None,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            recv_window: 1440,
            send_window: 1440,
            rt_timeout: 200,
            timer: 40,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            transport: TransportConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if SocketAddr::from_str(&self.network.bind).is_err() {
            return Err(ConfigError::Validation(format!(
                "Invalid bind address format: '{}'. Expected format like 'IP:PORT'.",
                self.network.bind
            )));
        }

        if let Some(remote) = &self.network.remote {
            if SocketAddr::from_str(remote).is_err() {
                return Err(ConfigError::Validation(format!(
                    "Invalid remote address format: '{}'. Expected format like 'IP:PORT'.",
                    remote
                )));
            }
        }

        if self.transport.recv_window == 0 || self.transport.send_window == 0 {
            return Err(ConfigError::Validation(
                "Window sizes must be greater than 0.".to_string(),
            ));
        }

        if self.transport.timer == 0 {
            return Err(ConfigError::Validation(
                "Timer interval must be greater than 0.".to_string(),
            ));
        }

        if self.transport.rt_timeout < self.transport.timer {
            return Err(ConfigError::Validation(
                "Retransmission timeout must be at least one timer interval.".to_string(),
            ));
        }

        Ok(())
    }

    pub fn session_config(&self) -> garnet_transport::Config {
        garnet_transport::Config {
            recv_window: self.transport.recv_window,
            send_window: self.transport.send_window,
            rt_timeout: Duration::from_millis(self.transport.rt_timeout),
            timer: Duration::from_millis(self.transport.timer),
        }
    }
}

pub fn handle() -> Result<Config, ConfigError> {
    let config_path = PathBuf::from(CONFIG_FILE_NAME);
    if config_path.exists() {
        let config_content = fs::read_to_string(&config_path)?;
        let config: Config = toml::from_str(&config_content)?;
        config.validate()?;
        Ok(config)
    } else {
        let config = Config::default();
        save(&config, &config_path)?;
        Ok(config)
    }
}

fn save(config: &Config, path: &Path) -> Result<(), ConfigError> {
    let config_content = toml::to_string_pretty(config)?;
    let mut file = fs::File::create(path)?;
    file.write_all(config_content.as_bytes())?;
    Ok(())
}
