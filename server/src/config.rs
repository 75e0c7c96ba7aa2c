//! Server configuration
//!
//! Configuration comes from an optional JSON file, with command-line flags
//! layered on top by the binary. Listen addresses are grouped by address
//! family and written as `"ip, port"`, e.g. `"127.0.0.1, 41810"` or
//! `"::1, 41810"`.

use serde::{Deserialize, Serialize};
use shared::{DEFAULT_MAX_FRAME_LEN, DEFAULT_PORT};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid listen address {0:?}, expected \"ip, port\"")]
    InvalidAddress(String),

    #[error("{addr} is not an {family} address")]
    WrongFamily { addr: String, family: &'static str },

    #[error("no listen addresses configured")]
    NoListenAddresses,
}

/// Root configuration of the server process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    /// World ticks per second
    #[serde(default = "default_tick_rate")]
    pub tick_rate: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub listen4: Vec<String>,
    #[serde(default)]
    pub listen6: Vec<String>,
    /// Connections beyond this are turned away
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
}

/// Update cadence and framing limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_moving_interval_ms")]
    pub moving_interval_ms: u64,
    #[serde(default = "default_stationary_interval_ms")]
    pub stationary_interval_ms: u64,
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,
}

fn default_tick_rate() -> u32 {
    30
}

fn default_max_clients() -> usize {
    64
}

fn default_moving_interval_ms() -> u64 {
    500
}

fn default_stationary_interval_ms() -> u64 {
    5000
}

fn default_max_frame_len() -> usize {
    DEFAULT_MAX_FRAME_LEN
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            sync: SyncConfig::default(),
            tick_rate: default_tick_rate(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen4: vec![format!("127.0.0.1, {}", DEFAULT_PORT)],
            listen6: Vec::new(),
            max_clients: default_max_clients(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            moving_interval_ms: default_moving_interval_ms(),
            stationary_interval_ms: default_stationary_interval_ms(),
            max_frame_len: default_max_frame_len(),
        }
    }
}

impl SyncConfig {
    pub fn moving_interval(&self) -> Duration {
        Duration::from_millis(self.moving_interval_ms)
    }

    pub fn stationary_interval(&self) -> Duration {
        Duration::from_millis(self.stationary_interval_ms)
    }
}

impl ServerConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }

    /// Resolves every configured address, IPv4 entries first
    pub fn listen_addrs(&self) -> Result<Vec<SocketAddr>, ConfigError> {
        let mut addrs = Vec::new();
        for listen in &self.network.listen4 {
            addrs.push(parse_listen(listen, Family::V4)?);
        }
        for listen in &self.network.listen6 {
            addrs.push(parse_listen(listen, Family::V6)?);
        }

        if addrs.is_empty() {
            return Err(ConfigError::NoListenAddresses);
        }
        Ok(addrs)
    }
}

#[derive(Debug, Clone, Copy)]
enum Family {
    V4,
    V6,
}

impl Family {
    fn label(self) -> &'static str {
        match self {
            Family::V4 => "IPv4",
            Family::V6 => "IPv6",
        }
    }

    fn admits(self, ip: &IpAddr) -> bool {
        match self {
            Family::V4 => ip.is_ipv4(),
            Family::V6 => ip.is_ipv6(),
        }
    }
}

fn parse_listen(listen: &str, family: Family) -> Result<SocketAddr, ConfigError> {
    let invalid = || ConfigError::InvalidAddress(listen.to_string());

    let (ip, port) = listen.split_once(',').ok_or_else(invalid)?;
    let ip: IpAddr = ip.trim().parse().map_err(|_| invalid())?;
    let port: u16 = port.trim().parse().map_err(|_| invalid())?;

    if !family.admits(&ip) {
        return Err(ConfigError::WrongFamily {
            addr: ip.to_string(),
            family: family.label(),
        });
    }
    Ok(SocketAddr::new(ip, port))
}
