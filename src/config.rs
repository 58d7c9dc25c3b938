//! TOML configuration.
//!
//! Every section is optional; missing keys fall back to the device
//! defaults (port 5683, 1 h sessions, 50 ledger entries, 10 per page).

use crate::auth::DEFAULT_SESSION_TTL_SECS;
use crate::coap::server::DEFAULT_MAX_DATAGRAM;
use crate::coap::DEFAULT_PORT;
use crate::dispatch::DEFAULT_LOG_PAGE;
use crate::ledger::MAX_LOGS;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub ledger: LedgerConfig,
    pub actuator: ActuatorConfig,
    pub client: ClientConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind, IPv4 or IPv6 literal.
    pub host: String,
    pub port: u16,
    /// Receive buffer size in bytes.
    pub max_datagram: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: DEFAULT_PORT,
            max_datagram: DEFAULT_MAX_DATAGRAM,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_SESSION_TTL_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Maximum number of retained entries.
    pub capacity: usize,
    /// Entries returned by one `logs` read.
    pub page_size: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            capacity: MAX_LOGS,
            page_size: DEFAULT_LOG_PAGE,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActuatorKind {
    #[default]
    Memory,
    /// Raspberry Pi GPIO; needs the `peripheral-rpi` feature.
    RpiGpio,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ActuatorConfig {
    pub kind: ActuatorKind,
    /// BCM pin number for GPIO backends.
    pub pin: u8,
    pub initially_on: bool,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            kind: ActuatorKind::Memory,
            pin: 2,
            initially_on: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { timeout_ms: 3000 }
    }
}

impl Config {
    /// Load from `path`, or from the per-user config file if it exists,
    /// or fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => default_path().filter(|p| p.is_file()),
        };

        let config = match path {
            Some(p) => {
                let config = Self::from_file(&p)?;
                tracing::debug!(path = %p.display(), "Loaded configuration");
                config
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.session.ttl_secs == 0 {
            bail!("session.ttl_secs must be greater than 0");
        }
        if self.ledger.capacity == 0 {
            bail!("ledger.capacity must be greater than 0");
        }
        if self.ledger.page_size == 0 {
            bail!("ledger.page_size must be greater than 0");
        }
        if self.client.timeout_ms == 0 {
            bail!("client.timeout_ms must be greater than 0");
        }
        self.bind_addr()?;
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .server
            .host
            .parse()
            .with_context(|| format!("server.host is not an IP address: {}", self.server.host))?;
        Ok(SocketAddr::new(ip, self.server.port))
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session.ttl_secs)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_millis(self.client.timeout_ms)
    }
}

/// `<config dir>/coap-actuator/config.toml` for the current user.
pub fn default_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "coap-actuator")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}
