//! Transport and session configuration.
//!
//! Configuration is plain serde data so it can be embedded in any host
//! application's config file. [`SibConfig`] can also be loaded directly from
//! JSON.
//!
//! # Example
//!
//! ```
//! use sib_client::config::{InterfaceKind, SibConfig};
//!
//! let config = SibConfig::from_json_str(r#"{
//!     "physical_address": "b50",
//!     "device_type": "debugging",
//!     "hw_revision": 1,
//!     "sw_revision": 1,
//!     "short_identifier": "ABCDE",
//!     "transport": {
//!         "channel": "can0",
//!         "interface": "socketcand",
//!         "host": "192.168.20.103",
//!         "port": "29536"
//!     }
//! }"#).unwrap();
//!
//! assert_eq!(config.transport.interface, InterfaceKind::NetworkRelay);
//! assert!(config.transport.validate().is_ok());
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::codec::DeviceType;
use crate::error::{Result, SibError};
use crate::protocol::PhysicalAddress;

/// Default interval between periodic self-announcements.
pub const DEFAULT_ANNOUNCE_INTERVAL: Duration = Duration::from_secs(10);

/// Longest accepted announcement interval (one day).
pub const MAX_ANNOUNCE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Which transport implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceKind {
    /// Directly attached interface (SocketCAN).
    #[default]
    #[serde(alias = "socketcan")]
    Direct,
    /// CAN frames relayed over TCP by a socketcand daemon.
    #[serde(alias = "socketcand")]
    NetworkRelay,
}

/// Parameters for acquiring a CAN transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Transport-specific channel, e.g. `can0`.
    pub channel: String,
    /// Bus bitrate. Required for direct interfaces, ignored by relays.
    #[serde(default)]
    pub bitrate: Option<u32>,
    #[serde(default)]
    pub interface: InterfaceKind,
    /// Relay host. Required for network relays.
    #[serde(default)]
    pub host: Option<String>,
    /// Relay port. Required for network relays.
    #[serde(default)]
    pub port: Option<String>,
    /// Echo our own transmitted frames back through the receive path.
    #[serde(default)]
    pub receive_own_messages: bool,
}

impl TransportConfig {
    /// Config for a directly attached interface.
    pub fn direct(channel: impl Into<String>, bitrate: u32) -> Self {
        Self {
            channel: channel.into(),
            bitrate: Some(bitrate),
            interface: InterfaceKind::Direct,
            host: None,
            port: None,
            receive_own_messages: false,
        }
    }

    /// Config for a socketcand relay at `host:port`.
    pub fn network_relay(
        channel: impl Into<String>,
        host: impl Into<String>,
        port: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            bitrate: None,
            interface: InterfaceKind::NetworkRelay,
            host: Some(host.into()),
            port: Some(port.into()),
            receive_own_messages: false,
        }
    }

    /// Enable or disable echo of our own frames.
    pub fn receive_own_messages(mut self, enabled: bool) -> Self {
        self.receive_own_messages = enabled;
        self
    }

    /// Check that every parameter the selected interface needs is present.
    ///
    /// # Errors
    ///
    /// Returns `TransportUnavailable` naming the missing or invalid parameter.
    pub fn validate(&self) -> Result<()> {
        if self.channel.trim().is_empty() {
            return Err(SibError::TransportUnavailable(
                "channel must be specified".to_string(),
            ));
        }
        match self.interface {
            InterfaceKind::Direct => {
                if self.bitrate.is_none() {
                    return Err(SibError::TransportUnavailable(
                        "bitrate must be specified for direct interfaces".to_string(),
                    ));
                }
            }
            InterfaceKind::NetworkRelay => {
                self.relay_endpoint()?;
            }
        }
        Ok(())
    }

    /// Host and parsed port of a network relay.
    pub(crate) fn relay_endpoint(&self) -> Result<(&str, u16)> {
        let (Some(host), Some(port)) = (self.host.as_deref(), self.port.as_deref()) else {
            return Err(SibError::TransportUnavailable(
                "host and port must be specified for network relay interfaces".to_string(),
            ));
        };
        if host.trim().is_empty() {
            return Err(SibError::TransportUnavailable(
                "relay host is empty".to_string(),
            ));
        }
        let port: u16 = port.trim().parse().map_err(|_| {
            SibError::TransportUnavailable(format!("relay port '{}' is not a valid port", port))
        })?;
        Ok((host, port))
    }
}

/// Complete configuration for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SibConfig {
    pub physical_address: PhysicalAddress,
    pub device_type: DeviceType,
    /// Hardware revision; only the low 8 bits are announced.
    pub hw_revision: u32,
    /// Software revision; only the low 8 bits are announced.
    pub sw_revision: u32,
    /// Exactly 5 bytes once UTF-8 encoded.
    pub short_identifier: String,
    #[serde(default = "default_announce_interval_ms")]
    pub announce_interval_ms: u64,
    pub transport: TransportConfig,
}

fn default_announce_interval_ms() -> u64 {
    DEFAULT_ANNOUNCE_INTERVAL.as_millis() as u64
}

impl SibConfig {
    /// Parse from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        if config.announce_interval_ms == 0 {
            return Err(SibError::Config(
                "announce_interval_ms must be greater than zero".to_string(),
            ));
        }
        if config.announce_interval() > MAX_ANNOUNCE_INTERVAL {
            return Err(SibError::Config(format!(
                "announce_interval_ms must not exceed {}",
                MAX_ANNOUNCE_INTERVAL.as_millis()
            )));
        }
        Ok(config)
    }

    /// Load from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    #[inline]
    pub fn announce_interval(&self) -> Duration {
        Duration::from_millis(self.announce_interval_ms)
    }
}
