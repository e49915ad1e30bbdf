//! Bridge configuration parameters
//!
//! All tunable parameters for the RIL bridge. Loaded once at start-up,
//! either from defaults or from a JSON document; the device variant chosen
//! here selects which override chain gets installed.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::ril::messages::RequestType;
use crate::ril::overrides::DeviceVariant;
use crate::ril::tracker::MAX_IN_FLIGHT;

/// Core bridge configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    // --- Modem link ---
    /// Path of the modem daemon's Unix-domain socket
    pub socket_path: String,
    /// Oldest modem protocol version accepted at handshake
    pub min_modem_version: u32,
    /// How long to wait for the modem's announcement (milliseconds)
    pub handshake_timeout_ms: u64,

    // --- Device ---
    /// Which override chain to install
    pub device: DeviceVariant,
    /// Request types answered locally with REQUEST_NOT_SUPPORTED
    pub unsupported_requests: Vec<RequestType>,

    // --- Requests ---
    /// Default per-request deadline (milliseconds); `None` waits forever
    pub request_timeout_ms: Option<u64>,
    /// Largest token issued before wrapping back to 1
    pub token_wrap: u32,

    // --- Reader task timing ---
    /// Inbound poll interval when the socket is idle (milliseconds)
    pub poll_interval_ms: u64,
    /// Deadline sweep interval (milliseconds)
    pub sweep_interval_ms: u64,

    // --- Logging ---
    /// Log every unsolicited event at info level
    pub log_events: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            // Modem link
            socket_path: "/dev/socket/rild".into(),
            min_modem_version: 6,
            handshake_timeout_ms: 5_000,

            // Device
            device: DeviceVariant::Generic,
            unsupported_requests: Vec::new(),

            // Requests
            request_timeout_ms: Some(30_000),
            token_wrap: i32::MAX as u32, // serials are int32 on the modem side

            // Reader task timing
            poll_interval_ms: 2,
            sweep_interval_ms: 250,

            // Logging
            log_events: true,
        }
    }
}

impl BridgeConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text).map_err(|_| ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Range-check every field. Invalid values are rejected, not clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.socket_path.is_empty() {
            return Err(ConfigError::Invalid("socket_path must not be empty"));
        }
        if self.min_modem_version == 0 {
            return Err(ConfigError::Invalid("min_modem_version must be at least 1"));
        }
        if self.handshake_timeout_ms == 0 {
            return Err(ConfigError::Invalid("handshake_timeout_ms must be positive"));
        }
        if self.request_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid("request_timeout_ms must be positive"));
        }
        if (self.token_wrap as usize) < 2 * MAX_IN_FLIGHT {
            return Err(ConfigError::Invalid(
                "token_wrap must leave room for twice the in-flight table",
            ));
        }
        if self.poll_interval_ms == 0 || self.poll_interval_ms > 1_000 {
            return Err(ConfigError::Invalid("poll_interval_ms must be 1..=1000"));
        }
        if self.sweep_interval_ms == 0 {
            return Err(ConfigError::Invalid("sweep_interval_ms must be positive"));
        }
        if let Some(timeout) = self.request_timeout_ms {
            if self.sweep_interval_ms > timeout {
                return Err(ConfigError::Invalid(
                    "sweep_interval_ms must not exceed request_timeout_ms",
                ));
            }
        }
        Ok(())
    }
}
