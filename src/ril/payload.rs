//! Payload schemas for the typed request/response/event surface.
//!
//! The dispatch core treats payloads as opaque bytes. These structs give
//! them a documented shape, serialized with `postcard` so small values stay
//! small on the wire: a [`SubscriptionStatus`] is a single byte.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::PayloadError;

/// Serialize a payload struct.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, PayloadError> {
    postcard::to_allocvec(value).map_err(|_| PayloadError::Encode)
}

/// Deserialize a payload struct. Trailing bytes are rejected.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, PayloadError> {
    match postcard::take_from_bytes::<T>(bytes) {
        Ok((value, rest)) if rest.is_empty() => Ok(value),
        _ => Err(PayloadError::Decode),
    }
}

/// `SET_UICC_SUBSCRIPTION` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiccSubscription {
    pub slot_id: u32,
    pub app_index: u32,
    pub sub_id: u32,
    /// 1 = activate, 0 = deactivate.
    pub sub_status: u32,
}

/// `SUBSCRIPTION_STATUS_CHANGED` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionStatus {
    pub enabled: u8,
}

impl SubscriptionStatus {
    pub const ENABLED: Self = Self { enabled: 1 };
    pub const DISABLED: Self = Self { enabled: 0 };

    pub fn is_enabled(self) -> bool {
        self.enabled == 1
    }
}

/// `SET_DEFAULT_VOICE_SUB` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultVoiceSub {
    pub sub_index: u32,
}

/// `RADIO_POWER` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadioPower {
    pub on: bool,
}

/// `SIGNAL_STRENGTH` response and event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalStrength {
    /// GSM signal strength, 0..=31, 99 = unknown.
    pub gsm_signal_strength: i32,
    pub gsm_bit_error_rate: i32,
    pub lte_signal_strength: i32,
    /// Reference signal received power in dBm (negated), `i32::MAX` = unknown.
    pub lte_rsrp: i32,
    pub lte_rsrq: i32,
    pub lte_rssnr: i32,
}

/// `BASEBAND_VERSION` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasebandVersion {
    pub version: String,
}

/// `QUERY_AVAILABLE_NETWORKS` response as the modem sends it: one flat
/// list of strings, a fixed number per network. How many depends on the
/// modem; see [`decode_available_networks`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NetworkScan {
    pub fields: Vec<String>,
}

/// Registration availability of a scanned network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorState {
    Unknown,
    Available,
    Current,
    Forbidden,
}

impl OperatorState {
    fn parse(s: &str) -> Self {
        match s {
            "available" => Self::Available,
            "current" => Self::Current,
            "forbidden" => Self::Forbidden,
            _ => Self::Unknown,
        }
    }
}

/// One network from a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailableNetwork {
    pub long_name: String,
    pub short_name: String,
    /// MCC+MNC.
    pub numeric: String,
    pub state: OperatorState,
}

/// Fields every scan record starts with.
pub const NETWORK_RECORD_MIN: usize = 4;

/// Split a scan into networks of `per_network` strings each. Only the
/// leading four fields are interpreted; vendor extras are skipped.
pub fn decode_available_networks(
    bytes: &[u8],
    per_network: usize,
) -> Result<Vec<AvailableNetwork>, PayloadError> {
    let scan: NetworkScan = decode(bytes)?;
    if per_network < NETWORK_RECORD_MIN || scan.fields.len() % per_network != 0 {
        return Err(PayloadError::Decode);
    }
    Ok(scan
        .fields
        .chunks_exact(per_network)
        .map(|r| AvailableNetwork {
            long_name: r[0].clone(),
            short_name: r[1].clone(),
            numeric: r[2].clone(),
            state: OperatorState::parse(&r[3]),
        })
        .collect())
}

/// `RIL_CONNECTED` announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RilConnected {
    pub version: u32,
}
