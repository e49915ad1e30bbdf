//! Vendor override layer.
//!
//! Some modems get a request wrong, or cannot do it at all, and the host
//! stack still expects an answer. An override intercepts such a request
//! before any transport I/O and answers it locally, optionally followed by
//! the unsolicited events a well-behaved modem would have sent.
//!
//! Overrides are stacked in an [`OverrideChain`]: device-specific entries
//! first, the generic fallback last. The first entry that does not pass
//! through wins.

use log::info;
use serde::{Deserialize, Serialize};

use crate::config::BridgeConfig;

use super::messages::{EventType, RequestType, Status, UnsolicitedEvent, error_code};
use super::payload::{self, SubscriptionStatus, UiccSubscription};

/// Hardware family the bridge is talking to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceVariant {
    /// Stock modem behavior, no device overrides.
    #[default]
    Generic,
    /// Dual-SIM handset whose modem never answers the subscription requests
    /// and sends an extra string per network in scan results.
    Zenfone2,
}

impl DeviceVariant {
    /// Strings per network in this modem's `QUERY_AVAILABLE_NETWORKS`
    /// answer.
    pub const fn network_record_len(self) -> usize {
        match self {
            Self::Generic => payload::NETWORK_RECORD_MIN,
            Self::Zenfone2 => payload::NETWORK_RECORD_MIN + 1,
        }
    }
}

/// Locally-produced answer to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticResponse {
    pub status: Status,
    pub payload: Vec<u8>,
    /// Published after the completion, in order.
    pub events: Vec<UnsolicitedEvent>,
}

impl SyntheticResponse {
    pub fn ok() -> Self {
        Self {
            status: Status::Ok,
            payload: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn error(code: u32) -> Self {
        Self {
            status: Status::Error(code),
            payload: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn with_event(mut self, event: UnsolicitedEvent) -> Self {
        self.events.push(event);
        self
    }
}

/// Outcome of consulting an override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interception {
    /// Send the request to the modem as usual.
    Passthrough,
    /// Answer locally; nothing is written to the transport.
    Synthetic(SyntheticResponse),
}

/// A capability that may answer a request in place of the modem.
pub trait RequestOverride: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    fn intercept(&self, request_type: RequestType, payload: &[u8]) -> Interception;
}

/// Ordered list of overrides.
#[derive(Default)]
pub struct OverrideChain {
    entries: Vec<Box<dyn RequestOverride>>,
}

impl OverrideChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain for `variant`, with the configured unsupported requests as
    /// the fallback.
    pub fn for_device(variant: DeviceVariant, config: &BridgeConfig) -> Self {
        let mut chain = Self::new();
        match variant {
            DeviceVariant::Generic => {}
            DeviceVariant::Zenfone2 => chain.push(Zenfone2Override),
        }
        if !config.unsupported_requests.is_empty() {
            chain.push(UnsupportedRequests::new(config.unsupported_requests.clone()));
        }
        info!(
            "RIL: override chain for {:?}: [{}]",
            variant,
            chain.names().join(", ")
        );
        chain
    }

    /// Append an override at the lowest priority.
    pub fn push(&mut self, entry: impl RequestOverride + 'static) {
        self.entries.push(Box::new(entry));
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First non-passthrough answer, plus the name of the override that gave it.
    pub fn intercept(
        &self,
        request_type: RequestType,
        payload: &[u8],
    ) -> Option<(&'static str, SyntheticResponse)> {
        self.entries
            .iter()
            .find_map(|entry| match entry.intercept(request_type, payload) {
                Interception::Passthrough => None,
                Interception::Synthetic(resp) => Some((entry.name(), resp)),
            })
    }
}

// ── Zenfone 2 ────────────────────────────────────────────────

/// Answers the dual-SIM subscription requests locally.
pub struct Zenfone2Override;

impl Zenfone2Override {
    fn uicc_subscription(payload: &[u8]) -> SyntheticResponse {
        let Ok(sub) = payload::decode::<UiccSubscription>(payload) else {
            return SyntheticResponse::error(error_code::INVALID_ARGUMENTS);
        };

        let status = match sub.sub_status {
            1 => Some(SubscriptionStatus::ENABLED),
            0 => Some(SubscriptionStatus::DISABLED),
            _ => None,
        };

        let resp = SyntheticResponse::ok();
        match status.and_then(|s| payload::encode(&s).ok()) {
            Some(bytes) => resp.with_event(UnsolicitedEvent::new(
                EventType::SubscriptionStatusChanged,
                bytes,
            )),
            None => resp,
        }
    }
}

impl RequestOverride for Zenfone2Override {
    fn name(&self) -> &'static str {
        "zenfone2"
    }

    fn intercept(&self, request_type: RequestType, payload: &[u8]) -> Interception {
        match request_type {
            RequestType::SetUiccSubscription => {
                Interception::Synthetic(Self::uicc_subscription(payload))
            }
            RequestType::SetDataSubscription | RequestType::SetDefaultVoiceSub => {
                Interception::Synthetic(SyntheticResponse::ok())
            }
            _ => Interception::Passthrough,
        }
    }
}

// ── Generic fallback ─────────────────────────────────────────

/// Answers a fixed set of request types with `REQUEST_NOT_SUPPORTED`.
pub struct UnsupportedRequests {
    types: Vec<RequestType>,
}

impl UnsupportedRequests {
    pub fn new(types: Vec<RequestType>) -> Self {
        Self { types }
    }
}

impl RequestOverride for UnsupportedRequests {
    fn name(&self) -> &'static str {
        "unsupported"
    }

    fn intercept(&self, request_type: RequestType, _payload: &[u8]) -> Interception {
        if self.types.contains(&request_type) {
            Interception::Synthetic(SyntheticResponse::error(
                error_code::REQUEST_NOT_SUPPORTED,
            ))
        } else {
            Interception::Passthrough
        }
    }
}
