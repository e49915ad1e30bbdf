//! Message model shared by the codec, tracker and dispatcher.
//!
//! Request and event codes follow the numbering the modem daemon uses on
//! its socket, so frames can be read against a modem-side trace.

use serde::{Deserialize, Serialize};

/// Correlation token assigned by the request tracker.
pub type Token = u32;

/// Token value that is never issued.
pub const NO_TOKEN: Token = 0;

// ── Request types ────────────────────────────────────────────

/// Operations the host telephony stack can ask of the modem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum RequestType {
    GetSimStatus = 1,
    GetCurrentCalls = 9,
    SignalStrength = 19,
    VoiceRegistrationState = 20,
    DataRegistrationState = 21,
    Operator = 22,
    RadioPower = 23,
    QueryAvailableNetworks = 48,
    BasebandVersion = 51,
    SetUiccSubscription = 122,
    SetDataSubscription = 123,
    SetDefaultVoiceSub = 124,
}

impl RequestType {
    pub const fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::GetSimStatus),
            9 => Some(Self::GetCurrentCalls),
            19 => Some(Self::SignalStrength),
            20 => Some(Self::VoiceRegistrationState),
            21 => Some(Self::DataRegistrationState),
            22 => Some(Self::Operator),
            23 => Some(Self::RadioPower),
            48 => Some(Self::QueryAvailableNetworks),
            51 => Some(Self::BasebandVersion),
            122 => Some(Self::SetUiccSubscription),
            123 => Some(Self::SetDataSubscription),
            124 => Some(Self::SetDefaultVoiceSub),
            _ => None,
        }
    }
}

// ── Unsolicited event types ──────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum EventType {
    RadioStateChanged = 1000,
    CallStateChanged = 1001,
    VoiceNetworkStateChanged = 1002,
    SignalStrength = 1009,
    /// Modem announcement sent once when the socket opens.
    RilConnected = 1034,
    SubscriptionStatusChanged = 1038,
}

impl EventType {
    pub const ALL: [Self; 6] = [
        Self::RadioStateChanged,
        Self::CallStateChanged,
        Self::VoiceNetworkStateChanged,
        Self::SignalStrength,
        Self::RilConnected,
        Self::SubscriptionStatusChanged,
    ];

    pub const fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1000 => Some(Self::RadioStateChanged),
            1001 => Some(Self::CallStateChanged),
            1002 => Some(Self::VoiceNetworkStateChanged),
            1009 => Some(Self::SignalStrength),
            1034 => Some(Self::RilConnected),
            1038 => Some(Self::SubscriptionStatusChanged),
            _ => None,
        }
    }
}

// ── Modem error codes ────────────────────────────────────────

/// Error codes carried in solicited responses. `SUCCESS` maps to
/// [`Status::Ok`]; everything else to [`Status::Error`].
pub mod error_code {
    pub const SUCCESS: u32 = 0;
    pub const RADIO_NOT_AVAILABLE: u32 = 1;
    pub const GENERIC_FAILURE: u32 = 2;
    pub const REQUEST_NOT_SUPPORTED: u32 = 6;
    pub const INVALID_ARGUMENTS: u32 = 44;
}

// ── Status ───────────────────────────────────────────────────

/// Outcome reported to the caller with every completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    /// The modem (or a synthesizing override) answered with an error code.
    Error(u32),
    /// The channel dropped while the request was in flight.
    TransportLost,
    /// No response before the request's deadline.
    Timeout,
    /// Cancelled by the caller.
    Cancelled,
    /// The in-flight table was full.
    Overloaded,
}

impl Status {
    /// Map a wire error code to a status.
    pub const fn from_wire(code: u32) -> Self {
        if code == error_code::SUCCESS {
            Self::Ok
        } else {
            Self::Error(code)
        }
    }

    /// Wire error code for modem-level statuses. Local failures have none.
    pub const fn wire_code(self) -> Option<u32> {
        match self {
            Self::Ok => Some(error_code::SUCCESS),
            Self::Error(code) => Some(code),
            _ => None,
        }
    }

    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl core::fmt::Display for Status {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Error(code) => write!(f, "error {code}"),
            Self::TransportLost => write!(f, "transport lost"),
            Self::Timeout => write!(f, "timeout"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Overloaded => write!(f, "overloaded"),
        }
    }
}

// ── Request / response / event values ────────────────────────

/// Outbound request as it goes on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub request_type: RequestType,
    pub token: Token,
    pub payload: Vec<u8>,
}

/// Solicited response, decoded from the wire or synthesized locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub token: Token,
    pub status: Status,
    pub payload: Vec<u8>,
}

/// Modem-originated notification with no token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsolicitedEvent {
    pub event_type: EventType,
    pub payload: Vec<u8>,
}

impl UnsolicitedEvent {
    pub fn new(event_type: EventType, payload: Vec<u8>) -> Self {
        Self {
            event_type,
            payload,
        }
    }
}

// ── Request lifecycle ────────────────────────────────────────

/// Dispatch state of a single request.
///
/// ```text
/// PendingOverride ─▶ PendingTransport ─▶ AwaitingResponse ─▶ Completed
///        │                                      ├──────────▶ TimedOut
///        └──────────▶ Completed                 └──────────▶ Failed
/// ```
///
/// Any non-terminal state may also move to `Cancelled`, or to `Failed`
/// when the link drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    PendingOverride,
    PendingTransport,
    AwaitingResponse,
    Completed,
    TimedOut,
    Failed,
    Cancelled,
}

impl RequestState {
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::TimedOut | Self::Failed | Self::Cancelled
        )
    }

    /// Terminal state implied by a completion status.
    pub const fn for_status(status: Status) -> Self {
        match status {
            Status::Ok | Status::Error(_) => Self::Completed,
            Status::Timeout => Self::TimedOut,
            Status::Cancelled => Self::Cancelled,
            Status::TransportLost | Status::Overloaded => Self::Failed,
        }
    }
}

/// Terminal result delivered to the submitting caller exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub token: Token,
    pub request_type: RequestType,
    pub state: RequestState,
    pub status: Status,
    pub payload: Vec<u8>,
}

impl Completion {
    pub fn new(token: Token, request_type: RequestType, status: Status, payload: Vec<u8>) -> Self {
        Self {
            token,
            request_type,
            state: RequestState::for_status(status),
            status,
            payload,
        }
    }
}
