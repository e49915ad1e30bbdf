//! Unified error types for the RIL bridge.
//!
//! A single `Error` enum that every subsystem converts into, so callers
//! above the dispatch core see one error surface. Most variants are `Copy`
//! and can be passed around without allocation.

use core::fmt;

use crate::ril::messages::Status;

// ---------------------------------------------------------------------------
// Top-level bridge error
// ---------------------------------------------------------------------------

/// Every fallible bridge operation funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The modem channel failed or could not be opened.
    Channel(ChannelError),
    /// A request or response payload did not match its schema.
    Payload(PayloadError),
    /// Configuration is invalid or could not be parsed.
    Config(ConfigError),
    /// A request reached a terminal status other than OK.
    Request(Status),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Channel(e) => write!(f, "channel: {e}"),
            Self::Payload(e) => write!(f, "payload: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Request(s) => write!(f, "request: {s}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire decode errors
// ---------------------------------------------------------------------------

/// A frame could not be decoded.
///
/// Everything except [`DecodeError::BadLength`] is frame-local: the
/// length prefix already told us where the next frame starts, so the bad
/// frame is dropped and the stream stays in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Length prefix was zero or above the maximum frame size.
    BadLength(u32),
    /// Frame body shorter than its fixed header.
    Truncated { needed: usize, got: usize },
    /// Leading response-type tag is neither solicited nor unsolicited.
    UnknownTag(u32),
    /// Unsolicited event code is not one we know.
    UnknownEvent(u32),
    /// Request code is not one we know (modem-side decoding only).
    UnknownRequest(u32),
}

impl DecodeError {
    /// Whether the stream can continue at the next frame boundary.
    pub const fn is_recoverable(self) -> bool {
        !matches!(self, Self::BadLength(_))
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadLength(len) => write!(f, "bad frame length {len}"),
            Self::Truncated { needed, got } => {
                write!(f, "truncated frame ({got} of {needed} header bytes)")
            }
            Self::UnknownTag(tag) => write!(f, "unknown response type {tag}"),
            Self::UnknownEvent(code) => write!(f, "unknown event code {code}"),
            Self::UnknownRequest(code) => write!(f, "unknown request code {code}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// The peer hung up or the transport was closed locally.
    Closed,
    /// Underlying I/O failure.
    Io(std::io::ErrorKind),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "transport closed"),
            Self::Io(kind) => write!(f, "I/O error: {kind}"),
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::UnexpectedEof => Self::Closed,
            kind => Self::Io(kind),
        }
    }
}

// ---------------------------------------------------------------------------
// Channel errors
// ---------------------------------------------------------------------------

/// Failures on a framed modem channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    Transport(TransportError),
    /// The inbound stream lost frame sync.
    Decode(DecodeError),
    /// An outbound frame exceeds the maximum frame size.
    FrameTooLarge(usize),
    /// The modem is not draining its socket; this many bytes are already
    /// queued. The frame was not accepted and the link stays up.
    Backlogged(usize),
    /// The modem did not announce itself before the handshake deadline.
    HandshakeTimeout,
    /// The first frame was not a `RIL_CONNECTED` announcement.
    HandshakeUnexpected,
    /// The modem speaks an older protocol than we accept.
    VersionMismatch { got: u32, min: u32 },
    /// No channel is attached.
    NotAttached,
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "{e}"),
            Self::Decode(e) => write!(f, "{e}"),
            Self::FrameTooLarge(len) => write!(f, "frame of {len} bytes too large"),
            Self::Backlogged(queued) => write!(f, "outbound backlog of {queued} bytes"),
            Self::HandshakeTimeout => write!(f, "handshake timed out"),
            Self::HandshakeUnexpected => write!(f, "unexpected frame during handshake"),
            Self::VersionMismatch { got, min } => {
                write!(f, "modem version {got} below minimum {min}")
            }
            Self::NotAttached => write!(f, "no channel attached"),
        }
    }
}

impl From<TransportError> for ChannelError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<DecodeError> for ChannelError {
    fn from(e: DecodeError) -> Self {
        Self::Decode(e)
    }
}

impl From<ChannelError> for Error {
    fn from(e: ChannelError) -> Self {
        Self::Channel(e)
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Channel(ChannelError::Transport(e))
    }
}

// ---------------------------------------------------------------------------
// Payload errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadError {
    Encode,
    /// Bytes did not decode into the expected schema.
    Decode,
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encode => write!(f, "payload encode failed"),
            Self::Decode => write!(f, "payload does not match schema"),
        }
    }
}

impl From<PayloadError> for Error {
    fn from(e: PayloadError) -> Self {
        Self::Payload(e)
    }
}

// ---------------------------------------------------------------------------
// Typed call errors
// ---------------------------------------------------------------------------

/// Why a typed client call did not produce a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallError {
    /// The request finished with a non-OK status.
    Status(Status),
    /// The response payload did not match its schema.
    Payload(PayloadError),
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(s) => write!(f, "request failed: {s}"),
            Self::Payload(e) => write!(f, "{e}"),
        }
    }
}

impl From<PayloadError> for CallError {
    fn from(e: PayloadError) -> Self {
        Self::Payload(e)
    }
}

impl From<CallError> for Error {
    fn from(e: CallError) -> Self {
        match e {
            CallError::Status(s) => Self::Request(s),
            CallError::Payload(p) => Self::Payload(p),
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// JSON text could not be parsed into a config.
    Parse,
    /// A field failed range validation. Names the field and the rule.
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse => write!(f, "config could not be parsed"),
            Self::Invalid(msg) => write!(f, "validation failed: {msg}"),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Bridge-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
