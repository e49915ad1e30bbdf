//! Length-prefix frame codec.
//!
//! Wire format:
//! ```text
//! ┌────────────┬──────────────────────────┐
//! │ Length (4B)│ Body (N B)               │
//! │ BE u32     │                          │
//! └────────────┴──────────────────────────┘
//! ```
//!
//! Bodies are sequences of big-endian `u32` header fields followed by an
//! opaque payload:
//!
//! ```text
//! request:     [request_code][token][payload…]
//! solicited:   [0][token][error_code][payload…]
//! unsolicited: [1][event_code][payload…]
//! ```
//!
//! The decoder accumulates incoming bytes and yields complete bodies. A
//! single transport read may return part of the header, part of the body,
//! or several frames concatenated; all of them are handled.

use crate::error::DecodeError;

use super::messages::{EventType, Request, RequestType, Response, Status, UnsolicitedEvent};

/// Maximum frame body size (protects against memory exhaustion).
pub const MAX_FRAME_SIZE: usize = 8 * 1024;

/// Frame header size (4-byte big-endian length).
pub const HEADER_SIZE: usize = 4;

const RESPONSE_SOLICITED: u32 = 0;
const RESPONSE_UNSOLICITED: u32 = 1;

/// Decoder state machine.
enum DecoderState {
    /// Waiting for header bytes.
    ReadingHeader { collected: usize },
    /// Header received, reading body.
    ReadingBody { expected: usize, collected: usize },
}

/// Streaming frame decoder.
pub struct FrameDecoder {
    state: DecoderState,
    header_buf: [u8; HEADER_SIZE],
    body_buf: Box<[u8; MAX_FRAME_SIZE]>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::ReadingHeader { collected: 0 },
            header_buf: [0; HEADER_SIZE],
            body_buf: Box::new([0; MAX_FRAME_SIZE]),
        }
    }

    /// Feed bytes into the decoder, calling `on_frame` once per complete
    /// body, in stream order.
    ///
    /// A zero or oversized length prefix means frame sync is lost; the
    /// error is returned and the remaining bytes are not consumed. Bodies
    /// completed earlier in the same call have already been delivered.
    pub fn feed(
        &mut self,
        data: &[u8],
        mut on_frame: impl FnMut(&[u8]),
    ) -> Result<(), DecodeError> {
        let mut offset = 0;

        while offset < data.len() {
            match &mut self.state {
                DecoderState::ReadingHeader { collected } => {
                    let needed = HEADER_SIZE - *collected;
                    let available = data.len() - offset;
                    let to_copy = needed.min(available);

                    self.header_buf[*collected..*collected + to_copy]
                        .copy_from_slice(&data[offset..offset + to_copy]);

                    *collected += to_copy;
                    offset += to_copy;

                    if *collected == HEADER_SIZE {
                        let raw = u32::from_be_bytes(self.header_buf);
                        let expected = raw as usize;

                        if expected == 0 || expected > MAX_FRAME_SIZE {
                            self.state = DecoderState::ReadingHeader { collected: 0 };
                            return Err(DecodeError::BadLength(raw));
                        }

                        self.state = DecoderState::ReadingBody {
                            expected,
                            collected: 0,
                        };
                    }
                }

                DecoderState::ReadingBody { expected, collected } => {
                    let needed = *expected - *collected;
                    let available = data.len() - offset;
                    let to_copy = needed.min(available);

                    self.body_buf[*collected..*collected + to_copy]
                        .copy_from_slice(&data[offset..offset + to_copy]);

                    *collected += to_copy;
                    offset += to_copy;

                    if *collected == *expected {
                        let len = *expected;
                        self.state = DecoderState::ReadingHeader { collected: 0 };
                        on_frame(&self.body_buf[..len]);
                    }
                }
            }
        }

        Ok(())
    }

    /// Whether a frame is partially buffered.
    pub fn is_mid_frame(&self) -> bool {
        !matches!(self.state, DecoderState::ReadingHeader { collected: 0 })
    }

    /// Reset decoder state (e.g. after a transport reconnect).
    pub fn reset(&mut self) {
        self.state = DecoderState::ReadingHeader { collected: 0 };
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Prefix `body` with its big-endian length.
///
/// Returns `None` if the body is empty or exceeds [`MAX_FRAME_SIZE`].
pub fn encode_frame(body: &[u8]) -> Option<Vec<u8>> {
    if body.is_empty() || body.len() > MAX_FRAME_SIZE {
        return None;
    }

    let mut out = Vec::with_capacity(HEADER_SIZE + body.len());
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(body);
    Some(out)
}

// ── Message encoders ─────────────────────────────────────────

/// Encode an outbound request into a complete frame.
pub fn encode_request(request: &Request) -> Option<Vec<u8>> {
    let mut body = Vec::with_capacity(8 + request.payload.len());
    put_u32(&mut body, request.request_type.code());
    put_u32(&mut body, request.token);
    body.extend_from_slice(&request.payload);
    encode_frame(&body)
}

/// Encode a solicited response into a complete frame (modem side).
///
/// Local-only statuses have no wire code and cannot be encoded.
pub fn encode_response(response: &Response) -> Option<Vec<u8>> {
    let code = response.status.wire_code()?;
    let mut body = Vec::with_capacity(12 + response.payload.len());
    put_u32(&mut body, RESPONSE_SOLICITED);
    put_u32(&mut body, response.token);
    put_u32(&mut body, code);
    body.extend_from_slice(&response.payload);
    encode_frame(&body)
}

/// Encode an unsolicited event into a complete frame (modem side).
pub fn encode_unsolicited(event: &UnsolicitedEvent) -> Option<Vec<u8>> {
    let mut body = Vec::with_capacity(8 + event.payload.len());
    put_u32(&mut body, RESPONSE_UNSOLICITED);
    put_u32(&mut body, event.event_type.code());
    body.extend_from_slice(&event.payload);
    encode_frame(&body)
}

// ── Message decoders ─────────────────────────────────────────

/// A decoded inbound body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Response(Response),
    Unsolicited(UnsolicitedEvent),
}

/// Decode an inbound body (length prefix already stripped).
pub fn decode(body: &[u8]) -> Result<Inbound, DecodeError> {
    let tag = get_u32(body, 0)?;
    match tag {
        RESPONSE_SOLICITED => {
            let token = get_u32(body, 4)?;
            let code = get_u32(body, 8)?;
            Ok(Inbound::Response(Response {
                token,
                status: Status::from_wire(code),
                payload: body[12..].to_vec(),
            }))
        }
        RESPONSE_UNSOLICITED => {
            let code = get_u32(body, 4)?;
            let event_type = EventType::from_code(code).ok_or(DecodeError::UnknownEvent(code))?;
            Ok(Inbound::Unsolicited(UnsolicitedEvent {
                event_type,
                payload: body[8..].to_vec(),
            }))
        }
        other => Err(DecodeError::UnknownTag(other)),
    }
}

/// Decode an outbound request body (modem side).
pub fn decode_request(body: &[u8]) -> Result<Request, DecodeError> {
    let code = get_u32(body, 0)?;
    let token = get_u32(body, 4)?;
    let request_type = RequestType::from_code(code).ok_or(DecodeError::UnknownRequest(code))?;
    Ok(Request {
        request_type,
        token,
        payload: body[8..].to_vec(),
    })
}

fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_be_bytes());
}

fn get_u32(body: &[u8], at: usize) -> Result<u32, DecodeError> {
    body.get(at..at + 4)
        .and_then(|b| <[u8; 4]>::try_from(b).ok())
        .map(u32::from_be_bytes)
        .ok_or(DecodeError::Truncated {
            needed: at + 4,
            got: body.len(),
        })
}
