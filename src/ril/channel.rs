//! Framed channel to the modem.
//!
//! Wraps a [`Transport`] with the streaming frame decoder. `send` takes a
//! complete length-prefixed frame; `receive` hands back one complete body
//! at a time, buffering the rest.
//!
//! Writes never wait. Whatever the socket does not take right away is kept
//! in a bounded outbound queue, in order, and pushed out by
//! [`Channel::flush_pending`] from the reader task. A frame is either
//! queued whole or rejected whole, so the modem never sees half a frame.
//!
//! A channel is only usable after the modem has announced itself:
//!
//! ```text
//!  bridge                                modem
//!    │  ── socket connect ─────────────────▶ │
//!    │  ◀──── [1][RIL_CONNECTED][version] ── │
//!    │  version >= min? attach : close       │
//! ```

use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

use async_io_mini::Timer;
use log::{debug, info, warn};

use crate::error::{ChannelError, TransportError};

use super::codec::{self, FrameDecoder, HEADER_SIZE, Inbound, MAX_FRAME_SIZE};
use super::messages::EventType;
use super::payload::{self, RilConnected};
use super::tracker::MAX_IN_FLIGHT;
use super::transport::{Transport, UnixSocketTransport};

const READ_BUF_SIZE: usize = 4 * 1024;

/// How often the handshake re-checks for the announcement.
const HANDSHAKE_POLL: Duration = Duration::from_millis(5);

/// Outbound bytes held for a slow modem: one full frame per tracker slot.
pub const MAX_OUTBOUND: usize = MAX_IN_FLIGHT * (HEADER_SIZE + MAX_FRAME_SIZE);

pub struct Channel<T: Transport> {
    transport: T,
    decoder: FrameDecoder,
    ready: VecDeque<Vec<u8>>,
    read_buf: Box<[u8; READ_BUF_SIZE]>,
    /// Frame bytes accepted by `send` but not yet taken by the transport.
    outbound: VecDeque<u8>,
    /// Fatal error seen after some frames were already decoded; reported
    /// once those frames have been handed out.
    deferred: Option<ChannelError>,
    modem_version: Option<u32>,
}

impl Channel<UnixSocketTransport> {
    /// Connect to the modem daemon's socket and run the handshake.
    pub async fn connect(
        path: impl AsRef<Path>,
        min_version: u32,
        handshake_timeout: Duration,
    ) -> Result<Self, ChannelError> {
        let transport = UnixSocketTransport::connect(path)?;
        Self::open(transport, min_version, handshake_timeout).await
    }
}

impl<T: Transport> Channel<T> {
    /// Wrap `transport` without a handshake.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            decoder: FrameDecoder::new(),
            ready: VecDeque::new(),
            read_buf: Box::new([0; READ_BUF_SIZE]),
            outbound: VecDeque::new(),
            deferred: None,
            modem_version: None,
        }
    }

    /// Wrap `transport` and wait for the modem's `RIL_CONNECTED`
    /// announcement, which must be the first frame.
    ///
    /// Frames the modem sends right behind the announcement stay queued.
    pub async fn open(
        transport: T,
        min_version: u32,
        handshake_timeout: Duration,
    ) -> Result<Self, ChannelError> {
        let mut chan = Self::new(transport);

        let outcome = futures_lite::future::or(chan.first_frame(), async {
            Timer::after(handshake_timeout).await;
            Err(ChannelError::HandshakeTimeout)
        })
        .await
        .and_then(|body| announced_version(&body))
        .and_then(|version| {
            if version < min_version {
                Err(ChannelError::VersionMismatch {
                    got: version,
                    min: min_version,
                })
            } else {
                Ok(version)
            }
        });

        match outcome {
            Ok(version) => {
                info!("CHAN: modem connected, protocol version {}", version);
                chan.modem_version = Some(version);
                Ok(chan)
            }
            Err(e) => {
                warn!("CHAN: handshake failed: {}", e);
                chan.close();
                Err(e)
            }
        }
    }

    /// Blocking form of [`Channel::open`].
    pub fn open_blocking(
        transport: T,
        min_version: u32,
        handshake_timeout: Duration,
    ) -> Result<Self, ChannelError> {
        futures_lite::future::block_on(Self::open(transport, min_version, handshake_timeout))
    }

    async fn first_frame(&mut self) -> Result<Vec<u8>, ChannelError> {
        loop {
            if let Some(body) = self.receive()? {
                return Ok(body);
            }
            Timer::after(HANDSHAKE_POLL).await;
        }
    }

    /// Accept one complete frame for sending. Returns how many of its bytes
    /// reached the transport now. While a backlog exists the whole frame is
    /// queued behind it; otherwise only the part the transport refused.
    ///
    /// `Backlogged` leaves the channel usable. Any other error means the
    /// link is gone.
    pub fn send(&mut self, frame: &[u8]) -> Result<usize, ChannelError> {
        if frame.len() > HEADER_SIZE + MAX_FRAME_SIZE {
            return Err(ChannelError::FrameTooLarge(frame.len()));
        }

        let written = if self.outbound.is_empty() {
            self.write_some(frame)?
        } else {
            0
        };

        let tail = &frame[written..];
        if tail.is_empty() {
            return Ok(written);
        }
        // A frame already partly on the wire must be finished, cap or not.
        if written == 0 && self.outbound.len() + tail.len() > MAX_OUTBOUND {
            return Err(ChannelError::Backlogged(self.outbound.len()));
        }
        self.outbound.extend(tail.iter().copied());
        debug!("CHAN: modem slow, {} bytes queued", self.outbound.len());
        Ok(written)
    }

    /// Push queued outbound bytes until the transport stops taking them.
    /// Returns how many were written.
    pub fn flush_pending(&mut self) -> Result<usize, ChannelError> {
        let mut total = 0;
        while !self.outbound.is_empty() {
            let (head, _) = self.outbound.as_slices();
            let n = self.transport.write(head)?;
            if n == 0 {
                break;
            }
            self.outbound.drain(..n);
            total += n;
        }
        if total > 0 {
            self.transport.flush()?;
        }
        Ok(total)
    }

    /// Bytes waiting in the outbound queue.
    pub fn pending_output(&self) -> usize {
        self.outbound.len()
    }

    fn write_some(&mut self, data: &[u8]) -> Result<usize, ChannelError> {
        let mut written = 0;
        while written < data.len() {
            match self.transport.write(&data[written..])? {
                0 => break,
                n => written += n,
            }
        }
        if written > 0 {
            self.transport.flush()?;
        }
        Ok(written)
    }

    /// Next complete frame body, or `None` if nothing is ready yet.
    ///
    /// An error means the channel is dead and must be replaced.
    pub fn receive(&mut self) -> Result<Option<Vec<u8>>, ChannelError> {
        if let Some(body) = self.ready.pop_front() {
            return Ok(Some(body));
        }
        if let Some(e) = self.deferred.take() {
            return Err(e);
        }

        let n = self.transport.read(&mut self.read_buf[..])?;
        if n == 0 {
            return Ok(None);
        }

        let ready = &mut self.ready;
        if let Err(e) = self
            .decoder
            .feed(&self.read_buf[..n], |body| ready.push_back(body.to_vec()))
        {
            warn!("CHAN: lost frame sync: {}", e);
            self.decoder.reset();
            if self.ready.is_empty() {
                return Err(e.into());
            }
            self.deferred = Some(e.into());
        }
        debug!("CHAN: read {} bytes, {} frames ready", n, self.ready.len());

        Ok(self.ready.pop_front())
    }

    /// Close the transport and drop anything buffered.
    pub fn close(&mut self) {
        self.transport.close();
        self.decoder.reset();
        self.ready.clear();
        self.outbound.clear();
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    /// Protocol version the modem announced, if the handshake ran.
    pub fn modem_version(&self) -> Option<u32> {
        self.modem_version
    }
}

fn announced_version(body: &[u8]) -> Result<u32, ChannelError> {
    match codec::decode(body) {
        Ok(Inbound::Unsolicited(ev)) if ev.event_type == EventType::RilConnected => {
            payload::decode::<RilConnected>(&ev.payload)
                .map(|c| c.version)
                .map_err(|_| ChannelError::HandshakeUnexpected)
        }
        _ => Err(ChannelError::HandshakeUnexpected),
    }
}
