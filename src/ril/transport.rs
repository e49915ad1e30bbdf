//! Transport abstraction: any byte-oriented channel to the modem process.
//!
//! Concrete implementations:
//! - Unix-domain socket (the modem daemon's listening socket)
//! - In-memory pipe pair (simulation and tests)
//!
//! The channel and dispatcher are generic over `Transport`, so adding a
//! new transport requires zero changes to the dispatch logic.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::Arc;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

use crate::error::TransportError;

/// Byte-oriented, non-blocking transport.
pub trait Transport: Send {
    /// Read up to `buf.len()` bytes into `buf`.
    /// Returns 0 if no data is available right now.
    /// A hang-up is reported as [`TransportError::Closed`].
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Write `data` to the transport.
    /// Returns the number of bytes actually written.
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Flush any buffered output.
    fn flush(&mut self) -> Result<(), TransportError>;

    /// Close the transport. Further reads and writes fail.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

// ── Unix socket ──────────────────────────────────────────────

/// Connection to the modem daemon's Unix-domain socket.
pub struct UnixSocketTransport {
    stream: Option<UnixStream>,
}

impl UnixSocketTransport {
    /// Connect to `path` and switch the socket to non-blocking mode.
    pub fn connect(path: impl AsRef<Path>) -> Result<Self, TransportError> {
        let stream = UnixStream::connect(path)?;
        stream.set_nonblocking(true)?;
        Ok(Self {
            stream: Some(stream),
        })
    }

    /// Wrap an already-connected stream (e.g. one half of a socketpair).
    pub fn from_stream(stream: UnixStream) -> Result<Self, TransportError> {
        stream.set_nonblocking(true)?;
        Ok(Self {
            stream: Some(stream),
        })
    }
}

impl Transport for UnixSocketTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;
        match stream.read(buf) {
            Ok(0) => Err(TransportError::Closed),
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;
        match stream.write(data) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;
        stream.flush().map_err(Into::into)
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

// ── In-memory pipe ───────────────────────────────────────────

#[derive(Default)]
struct Pipe {
    /// Bytes the peer queued for us to read.
    inbound: VecDeque<u8>,
    /// Every byte we wrote, not yet taken by the peer.
    written: Vec<u8>,
    total_written: usize,
    open: bool,
}

type SharedPipe = Arc<Mutex<CriticalSectionRawMutex, RefCell<Pipe>>>;

/// Bridge side of an in-memory pipe.
pub struct MemoryTransport {
    pipe: SharedPipe,
}

/// Modem side of an in-memory pipe: inject inbound bytes, observe writes,
/// hang up.
#[derive(Clone)]
pub struct MemoryPeer {
    pipe: SharedPipe,
}

/// Create a connected in-memory transport and its peer handle.
pub fn memory_pair() -> (MemoryTransport, MemoryPeer) {
    let pipe: SharedPipe = Arc::new(Mutex::new(RefCell::new(Pipe {
        open: true,
        ..Pipe::default()
    })));
    (
        MemoryTransport { pipe: pipe.clone() },
        MemoryPeer { pipe },
    )
}

impl Transport for MemoryTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.pipe.lock(|p| {
            let mut p = p.borrow_mut();
            if p.inbound.is_empty() {
                return if p.open { Ok(0) } else { Err(TransportError::Closed) };
            }
            let n = buf.len().min(p.inbound.len());
            for (slot, byte) in buf.iter_mut().zip(p.inbound.drain(..n)) {
                *slot = byte;
            }
            Ok(n)
        })
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        self.pipe.lock(|p| {
            let mut p = p.borrow_mut();
            if !p.open {
                return Err(TransportError::Closed);
            }
            p.written.extend_from_slice(data);
            p.total_written += data.len();
            Ok(data.len())
        })
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn close(&mut self) {
        self.pipe.lock(|p| p.borrow_mut().open = false);
    }

    fn is_open(&self) -> bool {
        self.pipe.lock(|p| p.borrow().open)
    }
}

impl MemoryPeer {
    /// Queue bytes for the bridge to read.
    pub fn inject(&self, data: &[u8]) {
        self.pipe.lock(|p| p.borrow_mut().inbound.extend(data.iter().copied()));
    }

    /// Take every byte written by the bridge since the last call.
    pub fn take_written(&self) -> Vec<u8> {
        self.pipe.lock(|p| core::mem::take(&mut p.borrow_mut().written))
    }

    /// Total bytes the bridge has written over the pipe's lifetime.
    pub fn total_written(&self) -> usize {
        self.pipe.lock(|p| p.borrow().total_written)
    }

    /// Simulate the modem process going away. Buffered inbound bytes can
    /// still be read; after that reads report `Closed`.
    pub fn hang_up(&self) {
        self.pipe.lock(|p| p.borrow_mut().open = false);
    }

    pub fn is_open(&self) -> bool {
        self.pipe.lock(|p| p.borrow().open)
    }
}
