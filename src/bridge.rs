//! Bridge lifecycle: connect, handshake, attach, read.
//!
//! [`Bridge`] owns the dispatcher and the reader thread. A lost link stays
//! down (every request fails with `TransportLost`) until
//! [`Bridge::reconnect`] is handed a fresh transport.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use log::{info, warn};

use crate::client::TelephonyClient;
use crate::clock::Clock;
use crate::config::BridgeConfig;
use crate::error::{Result, TransportError};
use crate::ril::channel::Channel;
use crate::ril::dispatch::{DispatchStats, Dispatcher};
use crate::ril::events::LogListener;
use crate::ril::io_task::{self, IoTiming};
use crate::ril::messages::EventType;
use crate::ril::transport::{Transport, UnixSocketTransport};

pub struct Bridge<T: Transport> {
    config: BridgeConfig,
    dispatcher: Arc<Dispatcher<T>>,
    reader: Option<JoinHandle<()>>,
}

impl Bridge<UnixSocketTransport> {
    /// Connect to `config.socket_path` and start bridging.
    pub fn connect_unix(config: BridgeConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let transport = UnixSocketTransport::connect(&config.socket_path)?;
        Self::start(config, transport, clock)
    }

    /// Re-dial `config.socket_path` after the link dropped.
    pub fn reconnect_unix(&mut self) -> Result<u32> {
        let transport = UnixSocketTransport::connect(&self.config.socket_path)?;
        self.reconnect(transport)
    }
}

impl<T: Transport + 'static> Bridge<T> {
    /// Validate `config` and build a detached bridge.
    pub fn new(config: BridgeConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let dispatcher = Arc::new(Dispatcher::new(&config, clock));
        if config.log_events {
            let listener = Arc::new(LogListener::new());
            for ty in EventType::ALL {
                dispatcher.subscribe(ty, listener.clone());
            }
        }
        Ok(Self {
            config,
            dispatcher,
            reader: None,
        })
    }

    /// Build a bridge and bring it up over `transport`.
    pub fn start(config: BridgeConfig, transport: T, clock: Arc<dyn Clock>) -> Result<Self> {
        let mut bridge = Self::new(config, clock)?;
        bridge.reconnect(transport)?;
        Ok(bridge)
    }

    /// Replace the link with `transport`: run the handshake, attach, and
    /// start a reader. Returns the modem's protocol version.
    ///
    /// Requests still in flight on the old link fail with `TransportLost`.
    pub fn reconnect(&mut self, transport: T) -> Result<u32> {
        self.stop_reader();

        let channel = Channel::open_blocking(
            transport,
            self.config.min_modem_version,
            Duration::from_millis(self.config.handshake_timeout_ms),
        )?;
        let version = channel.modem_version().unwrap_or(self.config.min_modem_version);
        self.dispatcher.attach(channel);

        let timing =
            IoTiming::from_millis(self.config.poll_interval_ms, self.config.sweep_interval_ms);
        match io_task::spawn(self.dispatcher.clone(), timing) {
            Ok(handle) => self.reader = Some(handle),
            Err(e) => {
                self.dispatcher.transport_lost();
                return Err(TransportError::from(e).into());
            }
        }
        info!("BRIDGE: up, modem version {}", version);
        Ok(version)
    }

    pub fn client(&self) -> TelephonyClient<T> {
        TelephonyClient::new(self.dispatcher.clone())
    }
}

impl<T: Transport> Bridge<T> {
    pub fn dispatcher(&self) -> &Arc<Dispatcher<T>> {
        &self.dispatcher
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    pub fn is_connected(&self) -> bool {
        self.dispatcher.is_attached()
    }

    /// Drop the link, fail anything in flight and wait for the reader.
    pub fn shutdown(&mut self) {
        if self.reader.is_some() || self.dispatcher.is_attached() {
            info!("BRIDGE: shutting down");
        }
        self.stop_reader();
    }

    fn stop_reader(&mut self) {
        self.dispatcher.transport_lost();
        if let Some(handle) = self.reader.take() {
            if handle.join().is_err() {
                warn!("BRIDGE: reader thread panicked");
            }
        }
    }
}

impl<T: Transport> Drop for Bridge<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
