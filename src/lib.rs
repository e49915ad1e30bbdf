//! rilbridge: command/response bridge between a host telephony stack and a
//! modem control process.
//!
//! The host submits typed requests; the bridge assigns correlation tokens,
//! lets device overrides answer what the modem gets wrong, frames the rest
//! onto a socket, matches responses back to their callers and fans
//! unsolicited modem events out to subscribers.
//!
//! The library never installs a logger; it logs through the `log` facade.

#![deny(unused_must_use)]

pub mod bridge;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod ril;

pub use bridge::Bridge;
pub use client::TelephonyClient;
pub use config::BridgeConfig;
pub use error::{Error, Result};
