//! Modem command/response bridge.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                      RIL Stack                             │
//! │                                                            │
//! │  caller ─▶ ┌────────────┐   ┌──────────┐   ┌───────────┐   │
//! │            │ Dispatcher │──▶│ Channel  │──▶│ Transport │   │
//! │            │  overrides │   │ (codec)  │   │ (trait)   │   │
//! │            │  tracker   │◀──│          │◀──│           │   │
//! │            └────────────┘   └──────────┘   └───────────┘   │
//! │                  │                ▲                        │
//! │                  ▼                │                        │
//! │            ┌────────────┐   ┌──────────┐                   │
//! │            │ EventBus   │   │ io_task  │  (reader thread)  │
//! │            └────────────┘   └──────────┘                   │
//! └────────────────────────────────────────────────────────────┘
//! ```

pub mod channel;
pub mod codec;
pub mod dispatch;
pub mod events;
pub mod io_task;
pub mod messages;
pub mod overrides;
pub mod payload;
pub mod tracker;
pub mod transport;
