//! Dispatch core.
//!
//! Routes every request through the override chain, the tracker and the
//! channel, and routes every inbound frame back to the waiting caller or to
//! the event bus.
//!
//! ```text
//!  submit ─▶ OverrideChain ──synthetic──▶ tracker.complete ─▶ callback
//!                 │                                         └▶ EventBus
//!                 └─passthrough─▶ tracker.register ─▶ Channel::send
//!
//!  reader ─▶ poll_inbound ─▶ decode ─┬─ response ─▶ tracker.complete ─▶ callback
//!                                    └─ event ────▶ EventBus
//! ```
//!
//! The tracker, the link and the counters each sit behind their own
//! blocking mutex. Callbacks and listeners only ever run after the lock
//! that produced them has been released, so a callback may submit again.

use core::cell::RefCell;
use std::sync::Arc;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use log::{debug, info, warn};
use serde::Serialize;

use crate::clock::Clock;
use crate::config::BridgeConfig;
use crate::error::ChannelError;

use super::channel::Channel;
use super::codec::{self, Inbound};
use super::events::{EventBus, EventListener, SubscriptionId};
use super::messages::{
    Completion, EventType, NO_TOKEN, Request, RequestState, RequestType, Response, Status, Token,
    UnsolicitedEvent, error_code,
};
use super::overrides::{DeviceVariant, OverrideChain};
use super::tracker::{PendingRequest, RequestTracker};
use super::transport::Transport;

type CsMutex<T> = Mutex<CriticalSectionRawMutex, RefCell<T>>;

/// Running totals since the dispatcher was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub submitted: u64,
    /// Requests answered with a status, by the modem or an override.
    pub completed: u64,
    /// Subset of `completed` answered by an override.
    pub synthesized: u64,
    pub timed_out: u64,
    /// Transport loss, overload (table full or modem backlogged) and
    /// unencodable requests.
    pub failed: u64,
    pub cancelled: u64,
    /// Responses whose token was not (or no longer) tracked.
    pub stale_responses: u64,
    pub decode_errors: u64,
    pub events_published: u64,
    pub bytes_written: u64,
}

enum Link<T: Transport> {
    Up(Channel<T>),
    Down,
}

pub struct Dispatcher<T: Transport> {
    tracker: CsMutex<RequestTracker>,
    link: CsMutex<Link<T>>,
    stats: CsMutex<DispatchStats>,
    events: EventBus,
    overrides: OverrideChain,
    clock: Arc<dyn Clock>,
    default_timeout_ms: Option<u64>,
    device: DeviceVariant,
}

impl<T: Transport> Dispatcher<T> {
    /// Dispatcher with the override chain `config` selects. Starts detached.
    pub fn new(config: &BridgeConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_overrides(config, clock, OverrideChain::for_device(config.device, config))
    }

    /// Dispatcher with an explicit override chain.
    pub fn with_overrides(
        config: &BridgeConfig,
        clock: Arc<dyn Clock>,
        overrides: OverrideChain,
    ) -> Self {
        Self {
            tracker: Mutex::new(RefCell::new(RequestTracker::new(config.token_wrap))),
            link: Mutex::new(RefCell::new(Link::Down)),
            stats: Mutex::new(RefCell::new(DispatchStats::default())),
            events: EventBus::new(),
            overrides,
            clock,
            default_timeout_ms: config.request_timeout_ms,
            device: config.device,
        }
    }

    // ── Link ─────────────────────────────────────────────────

    /// Start using `channel`. A channel already attached is closed first
    /// and its in-flight requests fail with `TransportLost`.
    pub fn attach(&self, channel: Channel<T>) {
        let version = channel.modem_version();
        if self.is_attached() {
            self.transport_lost();
        }
        self.link.lock(|l| *l.borrow_mut() = Link::Up(channel));
        info!("RIL: link attached (modem version {:?})", version);
    }

    pub fn is_attached(&self) -> bool {
        self.link.lock(|l| matches!(*l.borrow(), Link::Up(_)))
    }

    /// Drop the link and fail everything in flight with `TransportLost`.
    /// Returns how many requests were failed.
    ///
    /// New submissions fail the same way until [`Dispatcher::attach`].
    pub fn transport_lost(&self) -> usize {
        let was_up = self.link.lock(|l| {
            match core::mem::replace(&mut *l.borrow_mut(), Link::Down) {
                Link::Up(mut chan) => {
                    chan.close();
                    true
                }
                Link::Down => false,
            }
        });

        let drained = self.tracker.lock(|t| t.borrow_mut().drain());
        let count = drained.len();
        if was_up || count > 0 {
            warn!("RIL: link lost, failing {} in-flight requests", count);
        }
        for (token, pending) in drained {
            self.record_terminal(Status::TransportLost);
            pending.finish(token, Status::TransportLost, Vec::new());
        }
        count
    }

    // ── Submission ───────────────────────────────────────────

    /// Submit with the configured default deadline.
    pub fn submit(
        &self,
        request_type: RequestType,
        payload: Vec<u8>,
        on_complete: impl FnOnce(Completion) + Send + 'static,
    ) -> Token {
        self.submit_with_timeout(request_type, payload, self.default_timeout_ms, on_complete)
    }

    /// Submit a request. `on_complete` fires exactly once with the
    /// terminal result, possibly before this returns.
    ///
    /// Returns the request's token, or [`NO_TOKEN`] if the request needed
    /// the modem and the in-flight table was full (the callback has then
    /// already fired with `Overloaded`).
    pub fn submit_with_timeout(
        &self,
        request_type: RequestType,
        payload: Vec<u8>,
        timeout_ms: Option<u64>,
        on_complete: impl FnOnce(Completion) + Send + 'static,
    ) -> Token {
        let now = self.clock.now_ms();
        let deadline = timeout_ms.map(|t| now.saturating_add(t));
        let pending = PendingRequest::new(request_type, now, deadline, on_complete);
        self.bump(|s| s.submitted += 1);

        let synthetic = self.overrides.intercept(request_type, &payload);

        // Local answers never need a slot, so a full table only turns away
        // requests bound for the modem.
        let registered = self.tracker.lock(|t| {
            let mut t = t.borrow_mut();
            match t.register(pending) {
                Ok(token) => Ok((token, None)),
                Err(pending) if synthetic.is_some() => Ok((t.issue_untracked(), Some(pending))),
                Err(pending) => Err(pending),
            }
        });
        let (token, untracked) = match registered {
            Ok(issued) => issued,
            Err(pending) => {
                warn!("RIL: in-flight table full, rejecting {:?}", request_type);
                self.record_terminal(Status::Overloaded);
                pending.finish(NO_TOKEN, Status::Overloaded, Vec::new());
                return NO_TOKEN;
            }
        };

        if let Some((name, resp)) = synthetic {
            info!(
                "RIL[{}]: {:?} answered by {} override: {}",
                token, request_type, name, resp.status
            );
            self.bump(|s| s.synthesized += 1);
            match untracked {
                Some(pending) => {
                    self.record_terminal(resp.status);
                    pending.finish(token, resp.status, resp.payload);
                }
                None => self.finish(token, resp.status, resp.payload),
            }
            for event in resp.events {
                self.publish(event);
            }
            return token;
        }

        let request = Request {
            request_type,
            token,
            payload,
        };
        let Some(frame) = codec::encode_request(&request) else {
            warn!(
                "RIL[{}]: {:?} payload of {} bytes does not fit a frame",
                token,
                request_type,
                request.payload.len()
            );
            self.finish(token, Status::Error(error_code::INVALID_ARGUMENTS), Vec::new());
            return token;
        };

        let sent = self.link.lock(|l| match &mut *l.borrow_mut() {
            Link::Up(chan) => Some(chan.send(&frame)),
            Link::Down => None,
        });

        match sent {
            Some(Ok(n)) => {
                debug!("RIL[{}]: sent {:?} ({} bytes written)", token, request_type, n);
                self.bump(|s| s.bytes_written += n as u64);
                self.tracker
                    .lock(|t| t.borrow_mut().set_state(token, RequestState::AwaitingResponse));
            }
            Some(Err(ChannelError::Backlogged(queued))) => {
                warn!(
                    "RIL[{}]: modem not draining ({} bytes queued), rejecting {:?}",
                    token, queued, request_type
                );
                self.finish(token, Status::Overloaded, Vec::new());
            }
            Some(Err(e)) => {
                warn!("RIL[{}]: send failed: {}", token, e);
                self.transport_lost();
            }
            None => {
                debug!("RIL[{}]: no link for {:?}", token, request_type);
                self.finish(token, Status::TransportLost, Vec::new());
            }
        }
        token
    }

    /// Submit and wait for the completion with the default deadline.
    ///
    /// Dropping the future before it resolves cancels the request.
    pub async fn call(&self, request_type: RequestType, payload: Vec<u8>) -> Completion {
        self.call_with_timeout(request_type, payload, self.default_timeout_ms)
            .await
    }

    pub async fn call_with_timeout(
        &self,
        request_type: RequestType,
        payload: Vec<u8>,
        timeout_ms: Option<u64>,
    ) -> Completion {
        let signal: Arc<Signal<CriticalSectionRawMutex, Completion>> = Arc::new(Signal::new());
        let tx = signal.clone();
        let token =
            self.submit_with_timeout(request_type, payload, timeout_ms, move |c| tx.signal(c));

        let mut guard = CancelOnDrop {
            dispatcher: self,
            token,
        };
        let completion = signal.wait().await;
        guard.token = NO_TOKEN;
        completion
    }

    /// Blocking form of [`Dispatcher::call`]. Never call this from the
    /// reader thread: the response it waits for would never be read.
    pub fn call_blocking(&self, request_type: RequestType, payload: Vec<u8>) -> Completion {
        futures_lite::future::block_on(self.call(request_type, payload))
    }

    /// Stop tracking `token` and complete it with `Cancelled`. A response
    /// arriving later is counted as stale. Returns `false` if the request
    /// had already finished.
    pub fn cancel(&self, token: Token) -> bool {
        let Some(pending) = self.tracker.lock(|t| t.borrow_mut().cancel(token)) else {
            return false;
        };
        debug!("RIL[{}]: cancelled", token);
        self.record_terminal(Status::Cancelled);
        pending.finish(token, Status::Cancelled, Vec::new());
        true
    }

    // ── Inbound ──────────────────────────────────────────────

    /// Handle one inbound frame body.
    pub fn on_inbound_frame(&self, body: &[u8]) {
        match codec::decode(body) {
            Ok(Inbound::Response(resp)) => self.on_response(resp),
            Ok(Inbound::Unsolicited(event)) => self.publish(event),
            Err(e) => {
                warn!("RIL: dropping undecodable frame: {}", e);
                self.bump(|s| s.decode_errors += 1);
            }
        }
    }

    fn on_response(&self, resp: Response) {
        let Some(pending) = self.tracker.lock(|t| t.borrow_mut().complete(resp.token)) else {
            warn!("RIL[{}]: stale response ({}), discarding", resp.token, resp.status);
            self.bump(|s| s.stale_responses += 1);
            return;
        };
        debug!(
            "RIL[{}]: {:?} -> {}",
            resp.token, pending.request_type, resp.status
        );
        self.record_terminal(resp.status);
        pending.finish(resp.token, resp.status, resp.payload);
    }

    /// Handle every frame the attached channel has ready. Returns how
    /// many were handled.
    ///
    /// A channel error drops the link (failing everything in flight) and
    /// is returned; `NotAttached` means there was no link to poll.
    pub fn poll_inbound(&self) -> Result<usize, ChannelError> {
        let mut handled = 0;
        loop {
            let next = self.link.lock(|l| match &mut *l.borrow_mut() {
                Link::Up(chan) => chan.receive(),
                Link::Down => Err(ChannelError::NotAttached),
            });
            match next {
                Ok(Some(body)) => {
                    self.on_inbound_frame(&body);
                    handled += 1;
                }
                Ok(None) => return Ok(handled),
                Err(ChannelError::NotAttached) => return Err(ChannelError::NotAttached),
                Err(e) => {
                    warn!("RIL: channel failed: {}", e);
                    self.transport_lost();
                    return Err(e);
                }
            }
        }
    }

    /// Push outbound bytes a slow modem left queued. Returns how many went
    /// out. Errors are handled like in [`Dispatcher::poll_inbound`].
    pub fn flush_outbound(&self) -> Result<usize, ChannelError> {
        let flushed = self.link.lock(|l| match &mut *l.borrow_mut() {
            Link::Up(chan) => chan.flush_pending(),
            Link::Down => Err(ChannelError::NotAttached),
        });
        match flushed {
            Ok(n) => {
                if n > 0 {
                    self.bump(|s| s.bytes_written += n as u64);
                }
                Ok(n)
            }
            Err(ChannelError::NotAttached) => Err(ChannelError::NotAttached),
            Err(e) => {
                warn!("RIL: channel failed while flushing: {}", e);
                self.transport_lost();
                Err(e)
            }
        }
    }

    /// Bytes accepted for the modem but not yet written.
    pub fn pending_output(&self) -> usize {
        self.link.lock(|l| match &*l.borrow() {
            Link::Up(chan) => chan.pending_output(),
            Link::Down => 0,
        })
    }

    /// Complete every request past its deadline with `Timeout`.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let expired = self.tracker.lock(|t| t.borrow_mut().take_expired(now));
        let count = expired.len();
        for (token, pending) in expired {
            warn!(
                "RIL[{}]: {:?} timed out after {} ms",
                token,
                pending.request_type,
                now.saturating_sub(pending.issued_at_ms)
            );
            self.record_terminal(Status::Timeout);
            pending.finish(token, Status::Timeout, Vec::new());
        }
        count
    }

    // ── Events ───────────────────────────────────────────────

    pub fn subscribe(
        &self,
        event_type: EventType,
        listener: Arc<dyn EventListener>,
    ) -> SubscriptionId {
        self.events.subscribe(event_type, listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    fn publish(&self, event: UnsolicitedEvent) {
        self.bump(|s| s.events_published += 1);
        self.events.publish(event);
    }

    // ── Introspection ────────────────────────────────────────

    /// Modem family the dispatcher was configured for.
    pub fn device(&self) -> DeviceVariant {
        self.device
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats.lock(|s| *s.borrow())
    }

    pub fn in_flight(&self) -> usize {
        self.tracker.lock(|t| t.borrow().len())
    }

    pub fn request_state(&self, token: Token) -> Option<RequestState> {
        self.tracker.lock(|t| t.borrow().state(token))
    }

    // ── Internals ────────────────────────────────────────────

    /// Remove `token` and complete it, if it is still tracked.
    fn finish(&self, token: Token, status: Status, payload: Vec<u8>) {
        if let Some(pending) = self.tracker.lock(|t| t.borrow_mut().complete(token)) {
            self.record_terminal(status);
            pending.finish(token, status, payload);
        }
    }

    fn record_terminal(&self, status: Status) {
        self.bump(|s| match RequestState::for_status(status) {
            RequestState::Completed => s.completed += 1,
            RequestState::TimedOut => s.timed_out += 1,
            RequestState::Cancelled => s.cancelled += 1,
            _ => s.failed += 1,
        });
    }

    fn bump(&self, f: impl FnOnce(&mut DispatchStats)) {
        self.stats.lock(|s| f(&mut s.borrow_mut()));
    }
}

/// Cancels an outstanding `call` whose future was dropped.
struct CancelOnDrop<'a, T: Transport> {
    dispatcher: &'a Dispatcher<T>,
    token: Token,
}

impl<T: Transport> Drop for CancelOnDrop<'_, T> {
    fn drop(&mut self) {
        if self.token != NO_TOKEN {
            self.dispatcher.cancel(self.token);
        }
    }
}
