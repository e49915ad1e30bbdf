//! In-flight request table.
//!
//! Assigns correlation tokens and matches inbound responses back to the
//! caller that is waiting for them. The table is fixed-capacity: a modem
//! with 64 outstanding requests is already badly behind, and refusing the
//! 65th is better than growing without bound.
//!
//! Every removal path (`complete`, `expire`, `cancel`, `take_expired`,
//! `drain`) hands the entry out by value, so once a token has been removed
//! nothing else can complete it.

use heapless::FnvIndexMap;

use super::messages::{Completion, NO_TOKEN, RequestState, RequestType, Status, Token};

/// Maximum number of requests awaiting a response at once.
/// Power of 2, required by the index map.
pub const MAX_IN_FLIGHT: usize = 64;

/// Callback fired with the terminal result of a request.
pub type CompletionFn = Box<dyn FnOnce(Completion) + Send>;

/// A request the tracker is holding until it reaches a terminal state.
pub struct PendingRequest {
    pub request_type: RequestType,
    pub issued_at_ms: u64,
    pub deadline_ms: Option<u64>,
    pub state: RequestState,
    on_complete: CompletionFn,
}

impl PendingRequest {
    pub fn new(
        request_type: RequestType,
        issued_at_ms: u64,
        deadline_ms: Option<u64>,
        on_complete: impl FnOnce(Completion) + Send + 'static,
    ) -> Self {
        Self {
            request_type,
            issued_at_ms,
            deadline_ms,
            state: RequestState::PendingOverride,
            on_complete: Box::new(on_complete),
        }
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.deadline_ms.is_some_and(|d| now_ms >= d)
    }

    /// Consume the request and fire its callback.
    ///
    /// Must be called with no lock held: the callback may submit again.
    pub fn finish(self, token: Token, status: Status, payload: Vec<u8>) {
        (self.on_complete)(Completion::new(token, self.request_type, status, payload));
    }
}

/// Token table for in-flight requests.
pub struct RequestTracker {
    table: FnvIndexMap<Token, PendingRequest, MAX_IN_FLIGHT>,
    next_token: Token,
    token_wrap: Token,
}

impl RequestTracker {
    /// `token_wrap` is the largest token issued before wrapping to 1. It is
    /// raised to twice the table capacity if set lower.
    pub fn new(token_wrap: u32) -> Self {
        Self {
            table: FnvIndexMap::new(),
            next_token: 1,
            token_wrap: token_wrap.max(2 * MAX_IN_FLIGHT as u32),
        }
    }

    /// Assign a token and start tracking `pending`.
    ///
    /// Hands the request back when the table is full so the caller can
    /// fail it.
    pub fn register(&mut self, mut pending: PendingRequest) -> Result<Token, PendingRequest> {
        if self.is_full() {
            return Err(pending);
        }
        let token = self.alloc_token();
        pending.state = RequestState::PendingTransport;
        self.table.insert(token, pending).map_err(|(_, p)| p)?;
        Ok(token)
    }

    /// Token for a request answered on the spot that never enters the
    /// table. It is distinct from every live token.
    pub fn issue_untracked(&mut self) -> Token {
        self.alloc_token()
    }

    /// Remove the request matching an inbound response.
    /// `None` means the token is stale or was never issued.
    pub fn complete(&mut self, token: Token) -> Option<PendingRequest> {
        self.table.remove(&token)
    }

    /// Remove a request whose deadline passed.
    pub fn expire(&mut self, token: Token) -> Option<PendingRequest> {
        self.table.remove(&token)
    }

    /// Remove a request at the caller's request.
    pub fn cancel(&mut self, token: Token) -> Option<PendingRequest> {
        self.table.remove(&token)
    }

    /// Remove every request whose deadline is at or before `now_ms`,
    /// earliest deadline first.
    pub fn take_expired(&mut self, now_ms: u64) -> Vec<(Token, PendingRequest)> {
        let mut due: Vec<(u64, Token)> = self
            .table
            .iter()
            .filter(|(_, p)| p.is_expired(now_ms))
            .map(|(t, p)| (p.deadline_ms.unwrap_or(now_ms), *t))
            .collect();
        due.sort_unstable();

        due.into_iter()
            .filter_map(|(_, token)| self.expire(token).map(|p| (token, p)))
            .collect()
    }

    /// Remove everything, oldest token first (e.g. on transport loss).
    pub fn drain(&mut self) -> Vec<(Token, PendingRequest)> {
        let mut tokens: Vec<(u64, Token)> = self
            .table
            .iter()
            .map(|(t, p)| (p.issued_at_ms, *t))
            .collect();
        tokens.sort_unstable();

        tokens
            .into_iter()
            .filter_map(|(_, token)| self.table.remove(&token).map(|p| (token, p)))
            .collect()
    }

    /// Advance a live request's dispatch state. Returns `false` if the
    /// token is no longer tracked.
    pub fn set_state(&mut self, token: Token, state: RequestState) -> bool {
        match self.table.get_mut(&token) {
            Some(p) => {
                p.state = state;
                true
            }
            None => false,
        }
    }

    pub fn state(&self, token: Token) -> Option<RequestState> {
        self.table.get(&token).map(|p| p.state)
    }

    pub fn contains(&self, token: Token) -> bool {
        self.table.contains_key(&token)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.table.len() >= MAX_IN_FLIGHT
    }

    fn alloc_token(&mut self) -> Token {
        loop {
            let token = self.next_token;
            self.next_token = if token >= self.token_wrap {
                1
            } else {
                token + 1
            };
            if token != NO_TOKEN && !self.table.contains_key(&token) {
                return token;
            }
        }
    }
}
