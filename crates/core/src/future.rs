//! Single-shot request completion.
//!
//! Every dispatched request gets a [`ResponseSlot`]: a cell the session
//! layer resolves exactly once, from a completion worker. Callers hold a
//! typed [`ResponseFuture`] over the slot and block on it (or poll it) at
//! their convenience.
//!
//! The slot is the only suspension point the library exposes; socket
//! threads never resolve one directly.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::codec::Response;
use crate::error::{QueryError, RconError, Result};

/// Untyped completion cell shared between the session layer and a future.
pub struct ResponseSlot {
    state: Mutex<SlotState>,
    cond: Condvar,
}

struct SlotState {
    resolved: bool,
    value: Option<Result<Response>>,
}

impl std::fmt::Debug for ResponseSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseSlot")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

impl ResponseSlot {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SlotState {
                resolved: false,
                value: None,
            }),
            cond: Condvar::new(),
        })
    }

    /// Resolve the slot. Returns `false` (and drops `result`) if it was
    /// already resolved; a slot resolves at most once.
    pub fn complete(&self, result: Result<Response>) -> bool {
        let mut state = self.state.lock();
        if state.resolved {
            return false;
        }
        state.resolved = true;
        state.value = Some(result);
        self.cond.notify_all();
        true
    }

    pub fn is_resolved(&self) -> bool {
        self.state.lock().resolved
    }

    pub(crate) fn wait_value(&self) -> Result<Response> {
        let mut state = self.state.lock();
        while state.value.is_none() {
            self.cond.wait(&mut state);
        }
        // Resolved exactly once and consumed exactly once.
        state.value.take().unwrap_or(Err(QueryError::Cancelled))
    }

    pub(crate) fn wait_value_timeout(&self, timeout: Duration) -> Option<Result<Response>> {
        let deadline = std::time::Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.value.is_none() {
            if self.cond.wait_until(&mut state, deadline).timed_out() {
                return state.value.take();
            }
        }
        state.value.take()
    }

    pub(crate) fn try_take_value(&self) -> Option<Result<Response>> {
        self.state.lock().value.take()
    }
}

/// Recovers the operation's typed result from the tagged [`Response`].
pub trait FromResponse: Sized {
    fn from_response(response: Response) -> Result<Self>;
}

fn mismatch<T>(response: Response) -> Result<T> {
    tracing::error!(?response, "response variant does not match the operation");
    Err(RconError::BadCorrelation.into())
}

impl FromResponse for crate::codec::ServerInfo {
    fn from_response(response: Response) -> Result<Self> {
        match response {
            Response::Info(info) => Ok(info),
            other => mismatch(other),
        }
    }
}

impl FromResponse for Vec<crate::codec::PlayerInfo> {
    fn from_response(response: Response) -> Result<Self> {
        match response {
            Response::Players(players) => Ok(players),
            other => mismatch(other),
        }
    }
}

impl FromResponse for std::collections::HashMap<String, String> {
    fn from_response(response: Response) -> Result<Self> {
        match response {
            Response::Rules(rules) => Ok(rules),
            other => mismatch(other),
        }
    }
}

impl FromResponse for bool {
    fn from_response(response: Response) -> Result<Self> {
        match response {
            Response::AuthGranted(granted) => Ok(granted),
            other => mismatch(other),
        }
    }
}

impl FromResponse for String {
    fn from_response(response: Response) -> Result<Self> {
        match response {
            Response::CommandOutput(output) => Ok(output),
            other => mismatch(other),
        }
    }
}

type CancelHook = Box<dyn FnOnce() + Send>;

/// Caller-visible handle over one dispatched request.
///
/// Resolves exactly once. Dropping the future does not cancel the request;
/// call [`cancel`](Self::cancel) for that.
pub struct ResponseFuture<T: FromResponse> {
    slot: Arc<ResponseSlot>,
    cancel: Option<CancelHook>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: FromResponse> std::fmt::Debug for ResponseFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseFuture")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

impl<T: FromResponse> ResponseFuture<T> {
    pub(crate) fn new(slot: Arc<ResponseSlot>, cancel: CancelHook) -> Self {
        Self {
            slot,
            cancel: Some(cancel),
            _marker: PhantomData,
        }
    }

    /// Block until the request resolves.
    pub fn wait(self) -> Result<T> {
        self.slot.wait_value().and_then(T::from_response)
    }

    /// Block until the request resolves or `timeout` elapses. On timeout
    /// the request itself keeps running against its own deadline.
    pub fn wait_timeout(self, timeout: Duration) -> Result<T> {
        match self.slot.wait_value_timeout(timeout) {
            Some(result) => result.and_then(T::from_response),
            None => Err(QueryError::Timeout),
        }
    }

    /// Non-blocking poll; `None` while the request is in flight.
    pub fn try_take(&self) -> Option<Result<T>> {
        self.slot
            .try_take_value()
            .map(|result| result.and_then(T::from_response))
    }

    pub fn is_resolved(&self) -> bool {
        self.slot.is_resolved()
    }

    /// Remove the pending request and resolve with
    /// [`QueryError::Cancelled`]. A no-op if the request already resolved;
    /// a matching frame arriving later is silently dropped.
    pub fn cancel(mut self) {
        if let Some(hook) = self.cancel.take() {
            hook();
        }
    }
}
