//! Pending-request bookkeeping.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::codec::{Payload, Priority, ResponseKind};
use crate::error::QueryError;
use crate::future::ResponseSlot;
use crate::transport::Destination;

/// A typed request handed to the session manager.
#[derive(Debug, Clone)]
pub struct Request {
    pub destination: Destination,
    pub payload: Payload,
    pub priority: Priority,
    /// Per-request deadline (per attempt budget, for UDP).
    pub timeout: Duration,
    /// Caller-chosen correlation id; RCON only.
    pub correlation_id: Option<i32>,
}

impl Request {
    /// The key this request's reply will be matched under. UDP queries
    /// correlate by expected response kind (the connectionless transport
    /// carries no id); RCON correlates by the 32-bit id.
    pub fn correlation_key(&self) -> Option<CorrelationKey> {
        if let Some(kind) = self.payload.response_kind() {
            return Some(CorrelationKey::Query(kind));
        }
        self.correlation_id.map(CorrelationKey::Rcon)
    }
}

/// Identity of an in-flight exchange on one destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CorrelationKey {
    Query(ResponseKind),
    Rcon(i32),
}

/// Lifecycle of a pending entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingState {
    /// Waiting behind another in-flight request with the same key.
    Queued,
    /// On the wire, no reply yet.
    Sent,
    /// Partially answered: fragments or RCON body frames are accumulating.
    Partial,
    /// Resolved; removed from the table before the future completes.
    Done,
}

/// One in-flight exchange. Owned exclusively by the session manager's
/// table; the mutex around the table is its only synchronization.
pub struct PendingEntry {
    pub request: Request,
    pub slot: Arc<ResponseSlot>,
    pub state: PendingState,
    pub sent_at: Instant,
    pub deadline: Instant,
    /// Resends left; zero for RCON.
    pub retries_left: u32,
    /// Delay before the next resend; doubles per resend up to the cap.
    pub backoff: Duration,
    /// Whether the transparent challenge exchange already happened.
    pub challenge_retried: bool,
    /// Most recent attributable failure; surfaced if the retry budget runs
    /// out without a good reply.
    pub last_error: Option<QueryError>,
    /// RCON command output accumulator.
    pub collector: BodyCollector,
}

/// Accumulates RCON RESPONSE_VALUE bodies until the sentinel's reply.
#[derive(Debug, Default)]
pub struct BodyCollector {
    pub bodies: Vec<Vec<u8>>,
    /// Empty-bodied replies seen so far; the second one ends the stream.
    pub empty_replies: u32,
}

impl BodyCollector {
    /// Concatenate the collected bodies in arrival order.
    pub fn concat(&self) -> String {
        let mut out = Vec::new();
        for body in &self.bodies {
            out.extend_from_slice(body);
        }
        String::from_utf8_lossy(&out).into_owned()
    }
}

/// A request waiting for its correlation key to free up (UDP only).
pub struct QueuedRequest {
    pub request: Request,
    pub slot: Arc<ResponseSlot>,
}
