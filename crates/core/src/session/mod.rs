//! Request correlation, timeouts, and completion.
//!
//! The session manager owns the pending-request table, the one piece of
//! widely shared mutable state in the library. Each dispatched request is
//! keyed by (destination, correlation key):
//!
//! - UDP queries correlate by **expected response kind**, so only one
//!   request of each kind may be in flight per destination; excess
//!   dispatches queue FIFO behind it.
//! - RCON requests correlate by the caller-chosen **32-bit id**; a
//!   duplicate in-flight id is rejected outright.
//!
//! Inbound bytes arrive on socket threads and are decoded and matched
//! there; once an entry resolves, its continuation is handed to the
//! completion worker pool. Socket threads never resolve a future
//! themselves.
//!
//! A timer thread drives deadlines: unanswered UDP queries are re-sent on
//! an exponential backoff schedule (same correlation key) until the retry
//! budget runs out; RCON requests get a single full deadline, since TCP
//! already guarantees delivery.

pub mod pending;
pub mod rcon;
pub mod worker;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};

use crate::codec::rcon::{RconPacket, TYPE_AUTH_RESPONSE, TYPE_RESPONSE_VALUE};
use crate::codec::split::{ReassemblyBuffer, SplitHeader};
use crate::codec::{Payload, Response, ResponseKind, query};
use crate::config::ClientConfig;
use crate::error::{CodecError, QueryError, RconError, Result, TransportError};
use crate::future::ResponseSlot;
use crate::transport::{Destination, InboundHandler, ProtocolKind, WriteSink};

pub use pending::{CorrelationKey, PendingEntry, PendingState, QueuedRequest, Request};
pub use rcon::{RconSession, RconSessions};
pub use worker::CompletionPool;

type PendingKey = (Destination, CorrelationKey);

/// Correlates inbound frames to in-flight requests and completes their
/// futures. Cloneable handle over shared state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: ClientConfig,
    table: Mutex<PendingTable>,
    /// Wakes the timer thread when a dispatch arms an earlier deadline.
    timer_cond: Condvar,
    workers: CompletionPool,
    rcon_sessions: Arc<RconSessions>,
    sinks: RwLock<SinkSet>,
    running: AtomicBool,
    timer: Mutex<Option<thread::JoinHandle<()>>>,
}

#[derive(Default)]
struct SinkSet {
    udp: Option<Arc<dyn WriteSink>>,
    tcp: Option<Arc<dyn WriteSink>>,
}

#[derive(Default)]
struct PendingTable {
    entries: HashMap<PendingKey, PendingEntry>,
    /// FIFO overflow for UDP requests whose key is taken.
    overflow: HashMap<PendingKey, VecDeque<QueuedRequest>>,
    /// Split groups in flight, keyed by (destination, group id). A
    /// fragment's response kind is unknown until the group assembles, so
    /// the group id is the only usable correlation at arrival time.
    reassembly: HashMap<(Destination, i32), ReassemblyBuffer>,
}

impl SessionManager {
    /// Create the manager, its worker pool, and its timer thread.
    pub fn new(config: ClientConfig, rcon_sessions: Arc<RconSessions>) -> Self {
        let workers = CompletionPool::new(config.worker_pool_size);
        let manager = Self {
            inner: Arc::new(SessionInner {
                config,
                table: Mutex::new(PendingTable::default()),
                timer_cond: Condvar::new(),
                workers,
                rcon_sessions,
                sinks: RwLock::new(SinkSet::default()),
                running: AtomicBool::new(true),
                timer: Mutex::new(None),
            }),
        };

        let timer_manager = manager.clone();
        let handle = thread::spawn(move || {
            timer_manager.timer_loop();
        });
        *manager.inner.timer.lock() = Some(handle);

        manager
    }

    /// Wire the transport write sinks. Called once by the facade after the
    /// pools exist; the manager holds no other transport reference.
    pub fn attach_sinks(&self, udp: Arc<dyn WriteSink>, tcp: Arc<dyn WriteSink>) {
        let mut sinks = self.inner.sinks.write();
        sinks.udp = Some(udp);
        sinks.tcp = Some(tcp);
    }

    /// Register and send a request. Returns the completion slot; the
    /// facade wraps it into a typed future.
    ///
    /// Fails synchronously on backpressure, on a duplicate in-flight RCON
    /// id, and on a malformed request.
    pub fn dispatch(&self, request: Request) -> Result<Arc<ResponseSlot>> {
        let key = request
            .correlation_key()
            .ok_or(RconError::BadCorrelation)?;
        let pk = (request.destination, key);
        let slot = ResponseSlot::new();

        let mut table = self.inner.table.lock();
        if table.entries.contains_key(&pk) {
            match key {
                CorrelationKey::Rcon(id) => {
                    tracing::warn!(destination = %request.destination, id, "duplicate RCON id in flight");
                    return Err(RconError::BadCorrelation.into());
                }
                CorrelationKey::Query(kind) => {
                    tracing::debug!(destination = %request.destination, ?kind, "queued behind in-flight query");
                    table.overflow.entry(pk).or_default().push_back(QueuedRequest {
                        request,
                        slot: slot.clone(),
                    });
                    return Ok(slot);
                }
            }
        }

        self.send_and_register(&mut table, request, slot.clone(), pk)?;
        self.inner.timer_cond.notify_all();
        Ok(slot)
    }

    /// Remove a pending request. The future resolves with
    /// [`QueryError::Cancelled`]; a matching frame arriving later is
    /// silently dropped. A no-op if the request already resolved.
    pub fn cancel(&self, destination: Destination, key: CorrelationKey, slot: &Arc<ResponseSlot>) {
        let pk = (destination, key);
        let mut table = self.inner.table.lock();

        if let Some(queue) = table.overflow.get_mut(&pk) {
            if let Some(pos) = queue.iter().position(|q| Arc::ptr_eq(&q.slot, slot)) {
                queue.remove(pos);
            }
            if queue.is_empty() {
                table.overflow.remove(&pk);
            }
        }

        if table
            .entries
            .get(&pk)
            .is_some_and(|e| Arc::ptr_eq(&e.slot, slot))
        {
            if let Some(mut entry) = table.entries.remove(&pk) {
                entry.state = PendingState::Done;
            }
            self.promote_next(&mut table, pk);
        }
        drop(table);

        tracing::debug!(%destination, ?key, "request cancelled");
        self.complete(slot.clone(), Err(QueryError::Cancelled));
    }

    /// Cancel everything and stop the timer and worker threads.
    pub fn shutdown(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.inner.timer_cond.notify_all();

        let (entries, overflow) = {
            let mut table = self.inner.table.lock();
            table.reassembly.clear();
            (
                std::mem::take(&mut table.entries),
                std::mem::take(&mut table.overflow),
            )
        };
        for (_, entry) in entries {
            self.complete(entry.slot, Err(QueryError::Cancelled));
        }
        for (_, queue) in overflow {
            for queued in queue {
                self.complete(queued.slot, Err(QueryError::Cancelled));
            }
        }

        if let Some(handle) = self.inner.timer.lock().take() {
            let _ = handle.join();
        }
        self.inner.workers.shutdown();
        tracing::debug!("session manager shut down");
    }

    // ---- outbound ----------------------------------------------------

    fn sink_for(&self, kind: ProtocolKind) -> Result<Arc<dyn WriteSink>> {
        let sinks = self.inner.sinks.read();
        let sink = match kind {
            ProtocolKind::Query => sinks.udp.clone(),
            ProtocolKind::Rcon => sinks.tcp.clone(),
            ProtocolKind::Master => None,
        };
        sink.ok_or_else(|| {
            tracing::error!(?kind, "no transport attached for protocol kind");
            TransportError::Closed.into()
        })
    }

    /// Encode, send, and insert the pending entry, all under the table
    /// lock so wire order matches dispatch order.
    fn send_and_register(
        &self,
        table: &mut PendingTable,
        request: Request,
        slot: Arc<ResponseSlot>,
        pk: PendingKey,
    ) -> Result<()> {
        let frames = encode_frames(&request)?;
        let sink = self.sink_for(request.destination.kind)?;
        for frame in &frames {
            sink.send(&request.destination, frame, request.priority)?;
        }

        let retries_left = match pk.1 {
            CorrelationKey::Query(_) => self.inner.config.max_retries,
            CorrelationKey::Rcon(_) => 0,
        };
        let now = Instant::now();
        let mut entry = PendingEntry {
            request,
            slot,
            state: PendingState::Sent,
            sent_at: now,
            deadline: now,
            retries_left,
            backoff: self.inner.config.backoff_initial,
            challenge_retried: false,
            last_error: None,
            collector: pending::BodyCollector::default(),
        };
        entry.deadline = now + next_wait(&entry);
        tracing::debug!(
            destination = %entry.request.destination,
            key = ?pk.1,
            retries = entry.retries_left,
            "request dispatched"
        );
        table.entries.insert(pk, entry);
        Ok(())
    }

    /// Activate the next queued request for a freed key, skipping any
    /// whose send fails.
    fn promote_next(&self, table: &mut PendingTable, pk: PendingKey) {
        loop {
            let Some(queued) = table.overflow.get_mut(&pk).and_then(VecDeque::pop_front) else {
                table.overflow.remove(&pk);
                return;
            };
            match self.send_and_register(table, queued.request, queued.slot.clone(), pk) {
                Ok(()) => {
                    self.inner.timer_cond.notify_all();
                    return;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "promoting queued request failed");
                    self.complete(queued.slot, Err(e));
                }
            }
        }
    }

    /// Re-send the entry's current payload; consumes one retry.
    fn resend(&self, entry: &mut PendingEntry) {
        entry.retries_left = entry.retries_left.saturating_sub(1);
        entry.backoff = (entry.backoff * 2).min(self.inner.config.backoff_max);

        match encode_frames(&entry.request)
            .and_then(|frames| {
                let sink = self.sink_for(entry.request.destination.kind)?;
                for frame in &frames {
                    sink.send(&entry.request.destination, frame, entry.request.priority)?;
                }
                Ok(())
            }) {
            Ok(()) => {
                tracing::debug!(
                    destination = %entry.request.destination,
                    retries_left = entry.retries_left,
                    "request re-sent"
                );
            }
            Err(e) => {
                // Leave the entry to its deadline; the schedule still ends
                // in a terminal completion.
                tracing::warn!(destination = %entry.request.destination, error = %e, "re-send failed");
                entry.last_error = Some(e);
            }
        }

        let now = Instant::now();
        entry.sent_at = now;
        entry.deadline = now + next_wait(entry);
    }

    /// Count one failed attempt against the entry: re-send if budget
    /// remains, otherwise resolve with `error`.
    fn fail_attempt(&self, table: &mut PendingTable, pk: PendingKey, error: QueryError) {
        let Some(entry) = table.entries.get_mut(&pk) else {
            return;
        };
        if entry.retries_left > 0 {
            entry.last_error = Some(error);
            self.resend(entry);
            return;
        }
        let mut entry = match table.entries.remove(&pk) {
            Some(entry) => entry,
            None => return,
        };
        entry.state = PendingState::Done;
        self.promote_next(table, pk);
        tracing::debug!(destination = %pk.0, key = ?pk.1, error = %error, "request failed");
        self.complete(entry.slot, Err(error));
    }

    // ---- inbound: UDP ------------------------------------------------

    fn handle_datagram(&self, destination: Destination, bytes: Vec<u8>) {
        match query::classify(&bytes) {
            Ok(query::Datagram::Single(payload)) => {
                self.handle_query_payload(destination, payload);
            }
            Ok(query::Datagram::Split(rest)) => self.handle_fragment(destination, rest),
            Err(e) => {
                tracing::debug!(%destination, error = %e, "unclassifiable datagram dropped");
            }
        }
    }

    fn handle_query_payload(&self, destination: Destination, payload: &[u8]) {
        match query::decode_response(payload) {
            Ok(Response::Challenge(token)) => self.handle_challenge(destination, token),
            Ok(response) => {
                // Decoded UDP responses always carry a kind.
                let Some(kind) = response.kind() else { return };
                self.complete_query(destination, kind, response);
            }
            Err(e) => {
                // Attribute the failure when the header byte names a kind
                // we are waiting on; anything else is unknown traffic and
                // must not fail unrelated entries.
                let kind = payload.first().copied().and_then(kind_for_header);
                match kind {
                    Some(kind) => {
                        let mut table = self.inner.table.lock();
                        self.fail_attempt(
                            &mut table,
                            (destination, CorrelationKey::Query(kind)),
                            e.into(),
                        );
                    }
                    None => {
                        tracing::debug!(%destination, error = %e, "undecodable datagram dropped");
                    }
                }
            }
        }
    }

    fn complete_query(&self, destination: Destination, kind: ResponseKind, response: Response) {
        let pk = (destination, CorrelationKey::Query(kind));
        let mut table = self.inner.table.lock();
        let Some(mut entry) = table.entries.remove(&pk) else {
            tracing::debug!(%destination, ?kind, "unmatched response dropped");
            return;
        };
        entry.state = PendingState::Done;
        self.promote_next(&mut table, pk);
        drop(table);
        self.complete(entry.slot, Ok(response));
    }

    /// Transparent challenge exchange: re-send the pending PLAYERS/RULES
    /// request with the token, at most once. The caller never sees the
    /// token.
    fn handle_challenge(&self, destination: Destination, token: u32) {
        let mut table = self.inner.table.lock();

        let candidate = [ResponseKind::Players, ResponseKind::Rules]
            .into_iter()
            .map(|kind| (destination, CorrelationKey::Query(kind)))
            .filter(|pk| table.entries.contains_key(pk))
            .min_by_key(|pk| {
                let entry = &table.entries[pk];
                (entry.challenge_retried, entry.sent_at)
            });
        let Some(pk) = candidate else {
            tracing::debug!(%destination, "unsolicited challenge dropped");
            return;
        };

        let Some(entry) = table.entries.get_mut(&pk) else {
            return;
        };
        if entry.challenge_retried {
            // The server is looping; the token exchange is not converging.
            let mut entry = match table.entries.remove(&pk) {
                Some(entry) => entry,
                None => return,
            };
            entry.state = PendingState::Done;
            self.promote_next(&mut table, pk);
            drop(table);
            tracing::warn!(%destination, "second challenge for one request");
            self.complete(
                entry.slot,
                Err(CodecError::UnknownHeader(query::RESPONSE_CHALLENGE).into()),
            );
            return;
        }

        entry.request.payload = match entry.request.payload {
            Payload::Players { .. } => Payload::Players { challenge: token },
            Payload::Rules { .. } => Payload::Rules { challenge: token },
            ref other => other.clone(),
        };
        entry.challenge_retried = true;
        entry.sent_at = Instant::now();
        tracing::debug!(%destination, key = ?pk.1, "challenge token received, re-sending");

        // Deadline deliberately unchanged: the token exchange spends the
        // caller's round-trip budget, it does not extend it.
        if let Err(e) = encode_frames(&entry.request).and_then(|frames| {
            let sink = self.sink_for(destination.kind)?;
            for frame in &frames {
                sink.send(&destination, frame, entry.request.priority)?;
            }
            Ok(())
        }) {
            tracing::warn!(%destination, error = %e, "challenge re-send failed");
            entry.last_error = Some(e);
        }
    }

    fn handle_fragment(&self, destination: Destination, rest: &[u8]) {
        let (header, payload) = match SplitHeader::parse(rest) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::debug!(%destination, error = %e, "unparsable fragment dropped");
                return;
            }
        };
        let buf_key = (destination, header.id);

        let mut table = self.inner.table.lock();
        if !table.reassembly.contains_key(&buf_key) {
            match ReassemblyBuffer::new(&header) {
                Ok(buffer) => {
                    table.reassembly.insert(buf_key, buffer);
                }
                Err(e) => {
                    tracing::debug!(%destination, error = %e, "fragment with bad header dropped");
                    return;
                }
            }
        }

        let Some(buffer) = table.reassembly.get_mut(&buf_key) else {
            return;
        };
        match buffer.insert(&header, payload) {
            Ok(None) => {
                // Still collecting. If exactly one query is in flight for
                // this destination, surface the partial state on it.
                if let Some(pk) = sole_query_key(&table, destination) {
                    if let Some(entry) = table.entries.get_mut(&pk) {
                        entry.state = PendingState::Partial;
                    }
                }
            }
            Ok(Some(assembled)) => {
                table.reassembly.remove(&buf_key);
                drop(table);
                // The reassembled bytes form a virtual single packet; some
                // servers include the outer header, others leave it off.
                let inner = match query::classify(&assembled) {
                    Ok(query::Datagram::Single(p)) => p.to_vec(),
                    _ => assembled,
                };
                self.handle_query_payload(destination, &inner);
            }
            Err(e) => {
                table.reassembly.remove(&buf_key);
                // The group's response kind never became known; only a
                // lone in-flight query can be attributed the failure.
                match sole_query_key(&table, destination) {
                    Some(pk) => self.fail_attempt(&mut table, pk, e.into()),
                    None => {
                        tracing::debug!(%destination, error = %e, "split group discarded");
                    }
                }
            }
        }
    }

    // ---- inbound: RCON -----------------------------------------------

    fn handle_frame(&self, destination: Destination, frame: Vec<u8>) {
        let packet = match RconPacket::decode(&frame) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::debug!(%destination, error = %e, "undecodable frame dropped");
                return;
            }
        };

        if packet.packet_type == TYPE_AUTH_RESPONSE && packet.id == -1 {
            self.handle_auth_rejection(destination);
            return;
        }

        let pk = (destination, CorrelationKey::Rcon(packet.id));
        let mut table = self.inner.table.lock();
        let awaiting_auth = match table.entries.get(&pk) {
            Some(entry) => matches!(entry.request.payload, Payload::Auth { .. }),
            None => {
                tracing::debug!(%destination, id = packet.id, "unmatched frame dropped");
                return;
            }
        };

        match (awaiting_auth, packet.packet_type) {
            (true, TYPE_AUTH_RESPONSE) => {
                let Some(mut entry) = table.entries.remove(&pk) else {
                    return;
                };
                entry.state = PendingState::Done;
                drop(table);
                self.inner
                    .rcon_sessions
                    .mark_authenticated(destination, packet.id as u32);
                self.complete(entry.slot, Ok(Response::AuthGranted(true)));
            }
            (true, _) => {
                // The server echoes the AUTH request with an empty
                // RESPONSE_VALUE before the verdict.
                tracing::trace!(%destination, id = packet.id, "auth echo");
            }
            (false, TYPE_RESPONSE_VALUE) => {
                self.collect_command_body(&mut table, pk, packet.body);
            }
            (false, packet_type) => {
                tracing::debug!(
                    %destination,
                    id = packet.id,
                    packet_type,
                    "unexpected frame for entry dropped"
                );
            }
        }
    }

    /// AUTH_RESPONSE with id -1: resolve the pending auth attempt (if any)
    /// to `false` and leave the session unauthenticated.
    fn handle_auth_rejection(&self, destination: Destination) {
        let mut table = self.inner.table.lock();
        let pk = table
            .entries
            .iter()
            .find(|((dest, _), entry)| {
                *dest == destination && matches!(entry.request.payload, Payload::Auth { .. })
            })
            .map(|(pk, _)| *pk);
        let Some(pk) = pk else {
            tracing::debug!(%destination, "unsolicited auth rejection dropped");
            return;
        };
        let mut entry = match table.entries.remove(&pk) {
            Some(entry) => entry,
            None => return,
        };
        entry.state = PendingState::Done;
        drop(table);

        tracing::warn!(%destination, error = %RconError::AuthRejected, "authentication failed");
        self.inner.rcon_sessions.mark_rejected(destination);
        self.complete(entry.slot, Ok(Response::AuthGranted(false)));
    }

    /// Accumulate one RESPONSE_VALUE body for a command entry. The reply
    /// to the trailing sentinel (a recognized pad body, or the second
    /// empty body) ends the stream.
    fn collect_command_body(&self, table: &mut PendingTable, pk: PendingKey, body: Vec<u8>) {
        let Some(entry) = table.entries.get_mut(&pk) else {
            return;
        };

        let done = if body.is_empty() {
            entry.collector.empty_replies += 1;
            entry.collector.empty_replies >= 2
        } else if self.inner.config.is_terminator_pad(&body) {
            true
        } else {
            entry.collector.bodies.push(body);
            false
        };

        if !done {
            entry.state = PendingState::Partial;
            return;
        }

        let mut entry = match table.entries.remove(&pk) {
            Some(entry) => entry,
            None => return,
        };
        entry.state = PendingState::Done;
        let output = entry.collector.concat();
        tracing::debug!(
            destination = %pk.0,
            key = ?pk.1,
            frames = entry.collector.bodies.len(),
            bytes = output.len(),
            "command output complete"
        );
        self.complete(entry.slot, Ok(Response::CommandOutput(output)));
    }

    /// TCP connection gone: every pending RCON request on the destination
    /// resolves, and the auth session is invalidated.
    fn handle_closed(&self, destination: Destination, error: TransportError) {
        let connect_failed = matches!(error, TransportError::ConnectFailed);

        let mut table = self.inner.table.lock();
        let keys: Vec<PendingKey> = table
            .entries
            .keys()
            .filter(|(dest, _)| *dest == destination)
            .copied()
            .collect();
        let mut slots = Vec::with_capacity(keys.len());
        for pk in keys {
            if let Some(mut entry) = table.entries.remove(&pk) {
                entry.state = PendingState::Done;
                slots.push(entry.slot);
            }
        }
        drop(table);

        if !slots.is_empty() {
            tracing::info!(%destination, error = %error, pending = slots.len(), "failing in-flight requests");
        }
        for slot in slots {
            let error = if connect_failed {
                TransportError::ConnectFailed
            } else {
                TransportError::Closed
            };
            self.complete(slot, Err(error.into()));
        }
        self.inner.rcon_sessions.remove(destination);
    }

    // ---- completion & timing -----------------------------------------

    /// Resolve a slot on the worker pool, never on the calling thread.
    fn complete(&self, slot: Arc<ResponseSlot>, result: Result<Response>) {
        self.inner.workers.execute(Box::new(move || {
            if !slot.complete(result) {
                tracing::trace!("late completion dropped; slot already resolved");
            }
        }));
    }

    /// Deadline loop: wakes at the earliest pending deadline, re-sends or
    /// expires entries, and prunes orphaned split groups.
    fn timer_loop(&self) {
        let mut table = self.inner.table.lock();
        while self.inner.running.load(Ordering::SeqCst) {
            let now = Instant::now();

            let expired: Vec<PendingKey> = table
                .entries
                .iter()
                .filter(|(_, entry)| entry.deadline <= now)
                .map(|(pk, _)| *pk)
                .collect();

            for pk in expired {
                let Some(entry) = table.entries.get_mut(&pk) else {
                    continue;
                };
                if entry.retries_left > 0 && matches!(pk.1, CorrelationKey::Query(_)) {
                    self.resend(entry);
                    continue;
                }
                let mut entry = match table.entries.remove(&pk) {
                    Some(entry) => entry,
                    None => continue,
                };
                entry.state = PendingState::Done;
                self.promote_next(&mut table, pk);
                let error = entry.last_error.take().unwrap_or(QueryError::Timeout);
                tracing::debug!(destination = %pk.0, key = ?pk.1, error = %error, "deadline expired");
                self.complete(entry.slot, Err(error));
            }

            // Split groups whose destination no longer has a query in
            // flight can never complete a request.
            {
                let PendingTable {
                    entries,
                    reassembly,
                    ..
                } = &mut *table;
                reassembly.retain(|(dest, _), _| {
                    entries
                        .keys()
                        .any(|(d, k)| d == dest && matches!(k, CorrelationKey::Query(_)))
                });
            }

            let wait = table
                .entries
                .values()
                .map(|entry| entry.deadline.saturating_duration_since(now))
                .min()
                .unwrap_or(Duration::from_millis(500))
                .min(Duration::from_millis(500));
            self.inner.timer_cond.wait_for(&mut table, wait);
        }
    }
}

/// Wait before the next timer action for an entry: the capped backoff
/// while resends remain, the full deadline once they are spent.
fn next_wait(entry: &PendingEntry) -> Duration {
    if entry.retries_left > 0 {
        entry.backoff.min(entry.request.timeout)
    } else {
        entry.request.timeout
    }
}

fn kind_for_header(header: u8) -> Option<ResponseKind> {
    match header {
        query::RESPONSE_INFO => Some(ResponseKind::Info),
        query::RESPONSE_PLAYERS => Some(ResponseKind::Players),
        query::RESPONSE_RULES => Some(ResponseKind::Rules),
        _ => None,
    }
}

/// The lone in-flight query key for a destination, if there is exactly one.
fn sole_query_key(table: &PendingTable, destination: Destination) -> Option<PendingKey> {
    let mut keys = table
        .entries
        .keys()
        .filter(|(dest, key)| *dest == destination && matches!(key, CorrelationKey::Query(_)));
    let first = keys.next().copied();
    match keys.next() {
        None => first,
        Some(_) => None,
    }
}

/// Encode the wire frames for a request. Commands produce two: the
/// command itself and the empty sentinel that delimits the reply.
fn encode_frames(request: &Request) -> Result<Vec<Vec<u8>>> {
    match &request.payload {
        Payload::Info => Ok(vec![query::encode_info()]),
        Payload::Players { challenge } => Ok(vec![query::encode_players(*challenge)]),
        Payload::Rules { challenge } => Ok(vec![query::encode_rules(*challenge)]),
        Payload::Auth { password } => {
            let id = request.correlation_id.ok_or(RconError::BadCorrelation)?;
            Ok(vec![RconPacket::auth(id, password).encode()])
        }
        Payload::Command { body } => {
            let id = request.correlation_id.ok_or(RconError::BadCorrelation)?;
            Ok(vec![
                RconPacket::exec(id, body).encode(),
                RconPacket::sentinel(id).encode(),
            ])
        }
    }
}

impl InboundHandler for SessionManager {
    fn on_datagram(&self, destination: Destination, bytes: Vec<u8>) {
        self.handle_datagram(destination, bytes);
    }

    fn on_frame(&self, destination: Destination, frame: Vec<u8>) {
        self.handle_frame(destination, frame);
    }

    fn on_closed(&self, destination: Destination, error: TransportError) {
        self.handle_closed(destination, error);
    }
}
