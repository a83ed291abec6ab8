//! Socket ownership and per-destination write scheduling.
//!
//! One pool exists per protocol kind: [`UdpPool`] shares a single bound
//! socket across every query destination; [`TcpPool`] keeps one lazily
//! opened connection per RCON destination. Both route inbound bytes to an
//! [`InboundHandler`] (the session layer) and accept outbound frames
//! through [`WriteSink`]; the session layer never touches a socket.
//!
//! Each destination owns a bounded write queue drained by a dedicated
//! writer thread, so writes to one destination are ordered while writes
//! across destinations interleave freely. A full queue rejects the send
//! with [`TransportError::Backpressure`] instead of buffering.

pub mod queue;
pub mod tcp;
pub mod udp;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::codec::Priority;
use crate::error::TransportError;

pub use tcp::TcpPool;
pub use udp::UdpPool;

/// Poll interval at which socket loops re-check the shutdown flag.
pub(crate) const POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(50);

/// Protocol kind tag; part of a destination's identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolKind {
    /// Source Query over UDP.
    Query,
    /// Source RCON over TCP.
    Rcon,
    /// Master-server listing. Identity tag only: no transport is wired
    /// behind it.
    Master,
}

/// A game server endpoint: address plus protocol kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Destination {
    pub addr: SocketAddr,
    pub kind: ProtocolKind,
}

impl Destination {
    pub fn query(addr: SocketAddr) -> Self {
        Self {
            addr,
            kind: ProtocolKind::Query,
        }
    }

    pub fn rcon(addr: SocketAddr) -> Self {
        Self {
            addr,
            kind: ProtocolKind::Rcon,
        }
    }

    pub fn master(addr: SocketAddr) -> Self {
        Self {
            addr,
            kind: ProtocolKind::Master,
        }
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}/{}", self.kind, self.addr)
    }
}

/// Write API keyed by destination: the only transport surface the
/// session layer holds.
pub trait WriteSink: Send + Sync {
    /// Enqueue one frame for the destination. Fails synchronously with
    /// [`TransportError::Backpressure`] when the destination's queue is at
    /// its high-water mark.
    fn send(
        &self,
        destination: &Destination,
        frame: &[u8],
        priority: Priority,
    ) -> Result<(), TransportError>;
}

/// Inbound callbacks from the transport pools. Implementations must not
/// block socket threads; completions are re-posted to the worker pool.
pub trait InboundHandler: Send + Sync {
    /// A UDP datagram arrived from `destination`.
    fn on_datagram(&self, destination: Destination, bytes: Vec<u8>);

    /// A complete length-prefixed RCON frame (without its size prefix)
    /// arrived from `destination`.
    fn on_frame(&self, destination: Destination, frame: Vec<u8>);

    /// The TCP connection to `destination` is gone. `error` is
    /// [`TransportError::ConnectFailed`] when it never opened, otherwise
    /// [`TransportError::Closed`].
    fn on_closed(&self, destination: Destination, error: TransportError);
}

/// Shared handle type for the session layer's inbound side.
pub type SharedHandler = Arc<dyn InboundHandler>;
