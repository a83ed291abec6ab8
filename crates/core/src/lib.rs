//! # srcquery — Source engine server query and RCON client
//!
//! A Rust library for querying game servers over Valve's connectionless
//! UDP query protocol (A2S_INFO, A2S_PLAYER, A2S_RULES) and administering
//! them over the TCP remote-console protocol (RCON).
//!
//! ## Protocol references
//!
//! | Protocol | Topic | How this crate uses it |
//! |----------|-------|----------------------|
//! | Source Query | Server discovery | Request encoding, single/split framing, challenge tokens, bzip2 split payloads |
//! | Source RCON | Remote console | Length-prefixed framing, auth handshake, sentinel-delimited multi-frame replies |
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  QueryClient   — public API, orchestrator     │
//! ├──────────────────────────────────────────────┤
//! │  Session       — pending table, correlation,  │
//! │                  deadlines/retries, workers   │
//! ├──────────────────────────────────────────────┤
//! │  Codec         — query & RCON wire formats,   │
//! │                  split-packet reassembly      │
//! ├──────────────────────────────────────────────┤
//! │  Transport     — UDP shared socket, TCP       │
//! │                  connections, write queues    │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Socket threads decode and match; futures always resolve on a dedicated
//! worker pool. Per destination, sends go out in dispatch order.
//!
//! ## Quick start
//!
//! ```no_run
//! use srcquery::QueryClient;
//!
//! let client = QueryClient::new().unwrap();
//! let addr = "192.0.2.10:27015".parse().unwrap();
//!
//! let info = client.query_info(addr).unwrap().wait().unwrap();
//! println!("{} on {} ({}/{})", info.name, info.map, info.players, info.max_players);
//!
//! if client.rcon_authenticate(addr, "password").unwrap().wait().unwrap() {
//!     let status = client.rcon_execute(addr, "status").unwrap().wait().unwrap();
//!     println!("{status}");
//! }
//! ```
//!
//! ## Crate layout
//!
//! - [`client`] — high-level [`QueryClient`] facade.
//! - [`session`] — pending-request table, correlation, timeouts, workers.
//! - [`codec`] — pure wire codecs for both protocols plus split reassembly.
//! - [`transport`] — socket ownership and per-destination write queues.
//! - [`future`] — single-shot [`ResponseFuture`] completion.
//! - [`config`] — [`ClientConfig`] tuning knobs.
//! - [`error`] — [`QueryError`] and the per-subsystem error enums.

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod future;
pub mod session;
pub mod transport;

pub use client::QueryClient;
pub use codec::{PlayerInfo, Priority, ServerInfo};
pub use config::ClientConfig;
pub use error::{CodecError, QueryError, RconError, Result, TransportError};
pub use future::ResponseFuture;
pub use transport::{Destination, ProtocolKind};
