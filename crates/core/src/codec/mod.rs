//! Pure, stateless frame codecs.
//!
//! Two wire protocols share this module:
//!
//! - [`query`] — Source Query over UDP: single/split outer framing, a
//!   one-byte response header, little-endian fields, NUL-terminated strings.
//! - [`rcon`] — Source RCON over TCP: length-prefixed frames with a
//!   caller-chosen correlation id.
//! - [`split`] — reassembly of split Source Query responses, including
//!   bzip2 decompression and CRC validation.
//!
//! Requests and responses are tagged sums discriminated here; nothing in
//! this module owns sockets or mutable session state.

pub mod query;
pub mod rcon;
pub mod split;

use std::collections::HashMap;

pub use query::{PlayerInfo, ServerInfo};

/// Outbound send priority. Within one destination, higher priorities drain
/// first; sends of equal priority are FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Priority {
    High,
    Normal,
    Low,
}

/// Request payload variants across both protocols.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A2S_INFO.
    Info,
    /// A2S_PLAYER with the current challenge token.
    Players { challenge: u32 },
    /// A2S_RULES with the current challenge token.
    Rules { challenge: u32 },
    /// RCON SERVERDATA_AUTH.
    Auth { password: String },
    /// RCON SERVERDATA_EXECCOMMAND.
    Command { body: String },
}

impl Payload {
    /// The response kind a UDP query of this payload resolves to.
    /// `None` for RCON payloads, which correlate by id instead.
    pub fn response_kind(&self) -> Option<ResponseKind> {
        match self {
            Payload::Info => Some(ResponseKind::Info),
            Payload::Players { .. } => Some(ResponseKind::Players),
            Payload::Rules { .. } => Some(ResponseKind::Rules),
            Payload::Auth { .. } | Payload::Command { .. } => None,
        }
    }
}

/// Expected UDP response kind, used as the correlation key for query
/// requests since the connectionless protocol carries no transport-level id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseKind {
    Info,
    Players,
    Rules,
}

/// Decoded response variants across both protocols.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Info(ServerInfo),
    Players(Vec<PlayerInfo>),
    Rules(HashMap<String, String>),
    /// Anti-spoofing token; consumed by the session layer, never surfaced
    /// to callers.
    Challenge(u32),
    /// RCON authentication outcome.
    AuthGranted(bool),
    /// Concatenated RCON command output.
    CommandOutput(String),
}

impl Response {
    /// The correlation kind of a decoded UDP response, if it is one.
    pub fn kind(&self) -> Option<ResponseKind> {
        match self {
            Response::Info(_) => Some(ResponseKind::Info),
            Response::Players(_) => Some(ResponseKind::Players),
            Response::Rules(_) => Some(ResponseKind::Rules),
            _ => None,
        }
    }
}
