//! Error types for the query/RCON client library.
//!
//! Errors are grouped by the subsystem that produces them:
//!
//! - **Transport**: [`TransportError`] — socket failures, write-queue
//!   backpressure, connection loss.
//! - **Codec**: [`CodecError`] — malformed frames, failed reassembly,
//!   checksum/decompression failures.
//! - **RCON**: [`RconError`] — authentication and correlation failures.
//! - **Timing**: [`QueryError::Timeout`], [`QueryError::Cancelled`] —
//!   terminal outcomes owned by the session layer.
//!
//! [`QueryError`] is the single error surfaced through
//! [`ResponseFuture`](crate::future::ResponseFuture).

/// Transport-level failure.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The destination's bounded write queue is at its high-water mark.
    /// Surfaced synchronously at dispatch; nothing is buffered.
    #[error("write queue full for destination")]
    Backpressure,

    /// The TCP connection to the destination was lost. In-flight RCON
    /// requests on that destination resolve with this error; a later call
    /// reconnects lazily.
    #[error("connection closed")]
    Closed,

    /// Opening the TCP connection failed.
    #[error("connect failed")]
    ConnectFailed,

    /// Underlying socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Frame encode/decode failure.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Input ended before a complete field could be read.
    #[error("short read while decoding")]
    ShortRead,

    /// The outer framing header was neither single-packet nor split-packet.
    #[error("invalid framing")]
    Framing,

    /// The response-header byte does not map to a known response kind.
    #[error("unknown response header {0:#04x}")]
    UnknownHeader(u8),

    /// Split-packet fragments disagreed on group metadata, or a fragment
    /// slot was filled twice with different bytes. The whole group is
    /// discarded.
    #[error("split packet reassembly failed")]
    Reassembly,

    /// The CRC32 of the decompressed payload did not match the value
    /// carried in the first fragment.
    #[error("payload checksum mismatch")]
    Checksum,

    /// bzip2 inflation failed, or the output length did not match the
    /// advertised decompressed size.
    #[error("payload decompression failed")]
    Decompress,
}

/// RCON protocol failure.
#[derive(Debug, thiserror::Error)]
pub enum RconError {
    /// A command was issued on a destination whose session is not in the
    /// authenticated state.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The server answered an AUTH request with id -1.
    #[error("authentication rejected")]
    AuthRejected,

    /// Request correlation failed: the caller-chosen id collides with one
    /// already in flight on the same destination, or a response did not
    /// match the operation that solicited it.
    #[error("request correlation failed")]
    BadCorrelation,

    /// A length-prefixed frame violated the size bounds (below the 10-byte
    /// minimum or above the configured maximum). Fatal for the connection.
    #[error("frame size out of bounds")]
    Framing,
}

/// Terminal error carried by a [`ResponseFuture`](crate::future::ResponseFuture).
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Rcon(#[from] RconError),

    /// The request deadline expired (after the retry schedule, for UDP).
    #[error("request timed out")]
    Timeout,

    /// The future was cancelled before a response arrived.
    #[error("request cancelled")]
    Cancelled,
}

/// Convenience alias for `Result<T, QueryError>`.
pub type Result<T> = std::result::Result<T, QueryError>;
