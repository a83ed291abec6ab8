use std::time::Duration;

/// Default per-request deadline.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(5000);

/// Default retry budget for UDP queries (RCON requests are never retried).
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Default initial resend backoff.
pub const DEFAULT_BACKOFF_INITIAL: Duration = Duration::from_millis(250);

/// Default resend backoff cap.
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_millis(2000);

/// Default per-destination write queue depth.
pub const DEFAULT_WRITE_QUEUE_DEPTH: usize = 256;

/// Default RCON frame size ceiling (soft protocol limit).
pub const DEFAULT_RCON_MAX_FRAME_BYTES: usize = 4096;

/// Client-level configuration shared by the transports and the session
/// manager.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Per-request deadline. For UDP this is also the final wait after the
    /// retry budget is spent.
    pub read_timeout: Duration,
    /// How many times an unanswered UDP query is re-sent before the final
    /// deadline wait. Ignored for RCON.
    pub max_retries: u32,
    /// First resend delay; doubles on every resend.
    pub backoff_initial: Duration,
    /// Resend delay ceiling.
    pub backoff_max: Duration,
    /// Number of completion worker threads. Futures are always resolved on
    /// these workers, never on a socket thread.
    pub worker_pool_size: usize,
    /// High-water mark of each destination's write queue. A dispatch that
    /// would exceed it fails synchronously with
    /// [`TransportError::Backpressure`](crate::error::TransportError::Backpressure).
    pub write_queue_depth: usize,
    /// Largest accepted RCON frame. Frames above this (or below the 10-byte
    /// protocol minimum) close the connection.
    pub rcon_max_frame_bytes: usize,
    /// Recognized bodies of the server's reply to the end-of-response
    /// sentinel. The exact bytes vary across server builds, so the list is
    /// configurable; an empty body is always recognized.
    pub rcon_terminator_pads: Vec<Vec<u8>>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_initial: DEFAULT_BACKOFF_INITIAL,
            backoff_max: DEFAULT_BACKOFF_MAX,
            worker_pool_size: std::thread::available_parallelism()
                .map(std::num::NonZero::get)
                .unwrap_or(4),
            write_queue_depth: DEFAULT_WRITE_QUEUE_DEPTH,
            rcon_max_frame_bytes: DEFAULT_RCON_MAX_FRAME_BYTES,
            rcon_terminator_pads: vec![
                b"\x00\x01\x00\x00".to_vec(),
                b"\x00\x01\x00\x00\x00\x00".to_vec(),
            ],
        }
    }
}

impl ClientConfig {
    /// Whether `body` is a recognized reply to the end-of-response sentinel.
    pub fn is_terminator_pad(&self, body: &[u8]) -> bool {
        body.is_empty() || self.rcon_terminator_pads.iter().any(|p| p == body)
    }
}
