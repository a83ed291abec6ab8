//! TCP transport for Source RCON traffic.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::codec::Priority;
use crate::codec::rcon::FrameBuffer;
use crate::error::TransportError;

use super::queue::WriteQueue;
use super::{Destination, SharedHandler, WriteSink};

/// Per-destination TCP pool.
///
/// A connection is opened lazily by the destination's writer thread on the
/// first send and kept alive. The paired reader thread reassembles
/// length-prefixed frames and hands them to the session layer. Connection
/// loss (or a framing violation) tears the connection down, notifies the
/// session layer once, and leaves reconnection to the next send.
pub struct TcpPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    conns: Mutex<HashMap<SocketAddr, Arc<Connection>>>,
    handler: SharedHandler,
    queue_depth: usize,
    max_frame_bytes: usize,
    connect_timeout: Duration,
    running: AtomicBool,
}

struct Connection {
    addr: SocketAddr,
    queue: Arc<WriteQueue>,
    /// Kept for out-of-band shutdown; the writer and reader own clones.
    stream: Mutex<Option<TcpStream>>,
    dead: AtomicBool,
}

impl TcpPool {
    pub fn new(
        queue_depth: usize,
        max_frame_bytes: usize,
        connect_timeout: Duration,
        handler: SharedHandler,
    ) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                conns: Mutex::new(HashMap::new()),
                handler,
                queue_depth,
                max_frame_bytes,
                connect_timeout,
                running: AtomicBool::new(true),
            }),
        }
    }

    /// Tear down every connection. Queued frames are dropped.
    pub fn shutdown(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        let conns: Vec<Arc<Connection>> =
            self.inner.conns.lock().drain().map(|(_, c)| c).collect();
        for conn in conns {
            teardown(&self.inner, &conn, TransportError::Closed);
        }
        tracing::debug!("TCP pool shut down");
    }

    fn connection_for(&self, addr: SocketAddr) -> Arc<Connection> {
        let mut conns = self.inner.conns.lock();
        conns
            .entry(addr)
            .or_insert_with(|| {
                let conn = Arc::new(Connection {
                    addr,
                    queue: Arc::new(WriteQueue::new(self.inner.queue_depth)),
                    stream: Mutex::new(None),
                    dead: AtomicBool::new(false),
                });
                let pool = self.inner.clone();
                let writer_conn = conn.clone();
                thread::spawn(move || {
                    writer_loop(&pool, &writer_conn);
                });
                conn
            })
            .clone()
    }
}

impl WriteSink for TcpPool {
    fn send(
        &self,
        destination: &Destination,
        frame: &[u8],
        priority: Priority,
    ) -> Result<(), TransportError> {
        if !self.inner.running.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.connection_for(destination.addr)
            .push(frame.to_vec(), priority)
    }
}

impl Connection {
    fn push(&self, frame: Vec<u8>, priority: Priority) -> Result<(), TransportError> {
        self.queue.push(frame, priority)
    }
}

/// Writer thread: connect lazily, then drain the destination's queue.
fn writer_loop(pool: &Arc<PoolInner>, conn: &Arc<Connection>) {
    let mut stream = match TcpStream::connect_timeout(&conn.addr, pool.connect_timeout) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(addr = %conn.addr, error = %e, "RCON connect failed");
            teardown(pool, conn, TransportError::ConnectFailed);
            return;
        }
    };
    let _ = stream.set_nodelay(true);

    let reader_stream = match stream.try_clone() {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(addr = %conn.addr, error = %e, "stream clone failed");
            teardown(pool, conn, TransportError::Closed);
            return;
        }
    };
    *conn.stream.lock() = stream.try_clone().ok();

    tracing::info!(addr = %conn.addr, "RCON connection opened");

    let reader_pool = pool.clone();
    let reader_conn = conn.clone();
    thread::spawn(move || {
        reader_loop(&reader_pool, &reader_conn, reader_stream);
    });

    while let Some(frame) = conn.queue.pop() {
        if let Err(e) = stream.write_all(&frame) {
            tracing::warn!(addr = %conn.addr, error = %e, "RCON write error");
            teardown(pool, conn, TransportError::Closed);
            return;
        }
    }
    tracing::trace!(addr = %conn.addr, "RCON write loop exited");
}

/// Reader thread: accumulate stream bytes into complete frames.
fn reader_loop(pool: &Arc<PoolInner>, conn: &Arc<Connection>, mut stream: TcpStream) {
    let mut frames = FrameBuffer::new(pool.max_frame_bytes);
    let mut buf = [0u8; 4096];
    let reason = loop {
        match stream.read(&mut buf) {
            Ok(0) => break "connection closed by server",
            Ok(n) => {
                frames.extend(&buf[..n]);
                loop {
                    match frames.next_frame() {
                        Ok(Some(frame)) => {
                            pool.handler.on_frame(Destination::rcon(conn.addr), frame);
                        }
                        Ok(None) => break,
                        Err(e) => {
                            tracing::warn!(addr = %conn.addr, error = %e, "protocol violation");
                            teardown(pool, conn, TransportError::Closed);
                            return;
                        }
                    }
                }
            }
            Err(e) => break if pool.running.load(Ordering::SeqCst) {
                tracing::warn!(addr = %conn.addr, error = %e, "RCON read error");
                "read error"
            } else {
                "pool shut down"
            },
        }
    };
    tracing::info!(addr = %conn.addr, reason, "RCON connection lost");
    teardown(pool, conn, TransportError::Closed);
}

/// Idempotent connection teardown: close the queue, shut the socket,
/// unregister, and notify the session layer exactly once.
fn teardown(pool: &PoolInner, conn: &Arc<Connection>, error: TransportError) {
    if conn.dead.swap(true, Ordering::SeqCst) {
        return;
    }
    conn.queue.close();
    if let Some(stream) = conn.stream.lock().take() {
        let _ = stream.shutdown(Shutdown::Both);
    }
    {
        // Only unregister this connection; a successor for the same address
        // may already have taken its slot.
        let mut conns = pool.conns.lock();
        if conns.get(&conn.addr).is_some_and(|c| Arc::ptr_eq(c, conn)) {
            conns.remove(&conn.addr);
        }
    }
    pool.handler.on_closed(Destination::rcon(conn.addr), error);
}
