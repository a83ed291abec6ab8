//! UDP transport for Source Query traffic.

use std::collections::HashMap;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use parking_lot::Mutex;

use crate::codec::Priority;
use crate::error::TransportError;

use super::queue::WriteQueue;
use super::{Destination, POLL_INTERVAL, SharedHandler, WriteSink};

/// Shared-socket UDP pool.
///
/// Binds a single ephemeral socket (`0.0.0.0:0`). One reader thread routes
/// every inbound datagram to the session layer keyed by source address;
/// each destination gets its own bounded write queue and writer thread, so
/// sends to one server stay ordered while servers never block each other.
pub struct UdpPool {
    socket: Arc<UdpSocket>,
    queues: Mutex<HashMap<SocketAddr, Arc<WriteQueue>>>,
    queue_depth: usize,
    running: Arc<AtomicBool>,
}

impl UdpPool {
    /// Bind the shared socket and start the reader thread.
    pub fn bind(queue_depth: usize, handler: SharedHandler) -> Result<Self, TransportError> {
        let socket = Arc::new(UdpSocket::bind("0.0.0.0:0")?);
        socket.set_read_timeout(Some(POLL_INTERVAL))?;

        let running = Arc::new(AtomicBool::new(true));
        let reader_socket = socket.clone();
        let reader_running = running.clone();
        thread::spawn(move || {
            read_loop(&reader_socket, &*handler, &reader_running);
        });

        tracing::debug!(local = %socket.local_addr()?, "UDP pool bound");
        Ok(Self {
            socket,
            queues: Mutex::new(HashMap::new()),
            queue_depth,
            running,
        })
    }

    /// Local address of the shared socket.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }

    /// Stop the reader and all writer threads. Queued frames are dropped.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        let queues = std::mem::take(&mut *self.queues.lock());
        for queue in queues.values() {
            queue.close();
        }
        tracing::debug!("UDP pool shut down");
    }

    fn queue_for(&self, addr: SocketAddr) -> Arc<WriteQueue> {
        let mut queues = self.queues.lock();
        queues
            .entry(addr)
            .or_insert_with(|| {
                let queue = Arc::new(WriteQueue::new(self.queue_depth));
                let socket = self.socket.clone();
                let writer_queue = queue.clone();
                thread::spawn(move || {
                    write_loop(&socket, addr, &writer_queue);
                });
                queue
            })
            .clone()
    }
}

impl WriteSink for UdpPool {
    fn send(
        &self,
        destination: &Destination,
        frame: &[u8],
        priority: Priority,
    ) -> Result<(), TransportError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.queue_for(destination.addr).push(frame.to_vec(), priority)
    }
}

/// Reader loop: route each datagram to the handler, keyed by peer address.
/// Checks the shutdown flag between reads via the socket's poll timeout.
fn read_loop(socket: &UdpSocket, handler: &dyn super::InboundHandler, running: &AtomicBool) {
    let mut buf = [0u8; 65535];
    while running.load(Ordering::SeqCst) {
        match socket.recv_from(&mut buf) {
            Ok((len, peer)) => {
                tracing::trace!(%peer, len, "datagram received");
                handler.on_datagram(Destination::query(peer), buf[..len].to_vec());
            }
            Err(ref e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    tracing::warn!(error = %e, "UDP read error");
                }
            }
        }
    }
    tracing::debug!("UDP read loop exited");
}

fn write_loop(socket: &UdpSocket, addr: SocketAddr, queue: &WriteQueue) {
    while let Some(frame) = queue.pop() {
        if let Err(e) = socket.send_to(&frame, addr) {
            tracing::warn!(%addr, error = %e, "UDP send error");
        }
    }
    tracing::trace!(%addr, "UDP write loop exited");
}
