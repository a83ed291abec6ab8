use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use rand::RngExt;

use crate::codec::{Payload, PlayerInfo, Priority, ServerInfo};
use crate::config::ClientConfig;
use crate::error::{QueryError, RconError, Result};
use crate::future::{FromResponse, ResponseFuture};
use crate::session::{Request, RconSessions, SessionManager};
use crate::transport::{Destination, InboundHandler, TcpPool, UdpPool};

/// High-level client for Source engine query and RCON traffic.
///
/// Owns the transport pools, the session manager, and the per-destination
/// RCON session table. Every operation returns a
/// [`ResponseFuture`] that resolves exactly once; calls never block on the
/// network themselves (queue backpressure is the lone synchronous failure).
///
/// One client serves any number of servers concurrently; per destination,
/// requests go out in dispatch order.
pub struct QueryClient {
    config: ClientConfig,
    session: SessionManager,
    udp: Arc<UdpPool>,
    tcp: Arc<TcpPool>,
    rcon_sessions: Arc<RconSessions>,
}

impl QueryClient {
    /// Create a client with default configuration.
    pub fn new() -> Result<Self> {
        Self::with_config(ClientConfig::default())
    }

    /// Create a client, bind the shared UDP socket, and start the worker
    /// and timer threads.
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        let rcon_sessions = Arc::new(RconSessions::new());
        let session = SessionManager::new(config.clone(), rcon_sessions.clone());

        let handler: Arc<dyn InboundHandler> = Arc::new(session.clone());
        let udp = Arc::new(UdpPool::bind(config.write_queue_depth, handler.clone())?);
        let tcp = Arc::new(TcpPool::new(
            config.write_queue_depth,
            config.rcon_max_frame_bytes,
            config.read_timeout,
            handler,
        ));
        session.attach_sinks(udp.clone(), tcp.clone());

        Ok(Self {
            config,
            session,
            udp,
            tcp,
            rcon_sessions,
        })
    }

    /// A2S_INFO: name, map, player counts, and server metadata.
    pub fn query_info(&self, addr: SocketAddr) -> Result<ResponseFuture<ServerInfo>> {
        self.dispatch_query(addr, Payload::Info)
    }

    /// A2S_PLAYER: the connected player list. The challenge exchange, if
    /// the server requires one, happens transparently.
    pub fn query_players(&self, addr: SocketAddr) -> Result<ResponseFuture<Vec<PlayerInfo>>> {
        self.dispatch_query(
            addr,
            Payload::Players {
                challenge: crate::codec::query::INITIAL_CHALLENGE,
            },
        )
    }

    /// A2S_RULES: the server's cvar map. Challenge handling as for
    /// [`query_players`](Self::query_players).
    pub fn query_rules(&self, addr: SocketAddr) -> Result<ResponseFuture<HashMap<String, String>>> {
        self.dispatch_query(
            addr,
            Payload::Rules {
                challenge: crate::codec::query::INITIAL_CHALLENGE,
            },
        )
    }

    /// Authenticate the RCON session for `addr`. Resolves `true` when the
    /// server accepts the password, `false` when it rejects it.
    pub fn rcon_authenticate(
        &self,
        addr: SocketAddr,
        password: &str,
    ) -> Result<ResponseFuture<bool>> {
        let destination = Destination::rcon(addr);
        self.rcon_sessions.ensure(destination);
        self.dispatch_rcon(
            destination,
            Payload::Auth {
                password: password.to_string(),
            },
        )
    }

    /// Execute a console command on an authenticated destination. Fails
    /// immediately with [`RconError::NotAuthenticated`] otherwise.
    pub fn rcon_execute(&self, addr: SocketAddr, command: &str) -> Result<ResponseFuture<String>> {
        let destination = Destination::rcon(addr);
        if !self.rcon_sessions.is_authenticated(destination) {
            return Err(RconError::NotAuthenticated.into());
        }
        self.rcon_sessions.touch(destination);
        self.dispatch_rcon(
            destination,
            Payload::Command {
                body: command.to_string(),
            },
        )
    }

    /// Cancel everything in flight and stop all threads. Called
    /// automatically on drop.
    pub fn shutdown(&self) {
        self.session.shutdown();
        self.tcp.shutdown();
        self.udp.shutdown();
    }

    fn dispatch_query<T: FromResponse>(
        &self,
        addr: SocketAddr,
        payload: Payload,
    ) -> Result<ResponseFuture<T>> {
        self.dispatch(Request {
            destination: Destination::query(addr),
            payload,
            priority: Priority::Normal,
            timeout: self.config.read_timeout,
            correlation_id: None,
        })
    }

    fn dispatch_rcon<T: FromResponse>(
        &self,
        destination: Destination,
        payload: Payload,
    ) -> Result<ResponseFuture<T>> {
        // Random non-negative ids; re-roll the rare in-flight collision.
        let mut attempts = 0;
        loop {
            let id = rand::rng().random_range(1..i32::MAX);
            let result = self.dispatch(Request {
                destination,
                payload: payload.clone(),
                priority: Priority::Normal,
                timeout: self.config.read_timeout,
                correlation_id: Some(id),
            });
            match result {
                Err(QueryError::Rcon(RconError::BadCorrelation)) if attempts < 8 => {
                    attempts += 1;
                }
                other => return other,
            }
        }
    }

    fn dispatch<T: FromResponse>(&self, request: Request) -> Result<ResponseFuture<T>> {
        let destination = request.destination;
        let key = request
            .correlation_key()
            .ok_or(RconError::BadCorrelation)?;
        let slot = self.session.dispatch(request)?;

        let session = self.session.clone();
        let cancel_slot = slot.clone();
        Ok(ResponseFuture::new(
            slot,
            Box::new(move || session.cancel(destination, key, &cancel_slot)),
        ))
    }
}

impl Drop for QueryClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}
