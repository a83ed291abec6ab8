//! Per-destination RCON session records.
//!
//! A record is created lazily on the first authentication attempt and
//! deleted when the destination's connection goes away. The table is the
//! shared context between the facade (which gates `rcon_execute` on it)
//! and the session manager (which flips it on AUTH_RESPONSE frames).

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;

use crate::transport::Destination;

/// Authentication state for one RCON destination.
#[derive(Debug, Clone)]
pub struct RconSession {
    pub authenticated: bool,
    /// Correlation id of the accepted AUTH request.
    pub authenticated_id: Option<u32>,
    pub last_used: Instant,
}

/// Thread-safe registry of RCON sessions.
#[derive(Default)]
pub struct RconSessions {
    sessions: Mutex<HashMap<Destination, RconSession>>,
}

impl RconSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the record for a destination if it does not exist yet.
    pub fn ensure(&self, destination: Destination) {
        self.sessions
            .lock()
            .entry(destination)
            .or_insert_with(|| RconSession {
                authenticated: false,
                authenticated_id: None,
                last_used: Instant::now(),
            });
    }

    pub fn is_authenticated(&self, destination: Destination) -> bool {
        self.sessions
            .lock()
            .get(&destination)
            .is_some_and(|s| s.authenticated)
    }

    /// Record a granted authentication.
    pub fn mark_authenticated(&self, destination: Destination, id: u32) {
        let mut sessions = self.sessions.lock();
        let session = sessions.entry(destination).or_insert_with(|| RconSession {
            authenticated: false,
            authenticated_id: None,
            last_used: Instant::now(),
        });
        session.authenticated = true;
        session.authenticated_id = Some(id);
        session.last_used = Instant::now();
        tracing::info!(%destination, id, "RCON session authenticated");
    }

    /// Record a rejected authentication; the record stays, unauthenticated.
    pub fn mark_rejected(&self, destination: Destination) {
        if let Some(session) = self.sessions.lock().get_mut(&destination) {
            session.authenticated = false;
            session.authenticated_id = None;
        }
        tracing::warn!(%destination, "RCON authentication rejected");
    }

    /// Refresh the last-used timestamp.
    pub fn touch(&self, destination: Destination) {
        if let Some(session) = self.sessions.lock().get_mut(&destination) {
            session.last_used = Instant::now();
        }
    }

    /// Drop the record; called when the destination's connection closes.
    pub fn remove(&self, destination: Destination) {
        if self.sessions.lock().remove(&destination).is_some() {
            tracing::debug!(%destination, "RCON session invalidated");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use super::*;

    fn dest() -> Destination {
        Destination::rcon(SocketAddr::from(([127, 0, 0, 1], 27015)))
    }

    #[test]
    fn lazy_creation_starts_unauthenticated() {
        let sessions = RconSessions::new();
        assert!(!sessions.is_authenticated(dest()));
        sessions.ensure(dest());
        assert!(!sessions.is_authenticated(dest()));
    }

    #[test]
    fn authentication_lifecycle() {
        let sessions = RconSessions::new();
        sessions.ensure(dest());
        sessions.mark_authenticated(dest(), 42);
        assert!(sessions.is_authenticated(dest()));

        sessions.remove(dest());
        assert!(!sessions.is_authenticated(dest()));
    }

    #[test]
    fn rejection_clears_authentication() {
        let sessions = RconSessions::new();
        sessions.mark_authenticated(dest(), 7);
        sessions.mark_rejected(dest());
        assert!(!sessions.is_authenticated(dest()));
    }
}
