use crate::channel::Channel;
use crate::error::{Result, TransportError};
use crate::session::{Session, TickOutcome};
use dashmap::DashMap;
use log::{debug, info};
use std::net::SocketAddr;
use std::time::Instant;

/// The set of active sessions, keyed by peer address. The periodic tick
/// walks every session and removes the ones that report themselves done.
pub struct SessionRegistry<C: Channel> {
    sessions: DashMap<SocketAddr, Session<C>>,
}

impl<C: Channel> SessionRegistry<C> {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    pub fn insert(&self, peer: SocketAddr, session: Session<C>) {
        info!("session registered for {}", peer);
        self.sessions.insert(peer, session);
    }

    pub fn contains(&self, peer: SocketAddr) -> bool {
        self.sessions.contains_key(&peer)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Removes a session outright (substrate-initiated teardown).
    pub fn remove(&self, peer: SocketAddr) -> bool {
        self.sessions.remove(&peer).is_some()
    }

    /// Routes an inbound datagram to its peer's session.
    pub fn on_segment(&self, peer: SocketAddr, raw: &[u8], now: Instant) -> Result<()> {
        let mut session = self
            .sessions
            .get_mut(&peer)
            .ok_or(TransportError::SessionNotFound(peer))?;
        session.on_segment(raw, now);
        Ok(())
    }

    /// Lets every session pull newly available application data.
    pub fn on_readable(&self, now: Instant) {
        for mut entry in self.sessions.iter_mut() {
            while entry.value_mut().on_readable(now) {}
        }
    }

    /// Retries delivery on every session after the output sink drained.
    pub fn on_writable(&self) {
        for mut entry in self.sessions.iter_mut() {
            entry.value_mut().on_writable();
        }
    }

    /// One timer pass over all sessions. Returns the peers whose sessions
    /// were torn down.
    pub fn tick(&self, now: Instant) -> Vec<SocketAddr> {
        let mut destroyed = Vec::new();
        self.sessions.retain(|peer, session| {
            match session.tick(now) {
                TickOutcome::Alive => true,
                TickOutcome::Destroy => {
                    debug!("tearing down session for {}", peer);
                    destroyed.push(*peer);
                    false
                }
            }
        });
        destroyed
    }
}

impl<C: Channel> Default for SessionRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}
