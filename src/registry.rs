//! Connection registry
//!
//! The server's live set of open connections, owned by the `ServerControl`
//! actor. Each entry couples the connection's identity with the unbounded
//! outbound queue feeding its write loop.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{AppError, SendError};
use crate::types::{ConnectionId, Identity};

/// Display name for peers that have not logged in yet
const ANONYMOUS: &str = "anonymous";

/// One registered connection
///
/// Holds the identity (unset until `#login`) and the sender half of the
/// connection's outbound line queue. Dropping the sender terminates the
/// session's write loop.
#[derive(Debug)]
pub struct Peer {
    /// Identity established via `#login`, if any
    pub identity: Option<Identity>,
    outbound: mpsc::UnboundedSender<String>,
}

impl Peer {
    /// Create an anonymous peer with the given outbound queue
    pub fn new(outbound: mpsc::UnboundedSender<String>) -> Self {
        Self {
            identity: None,
            outbound,
        }
    }

    /// Queue a line for delivery to this peer.
    ///
    /// Returns an error if the session's write loop is gone.
    pub fn send(&self, line: String) -> Result<(), SendError> {
        self.outbound
            .send(line)
            .map_err(|_| SendError::ChannelClosed)
    }

    /// The name this peer appears under in broadcasts
    pub fn display_name(&self) -> &str {
        self.identity.as_ref().map(Identity::as_str).unwrap_or(ANONYMOUS)
    }
}

/// The live set of open connections
///
/// A connection appears here iff it is currently open and accepted.
/// All mutation happens on the control actor, which serializes it against
/// broadcast iteration.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    peers: HashMap<ConnectionId, Peer>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            peers: HashMap::new(),
        }
    }

    /// Register a newly accepted connection.
    ///
    /// Fails if the handle is already present, which indicates a transport
    /// bug rather than a normal race.
    pub fn add(&mut self, id: ConnectionId, peer: Peer) -> Result<(), AppError> {
        if self.peers.contains_key(&id) {
            return Err(AppError::DuplicateRegistration(id));
        }
        self.peers.insert(id, peer);
        Ok(())
    }

    /// Deregister a connection.
    ///
    /// Absent handles are a no-op (`None`), tolerating the race between
    /// transport-driven closure and an explicit close.
    pub fn remove(&mut self, id: ConnectionId) -> Option<Peer> {
        self.peers.remove(&id)
    }

    /// Whether the handle is currently registered
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.peers.contains_key(&id)
    }

    /// Set or overwrite a connection's identity.
    ///
    /// Returns false for unknown handles. Never validated against other
    /// connections; duplicate identities are allowed.
    pub fn set_identity(&mut self, id: ConnectionId, identity: Identity) -> bool {
        match self.peers.get_mut(&id) {
            Some(peer) => {
                peer.identity = Some(identity);
                true
            }
            None => false,
        }
    }

    /// The broadcast name for a handle (`anonymous` before login)
    pub fn display_name(&self, id: ConnectionId) -> &str {
        self.peers.get(&id).map(Peer::display_name).unwrap_or(ANONYMOUS)
    }

    /// Deliver a line to every registered connection.
    ///
    /// See [`broadcast_except`](Self::broadcast_except).
    pub fn broadcast(&mut self, line: &str) -> Vec<ConnectionId> {
        self.broadcast_except(line, None)
    }

    /// Deliver a line to every registered connection except `excluded`.
    ///
    /// A peer whose queue is gone is removed on the spot; delivery to the
    /// remaining peers always continues. Returns the handles removed this
    /// way so the caller can emit disconnect notifications.
    pub fn broadcast_except(
        &mut self,
        line: &str,
        excluded: Option<ConnectionId>,
    ) -> Vec<ConnectionId> {
        let mut dead = Vec::new();
        for (id, peer) in &self.peers {
            if Some(*id) == excluded {
                continue;
            }
            if peer.send(line.to_string()).is_err() {
                dead.push(*id);
            }
        }
        for id in &dead {
            self.peers.remove(id);
        }
        dead
    }

    /// Drain every peer, dropping their outbound queues.
    ///
    /// Each session's write loop ends when its queue closes, tearing the
    /// connection down.
    pub fn clear(&mut self) {
        let drained = self.peers.len();
        self.peers.clear();
        debug!("registry cleared, {} connection(s) dropped", drained);
    }

    /// Number of registered connections
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Whether no connections are registered
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> (Peer, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Peer::new(tx), rx)
    }

    #[test]
    fn test_add_and_duplicate() {
        let mut registry = ConnectionRegistry::new();
        let id = ConnectionId::new();
        let (first, _rx1) = peer();
        let (second, _rx2) = peer();

        assert!(registry.add(id, first).is_ok());
        assert!(matches!(
            registry.add(id, second),
            Err(AppError::DuplicateRegistration(_))
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut registry = ConnectionRegistry::new();
        assert!(registry.remove(ConnectionId::new()).is_none());
    }

    #[test]
    fn test_set_identity_and_display_name() {
        let mut registry = ConnectionRegistry::new();
        let id = ConnectionId::new();
        let (entry, _rx) = peer();
        registry.add(id, entry).unwrap();

        assert_eq!(registry.display_name(id), "anonymous");
        assert!(registry.set_identity(id, Identity::sanitize("alice").unwrap()));
        assert_eq!(registry.display_name(id), "alice");

        // Overwrite is allowed
        assert!(registry.set_identity(id, Identity::sanitize("alice2").unwrap()));
        assert_eq!(registry.display_name(id), "alice2");

        assert!(!registry.set_identity(ConnectionId::new(), Identity::sanitize("x").unwrap()));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_peer() {
        let mut registry = ConnectionRegistry::new();
        let mut receivers = Vec::new();
        for _ in 0..3 {
            let id = ConnectionId::new();
            let (entry, rx) = peer();
            registry.add(id, entry).unwrap();
            receivers.push(rx);
        }

        assert!(registry.broadcast("hello").is_empty());
        for rx in &mut receivers {
            assert_eq!(rx.recv().await.unwrap(), "hello");
        }
    }

    #[tokio::test]
    async fn test_broadcast_except_skips_excluded() {
        let mut registry = ConnectionRegistry::new();
        let sender_id = ConnectionId::new();
        let (sender_entry, mut sender_rx) = peer();
        registry.add(sender_id, sender_entry).unwrap();

        let other_id = ConnectionId::new();
        let (other_entry, mut other_rx) = peer();
        registry.add(other_id, other_entry).unwrap();

        registry.broadcast_except("psst", Some(sender_id));

        assert_eq!(other_rx.recv().await.unwrap(), "psst");
        assert!(sender_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_partial_failure_isolation() {
        let mut registry = ConnectionRegistry::new();

        let mut healthy = Vec::new();
        for _ in 0..4 {
            let id = ConnectionId::new();
            let (entry, rx) = peer();
            registry.add(id, entry).unwrap();
            healthy.push(rx);
        }

        // One peer whose session has already died
        let dead_id = ConnectionId::new();
        let (dead_entry, dead_rx) = peer();
        registry.add(dead_id, dead_entry).unwrap();
        drop(dead_rx);

        let removed = registry.broadcast("still here?");
        assert_eq!(removed, vec![dead_id]);
        assert_eq!(registry.len(), 4);
        assert!(!registry.contains(dead_id));

        // Every healthy peer still got the line
        for rx in &mut healthy {
            assert_eq!(rx.recv().await.unwrap(), "still here?");
        }

        // The dead peer is removed exactly once
        assert!(registry.broadcast("again").is_empty());
    }

    #[tokio::test]
    async fn test_clear_drops_outbound_queues() {
        let mut registry = ConnectionRegistry::new();
        let id = ConnectionId::new();
        let (entry, mut rx) = peer();
        registry.add(id, entry).unwrap();

        registry.clear();
        assert!(registry.is_empty());
        // The write loop observes the closed queue
        assert!(rx.recv().await.is_none());
    }
}
