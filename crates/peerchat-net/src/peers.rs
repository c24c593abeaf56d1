//! Peer connection and room membership tracking for the libp2p transport.
//!
//! A peer counts as a room member once it subscribed to the room topic and
//! stops being one when it unsubscribes or its last connection closes.

use std::collections::{HashMap, HashSet};

use libp2p::{Multiaddr, PeerId};
use tracing::debug;

/// Information about a connected peer.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub peer_id: PeerId,
    /// The multiaddr through which we are connected.
    pub address: Multiaddr,
    /// Unix epoch millis.
    pub connected_at: u64,
}

#[derive(Debug, Clone, Default)]
pub struct PeerTracker {
    peers: HashMap<PeerId, ConnectionInfo>,
    members: HashSet<PeerId>,
}

impl PeerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_connected(&mut self, peer_id: PeerId, address: Multiaddr) {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        debug!(peer = %peer_id, addr = %address, "Tracking new peer connection");

        self.peers.insert(
            peer_id,
            ConnectionInfo {
                peer_id,
                address,
                connected_at: now,
            },
        );
    }

    /// Forget a peer whose last connection closed. Returns `true` when it was
    /// a room member, i.e. a leave must be reported.
    pub fn on_disconnected(&mut self, peer_id: &PeerId) -> bool {
        if self.peers.remove(peer_id).is_some() {
            debug!(peer = %peer_id, "Removed peer from tracker");
        }
        self.members.remove(peer_id)
    }

    /// Returns `true` when the peer just became a member.
    pub fn on_subscribed(&mut self, peer_id: PeerId) -> bool {
        self.members.insert(peer_id)
    }

    /// Returns `true` when the peer was a member.
    pub fn on_unsubscribed(&mut self, peer_id: &PeerId) -> bool {
        self.members.remove(peer_id)
    }

    pub fn get(&self, peer_id: &PeerId) -> Option<&ConnectionInfo> {
        self.peers.get(peer_id)
    }

    pub fn is_connected(&self, peer_id: &PeerId) -> bool {
        self.peers.contains_key(peer_id)
    }

    pub fn is_member(&self, peer_id: &PeerId) -> bool {
        self.members.contains(peer_id)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Members, e.g. to report them all as gone when leaving.
    pub fn members(&self) -> Vec<PeerId> {
        self.members.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> Multiaddr {
        "/ip4/127.0.0.1/udp/4001/quic-v1".parse().unwrap()
    }

    #[test]
    fn test_connect_disconnect() {
        let mut tracker = PeerTracker::new();
        let peer = PeerId::random();

        assert!(!tracker.is_connected(&peer));
        tracker.on_connected(peer, test_addr());
        assert!(tracker.is_connected(&peer));
        assert_eq!(tracker.peer_count(), 1);

        assert!(!tracker.on_disconnected(&peer));
        assert!(!tracker.is_connected(&peer));
        assert_eq!(tracker.peer_count(), 0);
    }

    #[test]
    fn test_membership_follows_subscription() {
        let mut tracker = PeerTracker::new();
        let peer = PeerId::random();
        tracker.on_connected(peer, test_addr());

        assert!(tracker.on_subscribed(peer));
        assert!(!tracker.on_subscribed(peer));
        assert!(tracker.is_member(&peer));

        assert!(tracker.on_unsubscribed(&peer));
        assert!(!tracker.on_unsubscribed(&peer));
        assert_eq!(tracker.member_count(), 0);
    }

    #[test]
    fn test_disconnect_ends_membership() {
        let mut tracker = PeerTracker::new();
        let p1 = PeerId::random();
        let p2 = PeerId::random();
        tracker.on_connected(p1, test_addr());
        tracker.on_connected(p2, test_addr());
        tracker.on_subscribed(p1);
        tracker.on_subscribed(p2);

        assert!(tracker.on_disconnected(&p1));
        assert_eq!(tracker.members(), vec![p2]);
    }
}
