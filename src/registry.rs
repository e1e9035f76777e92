//! The registry of known ranging peers
//!
//! The coordinator accumulates discovered peers here and assigns each one its
//! session id. Ids follow a fixed stride encoding, `base + (slot + 1) * 4`,
//! which doubles as the deterministic per-round polling order. The registry
//! is exclusively owned by the task running the active role; nothing touches
//! it from interrupt context.

use heapless::Vec;

use crate::configs::MAX_PEERS;
use crate::mac::ExtendedAddress;

/// A known ranging peer
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Peer {
    /// The peer's globally unique extended address
    pub address: ExtendedAddress,
    /// The session id assigned to the peer
    pub uid: u8,
    /// The last measured distance to the peer, in meters
    pub distance_m: f64,
}

/// An ordered, bounded collection of known peers
///
/// Uniqueness is on the extended address. Ids are never reused while the
/// owning address remains registered; removal is the only path that frees an
/// id slot for later reassignment by [`Registry::add`].
#[derive(Debug, Default)]
pub struct Registry {
    peers: Vec<Peer, MAX_PEERS>,
    base_uid: u8,
}

impl Registry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Registry {
            peers: Vec::new(),
            base_uid: 0,
        }
    }

    /// Sets the id the stride encoding is based on (the initiator's own id)
    pub fn set_base_uid(&mut self, base_uid: u8) {
        self.base_uid = base_uid;
    }

    /// Whether a peer with the given address is registered
    pub fn contains(&self, address: ExtendedAddress) -> bool {
        self.peers.iter().any(|peer| peer.address == address)
    }

    /// Registers a new peer and assigns it the next stride id
    ///
    /// Returns `false` without any change if the registry is at capacity.
    pub fn add(&mut self, address: ExtendedAddress) -> bool {
        let uid = self.base_uid + (self.peers.len() as u8 + 1) * 4;
        self.peers
            .push(Peer {
                address,
                uid,
                distance_m: 0.0,
            })
            .is_ok()
    }

    /// Removes the peer with the given id, compacting the remaining entries
    ///
    /// Relative order is preserved; the freed id becomes assignable again.
    /// Unknown ids are a no-op.
    pub fn remove(&mut self, uid: u8) {
        if let Some(index) = self.peers.iter().position(|peer| peer.uid == uid) {
            // heapless::Vec::remove shifts the tail down, preserving order.
            self.peers.remove(index);
        }
    }

    /// Reassigns the id of the peer with the given address
    pub fn update_uid(&mut self, address: ExtendedAddress, uid: u8) -> bool {
        for peer in self.peers.iter_mut() {
            if peer.address == address {
                peer.uid = uid;
                return true;
            }
        }
        false
    }

    /// Records a measured distance for the peer with the given id
    ///
    /// Unknown ids are a no-op.
    pub fn set_distance(&mut self, uid: u8, distance_m: f64) {
        for peer in self.peers.iter_mut() {
            if peer.uid == uid {
                peer.distance_m = distance_m;
                return;
            }
        }
    }

    /// Looks up a peer by id
    pub fn peer_by_uid(&self, uid: u8) -> Option<&Peer> {
        self.peers.iter().find(|peer| peer.uid == uid)
    }

    /// The number of registered peers
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Whether no peers are registered
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Iterates the peers in registration (and polling) order
    pub fn iter(&self) -> impl Iterator<Item = &Peer> {
        self.peers.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(value: u64) -> ExtendedAddress {
        ExtendedAddress(value)
    }

    #[test]
    fn add_assigns_strictly_increasing_stride_ids() {
        let mut registry = Registry::new();
        registry.set_base_uid(4);

        for i in 0..MAX_PEERS as u64 {
            assert!(registry.add(addr(0x100 + i)));
        }
        let uids: heapless::Vec<u8, MAX_PEERS> = registry.iter().map(|peer| peer.uid).collect();
        for (i, &uid) in uids.iter().enumerate() {
            assert_eq!(uid, 4 + (i as u8 + 1) * 4);
        }
    }

    #[test]
    fn add_fails_closed_at_capacity() {
        let mut registry = Registry::new();
        for i in 0..MAX_PEERS as u64 {
            assert!(registry.add(addr(i)));
        }
        assert!(!registry.add(addr(0xFFFF)));
        assert_eq!(registry.len(), MAX_PEERS);
    }

    #[test]
    fn remove_compacts_preserving_order_and_frees_the_id() {
        let mut registry = Registry::new();
        registry.set_base_uid(4);
        registry.add(addr(1)); // uid 8
        registry.add(addr(2)); // uid 12
        registry.add(addr(3)); // uid 16

        registry.remove(12);
        assert_eq!(registry.len(), 2);
        let uids: heapless::Vec<u8, MAX_PEERS> = registry.iter().map(|peer| peer.uid).collect();
        assert_eq!(&uids[..], &[8, 16]);
        assert!(!registry.contains(addr(2)));

        // With one entry left after dropping the tail, the next stride id is
        // 4 + 2 * 4 = 12: the freed id becomes assignable again.
        registry.remove(16);
        assert!(registry.add(addr(4)));
        assert_eq!(registry.iter().last().unwrap().uid, 12);
    }

    #[test]
    fn remove_of_unknown_uid_is_a_no_op() {
        let mut registry = Registry::new();
        registry.add(addr(1));
        registry.remove(99);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn set_distance_ignores_unknown_ids() {
        let mut registry = Registry::new();
        registry.set_base_uid(4);
        registry.add(addr(1)); // uid 8

        registry.set_distance(8, 2.5);
        assert_eq!(registry.peer_by_uid(8).unwrap().distance_m, 2.5);

        registry.set_distance(99, 7.0);
        assert_eq!(registry.peer_by_uid(8).unwrap().distance_m, 2.5);
    }

    #[test]
    fn update_uid_rekeys_an_existing_address() {
        let mut registry = Registry::new();
        registry.add(addr(1));
        assert!(registry.update_uid(addr(1), 20));
        assert_eq!(registry.peer_by_uid(20).unwrap().address, addr(1));
        assert!(!registry.update_uid(addr(9), 20));
    }
}
