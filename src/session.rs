//! Per-round ranging session state
//!
//! A session is created when a node receives (or, as coordinator, assigns
//! itself) a ranging identity. It fixes the node's wait position and the
//! deterministic order of exchange targets for every round, and holds the
//! per-target timestamp arrays the coordinator fills in while a round runs.
//!
//! A session is reset to empty on any protocol violation or peer timeout;
//! the next discovery/config cycle builds a fresh one.

use heapless::Vec;

use crate::configs::MAX_PEERS;

/// The ranging identity and round state of a node
#[derive(Debug, Default)]
pub struct RangingSession {
    /// This node's session id (0 = unconfigured)
    pub own_uid: u8,
    /// The session id of the round-driving initiator (0 = unconfigured)
    pub initiator_uid: u8,
    /// The total number of nodes in the cell, the initiator included
    pub node_count: u8,
    /// This node's index in the per-round reply order
    pub wait_position: u8,
    /// The ids this node exchanges with each round, in polling order
    pub targets: Vec<u8, MAX_PEERS>,
    /// The current position within the round
    pub round_position: usize,
    /// Per-target first round-trip times (coordinator side), in device ticks
    pub round_trips: [u64; MAX_PEERS],
    /// Per-target reply delays from ACK frames, in device ticks
    pub ack_reply_delays: [u32; MAX_PEERS],
    /// Per-target responder round-trips from FINAL frames, in device ticks
    pub final_round_trips: [u32; MAX_PEERS],
}

impl RangingSession {
    /// Creates an empty, unconfigured session
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a ranging identity and derives wait position and target order
    pub fn configure(&mut self, initiator_uid: u8, own_uid: u8, node_count: u8) {
        self.own_uid = own_uid;
        self.initiator_uid = initiator_uid;
        self.node_count = node_count;
        self.wait_position = if own_uid > initiator_uid {
            (own_uid - initiator_uid) / 4
        } else {
            0
        };
        self.set_targets();
        self.round_position = 0;
    }

    /// Whether this node has a ranging identity
    pub fn is_configured(&self) -> bool {
        self.initiator_uid != 0
    }

    /// Forgets the ranging identity entirely
    ///
    /// Used when a protocol violation makes the current cell membership
    /// untrustworthy; the node falls back to answering discovery.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Resets the position within the current round, keeping the identity
    pub fn reset_round(&mut self) {
        self.round_position = 0;
    }

    /// The expected sender id at the current round position, if any
    pub fn expected_uid(&self) -> Option<u8> {
        self.targets.get(self.round_position).copied()
    }

    /// Derives the ordered target list
    ///
    /// The initiator itself comes first, but only when this node is not the
    /// initiator; all other ids follow in ascending stride order, skipping
    /// this node's own id. This fixes the same deterministic polling sequence
    /// on every node of the cell.
    fn set_targets(&mut self) {
        self.targets.clear();
        if self.node_count <= 1 {
            return;
        }
        if self.own_uid != self.initiator_uid {
            // Capacity is node_count - 1 <= MAX_PEERS, so pushes can't fail.
            let _ = self.targets.push(self.initiator_uid);
        }
        for i in 1..self.node_count {
            let responder_uid = self.initiator_uid + i * 4;
            if responder_uid != self.own_uid && self.targets.len() < (self.node_count - 1) as usize
            {
                let _ = self.targets.push(responder_uid);
            }
        }
    }
}
