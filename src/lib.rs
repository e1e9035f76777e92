//! Multi-node double-sided two-way ranging over UWB radios
//!
//! This crate implements the protocol logic of a small ranging cell: one
//! coordinator polls up to six responders per round and computes the
//! distance to each from the round-trip and reply-delay times of a
//! poll/ack/range/final exchange. Peer discovery, identity assignment and
//! telemetry rendering are included; register-level radio access is behind
//! the [`hal::RadioHal`] trait so the engine runs unchanged against hardware
//! or the scripted [`mock::MockRadio`].

#![cfg_attr(not(test), no_std)]
#![deny(missing_docs)]

pub mod configs;
pub mod hal;
pub mod initiator;
pub mod mac;
pub mod mock;
pub mod ranging;
pub mod registry;
pub mod responder;
pub mod session;
pub mod telemetry;
pub mod time;

pub use crate::configs::RadioConfig;
pub use crate::hal::{Mailbox, RadioEvent, RadioHal, TxMode};
pub use crate::initiator::Initiator;
pub use crate::mac::ExtendedAddress;
pub use crate::ranging::DistanceBounds;
pub use crate::registry::Registry;
pub use crate::responder::Responder;
pub use crate::time::{Duration, Instant, TIME_MAX};

/// An engine-level error
///
/// The engine itself is total over valid and invalid frames; the only thing
/// that can fail is the radio below it.
#[derive(Debug)]
pub enum Error<E> {
    /// The radio driver reported an error
    Radio(E),
}

impl<E> From<E> for Error<E> {
    fn from(error: E) -> Self {
        Error::Radio(error)
    }
}
