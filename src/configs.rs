//! Link configuration and protocol constants
//!
//! This module houses the datastructures that describe how the radio link is
//! set up, plus the timing and sizing constants of the ranging protocol. The
//! `RadioConfig` is handed to the radio driver once at startup; the protocol
//! constants are shared between the coordinator and responder state machines.

/// The maximum number of nodes in a ranging cell, the local node included
pub const MAX_NODES: usize = 7;

/// The maximum number of peers a node can range with
pub const MAX_PEERS: usize = MAX_NODES - 1;

/// TX antenna delay, in device time units
pub const TX_ANT_DLY: u16 = 16385;

/// RX antenna delay, in device time units
pub const RX_ANT_DLY: u16 = 16385;

/// Delay from the end of a transmission to re-enabling the receiver, in UWB µs
pub const TX_TO_RX_DLY_UUS: u32 = 100;

/// Turnaround delay from a reception to a scheduled reply, in UWB µs
pub const RX_TO_TX_DLY_UUS: u32 = 3200;

/// Lower edge of the discovery-reply jitter window, in UWB µs
///
/// A responder answering a foreign POLL delays its blink by a random amount
/// in `[DISCOVERY_JITTER_MIN_UUS, RX_TO_TX_DLY_UUS)` so that several
/// unconfigured nodes answering the same POLL don't collide.
pub const DISCOVERY_JITTER_MIN_UUS: u32 = 800;

/// Receive timeout armed by the coordinator while awaiting a reply, in UWB µs
pub const RX_TIMEOUT_UUS: u32 = 800_000;

/// Minimum interval between telemetry publications, in milliseconds
pub const PUBLISH_INTERVAL_MS: u32 = 200;

/// A UWB channel
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum UwbChannel {
    /// Channel 1
    Channel1 = 1,
    /// Channel 2
    Channel2 = 2,
    /// Channel 3
    Channel3 = 3,
    /// Channel 4
    Channel4 = 4,
    /// Channel 5
    Channel5 = 5,
    /// Channel 7
    Channel7 = 7,
}

impl Default for UwbChannel {
    fn default() -> Self {
        UwbChannel::Channel5
    }
}

/// The bitrate at which a frame is transmitted
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BitRate {
    /// 110 kilobits per second
    Kbps110 = 0b00,
    /// 850 kilobits per second
    Kbps850 = 0b01,
    /// 6.8 megabits per second
    Kbps6800 = 0b10,
}

impl Default for BitRate {
    fn default() -> Self {
        BitRate::Kbps6800
    }
}

/// The length of the preamble
///
/// Longer preambles improve reception quality and thus range, at the cost of
/// longer transmission times.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PreambleLength {
    /// 64 symbols of preamble
    Symbols64 = 0b0100,
    /// 128 symbols of preamble
    Symbols128 = 0b0101,
    /// 256 symbols of preamble
    Symbols256 = 0b0110,
    /// 512 symbols of preamble
    Symbols512 = 0b0111,
    /// 1024 symbols of preamble
    Symbols1024 = 0b1000,
}

impl Default for PreambleLength {
    fn default() -> Self {
        PreambleLength::Symbols128
    }
}

/// The SFD sequence used to delimit a frame
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SfdSequence {
    /// The standard IEEE 8-symbol SFD
    Ieee = 0,
    /// The vendor-defined 8-symbol SFD
    Decawave = 1,
    /// The vendor-defined 16-symbol SFD
    DecawaveExtended = 2,
}

impl Default for SfdSequence {
    fn default() -> Self {
        SfdSequence::Decawave
    }
}

/// PHY header mode
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum HeaderMode {
    /// Standard header, frames up to 127 bytes
    Standard,
    /// Extended header, long frames (unused by this protocol)
    Extended,
}

impl Default for HeaderMode {
    fn default() -> Self {
        HeaderMode::Standard
    }
}

/// Radio link configuration, handed to the driver once at startup
///
/// All nodes of a ranging cell must share the same link configuration.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RadioConfig {
    /// The channel to transmit and receive at
    pub channel: UwbChannel,
    /// The preamble length
    pub preamble_length: PreambleLength,
    /// The data bitrate
    pub bitrate: BitRate,
    /// The SFD sequence
    pub sfd_sequence: SfdSequence,
    /// The PHY header mode
    pub header_mode: HeaderMode,
}

impl Default for RadioConfig {
    fn default() -> Self {
        RadioConfig {
            channel: Default::default(),
            preamble_length: Default::default(),
            bitrate: Default::default(),
            sfd_sequence: Default::default(),
            header_mode: Default::default(),
        }
    }
}
