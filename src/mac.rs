//! The fixed-layout MAC frame codec
//!
//! Frames are an IEEE 802.15.4 subset with a mode-dependent header: a two
//! byte frame control field, a sequence number, the two byte network id, then
//! destination and source addresses whose lengths (0, 2 or 8 bytes) are
//! encoded in the frame control's addressing-mode bits. A one byte function
//! code follows the header, then the variable payload and a two byte FCS
//! placeholder filled in by the radio.
//!
//! Frames are immutable values: builders and [`Frame::parse`] produce them,
//! getters derive every field purely from the stored bytes. There is no
//! cached state that could fall out of sync with the buffer.

use core::convert::TryFrom;
use core::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// The maximum length of a frame, in bytes
pub const MAX_FRAME_LEN: usize = 127;

/// The fixed length of a short-addressed ranging frame
pub const RANGING_FRAME_LEN: usize = 16;

/// The network id carried by every frame
pub const NETWORK_ID: u16 = 0xDECA;

/// The short broadcast address
pub const BROADCAST_SHORT: u16 = 0xFFFF;

/// Length of the trailing FCS placeholder
pub const FCS_LEN: usize = 2;

const SEQ_IDX: usize = 2;
const PAN_IDX: usize = 3;
const ADDR_IDX: usize = 5;
const SRC_UID_IDX: usize = 7;
/// Offset of the 4-byte reply-delay timestamp in ACK and FINAL frames
const REPLY_DELAY_IDX: usize = 10;
const REPLY_DELAY_LEN: usize = 4;

/// A globally unique 64-bit node address
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct ExtendedAddress(pub u64);

impl fmt::LowerHex for ExtendedAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// The addressing mode of a frame's destination or source
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum AddressMode {
    /// No address present
    None = 0,
    /// Reserved by the standard
    Reserved = 1,
    /// 2-byte session-local address
    Short = 2,
    /// 8-byte globally unique address
    Extended = 3,
}

impl AddressMode {
    /// The length of an address in this mode, in bytes
    fn len(self) -> usize {
        match self {
            AddressMode::Short => 2,
            AddressMode::Extended => 8,
            _ => 0,
        }
    }
}

/// The function code that routes a received frame
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum FunctionCode {
    /// Assigns a ranging identity to a discovered node
    RangingConfig = 0x20,
    /// An unconfigured node asking for peers
    DiscoveryBroadcast = 0xD1,
    /// A node announcing its extended address
    DiscoveryBlink = 0xD2,
    /// Starts a ranging round
    Poll = 0xE2,
    /// First-phase reply, carries the poll reply delay
    Ack = 0xE3,
    /// Starts the second phase of a round
    Range = 0xE4,
    /// Second-phase reply, carries the responder round-trip
    Final = 0xE5,
    /// Unconditionally resets responder phase state
    Reset = 0xE6,
}

/// The payload of a ranging-config frame
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RangingAssignment {
    /// The session id of the initiator distributing the config
    pub initiator_uid: u8,
    /// The session id assigned to the addressed node
    pub assigned_uid: u8,
    /// The total number of nodes in the cell, the initiator included
    pub total_nodes: u8,
}

/// An owned MAC frame
#[derive(Clone, Copy)]
pub struct Frame {
    buf: [u8; MAX_FRAME_LEN],
    len: usize,
}

impl Frame {
    fn empty(len: usize) -> Self {
        Frame {
            buf: [0; MAX_FRAME_LEN],
            len,
        }
    }

    /// Builds the steady-state poll/ack/range/final/reset frame
    ///
    /// Uses short addressing for both sides; the source short address carries
    /// the sender's session id in its low byte.
    pub fn ranging_message(seq: u8, function: FunctionCode, dest_short: u8, source_uid: u8) -> Self {
        let mut frame = Frame::empty(RANGING_FRAME_LEN);
        frame.buf[0] = 0x41;
        frame.buf[1] = 0x88; // dest short, source short
        frame.buf[SEQ_IDX] = seq;
        frame.buf[PAN_IDX..PAN_IDX + 2].copy_from_slice(&NETWORK_ID.to_le_bytes());
        frame.buf[ADDR_IDX] = dest_short;
        frame.buf[SRC_UID_IDX] = source_uid;
        frame.buf[9] = function.into();
        frame
    }

    /// Builds a discovery blink announcing `source` to `dest`
    ///
    /// `dest` may be the zero address for an undirected announcement.
    pub fn discovery_blink(seq: u8, dest: ExtendedAddress, source: ExtendedAddress) -> Self {
        let mut frame = Frame::empty(0);
        frame.buf[0] = 0x41;
        frame.buf[1] = 0xCC; // dest extended, source extended
        frame.buf[SEQ_IDX] = seq;
        frame.buf[PAN_IDX..PAN_IDX + 2].copy_from_slice(&NETWORK_ID.to_le_bytes());
        frame.buf[5..13].copy_from_slice(&dest.0.to_le_bytes());
        frame.buf[13..21].copy_from_slice(&source.0.to_le_bytes());
        frame.buf[21] = FunctionCode::DiscoveryBlink.into();
        frame.len = 21 + 1 + FCS_LEN;
        frame
    }

    /// Builds a discovery broadcast from an unconfigured node
    pub fn discovery_broadcast(seq: u8, source: ExtendedAddress) -> Self {
        let mut frame = Frame::empty(0);
        frame.buf[0] = 0x41;
        frame.buf[1] = 0xC8; // dest short, source extended
        frame.buf[SEQ_IDX] = seq;
        frame.buf[PAN_IDX..PAN_IDX + 2].copy_from_slice(&NETWORK_ID.to_le_bytes());
        frame.buf[5..7].copy_from_slice(&BROADCAST_SHORT.to_le_bytes());
        frame.buf[7..15].copy_from_slice(&source.0.to_le_bytes());
        frame.buf[15] = FunctionCode::DiscoveryBroadcast.into();
        frame.len = 15 + 1 + FCS_LEN;
        frame
    }

    /// Builds the unicast control frame distributing a ranging identity
    pub fn ranging_config(
        seq: u8,
        source: ExtendedAddress,
        dest: ExtendedAddress,
        assignment: RangingAssignment,
    ) -> Self {
        let mut frame = Frame::empty(0);
        frame.buf[0] = 0x41;
        frame.buf[1] = 0xCC; // dest extended, source extended
        frame.buf[SEQ_IDX] = seq;
        frame.buf[PAN_IDX..PAN_IDX + 2].copy_from_slice(&NETWORK_ID.to_le_bytes());
        frame.buf[5..13].copy_from_slice(&dest.0.to_le_bytes());
        frame.buf[13..21].copy_from_slice(&source.0.to_le_bytes());
        frame.buf[21] = FunctionCode::RangingConfig.into();
        frame.buf[22] = assignment.initiator_uid;
        frame.buf[23] = assignment.assigned_uid;
        frame.buf[24] = assignment.total_nodes;
        frame.len = 21 + 4;
        frame
    }

    /// Copies received bytes into an owned frame
    ///
    /// Returns `None` if the input exceeds the maximum frame size; oversized
    /// input is discarded without any state change.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() > MAX_FRAME_LEN {
            return None;
        }
        let mut frame = Frame::empty(bytes.len());
        frame.buf[..bytes.len()].copy_from_slice(bytes);
        Some(frame)
    }

    /// The frame length, FCS placeholder included where the builder counts it
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the frame contains no bytes
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The raw frame bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// The sequence number
    pub fn sequence_number(&self) -> u8 {
        self.buf[SEQ_IDX]
    }

    /// The destination addressing mode
    pub fn dest_addr_mode(&self) -> AddressMode {
        // A 2-bit field always maps onto the 4 variants.
        AddressMode::try_from((self.buf[1] >> 2) & 0x03).unwrap()
    }

    /// The source addressing mode
    pub fn source_addr_mode(&self) -> AddressMode {
        AddressMode::try_from((self.buf[1] >> 6) & 0x03).unwrap()
    }

    /// The header length implied by the two addressing-mode bits
    ///
    /// `None` if either side uses a mode without an address; such frames are
    /// not part of this protocol. For the supported modes the length is
    /// 5 + dest-address-length + source-address-length, and the function code
    /// sits immediately after it.
    pub fn header_len(&self) -> Option<usize> {
        let dest_len = match self.dest_addr_mode() {
            AddressMode::Short | AddressMode::Extended => self.dest_addr_mode().len(),
            _ => return None,
        };
        let source_len = match self.source_addr_mode() {
            AddressMode::Short | AddressMode::Extended => self.source_addr_mode().len(),
            _ => return None,
        };
        Some(5 + dest_len + source_len)
    }

    /// The function code, if the frame carries a known one
    pub fn function_code(&self) -> Option<FunctionCode> {
        let header_len = self.header_len()?;
        if self.len <= header_len {
            return None;
        }
        FunctionCode::try_from(self.buf[header_len]).ok()
    }

    /// The source session id of a short-addressed frame, 0 otherwise
    pub fn source_uid(&self) -> u8 {
        if self.source_addr_mode() == AddressMode::Short {
            self.buf[SRC_UID_IDX]
        } else {
            0
        }
    }

    /// The full 2-byte source short address, 0 otherwise
    pub fn source_short_address(&self) -> u16 {
        if self.source_addr_mode() == AddressMode::Short {
            let offset = ADDR_IDX + self.dest_addr_mode().len();
            u16::from_le_bytes([self.buf[offset], self.buf[offset + 1]])
        } else {
            0
        }
    }

    /// The extended source address, if the source uses extended addressing
    pub fn source_extended(&self) -> Option<ExtendedAddress> {
        if self.source_addr_mode() == AddressMode::Extended {
            let offset = ADDR_IDX + self.dest_addr_mode().len();
            let mut bytes = [0; 8];
            bytes.copy_from_slice(&self.buf[offset..offset + 8]);
            Some(ExtendedAddress(u64::from_le_bytes(bytes)))
        } else {
            None
        }
    }

    /// The extended destination address, if extended addressing is used
    pub fn destination_extended(&self) -> Option<ExtendedAddress> {
        if self.dest_addr_mode() == AddressMode::Extended {
            let mut bytes = [0; 8];
            bytes.copy_from_slice(&self.buf[ADDR_IDX..ADDR_IDX + 8]);
            Some(ExtendedAddress(u64::from_le_bytes(bytes)))
        } else {
            None
        }
    }

    /// The 4-byte little-endian reply-delay timestamp of an ACK/FINAL frame
    pub fn reply_delay(&self) -> u32 {
        let mut bytes = [0; REPLY_DELAY_LEN];
        bytes.copy_from_slice(&self.buf[REPLY_DELAY_IDX..REPLY_DELAY_IDX + REPLY_DELAY_LEN]);
        u32::from_le_bytes(bytes)
    }

    /// Embeds a reply-delay timestamp into an ACK/FINAL frame
    ///
    /// Only the low 4 bytes of the value fit on the wire; reply delays are
    /// bounded by the turnaround constants and never exceed them.
    pub fn set_reply_delay(&mut self, delay: u64) {
        self.buf[REPLY_DELAY_IDX..REPLY_DELAY_IDX + REPLY_DELAY_LEN]
            .copy_from_slice(&(delay as u32).to_le_bytes());
    }

    /// Extracts the identity assignment from a ranging-config frame
    ///
    /// Fails if the function code doesn't match or the declared length
    /// doesn't cover the 4-byte payload.
    pub fn parse_ranging_config(&self) -> Option<RangingAssignment> {
        if self.function_code() != Some(FunctionCode::RangingConfig) {
            return None;
        }
        let header_len = self.header_len()?;
        if self.len < header_len + 4 {
            return None;
        }
        let payload = header_len + 1;
        Some(RangingAssignment {
            initiator_uid: self.buf[payload],
            assigned_uid: self.buf[payload + 1],
            total_nodes: self.buf[payload + 2],
        })
    }
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for Frame {}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Frame")
            .field("len", &self.len)
            .field("seq", &self.sequence_number())
            .field("function", &self.function_code())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranging_message_round_trip() {
        let frame = Frame::ranging_message(7, FunctionCode::Poll, 0, 42);

        assert_eq!(frame.len(), RANGING_FRAME_LEN);
        assert_eq!(frame.sequence_number(), 7);
        assert_eq!(frame.dest_addr_mode(), AddressMode::Short);
        assert_eq!(frame.source_addr_mode(), AddressMode::Short);
        assert_eq!(frame.header_len(), Some(9));
        assert_eq!(frame.function_code(), Some(FunctionCode::Poll));
        assert_eq!(frame.source_uid(), 42);
        assert_eq!(frame.source_short_address(), 42);

        let parsed = Frame::parse(frame.as_bytes()).unwrap();
        assert_eq!(parsed, frame);
        assert_eq!(parsed.source_uid(), 42);
    }

    #[test]
    fn discovery_blink_round_trip() {
        let dest = ExtendedAddress(0x1122_3344_5566_7788);
        let source = ExtendedAddress(0xAABB_CCDD_EEFF_0011);
        let frame = Frame::discovery_blink(3, dest, source);

        assert_eq!(frame.len(), 24);
        assert_eq!(frame.dest_addr_mode(), AddressMode::Extended);
        assert_eq!(frame.source_addr_mode(), AddressMode::Extended);
        assert_eq!(frame.header_len(), Some(21));
        assert_eq!(frame.function_code(), Some(FunctionCode::DiscoveryBlink));

        let parsed = Frame::parse(frame.as_bytes()).unwrap();
        assert_eq!(parsed.sequence_number(), 3);
        assert_eq!(parsed.destination_extended(), Some(dest));
        assert_eq!(parsed.source_extended(), Some(source));
        // Short-address getters are inert on extended frames.
        assert_eq!(parsed.source_uid(), 0);
        assert_eq!(parsed.source_short_address(), 0);
    }

    #[test]
    fn discovery_broadcast_round_trip() {
        let source = ExtendedAddress(0x0102_0304_0506_0708);
        let frame = Frame::discovery_broadcast(9, source);

        assert_eq!(frame.len(), 18);
        assert_eq!(frame.dest_addr_mode(), AddressMode::Short);
        assert_eq!(frame.source_addr_mode(), AddressMode::Extended);
        assert_eq!(frame.header_len(), Some(15));
        assert_eq!(
            frame.function_code(),
            Some(FunctionCode::DiscoveryBroadcast)
        );
        assert_eq!(frame.source_extended(), Some(source));
        assert_eq!(frame.destination_extended(), None);
        assert_eq!(&frame.as_bytes()[5..7], &[0xFF, 0xFF]);
    }

    #[test]
    fn ranging_config_round_trip() {
        let source = ExtendedAddress(0xDEAD_BEEF_0000_0001);
        let dest = ExtendedAddress(0xDEAD_BEEF_0000_0002);
        let assignment = RangingAssignment {
            initiator_uid: 4,
            assigned_uid: 8,
            total_nodes: 3,
        };
        let frame = Frame::ranging_config(1, source, dest, assignment);

        assert_eq!(frame.len(), 25);
        assert_eq!(frame.function_code(), Some(FunctionCode::RangingConfig));
        assert_eq!(frame.destination_extended(), Some(dest));
        assert_eq!(frame.source_extended(), Some(source));

        let parsed = Frame::parse(frame.as_bytes()).unwrap();
        assert_eq!(parsed.parse_ranging_config(), Some(assignment));
    }

    #[test]
    fn header_len_is_pure_in_the_mode_bits() {
        // Frame control byte 1 encodes dest mode in bits 2-3 and source mode
        // in bits 6-7.
        let combos = [
            (AddressMode::Short, AddressMode::Short, 9),
            (AddressMode::Short, AddressMode::Extended, 15),
            (AddressMode::Extended, AddressMode::Short, 15),
            (AddressMode::Extended, AddressMode::Extended, 21),
        ];
        for &(dest, source, expected) in combos.iter() {
            let fc1 = (u8::from(dest) << 2) | (u8::from(source) << 6);
            let bytes = [0x41, fc1, 0, 0xCA, 0xDE];
            let frame = Frame::parse(&bytes).unwrap();
            assert_eq!(frame.header_len(), Some(expected));
        }
    }

    #[test]
    fn frames_without_addresses_have_no_header() {
        let frame = Frame::parse(&[0x41, 0x00, 0, 0xCA, 0xDE]).unwrap();
        assert_eq!(frame.header_len(), None);
        assert_eq!(frame.function_code(), None);
    }

    #[test]
    fn oversized_input_is_discarded() {
        let bytes = [0u8; MAX_FRAME_LEN + 1];
        assert!(Frame::parse(&bytes).is_none());
        assert!(Frame::parse(&bytes[..MAX_FRAME_LEN]).is_some());
    }

    #[test]
    fn reply_delay_round_trip() {
        let mut frame = Frame::ranging_message(0, FunctionCode::Ack, 0, 8);
        frame.set_reply_delay(0x0123_4567);
        assert_eq!(frame.reply_delay(), 0x0123_4567);

        // Only the low 32 bits fit on the wire.
        frame.set_reply_delay(0xFF_0000_0001);
        assert_eq!(frame.reply_delay(), 1);
    }

    #[test]
    fn ranging_config_parse_rejects_wrong_function_code() {
        let frame = Frame::ranging_message(0, FunctionCode::Poll, 0, 4);
        assert_eq!(frame.parse_ranging_config(), None);
    }

    #[test]
    fn ranging_config_parse_rejects_truncated_payload() {
        let source = ExtendedAddress(1);
        let dest = ExtendedAddress(2);
        let assignment = RangingAssignment {
            initiator_uid: 4,
            assigned_uid: 8,
            total_nodes: 3,
        };
        let frame = Frame::ranging_config(0, source, dest, assignment);
        // Truncate the declared length below header + payload.
        let truncated = Frame::parse(&frame.as_bytes()[..23]).unwrap();
        assert_eq!(truncated.parse_ranging_config(), None);
    }

    #[test]
    fn unknown_function_codes_parse_to_none() {
        let mut bytes = [0u8; RANGING_FRAME_LEN];
        bytes[..RANGING_FRAME_LEN]
            .copy_from_slice(Frame::ranging_message(0, FunctionCode::Poll, 0, 4).as_bytes());
        bytes[9] = 0x7F;
        let frame = Frame::parse(&bytes).unwrap();
        assert_eq!(frame.function_code(), None);
    }
}
