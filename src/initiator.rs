//! The ranging coordinator
//!
//! The coordinator drives one scheduled poll/ack/range/final exchange with
//! every registered peer per round and computes the distances. It also owns
//! peer discovery: an unconfigured coordinator's POLL doubles as a discovery
//! probe, and any blink reply grows the registry and triggers a fresh
//! distribution of ranging identities.
//!
//! The design is fail-fast: an out-of-order sender, a receive timeout or an
//! implausible distance discards the current round rather than retrying
//! within it. Recovery happens on the next independent round.

use core::num::Wrapping;

use log::{debug, warn};
use rand_core::RngCore;

use crate::configs::{
    RadioConfig, MAX_PEERS, RX_ANT_DLY, RX_TIMEOUT_UUS, RX_TO_TX_DLY_UUS, TX_ANT_DLY,
};
use crate::hal::{RadioEvent, RadioHal, TxMode};
use crate::mac::{ExtendedAddress, Frame, FunctionCode, RangingAssignment, MAX_FRAME_LEN};
use crate::ranging::{DistanceBounds, Exchange};
use crate::registry::Registry;
use crate::session::RangingSession;
use crate::time::{delay_tx_time, Duration, Instant};
use crate::Error;

/// Where the coordinator stands within the current round
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Phase {
    /// No round in progress; the next call sends a POLL
    Idle,
    /// POLL is out, collecting one ACK per target
    AwaitAcks,
    /// RANGE is out, collecting one FINAL per target
    AwaitFinals,
}

/// The coordinator role of the ranging engine
///
/// Owns the registry and session exclusively; the radio interrupt path only
/// ever posts events into the HAL's mailbox.
pub struct Initiator<R: RadioHal, RNG: RngCore> {
    radio: R,
    rng: RNG,
    address: ExtendedAddress,
    registry: Registry,
    session: RangingSession,
    seq: Wrapping<u8>,
    phase: Phase,
    /// Set once identities are distributed; cleared whenever the cell changes
    configured: bool,
    bounds: DistanceBounds,
    poll_tx_time: Instant,
    rx_buffer: [u8; MAX_FRAME_LEN],
}

impl<R, RNG> Initiator<R, RNG>
where
    R: RadioHal,
    RNG: RngCore,
{
    /// Creates a coordinator for the node with the given extended address
    pub fn new(radio: R, rng: RNG, address: ExtendedAddress) -> Self {
        Initiator {
            radio,
            rng,
            address,
            registry: Registry::new(),
            session: RangingSession::new(),
            seq: Wrapping(0),
            phase: Phase::Idle,
            configured: false,
            bounds: DistanceBounds::default(),
            poll_tx_time: Instant::default(),
            rx_buffer: [0; MAX_FRAME_LEN],
        }
    }

    /// Replaces the distance plausibility window
    pub fn set_distance_bounds(&mut self, bounds: DistanceBounds) {
        self.bounds = bounds;
    }

    /// Configures the radio link and antenna delays
    ///
    /// A failure here is fatal; the HAL guarantees a working radio once this
    /// succeeds.
    pub fn start(&mut self, config: &RadioConfig) -> Result<(), Error<R::Error>> {
        self.radio.configure(config)?;
        self.radio.set_antenna_delay(TX_ANT_DLY, RX_ANT_DLY)?;
        Ok(())
    }

    /// The underlying radio
    pub fn radio(&self) -> &R {
        &self.radio
    }

    /// Mutable access to the underlying radio
    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    /// The peers known to this coordinator
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Mutable access to the registry, for seeding a known cell
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// The current session state
    pub fn session(&self) -> &RangingSession {
        &self.session
    }

    /// Applies a known ranging configuration directly
    ///
    /// Skips the discovery/distribution cycle; useful when resuming a cell
    /// whose membership is already established.
    pub fn apply_configuration(&mut self, initiator_uid: u8, own_uid: u8, node_count: u8) {
        self.registry.set_base_uid(initiator_uid);
        self.session.configure(initiator_uid, own_uid, node_count);
        self.phase = Phase::Idle;
        self.configured = true;
    }

    /// Drives the coordinator through one radio event
    ///
    /// Blocks until the radio reports a good reception, a timeout or an
    /// error (bounded by the hardware receive timeout). Returns `Ok(true)`
    /// exactly when a full round completed and fresh distances were written
    /// to the registry; publishing them is the caller's business, at the
    /// caller's cadence.
    pub fn poll_once(&mut self) -> Result<bool, Error<R::Error>> {
        if !self.configured {
            self.configure_cell()?;
        }

        if self.phase == Phase::Idle && self.session.round_position == 0 {
            let frame = Frame::ranging_message(
                self.seq.0,
                FunctionCode::Poll,
                0,
                self.session.own_uid,
            );
            self.radio.write_tx(frame.as_bytes(), 0)?;
            self.radio.enable_receive(Some(RX_TIMEOUT_UUS))?;
            self.radio.start_tx(TxMode::Immediate {
                response_expected: true,
            })?;
            self.phase = Phase::AwaitAcks;
        } else {
            self.radio.enable_receive(Some(RX_TIMEOUT_UUS))?;
        }

        match self.wait_for_rx()? {
            RadioEvent::RxGood { len } => {
                if !self.handle_reception(len)? {
                    return Ok(false);
                }
            }
            _ => {
                // Timeout or receive error: the peer whose turn it was has
                // gone quiet. Evict it (never the initiator itself) and force
                // re-discovery; the round restarts from empty.
                let expected = self.session.node_count as i32 - 1;
                if !self.registry.is_empty() && (self.session.round_position as i32) < expected {
                    if let Some(failed_uid) = self.session.expected_uid() {
                        if failed_uid != self.session.initiator_uid {
                            warn!("peer {} missed its slot, evicting", failed_uid);
                            self.registry.remove(failed_uid);
                            self.configured = false;
                        }
                    }
                }
                self.abandon_round();
                return Ok(false);
            }
        }

        let expected_replies = match self.session.node_count {
            0 | 1 => return Ok(false),
            n => n as usize - 1,
        };

        if self.phase == Phase::AwaitAcks && self.session.round_position == expected_replies {
            self.send_range()?;
            return Ok(false);
        }

        if self.phase == Phase::AwaitFinals && self.session.round_position == expected_replies {
            return self.finish_round();
        }

        Ok(false)
    }

    /// Parses one received frame and records its timestamps
    ///
    /// Returns `Ok(false)` when the frame ended or aborted the round.
    fn handle_reception(&mut self, len: u16) -> Result<bool, Error<R::Error>> {
        let len = len as usize;
        if len > MAX_FRAME_LEN {
            // Oversized frames are discarded without any state change.
            return Ok(false);
        }
        self.radio.read_rx(&mut self.rx_buffer[..len])?;
        let frame = match Frame::parse(&self.rx_buffer[..len]) {
            Some(frame) => frame,
            None => return Ok(false),
        };

        if frame.function_code() == Some(FunctionCode::DiscoveryBlink) {
            if let Some(address) = frame.source_extended() {
                if !self.registry.contains(address) {
                    if self.registry.add(address) {
                        debug!("discovered peer {:x}", address);
                    } else {
                        warn!("registry full, ignoring peer {:x}", address);
                    }
                }
            }
            // Back to discovery accumulation; the round doesn't advance.
            self.configured = false;
            return Ok(false);
        }

        if self.session.expected_uid() != Some(frame.source_uid()) {
            warn!(
                "unexpected sender {} at round position {}",
                frame.source_uid(),
                self.session.round_position
            );
            self.configured = false;
            self.abandon_round();
            return Ok(false);
        }

        let position = self.session.round_position;
        match self.phase {
            Phase::AwaitAcks => {
                // The transmit timestamp register still holds the POLL time
                // at this point.
                self.poll_tx_time = self.radio.tx_timestamp()?;
                let rx_time = self.radio.rx_timestamp()?;
                self.session.round_trips[position] =
                    rx_time.duration_since(self.poll_tx_time).value();
                self.session.ack_reply_delays[position] = frame.reply_delay();
            }
            Phase::AwaitFinals => {
                self.session.final_round_trips[position] = frame.reply_delay();
            }
            Phase::Idle => {
                self.abandon_round();
                return Ok(false);
            }
        }
        self.session.round_position += 1;
        Ok(true)
    }

    /// Schedules and sends the RANGE frame at a fixed turnaround after the
    /// last ACK, then moves on to collecting FINALs
    fn send_range(&mut self) -> Result<(), Error<R::Error>> {
        let last_rx = self.radio.rx_timestamp()?;
        self.radio
            .set_delayed_tx_time(delay_tx_time(last_rx, RX_TO_TX_DLY_UUS))?;
        let frame = Frame::ranging_message(
            self.seq.0,
            FunctionCode::Range,
            0,
            self.session.own_uid,
        );
        self.radio.write_tx(frame.as_bytes(), 0)?;
        let started = self.radio.start_tx(TxMode::Delayed {
            response_expected: true,
        })?;
        if started {
            self.wait_for_tx_done()?;
            self.phase = Phase::AwaitFinals;
            self.session.reset_round();
        } else {
            warn!("delayed RANGE start missed its slot, abandoning round");
            self.abandon_round();
        }
        Ok(())
    }

    /// Computes all distances of the completed round and commits them
    ///
    /// All-or-nothing: a single distance outside the plausibility window
    /// discards the whole round without touching the registry.
    fn finish_round(&mut self) -> Result<bool, Error<R::Error>> {
        let range_tx_time = self.radio.tx_timestamp()?;
        let count = self.session.round_position;
        let mut distances = [0.0f64; MAX_PEERS];

        for i in 0..count {
            // round_trips holds duration values, which are within 40 bits by
            // construction, so this will never panic.
            let round1 = Duration::new(self.session.round_trips[i]).unwrap();
            let ack_rx_time = self.poll_tx_time + round1;
            let exchange = Exchange {
                round1: round1.value(),
                reply1: self.session.ack_reply_delays[i],
                round2: self.session.final_round_trips[i],
                reply2: range_tx_time.duration_since(ack_rx_time).value(),
            };
            let distance_m = exchange.distance_m();
            if !self.bounds.contains(distance_m) {
                warn!("implausible distance {}, dropping round", distance_m);
                self.configured = false;
                self.abandon_round();
                return Ok(false);
            }
            distances[i] = distance_m;
        }

        for i in 0..count {
            self.registry
                .set_distance(self.session.targets[i], distances[i]);
        }
        self.abandon_round();
        self.seq += Wrapping(1);
        debug!("ranging round complete, {} distances updated", count);
        Ok(true)
    }

    /// Resets phase and round position; the next call starts a fresh POLL
    fn abandon_round(&mut self) {
        self.phase = Phase::Idle;
        self.session.reset_round();
    }

    /// Distributes ranging identities, or picks one if the cell is empty
    ///
    /// Every config frame sent also re-derives the coordinator's own session
    /// so new peers are included in the next round immediately.
    fn configure_cell(&mut self) -> Result<(), Error<R::Error>> {
        if self.registry.is_empty() {
            if !self.session.is_configured() {
                // Unconfigured and alone: draw a random session id so peers
                // can tell concurrent would-be initiators apart.
                let own_uid = ((self.rng.next_u32() % 49 + 1) * 4 + 2) as u8;
                self.registry.set_base_uid(own_uid);
                self.session.configure(own_uid, own_uid, 0);
                debug!("assuming initiator id {}", own_uid);
            }
        } else {
            let initiator_uid = self.session.initiator_uid;
            let total_nodes = self.registry.len() as u8 + 1;
            let addresses: heapless::Vec<ExtendedAddress, MAX_PEERS> =
                self.registry.iter().map(|peer| peer.address).collect();

            for (i, &address) in addresses.iter().enumerate() {
                let assigned_uid = initiator_uid + (i as u8 + 1) * 4;
                let assignment = RangingAssignment {
                    initiator_uid,
                    assigned_uid,
                    total_nodes,
                };
                let frame = Frame::ranging_config(self.seq.0, self.address, address, assignment);
                self.seq += Wrapping(1);
                self.radio.write_tx(frame.as_bytes(), 0)?;
                self.radio.start_tx(TxMode::Immediate {
                    response_expected: false,
                })?;

                self.registry.update_uid(address, assigned_uid);
                self.session
                    .configure(initiator_uid, initiator_uid, total_nodes);
                self.phase = Phase::Idle;
            }
            debug!("distributed config to {} peers", addresses.len());
        }
        self.configured = true;
        Ok(())
    }

    /// Blocks until the next reception outcome, skipping transmit events
    fn wait_for_rx(&mut self) -> Result<RadioEvent, Error<R::Error>> {
        loop {
            match nb::block!(self.radio.wait_event()).map_err(Error::Radio)? {
                RadioEvent::TxDone => continue,
                event => return Ok(event),
            }
        }
    }

    /// Blocks until the pending transmission completes
    fn wait_for_tx_done(&mut self) -> Result<(), Error<R::Error>> {
        loop {
            if let RadioEvent::TxDone = nb::block!(self.radio.wait_event()).map_err(Error::Radio)? {
                return Ok(());
            }
        }
    }
}
