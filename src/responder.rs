//! The responder role of the ranging engine
//!
//! A responder is event-driven: it sits in receive, classifies each incoming
//! frame and schedules at most one delayed reply. Unconfigured (or when
//! polled by a foreign initiator) it answers POLL and RANGE frames with a
//! randomly jittered discovery blink; once a config frame assigns it a
//! ranging identity it takes its fixed slot in every round, replying with an
//! ACK after the POLL phase and a FINAL after the RANGE phase.
//!
//! The ACK's reply-delay payload must hold the exact transmit timestamp the
//! radio will produce, which is only knowable because delayed transmissions
//! start at a programmed instant. See [`crate::time::programmed_tx_timestamp`].

use core::num::Wrapping;

use log::{debug, warn};
use rand_core::RngCore;

use crate::configs::{
    RadioConfig, DISCOVERY_JITTER_MIN_UUS, RX_ANT_DLY, RX_TO_TX_DLY_UUS, TX_ANT_DLY,
};
use crate::hal::{RadioEvent, RadioHal, TxMode};
use crate::mac::{ExtendedAddress, Frame, FunctionCode, FCS_LEN, MAX_FRAME_LEN};
use crate::session::RangingSession;
use crate::time::{delay_tx_time, programmed_tx_timestamp, Instant};
use crate::Error;

/// Which half of the round the responder is collecting
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Phase {
    /// Counting receptions of the POLL phase
    WaitPoll,
    /// Counting receptions of the RANGE phase
    WaitRange,
}

/// A ranging responder bound to one radio
pub struct Responder<R: RadioHal, RNG: RngCore> {
    radio: R,
    rng: RNG,
    address: ExtendedAddress,
    session: RangingSession,
    seq: Wrapping<u8>,
    phase: Phase,
    /// A delayed reply has been started and its TxDone is still pending
    tx_in_flight: bool,
    poll_rx_time: Instant,
    range_rx_time: Instant,
    rx_buffer: [u8; MAX_FRAME_LEN],
}

impl<R, RNG> Responder<R, RNG>
where
    R: RadioHal,
    RNG: RngCore,
{
    /// Creates a responder for the node with the given extended address
    pub fn new(radio: R, rng: RNG, address: ExtendedAddress) -> Self {
        Responder {
            radio,
            rng,
            address,
            session: RangingSession::new(),
            seq: Wrapping(0),
            phase: Phase::WaitPoll,
            tx_in_flight: false,
            poll_rx_time: Instant::default(),
            range_rx_time: Instant::default(),
            rx_buffer: [0; MAX_FRAME_LEN],
        }
    }

    /// Configures the radio link and enters receive
    ///
    /// A responder listens without a hardware timeout; its rounds are paced
    /// entirely by the coordinator.
    pub fn start(&mut self, config: &RadioConfig) -> Result<(), Error<R::Error>> {
        self.radio.configure(config)?;
        self.radio.set_antenna_delay(TX_ANT_DLY, RX_ANT_DLY)?;
        self.radio.enable_receive(None)?;
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

    /// The current session state
    pub fn session(&self) -> &RangingSession {
        &self.session
    }

    /// Drives the responder through one radio event
    ///
    /// Blocks until the radio reports something. This never completes a
    /// distance on its own; a responder only feeds the coordinator's rounds.
    pub fn poll_once(&mut self) -> Result<(), Error<R::Error>> {
        let event = nb::block!(self.radio.wait_event()).map_err(Error::Radio)?;
        if self.tx_in_flight && event != RadioEvent::TxDone {
            // A scheduled reply is still on its way out; nothing else may
            // disturb the round until its completion arrives.
            return Ok(());
        }
        match event {
            RadioEvent::TxDone => {
                self.tx_in_flight = false;
                self.radio.enable_receive(None)?;
            }
            RadioEvent::RxGood { len } => {
                self.handle_frame(len)?;
                // While a delayed reply is in flight the receiver stays off;
                // it is re-armed when the transmission completes.
                if !self.tx_in_flight {
                    self.radio.enable_receive(None)?;
                }
            }
            RadioEvent::RxTimeout | RadioEvent::RxError => {
                self.reset_exchange();
                self.radio.enable_receive(None)?;
            }
        }
        Ok(())
    }

    /// Classifies one received frame and advances the round
    fn handle_frame(&mut self, len: u16) -> Result<(), Error<R::Error>> {
        let len = len as usize;
        if len > MAX_FRAME_LEN {
            // Oversized frames are discarded without any state change.
            return Ok(());
        }
        self.radio.read_rx(&mut self.rx_buffer[..len])?;
        let frame = match Frame::parse(&self.rx_buffer[..len]) {
            Some(frame) => frame,
            None => return Ok(()),
        };
        let function = match frame.function_code() {
            Some(function) => function,
            None => return Ok(()),
        };

        match function {
            FunctionCode::Poll | FunctionCode::Range
                if frame.source_uid() != self.session.initiator_uid =>
            {
                // A round frame from an initiator that isn't ours. Announce
                // ourselves so its coordinator can pick us up.
                return self.send_discovery_blink(frame.sequence_number());
            }
            FunctionCode::RangingConfig => {
                if frame.destination_extended() == Some(self.address) {
                    if let Some(assignment) = frame.parse_ranging_config() {
                        debug!(
                            "assigned id {} in a cell of {}",
                            assignment.assigned_uid, assignment.total_nodes
                        );
                        self.session.configure(
                            assignment.initiator_uid,
                            assignment.assigned_uid,
                            assignment.total_nodes,
                        );
                        self.phase = Phase::WaitPoll;
                    }
                }
                return Ok(());
            }
            FunctionCode::Reset => {
                self.reset_exchange();
                return Ok(());
            }
            _ => {}
        }

        if self.session.expected_uid() != Some(frame.source_uid()) {
            // The round order broke down; our identity may be stale. Drop it
            // and wait for a fresh config frame.
            warn!(
                "unexpected sender {} at round position {}",
                frame.source_uid(),
                self.session.round_position
            );
            self.session.clear();
            self.reset_exchange();
            return Ok(());
        }

        // Only the frame that opens a phase carries a timestamp we keep; the
        // replies in between merely advance the position.
        if self.session.round_position == 0 {
            match self.phase {
                Phase::WaitPoll => self.poll_rx_time = self.radio.rx_timestamp()?,
                Phase::WaitRange => self.range_rx_time = self.radio.rx_timestamp()?,
            }
        }
        self.session.round_position += 1;

        let position = self.session.round_position;
        let wait_position = self.session.wait_position as usize;
        let round_len = (self.session.node_count as usize).saturating_sub(1);

        if self.phase == Phase::WaitPoll {
            if position == wait_position {
                self.send_ack()?;
            }
            if position == round_len {
                self.session.reset_round();
                self.phase = Phase::WaitRange;
            }
            return Ok(());
        }

        if position == wait_position {
            self.send_final()?;
        }
        if position == round_len {
            self.session.reset_round();
            self.phase = Phase::WaitPoll;
            self.seq += Wrapping(1);
        }
        Ok(())
    }

    /// Schedules the ACK reply at a fixed turnaround after the last reception
    ///
    /// The reply-delay payload is the time from POLL reception to the exact
    /// instant the radio will stamp on this transmission.
    fn send_ack(&mut self) -> Result<(), Error<R::Error>> {
        let rx_time = self.radio.rx_timestamp()?;
        let tx_time = delay_tx_time(rx_time, RX_TO_TX_DLY_UUS);
        self.radio.set_delayed_tx_time(tx_time)?;

        let tx_timestamp = programmed_tx_timestamp(tx_time, TX_ANT_DLY);
        let mut frame =
            Frame::ranging_message(self.seq.0, FunctionCode::Ack, 0, self.session.own_uid);
        frame.set_reply_delay(tx_timestamp.duration_since(self.poll_rx_time).value());

        self.radio.write_tx(frame.as_bytes(), 0)?;
        if self.radio.start_tx(TxMode::Delayed {
            response_expected: true,
        })? {
            self.tx_in_flight = true;
        } else {
            debug!("delayed ACK start missed its slot");
        }
        Ok(())
    }

    /// Schedules the FINAL reply, carrying the ACK-to-RANGE round trip
    fn send_final(&mut self) -> Result<(), Error<R::Error>> {
        let ack_tx_time = self.radio.tx_timestamp()?;
        let rx_time = self.radio.rx_timestamp()?;
        self.radio
            .set_delayed_tx_time(delay_tx_time(rx_time, RX_TO_TX_DLY_UUS))?;

        let mut frame =
            Frame::ranging_message(self.seq.0, FunctionCode::Final, 0, self.session.own_uid);
        frame.set_reply_delay(self.range_rx_time.duration_since(ack_tx_time).value());

        self.radio.write_tx(frame.as_bytes(), 0)?;
        if self.radio.start_tx(TxMode::Delayed {
            response_expected: true,
        })? {
            self.tx_in_flight = true;
        } else {
            debug!("delayed FINAL start missed its slot");
        }
        Ok(())
    }

    /// Schedules a discovery blink with a random turnaround jitter
    ///
    /// The jitter spreads the replies of several undiscovered nodes so the
    /// polling coordinator can pick them up one round at a time.
    fn send_discovery_blink(&mut self, seq: u8) -> Result<(), Error<R::Error>> {
        let rx_time = self.radio.rx_timestamp()?;
        let span = RX_TO_TX_DLY_UUS - DISCOVERY_JITTER_MIN_UUS;
        let jitter_uus = DISCOVERY_JITTER_MIN_UUS + self.rng.next_u32() % span;
        self.radio
            .set_delayed_tx_time(delay_tx_time(rx_time, jitter_uus))?;

        let frame = Frame::discovery_blink(seq, ExtendedAddress(0), self.address);
        // The radio appends the checksum itself; only the body before the
        // FCS placeholder is written.
        self.radio
            .write_tx(&frame.as_bytes()[..frame.len() - FCS_LEN], 0)?;
        if self.radio.start_tx(TxMode::Delayed {
            response_expected: true,
        })? {
            self.tx_in_flight = true;
        }
        Ok(())
    }

    /// Returns to the start of a round, keeping the ranging identity
    fn reset_exchange(&mut self) {
        self.phase = Phase::WaitPoll;
        self.session.reset_round();
    }
}
