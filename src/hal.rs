//! The boundary to the register-level radio driver
//!
//! The ranging engine never touches radio registers. It talks to a
//! [`RadioHal`] implementation that wraps the vendor driver: frame buffer
//! access, immediate and delayed transmission, precise transmit/receive
//! timestamps, and a bounded wait for the next radio event.
//!
//! Interrupt handling stays below this trait. A production implementation
//! registers its transmit-complete / receive-good / receive-error callbacks
//! to post into a [`Mailbox`] and drains that mailbox from
//! [`RadioHal::wait_event`]; the engine's polling task is the only consumer.
//! Receive timeouts are bounded by the driver's hardware timeout register and
//! surface as [`RadioEvent::RxTimeout`], so no wait blocks indefinitely.

use core::sync::atomic::{AtomicBool, AtomicU16, Ordering};

use crate::configs::RadioConfig;
use crate::time::Instant;

/// How a transmission is started
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TxMode {
    /// Start transmitting immediately
    Immediate {
        /// Re-enable the receiver once the frame is out
        response_expected: bool,
    },
    /// Start transmitting at the previously programmed delayed-transmit time
    Delayed {
        /// Re-enable the receiver once the frame is out
        response_expected: bool,
    },
}

/// A radio event delivered to the polling task
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RadioEvent {
    /// A transmission completed
    TxDone,
    /// A good frame was received
    RxGood {
        /// The received frame length in bytes
        len: u16,
    },
    /// The receive window elapsed without a frame
    RxTimeout,
    /// Reception failed (bad checksum, sync loss, PHY error)
    RxError,
}

/// The contract the ranging engine requires from the radio driver
pub trait RadioHal {
    /// The driver's error type
    type Error: core::fmt::Debug;

    /// Applies the link configuration
    fn configure(&mut self, config: &RadioConfig) -> Result<(), Self::Error>;

    /// Sets the TX and RX antenna delays, in device time units
    fn set_antenna_delay(&mut self, tx: u16, rx: u16) -> Result<(), Self::Error>;

    /// Enables the receiver
    ///
    /// `timeout_uus` bounds the receive window in UWB microseconds; `None`
    /// listens until a frame or an error arrives.
    fn enable_receive(&mut self, timeout_uus: Option<u32>) -> Result<(), Self::Error>;

    /// Writes frame bytes into the transmit buffer at the given offset
    fn write_tx(&mut self, data: &[u8], offset: u16) -> Result<(), Self::Error>;

    /// Reads the received frame into `buffer`
    ///
    /// Called after [`RadioEvent::RxGood`]; `buffer` must hold at least the
    /// reported length.
    fn read_rx(&mut self, buffer: &mut [u8]) -> Result<(), Self::Error>;

    /// Programs the delayed-transmit time register
    ///
    /// The value is the upper 32 bits of the 40-bit target time, as computed
    /// by [`crate::time::delay_tx_time`].
    fn set_delayed_tx_time(&mut self, tx_time: u32) -> Result<(), Self::Error>;

    /// Starts a transmission
    ///
    /// Returns `Ok(true)` if the transmission was started. A delayed start
    /// whose programmed time has already passed returns `Ok(false)`; the
    /// frame is not sent.
    fn start_tx(&mut self, mode: TxMode) -> Result<bool, Self::Error>;

    /// The timestamp of the most recent transmission, antenna delay included
    fn tx_timestamp(&mut self) -> Result<Instant, Self::Error>;

    /// The timestamp of the most recent reception, antenna delay included
    fn rx_timestamp(&mut self) -> Result<Instant, Self::Error>;

    /// Waits for the next radio event
    ///
    /// Returns `nb::Error::WouldBlock` while no event is pending. Blocking
    /// callers wrap this in `nb::block!`; the bound is the hardware receive
    /// timeout armed by [`RadioHal::enable_receive`].
    fn wait_event(&mut self) -> nb::Result<RadioEvent, Self::Error>;
}

/// The single-slot handoff between the radio interrupt and the polling task
///
/// The interrupt callbacks are the single producer: each fires once per
/// hardware event and sets exactly one flag (plus the frame length for a good
/// reception). The polling task is the single consumer and drains one event
/// per [`Mailbox::take`]. Nothing else is shared between the two contexts.
#[derive(Debug, Default)]
pub struct Mailbox {
    tx_done: AtomicBool,
    rx_good: AtomicBool,
    rx_len: AtomicU16,
    rx_timeout: AtomicBool,
    rx_error: AtomicBool,
}

impl Mailbox {
    /// Creates an empty mailbox
    pub const fn new() -> Self {
        Mailbox {
            tx_done: AtomicBool::new(false),
            rx_good: AtomicBool::new(false),
            rx_len: AtomicU16::new(0),
            rx_timeout: AtomicBool::new(false),
            rx_error: AtomicBool::new(false),
        }
    }

    /// Posts a transmit-complete event (interrupt context)
    pub fn post_tx_done(&self) {
        self.tx_done.store(true, Ordering::Release);
    }

    /// Posts a good reception with its frame length (interrupt context)
    pub fn post_rx_good(&self, len: u16) {
        self.rx_len.store(len, Ordering::Release);
        self.rx_good.store(true, Ordering::Release);
    }

    /// Posts a receive timeout (interrupt context)
    pub fn post_rx_timeout(&self) {
        self.rx_timeout.store(true, Ordering::Release);
    }

    /// Posts a receive error (interrupt context)
    pub fn post_rx_error(&self) {
        self.rx_error.store(true, Ordering::Release);
    }

    /// Drains one pending event, if any (polling task)
    ///
    /// Transmit completion is delivered before pending receptions so a
    /// responder can retire an in-flight reply before handling new frames.
    pub fn take(&self) -> Option<RadioEvent> {
        if self.tx_done.swap(false, Ordering::Acquire) {
            return Some(RadioEvent::TxDone);
        }
        if self.rx_good.swap(false, Ordering::Acquire) {
            return Some(RadioEvent::RxGood {
                len: self.rx_len.load(Ordering::Acquire),
            });
        }
        if self.rx_timeout.swap(false, Ordering::Acquire) {
            return Some(RadioEvent::RxTimeout);
        }
        if self.rx_error.swap(false, Ordering::Acquire) {
            return Some(RadioEvent::RxError);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mailbox_delivers_one_event_per_take() {
        let mailbox = Mailbox::new();
        assert_eq!(mailbox.take(), None);

        mailbox.post_rx_good(42);
        assert_eq!(mailbox.take(), Some(RadioEvent::RxGood { len: 42 }));
        assert_eq!(mailbox.take(), None);
    }

    #[test]
    fn tx_done_is_drained_before_receptions() {
        let mailbox = Mailbox::new();
        mailbox.post_rx_good(10);
        mailbox.post_tx_done();

        assert_eq!(mailbox.take(), Some(RadioEvent::TxDone));
        assert_eq!(mailbox.take(), Some(RadioEvent::RxGood { len: 10 }));
        assert_eq!(mailbox.take(), None);
    }

    #[test]
    fn error_and_timeout_flags_are_independent() {
        let mailbox = Mailbox::new();
        mailbox.post_rx_timeout();
        mailbox.post_rx_error();

        assert_eq!(mailbox.take(), Some(RadioEvent::RxTimeout));
        assert_eq!(mailbox.take(), Some(RadioEvent::RxError));
    }
}
