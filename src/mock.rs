//! A scriptable in-memory radio
//!
//! Engine tests script a sequence of radio events with their frames and
//! timestamps, run the state machines against them and then inspect the
//! recorded transmissions. Successful transmissions post their own
//! completion event ahead of the remaining script, the way the interrupt
//! path would on hardware.

use core::convert::Infallible;

use heapless::{Deque, Vec};

use crate::configs::RadioConfig;
use crate::hal::{RadioEvent, RadioHal, TxMode};
use crate::mac::MAX_FRAME_LEN;
use crate::time::Instant;

/// One recorded transmission
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TxRecord {
    /// The bytes handed to the transmit buffer
    pub bytes: Vec<u8, MAX_FRAME_LEN>,
    /// How the transmission was started
    pub mode: TxMode,
    /// The delayed-transmit register value at start time
    pub delayed_tx_time: u32,
}

/// A mock radio driven by a pre-scripted event sequence
#[derive(Debug, Default)]
pub struct MockRadio {
    events: Deque<RadioEvent, 32>,
    rx_frames: Deque<Vec<u8, MAX_FRAME_LEN>, 16>,
    rx_times: Deque<Instant, 16>,
    tx_times: Deque<Instant, 16>,
    current_rx_frame: Vec<u8, MAX_FRAME_LEN>,
    current_rx_time: Instant,
    current_tx_time: Instant,
    pending_tx: Vec<u8, MAX_FRAME_LEN>,
    delayed_tx_time: u32,
    /// Every transmission started so far, in order
    pub sent: Vec<TxRecord, 16>,
    /// Whether the link configuration was applied
    pub configured: bool,
    /// The antenna delays last set, as (tx, rx)
    pub antenna_delays: Option<(u16, u16)>,
    /// The timeout of the most recent receive enable
    pub last_rx_timeout_uus: Option<u32>,
    /// How often the receiver was enabled
    pub receive_enables: usize,
    /// When set, the next delayed start reports its slot as missed
    pub miss_next_delayed_start: bool,
}

impl MockRadio {
    /// Creates a mock with an empty script
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts a good reception of the given frame bytes
    ///
    /// The reception timestamp is what [`RadioHal::rx_timestamp`] reports
    /// while this frame is the most recent one.
    pub fn script_reception(&mut self, bytes: &[u8], rx_time: Instant) {
        let mut frame = Vec::new();
        // Scripted frames are bounded by the codec's maximum length.
        frame.extend_from_slice(bytes).unwrap();
        self.events
            .push_back(RadioEvent::RxGood { len: bytes.len() as u16 })
            .unwrap();
        self.rx_frames.push_back(frame).unwrap();
        self.rx_times.push_back(rx_time).unwrap();
    }

    /// Scripts a bare event (timeout, error)
    pub fn script_event(&mut self, event: RadioEvent) {
        self.events.push_back(event).unwrap();
    }

    /// Scripts a bare event ahead of everything already pending
    ///
    /// Lets a test deliver an error or timeout before the completion of a
    /// transmission that has already been started.
    pub fn script_preempting_event(&mut self, event: RadioEvent) {
        self.events.push_front(event).unwrap();
    }

    /// Scripts the timestamp the radio stamps on the next transmission
    ///
    /// Timestamps are consumed one per started transmission, in order.
    pub fn script_tx_timestamp(&mut self, tx_time: Instant) {
        self.tx_times.push_back(tx_time).unwrap();
    }
}

impl RadioHal for MockRadio {
    type Error = Infallible;

    fn configure(&mut self, _config: &RadioConfig) -> Result<(), Self::Error> {
        self.configured = true;
        Ok(())
    }

    fn set_antenna_delay(&mut self, tx: u16, rx: u16) -> Result<(), Self::Error> {
        self.antenna_delays = Some((tx, rx));
        Ok(())
    }

    fn enable_receive(&mut self, timeout_uus: Option<u32>) -> Result<(), Self::Error> {
        self.last_rx_timeout_uus = timeout_uus;
        self.receive_enables += 1;
        Ok(())
    }

    fn write_tx(&mut self, data: &[u8], offset: u16) -> Result<(), Self::Error> {
        if offset == 0 {
            self.pending_tx.clear();
        }
        let _ = self.pending_tx.extend_from_slice(data);
        Ok(())
    }

    fn read_rx(&mut self, buffer: &mut [u8]) -> Result<(), Self::Error> {
        let len = buffer.len().min(self.current_rx_frame.len());
        buffer[..len].copy_from_slice(&self.current_rx_frame[..len]);
        Ok(())
    }

    fn set_delayed_tx_time(&mut self, tx_time: u32) -> Result<(), Self::Error> {
        self.delayed_tx_time = tx_time;
        Ok(())
    }

    fn start_tx(&mut self, mode: TxMode) -> Result<bool, Self::Error> {
        if let TxMode::Delayed { .. } = mode {
            if self.miss_next_delayed_start {
                self.miss_next_delayed_start = false;
                return Ok(false);
            }
        }
        let _ = self.sent.push(TxRecord {
            bytes: self.pending_tx.clone(),
            mode,
            delayed_tx_time: self.delayed_tx_time,
        });
        if let Some(tx_time) = self.tx_times.pop_front() {
            self.current_tx_time = tx_time;
        }
        // The completion interrupt fires before anything else the script
        // holds.
        let _ = self.events.push_front(RadioEvent::TxDone);
        Ok(true)
    }

    fn tx_timestamp(&mut self) -> Result<Instant, Self::Error> {
        Ok(self.current_tx_time)
    }

    fn rx_timestamp(&mut self) -> Result<Instant, Self::Error> {
        Ok(self.current_rx_time)
    }

    fn wait_event(&mut self) -> nb::Result<RadioEvent, Self::Error> {
        match self.events.pop_front() {
            Some(event) => {
                if let RadioEvent::RxGood { .. } = event {
                    if let Some(frame) = self.rx_frames.pop_front() {
                        self.current_rx_frame = frame;
                    }
                    if let Some(rx_time) = self.rx_times.pop_front() {
                        self.current_rx_time = rx_time;
                    }
                }
                Ok(event)
            }
            // An exhausted script reads as an endless quiet channel.
            None => Ok(RadioEvent::RxTimeout),
        }
    }
}
