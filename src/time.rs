//! Time-related types based on the radio's 40-bit system time
//!
//! The radio timestamps transmissions and receptions with a free-running
//! 40-bit counter. One tick is one "device time unit" (about 15.65 ps); one
//! UWB microsecond is 65536 ticks. The counter wraps, so durations between
//! two instants must be computed with [`Instant::duration_since`], never by
//! comparing raw values.

use core::ops::Add;

use serde::{Deserialize, Serialize};

/// The maximum value of 40-bit system time stamps.
pub const TIME_MAX: u64 = 0xff_ffff_ffff;

/// Device time ticks per UWB microsecond
pub const UUS_TO_DEVICE_TIME: u64 = 65536;

/// Represents an instant in radio system time
///
/// Internally uses the same 40-bit timestamps that the radio uses.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[repr(C)]
pub struct Instant(u64);

impl Instant {
    /// Creates a new instance of `Instant`
    ///
    /// The given value must fit in a 40-bit timestamp, so:
    /// 0 <= `value` <= 2^40 - 1
    ///
    /// Returns `Some(...)`, if `value` is within the valid range, `None` if
    /// it isn't.
    pub fn new(value: u64) -> Option<Self> {
        if value <= TIME_MAX {
            Some(Instant(value))
        } else {
            None
        }
    }

    /// Returns the raw 40-bit timestamp
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Returns the amount of time passed between the two `Instant`s
    ///
    /// Assumes that `&self` represents a later time than the argument
    /// `earlier`. This method has no way of checking that (the 40-bit counter
    /// wraps, so the numerical order of two timestamps doesn't tell anything
    /// about their temporal order).
    pub fn duration_since(&self, earlier: Instant) -> Duration {
        if self.value() >= earlier.value() {
            Duration(self.value() - earlier.value())
        } else {
            Duration(TIME_MAX - earlier.value() + self.value() + 1)
        }
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Self::Output {
        // Both `Instant` and `Duration` are guaranteed to contain 40-bit
        // numbers, so this addition will never overflow.
        let value = (self.value() + rhs.value()) % (TIME_MAX + 1);

        // We made sure to keep the result of the addition within `TIME_MAX`,
        // so the following will never panic.
        Instant::new(value).unwrap()
    }
}

/// A duration between two instants in radio system time
///
/// Internally uses the same 40-bit timestamps that the radio uses.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[repr(C)]
pub struct Duration(u64);

impl Duration {
    /// Creates a new instance of `Duration`
    ///
    /// The given value must fit in a 40-bit timestamp, so:
    /// 0 <= `value` <= 2^40 - 1
    ///
    /// Returns `Some(...)`, if `value` is within the valid range, `None` if
    /// it isn't.
    pub fn new(value: u64) -> Option<Self> {
        if value <= TIME_MAX {
            Some(Duration(value))
        } else {
            None
        }
    }

    /// Creates an instance of `Duration` from a number of UWB microseconds
    pub fn from_uus(uus: u32) -> Self {
        // `uus` takes up at most 32 bits before it is cast to `u64`. The
        // result of the multiplication fits within 48 bits, which can exceed
        // a 40-bit duration for absurdly large inputs, so reduce it.
        Duration((uus as u64 * UUS_TO_DEVICE_TIME) % (TIME_MAX + 1))
    }

    /// Returns the raw 40-bit timestamp
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Computes the value to program into the delayed-transmit time register
///
/// The register takes the upper 32 bits of the 40-bit target time. The target
/// is the given reception timestamp plus a turnaround delay in UWB
/// microseconds.
pub fn delay_tx_time(rx_time: Instant, delay_uus: u32) -> u32 {
    ((rx_time + Duration::from_uus(delay_uus)).value() >> 8) as u32
}

/// The actual transmission timestamp resulting from a delayed transmit
///
/// The radio ignores the lowest bit of the programmed 32-bit time and starts
/// the frame at that instant; the timestamp it records additionally includes
/// the TX antenna delay. A responder embeds this value in its reply-delay
/// payload, so it must be computed exactly as the radio does.
pub fn programmed_tx_timestamp(tx_time: u32, tx_antenna_delay: u16) -> Instant {
    let value = (((tx_time & 0xFFFF_FFFE) as u64) << 8) + tx_antenna_delay as u64;
    // A 32-bit register value shifted left by 8 stays within 40 bits; adding
    // a 16-bit antenna delay can wrap past TIME_MAX at the very end of an
    // epoch, so reduce it.
    Instant::new(value % (TIME_MAX + 1)).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instant_rejects_values_beyond_40_bits() {
        assert!(Instant::new(TIME_MAX).is_some());
        assert!(Instant::new(TIME_MAX + 1).is_none());
        assert!(Duration::new(TIME_MAX).is_some());
        assert!(Duration::new(TIME_MAX + 1).is_none());
    }

    #[test]
    fn duration_since_handles_wraparound() {
        let before_wrap = Instant::new(TIME_MAX - 50).unwrap();
        let at_wrap = Instant::new(TIME_MAX).unwrap();
        let after_wrap = Instant::new(49).unwrap();

        assert_eq!(at_wrap.duration_since(before_wrap).value(), 50);
        assert_eq!(after_wrap.duration_since(at_wrap).value(), 50);
    }

    #[test]
    fn add_wraps_at_time_max() {
        let instant = Instant::new(TIME_MAX).unwrap();
        let sum = instant + Duration::new(1).unwrap();
        assert_eq!(sum.value(), 0);
    }

    #[test]
    fn delayed_tx_round_trips_through_the_register() {
        let rx_time = Instant::new(1_000_000).unwrap();
        let tx_time = delay_tx_time(rx_time, 3200);
        let tx_stamp = programmed_tx_timestamp(tx_time, 16385);

        // The programmed time is the target truncated to 32+8 bits, plus the
        // antenna delay.
        let target = rx_time.value() + 3200 * UUS_TO_DEVICE_TIME;
        let truncated = (target >> 8) as u32 & 0xFFFF_FFFE;
        assert_eq!(tx_stamp.value(), ((truncated as u64) << 8) + 16385);
    }
}
