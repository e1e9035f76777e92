//! Double-sided two-way ranging arithmetic
//!
//! A full exchange yields four durations per peer: the coordinator's first
//! round-trip (POLL out, ACK back), the peer's reply delay embedded in the
//! ACK, the peer's second round-trip embedded in the FINAL (its ACK out,
//! RANGE back), and the coordinator's reply delay (ACK in, RANGE out). The
//! DS-TWR formula combines them so the two nodes' clock offsets cancel:
//!
//! ```text
//! tof = (round1 * round2 - reply1 * reply2)
//!     / (round1 + round2 + reply1 + reply2)
//! ```
//!
//! The result is in device time ticks; multiplying by the tick length and the
//! speed of light gives meters.

/// One radio device time unit, in seconds (1 / (128 * 499.2 MHz))
pub const TIME_UNIT_S: f64 = 1.0 / 499_200_000.0 / 128.0;

/// Speed of light in air, in meters per second
pub const SPEED_OF_LIGHT_M_S: f64 = 299_702_547.0;

/// The four durations of one completed exchange, in device time ticks
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Exchange {
    /// Coordinator round-trip: POLL transmit to ACK receive
    pub round1: u64,
    /// Peer reply delay: POLL receive to ACK transmit (from the ACK frame)
    pub reply1: u32,
    /// Peer round-trip: ACK transmit to RANGE receive (from the FINAL frame)
    pub round2: u32,
    /// Coordinator reply delay: ACK receive to RANGE transmit
    pub reply2: u64,
}

impl Exchange {
    /// The time of flight between the two nodes, in device time ticks
    pub fn time_of_flight(&self) -> f64 {
        let round1 = self.round1 as f64;
        let reply1 = self.reply1 as f64;
        let round2 = self.round2 as f64;
        let reply2 = self.reply2 as f64;
        (round1 * round2 - reply1 * reply2) / (round1 + round2 + reply1 + reply2)
    }

    /// The distance between the two nodes, in meters
    pub fn distance_m(&self) -> f64 {
        self.time_of_flight() * TIME_UNIT_S * SPEED_OF_LIGHT_M_S
    }
}

/// The plausibility window for a computed distance
///
/// Distances outside the open interval are treated as clock glitches or
/// corrupted timestamps and discard the whole round. The default upper bound
/// of 1000 m is a deployment choice, not a physical limit, so it is
/// configurable rather than baked in.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DistanceBounds {
    /// Exclusive lower bound, in meters
    pub min_m: f64,
    /// Exclusive upper bound, in meters
    pub max_m: f64,
}

impl DistanceBounds {
    /// Whether a distance lies inside the open interval
    pub fn contains(&self, distance_m: f64) -> bool {
        distance_m > self.min_m && distance_m < self.max_m
    }
}

impl Default for DistanceBounds {
    fn default() -> Self {
        DistanceBounds {
            min_m: 0.0,
            max_m: 1000.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a symmetric exchange with a known time of flight, in ticks.
    fn symmetric_exchange(reply: u64, tof_ticks: u64) -> Exchange {
        let round = reply + 2 * tof_ticks;
        Exchange {
            round1: round,
            reply1: reply as u32,
            round2: round as u32,
            reply2: reply,
        }
    }

    #[test]
    fn symmetric_exchange_recovers_the_time_of_flight() {
        // For round = reply + 2 * tof the closed form reduces to
        // (round - reply) / 2 = tof.
        let exchange = symmetric_exchange(1_000_000, 2132);
        assert!((exchange.time_of_flight() - 2132.0).abs() < 1e-6);
    }

    #[test]
    fn distance_matches_the_closed_form() {
        let exchange = symmetric_exchange(1_000_000, 2132);
        let expected = 2132.0 * TIME_UNIT_S * SPEED_OF_LIGHT_M_S;
        assert!((exchange.distance_m() - expected).abs() < 1e-9);
        // 2132 ticks is very close to 10 meters.
        assert!((exchange.distance_m() - 10.0).abs() < 0.01);
    }

    #[test]
    fn asymmetric_reply_delays_still_cancel() {
        // Different reply delays on the two sides; tof stays recoverable as
        // long as round_i = reply_i + 2 * tof pairs are crossed.
        let tof = 500u64;
        let reply1 = 900_000u64;
        let reply2 = 1_200_000u64;
        let exchange = Exchange {
            round1: reply2 + 2 * tof,
            reply1: reply1 as u32,
            round2: (reply1 + 2 * tof) as u32,
            reply2,
        };
        assert!((exchange.time_of_flight() - tof as f64).abs() < 1e-6);
    }

    #[test]
    fn bounds_are_an_open_interval() {
        let bounds = DistanceBounds::default();
        assert!(!bounds.contains(0.0));
        assert!(!bounds.contains(-3.0));
        assert!(!bounds.contains(1000.0));
        assert!(bounds.contains(0.5));
        assert!(bounds.contains(999.9));
    }
}
