//! Line-oriented telemetry records
//!
//! The engine itself never talks to a broker; it renders fixed-layout text
//! records and hands them to a [`Publish`] implementation at the caller's
//! cadence. The nominal pacing is one ranging record per
//! [`crate::configs::PUBLISH_INTERVAL_MS`]; publishing more often than
//! rounds complete just repeats the last distances. Records are
//! semicolon-separated with a nanosecond host timestamp first, so
//! downstream consumers can parse them without a schema.

use core::fmt::Write;

use heapless::String;
use serde::{Deserialize, Serialize};

use crate::registry::Registry;

/// Topic for ranging distance records
pub const RANGING_TOPIC: &str = "uwb/data";

/// Topic for motion sensor records
pub const MOTION_TOPIC: &str = "imu/data";

/// Capacity of a rendered ranging record
///
/// A full cell of six peers needs at most 20 timestamp digits plus six
/// 16-digit addresses with distances; 300 bytes leaves headroom.
pub const REPORT_CAPACITY: usize = 300;

/// The outbound side of the telemetry path
///
/// Returns `false` when the record could not be handed off; the caller
/// decides whether that matters. Records are fire-and-forget.
pub trait Publish {
    /// Publishes one rendered record to a topic
    fn publish(&mut self, topic: &str, payload: &str) -> bool;
}

/// Renders the registry's distances as one ranging record
///
/// Layout: `<timestamp_ns>;<addr_hex>,<distance>;<addr_hex>,<distance>;...`
/// with distances at two decimals. Peers that no longer fit are dropped from
/// the end rather than truncated mid-entry.
pub fn ranging_report(timestamp_ns: u64, registry: &Registry) -> String<REPORT_CAPACITY> {
    let mut record = String::new();
    if write!(record, "{};", timestamp_ns).is_err() {
        return record;
    }
    for peer in registry.iter() {
        let mut entry: String<32> = String::new();
        if write!(entry, "{:x},{:.2};", peer.address, peer.distance_m).is_err() {
            break;
        }
        if record.push_str(&entry).is_err() {
            break;
        }
    }
    record
}

/// One motion sensor sample
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct MotionSample {
    /// Host timestamp of the sample, in nanoseconds
    pub timestamp_ns: u64,
    /// Linear acceleration, in m/s^2
    pub accel: [f32; 3],
    /// Orientation quaternion, w first
    pub quat: [f32; 4],
}

/// Renders a motion sample as one record
///
/// Layout: `<timestamp_ns>;<ax>,<ay>,<az>;<qw>,<qx>,<qy>,<qz>` with floats
/// at six decimals.
pub fn motion_report(sample: &MotionSample) -> String<REPORT_CAPACITY> {
    let mut record = String::new();
    let _ = write!(
        record,
        "{};{:.6},{:.6},{:.6};{:.6},{:.6},{:.6},{:.6}",
        sample.timestamp_ns,
        sample.accel[0],
        sample.accel[1],
        sample.accel[2],
        sample.quat[0],
        sample.quat[1],
        sample.quat[2],
        sample.quat[3],
    );
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mac::ExtendedAddress;

    #[test]
    fn ranging_report_lists_each_peer_with_two_decimals() {
        let mut registry = Registry::new();
        registry.set_base_uid(4);
        registry.add(ExtendedAddress(0xa4cf_1212_3456));
        registry.add(ExtendedAddress(0xa4cf_1298_7654));
        registry.set_distance(8, 10.0);
        registry.set_distance(12, 2.5);

        let record = ranging_report(1_700_000_000_123_456_789, &registry);
        assert_eq!(
            record.as_str(),
            "1700000000123456789;a4cf12123456,10.00;a4cf12987654,2.50;"
        );
    }

    #[test]
    fn ranging_report_of_an_empty_registry_is_just_the_timestamp() {
        let registry = Registry::new();
        let record = ranging_report(42, &registry);
        assert_eq!(record.as_str(), "42;");
    }

    #[test]
    fn reports_at_the_nominal_cadence_fit_the_record_capacity() {
        let mut registry = Registry::new();
        registry.set_base_uid(4);
        registry.add(ExtendedAddress(0xa4cf_0000_0001));
        registry.set_distance(8, 3.75);

        let interval_ns = u64::from(crate::configs::PUBLISH_INTERVAL_MS) * 1_000_000;
        let first = ranging_report(interval_ns, &registry);
        let second = ranging_report(2 * interval_ns, &registry);
        assert!(first.len() <= REPORT_CAPACITY);
        assert_ne!(first.as_str(), second.as_str());
        assert!(second.as_str().starts_with("400000000;"));
    }

    #[test]
    fn motion_report_renders_six_decimal_floats() {
        let sample = MotionSample {
            timestamp_ns: 7,
            accel: [0.0, -9.81, 0.25],
            quat: [1.0, 0.0, 0.0, 0.0],
        };
        let record = motion_report(&sample);
        assert_eq!(
            record.as_str(),
            "7;0.000000,-9.810000,0.250000;1.000000,0.000000,0.000000,0.000000"
        );
    }
}
