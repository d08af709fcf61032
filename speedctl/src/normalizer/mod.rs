//! Parsing of raw tool output into canonical measurements.
//!
//! The two tools emit unrelated JSON shapes. Both parsers are lenient about optional
//! fields and strict about the ones a measurement cannot exist without; anything they
//! cannot make sense of becomes [`crate::errors::Error::NormalizationFailed`] with the raw
//! bytes attached.
//!
//! - [`speed`]: `speedtest --format=json`
//! - [`throughput`]: `iperf3 -J`

pub mod speed;
pub mod throughput;

pub use speed::{SpeedMeasurement, parse_speed};
pub use throughput::{ThroughputMeasurement, parse_throughput};

use serde::{Deserialize, Serialize};

const BITS_PER_MEGABIT: f64 = 1_000_000.0;

/// Unit of the speed tool's `bandwidth` fields.
///
/// The speed tool reports bytes per second. Bits per second remains selectable for tools
/// or wrappers that already report bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandwidthUnit {
    BitsPerSecond,
    #[default]
    BytesPerSecond,
}

impl BandwidthUnit {
    /// Convert a raw bandwidth value to megabits per second, never negative.
    pub fn to_mbps(self, bandwidth: f64) -> f64 {
        let bits = match self {
            BandwidthUnit::BitsPerSecond => bandwidth,
            BandwidthUnit::BytesPerSecond => bandwidth * 8.0,
        };
        (bits / BITS_PER_MEGABIT).max(0.0)
    }
}

/// Bits per second to megabits per second.
pub(crate) fn bits_to_mbps(bits_per_second: f64) -> f64 {
    (bits_per_second / BITS_PER_MEGABIT).max(0.0)
}
