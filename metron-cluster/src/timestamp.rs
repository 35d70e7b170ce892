//! The 16-byte timestamp wire format.

use bytes::BufMut;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Serialized size of one timestamp: 8 bytes of epoch, 8 bytes of index.
pub const TIMESTAMP_LEN: usize = 16;

/// A unique timestamp issued by the cluster leader.
///
/// Ordering is lexicographic on `(epoch, index)`, which matches the byte
/// order of the big-endian wire encoding: comparing two encoded timestamps
/// with `memcmp` gives the same result as comparing the parsed values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    /// Wall-clock-derived epoch, strictly increasing across all leaders.
    pub epoch: u64,
    /// Per-epoch counter, local to the leader that issued the timestamp.
    pub index: u64,
}

impl Timestamp {
    /// Create a timestamp from its parts.
    pub fn new(epoch: u64, index: u64) -> Self {
        Self { epoch, index }
    }

    /// Encode as 16 big-endian bytes: epoch first, then index.
    pub fn to_bytes(self) -> [u8; TIMESTAMP_LEN] {
        let mut buf = [0u8; TIMESTAMP_LEN];
        buf[..8].copy_from_slice(&self.epoch.to_be_bytes());
        buf[8..].copy_from_slice(&self.index.to_be_bytes());
        buf
    }

    /// Decode from 16 big-endian bytes.
    pub fn from_bytes(buf: &[u8; TIMESTAMP_LEN]) -> Self {
        let mut epoch = [0u8; 8];
        let mut index = [0u8; 8];
        epoch.copy_from_slice(&buf[..8]);
        index.copy_from_slice(&buf[8..]);
        Self {
            epoch: u64::from_be_bytes(epoch),
            index: u64::from_be_bytes(index),
        }
    }

    /// Append the wire encoding to a buffer.
    pub fn write_to(self, buf: &mut impl BufMut) {
        buf.put_u64(self.epoch);
        buf.put_u64(self.index);
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.epoch, self.index)
    }
}

/// Current wall clock as nanoseconds since the Unix epoch.
///
/// The system clock is assumed to never sit before 1970; a clock that far
/// off cannot produce meaningful epochs anyway.
pub fn wall_clock_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn round_trip() {
        let ts = Timestamp::new(1_720_000_000_000_000_000, 42);
        let bytes = ts.to_bytes();
        assert_eq!(Timestamp::from_bytes(&bytes), ts);
    }

    #[test]
    fn big_endian_layout() {
        let ts = Timestamp::new(1, 2);
        let bytes = ts.to_bytes();

        assert_eq!(&bytes[..8], &[0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(&bytes[8..], &[0, 0, 0, 0, 0, 0, 0, 2]);
    }

    #[test]
    fn byte_order_matches_value_order() {
        let samples = [
            Timestamp::new(0, 0),
            Timestamp::new(0, 1),
            Timestamp::new(0, u64::MAX),
            Timestamp::new(1, 0),
            Timestamp::new(1, 1),
            Timestamp::new(u64::MAX, 0),
        ];

        for a in &samples {
            for b in &samples {
                assert_eq!(
                    a.cmp(b),
                    a.to_bytes().cmp(&b.to_bytes()),
                    "value order and byte order disagree for {} vs {}",
                    a,
                    b
                );
            }
        }
    }

    #[test]
    fn write_to_matches_to_bytes() {
        let ts = Timestamp::new(77, 12345);
        let mut buf = BytesMut::with_capacity(TIMESTAMP_LEN);
        ts.write_to(&mut buf);

        assert_eq!(&buf[..], &ts.to_bytes());
    }

    #[test]
    fn wall_clock_is_past_2020() {
        // 2020-01-01 in nanoseconds
        assert!(wall_clock_nanos() > 1_577_836_800_000_000_000);
    }
}
