//! Wire types mirrored from the server.
//!
//! Kept local so depending on the client does not pull in the consensus
//! stack.

use crate::error::{ClientError, Result};
use serde::Deserialize;

/// Serialized size of one timestamp.
pub const TIMESTAMP_LEN: usize = 16;

/// A parsed timestamp: 8 bytes of epoch, 8 bytes of index, big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    /// Wall-clock-derived epoch in nanoseconds.
    pub epoch: u64,
    /// Per-epoch counter assigned by the leader.
    pub index: u64,
}

impl Timestamp {
    /// Decode one timestamp from 16 big-endian bytes.
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

    /// Parse a `16 * n` byte response body into timestamps.
    pub fn parse_batch(body: &[u8]) -> Result<Vec<Timestamp>> {
        if body.is_empty() || body.len() % TIMESTAMP_LEN != 0 {
            return Err(ClientError::MalformedResponse(body.len()));
        }
        Ok(body
            .chunks(TIMESTAMP_LEN)
            .map(|chunk| {
                Timestamp::from_bytes(chunk.try_into().expect("chunk size checked above"))
            })
            .collect())
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.epoch, self.index)
    }
}

/// One cluster member.
#[derive(Debug, Clone, Deserialize)]
pub struct Member {
    /// The member's node ID.
    pub node_id: u64,
    /// The member's advertised HTTP address.
    pub addr: String,
}

/// Cluster membership as reported by `/membership`.
#[derive(Debug, Clone, Deserialize)]
pub struct Membership {
    /// The current leader.
    pub leader: Member,
    /// All voting members.
    pub members: Vec<Member>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_timestamp() {
        let mut body = [0u8; 16];
        body[..8].copy_from_slice(&42u64.to_be_bytes());
        body[8..].copy_from_slice(&7u64.to_be_bytes());

        let parsed = Timestamp::parse_batch(&body).expect("parse");
        assert_eq!(parsed, vec![Timestamp { epoch: 42, index: 7 }]);
    }

    #[test]
    fn parses_batches_in_order() {
        let mut body = Vec::new();
        for index in 1..=5u64 {
            body.extend_from_slice(&99u64.to_be_bytes());
            body.extend_from_slice(&index.to_be_bytes());
        }

        let parsed = Timestamp::parse_batch(&body).expect("parse");
        assert_eq!(parsed.len(), 5);
        assert!(parsed.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn rejects_ragged_bodies() {
        assert!(Timestamp::parse_batch(&[]).is_err());
        assert!(Timestamp::parse_batch(&[0u8; 15]).is_err());
        assert!(Timestamp::parse_batch(&[0u8; 17]).is_err());
    }
}
