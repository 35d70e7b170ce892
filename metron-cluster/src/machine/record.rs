//! The durable epoch record.

use crate::types::{EpochLogId, EpochStoredMembership};
use serde::{Deserialize, Serialize};

/// The single replicated entity: the cluster's current epoch plus the
/// consensus watermark that produced it.
///
/// `raft_index` tracks the log entry that last changed the epoch;
/// `last_applied` tracks the last applied entry of any kind (blank and
/// membership entries included) so a reopened state machine can report its
/// applied state to the consensus layer without replaying epoch proposals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    /// Index of the log entry that last updated the epoch.
    pub raft_index: u64,
    /// Current epoch in wall-clock nanoseconds. Zero means never initialized.
    pub epoch: u64,
    /// Last applied log ID, the applied watermark reported on reopen.
    pub last_applied: Option<EpochLogId>,
    /// Last applied membership configuration.
    pub last_membership: EpochStoredMembership,
}
