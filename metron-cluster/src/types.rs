//! Type definitions for OpenRaft integration.
//!
//! OpenRaft requires a type configuration naming the concrete types used by
//! the Raft implementation. The application data type is the epoch proposal;
//! the response type is the applied epoch record, so a committed proposal
//! hands the proposer the record it produced.

use crate::machine::EpochRecord;
use openraft::BasicNode;
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// Node ID type for the cluster.
///
/// Each node in the cluster has a unique 64-bit identifier.
pub type NodeId = u64;

/// A proposed epoch, replicated through the Raft log.
///
/// The epoch is the leader's wall clock in nanoseconds, after drift repair.
/// All proposals target the same logical key (the single epoch record), so
/// within one applied batch only the last proposal survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochProposal {
    /// Proposed epoch value, in wall-clock nanoseconds.
    pub epoch: u64,
}

// Use the declare_raft_types! macro to define the type configuration.
// This handles all the trait bounds and associated types correctly.
openraft::declare_raft_types!(
    /// OpenRaft type configuration for metron.
    pub TypeConfig:
        D = EpochProposal,
        R = EpochRecord,
);

/// Type alias for Raft instance.
pub type EpochRaft = openraft::Raft<TypeConfig>;

/// Type alias for log entry.
pub type EpochEntry = openraft::Entry<TypeConfig>;

/// Type alias for vote.
pub type EpochVote = openraft::Vote<NodeId>;

/// Type alias for log ID.
pub type EpochLogId = openraft::LogId<NodeId>;

/// Type alias for stored membership.
pub type EpochStoredMembership = openraft::StoredMembership<NodeId, BasicNode>;

/// Type alias for snapshot metadata.
pub type EpochSnapshotMeta = openraft::SnapshotMeta<NodeId, BasicNode>;

/// Type alias for snapshot.
pub type EpochSnapshot = openraft::storage::Snapshot<TypeConfig>;

/// Type alias for log state.
pub type EpochLogState = openraft::LogState<TypeConfig>;

/// Type alias for storage error.
pub type EpochStorageError = openraft::StorageError<NodeId>;
