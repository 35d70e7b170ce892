//! Error types for cluster operations.

use crate::types::NodeId;
use openraft::BasicNode;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for cluster operations.
pub type ClusterResult<T> = std::result::Result<T, ClusterError>;

/// Type alias for OpenRaft Raft errors.
pub type RaftError<E = openraft::error::Infallible> = openraft::error::RaftError<NodeId, E>;

/// Type alias for OpenRaft RPC errors.
pub type RPCError<E = openraft::error::Infallible> =
    openraft::error::RPCError<NodeId, BasicNode, RaftError<E>>;

/// Type alias for client write errors.
pub type ClientWriteError = openraft::error::ClientWriteError<NodeId, BasicNode>;

/// Type alias for initialize errors.
pub type InitializeError = openraft::error::InitializeError<NodeId, BasicNode>;

/// Errors that can occur in cluster operations.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Raft consensus error.
    #[error("raft error: {0}")]
    Raft(String),

    /// Network/RPC error.
    #[error("network error: {0}")]
    Network(#[from] tonic::Status),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Node not found in cluster.
    #[error("node {0} not found in cluster")]
    NodeNotFound(NodeId),

    /// Request hit a node that is not the leader.
    #[error("not the leader, leader is node {leader}")]
    NotLeader {
        /// The current leader.
        leader: NodeId,
    },

    /// Raft has not converged on a leader view yet.
    #[error("raft leadership not ready")]
    Unavailable,

    /// A deadline expired while waiting on the queue, a reply, or consensus.
    #[error("deadline exceeded")]
    Timeout,

    /// Timestamp batch size below the minimum of one.
    #[error("timestamp count must be at least 1, got {0}")]
    InvalidCount(u32),

    /// A proposed epoch did not exceed the stored epoch. Epochs are derived
    /// from the leader's wall clock with drift repair, so this means clock
    /// violation or a bug; the state machine treats it as fatal.
    #[error("proposed epoch {proposed} is not greater than current epoch {current}")]
    Regression {
        /// The epoch carried by the rejected proposal.
        proposed: u64,
        /// The epoch currently stored in the record.
        current: u64,
    },

    /// The persisted epoch record exists but cannot be deserialized.
    #[error("epoch record at {path} is corrupted: {cause}")]
    Corruption {
        /// Path of the unreadable record.
        path: PathBuf,
        /// Reason deserialization failed.
        cause: String,
    },

    /// Lookup was called on a closed state machine.
    #[error("state machine is closed")]
    Closed,
}

impl ClusterError {
    /// Convert any raft error into the string-carrying variant.
    pub(crate) fn raft<E: std::fmt::Debug>(e: E) -> Self {
        ClusterError::Raft(format!("{:?}", e))
    }
}

impl From<serde_json::Error> for ClusterError {
    fn from(e: serde_json::Error) -> Self {
        ClusterError::Serialization(e.to_string())
    }
}
