//! Replicated timestamp oracle for metron.
//!
//! This crate provides the consensus side of metron: a small Raft cluster
//! whose leader hands out monotonically unique 16-byte timestamps. Each
//! timestamp is an 8-byte *epoch* (wall-clock nanoseconds, advanced through
//! the replicated log roughly every 100ms) followed by an 8-byte *index*
//! (a per-epoch counter the leader increments locally). A coarse epoch plus
//! a local counter means one consensus round can back thousands of issued
//! timestamps.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        metron cluster                        │
//! │                                                              │
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐    │
//! │  │    Node 1    │    │    Node 2    │    │    Node 3    │    │
//! │  │   (Leader)   │    │  (Follower)  │    │  (Follower)  │    │
//! │  │              │    │              │    │              │    │
//! │  │ ┌──────────┐ │    │ ┌──────────┐ │    │ ┌──────────┐ │    │
//! │  │ │   Raft   │◄┼────┼─┤   Raft   │◄┼────┼─┤   Raft   │ │    │
//! │  │ └────┬─────┘ │    │ └────┬─────┘ │    │ └────┬─────┘ │    │
//! │  │      │       │    │      │       │    │      │       │    │
//! │  │ ┌────▼─────┐ │    │ ┌────▼─────┐ │    │ ┌────▼─────┐ │    │
//! │  │ │  Epoch   │ │    │ │  Epoch   │ │    │ │  Epoch   │ │    │
//! │  │ │  record  │ │    │ │  record  │ │    │ │  record  │ │    │
//! │  │ └──────────┘ │    │ └──────────┘ │    │ └──────────┘ │    │
//! │  │  dispatcher  │    │              │    │              │    │
//! │  │  advancer    │    │              │    │              │    │
//! │  └──────────────┘    └──────────────┘    └──────────────┘    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only the leader runs an active dispatcher and epoch advancer; followers
//! replicate the epoch record and redirect clients.
//!
//! # Usage
//!
//! ```ignore
//! use metron_cluster::{ClusterConfig, EpochNode};
//!
//! let config = ClusterConfig::builder()
//!     .node_id(1)
//!     .listen_addr("127.0.0.1:5000")
//!     .http_addr("127.0.0.1:8080")
//!     .peer(2, "127.0.0.1:5001", "127.0.0.1:8081")
//!     .build()?;
//!
//! let node = EpochNode::start(config).await?;
//! node.bootstrap().await?;
//!
//! let deadline = std::time::Instant::now() + std::time::Duration::from_secs(1);
//! let bytes = node.issue_timestamps(1, deadline.into()).await?;
//! ```

mod advancer;

pub mod atomic;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod machine;
pub mod network;
pub mod raft;
pub mod timestamp;
pub mod types;

// Re-export main types
pub use config::{ClusterConfig, PeerAddr};
pub use dispatch::Dispatcher;
pub use error::{ClusterError, ClusterResult};
pub use machine::{EpochRecord, EpochStateMachine};
pub use raft::{EpochNode, Member, MembershipView};
pub use timestamp::{wall_clock_nanos, Timestamp, TIMESTAMP_LEN};
pub use types::{EpochProposal, NodeId, TypeConfig};

// Generated protobuf code
pub mod proto {
    tonic::include_proto!("metron.raft");
}
