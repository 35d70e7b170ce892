//! Raft integration: the cluster node and its log storage.

mod node;
pub mod storage;

pub use node::{EpochNode, Member, MembershipView};
