//! Raft RPC networking.
//!
//! Peers talk gRPC; openraft request and response types travel as
//! serde-JSON payload bytes inside stable protobuf envelopes. The client
//! side dials peers lazily and maps failures through [`crate::error::ClusterError`].

mod client;
mod server;

pub use client::{PeerConnection, RaftTransport};
pub use server::RaftServer;
