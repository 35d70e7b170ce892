//! Outbound Raft RPC: OpenRaft's network traits over the gRPC envelopes.
//!
//! Envelope payloads are serde-JSON encoded OpenRaft types. Encode, decode,
//! and dial failures all pass through [`ClusterError`] before they are
//! handed back to the consensus layer, so transport faults carry the same
//! taxonomy as the rest of the crate.

use crate::error::{ClusterError, RPCError};
use crate::proto::raft_service_client::RaftServiceClient;
use crate::proto::{AppendEntriesRequest, InstallSnapshotRequest, VoteRequest};
use crate::types::{NodeId, TypeConfig};
use openraft::error::{InstallSnapshotError, NetworkError, Unreachable};
use openraft::network::{RPCOption, RaftNetwork, RaftNetworkFactory};
use openraft::raft::{
    AppendEntriesRequest as RaftAppendRequest, AppendEntriesResponse as RaftAppendResponse,
    InstallSnapshotRequest as RaftSnapshotRequest, InstallSnapshotResponse as RaftSnapshotResponse,
    VoteRequest as RaftVoteRequest, VoteResponse as RaftVoteResponse,
};
use openraft::BasicNode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tonic::transport::Channel;

/// Factory handing out one [`PeerConnection`] per cluster peer.
#[derive(Clone, Copy, Default)]
pub struct RaftTransport;

impl RaftTransport {
    /// Create the transport factory.
    pub fn new() -> Self {
        Self
    }
}

impl RaftNetworkFactory<TypeConfig> for RaftTransport {
    type Network = PeerConnection;

    async fn new_client(&mut self, target: NodeId, node: &BasicNode) -> Self::Network {
        PeerConnection {
            target,
            addr: node.addr.clone(),
            client: None,
        }
    }
}

/// A lazily dialed gRPC connection to one peer.
///
/// The channel is created on first use and reconnects on its own, so a
/// peer being down fails the individual RPC instead of the connection
/// setup.
pub struct PeerConnection {
    target: NodeId,
    addr: String,
    client: Option<RaftServiceClient<Channel>>,
}

impl PeerConnection {
    fn client(&mut self) -> Result<RaftServiceClient<Channel>, ClusterError> {
        if let Some(client) = &self.client {
            return Ok(client.clone());
        }

        tracing::debug!(target = self.target, addr = %self.addr, "dialing raft peer");
        let channel = Channel::from_shared(format!("http://{}", self.addr))
            .map_err(|e| ClusterError::Config(e.to_string()))?
            .connect_lazy();
        let client = RaftServiceClient::new(channel);
        self.client = Some(client.clone());
        Ok(client)
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, ClusterError> {
    Ok(serde_json::to_vec(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ClusterError> {
    Ok(serde_json::from_slice(bytes)?)
}

// A failed RPC send means the peer is unreachable and the consensus layer
// should back off and retry; everything else (bad envelope, bad address)
// is a network fault.

fn rpc_error(e: ClusterError) -> RPCError {
    match e {
        ClusterError::Network(status) => RPCError::Unreachable(Unreachable::new(&status)),
        other => RPCError::Network(NetworkError::new(&other)),
    }
}

fn snapshot_rpc_error(e: ClusterError) -> RPCError<InstallSnapshotError> {
    match e {
        ClusterError::Network(status) => RPCError::Unreachable(Unreachable::new(&status)),
        other => RPCError::Network(NetworkError::new(&other)),
    }
}

impl RaftNetwork<TypeConfig> for PeerConnection {
    async fn append_entries(
        &mut self,
        req: RaftAppendRequest<TypeConfig>,
        _option: RPCOption,
    ) -> Result<RaftAppendResponse<NodeId>, RPCError> {
        let mut client = self.client().map_err(rpc_error)?;
        let data = encode(&req).map_err(rpc_error)?;

        let reply = client
            .append_entries(AppendEntriesRequest { data })
            .await
            .map_err(|status| rpc_error(ClusterError::Network(status)))?;

        decode(&reply.into_inner().data).map_err(rpc_error)
    }

    async fn vote(
        &mut self,
        req: RaftVoteRequest<NodeId>,
        _option: RPCOption,
    ) -> Result<RaftVoteResponse<NodeId>, RPCError> {
        let mut client = self.client().map_err(rpc_error)?;
        let data = encode(&req).map_err(rpc_error)?;

        let reply = client
            .request_vote(VoteRequest { data })
            .await
            .map_err(|status| rpc_error(ClusterError::Network(status)))?;

        decode(&reply.into_inner().data).map_err(rpc_error)
    }

    async fn install_snapshot(
        &mut self,
        req: RaftSnapshotRequest<TypeConfig>,
        _option: RPCOption,
    ) -> Result<RaftSnapshotResponse<NodeId>, RPCError<InstallSnapshotError>> {
        let mut client = self.client().map_err(snapshot_rpc_error)?;
        let data = encode(&req).map_err(snapshot_rpc_error)?;

        let reply = client
            .install_snapshot(InstallSnapshotRequest { data })
            .await
            .map_err(|status| snapshot_rpc_error(ClusterError::Network(status)))?;

        decode(&reply.into_inner().data).map_err(snapshot_rpc_error)
    }
}
