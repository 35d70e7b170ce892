//! Inbound Raft RPC: the gRPC service peers call on this node.

use crate::error::ClusterError;
use crate::proto::raft_service_server::RaftService;
use crate::proto::{
    AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest, InstallSnapshotResponse,
    VoteRequest, VoteResponse,
};
use crate::types::{EpochRaft, NodeId, TypeConfig};
use openraft::raft::{
    AppendEntriesRequest as RaftAppendRequest, InstallSnapshotRequest as RaftSnapshotRequest,
    VoteRequest as RaftVoteRequest,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tonic::{Request, Response, Status};

/// Serves Raft RPCs by unwrapping the JSON envelope and handing the
/// request to the local Raft instance.
pub struct RaftServer {
    raft: Arc<EpochRaft>,
}

impl RaftServer {
    /// Create a new Raft server.
    pub fn new(raft: Arc<EpochRaft>) -> Self {
        Self { raft }
    }
}

/// A peer sent an envelope this node cannot decode: their fault.
fn decode_payload<T: DeserializeOwned>(data: &[u8]) -> Result<T, Status> {
    serde_json::from_slice(data)
        .map_err(|e| Status::invalid_argument(ClusterError::from(e).to_string()))
}

/// This node failed to encode its own reply: our fault.
fn encode_payload<T: Serialize>(value: &T) -> Result<Vec<u8>, Status> {
    serde_json::to_vec(value).map_err(|e| Status::internal(ClusterError::from(e).to_string()))
}

#[tonic::async_trait]
impl RaftService for RaftServer {
    async fn append_entries(
        &self,
        request: Request<AppendEntriesRequest>,
    ) -> Result<Response<AppendEntriesResponse>, Status> {
        let req: RaftAppendRequest<TypeConfig> = decode_payload(&request.into_inner().data)?;

        let resp = self
            .raft
            .append_entries(req)
            .await
            .map_err(|e| Status::internal(e.to_string()))?;

        Ok(Response::new(AppendEntriesResponse {
            data: encode_payload(&resp)?,
        }))
    }

    async fn request_vote(
        &self,
        request: Request<VoteRequest>,
    ) -> Result<Response<VoteResponse>, Status> {
        let req: RaftVoteRequest<NodeId> = decode_payload(&request.into_inner().data)?;

        let resp = self
            .raft
            .vote(req)
            .await
            .map_err(|e| Status::internal(e.to_string()))?;

        Ok(Response::new(VoteResponse {
            data: encode_payload(&resp)?,
        }))
    }

    async fn install_snapshot(
        &self,
        request: Request<InstallSnapshotRequest>,
    ) -> Result<Response<InstallSnapshotResponse>, Status> {
        let req: RaftSnapshotRequest<TypeConfig> = decode_payload(&request.into_inner().data)?;

        let resp = self
            .raft
            .install_snapshot(req)
            .await
            .map_err(|e| Status::internal(e.to_string()))?;

        Ok(Response::new(InstallSnapshotResponse {
            data: encode_payload(&resp)?,
        }))
    }
}
