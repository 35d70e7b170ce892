//! Liveness and readiness handlers.

use crate::api::response;
use crate::api::state::AppState;
use bytes::Bytes;
use http_body_util::Full;
use hyper::Response;
use metron_cluster::NodeId;
use std::sync::Arc;

/// GET /up
///
/// Process liveness only; says nothing about the ability to serve.
pub async fn up() -> Response<Full<Bytes>> {
    response::ok_text("ok")
}

/// GET /ready
///
/// Ready once this node has converged on a leader view.
pub async fn ready(state: Arc<AppState>) -> Response<Full<Bytes>> {
    match state.node.leader().await {
        Some(leader) => response::ok_text(ready_body(leader, state.node.node_id(), true)),
        None => response::not_ready(),
    }
}

fn ready_body(leader: NodeId, node_id: NodeId, available: bool) -> String {
    format!("leader={leader} nodeID={node_id} raftAvailable={available}\n")
}
