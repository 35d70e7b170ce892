//! The membership handler.

use crate::api::response;
use crate::api::state::AppState;
use bytes::Bytes;
use http_body_util::Full;
use hyper::Response;
use metron_cluster::ClusterError;
use std::sync::Arc;

/// GET /membership
///
/// The leader and all voting members with their advertised HTTP addresses.
pub async fn get(state: Arc<AppState>) -> Response<Full<Bytes>> {
    match state.node.membership().await {
        Ok(view) => response::ok_json(&view),
        Err(ClusterError::Unavailable) => response::not_ready(),
        Err(e) => {
            tracing::error!(error = %e, "membership request failed");
            response::internal_error()
        }
    }
}
