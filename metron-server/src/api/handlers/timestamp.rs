//! The timestamp handler.

use crate::api::response;
use crate::api::state::AppState;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response};
use metron_cluster::ClusterError;
use std::sync::Arc;
use tokio::time::Instant;

/// GET /timestamp?count=N
///
/// On the leader: `16 * N` bytes of timestamps (N defaults to 1). On a
/// follower: a permanent redirect to the leader's advertised address.
pub async fn get(req: Request<Incoming>, state: Arc<AppState>) -> Response<Full<Bytes>> {
    let count = match parse_count(req.uri().query()) {
        Ok(count) => count,
        Err(message) => return response::bad_request(message),
    };

    let deadline = Instant::now() + state.request_timeout;
    match state.node.issue_timestamps(count, deadline).await {
        Ok(bytes) => response::ok_octet_stream(bytes),
        // Only the leader assigns indices; point the client at it.
        Err(ClusterError::NotLeader { .. }) => redirect_to_leader(&state, count).await,
        Err(ClusterError::Unavailable) => response::not_ready(),
        Err(ClusterError::InvalidCount(n)) => {
            response::bad_request(format!("count must be at least 1, got {n}"))
        }
        Err(ClusterError::Timeout) => response::gateway_timeout(),
        Err(e) => {
            tracing::error!(error = %e, "timestamp request failed");
            response::internal_error()
        }
    }
}

async fn redirect_to_leader(state: &AppState, count: u32) -> Response<Full<Bytes>> {
    match state.node.membership().await {
        Ok(view) => response::redirect_permanent(&redirect_location(&view.leader.addr, count)),
        Err(e) => {
            tracing::warn!(error = %e, "membership lookup for redirect failed");
            response::not_ready()
        }
    }
}

/// Parse the `count` query parameter, defaulting to 1.
fn parse_count(query: Option<&str>) -> Result<u32, String> {
    let Some(query) = query else {
        return Ok(1);
    };

    let Some(raw) = query
        .split('&')
        .find_map(|pair| pair.strip_prefix("count="))
    else {
        return Ok(1);
    };

    let count: u32 = raw
        .parse()
        .map_err(|_| format!("invalid count '{raw}'"))?;
    if count < 1 {
        return Err(format!("count must be at least 1, got {count}"));
    }
    Ok(count)
}

/// Absolute redirect target on the leader, preserving the batch size.
fn redirect_location(leader_addr: &str, count: u32) -> String {
    let base = if leader_addr.contains("://") {
        leader_addr.trim_end_matches('/').to_string()
    } else {
        format!("http://{leader_addr}")
    };
    if count == 1 {
        format!("{base}/timestamp")
    } else {
        format!("{base}/timestamp?count={count}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_defaults_to_one() {
        assert_eq!(parse_count(None), Ok(1));
        assert_eq!(parse_count(Some("")), Ok(1));
        assert_eq!(parse_count(Some("other=5")), Ok(1));
    }

    #[test]
    fn count_is_parsed_from_query() {
        assert_eq!(parse_count(Some("count=5")), Ok(5));
        assert_eq!(parse_count(Some("other=x&count=12")), Ok(12));
    }

    #[test]
    fn zero_and_garbage_counts_are_rejected() {
        assert!(parse_count(Some("count=0")).is_err());
        assert!(parse_count(Some("count=-3")).is_err());
        assert!(parse_count(Some("count=abc")).is_err());
    }

    #[test]
    fn redirect_preserves_count() {
        assert_eq!(
            redirect_location("10.0.0.1:8080", 1),
            "http://10.0.0.1:8080/timestamp"
        );
        assert_eq!(
            redirect_location("10.0.0.1:8080", 5),
            "http://10.0.0.1:8080/timestamp?count=5"
        );
        assert_eq!(
            redirect_location("https://ts.example.com", 2),
            "https://ts.example.com/timestamp?count=2"
        );
    }
}
