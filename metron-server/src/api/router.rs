//! Request routing for the API.

use super::handlers;
use super::response;
use super::state::AppState;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Method, Request, Response};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

/// Route an incoming request to the appropriate handler.
pub async fn route(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = match (&method, path.as_str()) {
        (&Method::GET, "/up") => handlers::health::up().await,
        (&Method::GET, "/ready") => handlers::health::ready(state).await,
        (&Method::GET, "/timestamp") => handlers::timestamp::get(req, state).await,
        (&Method::GET, "/membership") => handlers::membership::get(state).await,
        _ => response::not_found(),
    };

    tracing::debug!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_us = start.elapsed().as_micros() as u64,
        "request served"
    );

    Ok(response)
}
