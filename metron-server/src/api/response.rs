//! Response builders for the API.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

/// Build a plain-text response with a status code.
pub fn text(status: StatusCode, body: impl Into<String>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "text/plain; charset=utf-8")
        .body(Full::new(Bytes::from(body.into())))
        .expect("response builder should not fail")
}

/// Build a 200 OK plain-text response.
pub fn ok_text(body: impl Into<String>) -> Response<Full<Bytes>> {
    text(StatusCode::OK, body)
}

/// Build a 200 OK JSON response.
pub fn ok_json<T: Serialize>(body: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(body) {
        Ok(json) => Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "application/json")
            .body(Full::new(Bytes::from(json)))
            .expect("response builder should not fail"),
        Err(e) => {
            tracing::error!(error = %e, "response serialization failed");
            internal_error()
        }
    }
}

/// Build a 200 OK binary response.
pub fn ok_octet_stream(body: Bytes) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/octet-stream")
        .body(Full::new(body))
        .expect("response builder should not fail")
}

/// Build a 308 Permanent Redirect to the given location.
pub fn redirect_permanent(location: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::PERMANENT_REDIRECT)
        .header("Location", location)
        .body(Full::new(Bytes::new()))
        .expect("response builder should not fail")
}

/// Build a 400 Bad Request response.
pub fn bad_request(message: impl Into<String>) -> Response<Full<Bytes>> {
    text(StatusCode::BAD_REQUEST, message)
}

/// Build a 404 Not Found response.
pub fn not_found() -> Response<Full<Bytes>> {
    text(StatusCode::NOT_FOUND, "not found")
}

/// Build a 500 response without leaking internal detail.
pub fn internal_error() -> Response<Full<Bytes>> {
    text(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Something went wrong internally, an error has been logged",
    )
}

/// Build the 500 response for a missing leadership view.
pub fn not_ready() -> Response<Full<Bytes>> {
    text(StatusCode::INTERNAL_SERVER_ERROR, "raft leadership not ready")
}

/// Build a 504 response for an expired request deadline.
pub fn gateway_timeout() -> Response<Full<Bytes>> {
    text(StatusCode::GATEWAY_TIMEOUT, "deadline exceeded")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_text_response() {
        let response = ok_text("ok");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("Content-Type").unwrap(),
            "text/plain; charset=utf-8"
        );
    }

    #[test]
    fn octet_stream_response() {
        let response = ok_octet_stream(Bytes::from_static(&[0u8; 16]));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("Content-Type").unwrap(),
            "application/octet-stream"
        );
    }

    #[test]
    fn redirect_carries_location() {
        let response = redirect_permanent("http://10.0.0.1:8080/timestamp");
        assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);
        assert_eq!(
            response.headers().get("Location").unwrap(),
            "http://10.0.0.1:8080/timestamp"
        );
    }

    #[test]
    fn not_ready_body_matches_contract() {
        let response = not_ready();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
