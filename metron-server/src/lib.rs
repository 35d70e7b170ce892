//! HTTP surface for the metron timestamp cluster.
//!
//! Serves four routes on every node:
//!
//! - `GET /up`: process liveness
//! - `GET /ready`: leadership view availability
//! - `GET /timestamp[?count=N]`: `16 * N` timestamp bytes from the leader;
//!   followers answer with a `308` redirect to the leader's advertised
//!   address
//! - `GET /membership`: leader and members as JSON
//!
//! The crate also owns the `tracing` subscriber setup shared by every
//! metron binary.

pub mod api;
pub mod observability;

pub use api::{ApiServer, ServerConfig};
pub use observability::{init_tracing, LogFormat, TracingConfig};
