//! The HTTP API: server loop, routing, handlers, response builders.

mod handlers;
mod response;
mod router;
mod server;
mod state;

pub use server::{ApiServer, ServerConfig};
pub use state::AppState;
