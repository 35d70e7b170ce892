//! HTTP client for the metron timestamp cluster.
//!
//! Fetches single or batched timestamps from any cluster node; follower
//! redirects to the leader are followed transparently.
//!
//! ```no_run
//! use metron_client::Client;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::new("http://localhost:8080")?;
//! let ts = client.timestamp().await?;
//! println!("epoch={} index={}", ts.epoch, ts.index);
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod types;

pub use client::Client;
pub use error::{ClientError, Result};
pub use types::{Member, Membership, Timestamp, TIMESTAMP_LEN};
