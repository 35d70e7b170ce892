//! Shared application state for the API.

use metron_cluster::EpochNode;
use std::sync::Arc;
use std::time::Duration;

/// State shared by all request handlers.
pub struct AppState {
    /// The cluster node behind this API.
    pub node: Arc<EpochNode>,
    /// Deadline budget for one timestamp request.
    pub request_timeout: Duration,
}

impl AppState {
    /// Create application state with the default 1s request budget.
    pub fn new(node: Arc<EpochNode>) -> Self {
        Self {
            node,
            request_timeout: Duration::from_secs(1),
        }
    }
}
