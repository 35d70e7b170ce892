//! Cluster configuration.

use crate::error::{ClusterError, ClusterResult};
use crate::types::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Addresses advertised for one peer: the Raft transport endpoint and the
/// HTTP endpoint clients get redirected to when that peer is the leader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerAddr {
    /// Peer-visible address of the Raft gRPC transport.
    pub raft_addr: String,
    /// Advertised HTTP address, used for leader redirects.
    pub http_addr: String,
}

impl std::str::FromStr for PeerAddr {
    type Err = ClusterError;

    /// Parse `"<raft_addr>;<http_addr>"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (raft_addr, http_addr) = s
            .split_once(';')
            .ok_or_else(|| ClusterError::Config(format!("peer address '{s}' must be 'raft;http'")))?;
        if raft_addr.is_empty() || http_addr.is_empty() {
            return Err(ClusterError::Config(format!(
                "peer address '{s}' has an empty component"
            )));
        }
        Ok(Self {
            raft_addr: raft_addr.to_string(),
            http_addr: http_addr.to_string(),
        })
    }
}

/// Parse a static peer map of the form
/// `"2=host:5001;host:8081,3=host:5002;host:8082"`.
pub fn parse_peer_map(s: &str) -> ClusterResult<HashMap<NodeId, PeerAddr>> {
    let mut peers = HashMap::new();
    for item in s.split(',').filter(|item| !item.is_empty()) {
        let (id, addr) = item
            .split_once('=')
            .ok_or_else(|| ClusterError::Config(format!("peer '{item}' must be 'id=raft;http'")))?;
        let id: NodeId = id
            .trim()
            .parse()
            .map_err(|_| ClusterError::Config(format!("invalid peer node id '{id}'")))?;
        peers.insert(id, addr.parse()?);
    }
    Ok(peers)
}

/// Configuration for a cluster node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// This node's unique ID in the cluster (1-based).
    pub node_id: NodeId,

    /// Address this node listens on for Raft RPC (e.g., "0.0.0.0:5000").
    pub listen_addr: String,

    /// Address advertised to other nodes (e.g., "192.168.1.10:5000").
    /// If not set, uses listen_addr.
    pub advertise_addr: Option<String>,

    /// This node's advertised HTTP address, used for leader redirects.
    pub http_addr: String,

    /// Peer nodes in the cluster: node_id -> addresses.
    pub peers: HashMap<NodeId, PeerAddr>,

    /// Directory for the Raft log and the epoch record.
    pub data_dir: PathBuf,

    /// Raft timing configuration.
    pub raft: RaftTuning,

    /// Epoch timing configuration.
    pub epoch: EpochTiming,

    /// Capacity of the pending timestamp-request queue.
    pub request_buffer: usize,
}

/// Raft timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaftTuning {
    /// Election timeout range (min, max) in milliseconds.
    /// Should be >> heartbeat_interval to avoid spurious elections.
    pub election_timeout_ms: (u64, u64),

    /// Heartbeat interval in milliseconds.
    pub heartbeat_interval_ms: u64,

    /// Maximum entries per AppendEntries RPC.
    pub max_entries_per_append: u64,

    /// Create a snapshot after this many log entries.
    pub snapshot_threshold: u64,
}

/// Epoch advancement and dispatch timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochTiming {
    /// Base round-trip estimate in milliseconds. Linearizable reads get a
    /// 100x budget, proposals a 200x budget.
    pub rtt_ms: u64,

    /// Advancer tick period in milliseconds.
    pub epoch_interval_ms: u64,

    /// Consecutive propose deadlines tolerated before the advancer declares
    /// the leader unusable and terminates the process.
    pub epoch_deadline_limit: u32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            node_id: 1,
            listen_addr: "127.0.0.1:5000".to_string(),
            advertise_addr: None,
            http_addr: "127.0.0.1:8080".to_string(),
            peers: HashMap::new(),
            data_dir: PathBuf::from("./metron-data"),
            raft: RaftTuning::default(),
            epoch: EpochTiming::default(),
            request_buffer: 10_000,
        }
    }
}

impl Default for RaftTuning {
    fn default() -> Self {
        Self {
            // Election timeout: 150-300ms (standard Raft recommendation)
            election_timeout_ms: (150, 300),
            // Heartbeat: 50ms (should be << election timeout)
            heartbeat_interval_ms: 50,
            max_entries_per_append: 100,
            // The log carries ~10 tiny proposals per second; compact often.
            snapshot_threshold: 1_000,
        }
    }
}

impl Default for EpochTiming {
    fn default() -> Self {
        Self {
            rtt_ms: 10,
            epoch_interval_ms: 100,
            epoch_deadline_limit: 100,
        }
    }
}

impl ClusterConfig {
    /// Create a new configuration builder.
    pub fn builder() -> ClusterConfigBuilder {
        ClusterConfigBuilder::default()
    }

    /// Get the advertised Raft address (falls back to listen_addr).
    pub fn advertise_addr(&self) -> &str {
        self.advertise_addr.as_deref().unwrap_or(&self.listen_addr)
    }

    /// Advertised HTTP address for a cluster member, if known.
    pub fn http_addr_for(&self, node_id: NodeId) -> Option<&str> {
        if node_id == self.node_id {
            Some(&self.http_addr)
        } else {
            self.peers.get(&node_id).map(|p| p.http_addr.as_str())
        }
    }

    /// Path of the epoch record file.
    pub fn epoch_file(&self) -> PathBuf {
        self.data_dir.join(format!("epoch-{}.json", self.node_id))
    }

    /// Directory of the Raft log store.
    pub fn raft_dir(&self) -> PathBuf {
        self.data_dir.join("raft")
    }

    /// Budget for one linearizable read: 100x the round-trip estimate.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.epoch.rtt_ms * 100)
    }

    /// Budget for one proposal: 200x the round-trip estimate.
    pub fn propose_timeout(&self) -> Duration {
        Duration::from_millis(self.epoch.rtt_ms * 200)
    }

    /// Advancer tick period.
    pub fn epoch_interval(&self) -> Duration {
        Duration::from_millis(self.epoch.epoch_interval_ms)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.node_id == 0 {
            return Err("node_id must be > 0".to_string());
        }

        if self.listen_addr.is_empty() {
            return Err("listen_addr is required".to_string());
        }

        if self.http_addr.is_empty() {
            return Err("http_addr is required".to_string());
        }

        if self.peers.contains_key(&self.node_id) {
            return Err(format!(
                "peers must not contain this node's own id ({})",
                self.node_id
            ));
        }

        if self.epoch.rtt_ms == 0 {
            return Err("rtt_ms must be > 0".to_string());
        }

        if self.epoch.epoch_interval_ms == 0 {
            return Err("epoch_interval_ms must be > 0".to_string());
        }

        if self.request_buffer == 0 {
            return Err("request_buffer must be > 0".to_string());
        }

        // Heartbeat should be much less than election timeout
        let (min_election, _) = self.raft.election_timeout_ms;
        if self.raft.heartbeat_interval_ms >= min_election / 2 {
            return Err(format!(
                "heartbeat_interval_ms ({}) should be << election_timeout_ms ({})",
                self.raft.heartbeat_interval_ms, min_election
            ));
        }

        Ok(())
    }
}

/// Builder for ClusterConfig.
#[derive(Debug, Default)]
pub struct ClusterConfigBuilder {
    config: ClusterConfig,
}

impl ClusterConfigBuilder {
    /// Set the node ID.
    pub fn node_id(mut self, id: NodeId) -> Self {
        self.config.node_id = id;
        self
    }

    /// Set the Raft listen address.
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the advertised Raft address.
    pub fn advertise_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.advertise_addr = Some(addr.into());
        self
    }

    /// Set the advertised HTTP address.
    pub fn http_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.http_addr = addr.into();
        self
    }

    /// Add a peer node.
    pub fn peer(
        mut self,
        node_id: NodeId,
        raft_addr: impl Into<String>,
        http_addr: impl Into<String>,
    ) -> Self {
        self.config.peers.insert(
            node_id,
            PeerAddr {
                raft_addr: raft_addr.into(),
                http_addr: http_addr.into(),
            },
        );
        self
    }

    /// Set all peers at once.
    pub fn peers(mut self, peers: impl IntoIterator<Item = (NodeId, PeerAddr)>) -> Self {
        self.config.peers = peers.into_iter().collect();
        self
    }

    /// Set the data directory.
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the base round-trip estimate in milliseconds.
    pub fn rtt_ms(mut self, ms: u64) -> Self {
        self.config.epoch.rtt_ms = ms;
        self
    }

    /// Set the advancer tick period in milliseconds.
    pub fn epoch_interval_ms(mut self, ms: u64) -> Self {
        self.config.epoch.epoch_interval_ms = ms;
        self
    }

    /// Set the consecutive propose-deadline limit.
    pub fn epoch_deadline_limit(mut self, limit: u32) -> Self {
        self.config.epoch.epoch_deadline_limit = limit;
        self
    }

    /// Set the request queue capacity.
    pub fn request_buffer(mut self, capacity: usize) -> Self {
        self.config.request_buffer = capacity;
        self
    }

    /// Set election timeout range in milliseconds.
    pub fn election_timeout_ms(mut self, min: u64, max: u64) -> Self {
        self.config.raft.election_timeout_ms = (min, max);
        self
    }

    /// Set heartbeat interval in milliseconds.
    pub fn heartbeat_interval_ms(mut self, ms: u64) -> Self {
        self.config.raft.heartbeat_interval_ms = ms;
        self
    }

    /// Set snapshot threshold.
    pub fn snapshot_threshold(mut self, entries: u64) -> Self {
        self.config.raft.snapshot_threshold = entries;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ClusterResult<ClusterConfig> {
        self.config.validate().map_err(ClusterError::Config)?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_produces_valid_config() {
        let config = ClusterConfig::builder()
            .node_id(2)
            .listen_addr("127.0.0.1:5001")
            .http_addr("127.0.0.1:8081")
            .peer(1, "127.0.0.1:5000", "127.0.0.1:8080")
            .data_dir("/tmp/metron-test")
            .build()
            .expect("valid config");

        assert_eq!(config.node_id, 2);
        assert_eq!(config.epoch_file(), PathBuf::from("/tmp/metron-test/epoch-2.json"));
        assert_eq!(config.http_addr_for(2), Some("127.0.0.1:8081"));
        assert_eq!(config.http_addr_for(1), Some("127.0.0.1:8080"));
        assert_eq!(config.http_addr_for(9), None);
    }

    #[test]
    fn zero_node_id_is_rejected() {
        let err = ClusterConfig::builder()
            .node_id(0)
            .build()
            .expect_err("node_id 0 must fail");
        assert!(matches!(err, ClusterError::Config(_)));
    }

    #[test]
    fn own_id_in_peer_map_is_rejected() {
        let result = ClusterConfig::builder()
            .node_id(1)
            .peer(1, "127.0.0.1:5000", "127.0.0.1:8080")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn timeout_budgets_scale_from_rtt() {
        let config = ClusterConfig::builder().rtt_ms(10).build().expect("config");
        assert_eq!(config.read_timeout(), Duration::from_millis(1_000));
        assert_eq!(config.propose_timeout(), Duration::from_millis(2_000));
    }

    #[test]
    fn parses_peer_map() {
        let peers =
            parse_peer_map("2=host-b:5001;host-b:8081,3=host-c:5002;host-c:8082").expect("parse");

        assert_eq!(peers.len(), 2);
        assert_eq!(peers[&2].raft_addr, "host-b:5001");
        assert_eq!(peers[&2].http_addr, "host-b:8081");
        assert_eq!(peers[&3].http_addr, "host-c:8082");
    }

    #[test]
    fn empty_peer_map_is_empty() {
        assert!(parse_peer_map("").expect("parse").is_empty());
    }

    #[test]
    fn malformed_peer_entries_are_rejected() {
        assert!(parse_peer_map("2=host:5001").is_err(), "missing http addr");
        assert!(parse_peer_map("x=host:5001;host:8081").is_err(), "bad id");
        assert!(parse_peer_map("host:5001;host:8081").is_err(), "missing id");
    }
}
