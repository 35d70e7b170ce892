//! Common test utilities for metron-cluster tests.

use metron_cluster::{ClusterConfig, EpochNode, Timestamp, TIMESTAMP_LEN};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// Atomic counter for allocating unique ports.
static PORT_COUNTER: AtomicU16 = AtomicU16::new(21000);

/// Get a unique port for testing.
pub fn get_test_port() -> u16 {
    PORT_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Parse a `16 * n` byte response body into timestamps.
pub fn parse_timestamps(bytes: &[u8]) -> Vec<Timestamp> {
    assert_eq!(
        bytes.len() % TIMESTAMP_LEN,
        0,
        "body length {} is not a multiple of {}",
        bytes.len(),
        TIMESTAMP_LEN
    );
    bytes
        .chunks(TIMESTAMP_LEN)
        .map(|chunk| Timestamp::from_bytes(chunk.try_into().expect("16-byte chunk")))
        .collect()
}

/// Poll `probe` until it returns `Some` or the timeout elapses.
pub async fn wait_until<T, F, Fut>(timeout_ms: u64, mut probe: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Option<T>>,
{
    let start = std::time::Instant::now();
    let timeout = Duration::from_millis(timeout_ms);

    while start.elapsed() < timeout {
        if let Some(value) = probe().await {
            return Some(value);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    None
}

/// Test context that holds temp directories and nodes.
#[allow(dead_code)]
pub struct TestCluster {
    /// Temp directories for each node (kept alive for the test duration).
    _temp_dirs: Vec<TempDir>,
    /// Cluster nodes.
    pub nodes: Vec<EpochNode>,
    /// Raft addresses.
    pub raft_addrs: Vec<String>,
    /// Advertised HTTP addresses.
    pub http_addrs: Vec<String>,
}

#[allow(dead_code)]
impl TestCluster {
    /// Create a new test cluster with the specified number of nodes.
    pub async fn new(node_count: usize) -> Self {
        let mut temp_dirs = Vec::with_capacity(node_count);
        let mut raft_addrs = Vec::with_capacity(node_count);
        let mut http_addrs = Vec::with_capacity(node_count);

        let mut specs = Vec::with_capacity(node_count);
        for i in 0..node_count {
            let raft_addr = format!("127.0.0.1:{}", get_test_port());
            let http_addr = format!("127.0.0.1:{}", get_test_port());
            raft_addrs.push(raft_addr.clone());
            http_addrs.push(http_addr.clone());

            let temp_dir = TempDir::new().expect("Failed to create temp dir");
            let data_dir = temp_dir.path().to_path_buf();
            temp_dirs.push(temp_dir);

            specs.push((i as u64 + 1, raft_addr, http_addr, data_dir));
        }

        let mut nodes = Vec::with_capacity(node_count);
        for (node_id, raft_addr, http_addr, data_dir) in &specs {
            let mut builder = ClusterConfig::builder()
                .node_id(*node_id)
                .listen_addr(raft_addr.clone())
                .http_addr(http_addr.clone())
                .data_dir(data_dir.clone());

            for (peer_id, peer_raft, peer_http, _) in &specs {
                if peer_id != node_id {
                    builder = builder.peer(*peer_id, peer_raft.clone(), peer_http.clone());
                }
            }

            let config = builder.build().expect("Invalid config");
            let node = EpochNode::start(config).await.expect("Failed to start node");
            nodes.push(node);
        }

        Self {
            _temp_dirs: temp_dirs,
            nodes,
            raft_addrs,
            http_addrs,
        }
    }

    /// Bootstrap the cluster from the first node's static peer map.
    pub async fn bootstrap(&self) {
        self.nodes[0]
            .bootstrap()
            .await
            .expect("Failed to bootstrap cluster");
    }

    /// Wait for a leader to be elected, returning its node ID.
    pub async fn wait_for_leader(&self, timeout_ms: u64) -> Option<u64> {
        wait_until(timeout_ms, || async {
            for node in &self.nodes {
                if let Some(leader) = node.leader().await {
                    return Some(leader);
                }
            }
            None
        })
        .await
    }

    /// Wait until a node other than `exclude` is leader and knows it.
    pub async fn wait_for_new_leader(&self, exclude: u64, timeout_ms: u64) -> Option<usize> {
        wait_until(timeout_ms, || async {
            for (i, node) in self.nodes.iter().enumerate() {
                if node.node_id() != exclude && node.is_leader().await {
                    return Some(i);
                }
            }
            None
        })
        .await
    }

    /// Index of the current leader node, if this process hosts it.
    pub async fn leader_index(&self) -> Option<usize> {
        let leader = self.nodes[0].leader().await?;
        self.nodes.iter().position(|n| n.node_id() == leader)
    }

    /// Shutdown all nodes.
    pub async fn shutdown(&mut self) {
        for node in &mut self.nodes {
            let _ = node.shutdown().await;
        }
    }
}
