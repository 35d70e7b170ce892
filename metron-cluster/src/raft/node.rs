//! EpochNode - the main entry point for cluster operations.

use crate::advancer::EpochAdvancer;
use crate::config::ClusterConfig;
use crate::dispatch::Dispatcher;
use crate::error::{ClusterError, ClusterResult, InitializeError};
use crate::machine::EpochStateMachine;
use crate::network::{RaftServer, RaftTransport};
use crate::proto::raft_service_server::RaftServiceServer;
use crate::raft::storage::LogStorage;
use crate::types::{EpochRaft, NodeId, TypeConfig};
use bytes::Bytes;
use openraft::{BasicNode, Config, Raft};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;
use tonic::transport::Server;

/// One cluster member as reported to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// The member's node ID.
    pub node_id: NodeId,
    /// The member's advertised HTTP address.
    pub addr: String,
}

/// The cluster membership from this node's point of view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipView {
    /// The current leader.
    pub leader: Member,
    /// All voting members, sorted by node ID.
    pub members: Vec<Member>,
}

/// A node of the timestamp cluster.
///
/// This is the main entry point: it owns the Raft instance, the epoch state
/// machine, the request dispatcher, and the epoch advancer, and answers the
/// leadership and membership queries the HTTP surface needs for redirects.
pub struct EpochNode {
    /// This node's ID.
    node_id: NodeId,
    /// Static cluster configuration.
    config: ClusterConfig,
    /// The Raft instance.
    raft: Arc<EpochRaft>,
    /// The epoch state machine (for local reads).
    machine: Arc<EpochStateMachine>,
    /// Enqueue handle for timestamp requests.
    dispatcher: Dispatcher,
    /// Stop signal for the dispatcher reader and the advancer.
    stop_tx: watch::Sender<bool>,
    /// Shutdown signal sender for the gRPC server.
    grpc_shutdown_tx: Option<oneshot::Sender<()>>,
    /// Guards against re-running the shutdown sequence.
    stopped: bool,
}

impl EpochNode {
    /// Start a new cluster node.
    pub async fn start(config: ClusterConfig) -> ClusterResult<Self> {
        config.validate().map_err(ClusterError::Config)?;

        let node_id = config.node_id;
        std::fs::create_dir_all(&config.data_dir)?;

        // Create storage and the state machine
        let log_storage = LogStorage::open(config.raft_dir())?;
        let machine = Arc::new(EpochStateMachine::open(config.epoch_file())?);

        // Create the peer transport
        let network = RaftTransport::new();

        // Create Raft config
        let raft_config = Config {
            cluster_name: "metron".to_string(),
            election_timeout_min: config.raft.election_timeout_ms.0,
            election_timeout_max: config.raft.election_timeout_ms.1,
            heartbeat_interval: config.raft.heartbeat_interval_ms,
            max_payload_entries: config.raft.max_entries_per_append,
            snapshot_policy: openraft::SnapshotPolicy::LogsSinceLast(
                config.raft.snapshot_threshold,
            ),
            ..Default::default()
        };

        let raft_config = Arc::new(
            raft_config
                .validate()
                .map_err(|e| ClusterError::Config(e.to_string()))?,
        );

        // Create Raft instance
        let raft = Raft::<TypeConfig>::new(
            node_id,
            raft_config,
            network,
            log_storage,
            Arc::clone(&machine),
        )
        .await
        .map_err(|e| ClusterError::Raft(format!("failed to create raft: {:?}", e)))?;

        let raft = Arc::new(raft);

        // Start the Raft gRPC server
        let (grpc_shutdown_tx, grpc_shutdown_rx) = oneshot::channel();
        let raft_server = RaftServer::new(Arc::clone(&raft));
        let addr = config
            .listen_addr
            .parse()
            .map_err(|e: std::net::AddrParseError| ClusterError::Config(e.to_string()))?;

        tokio::spawn(async move {
            let _ = Server::builder()
                .add_service(RaftServiceServer::new(raft_server))
                .serve_with_shutdown(addr, async {
                    let _ = grpc_shutdown_rx.await;
                })
                .await;
        });

        // Start the dispatcher reader and the epoch advancer
        let (stop_tx, stop_rx) = watch::channel(false);

        let (dispatcher, reader) = Dispatcher::new(
            Arc::clone(&raft),
            Arc::clone(&machine),
            config.request_buffer,
            config.read_timeout(),
            config.propose_timeout(),
            stop_rx.clone(),
        );
        tokio::spawn(reader.run());

        let advancer = EpochAdvancer {
            raft: Arc::clone(&raft),
            node_id,
            shared: dispatcher.shared(),
            interval: config.epoch_interval(),
            propose_timeout: config.propose_timeout(),
            deadline_limit: config.epoch.epoch_deadline_limit,
            stop_rx,
        };
        tokio::spawn(advancer.run());

        tracing::info!(
            node_id,
            raft_addr = %config.listen_addr,
            http_addr = %config.http_addr,
            "epoch node started"
        );

        Ok(Self {
            node_id,
            config,
            raft,
            machine,
            dispatcher,
            stop_tx,
            grpc_shutdown_tx: Some(grpc_shutdown_tx),
            stopped: false,
        })
    }

    /// Initialize the cluster from the static peer map.
    ///
    /// Call once when bootstrapping a fresh cluster; on an already
    /// initialized cluster this is a no-op, so it is safe to pass
    /// `--bootstrap` on every restart of the same node.
    pub async fn bootstrap(&self) -> ClusterResult<()> {
        let mut members = BTreeMap::new();
        members.insert(
            self.node_id,
            BasicNode {
                addr: self.config.advertise_addr().to_string(),
            },
        );
        for (node_id, peer) in &self.config.peers {
            members.insert(
                *node_id,
                BasicNode {
                    addr: peer.raft_addr.clone(),
                },
            );
        }

        match self.raft.initialize(members).await {
            Ok(()) => {
                tracing::info!(node_id = self.node_id, "cluster initialized");
                Ok(())
            }
            Err(openraft::error::RaftError::APIError(InitializeError::NotAllowed(_))) => {
                tracing::debug!(node_id = self.node_id, "cluster already initialized");
                Ok(())
            }
            Err(e) => Err(ClusterError::raft(e)),
        }
    }

    /// Obtain `count` unique timestamps, encoded as `16 * count` bytes.
    ///
    /// Only the leader assigns indices: a follower fails with
    /// [`ClusterError::NotLeader`] so callers can redirect, and a node
    /// without a leader view fails with [`ClusterError::Unavailable`].
    /// The deadline bounds queueing and the reply wait.
    pub async fn issue_timestamps(&self, count: u32, deadline: Instant) -> ClusterResult<Bytes> {
        match self.raft.current_leader().await {
            Some(leader) if leader == self.node_id => {
                self.dispatcher.issue(count, deadline).await
            }
            Some(leader) => Err(ClusterError::NotLeader { leader }),
            None => Err(ClusterError::Unavailable),
        }
    }

    /// The current leader's node ID, based on local knowledge. `None` means
    /// this node has not converged on a leader view yet.
    pub async fn leader(&self) -> Option<NodeId> {
        self.raft.current_leader().await
    }

    /// Check if this node is the leader.
    pub async fn is_leader(&self) -> bool {
        self.raft.current_leader().await == Some(self.node_id)
    }

    /// Get this node's ID.
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Cluster membership with advertised HTTP addresses.
    ///
    /// Fails with [`ClusterError::Unavailable`] while no leader is known.
    /// Members outside the static peer map fall back to their Raft address.
    pub async fn membership(&self) -> ClusterResult<MembershipView> {
        let metrics = self.raft.metrics().borrow().clone();
        let leader_id = metrics.current_leader.ok_or(ClusterError::Unavailable)?;

        let mut members = Vec::new();
        for (node_id, node) in metrics.membership_config.nodes() {
            let addr = self
                .config
                .http_addr_for(*node_id)
                .map(str::to_string)
                .unwrap_or_else(|| node.addr.clone());
            members.push(Member {
                node_id: *node_id,
                addr,
            });
        }
        members.sort_by_key(|m| m.node_id);

        let leader = members
            .iter()
            .find(|m| m.node_id == leader_id)
            .cloned()
            .ok_or(ClusterError::NodeNotFound(leader_id))?;

        Ok(MembershipView { leader, members })
    }

    /// Get a reference to the epoch state machine for local reads.
    pub fn state_machine(&self) -> &Arc<EpochStateMachine> {
        &self.machine
    }

    /// Get cluster metrics.
    pub fn metrics(&self) -> openraft::RaftMetrics<NodeId, BasicNode> {
        self.raft.metrics().borrow().clone()
    }

    /// Trigger a snapshot.
    pub async fn trigger_snapshot(&self) -> ClusterResult<()> {
        self.raft
            .trigger()
            .snapshot()
            .await
            .map_err(ClusterError::raft)?;
        Ok(())
    }

    /// Shutdown the node gracefully. Subsequent calls are no-ops.
    pub async fn shutdown(&mut self) -> ClusterResult<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;

        // Stop the advancer and the dispatch reader before raft so their
        // in-flight consensus calls resolve as shutdown, not as fatal
        // consensus failures.
        let _ = self.stop_tx.send(true);

        if let Some(tx) = self.grpc_shutdown_tx.take() {
            let _ = tx.send(());
        }

        self.raft
            .shutdown()
            .await
            .map_err(|e| ClusterError::Raft(format!("shutdown error: {:?}", e)))?;

        self.machine.close().await;

        tracing::info!(node_id = self.node_id, "epoch node shutdown");
        Ok(())
    }
}

impl Drop for EpochNode {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(true);
        if let Some(tx) = self.grpc_shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
