//! Single-node cluster tests.
//!
//! A single node elects itself immediately, so these tests exercise the
//! full issue path (linearizable read, initialization proposals, epoch
//! swaps, index assignment) without multi-node timing.

mod common;

use metron_cluster::{wall_clock_nanos, ClusterConfig, EpochNode, TIMESTAMP_LEN};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::Instant;

fn single_node_config(data_dir: &std::path::Path) -> ClusterConfig {
    ClusterConfig::builder()
        .node_id(1)
        .listen_addr(format!("127.0.0.1:{}", common::get_test_port()))
        .http_addr(format!("127.0.0.1:{}", common::get_test_port()))
        .data_dir(data_dir)
        .build()
        .expect("Invalid config")
}

async fn start_leader(data_dir: &std::path::Path) -> EpochNode {
    let node = EpochNode::start(single_node_config(data_dir))
        .await
        .expect("Failed to start node");
    node.bootstrap().await.expect("Failed to bootstrap");

    common::wait_until(5_000, || async {
        node.is_leader().await.then_some(())
    })
    .await
    .expect("Single node should elect itself leader");

    node
}

fn deadline() -> Instant {
    Instant::now() + Duration::from_secs(2)
}

#[tokio::test]
async fn single_node_becomes_leader() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mut node = start_leader(temp_dir.path()).await;

    assert_eq!(node.leader().await, Some(1));
    assert!(node.is_leader().await);

    node.shutdown().await.expect("Failed to shutdown");
}

#[tokio::test]
async fn first_timestamp_has_index_one_and_recent_epoch() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mut node = start_leader(temp_dir.path()).await;

    let before = wall_clock_nanos();
    let bytes = node
        .issue_timestamps(1, deadline())
        .await
        .expect("Failed to issue timestamp");
    let after = wall_clock_nanos();

    assert_eq!(bytes.len(), TIMESTAMP_LEN);
    let ts = common::parse_timestamps(&bytes)[0];

    assert_eq!(ts.index, 1, "first timestamp of a fresh leader");
    // The epoch is the leader's wall clock at proposal time, so it lands
    // within the observation window give or take one advancer interval.
    let slack = 1_000_000_000u64;
    assert!(
        ts.epoch >= before.saturating_sub(slack) && ts.epoch <= after + slack,
        "epoch {} outside [{}, {}]",
        ts.epoch,
        before - slack,
        after + slack
    );

    node.shutdown().await.expect("Failed to shutdown");
}

#[tokio::test]
async fn batch_shares_one_epoch_with_consecutive_indices() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mut node = start_leader(temp_dir.path()).await;

    let bytes = node
        .issue_timestamps(5, deadline())
        .await
        .expect("Failed to issue batch");
    assert_eq!(bytes.len(), 5 * TIMESTAMP_LEN);

    let timestamps = common::parse_timestamps(&bytes);
    let epoch = timestamps[0].epoch;
    for (i, ts) in timestamps.iter().enumerate() {
        assert_eq!(ts.epoch, epoch, "batch must share a single epoch");
        assert_eq!(ts.index, i as u64 + 1, "indices must be 1..=5 in order");
    }

    node.shutdown().await.expect("Failed to shutdown");
}

#[tokio::test]
async fn invalid_count_is_rejected() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mut node = start_leader(temp_dir.path()).await;

    let err = node
        .issue_timestamps(0, deadline())
        .await
        .expect_err("count 0 must fail");
    assert!(matches!(
        err,
        metron_cluster::ClusterError::InvalidCount(0)
    ));

    node.shutdown().await.expect("Failed to shutdown");
}

#[tokio::test]
async fn sequential_timestamps_strictly_increase() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mut node = start_leader(temp_dir.path()).await;

    let mut previous = None;
    for _ in 0..50 {
        let bytes = node
            .issue_timestamps(1, deadline())
            .await
            .expect("Failed to issue timestamp");
        let ts = common::parse_timestamps(&bytes)[0];

        if let Some(prev) = previous {
            assert!(
                ts > prev,
                "timestamps must strictly increase in issue order: {} then {}",
                prev,
                ts
            );
        }
        previous = Some(ts);
    }

    node.shutdown().await.expect("Failed to shutdown");
}

#[tokio::test]
async fn concurrent_requests_coalesce_without_duplicates() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let node = Arc::new(start_leader(temp_dir.path()).await);

    let mut handles = Vec::new();
    for _ in 0..200 {
        let node = Arc::clone(&node);
        handles.push(tokio::spawn(async move {
            let deadline = Instant::now() + Duration::from_secs(5);
            node.issue_timestamps(1, deadline).await
        }));
    }

    let mut timestamps = Vec::new();
    for handle in handles {
        let bytes = handle
            .await
            .expect("task panicked")
            .expect("Failed to issue timestamp");
        timestamps.push(common::parse_timestamps(&bytes)[0]);
    }
    assert_eq!(timestamps.len(), 200);

    // No two 16-byte values are equal.
    let unique: std::collections::BTreeSet<_> = timestamps.iter().copied().collect();
    assert_eq!(unique.len(), 200, "all timestamps must be unique");

    // Within each epoch, the issued indices are exactly 1..=k.
    let mut by_epoch: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
    for ts in &timestamps {
        by_epoch.entry(ts.epoch).or_default().push(ts.index);
    }
    for (epoch, mut indices) in by_epoch {
        indices.sort_unstable();
        let expected: Vec<u64> = (1..=indices.len() as u64).collect();
        assert_eq!(
            indices, expected,
            "indices within epoch {} must be a gapless run from 1",
            epoch
        );
    }

    let mut node = Arc::into_inner(node).expect("all tasks finished");
    node.shutdown().await.expect("Failed to shutdown");
}

#[tokio::test]
async fn restart_preserves_watermark_and_monotonicity() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");

    let epoch_before = {
        let mut node = start_leader(temp_dir.path()).await;
        let bytes = node
            .issue_timestamps(1, deadline())
            .await
            .expect("Failed to issue timestamp");
        let ts = common::parse_timestamps(&bytes)[0];
        node.shutdown().await.expect("Failed to shutdown");
        ts.epoch
    };

    // Same data directory, fresh process state.
    let mut node = start_leader(temp_dir.path()).await;

    assert!(
        node.state_machine().applied_watermark().await > 0,
        "reopened state machine must report a non-zero applied watermark"
    );

    let bytes = node
        .issue_timestamps(1, deadline())
        .await
        .expect("Failed to issue after restart");
    let ts = common::parse_timestamps(&bytes)[0];

    assert!(
        ts.epoch > epoch_before,
        "epoch after restart ({}) must exceed the epoch before ({})",
        ts.epoch,
        epoch_before
    );
    assert_eq!(ts.index, 1, "fresh leader starts a fresh index space");

    node.shutdown().await.expect("Failed to shutdown");
}

#[tokio::test]
async fn snapshot_is_created_on_demand() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mut node = start_leader(temp_dir.path()).await;

    // Commit a few epochs worth of entries first.
    for _ in 0..5 {
        node.issue_timestamps(1, deadline())
            .await
            .expect("Failed to issue timestamp");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    node.trigger_snapshot().await.expect("Snapshot should work");

    common::wait_until(5_000, || async {
        node.metrics().snapshot.is_some().then_some(())
    })
    .await
    .expect("Should have a snapshot");

    // The node keeps serving after compaction.
    node.issue_timestamps(1, deadline())
        .await
        .expect("Failed to issue after snapshot");

    node.shutdown().await.expect("Failed to shutdown");
}
