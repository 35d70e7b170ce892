//! Periodic epoch advancer.
//!
//! A coarse epoch advanced on a timer keeps consensus off the request path:
//! the dispatcher serves thousands of timestamps per epoch with local
//! counter increments, and only this task pays the commit round trip.
//! Advancing on demand instead would bottleneck every request on consensus
//! latency.

use crate::dispatch::DispatchShared;
use crate::error::ClientWriteError;
use crate::timestamp::wall_clock_nanos;
use crate::types::{EpochProposal, EpochRaft, NodeId};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;

pub(crate) struct EpochAdvancer {
    pub(crate) raft: Arc<EpochRaft>,
    pub(crate) node_id: NodeId,
    pub(crate) shared: Arc<DispatchShared>,
    pub(crate) interval: Duration,
    pub(crate) propose_timeout: Duration,
    pub(crate) deadline_limit: u32,
    pub(crate) stop_rx: watch::Receiver<bool>,
}

impl EpochAdvancer {
    /// Tick until the stop signal fires.
    ///
    /// Each tick on the leader proposes the wall clock as the next epoch,
    /// with drift repair against the last epoch the dispatcher stamped
    /// with. Consecutive propose deadlines are tolerated up to the
    /// configured limit; a leader that cannot commit for that long is
    /// useless and must be replaced, so the process terminates. Any
    /// non-timeout error terminates immediately.
    pub(crate) async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        // Deduplicates the clock-drift warning across consecutive ticks.
        let mut warned_clock_drift = false;
        // Consecutive propose deadlines, fatal at the limit.
        let mut deadlines: u32 = 0;

        loop {
            tokio::select! {
                _ = self.stop_rx.changed() => {
                    tracing::debug!("epoch advancer received stop signal");
                    return;
                }
                _ = ticker.tick() => {}
            }

            let leader = self.raft.current_leader().await;
            if leader != Some(self.node_id) {
                // Not the leader (or no leader view yet): nothing to advance.
                continue;
            }

            let last_epoch = self.shared.last_epoch.load(Ordering::Acquire);
            let mut new_epoch = wall_clock_nanos();
            if new_epoch <= last_epoch {
                if !warned_clock_drift {
                    warned_clock_drift = true;
                    tracing::error!(
                        new_epoch,
                        last_epoch,
                        "new epoch not greater than last epoch, clock drift; incrementing by 1"
                    );
                }
                new_epoch = last_epoch + 1;
            } else {
                warned_clock_drift = false;
            }

            match timeout(
                self.propose_timeout,
                self.raft.client_write(EpochProposal { epoch: new_epoch }),
            )
            .await
            {
                Ok(Ok(_)) => {
                    deadlines = 0;
                }
                Ok(Err(e)) => {
                    if *self.stop_rx.borrow() {
                        return;
                    }
                    if lost_leadership(&e) {
                        // Demoted between the leader check and the commit;
                        // the new leader takes over epoch advancement.
                        tracing::warn!(error = ?e, "lost leadership while proposing epoch");
                        continue;
                    }
                    tracing::error!(error = ?e, "epoch proposal failed, terminating");
                    std::process::exit(1);
                }
                Err(_) => {
                    deadlines += 1;
                    tracing::error!(
                        deadlines,
                        limit = self.deadline_limit,
                        "deadline exceeded proposing new epoch"
                    );
                    if deadlines >= self.deadline_limit {
                        tracing::error!("epoch proposal deadline threshold exceeded, terminating");
                        std::process::exit(1);
                    }
                }
            }
        }
    }
}

/// True when a client write failed only because leadership moved.
fn lost_leadership(
    e: &openraft::error::RaftError<NodeId, ClientWriteError>,
) -> bool {
    matches!(
        e,
        openraft::error::RaftError::APIError(ClientWriteError::ForwardToLeader(_))
    )
}
