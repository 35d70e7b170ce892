//! Timestamp dispatcher.
//!
//! Client requests do not each pay for a consensus round. They are parked in
//! a bounded queue while a single long-lived *reader task* performs one
//! linearizable read of the epoch record, then fans 16-byte timestamps out
//! to every request that was already waiting, assigning indices from a
//! local counter. One read amortizes the consensus round trip across
//! arbitrarily many waiting clients.
//!
//! The reader is the sole consumer of the queue and the sole writer of
//! `last_epoch` / `index_counter`; request tasks only enqueue and wait on
//! their reply slot. The epoch advancer reads `last_epoch` for drift repair.

use crate::error::{ClusterError, ClusterResult};
use crate::machine::{EpochRecord, EpochStateMachine};
use crate::timestamp::{wall_clock_nanos, Timestamp, TIMESTAMP_LEN};
use crate::types::{EpochProposal, EpochRaft};
use bytes::{Bytes, BytesMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{timeout, timeout_at, Instant};

/// A parked client request: how many timestamps it wants and the one-shot
/// slot its reply goes into.
struct PendingRequest {
    count: u32,
    reply: oneshot::Sender<Bytes>,
}

/// Dispatcher state shared between the reader task and the advancer.
pub(crate) struct DispatchShared {
    /// Last epoch this leader stamped with (0 = unstamped since start or
    /// since this node was elected).
    pub(crate) last_epoch: AtomicU64,
    /// Number of indices already handed out within `last_epoch`.
    pub(crate) index_counter: AtomicU64,
}

impl DispatchShared {
    fn new() -> Self {
        Self {
            last_epoch: AtomicU64::new(0),
            index_counter: AtomicU64::new(0),
        }
    }
}

/// Handle used by request tasks to obtain timestamps.
#[derive(Clone)]
pub struct Dispatcher {
    queue_tx: mpsc::Sender<PendingRequest>,
    poke_tx: mpsc::Sender<()>,
    shared: Arc<DispatchShared>,
}

impl Dispatcher {
    /// Build the dispatcher pair: the cloneable enqueue handle and the
    /// reader task that must be spawned once.
    pub(crate) fn new(
        raft: Arc<EpochRaft>,
        machine: Arc<EpochStateMachine>,
        request_buffer: usize,
        read_timeout: Duration,
        propose_timeout: Duration,
        stop_rx: watch::Receiver<bool>,
    ) -> (Self, DispatchReader) {
        let (queue_tx, queue_rx) = mpsc::channel(request_buffer);
        // One-slot wake channel: a full slot means the reader is already
        // awake or about to iterate, so the signal can be dropped.
        let (poke_tx, poke_rx) = mpsc::channel(1);
        let shared = Arc::new(DispatchShared::new());

        let dispatcher = Self {
            queue_tx,
            poke_tx,
            shared: Arc::clone(&shared),
        };

        let reader = DispatchReader {
            raft,
            machine,
            queue_rx,
            poke_rx,
            stop_rx,
            shared,
            read_timeout,
            propose_timeout,
        };

        (dispatcher, reader)
    }

    /// Obtain `count` timestamps, returning their `16 * count` byte wire
    /// encoding.
    ///
    /// Blocks while the request queue is full. The deadline bounds the
    /// whole call: enqueueing and waiting for the reply.
    pub async fn issue(&self, count: u32, deadline: Instant) -> ClusterResult<Bytes> {
        if count < 1 {
            return Err(ClusterError::InvalidCount(count));
        }

        let permit = match timeout_at(deadline, self.queue_tx.reserve()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(ClusterError::Unavailable),
            Err(_) => return Err(ClusterError::Timeout),
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        permit.send(PendingRequest {
            count,
            reply: reply_tx,
        });

        // Poke the reader; a dropped signal means it is awake already.
        let _ = self.poke_tx.try_send(());

        match timeout_at(deadline, reply_rx).await {
            Ok(Ok(bytes)) => Ok(bytes),
            Ok(Err(_)) => Err(ClusterError::Unavailable),
            Err(_) => Err(ClusterError::Timeout),
        }
    }

    pub(crate) fn shared(&self) -> Arc<DispatchShared> {
        Arc::clone(&self.shared)
    }
}

/// The single long-lived reader task.
pub struct DispatchReader {
    raft: Arc<EpochRaft>,
    machine: Arc<EpochStateMachine>,
    queue_rx: mpsc::Receiver<PendingRequest>,
    poke_rx: mpsc::Receiver<()>,
    stop_rx: watch::Receiver<bool>,
    shared: Arc<DispatchShared>,
    read_timeout: Duration,
    propose_timeout: Duration,
}

impl DispatchReader {
    /// Run until the stop signal fires. Consensus failures terminate the
    /// process: a leader that cannot read or commit must be replaced, and
    /// continuing to serve could violate monotonicity.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.stop_rx.changed() => {
                    tracing::debug!("dispatch reader received stop signal");
                    return;
                }
                poke = self.poke_rx.recv() => {
                    if poke.is_none() {
                        return;
                    }
                    self.generate_timestamps().await;
                }
            }
        }
    }

    async fn generate_timestamps(&mut self) {
        loop {
            // Snapshot the queue length before reading. This bounds the
            // work of the iteration: requests arriving during the serve
            // loop wait for the next read, so a steady arrival stream
            // cannot pin us in a single iteration with a stale epoch.
            let pending = self.queue_rx.len();

            let Some(record) = self.read_epoch().await else {
                return;
            };
            let Some(record) = self.ensure_initialized(record).await else {
                return;
            };

            // Epoch swap: a new epoch opens a fresh index space.
            let epoch = record.epoch;
            if epoch != self.shared.last_epoch.load(Ordering::Acquire) {
                self.shared.last_epoch.store(epoch, Ordering::Release);
                self.shared.index_counter.store(0, Ordering::Release);
            }

            for _ in 0..pending {
                match self.queue_rx.try_recv() {
                    Ok(request) => self.serve(request, epoch),
                    Err(_) => {
                        // The reader is the only consumer, so every request
                        // counted by the snapshot must still be in the
                        // queue. Missing entries mean lost requests.
                        tracing::error!("request queue lost entries, terminating");
                        std::process::exit(1);
                    }
                }
            }

            if self.queue_rx.is_empty() || *self.stop_rx.borrow() {
                return;
            }
            tracing::debug!("more requests arrived during serve, reading again");
        }
    }

    /// One linearizable read of the epoch record.
    ///
    /// Returns `None` when the node is shutting down underneath us.
    async fn read_epoch(&self) -> Option<EpochRecord> {
        match timeout(self.read_timeout, self.raft.ensure_linearizable()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                if *self.stop_rx.borrow() {
                    return None;
                }
                tracing::error!(error = ?e, "linearizable epoch read failed, terminating");
                std::process::exit(1);
            }
            Err(_) => {
                tracing::error!(
                    timeout_ms = self.read_timeout.as_millis() as u64,
                    "linearizable epoch read timed out, terminating"
                );
                std::process::exit(1);
            }
        }

        match self.machine.lookup().await {
            Ok(record) => Some(record),
            Err(e) => {
                if *self.stop_rx.borrow() {
                    return None;
                }
                tracing::error!(error = %e, "epoch lookup failed, terminating");
                std::process::exit(1);
            }
        }
    }

    /// Handle the two paths that require a proposal before serving.
    async fn ensure_initialized(&self, record: EpochRecord) -> Option<EpochRecord> {
        if record.epoch == 0 {
            // Fresh cluster: nothing committed yet, write an epoch first.
            tracing::warn!("read epoch 0, proposing an initial epoch");
            return self.propose_epoch(wall_clock_nanos()).await;
        }

        if self.shared.last_epoch.load(Ordering::Acquire) == 0 {
            // First read since this node became leader. Claim a fresh
            // epoch before stamping anything so no index is ever issued
            // under an epoch a previous leader already stamped with. The
            // candidate must beat the committed epoch; the local
            // last_epoch is necessarily zero on this path.
            let mut candidate = wall_clock_nanos();
            if candidate <= record.epoch {
                tracing::warn!(
                    candidate,
                    committed = record.epoch,
                    "clock is behind the committed epoch, bumping candidate"
                );
                candidate = record.epoch + 1;
            }
            return self.propose_epoch(candidate).await;
        }

        Some(record)
    }

    /// Propose a new epoch and return the record its commit produced.
    ///
    /// Returns `None` when the node is shutting down underneath us.
    async fn propose_epoch(&self, epoch: u64) -> Option<EpochRecord> {
        match timeout(
            self.propose_timeout,
            self.raft.client_write(EpochProposal { epoch }),
        )
        .await
        {
            Ok(Ok(resp)) => Some(resp.data),
            Ok(Err(e)) => {
                if *self.stop_rx.borrow() {
                    return None;
                }
                tracing::error!(error = ?e, epoch, "epoch proposal failed, terminating");
                std::process::exit(1);
            }
            Err(_) => {
                tracing::error!(
                    epoch,
                    timeout_ms = self.propose_timeout.as_millis() as u64,
                    "epoch proposal timed out, terminating"
                );
                std::process::exit(1);
            }
        }
    }

    fn serve(&self, request: PendingRequest, epoch: u64) {
        let reply = build_reply(&self.shared, epoch, request.count);
        if request.reply.send(reply).is_err() {
            // The caller stopped listening (deadline expired). The indices
            // are burned, which is fine; only uniqueness matters.
            tracing::warn!(
                count = request.count,
                "timestamp reply dropped, caller no longer waiting"
            );
        }
    }
}

/// Encode `count` timestamps under `epoch`, assigning consecutive indices.
fn build_reply(shared: &DispatchShared, epoch: u64, count: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(count as usize * TIMESTAMP_LEN);
    for _ in 0..count {
        let index = shared.index_counter.fetch_add(1, Ordering::AcqRel) + 1;
        Timestamp::new(epoch, index).write_to(&mut buf);
    }
    buf.freeze()
}
