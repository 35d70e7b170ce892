//! Replicated epoch state machine.
//!
//! The state machine holds exactly one record (see [`EpochRecord`]) and
//! persists it with an atomic write-then-rename on every applied batch, so
//! there is no separate sync step and no write-ahead state of its own.
//!
//! ## Module structure
//!
//! - `record`: the durable record type
//! - `traits`: OpenRaft state-machine and snapshot-builder implementations
//!
//! The consensus layer drives each instance from a single task at a time.
//! After [`EpochStateMachine::close`], only [`EpochStateMachine::lookup`]
//! may be called (and reports the machine as closed); any other call is a
//! programming error and panics, as does closing the same instance twice.

mod record;
mod traits;

pub use record::EpochRecord;

use crate::atomic::write_file_atomic;
use crate::error::{ClusterError, ClusterResult};
use crate::types::{EpochLogId, EpochSnapshotMeta, EpochStoredMembership};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicU64;
use tokio::sync::RwLock;

/// One batch of committed log entries, reduced to what the record needs.
///
/// All epoch proposals target the same logical key, so the caller keeps only
/// the last proposal of the batch; earlier ones are superseded.
#[derive(Debug)]
pub(crate) struct UpdateBatch {
    /// Log ID of the last entry in the batch.
    pub last_applied: EpochLogId,
    /// Membership carried by the batch, if any entry changed it.
    pub membership: Option<EpochStoredMembership>,
    /// The surviving epoch proposal: `(entry log ID, proposed epoch)`.
    pub proposal: Option<(EpochLogId, u64)>,
}

/// Snapshot bytes held for the consensus layer, with their metadata.
#[derive(Debug)]
pub(crate) struct StoredSnapshot {
    pub meta: EpochSnapshotMeta,
    pub data: Vec<u8>,
}

#[derive(Debug)]
struct MachineInner {
    record: EpochRecord,
    closed: bool,
}

/// The on-disk epoch state machine.
#[derive(Debug)]
pub struct EpochStateMachine {
    epoch_file: PathBuf,
    inner: RwLock<MachineInner>,
    /// Snapshot index counter, for unique snapshot IDs.
    pub(crate) snapshot_idx: AtomicU64,
    /// Last built or installed snapshot.
    pub(crate) current_snapshot: RwLock<Option<StoredSnapshot>>,
}

impl EpochStateMachine {
    /// Open the state machine, loading the record from `epoch_file`.
    ///
    /// A missing file yields the uninitialized record `{0, 0}`. A file that
    /// exists but does not deserialize is corruption: an operator has to
    /// intervene, so the error is surfaced rather than papered over.
    pub fn open(epoch_file: impl Into<PathBuf>) -> ClusterResult<Self> {
        let epoch_file = epoch_file.into();

        let record = if epoch_file.exists() {
            let bytes = std::fs::read(&epoch_file)?;
            serde_json::from_slice(&bytes).map_err(|e| ClusterError::Corruption {
                path: epoch_file.clone(),
                cause: e.to_string(),
            })?
        } else {
            EpochRecord::default()
        };

        tracing::debug!(
            path = %epoch_file.display(),
            raft_index = record.raft_index,
            epoch = record.epoch,
            "opened epoch state machine"
        );

        Ok(Self {
            epoch_file,
            inner: RwLock::new(MachineInner {
                record,
                closed: false,
            }),
            snapshot_idx: AtomicU64::new(0),
            current_snapshot: RwLock::new(None),
        })
    }

    /// The applied watermark: index of the entry that last updated the epoch.
    pub async fn applied_watermark(&self) -> u64 {
        self.inner.read().await.record.raft_index
    }

    /// Current record. Fails with [`ClusterError::Closed`] after close; this
    /// is the only operation permitted on a closed instance.
    pub async fn lookup(&self) -> ClusterResult<EpochRecord> {
        let inner = self.inner.read().await;
        if inner.closed {
            return Err(ClusterError::Closed);
        }
        Ok(inner.record.clone())
    }

    /// Apply one batch of committed entries and persist the record.
    ///
    /// The proposed epoch must be strictly greater than the stored epoch;
    /// anything else violates the monotonicity invariant and is rejected
    /// with [`ClusterError::Regression`], which the consensus layer treats
    /// as a fatal state-machine failure.
    pub(crate) async fn update(&self, batch: UpdateBatch) -> ClusterResult<EpochRecord> {
        let mut inner = self.inner.write().await;
        if inner.closed {
            panic!("update called on a closed state machine");
        }

        if let Some((log_id, proposed)) = batch.proposal {
            if proposed <= inner.record.epoch {
                return Err(ClusterError::Regression {
                    proposed,
                    current: inner.record.epoch,
                });
            }
            inner.record.epoch = proposed;
            inner.record.raft_index = log_id.index;
        }

        inner.record.last_applied = Some(batch.last_applied);
        if let Some(membership) = batch.membership {
            inner.record.last_membership = membership;
        }

        self.persist(&inner.record)?;
        Ok(inner.record.clone())
    }

    /// Durability hook. Updates already persist atomically, so there is
    /// nothing left to flush.
    pub async fn sync(&self) -> ClusterResult<()> {
        if self.inner.read().await.closed {
            panic!("sync called on a closed state machine");
        }
        Ok(())
    }

    /// Serialize the current record for a snapshot (copy-on-read).
    pub async fn prepare_snapshot(&self) -> ClusterResult<Vec<u8>> {
        let inner = self.inner.read().await;
        if inner.closed {
            panic!("prepare_snapshot called on a closed state machine");
        }
        Ok(serde_json::to_vec(&inner.record)?)
    }

    /// Write previously prepared snapshot bytes to a sink.
    pub async fn save_snapshot(&self, prepared: &[u8], sink: &mut impl Write) -> ClusterResult<()> {
        if self.inner.read().await.closed {
            panic!("save_snapshot called on a closed state machine");
        }
        sink.write_all(prepared)?;
        Ok(())
    }

    /// Replace the record from snapshot bytes and persist it atomically.
    ///
    /// The snapshot embeds the watermark and membership it was built from,
    /// so the recovered record is complete as-is.
    pub async fn recover_from_snapshot(
        &self,
        source: &mut impl Read,
    ) -> ClusterResult<EpochRecord> {
        let mut inner = self.inner.write().await;
        if inner.closed {
            panic!("recover_from_snapshot called on a closed state machine");
        }

        let mut bytes = Vec::new();
        source.read_to_end(&mut bytes)?;

        // Parse before touching the current record, so a bad snapshot
        // leaves the machine untouched.
        let record: EpochRecord = serde_json::from_slice(&bytes)?;
        self.persist(&record)?;
        inner.record = record.clone();

        Ok(record)
    }

    /// Close the state machine. Closing the same instance twice is a
    /// programming error and panics.
    pub async fn close(&self) {
        let mut inner = self.inner.write().await;
        if inner.closed {
            panic!("state machine closed twice");
        }
        inner.closed = true;
        tracing::debug!(path = %self.epoch_file.display(), "closed epoch state machine");
    }

    /// Applied state for the consensus layer.
    pub(crate) async fn applied_state(&self) -> (Option<EpochLogId>, EpochStoredMembership) {
        let inner = self.inner.read().await;
        (
            inner.record.last_applied,
            inner.record.last_membership.clone(),
        )
    }

    fn persist(&self, record: &EpochRecord) -> ClusterResult<()> {
        let bytes = serde_json::to_vec(record)?;
        write_file_atomic(&self.epoch_file, &bytes)?;
        Ok(())
    }

    /// Path of the record file, for diagnostics.
    pub fn epoch_file(&self) -> &Path {
        &self.epoch_file
    }
}
