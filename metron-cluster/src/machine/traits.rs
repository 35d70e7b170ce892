//! OpenRaft trait implementations for the epoch state machine.

use crate::machine::{EpochRecord, EpochStateMachine, StoredSnapshot, UpdateBatch};
use crate::types::{
    EpochEntry, EpochLogId, EpochSnapshot, EpochSnapshotMeta, EpochStorageError,
    EpochStoredMembership, TypeConfig,
};
use openraft::storage::RaftStateMachine;
use openraft::{EntryPayload, RaftSnapshotBuilder, RaftTypeConfig, StorageIOError, StoredMembership};
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::Ordering;

/// Snapshot builder: serializes the current record.
///
/// The record is a handful of bytes, so snapshots are trivially cheap; they
/// exist to let the consensus layer compact its log and bring fresh nodes
/// up without replaying every epoch proposal.
impl RaftSnapshotBuilder<TypeConfig> for Arc<EpochStateMachine> {
    async fn build_snapshot(&mut self) -> Result<EpochSnapshot, EpochStorageError> {
        let data = self
            .prepare_snapshot()
            .await
            .map_err(|e| StorageIOError::read_state_machine(&e))?;

        let mut buf = Vec::with_capacity(data.len());
        self.save_snapshot(&data, &mut buf)
            .await
            .map_err(|e| StorageIOError::write_snapshot(None, &e))?;

        let (last_applied_log, last_membership) = EpochStateMachine::applied_state(self).await;

        let snapshot_idx = self.snapshot_idx.fetch_add(1, Ordering::Relaxed) + 1;
        let snapshot_id = if let Some(last) = last_applied_log {
            format!("{}-{}-{}", last.leader_id, last.index, snapshot_idx)
        } else {
            format!("--{}", snapshot_idx)
        };

        let meta = EpochSnapshotMeta {
            last_log_id: last_applied_log,
            last_membership,
            snapshot_id,
        };

        let mut current_snapshot = self.current_snapshot.write().await;
        *current_snapshot = Some(StoredSnapshot {
            meta: meta.clone(),
            data: buf.clone(),
        });

        Ok(EpochSnapshot {
            meta,
            snapshot: Box::new(Cursor::new(buf)),
        })
    }
}

/// State machine driver.
///
/// The consensus layer enters from a single task at a time. Applying a
/// batch follows the single-key policy: only the last epoch proposal in
/// the batch survives, and it must strictly exceed the stored epoch. A
/// regression is reported as a state-machine storage error, which the
/// consensus layer treats as unrecoverable.
impl RaftStateMachine<TypeConfig> for Arc<EpochStateMachine> {
    type SnapshotBuilder = Self;

    async fn applied_state(
        &mut self,
    ) -> Result<(Option<EpochLogId>, EpochStoredMembership), EpochStorageError> {
        Ok(EpochStateMachine::applied_state(self).await)
    }

    async fn apply<I>(&mut self, entries: I) -> Result<Vec<EpochRecord>, EpochStorageError>
    where
        I: IntoIterator<Item = EpochEntry> + Send,
    {
        let entries: Vec<EpochEntry> = entries.into_iter().collect();
        let Some(last) = entries.last() else {
            return Ok(Vec::new());
        };

        let mut batch = UpdateBatch {
            last_applied: last.log_id,
            membership: None,
            proposal: None,
        };

        for entry in &entries {
            tracing::debug!(%entry.log_id, "applying to state machine");
            match &entry.payload {
                EntryPayload::Blank => {}
                // Every proposal targets the same record; a later proposal
                // in the batch supersedes the ones before it.
                EntryPayload::Normal(proposal) => {
                    batch.proposal = Some((entry.log_id, proposal.epoch));
                }
                EntryPayload::Membership(membership) => {
                    batch.membership =
                        Some(StoredMembership::new(Some(entry.log_id), membership.clone()));
                }
            }
        }

        let record = self
            .update(batch)
            .await
            .map_err(|e| StorageIOError::write_state_machine(&e))?;

        Ok(entries.iter().map(|_| record.clone()).collect())
    }

    async fn get_snapshot_builder(&mut self) -> Self::SnapshotBuilder {
        Arc::clone(self)
    }

    async fn begin_receiving_snapshot(
        &mut self,
    ) -> Result<Box<<TypeConfig as RaftTypeConfig>::SnapshotData>, EpochStorageError> {
        Ok(Box::new(Cursor::new(Vec::new())))
    }

    async fn install_snapshot(
        &mut self,
        meta: &EpochSnapshotMeta,
        snapshot: Box<<TypeConfig as RaftTypeConfig>::SnapshotData>,
    ) -> Result<(), EpochStorageError> {
        tracing::info!(
            snapshot_size = snapshot.get_ref().len(),
            "installing snapshot"
        );

        let data = snapshot.into_inner();

        self.recover_from_snapshot(&mut Cursor::new(&data))
            .await
            .map_err(|e| StorageIOError::read_snapshot(Some(meta.signature()), &e))?;

        let mut current_snapshot = self.current_snapshot.write().await;
        *current_snapshot = Some(StoredSnapshot {
            meta: meta.clone(),
            data,
        });
        Ok(())
    }

    async fn get_current_snapshot(&mut self) -> Result<Option<EpochSnapshot>, EpochStorageError> {
        match &*self.current_snapshot.read().await {
            Some(snapshot) => {
                let data = snapshot.data.clone();
                Ok(Some(EpochSnapshot {
                    meta: snapshot.meta.clone(),
                    snapshot: Box::new(Cursor::new(data)),
                }))
            }
            None => Ok(None),
        }
    }
}
