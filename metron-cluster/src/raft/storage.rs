//! Raft log storage.
//!
//! The epoch log is tiny: one proposal roughly every advancer tick, each a
//! few dozen bytes, aggressively compacted by snapshots. The store keeps
//! every live entry in memory and mirrors it to a single newline-delimited
//! JSON file:
//!
//! ```text
//! <data_dir>/raft/
//! ├── meta.json   # last_purged_log_id, committed
//! ├── vote.json   # vote state
//! └── log.ndjson  # live log entries, one JSON object per line
//! ```
//!
//! Appends go to the end of `log.ndjson` with an fsync; truncate and purge
//! rewrite the file through the atomic write-then-rename path, as do vote
//! and metadata updates.

use crate::atomic::write_file_atomic;
use crate::types::{EpochEntry, EpochLogId, EpochLogState, EpochStorageError, EpochVote, TypeConfig};
use openraft::storage::{LogFlushed, RaftLogStorage};
use openraft::{RaftLogReader, StorageIOError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::ops::RangeBounds;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Persisted log state metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LogMeta {
    last_purged_log_id: Option<EpochLogId>,
    committed: Option<EpochLogId>,
}

struct LogStorageInner {
    dir: PathBuf,
    logs: BTreeMap<u64, EpochEntry>,
    vote: Option<EpochVote>,
    committed: Option<EpochLogId>,
    last_purged_log_id: Option<EpochLogId>,
}

impl LogStorageInner {
    fn log_path(&self) -> PathBuf {
        self.dir.join("log.ndjson")
    }

    fn vote_path(&self) -> PathBuf {
        self.dir.join("vote.json")
    }

    fn meta_path(&self) -> PathBuf {
        self.dir.join("meta.json")
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        let vote_path = self.vote_path();
        if vote_path.exists() {
            let bytes = fs::read(&vote_path)?;
            self.vote = Some(
                serde_json::from_slice(&bytes)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?,
            );
        }

        let meta_path = self.meta_path();
        if meta_path.exists() {
            let bytes = fs::read(&meta_path)?;
            let meta: LogMeta = serde_json::from_slice(&bytes)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            self.last_purged_log_id = meta.last_purged_log_id;
            self.committed = meta.committed;
        }

        let log_path = self.log_path();
        if log_path.exists() {
            let reader = BufReader::new(File::open(&log_path)?);
            for line in reader.lines() {
                let line = line?;
                if line.is_empty() {
                    continue;
                }
                let entry: EpochEntry = serde_json::from_str(&line)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
                self.logs.insert(entry.log_id.index, entry);
            }
        }

        Ok(())
    }

    fn append_entries(&mut self, entries: Vec<EpochEntry>) -> Result<(), std::io::Error> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())?;
        for entry in &entries {
            let line = serde_json::to_vec(entry)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            file.write_all(&line)?;
            file.write_all(b"\n")?;
        }
        file.sync_all()?;

        for entry in entries {
            self.logs.insert(entry.log_id.index, entry);
        }
        Ok(())
    }

    /// Rewrite the log file to match the in-memory map, atomically.
    fn rewrite_log_file(&self) -> Result<(), std::io::Error> {
        let mut buf = Vec::new();
        for entry in self.logs.values() {
            let line = serde_json::to_vec(entry)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            buf.extend_from_slice(&line);
            buf.push(b'\n');
        }
        write_file_atomic(&self.log_path(), &buf)
    }

    fn save_vote_to_disk(&self, vote: &EpochVote) -> Result<(), std::io::Error> {
        let bytes = serde_json::to_vec(vote)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        write_file_atomic(&self.vote_path(), &bytes)
    }

    fn save_meta(&self) -> Result<(), std::io::Error> {
        let meta = LogMeta {
            last_purged_log_id: self.last_purged_log_id,
            committed: self.committed,
        };
        let bytes = serde_json::to_vec(&meta)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        write_file_atomic(&self.meta_path(), &bytes)
    }
}

/// Persistent storage for Raft log entries and vote state.
#[derive(Clone)]
pub struct LogStorage {
    inner: Arc<RwLock<LogStorageInner>>,
}

impl LogStorage {
    /// Create or open log storage in the given directory.
    pub fn open(dir: PathBuf) -> Result<Self, std::io::Error> {
        fs::create_dir_all(&dir)?;

        let mut inner = LogStorageInner {
            dir,
            logs: BTreeMap::new(),
            vote: None,
            committed: None,
            last_purged_log_id: None,
        };
        inner.load()?;

        Ok(Self {
            inner: Arc::new(RwLock::new(inner)),
        })
    }
}

/// Implementation of OpenRaft's log reader interface.
impl RaftLogReader<TypeConfig> for LogStorage {
    async fn try_get_log_entries<RB: RangeBounds<u64> + Clone + Debug>(
        &mut self,
        range: RB,
    ) -> Result<Vec<EpochEntry>, EpochStorageError> {
        let inner = self.inner.read().await;
        let entries: Vec<EpochEntry> = inner.logs.range(range).map(|(_, e)| e.clone()).collect();
        Ok(entries)
    }
}

/// Implementation of OpenRaft's log storage interface.
impl RaftLogStorage<TypeConfig> for LogStorage {
    type LogReader = Self;

    async fn get_log_state(&mut self) -> Result<EpochLogState, EpochStorageError> {
        let inner = self.inner.read().await;

        let last_log_id = inner.logs.values().last().map(|e| e.log_id);
        let last_purged_log_id = inner.last_purged_log_id;

        // If no logs remain but entries were purged, the purge point is the
        // last known log id.
        let last_log_id = last_log_id.or(last_purged_log_id);

        Ok(EpochLogState {
            last_purged_log_id,
            last_log_id,
        })
    }

    async fn save_committed(
        &mut self,
        committed: Option<EpochLogId>,
    ) -> Result<(), EpochStorageError> {
        let mut inner = self.inner.write().await;
        inner.committed = committed;
        inner
            .save_meta()
            .map_err(|e| StorageIOError::write_logs(&e))?;
        Ok(())
    }

    async fn read_committed(&mut self) -> Result<Option<EpochLogId>, EpochStorageError> {
        let inner = self.inner.read().await;
        Ok(inner.committed)
    }

    async fn save_vote(&mut self, vote: &EpochVote) -> Result<(), EpochStorageError> {
        let mut inner = self.inner.write().await;
        inner
            .save_vote_to_disk(vote)
            .map_err(|e| StorageIOError::write_vote(&e))?;
        inner.vote = Some(*vote);
        Ok(())
    }

    async fn read_vote(&mut self) -> Result<Option<EpochVote>, EpochStorageError> {
        let inner = self.inner.read().await;
        Ok(inner.vote)
    }

    async fn append<I>(
        &mut self,
        entries: I,
        callback: LogFlushed<TypeConfig>,
    ) -> Result<(), EpochStorageError>
    where
        I: IntoIterator<Item = EpochEntry>,
    {
        let mut inner = self.inner.write().await;

        let entries: Vec<EpochEntry> = entries.into_iter().collect();
        inner
            .append_entries(entries)
            .map_err(|e| StorageIOError::write_logs(&e))?;

        callback.log_io_completed(Ok(()));
        Ok(())
    }

    async fn truncate(&mut self, log_id: EpochLogId) -> Result<(), EpochStorageError> {
        let mut inner = self.inner.write().await;

        inner.logs.retain(|index, _| *index < log_id.index);
        inner
            .rewrite_log_file()
            .map_err(|e| StorageIOError::write_logs(&e))?;
        Ok(())
    }

    async fn purge(&mut self, log_id: EpochLogId) -> Result<(), EpochStorageError> {
        let mut inner = self.inner.write().await;

        inner.last_purged_log_id = Some(log_id);
        inner.logs.retain(|index, _| *index > log_id.index);
        inner
            .save_meta()
            .map_err(|e| StorageIOError::write_logs(&e))?;
        inner
            .rewrite_log_file()
            .map_err(|e| StorageIOError::write_logs(&e))?;
        Ok(())
    }

    async fn get_log_reader(&mut self) -> Self::LogReader {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EpochProposal;
    use openraft::CommittedLeaderId;
    use openraft::EntryPayload;
    use tempfile::TempDir;

    fn test_log_id(term: u64, index: u64) -> EpochLogId {
        EpochLogId::new(CommittedLeaderId::new(term, 0), index)
    }

    fn test_entries(term: u64, range: std::ops::RangeInclusive<u64>) -> Vec<EpochEntry> {
        range
            .map(|i| EpochEntry {
                log_id: test_log_id(term, i),
                payload: EntryPayload::Normal(EpochProposal { epoch: i * 100 }),
            })
            .collect()
    }

    async fn append_test_entries(storage: &LogStorage, entries: Vec<EpochEntry>) {
        let mut inner = storage.inner.write().await;
        inner
            .append_entries(entries)
            .expect("append should succeed");
    }

    #[tokio::test]
    async fn append_and_read() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let storage = LogStorage::open(temp_dir.path().to_path_buf()).expect("open storage");

        append_test_entries(&storage, test_entries(1, 1..=10)).await;

        let mut storage = storage;
        let read_entries = storage
            .try_get_log_entries(1..=10)
            .await
            .expect("read entries");
        assert_eq!(read_entries.len(), 10);
        assert_eq!(read_entries[0].log_id, test_log_id(1, 1));
    }

    #[tokio::test]
    async fn truncate_drops_tail() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let storage = LogStorage::open(temp_dir.path().to_path_buf()).expect("open storage");

        append_test_entries(&storage, test_entries(1, 1..=100)).await;

        let mut storage = storage;
        storage
            .truncate(test_log_id(1, 50))
            .await
            .expect("truncate");

        let kept = storage.try_get_log_entries(1..50).await.expect("read");
        assert_eq!(kept.len(), 49);

        let dropped = storage.try_get_log_entries(50..=100).await.expect("read");
        assert!(dropped.is_empty());
    }

    #[tokio::test]
    async fn purge_drops_head_and_remembers_purge_point() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let storage = LogStorage::open(temp_dir.path().to_path_buf()).expect("open storage");

        append_test_entries(&storage, test_entries(1, 1..=100)).await;

        let mut storage = storage;
        storage.purge(test_log_id(1, 60)).await.expect("purge");

        let purged = storage.try_get_log_entries(1..=60).await.expect("read");
        assert!(purged.is_empty());

        let kept = storage.try_get_log_entries(61..=100).await.expect("read");
        assert_eq!(kept.len(), 40);

        let state = storage.get_log_state().await.expect("log state");
        assert_eq!(state.last_purged_log_id, Some(test_log_id(1, 60)));
        assert_eq!(state.last_log_id, Some(test_log_id(1, 100)));
    }

    #[tokio::test]
    async fn entries_survive_reopen() {
        let temp_dir = TempDir::new().expect("create temp dir");

        {
            let storage = LogStorage::open(temp_dir.path().to_path_buf()).expect("open storage");
            append_test_entries(&storage, test_entries(1, 1..=25)).await;
        }

        {
            let mut storage =
                LogStorage::open(temp_dir.path().to_path_buf()).expect("reopen storage");
            let read_entries = storage
                .try_get_log_entries(1..=25)
                .await
                .expect("read entries");
            assert_eq!(read_entries.len(), 25);
        }
    }

    #[tokio::test]
    async fn vote_survives_reopen() {
        let temp_dir = TempDir::new().expect("create temp dir");

        {
            let mut storage =
                LogStorage::open(temp_dir.path().to_path_buf()).expect("open storage");
            let vote = EpochVote::new(5, 3);
            storage.save_vote(&vote).await.expect("save vote");
        }

        {
            let mut storage =
                LogStorage::open(temp_dir.path().to_path_buf()).expect("reopen storage");
            let vote = storage.read_vote().await.expect("read vote");
            let vote = vote.expect("vote should exist");
            assert_eq!(vote.leader_id().term, 5);
            assert_eq!(vote.leader_id().node_id, 3);
        }
    }

    #[tokio::test]
    async fn committed_survives_reopen() {
        let temp_dir = TempDir::new().expect("create temp dir");

        {
            let mut storage =
                LogStorage::open(temp_dir.path().to_path_buf()).expect("open storage");
            storage
                .save_committed(Some(test_log_id(2, 7)))
                .await
                .expect("save committed");
        }

        {
            let mut storage =
                LogStorage::open(temp_dir.path().to_path_buf()).expect("reopen storage");
            let committed = storage.read_committed().await.expect("read committed");
            assert_eq!(committed, Some(test_log_id(2, 7)));
        }
    }
}
