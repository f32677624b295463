//! In-memory storage backend with optional file persistence.
//!
//! A file-backed store keeps two files: a full JSON dump at the configured
//! path and a write-ahead log beside it (same name, `.wal` extension). Every
//! batch is appended to the log and synced before it becomes visible, so an
//! acknowledged write survives a crash. [`MemoryStorage::flush`] writes a
//! fresh dump and empties the log.

use crate::batch::OperationKind;
use crate::{Storage, StorageError, StorageResult, WriteBatch};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Column families for organizing data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnFamily {
    /// Block bodies indexed by block hash.
    Blocks,
    /// Main chain mapping (height -> block hash).
    HeightIndex,
    /// Tip record and other node metadata.
    Metadata,
}

impl ColumnFamily {
    pub fn name(&self) -> &'static str {
        match self {
            ColumnFamily::Blocks => "blocks",
            ColumnFamily::HeightIndex => "height_index",
            ColumnFamily::Metadata => "metadata",
        }
    }

    pub fn all() -> &'static [ColumnFamily] {
        &[
            ColumnFamily::Blocks,
            ColumnFamily::HeightIndex,
            ColumnFamily::Metadata,
        ]
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|cf| cf.name() == name)
    }
}

type Table = BTreeMap<Vec<u8>, Vec<u8>>;

type Tables = HashMap<ColumnFamily, Table>;

/// Ordered key-value store held in memory.
///
/// Clones share the same data. With a backing file the contents are loaded
/// on open, including any batches logged since the last flush.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    tables: Arc<RwLock<Tables>>,
    path: Option<Arc<PathBuf>>,
    /// Write-ahead log. Held for the whole of a write or a flush, which
    /// orders them.
    log: Option<Arc<Mutex<File>>>,
    failing_writes: Arc<AtomicUsize>,
}

impl std::fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStorage")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a store backed by `path`, loading the dump if it exists and
    /// replaying the write-ahead log over it.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut tables = Tables::new();

        if path.exists() {
            info!("Loading store from {:?}", path);
            let raw = fs::read(&path)?;
            let dump: BTreeMap<String, BTreeMap<String, String>> = serde_json::from_slice(&raw)
                .map_err(|e| StorageError::Deserialization(e.to_string()))?;
            for (name, entries) in dump {
                let cf = ColumnFamily::from_name(&name)
                    .ok_or_else(|| StorageError::Corruption(format!("unknown column family {name}")))?;
                let mut table = Table::new();
                for (key, value) in entries {
                    let key = hex::decode(&key)
                        .map_err(|e| StorageError::Corruption(format!("bad key in {name}: {e}")))?;
                    let value = hex::decode(&value)
                        .map_err(|e| StorageError::Corruption(format!("bad value in {name}: {e}")))?;
                    table.insert(key, value);
                }
                tables.insert(cf, table);
            }
        }

        let log_path = log_path(&path);
        let (replayed, valid_len) = replay_log(&log_path, &mut tables)?;
        if replayed > 0 {
            info!(replayed, "Replayed write-ahead log");
        }
        if let Some(parent) = log_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let log = OpenOptions::new().create(true).append(true).open(&log_path)?;
        if log.metadata()?.len() > valid_len {
            log.set_len(valid_len)?;
        }

        Ok(Self {
            tables: Arc::new(RwLock::new(tables)),
            path: Some(Arc::new(path)),
            log: Some(Arc::new(Mutex::new(log))),
            failing_writes: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Write the full contents to the backing file and empty the log.
    pub fn flush(&self) -> StorageResult<()> {
        let (Some(path), Some(log)) = (&self.path, &self.log) else {
            return Ok(());
        };
        let log = log.lock();

        let dump: BTreeMap<&str, BTreeMap<String, String>> = {
            let tables = self.tables.read();
            tables
                .iter()
                .map(|(cf, table)| {
                    let entries = table
                        .iter()
                        .map(|(k, v)| (hex::encode(k), hex::encode(v)))
                        .collect();
                    (cf.name(), entries)
                })
                .collect()
        };
        let raw = serde_json::to_vec(&dump).map_err(|e| StorageError::Serialization(e.to_string()))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, raw)?;
        fs::rename(&tmp, path.as_ref())?;
        log.set_len(0)?;
        log.sync_data()?;
        debug!("Store flushed to {:?}", path);
        Ok(())
    }

    /// Make the next `count` writes fail with [`StorageError::Unavailable`].
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    fn check_write(&self) -> StorageResult<()> {
        let injected = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match injected {
            Ok(_) => Err(StorageError::Unavailable("injected write failure".to_string())),
            Err(_) => Ok(()),
        }
    }
}

fn log_path(path: &Path) -> PathBuf {
    path.with_extension("wal")
}

fn apply_batch(tables: &mut Tables, batch: WriteBatch) {
    for op in batch.operations {
        let table = tables.entry(op.cf).or_default();
        match op.kind {
            OperationKind::Put { value } => {
                table.insert(op.key, value);
            }
            OperationKind::Delete => {
                table.remove(&op.key);
            }
        }
    }
}

/// Apply logged batches in order. Returns the record count and the length
/// of the log up to its last complete record. A torn final record from a
/// crash mid-append is dropped; a bad record before it is corruption.
fn replay_log(path: &Path, tables: &mut Tables) -> StorageResult<(usize, u64)> {
    if !path.exists() {
        return Ok((0, 0));
    }
    let raw = fs::read(path)?;
    let complete = raw.ends_with(b"\n");
    let valid_len = raw.iter().rposition(|b| *b == b'\n').map_or(0, |p| p + 1) as u64;
    let lines: Vec<&[u8]> = raw
        .split(|b| *b == b'\n')
        .filter(|line| !line.is_empty())
        .collect();

    let mut replayed = 0;
    for (i, line) in lines.iter().enumerate() {
        match WriteBatch::from_log_line(line) {
            Ok(batch) => {
                apply_batch(tables, batch);
                replayed += 1;
            }
            Err(e) if i + 1 == lines.len() && !complete => {
                warn!(%e, "Dropping torn write-ahead log record");
            }
            Err(e) => {
                return Err(StorageError::Corruption(format!(
                    "write-ahead log record {i}: {e}"
                )))
            }
        }
    }
    Ok((replayed, valid_len))
}

impl Storage for MemoryStorage {
    fn get(&self, cf: ColumnFamily, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self
            .tables
            .read()
            .get(&cf)
            .and_then(|table| table.get(key).cloned()))
    }

    fn put(&self, cf: ColumnFamily, key: &[u8], value: &[u8]) -> StorageResult<()> {
        let kind = OperationKind::Put {
            value: value.to_vec(),
        };
        self.write_batch(WriteBatch::single(cf, key, kind))
    }

    fn delete(&self, cf: ColumnFamily, key: &[u8]) -> StorageResult<()> {
        self.write_batch(WriteBatch::single(cf, key, OperationKind::Delete))
    }

    /// Visible to readers only after the log append is synced.
    fn write_batch(&self, batch: WriteBatch) -> StorageResult<()> {
        self.check_write()?;
        let _log = match &self.log {
            Some(log) => {
                let mut file = log.lock();
                file.write_all(&batch.to_log_line()?)?;
                file.sync_data()?;
                Some(file)
            }
            None => None,
        };
        apply_batch(&mut self.tables.write(), batch);
        Ok(())
    }

    fn iter(
        &self,
        cf: ColumnFamily,
    ) -> StorageResult<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_>> {
        let collected: Vec<_> = self
            .tables
            .read()
            .get(&cf)
            .map(|table| table.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        Ok(Box::new(collected.into_iter()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_put_get_delete() {
        let db = MemoryStorage::new();
        db.put(ColumnFamily::Metadata, b"key1", b"value1").unwrap();
        assert_eq!(
            db.get(ColumnFamily::Metadata, b"key1").unwrap(),
            Some(b"value1".to_vec())
        );
        assert_eq!(db.get(ColumnFamily::Blocks, b"key1").unwrap(), None);

        db.delete(ColumnFamily::Metadata, b"key1").unwrap();
        assert!(!db.contains(ColumnFamily::Metadata, b"key1").unwrap());
    }

    #[test]
    fn test_write_batch_and_ordered_iter() {
        let db = MemoryStorage::new();
        let mut batch = WriteBatch::new();
        batch.put(ColumnFamily::HeightIndex, vec![0, 2], b"b".to_vec());
        batch.put(ColumnFamily::HeightIndex, vec![0, 1], b"a".to_vec());
        batch.put(ColumnFamily::HeightIndex, vec![0, 3], b"c".to_vec());
        batch.delete(ColumnFamily::HeightIndex, vec![0, 3]);
        db.write_batch(batch).unwrap();

        let keys: Vec<Vec<u8>> = db
            .iter(ColumnFamily::HeightIndex)
            .unwrap()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![vec![0, 1], vec![0, 2]]);
    }

    #[test]
    fn test_injected_failures_leave_data_untouched() {
        let db = MemoryStorage::new();
        db.fail_next_writes(2);

        let mut batch = WriteBatch::new();
        batch.put(ColumnFamily::Blocks, b"k", b"v");
        let err = db.write_batch(batch.clone()).unwrap_err();
        assert!(err.is_transient());
        assert!(db.put(ColumnFamily::Blocks, b"k", b"v").is_err());
        assert_eq!(db.get(ColumnFamily::Blocks, b"k").unwrap(), None);

        db.write_batch(batch).unwrap();
        assert!(db.contains(ColumnFamily::Blocks, b"k").unwrap());
    }

    #[test]
    fn test_clones_share_data() {
        let db = MemoryStorage::new();
        let other = db.clone();
        db.put(ColumnFamily::Metadata, b"k", b"v").unwrap();
        assert!(other.contains(ColumnFamily::Metadata, b"k").unwrap());
    }

    #[test]
    fn test_flush_and_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("store.json");

        let db = MemoryStorage::open(&path).unwrap();
        db.put(ColumnFamily::Blocks, &[0xab, 0xcd], b"body").unwrap();
        db.put(ColumnFamily::Metadata, b"tip", b"record").unwrap();
        db.flush().unwrap();

        let reopened = MemoryStorage::open(&path).unwrap();
        assert_eq!(
            reopened.get(ColumnFamily::Blocks, &[0xab, 0xcd]).unwrap(),
            Some(b"body".to_vec())
        );
        assert_eq!(
            reopened.get(ColumnFamily::Metadata, b"tip").unwrap(),
            Some(b"record".to_vec())
        );
    }

    #[test]
    fn test_acknowledged_writes_survive_without_flush() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("store.json");

        let db = MemoryStorage::open(&path).unwrap();
        db.put(ColumnFamily::Metadata, b"tip", b"one").unwrap();
        db.put(ColumnFamily::Metadata, b"tip", b"two").unwrap();
        db.put(ColumnFamily::Blocks, b"gone", b"x").unwrap();
        db.delete(ColumnFamily::Blocks, b"gone").unwrap();
        drop(db);

        assert!(!path.exists());
        let reopened = MemoryStorage::open(&path).unwrap();
        assert_eq!(
            reopened.get(ColumnFamily::Metadata, b"tip").unwrap(),
            Some(b"two".to_vec())
        );
        assert!(!reopened.contains(ColumnFamily::Blocks, b"gone").unwrap());
    }

    #[test]
    fn test_flush_empties_log() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("store.json");

        let db = MemoryStorage::open(&path).unwrap();
        db.put(ColumnFamily::Blocks, b"k", b"v").unwrap();
        assert!(fs::metadata(log_path(&path)).unwrap().len() > 0);
        db.flush().unwrap();
        assert_eq!(fs::metadata(log_path(&path)).unwrap().len(), 0);

        db.put(ColumnFamily::Blocks, b"k2", b"v2").unwrap();
        drop(db);
        let reopened = MemoryStorage::open(&path).unwrap();
        assert!(reopened.contains(ColumnFamily::Blocks, b"k").unwrap());
        assert!(reopened.contains(ColumnFamily::Blocks, b"k2").unwrap());
    }

    #[test]
    fn test_torn_log_tail_dropped() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("store.json");

        let db = MemoryStorage::open(&path).unwrap();
        db.put(ColumnFamily::Blocks, b"kept", b"v").unwrap();
        drop(db);
        let mut torn = WriteBatch::new();
        torn.put(ColumnFamily::Blocks, b"lost", b"v");
        let line = torn.to_log_line().unwrap();
        let mut log = OpenOptions::new().append(true).open(log_path(&path)).unwrap();
        log.write_all(&line[..line.len() / 2]).unwrap();
        drop(log);

        let reopened = MemoryStorage::open(&path).unwrap();
        assert!(reopened.contains(ColumnFamily::Blocks, b"kept").unwrap());
        assert!(!reopened.contains(ColumnFamily::Blocks, b"lost").unwrap());

        reopened.put(ColumnFamily::Blocks, b"after", b"v").unwrap();
        drop(reopened);
        let again = MemoryStorage::open(&path).unwrap();
        assert!(again.contains(ColumnFamily::Blocks, b"after").unwrap());
    }

    #[test]
    fn test_corrupt_log_record_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("store.json");
        let mut good = WriteBatch::new();
        good.put(ColumnFamily::Blocks, b"k", b"v");
        let mut raw = b"garbage\n".to_vec();
        raw.extend(good.to_log_line().unwrap());
        fs::write(log_path(&path), raw).unwrap();

        assert!(matches!(
            MemoryStorage::open(&path),
            Err(StorageError::Corruption(_))
        ));
    }

    #[test]
    fn test_open_rejects_garbage() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("store.json");
        fs::write(&path, b"not json").unwrap();
        assert!(matches!(
            MemoryStorage::open(&path),
            Err(StorageError::Deserialization(_))
        ));
    }
}
