//! Write batches.
//!
//! A batch is the unit of atomicity for every backend write, and also the
//! record appended to the file backend's write-ahead log. One log line is
//! one JSON-encoded batch, with keys and values hex-encoded.

use crate::{ColumnFamily, StorageError, StorageResult};
use serde::{Deserialize, Serialize};

/// What a batch operation does to its key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OperationKind {
    /// Insert or overwrite the value.
    Put {
        #[serde(with = "hex::serde")]
        value: Vec<u8>,
    },
    Delete,
}

/// One keyed write inside a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOperation {
    pub cf: ColumnFamily,
    #[serde(with = "hex::serde")]
    pub key: Vec<u8>,
    pub kind: OperationKind,
}

/// Writes applied all or nothing, in insertion order.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteBatch {
    pub(crate) operations: Vec<BatchOperation>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Batch holding a single operation.
    pub(crate) fn single(cf: ColumnFamily, key: &[u8], kind: OperationKind) -> Self {
        Self {
            operations: vec![BatchOperation {
                cf,
                key: key.to_vec(),
                kind,
            }],
        }
    }

    pub fn put(&mut self, cf: ColumnFamily, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.operations.push(BatchOperation {
            cf,
            key: key.into(),
            kind: OperationKind::Put {
                value: value.into(),
            },
        });
    }

    pub fn delete(&mut self, cf: ColumnFamily, key: impl Into<Vec<u8>>) {
        self.operations.push(BatchOperation {
            cf,
            key: key.into(),
            kind: OperationKind::Delete,
        });
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn operations(&self) -> &[BatchOperation] {
        &self.operations
    }

    /// Encode as one newline-terminated log record.
    pub(crate) fn to_log_line(&self) -> StorageResult<Vec<u8>> {
        let mut line =
            serde_json::to_vec(self).map_err(|e| StorageError::Serialization(e.to_string()))?;
        line.push(b'\n');
        Ok(line)
    }

    pub(crate) fn from_log_line(line: &[u8]) -> StorageResult<Self> {
        serde_json::from_slice(line).map_err(|e| StorageError::Deserialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_batch() {
        let mut batch = WriteBatch::new();
        assert!(batch.is_empty());

        batch.put(ColumnFamily::Blocks, b"key1", b"value1");
        batch.put(ColumnFamily::Metadata, b"key2", b"value2");
        batch.delete(ColumnFamily::Blocks, b"key3");

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.operations()[2].kind, OperationKind::Delete);
    }

    #[test]
    fn test_log_line_is_one_readable_record() {
        let mut batch = WriteBatch::new();
        batch.put(ColumnFamily::HeightIndex, vec![0, 0, 0, 1], vec![0xab; 4]);
        batch.delete(ColumnFamily::Metadata, b"tip".to_vec());

        let line = batch.to_log_line().unwrap();
        assert_eq!(line.last(), Some(&b'\n'));
        assert_eq!(line.iter().filter(|b| **b == b'\n').count(), 1);
        let text = String::from_utf8(line.clone()).unwrap();
        assert!(text.contains("\"cf\":\"height_index\""));
        assert!(text.contains("\"value\":\"abababab\""));

        let decoded = WriteBatch::from_log_line(&line[..line.len() - 1]).unwrap();
        assert_eq!(decoded, batch);
    }

    #[test]
    fn test_truncated_log_line_rejected() {
        let mut batch = WriteBatch::new();
        batch.put(ColumnFamily::Blocks, b"k", b"v");
        let line = batch.to_log_line().unwrap();
        assert!(matches!(
            WriteBatch::from_log_line(&line[..line.len() / 2]),
            Err(StorageError::Deserialization(_))
        ));
    }
}
