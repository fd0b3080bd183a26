//! The append-only patch log.
//!
//! `PatchLog` holds the ordered in-memory view of a project's patch
//! sequence. The append guard is the system's only concurrency check:
//! a caller whose expected sequence number is stale gets
//! [`PatchError::OutOfOrder`] and must reconstruct before retrying.

use crate::patch::PatchRecord;
use thiserror::Error;

/// Errors from log operations.
#[derive(Debug, Error)]
pub enum PatchError {
    /// The caller's view of the log is stale; something else appended
    /// since it last reconstructed.
    #[error("out-of-order patch: expected sequence {expected}, found {found}")]
    OutOfOrder { expected: u64, found: u64 },
}

/// Ordered, append-only sequence of patch records, gapless from 1.
#[derive(Debug, Clone, Default)]
pub struct PatchLog {
    records: Vec<PatchRecord>,
}

impl PatchLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a log from records already validated by the persistence
    /// layer (ordered, gapless).
    pub fn from_records(records: Vec<PatchRecord>) -> Self {
        Self { records }
    }

    /// The sequence number the next appended patch must carry.
    pub fn next_seq(&self) -> u64 {
        self.records.len() as u64 + 1
    }

    /// Append a record carrying the next sequence number.
    pub fn append(&mut self, record: PatchRecord) -> Result<u64, PatchError> {
        let expected = self.next_seq();
        if record.seq != expected {
            return Err(PatchError::OutOfOrder {
                expected,
                found: record.seq,
            });
        }
        let seq = record.seq;
        self.records.push(record);
        Ok(seq)
    }

    pub fn records(&self) -> &[PatchRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
