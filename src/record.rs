use serde::{Deserialize, Serialize};

use crate::error::AnalyzerError;

/// One row of the analysis output: a decoded journal block and everything
/// that could be inferred about it. Field order here is the CSV column
/// order; do not reorder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalRecord {
    pub relative_time: String,
    pub transaction_seq: u32,
    pub block_type: String,
    pub fs_block_num: u64,
    pub operation_type: String,
    pub affected_inode: u64,
    pub file_path: String,
    pub data_size: u64,
    pub checksum: String,
    pub file_type: String,
    pub file_size: u64,
    pub inode_number: u32,
    pub link_count: u16,
    pub filename: String,
    pub parent_dir_inode: u64,
    pub change_type: String,
    pub full_path: String,
}

impl JournalRecord {
    pub fn new(block_type: &str, transaction_seq: u32) -> Self {
        JournalRecord {
            relative_time: String::new(),
            transaction_seq,
            block_type: block_type.to_string(),
            fs_block_num: 0,
            operation_type: String::new(),
            affected_inode: 0,
            file_path: String::new(),
            data_size: 0,
            checksum: String::new(),
            file_type: String::new(),
            file_size: 0,
            inode_number: 0,
            link_count: 0,
            filename: String::new(),
            parent_dir_inode: 0,
            change_type: String::new(),
            full_path: String::new(),
        }
    }
}

/// Position of a sequence number relative to the oldest one observed,
/// rendered `T+<n>` (or `T-<n>` for anything older).
pub fn relative_time(seq: u32, min_seq: u32) -> String {
    let delta = seq as i64 - min_seq as i64;
    if delta < 0 {
        format!("T-{}", -delta)
    } else {
        format!("T+{}", delta)
    }
}

/// Sink for the record stream. The walker emits records in strict journal
/// block order and calls `flush` once at the end of the run.
pub trait RecordEmitter {
    fn emit(&mut self, record: &JournalRecord) -> Result<(), AnalyzerError>;
    fn flush(&mut self) -> Result<(), AnalyzerError>;
    fn close(&mut self) -> Result<(), AnalyzerError> {
        self.flush()
    }
}

/// Discards everything. Used when only the summary is wanted, and in tests.
#[derive(Default)]
pub struct NullEmitter;

impl RecordEmitter for NullEmitter {
    fn emit(&mut self, _record: &JournalRecord) -> Result<(), AnalyzerError> {
        Ok(())
    }

    fn flush(&mut self) -> Result<(), AnalyzerError> {
        Ok(())
    }
}
