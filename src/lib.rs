//! Read-only forensic analysis of the JBD/JBD2 journal carried by ext3 and
//! ext4 filesystems. The journal is located through the filesystem's own
//! metadata (or a manual offset), every journal block is decoded, each
//! restored data block is classified, and the directory entries observed
//! along the way rebuild as much of the tree as the journal reveals.
use std::io::{Read, Seek};

pub mod aggregate;
pub mod classify;
pub mod csv;
pub mod direntry;
pub mod dirtree;
pub mod error;
pub mod extent;
pub mod groupdescriptor;
pub mod image;
pub mod inode;
pub mod journal;
pub mod locator;
pub mod record;
pub mod strings;
pub mod superblock;
pub mod walker;

pub use aggregate::{ForensicSummary, JournalMode};
pub use csv::CsvEmitter;
pub use error::AnalyzerError;
pub use image::{ImageFormat, ImageReader};
pub use locator::{locate_journal, JournalLocation};
pub use record::{JournalRecord, NullEmitter, RecordEmitter};
pub use walker::{JournalWalker, SequenceFilter};

use log::info;
use record::relative_time;

/// Walk the located journal and stream every decoded block to `emitter`,
/// in journal order. Relative times are resolved against the oldest
/// sequence number seen, so the stream is materialized before emission.
pub fn analyze<T: Read + Seek>(
    reader: &mut ImageReader<T>,
    location: JournalLocation,
    filter: SequenceFilter,
    emitter: &mut dyn RecordEmitter,
) -> Result<ForensicSummary, AnalyzerError> {
    let result = JournalWalker::new(reader, location, filter).scan()?;
    let mut records = result.records;
    let summary = result.summary;

    let min_seq = summary.min_seq.unwrap_or(0);
    for record in &mut records {
        record.relative_time = relative_time(record.transaction_seq, min_seq);
    }

    info!("Emitting {} journal records", records.len());
    for record in &records {
        emitter.emit(record)?;
    }
    emitter.flush()?;
    Ok(summary)
}

/// Rough transaction-count estimate for progress hints, assuming ten
/// blocks per transaction on average.
pub fn estimated_transaction_count(location: &JournalLocation) -> u64 {
    location.size / (location.block_size * 10)
}
