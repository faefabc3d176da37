//! Run-wide statistics over the record stream. The aggregator only counts;
//! it never rejects a record, reclassifies anything, or alters the stream.
use std::collections::{BTreeSet, HashSet};
use std::fmt;

use prettytable::{Cell, Row, Table};
use serde_json::{json, Value};

use crate::record::JournalRecord;
use crate::strings::StringAnalysis;

/// At most this many recovered strings are kept for the summary.
const MAX_SUMMARY_SAMPLES: usize = 5;

/// Journalling mode inferred from the shape of the record stream. Advisory
/// only: a short or idle journal often stays `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalMode {
    Journal,
    Ordered,
    Writeback,
    Unknown,
}

impl fmt::Display for JournalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JournalMode::Journal => "JOURNAL",
            JournalMode::Ordered => "ORDERED",
            JournalMode::Writeback => "WRITEBACK",
            JournalMode::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Low-level walk counters, owned by the walker and folded into the summary.
#[derive(Debug, Default, Clone)]
pub struct WalkStats {
    pub blocks_scanned: u64,
    pub valid_headers: u64,
    pub unreadable_blocks: u64,
    pub bad_magic_blocks: u64,
}

#[derive(Debug, Default)]
pub struct ForensicAggregator {
    descriptor_blocks: u64,
    commit_blocks: u64,
    revocation_blocks: u64,
    superblock_blocks: u64,
    data_blocks: u64,
    metadata_flavor_ops: u64,
    observed_seqs: BTreeSet<u32>,
    unique_fs_blocks: HashSet<u64>,
    data_blocks_with_strings: u64,
    text_file_blocks: u64,
    config_file_blocks: u64,
    log_file_blocks: u64,
    sample_strings: Vec<String>,
    tag_counts: Vec<u64>,
}

impl ForensicAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, record: &JournalRecord) {
        self.observed_seqs.insert(record.transaction_seq);
        match record.block_type.as_str() {
            "descriptor" => {
                self.descriptor_blocks += 1;
                // Descriptor records carry 8 bytes per tag.
                self.tag_counts.push(record.data_size / 8);
            }
            "commit" => self.commit_blocks += 1,
            "revocation" => self.revocation_blocks += 1,
            "superblock" => self.superblock_blocks += 1,
            "data" => {
                self.data_blocks += 1;
                self.unique_fs_blocks.insert(record.fs_block_num);
                if matches!(
                    record.operation_type.as_str(),
                    "inode_update" | "inode_batch_update" | "metadata_update"
                ) {
                    self.metadata_flavor_ops += 1;
                }
            }
            _ => {}
        }
    }

    /// Fed alongside every FILE_DATA record.
    pub fn observe_strings(&mut self, analysis: &StringAnalysis) {
        if analysis.has_strings() {
            self.data_blocks_with_strings += 1;
        }
        if analysis.looks_text {
            self.text_file_blocks += 1;
        }
        if analysis.looks_config {
            self.config_file_blocks += 1;
        }
        if analysis.looks_log {
            self.log_file_blocks += 1;
        }
        for sample in &analysis.samples {
            if self.sample_strings.len() >= MAX_SUMMARY_SAMPLES {
                break;
            }
            self.sample_strings.push(sample.clone());
        }
    }

    fn detect_mode(&self) -> JournalMode {
        if self.data_blocks == 0 && self.descriptor_blocks >= 1 {
            return JournalMode::Ordered;
        }
        if self.data_blocks as f64 > 0.5 * self.descriptor_blocks as f64 {
            return JournalMode::Journal;
        }
        if self.metadata_flavor_ops as f64 > 0.8 * self.descriptor_blocks as f64 {
            return JournalMode::Ordered;
        }
        JournalMode::Unknown
    }

    pub fn finish(self, stats: WalkStats) -> ForensicSummary {
        let min_seq = self.observed_seqs.iter().next().copied();
        let max_seq = self.observed_seqs.iter().next_back().copied();
        let sequence_gaps = match (min_seq, max_seq) {
            (Some(lo), Some(hi)) => {
                (hi as u64 - lo as u64 + 1) - self.observed_seqs.len() as u64
            }
            _ => 0,
        };
        let max_tags = self.tag_counts.iter().copied().max().unwrap_or(0);
        let avg_tags = if self.tag_counts.is_empty() {
            0.0
        } else {
            self.tag_counts.iter().sum::<u64>() as f64 / self.tag_counts.len() as f64
        };
        let detected_mode = self.detect_mode();

        ForensicSummary {
            stats,
            descriptor_blocks: self.descriptor_blocks,
            commit_blocks: self.commit_blocks,
            revocation_blocks: self.revocation_blocks,
            superblock_blocks: self.superblock_blocks,
            data_blocks: self.data_blocks,
            total_transactions: self.commit_blocks,
            min_seq,
            max_seq,
            sequence_gaps,
            unique_fs_blocks: self.unique_fs_blocks.len() as u64,
            data_blocks_with_strings: self.data_blocks_with_strings,
            text_file_blocks: self.text_file_blocks,
            config_file_blocks: self.config_file_blocks,
            log_file_blocks: self.log_file_blocks,
            sample_strings: self.sample_strings,
            avg_tags_per_transaction: avg_tags,
            max_tags_per_transaction: max_tags,
            detected_mode,
        }
    }
}

/// Everything the analyst sees after the walk.
#[derive(Debug)]
pub struct ForensicSummary {
    pub stats: WalkStats,
    pub descriptor_blocks: u64,
    pub commit_blocks: u64,
    pub revocation_blocks: u64,
    pub superblock_blocks: u64,
    pub data_blocks: u64,
    pub total_transactions: u64,
    pub min_seq: Option<u32>,
    pub max_seq: Option<u32>,
    pub sequence_gaps: u64,
    pub unique_fs_blocks: u64,
    pub data_blocks_with_strings: u64,
    pub text_file_blocks: u64,
    pub config_file_blocks: u64,
    pub log_file_blocks: u64,
    pub sample_strings: Vec<String>,
    pub avg_tags_per_transaction: f64,
    pub max_tags_per_transaction: u64,
    pub detected_mode: JournalMode,
}

impl ForensicSummary {
    pub fn to_json(&self) -> Value {
        json!({
            "blocks_scanned": self.stats.blocks_scanned,
            "valid_headers": self.stats.valid_headers,
            "unreadable_blocks": self.stats.unreadable_blocks,
            "bad_magic_blocks": self.stats.bad_magic_blocks,
            "descriptor_blocks": self.descriptor_blocks,
            "commit_blocks": self.commit_blocks,
            "revocation_blocks": self.revocation_blocks,
            "superblock_blocks": self.superblock_blocks,
            "data_blocks": self.data_blocks,
            "total_transactions": self.total_transactions,
            "min_seq": self.min_seq,
            "max_seq": self.max_seq,
            "sequence_gaps": self.sequence_gaps,
            "unique_fs_blocks": self.unique_fs_blocks,
            "data_blocks_with_strings": self.data_blocks_with_strings,
            "text_file_blocks": self.text_file_blocks,
            "config_file_blocks": self.config_file_blocks,
            "log_file_blocks": self.log_file_blocks,
            "sample_strings": self.sample_strings,
            "avg_tags_per_transaction": self.avg_tags_per_transaction,
            "max_tags_per_transaction": self.max_tags_per_transaction,
            "detected_mode": self.detected_mode.to_string(),
        })
    }

    /// Terminal rendering of the summary.
    pub fn render(&self) -> String {
        let mut table = Table::new();
        let mut row = |label: &str, value: String| {
            table.add_row(Row::new(vec![Cell::new(label), Cell::new(&value)]));
        };
        row("Blocks scanned", self.stats.blocks_scanned.to_string());
        row("Valid journal headers", self.stats.valid_headers.to_string());
        row("Unreadable blocks", self.stats.unreadable_blocks.to_string());
        row("Bad-magic blocks", self.stats.bad_magic_blocks.to_string());
        row("Descriptor blocks", self.descriptor_blocks.to_string());
        row("Commit blocks", self.commit_blocks.to_string());
        row("Revocation blocks", self.revocation_blocks.to_string());
        row("Journal superblocks", self.superblock_blocks.to_string());
        row("Data blocks", self.data_blocks.to_string());
        row("Total transactions", self.total_transactions.to_string());
        row(
            "Sequence range",
            match (self.min_seq, self.max_seq) {
                (Some(lo), Some(hi)) => format!("{} - {}", lo, hi),
                _ => "n/a".to_string(),
            },
        );
        row("Sequence gaps", self.sequence_gaps.to_string());
        row("Unique FS blocks", self.unique_fs_blocks.to_string());
        row(
            "Data blocks with strings",
            self.data_blocks_with_strings.to_string(),
        );
        row("Text-like blocks", self.text_file_blocks.to_string());
        row("Config-like blocks", self.config_file_blocks.to_string());
        row("Log-like blocks", self.log_file_blocks.to_string());
        row(
            "Avg tags per transaction",
            format!("{:.1}", self.avg_tags_per_transaction),
        );
        row(
            "Max tags per transaction",
            self.max_tags_per_transaction.to_string(),
        );
        row("Detected journal mode", self.detected_mode.to_string());
        if !self.sample_strings.is_empty() {
            row("Sample strings", self.sample_strings.join("\n"));
        }
        table.to_string()
    }
}
