//! The journal walk. One pass over the journal's block range, in address
//! order: parse each block's 12-byte header, dispatch on the block type,
//! and pair each committed descriptor tag with the data block that follows
//! the descriptor in the log. Nothing after setup is fatal; blocks that
//! cannot be read or parsed are counted and skipped.
use std::io::{Read, Seek};

use log::{debug, trace};

use crate::aggregate::{ForensicAggregator, ForensicSummary, WalkStats};
use crate::classify::{block_fingerprint, BlockClassifier, BlockContentType};
use crate::dirtree::DirectoryTree;
use crate::error::AnalyzerError;
use crate::image::ImageReader;
use crate::journal::{
    DescriptorTag, JournalBlockHeader, JournalBlockType, JournalCommitBlock,
    JournalDescriptorBlock,
};
use crate::locator::JournalLocation;
use crate::record::JournalRecord;

/// Inclusive sequence-number window. Blocks below `start` are skipped;
/// the first block above `end` terminates the walk.
#[derive(Debug, Default, Clone, Copy)]
pub struct SequenceFilter {
    pub start: Option<u32>,
    pub end: Option<u32>,
}

/// A descriptor waiting for its commit.
struct PendingTransaction {
    sequence: u32,
    tags: Vec<DescriptorTag>,
    descriptor_offset: u64,
}

pub struct ScanResult {
    pub records: Vec<JournalRecord>,
    pub summary: ForensicSummary,
}

pub struct JournalWalker<'a, T: Read + Seek> {
    reader: &'a mut ImageReader<T>,
    location: JournalLocation,
    filter: SequenceFilter,
    classifier: BlockClassifier,
    tree: DirectoryTree,
    aggregator: ForensicAggregator,
    stats: WalkStats,
}

impl<'a, T: Read + Seek> JournalWalker<'a, T> {
    pub fn new(
        reader: &'a mut ImageReader<T>,
        location: JournalLocation,
        filter: SequenceFilter,
    ) -> Self {
        let classifier = BlockClassifier::new(location.inode_size);
        JournalWalker {
            reader,
            location,
            filter,
            classifier,
            tree: DirectoryTree::new(),
            aggregator: ForensicAggregator::new(),
            stats: WalkStats::default(),
        }
    }

    /// Walk the whole journal range and materialize the record stream.
    /// Records keep strict journal order: within a transaction the
    /// descriptor record precedes the commit record, which precedes the
    /// transaction's data records.
    pub fn scan(mut self) -> Result<ScanResult, AnalyzerError> {
        let block_size = self.location.block_size;
        let journal_end = self.location.offset + self.location.size;
        let mut records: Vec<JournalRecord> = Vec::new();
        let mut pending: Option<PendingTransaction> = None;

        let mut offset = self.location.offset;
        while offset < journal_end {
            self.stats.blocks_scanned += 1;

            let block = match self.reader.read(offset, block_size as usize) {
                Ok(block) => block,
                Err(_) => {
                    self.stats.unreadable_blocks += 1;
                    offset += block_size;
                    continue;
                }
            };

            let header = match JournalBlockHeader::from_bytes(&block) {
                Some(header) if header.is_valid_magic() => header,
                _ => {
                    // Stale or non-journal content, including the data
                    // blocks of transactions (visited again via their
                    // descriptor tags).
                    self.stats.bad_magic_blocks += 1;
                    offset += block_size;
                    continue;
                }
            };
            self.stats.valid_headers += 1;
            trace!(
                "journal block at {}: type={:?} seq={}",
                offset,
                header.block_type(),
                header.h_sequence
            );

            if let Some(start) = self.filter.start {
                if header.h_sequence < start {
                    offset += block_size;
                    continue;
                }
            }
            if let Some(end) = self.filter.end {
                if header.h_sequence > end {
                    debug!("Sequence {} beyond filter end, stopping", header.h_sequence);
                    break;
                }
            }

            match header.block_type() {
                JournalBlockType::Descriptor => {
                    if let Some(old) = pending.take() {
                        debug!(
                            "Descriptor seq {} arrived before commit of seq {}; abandoning",
                            header.h_sequence, old.sequence
                        );
                    }
                    let tags = JournalDescriptorBlock::from_bytes(&block)
                        .map(|d| d.tags)
                        .unwrap_or_default();

                    let mut record = JournalRecord::new("descriptor", header.h_sequence);
                    record.operation_type = "transaction_start".to_string();
                    record.file_type = "transaction".to_string();
                    record.data_size = tags.len() as u64 * 8;
                    record.checksum = block_fingerprint(&block);
                    self.push(&mut records, record);

                    pending = Some(PendingTransaction {
                        sequence: header.h_sequence,
                        tags,
                        descriptor_offset: offset,
                    });
                }

                JournalBlockType::Commit => {
                    // The commit time is logged but never becomes the
                    // transaction's time; records stay sequence-relative.
                    if let Some(commit) = JournalCommitBlock::from_bytes(&block) {
                        trace!(
                            "commit seq {} stamped {}.{:09}",
                            header.h_sequence,
                            commit.commit_sec,
                            commit.commit_nsec
                        );
                    }
                    let mut record = JournalRecord::new("commit", header.h_sequence);
                    record.operation_type = "transaction_end".to_string();
                    record.file_type = "transaction".to_string();
                    record.checksum = block_fingerprint(&block);
                    self.push(&mut records, record);

                    if let Some(txn) = pending.take() {
                        for (i, tag) in txn.tags.iter().enumerate() {
                            let data_offset =
                                txn.descriptor_offset + block_size * (1 + i as u64);
                            let record = self.data_record(
                                header.h_sequence,
                                tag,
                                data_offset,
                                journal_end,
                            );
                            self.push(&mut records, record);
                        }
                        if txn.sequence != header.h_sequence {
                            debug!(
                                "Commit seq {} closes descriptor seq {}",
                                header.h_sequence, txn.sequence
                            );
                        }
                    }
                }

                JournalBlockType::Revoke => {
                    let mut record = JournalRecord::new("revocation", header.h_sequence);
                    record.operation_type = "block_revocation".to_string();
                    record.file_type = "revocation".to_string();
                    record.data_size = block_size - 12;
                    record.checksum = block_fingerprint(&block);
                    self.push(&mut records, record);
                }

                JournalBlockType::SuperblockV1 | JournalBlockType::SuperblockV2 => {
                    let mut record = JournalRecord::new("superblock", header.h_sequence);
                    record.operation_type = "journal_superblock".to_string();
                    record.file_type = "superblock".to_string();
                    record.data_size = block_size - 12;
                    record.checksum = block_fingerprint(&block);
                    self.push(&mut records, record);
                }

                JournalBlockType::Unknown(raw) => {
                    trace!("Skipping unknown journal block type {}", raw);
                }
            }

            offset += block_size;
        }

        let summary = self.aggregator.finish(self.stats);
        Ok(ScanResult { records, summary })
    }

    fn push(&mut self, records: &mut Vec<JournalRecord>, record: JournalRecord) {
        self.aggregator.observe(&record);
        records.push(record);
    }

    /// Build the record for one committed data block, assuming the
    /// `[descriptor][data...][commit]` layout. Blocks past the end of the
    /// journal window are reported but marked unreadable.
    fn data_record(
        &mut self,
        sequence: u32,
        tag: &DescriptorTag,
        data_offset: u64,
        journal_end: u64,
    ) -> JournalRecord {
        let block_size = self.location.block_size;
        let mut record = JournalRecord::new("data", sequence);
        record.fs_block_num = tag.t_blocknr as u64;
        record.data_size = block_size;
        // Legacy value; replaced by the block's own `..` entry when one is
        // present. Note this is a block number, not an inode number.
        record.parent_dir_inode = tag.t_blocknr as u64;

        let readable = data_offset + block_size <= journal_end;
        let data = if readable {
            self.reader.read(data_offset, block_size as usize).ok()
        } else {
            None
        };
        let data = match data {
            Some(data) => data,
            None => {
                record.operation_type = "filesystem_update".to_string();
                return record;
            }
        };

        record.checksum = block_fingerprint(&data);
        let classified = self.classifier.classify(&data);
        match classified.content_type {
            BlockContentType::InodeTable => {
                record.operation_type = if classified.inodes.len() > 1 {
                    "inode_batch_update".to_string()
                } else {
                    "inode_update".to_string()
                };
                record.change_type = "attribute_change".to_string();
                let (number, first) = &classified.inodes[0];
                record.file_type = first.file_type().to_string();
                record.file_size = first.size();
                record.inode_number = *number;
                record.link_count = first.i_links_count;
                record.affected_inode = *number as u64;
                for (number, inode) in &classified.inodes {
                    self.tree.add_inode_info(*number, inode);
                }
            }

            BlockContentType::Directory => {
                record.operation_type = "directory_update".to_string();
                record.file_type = "directory".to_string();
                record.change_type = "namespace_change".to_string();

                let parent = classified
                    .entries
                    .iter()
                    .find(|e| e.name == "..")
                    .map(|e| e.inode)
                    .unwrap_or(tag.t_blocknr);
                record.parent_dir_inode = parent as u64;
                if let Some(dot) = classified.entries.iter().find(|e| e.name == ".") {
                    record.affected_inode = dot.inode as u64;
                }

                for entry in &classified.entries {
                    self.tree.add_entry(parent, entry);
                }
                if let Some(first) = classified.entries.iter().find(|e| !e.is_dot_entry()) {
                    record.filename = first.name.clone();
                    if record.affected_inode == 0 {
                        record.affected_inode = first.inode as u64;
                    }
                    record.full_path = self.tree.build_full_path(first.inode);
                }
            }

            BlockContentType::Metadata => {
                record.operation_type = "metadata_update".to_string();
                record.file_type = "metadata".to_string();
                record.change_type = "allocation_change".to_string();
            }

            BlockContentType::FileData => {
                record.operation_type = "file_data_update".to_string();
                record.file_type = "file_data".to_string();
                record.change_type = "content_change".to_string();
                if let Some(analysis) = &classified.strings {
                    self.aggregator.observe_strings(analysis);
                    record.file_path = analysis.joined_samples();
                }
            }

            BlockContentType::Unknown => {
                record.operation_type = "filesystem_update".to_string();
            }
        }

        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::{JBD2_MAGIC, TAG_FLAG_LAST_TAG};
    use std::io::Cursor;

    const BS: u64 = 4096;

    fn header_block(block_type: u32, sequence: u32) -> Vec<u8> {
        let mut block = vec![0u8; BS as usize];
        block[0..4].copy_from_slice(&JBD2_MAGIC.to_be_bytes());
        block[4..8].copy_from_slice(&block_type.to_be_bytes());
        block[8..12].copy_from_slice(&sequence.to_be_bytes());
        block
    }

    fn descriptor_block(sequence: u32, tags: &[(u32, u32)]) -> Vec<u8> {
        let mut block = header_block(1, sequence);
        let mut offset = 12;
        for (blocknr, flags) in tags {
            block[offset..offset + 4].copy_from_slice(&blocknr.to_be_bytes());
            block[offset + 4..offset + 8].copy_from_slice(&flags.to_be_bytes());
            offset += 8;
        }
        block
    }

    fn directory_block(entries: &[(u32, &[u8], u8)]) -> Vec<u8> {
        let mut block = vec![0u8; BS as usize];
        let mut offset = 0;
        for (inode, name, file_type) in entries {
            let rec_len = 8 + ((name.len() + 3) & !3);
            block[offset..offset + 4].copy_from_slice(&inode.to_le_bytes());
            block[offset + 4..offset + 6].copy_from_slice(&(rec_len as u16).to_le_bytes());
            block[offset + 6] = name.len() as u8;
            block[offset + 7] = *file_type;
            block[offset + 8..offset + 8 + name.len()].copy_from_slice(name);
            offset += rec_len;
        }
        block
    }

    fn scan_image(blocks: Vec<Vec<u8>>, filter: SequenceFilter) -> ScanResult {
        let image: Vec<u8> = blocks.concat();
        let size = image.len() as u64;
        let mut reader = ImageReader::new(Cursor::new(image));
        let location = JournalLocation {
            offset: 0,
            size,
            block_size: BS,
            inode_size: 128,
        };
        JournalWalker::new(&mut reader, location, filter).scan().unwrap()
    }

    #[test]
    fn descriptor_data_commit_yields_three_records() {
        let result = scan_image(
            vec![
                descriptor_block(42, &[(163, TAG_FLAG_LAST_TAG)]),
                directory_block(&[(12345, b"home", 2)]),
                header_block(2, 42),
            ],
            SequenceFilter::default(),
        );
        let kinds: Vec<&str> = result.records.iter().map(|r| r.block_type.as_str()).collect();
        assert_eq!(kinds, ["descriptor", "commit", "data"]);

        let data = &result.records[2];
        assert_eq!(data.transaction_seq, 42);
        assert_eq!(data.fs_block_num, 163);
        assert_eq!(data.operation_type, "directory_update");
        assert_eq!(data.filename, "home");
        assert_eq!(data.full_path, "/home");
        assert_eq!(result.summary.total_transactions, 1);
    }

    #[test]
    fn data_record_count_matches_tag_count() {
        let result = scan_image(
            vec![
                descriptor_block(7, &[(500, 0), (501, 0), (502, TAG_FLAG_LAST_TAG)]),
                vec![0xAAu8; BS as usize],
                vec![0xBBu8; BS as usize],
                vec![0xCCu8; BS as usize],
                header_block(2, 7),
            ],
            SequenceFilter::default(),
        );
        let data_records: Vec<_> = result
            .records
            .iter()
            .filter(|r| r.block_type == "data")
            .collect();
        assert_eq!(data_records.len(), 3);
        assert_eq!(data_records[0].fs_block_num, 500);
        assert_eq!(data_records[2].fs_block_num, 502);
    }

    #[test]
    fn uncommitted_descriptor_is_abandoned() {
        let result = scan_image(
            vec![
                descriptor_block(5, &[(100, TAG_FLAG_LAST_TAG)]),
                descriptor_block(6, &[(200, TAG_FLAG_LAST_TAG)]),
                vec![0u8; BS as usize],
                header_block(2, 6),
            ],
            SequenceFilter::default(),
        );
        let data_records: Vec<_> = result
            .records
            .iter()
            .filter(|r| r.block_type == "data")
            .collect();
        assert_eq!(data_records.len(), 1);
        assert_eq!(data_records[0].fs_block_num, 200);
    }

    #[test]
    fn sequence_filter_skips_and_terminates() {
        let result = scan_image(
            vec![
                header_block(2, 3),
                header_block(2, 5),
                header_block(2, 9),
                header_block(2, 6),
            ],
            SequenceFilter {
                start: Some(4),
                end: Some(8),
            },
        );
        let seqs: Vec<u32> = result.records.iter().map(|r| r.transaction_seq).collect();
        // 3 skipped, 9 terminates the walk before 6 is reached.
        assert_eq!(seqs, [5]);
    }

    #[test]
    fn tags_past_journal_end_are_unreadable() {
        let result = scan_image(
            vec![
                descriptor_block(11, &[(900, 0), (901, 0), (902, TAG_FLAG_LAST_TAG)]),
                vec![0xEEu8; BS as usize],
                header_block(2, 11),
            ],
            SequenceFilter::default(),
        );
        let data_records: Vec<_> = result
            .records
            .iter()
            .filter(|r| r.block_type == "data")
            .collect();
        assert_eq!(data_records.len(), 3);
        // The third data block would live past the end of the journal window.
        assert_eq!(data_records[2].operation_type, "filesystem_update");
        assert!(data_records[2].checksum.is_empty());
        assert!(!data_records[0].checksum.is_empty());
    }

    #[test]
    fn revocation_and_superblock_records() {
        let result = scan_image(
            vec![header_block(5, 2), header_block(4, 3)],
            SequenceFilter::default(),
        );
        assert_eq!(result.records[0].block_type, "revocation");
        assert_eq!(result.records[0].operation_type, "block_revocation");
        assert_eq!(result.records[1].block_type, "superblock");
        assert_eq!(result.records[1].operation_type, "journal_superblock");
    }

    #[test]
    fn empty_region_yields_no_records() {
        let result = scan_image(
            vec![vec![0u8; BS as usize]],
            SequenceFilter::default(),
        );
        assert!(result.records.is_empty());
        assert_eq!(result.summary.total_transactions, 0);
        assert_eq!(result.summary.stats.blocks_scanned, 1);
        assert_eq!(result.summary.stats.bad_magic_blocks, 1);
    }
}
