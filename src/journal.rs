//! On-disk JBD/JBD2 structures. Unlike the rest of the filesystem, the
//! journal is big-endian; every field load here goes through an explicit
//! big-endian conversion regardless of host byte order.
use std::convert::TryInto;

use serde::{Deserialize, Serialize};

/// Canonical JBD2 magic as it appears when the first four block bytes are
/// loaded big-endian.
pub const JBD2_MAGIC: u32 = 0xC03B3998;
/// Byte orderings of the same magic seen across JBD (ext3) journals and
/// pre-swab tool output. All three are accepted.
pub const JBD2_MAGIC_ALT: u32 = 0x9839_B3C0;
pub const JBD_MAGIC: u32 = 0x9839_3BC0;

pub const JOURNAL_HEADER_SIZE: usize = 12;

/// Descriptor tag flag bits.
pub const TAG_FLAG_ESCAPE: u32 = 0x1;
pub const TAG_FLAG_SAME_UUID: u32 = 0x2;
pub const TAG_FLAG_DELETED: u32 = 0x4;
pub const TAG_FLAG_LAST_TAG: u32 = 0x8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalBlockType {
    Descriptor,
    Commit,
    SuperblockV1,
    SuperblockV2,
    Revoke,
    Unknown(u32),
}

impl From<u32> for JournalBlockType {
    fn from(raw: u32) -> Self {
        match raw {
            1 => JournalBlockType::Descriptor,
            2 => JournalBlockType::Commit,
            3 => JournalBlockType::SuperblockV1,
            4 => JournalBlockType::SuperblockV2,
            5 => JournalBlockType::Revoke,
            other => JournalBlockType::Unknown(other),
        }
    }
}

/// The 12-byte header at the start of every journal block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalBlockHeader {
    pub h_magic: u32,
    pub h_blocktype: u32,
    pub h_sequence: u32,
}

impl JournalBlockHeader {
    /// Returns `None` when fewer than 12 bytes are available. The magic is
    /// NOT checked here; stale blocks are the caller's skip decision.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < JOURNAL_HEADER_SIZE {
            return None;
        }
        Some(JournalBlockHeader {
            h_magic: u32::from_be_bytes(data[0..4].try_into().unwrap()),
            h_blocktype: u32::from_be_bytes(data[4..8].try_into().unwrap()),
            h_sequence: u32::from_be_bytes(data[8..12].try_into().unwrap()),
        })
    }

    /// Re-serialize to the on-disk big-endian form. Parsing followed by
    /// `to_bytes` reproduces the original 12 bytes exactly.
    pub fn to_bytes(&self) -> [u8; JOURNAL_HEADER_SIZE] {
        let mut out = [0u8; JOURNAL_HEADER_SIZE];
        out[0..4].copy_from_slice(&self.h_magic.to_be_bytes());
        out[4..8].copy_from_slice(&self.h_blocktype.to_be_bytes());
        out[8..12].copy_from_slice(&self.h_sequence.to_be_bytes());
        out
    }

    pub fn is_valid_magic(&self) -> bool {
        matches!(self.h_magic, JBD2_MAGIC | JBD2_MAGIC_ALT | JBD_MAGIC)
    }

    pub fn block_type(&self) -> JournalBlockType {
        JournalBlockType::from(self.h_blocktype)
    }
}

/// One tag inside a descriptor block: the filesystem block the following
/// journal data block restores, plus flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorTag {
    pub t_blocknr: u32,
    pub t_flags: u32,
}

impl DescriptorTag {
    pub fn is_last(&self) -> bool {
        (self.t_flags & TAG_FLAG_LAST_TAG) != 0
    }
}

/// A descriptor block: header plus the ordered tag list.
#[derive(Debug)]
pub struct JournalDescriptorBlock {
    pub header: JournalBlockHeader,
    pub tags: Vec<DescriptorTag>,
}

impl JournalDescriptorBlock {
    /// Parse the tag list after the header. Parsing stops at the last-tag
    /// flag, an all-zero pair, the end of the block, or the first tag that
    /// fails the loose validation (block number in (0, 2^31), flags within
    /// one byte) so trailing garbage cannot fabricate tags.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        let header = JournalBlockHeader::from_bytes(data)?;
        let mut tags = Vec::new();
        let mut offset = JOURNAL_HEADER_SIZE;
        while offset + 8 <= data.len() {
            let blocknr = u32::from_be_bytes(data[offset..offset + 4].try_into().unwrap());
            let flags = u32::from_be_bytes(data[offset + 4..offset + 8].try_into().unwrap());
            if blocknr == 0 && flags == 0 {
                break;
            }
            if blocknr == 0 || blocknr >= 0x8000_0000 || flags > 0xFF {
                break;
            }
            let tag = DescriptorTag {
                t_blocknr: blocknr,
                t_flags: flags,
            };
            tags.push(tag);
            if tag.is_last() {
                break;
            }
            offset += 8;
        }
        Some(JournalDescriptorBlock { header, tags })
    }
}

/// A commit block. The embedded commit time is parsed for completeness but
/// never assigned to a transaction; the analyzer reports only
/// sequence-relative positions.
#[derive(Debug)]
pub struct JournalCommitBlock {
    pub header: JournalBlockHeader,
    pub commit_sec: u64,
    pub commit_nsec: u32,
}

impl JournalCommitBlock {
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        let header = JournalBlockHeader::from_bytes(data)?;
        let (commit_sec, commit_nsec) = if data.len() >= 60 {
            (
                u64::from_be_bytes(data[48..56].try_into().unwrap()),
                u32::from_be_bytes(data[56..60].try_into().unwrap()),
            )
        } else {
            (0, 0)
        };
        Some(JournalCommitBlock {
            header,
            commit_sec,
            commit_nsec,
        })
    }
}

/// The journal superblock (block types 3 and 4). Used to size the scan
/// window when the journal inode did not report a length.
#[derive(Debug)]
pub struct JournalSuperblock {
    pub header: JournalBlockHeader,
    pub s_blocksize: u32,
    pub s_maxlen: u32,
    pub s_first: u32,
    pub s_sequence: u32,
    pub s_start: u32,
    pub s_feature_compat: u32,
    pub s_feature_incompat: u32,
    pub s_feature_ro_compat: u32,
}

const JOURNAL_INCOMPAT_64BIT: u32 = 0x10;

impl JournalSuperblock {
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 48 {
            return None;
        }
        let be_u32 = |offset: usize| -> u32 {
            u32::from_be_bytes(data[offset..offset + 4].try_into().unwrap())
        };
        Some(JournalSuperblock {
            header: JournalBlockHeader::from_bytes(data)?,
            s_blocksize: be_u32(12),
            s_maxlen: be_u32(16),
            s_first: be_u32(20),
            s_sequence: be_u32(24),
            s_start: be_u32(28),
            s_feature_compat: be_u32(36),
            s_feature_incompat: be_u32(40),
            s_feature_ro_compat: be_u32(44),
        })
    }

    /// Geometry sanity: a power-of-two block size in the 1 KiB..64 KiB
    /// range and a nonzero length.
    pub fn is_plausible(&self) -> bool {
        self.s_blocksize.is_power_of_two()
            && (1024..=65536).contains(&self.s_blocksize)
            && self.s_maxlen > 0
    }

    pub fn has_64bit(&self) -> bool {
        (self.s_feature_incompat & JOURNAL_INCOMPAT_64BIT) != 0
    }

    pub fn byte_len(&self) -> u64 {
        self.s_maxlen as u64 * self.s_blocksize as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrips_to_disk_bytes() {
        let raw: [u8; 12] = [
            0x98, 0x39, 0xB3, 0xC0, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x05,
        ];
        let header = JournalBlockHeader::from_bytes(&raw).unwrap();
        assert!(header.is_valid_magic());
        assert_eq!(header.block_type(), JournalBlockType::Commit);
        assert_eq!(header.h_sequence, 5);
        assert_eq!(header.to_bytes(), raw);
    }

    #[test]
    fn byteswap_decodes_sequence() {
        let raw: [u8; 12] = [
            0x98, 0x39, 0xB3, 0xC0, 0x00, 0x00, 0x00, 0x01, 0xFF, 0xFF, 0xFF, 0x00,
        ];
        let header = JournalBlockHeader::from_bytes(&raw).unwrap();
        assert!(header.is_valid_magic());
        assert_eq!(header.block_type(), JournalBlockType::Descriptor);
        assert_eq!(header.h_sequence, 0xFFFF_FF00);
    }

    #[test]
    fn canonical_big_endian_magic_is_accepted() {
        let raw: [u8; 12] = [
            0xC0, 0x3B, 0x39, 0x98, 0x00, 0x00, 0x00, 0x05, 0x00, 0x00, 0x00, 0x01,
        ];
        let header = JournalBlockHeader::from_bytes(&raw).unwrap();
        assert!(header.is_valid_magic());
        assert_eq!(header.block_type(), JournalBlockType::Revoke);
    }

    fn descriptor_block(tags: &[(u32, u32)]) -> Vec<u8> {
        let mut data = vec![0u8; 4096];
        data[0..4].copy_from_slice(&JBD2_MAGIC.to_be_bytes());
        data[4..8].copy_from_slice(&1u32.to_be_bytes());
        data[8..12].copy_from_slice(&42u32.to_be_bytes());
        let mut offset = 12;
        for (blocknr, flags) in tags {
            data[offset..offset + 4].copy_from_slice(&blocknr.to_be_bytes());
            data[offset + 4..offset + 8].copy_from_slice(&flags.to_be_bytes());
            offset += 8;
        }
        data
    }

    #[test]
    fn tag_list_stops_at_last_tag_flag() {
        let data = descriptor_block(&[(163, 0), (164, TAG_FLAG_LAST_TAG), (999, 0)]);
        let desc = JournalDescriptorBlock::from_bytes(&data).unwrap();
        assert_eq!(desc.tags.len(), 2);
        assert_eq!(desc.tags[0].t_blocknr, 163);
        assert!(desc.tags[1].is_last());
    }

    #[test]
    fn tag_list_stops_at_zero_pair_and_garbage() {
        let data = descriptor_block(&[(163, 0), (0, 0), (7, TAG_FLAG_LAST_TAG)]);
        let desc = JournalDescriptorBlock::from_bytes(&data).unwrap();
        assert_eq!(desc.tags.len(), 1);

        // Flags wider than a byte terminate parsing.
        let data = descriptor_block(&[(163, 0), (164, 0x1_0000), (165, 0)]);
        let desc = JournalDescriptorBlock::from_bytes(&data).unwrap();
        assert_eq!(desc.tags.len(), 1);

        // So does a block number with the top bit set.
        let data = descriptor_block(&[(0x8000_0001, 0)]);
        let desc = JournalDescriptorBlock::from_bytes(&data).unwrap();
        assert!(desc.tags.is_empty());
    }

    #[test]
    fn journal_superblock_geometry() {
        let mut data = vec![0u8; 1024];
        data[0..4].copy_from_slice(&JBD2_MAGIC.to_be_bytes());
        data[4..8].copy_from_slice(&4u32.to_be_bytes());
        data[12..16].copy_from_slice(&4096u32.to_be_bytes());
        data[16..20].copy_from_slice(&8192u32.to_be_bytes());
        data[24..28].copy_from_slice(&17u32.to_be_bytes());
        let sb = JournalSuperblock::from_bytes(&data).unwrap();
        assert!(sb.is_plausible());
        assert_eq!(sb.byte_len(), 4096 * 8192);
        assert_eq!(sb.s_sequence, 17);

        let mut bad = data.clone();
        bad[12..16].copy_from_slice(&1000u32.to_be_bytes());
        assert!(!JournalSuperblock::from_bytes(&bad).unwrap().is_plausible());
    }
}
