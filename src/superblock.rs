/// Reference: https://www.kernel.org/doc/html/v4.19/filesystems/ext4/ondisk/index.html#super-block
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::convert::TryInto;

const EXT_MAGIC: u16 = 0xEF53;

pub const EXT3_FEATURE_COMPAT_HAS_JOURNAL: u32 = 0x0004;
pub const EXT4_FEATURE_INCOMPAT_JOURNAL_DEV: u32 = 0x0008;

/// The superblock fields the journal analyzer needs. The on-disk record is
/// 1024 bytes at partition offset 1024, all little-endian.
#[derive(Debug, Serialize, Deserialize)]
pub struct Superblock {
    pub s_inodes_count: u32,
    pub s_blocks_count: u32,
    pub s_first_data_block: u32,
    pub s_log_block_size: u32,
    pub s_blocks_per_group: u32,
    pub s_inodes_per_group: u32,
    pub s_magic: u16,
    pub s_state: u16,
    pub s_rev_level: u32,
    pub s_first_ino: u32,
    pub s_inode_size: u16,
    pub s_feature_compat: u32,
    pub s_feature_incompat: u32,
    pub s_feature_ro_compat: u32,
    pub s_uuid: [u8; 16],
    pub s_journal_inum: u32,
}

impl Superblock {
    pub fn from_bytes(data: &[u8]) -> Result<Self, String> {
        if data.len() < 0x400 {
            return Err("Not enough bytes to parse superblock".to_string());
        }
        let le_u16 = |offset: usize| -> u16 {
            u16::from_le_bytes(data[offset..offset + 2].try_into().unwrap())
        };
        let le_u32 = |offset: usize| -> u32 {
            u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap())
        };

        let s_magic = le_u16(0x38);
        if s_magic != EXT_MAGIC {
            return Err("Invalid FileSystem".to_string());
        }

        let sb = Self {
            s_inodes_count: le_u32(0x00),
            s_blocks_count: le_u32(0x04),
            s_first_data_block: le_u32(0x14),
            s_log_block_size: le_u32(0x18),
            s_blocks_per_group: le_u32(0x20),
            s_inodes_per_group: le_u32(0x28),
            s_magic,
            s_state: le_u16(0x3A),
            s_rev_level: le_u32(0x4C),
            s_first_ino: le_u32(0x54),
            s_inode_size: le_u16(0x58),
            s_feature_compat: le_u32(0x5C),
            s_feature_incompat: le_u32(0x60),
            s_feature_ro_compat: le_u32(0x64),
            s_uuid: data[0x68..0x78].try_into().unwrap(),
            s_journal_inum: le_u32(0xE0),
        };
        debug!(
            "Superblock: block_size={} inode_size={} compat=0x{:08x} incompat=0x{:08x}",
            sb.block_size(),
            sb.inode_size(),
            sb.s_feature_compat,
            sb.s_feature_incompat
        );
        Ok(sb)
    }

    pub fn block_size(&self) -> u64 {
        1024u64 << self.s_log_block_size
    }

    /// Inode record size; revision-0 filesystems report zero and mean 128.
    pub fn inode_size(&self) -> usize {
        if self.s_inode_size > 0 {
            self.s_inode_size as usize
        } else {
            128
        }
    }

    /// An internal journal (COMPAT) or an external journal device (INCOMPAT).
    pub fn has_journal(&self) -> bool {
        (self.s_feature_compat & EXT3_FEATURE_COMPAT_HAS_JOURNAL) != 0
            || (self.s_feature_incompat & EXT4_FEATURE_INCOMPAT_JOURNAL_DEV) != 0
    }

    /// Journal inode number; 8 on every stock mkfs.
    pub fn journal_inum(&self) -> u32 {
        if self.s_journal_inum != 0 {
            self.s_journal_inum
        } else {
            8
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "inodes_count": self.s_inodes_count,
            "blocks_count": self.s_blocks_count,
            "log_block_size": self.s_log_block_size,
            "block_size": self.block_size(),
            "inode_size": self.inode_size(),
            "magic": format!("0x{:04x}", self.s_magic),
            "feature_compat": format!("0x{:08x}", self.s_feature_compat),
            "feature_incompat": format!("0x{:08x}", self.s_feature_incompat),
            "feature_ro_compat": format!("0x{:08x}", self.s_feature_ro_compat),
            "has_journal": self.has_journal(),
            "journal_inum": self.journal_inum(),
        })
    }
}
