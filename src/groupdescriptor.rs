use serde::{Deserialize, Serialize};
use std::convert::TryInto;

/// The classic 32-byte group descriptor layout. Only group 0 is consulted
/// here, to find the inode table holding the journal inode; the 64-bit
/// extension words are not needed for that.
#[derive(Debug, Serialize, Deserialize)]
pub struct GroupDescriptor {
    pub bg_block_bitmap: u32,
    pub bg_inode_bitmap: u32,
    pub bg_inode_table: u32,
    pub bg_free_blocks_count: u16,
    pub bg_free_inodes_count: u16,
    pub bg_used_dirs_count: u16,
    pub bg_flags: u16,
}

impl GroupDescriptor {
    /// `data` must contain at least 32 bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        let le_u16 = |offset: usize| -> u16 {
            u16::from_le_bytes(data[offset..offset + 2].try_into().unwrap())
        };
        let le_u32 = |offset: usize| -> u32 {
            u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap())
        };

        GroupDescriptor {
            bg_block_bitmap: le_u32(0x00),
            bg_inode_bitmap: le_u32(0x04),
            bg_inode_table: le_u32(0x08),
            bg_free_blocks_count: le_u16(0x0C),
            bg_free_inodes_count: le_u16(0x0E),
            bg_used_dirs_count: le_u16(0x10),
            bg_flags: le_u16(0x12),
        }
    }

    pub fn bg_inode_table(&self) -> u64 {
        self.bg_inode_table as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_inode_table_block() {
        let mut data = vec![0u8; 32];
        data[0x08..0x0C].copy_from_slice(&35u32.to_le_bytes());
        let gd = GroupDescriptor::from_bytes(&data);
        assert_eq!(gd.bg_inode_table(), 35);
    }
}
