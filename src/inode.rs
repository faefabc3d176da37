/// Reference: https://www.kernel.org/doc/html/latest/filesystems/ext4/index.html
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::convert::TryInto;

pub const EXT4_EXTENTS_FL: u32 = 0x0008_0000;

const S_IFMT: u16 = 0xF000;
const S_IFSOCK: u16 = 0xC000;
const S_IFLNK: u16 = 0xA000;
const S_IFREG: u16 = 0x8000;
const S_IFBLK: u16 = 0x6000;
const S_IFDIR: u16 = 0x4000;
const S_IFCHR: u16 = 0x2000;
const S_IFIFO: u16 = 0x1000;

/// The classic 128-byte inode view. Journaled inode-table blocks carry
/// whatever inode size the filesystem uses, but the analyzer only interprets
/// the first 128 bytes of each slot; the extended ext4 tail adds nothing to
/// block classification.
#[derive(Debug, Serialize, Deserialize)]
pub struct Inode {
    pub i_mode: u16,
    pub i_uid: u16,
    pub i_size_lo: u32,
    pub i_atime: u32,
    pub i_ctime: u32,
    pub i_mtime: u32,
    pub i_dtime: u32,
    pub i_atime_h: String,
    pub i_ctime_h: String,
    pub i_mtime_h: String,
    pub i_dtime_h: String,
    pub i_gid: u16,
    pub i_links_count: u16,
    pub i_blocks_lo: u32,
    pub i_flags: u32,
    pub i_block: [u32; 15],
    pub i_generation: u32,
    pub i_file_acl_lo: u32,
    pub i_size_high: u32,
    pub l_i_blocks_high: u16,
    pub l_i_file_acl_high: u16,
    pub l_i_uid_high: u16,
    pub l_i_gid_high: u16,
}

/// Readable file type from the mode's high nibble.
pub fn file_type_string(mode: u16) -> &'static str {
    match mode & S_IFMT {
        S_IFREG => "regular_file",
        S_IFDIR => "directory",
        S_IFLNK => "symlink",
        S_IFCHR => "char_device",
        S_IFBLK => "block_device",
        S_IFIFO => "fifo",
        S_IFSOCK => "socket",
        _ => "unknown",
    }
}

impl Inode {
    /// Parse the 128-byte view. `data` must contain at least 128 bytes;
    /// larger inode records are simply truncated for analysis.
    pub fn from_bytes(data: &[u8]) -> Self {
        let le_u16 = |offset: usize| -> u16 {
            u16::from_le_bytes(data[offset..offset + 2].try_into().unwrap())
        };
        let le_u32 = |offset: usize| -> u32 {
            u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap())
        };

        let format_time = |seconds: u32| {
            Utc.timestamp_opt(seconds as i64, 0)
                .single()
                .map(|dt| dt.to_rfc3339())
                .unwrap_or_default()
        };

        let i_atime = le_u32(0x08);
        let i_ctime = le_u32(0x0C);
        let i_mtime = le_u32(0x10);
        let i_dtime = le_u32(0x14);

        let mut i_block = [0u32; 15];
        for (i, slot) in i_block.iter_mut().enumerate() {
            *slot = le_u32(0x28 + i * 4);
        }

        Inode {
            i_mode: le_u16(0x00),
            i_uid: le_u16(0x02),
            i_size_lo: le_u32(0x04),
            i_atime,
            i_ctime,
            i_mtime,
            i_dtime,
            i_atime_h: format_time(i_atime),
            i_ctime_h: format_time(i_ctime),
            i_mtime_h: format_time(i_mtime),
            i_dtime_h: format_time(i_dtime),
            i_gid: le_u16(0x18),
            i_links_count: le_u16(0x1A),
            i_blocks_lo: le_u32(0x1C),
            i_flags: le_u32(0x20),
            i_block,
            i_generation: le_u32(0x64),
            i_file_acl_lo: le_u32(0x68),
            i_size_high: le_u32(0x6C),
            l_i_blocks_high: le_u16(0x74),
            l_i_file_acl_high: le_u16(0x76),
            l_i_uid_high: le_u16(0x78),
            l_i_gid_high: le_u16(0x7A),
        }
    }

    /// Full 64-bit size combining `i_size_lo` and `i_size_high`.
    pub fn size(&self) -> u64 {
        ((self.i_size_high as u64) << 32) | (self.i_size_lo as u64)
    }

    pub fn mode(&self) -> u16 {
        self.i_mode
    }

    pub fn flags(&self) -> u32 {
        self.i_flags
    }

    pub fn uid(&self) -> u32 {
        ((self.l_i_uid_high as u32) << 16) | (self.i_uid as u32)
    }

    pub fn gid(&self) -> u32 {
        ((self.l_i_gid_high as u32) << 16) | (self.i_gid as u32)
    }

    pub fn is_dir(&self) -> bool {
        (self.i_mode & S_IFMT) == S_IFDIR
    }

    pub fn uses_extents(&self) -> bool {
        (self.i_flags & EXT4_EXTENTS_FL) != 0
    }

    pub fn block_pointers(&self) -> &[u32; 15] {
        &self.i_block
    }

    /// A slot in a candidate inode-table block counts as an inode iff the
    /// mode is set and the link count is a sane nonzero 16-bit value.
    pub fn is_plausible(&self) -> bool {
        self.i_mode != 0 && self.i_links_count > 0
    }

    pub fn file_type(&self) -> &'static str {
        file_type_string(self.i_mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub fn build_inode_bytes(mode: u16, links: u16, size_lo: u32, size_hi: u32) -> Vec<u8> {
        let mut data = vec![0u8; 128];
        data[0x00..0x02].copy_from_slice(&mode.to_le_bytes());
        data[0x04..0x08].copy_from_slice(&size_lo.to_le_bytes());
        data[0x1A..0x1C].copy_from_slice(&links.to_le_bytes());
        data[0x6C..0x70].copy_from_slice(&size_hi.to_le_bytes());
        data
    }

    #[test]
    fn size_combines_high_and_low() {
        let inode = Inode::from_bytes(&build_inode_bytes(0x81A4, 1, 0x10, 0x2));
        assert_eq!(inode.size(), 0x2_0000_0010);
        assert_eq!(inode.file_type(), "regular_file");
    }

    #[test]
    fn plausibility_requires_mode_and_links() {
        assert!(Inode::from_bytes(&build_inode_bytes(0x41ED, 2, 4096, 0)).is_plausible());
        assert!(!Inode::from_bytes(&build_inode_bytes(0, 2, 0, 0)).is_plausible());
        assert!(!Inode::from_bytes(&build_inode_bytes(0x81A4, 0, 0, 0)).is_plausible());
    }

    #[test]
    fn file_type_nibbles() {
        assert_eq!(file_type_string(0x4000), "directory");
        assert_eq!(file_type_string(0xA1FF), "symlink");
        assert_eq!(file_type_string(0xC000), "socket");
        assert_eq!(file_type_string(0x0000), "unknown");
    }
}
