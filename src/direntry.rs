use std::convert::TryInto;

pub const FT_REG_FILE: u8 = 1;
pub const FT_DIR: u8 = 2;
pub const FT_SYMLINK: u8 = 7;

/// Replacement name for entries whose name bytes are not printable ASCII.
pub const BINARY_NAME: &str = "<binary_name>";

/// One `ext4_dir_entry_2` record as journaled inside a directory block.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub inode: u32,
    pub rec_len: u16,
    pub name_len: u8,
    pub file_type: u8,
    pub name: String,
}

impl DirEntry {
    /// Parse one entry at the start of `data` (the unconsumed remainder of
    /// the block). Returns `None` when the bytes cannot be an entry, which
    /// the caller treats as end-of-block.
    pub fn parse(data: &[u8]) -> Option<DirEntry> {
        if data.len() < 8 {
            return None;
        }
        let inode = u32::from_le_bytes(data[0..4].try_into().unwrap());
        let rec_len = u16::from_le_bytes(data[4..6].try_into().unwrap());
        let name_len = data[6];
        let file_type = data[7];

        if rec_len < 8 || rec_len as usize > data.len() {
            return None;
        }
        if name_len as usize > rec_len as usize - 8 {
            return None;
        }

        let raw_name = &data[8..8 + name_len as usize];
        Some(DirEntry {
            inode,
            rec_len,
            name_len,
            file_type,
            name: printable_name(raw_name),
        })
    }

    /// Loose acceptance rule applied on top of a successful parse. Entries
    /// with inode 0 are deleted or padding; the caller still advances past
    /// them by `rec_len`.
    pub fn is_acceptable(&self) -> bool {
        self.inode > 0 && self.rec_len >= 8
    }

    pub fn is_directory(&self) -> bool {
        self.file_type == FT_DIR
    }

    pub fn is_dot_entry(&self) -> bool {
        self.name == "." || self.name == ".."
    }
}

/// Names are ASCII on every real ext deployment the tool targets; anything
/// outside 0x20..0x7E (trailing NUL padding excepted) is replaced wholesale
/// so the CSV stays clean.
fn printable_name(raw: &[u8]) -> String {
    let trimmed = {
        let mut end = raw.len();
        while end > 0 && raw[end - 1] == 0 {
            end -= 1;
        }
        &raw[..end]
    };
    if trimmed.iter().all(|&b| (0x20..=0x7E).contains(&b)) {
        String::from_utf8_lossy(trimmed).to_string()
    } else {
        BINARY_NAME.to_string()
    }
}
