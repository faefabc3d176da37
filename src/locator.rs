//! Journal location. The normal route follows the filesystem's own
//! metadata: superblock, group descriptor 0, journal inode, then either the
//! first extent or the first direct block pointer. When that trail is cold
//! a short list of offsets common across mkfs defaults is probed instead.
use std::io::{Read, Seek};

use log::{debug, info, warn};

use crate::error::AnalyzerError;
use crate::extent::{ExtentHeader, ExtentLeaf};
use crate::groupdescriptor::GroupDescriptor;
use crate::image::ImageReader;
use crate::inode::Inode;
use crate::journal::{JournalBlockHeader, JournalSuperblock, JOURNAL_HEADER_SIZE};
use crate::superblock::Superblock;

/// Scan window when nothing reports the journal's length.
pub const DEFAULT_JOURNAL_SCAN_SIZE: u64 = 128 * 1024 * 1024;

/// Journal block size assumed when no filesystem superblock was parsed
/// (manual offset into a bare journal dump).
const DEFAULT_BLOCK_SIZE: u64 = 4096;

/// Where the journal lives and the geometry the walker needs.
#[derive(Debug, Clone)]
pub struct JournalLocation {
    pub offset: u64,
    pub size: u64,
    pub block_size: u64,
    pub inode_size: usize,
}

/// True when 12 readable bytes at `offset` parse as a journal header with an
/// accepted magic.
fn validate_journal_magic<T: Read + Seek>(reader: &mut ImageReader<T>, offset: u64) -> bool {
    match reader.read(offset, JOURNAL_HEADER_SIZE) {
        Ok(bytes) => JournalBlockHeader::from_bytes(&bytes)
            .map(|h| h.is_valid_magic())
            .unwrap_or(false),
        Err(_) => false,
    }
}

/// Derive the journal size from the journal superblock when possible.
fn size_from_journal_superblock<T: Read + Seek>(
    reader: &mut ImageReader<T>,
    offset: u64,
) -> Option<u64> {
    let bytes = reader.read(offset, 1024).ok()?;
    let sb = JournalSuperblock::from_bytes(&bytes)?;
    if sb.header.is_valid_magic() && sb.is_plausible() {
        debug!(
            "Journal superblock: blocksize={} maxlen={} sequence={}",
            sb.s_blocksize, sb.s_maxlen, sb.s_sequence
        );
        Some(sb.byte_len())
    } else {
        None
    }
}

/// Locate the journal. A manual offset bypasses the superblock trail but
/// the magic at that offset is still validated.
pub fn locate_journal<T: Read + Seek>(
    reader: &mut ImageReader<T>,
    manual_offset: Option<u64>,
    manual_size: Option<u64>,
) -> Result<JournalLocation, AnalyzerError> {
    if let Some(offset) = manual_offset {
        if !validate_journal_magic(reader, offset) {
            return Err(AnalyzerError::JournalNotFound);
        }
        let size = manual_size
            .or_else(|| size_from_journal_superblock(reader, offset))
            .unwrap_or(DEFAULT_JOURNAL_SCAN_SIZE);
        info!("Using manual journal offset {} (size {})", offset, size);
        return Ok(JournalLocation {
            offset,
            size,
            block_size: DEFAULT_BLOCK_SIZE,
            inode_size: 128,
        });
    }

    find_journal_in_superblock(reader, manual_size)
}

fn find_journal_in_superblock<T: Read + Seek>(
    reader: &mut ImageReader<T>,
    manual_size: Option<u64>,
) -> Result<JournalLocation, AnalyzerError> {
    let sb_bytes = reader
        .read(1024, 1024)
        .map_err(|_| AnalyzerError::NoSuperblock)?;
    let superblock =
        Superblock::from_bytes(&sb_bytes).map_err(|_| AnalyzerError::NoSuperblock)?;

    if !superblock.has_journal() {
        return Err(AnalyzerError::NoJournalFeature);
    }

    let block_size = superblock.block_size();
    let inode_size = superblock.inode_size();
    info!(
        "Found ext filesystem: block_size={} inode_size={}",
        block_size, inode_size
    );

    // Group descriptor table starts in the block after the superblock.
    let gd_offset = (superblock.s_first_data_block as u64 + 1) * block_size;
    let gd_bytes = reader.read(gd_offset, 32)?;
    let group_desc = GroupDescriptor::from_bytes(&gd_bytes);

    let journal_inum = superblock.journal_inum() as u64;
    let inode_offset =
        group_desc.bg_inode_table() * block_size + (journal_inum - 1) * inode_size as u64;
    let inode_bytes = reader.read(inode_offset, inode_size.max(128))?;
    let journal_inode = Inode::from_bytes(&inode_bytes);

    let journal_block = journal_first_block(&journal_inode);
    debug!(
        "Journal inode {}: flags=0x{:x} first_block={}",
        journal_inum,
        journal_inode.flags(),
        journal_block
    );

    let derived_offset = journal_block * block_size;
    let offset = if journal_block != 0 && validate_journal_magic(reader, derived_offset) {
        derived_offset
    } else {
        warn!("Journal not at derived offset {}, probing common locations", derived_offset);
        fallback_scan(reader, block_size).ok_or(AnalyzerError::JournalNotFound)?
    };

    // The inode's low 32 size bits give the journal length; the journal
    // superblock is the backstop when the inode reports nothing.
    let size = manual_size
        .or(match journal_inode.i_size_lo {
            0 => None,
            n => Some(n as u64),
        })
        .or_else(|| size_from_journal_superblock(reader, offset))
        .unwrap_or(DEFAULT_JOURNAL_SCAN_SIZE);

    info!("Found journal at offset {} (size {})", offset, size);
    Ok(JournalLocation {
        offset,
        size,
        block_size,
        inode_size,
    })
}

/// First on-disk journal block from the journal inode: the start of the
/// first extent when the inode uses extents, the first direct pointer
/// otherwise.
fn journal_first_block(inode: &Inode) -> u64 {
    if inode.uses_extents() {
        let mut raw = [0u8; 60];
        for (i, &ptr) in inode.block_pointers().iter().enumerate() {
            raw[i * 4..i * 4 + 4].copy_from_slice(&ptr.to_le_bytes());
        }
        let header = ExtentHeader::from_bytes(&raw[0..8]);
        if header.is_valid() && header.eh_entries > 0 && header.is_leaf() {
            return ExtentLeaf::from_bytes(&raw[12..24]).ee_start;
        }
        0
    } else {
        inode.block_pointers()[0] as u64
    }
}

/// Offsets common across mkfs defaults, probed in order.
fn fallback_scan<T: Read + Seek>(reader: &mut ImageReader<T>, block_size: u64) -> Option<u64> {
    let candidates = [
        32 * 1024,
        64 * 1024,
        128 * 1024,
        256 * 1024,
        512 * 1024,
        1024 * 1024,
        block_size * 10,
        block_size * 100,
    ];
    for &offset in &candidates {
        if validate_journal_magic(reader, offset) {
            info!("Found journal at fallback offset {}", offset);
            return Some(offset);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inode::EXT4_EXTENTS_FL;
    use crate::journal::JBD2_MAGIC;
    use std::io::Cursor;

    const BS: u64 = 1024; // log_block_size = 0

    fn write_u16(image: &mut [u8], offset: usize, value: u16) {
        image[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }

    fn write_u32(image: &mut [u8], offset: usize, value: u32) {
        image[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn stamp_journal_magic(image: &mut [u8], offset: usize) {
        image[offset..offset + 4].copy_from_slice(&JBD2_MAGIC.to_be_bytes());
        write_be_u32(image, offset + 4, 4); // superblock v2
        write_be_u32(image, offset + 8, 1);
    }

    fn write_be_u32(image: &mut [u8], offset: usize, value: u32) {
        image[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
    }

    /// 1 KiB blocks, inode table at block 5, journal inode = inode 8.
    fn base_image() -> Vec<u8> {
        let mut image = vec![0u8; 256 * 1024];
        // Superblock at 1024.
        write_u16(&mut image, 1024 + 0x38, 0xEF53);
        write_u32(&mut image, 1024 + 0x18, 0); // 1 KiB blocks
        write_u32(&mut image, 1024 + 0x14, 1); // first data block
        write_u16(&mut image, 1024 + 0x58, 128);
        write_u32(&mut image, 1024 + 0x5C, 0x4); // has_journal
        write_u32(&mut image, 1024 + 0xE0, 8);
        // Group descriptor at block 2 (first_data_block + 1).
        write_u32(&mut image, 2048 + 0x08, 5); // inode table block
        image
    }

    fn journal_inode_offset() -> usize {
        (5 * BS + 7 * 128) as usize
    }

    #[test]
    fn follows_direct_block_pointer() {
        let mut image = base_image();
        let ino = journal_inode_offset();
        write_u16(&mut image, ino, 0x8180); // mode
        write_u32(&mut image, ino + 0x04, 8192); // size_lo
        write_u16(&mut image, ino + 0x1A, 1); // links
        write_u32(&mut image, ino + 0x28, 10); // i_block[0]
        stamp_journal_magic(&mut image, (10 * BS) as usize);

        let mut reader = ImageReader::new(Cursor::new(image));
        let location = locate_journal(&mut reader, None, None).unwrap();
        assert_eq!(location.offset, 10 * BS);
        assert_eq!(location.size, 8192);
        assert_eq!(location.block_size, BS);
        assert_eq!(location.inode_size, 128);
    }

    #[test]
    fn follows_first_extent() {
        let mut image = base_image();
        let ino = journal_inode_offset();
        write_u16(&mut image, ino, 0x8180);
        write_u32(&mut image, ino + 0x04, 4096);
        write_u16(&mut image, ino + 0x1A, 1);
        write_u32(&mut image, ino + 0x20, EXT4_EXTENTS_FL);
        // Extent header in i_block (inode offset 0x28).
        write_u16(&mut image, ino + 0x28, 0xF30A);
        write_u16(&mut image, ino + 0x2A, 1); // entries
        write_u16(&mut image, ino + 0x2E, 0); // depth
        // First extent leaf: ee_start_lo at +8 within the leaf.
        write_u32(&mut image, ino + 0x28 + 12 + 8, 20);
        stamp_journal_magic(&mut image, (20 * BS) as usize);

        let mut reader = ImageReader::new(Cursor::new(image));
        let location = locate_journal(&mut reader, None, None).unwrap();
        assert_eq!(location.offset, 20 * BS);
    }

    #[test]
    fn falls_back_to_common_offsets() {
        let mut image = base_image();
        // Journal inode left empty: derived block 0 never validates.
        stamp_journal_magic(&mut image, 64 * 1024);
        // The fallback journal superblock supplies the size.
        write_be_u32(&mut image, 64 * 1024 + 12, 1024);
        write_be_u32(&mut image, 64 * 1024 + 16, 32);

        let mut reader = ImageReader::new(Cursor::new(image));
        let location = locate_journal(&mut reader, None, None).unwrap();
        assert_eq!(location.offset, 64 * 1024);
        assert_eq!(location.size, 32 * 1024);
    }

    #[test]
    fn missing_superblock_and_features_fail() {
        let image = vec![0u8; 8192];
        let mut reader = ImageReader::new(Cursor::new(image));
        assert!(matches!(
            locate_journal(&mut reader, None, None),
            Err(AnalyzerError::NoSuperblock)
        ));

        let mut image = base_image();
        write_u32(&mut image, 1024 + 0x5C, 0); // drop the journal feature
        let mut reader = ImageReader::new(Cursor::new(image));
        assert!(matches!(
            locate_journal(&mut reader, None, None),
            Err(AnalyzerError::NoJournalFeature)
        ));
    }

    #[test]
    fn manual_offset_still_validates_magic() {
        let mut image = vec![0u8; 64 * 1024];
        stamp_journal_magic(&mut image, 4096);
        let mut reader = ImageReader::new(Cursor::new(image.clone()));
        let location = locate_journal(&mut reader, Some(4096), Some(16384)).unwrap();
        assert_eq!(location.offset, 4096);
        assert_eq!(location.size, 16384);
        assert_eq!(location.block_size, 4096);

        // No magic at the claimed offset.
        let mut reader = ImageReader::new(Cursor::new(vec![0u8; 64 * 1024]));
        assert!(matches!(
            locate_journal(&mut reader, Some(4096), None),
            Err(AnalyzerError::JournalNotFound)
        ));
    }
}
