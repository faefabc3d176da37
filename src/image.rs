use std::io::{Read, Seek, SeekFrom};

use log::{debug, warn};

use crate::error::AnalyzerError;

/// Largest single read the analyzer will ever issue. Journal blocks are at
/// most 64 KiB; anything above this is a corrupted length upstream.
const MAX_READ_SIZE: usize = 1024 * 1024;

/// Image backends the reader knows how to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Raw,
    Ewf,
}

impl ImageFormat {
    /// Resolve a CLI type hint against the file name. `auto` inspects the
    /// suffix case-insensitively: e01/ex01/l01 are EWF, everything else raw.
    pub fn resolve(hint: &str, path: &str) -> Result<ImageFormat, AnalyzerError> {
        match hint {
            "raw" => Ok(ImageFormat::Raw),
            "ewf" => Ok(ImageFormat::Ewf),
            "auto" => {
                let ext = path
                    .rsplit('.')
                    .next()
                    .map(|e| e.to_ascii_lowercase())
                    .unwrap_or_default();
                if matches!(ext.as_str(), "e01" | "ex01" | "l01") {
                    Ok(ImageFormat::Ewf)
                } else {
                    Ok(ImageFormat::Raw)
                }
            }
            other => Err(AnalyzerError::InvalidImageType(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Raw => "raw",
            ImageFormat::Ewf => "ewf",
        }
    }
}

/// Random-access byte reader over any evidence source. The partition offset
/// is added to every requested offset, so the rest of the crate addresses
/// the filesystem as if it started at byte zero.
pub struct ImageReader<T: Read + Seek> {
    body: T,
    partition_offset: u64,
}

impl<T: Read + Seek> ImageReader<T> {
    pub fn new(body: T) -> Self {
        ImageReader {
            body,
            partition_offset: 0,
        }
    }

    pub fn set_partition_offset(&mut self, offset: u64) {
        debug!("Partition offset set to {} bytes", offset);
        self.partition_offset = offset;
    }

    pub fn partition_offset(&self) -> u64 {
        self.partition_offset
    }

    /// Read `size` bytes at the partition-relative `offset`. Zero-length and
    /// oversized requests are rejected; a short read is an error so callers
    /// can treat the block as unreadable and move on.
    pub fn read(&mut self, offset: u64, size: usize) -> Result<Vec<u8>, AnalyzerError> {
        if size == 0 || size > MAX_READ_SIZE {
            warn!("Rejecting read request: offset {}, size {}", offset, size);
            return Err(AnalyzerError::InvalidRead { offset, size });
        }
        let absolute = self
            .partition_offset
            .checked_add(offset)
            .ok_or(AnalyzerError::InvalidRead { offset, size })?;

        self.body.seek(SeekFrom::Start(absolute))?;
        let mut buf = vec![0u8; size];
        self.body
            .read_exact(&mut buf)
            .map_err(|_| AnalyzerError::ShortRead(offset))?;
        Ok(buf)
    }

    /// Read one filesystem block.
    pub fn read_block(&mut self, block_num: u64, block_size: u64) -> Result<Vec<u8>, AnalyzerError> {
        self.read(block_num * block_size, block_size as usize)
    }
}
