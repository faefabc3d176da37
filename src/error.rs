use thiserror::Error;

/// Fatal setup failures. Everything encountered after setup is recovered
/// locally by the walker and only counted.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("Cannot open image file: {0}")]
    ImageOpen(String),

    #[error("Invalid image type '{0}', must be auto, raw or ewf")]
    InvalidImageType(String),

    #[error("Invalid read request (offset {offset}, size {size})")]
    InvalidRead { offset: u64, size: usize },

    #[error("Short read at offset {0}")]
    ShortRead(u64),

    #[error("No ext2/3/4 superblock at the given partition offset")]
    NoSuperblock,

    #[error("Filesystem does not carry a journal (ext2?)")]
    NoJournalFeature,

    #[error("Journal not found in filesystem")]
    JournalNotFound,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV output error: {0}")]
    Csv(#[from] csv::Error),
}
