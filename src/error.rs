use std::io;
use std::path::PathBuf;
use std::result;

use thiserror::Error;

/// Custom result type for storage operations
pub type Result<T> = result::Result<T, Error>;

/// Storage error codes
#[derive(Debug, Error)]
pub enum Error {
    /// A write epoch is already open on this collection
    #[error("a data file is already open for writing")]
    WriterAlreadyOpen,
    /// Operation requires an open write epoch
    #[error("no data file is open for writing")]
    NoOpenWriter,
    /// Collection has been closed
    #[error("data file collection is closed")]
    Closed,
    /// Value 0 is reserved as the "absent" sentinel and may not be stored
    #[error("value 0 is reserved and cannot be stored at path {path}")]
    ZeroValueStored { path: u64 },
    /// Merge input contains a file that is not eligible
    #[error("file {ordinal} is not available for merging")]
    NotAvailableForMerging { ordinal: u32 },

    /// Underlying file system failure
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    /// File header failed validation
    #[error("corrupt data file {path}: {reason}")]
    CorruptFile { path: PathBuf, reason: String },
    /// File still carries an open-state header; the writer that created
    /// it never sealed it
    #[error("data file {path} was never sealed")]
    FileNeverSealed { path: PathBuf },
    /// A location named a file that no longer exists; the caller may
    /// re-resolve its index and retry
    #[error("data file {ordinal} not found")]
    FileNotFound { ordinal: u32 },
    /// Appending the next item would overrun the file's offset space
    #[error("data file full: offset {offset} plus item of {item_size} bytes exceeds limit")]
    DataFileFull { offset: u64, item_size: usize },
    /// Serialized item does not fit the size its codec declared
    #[error("codec wrote {written} bytes for an item declared as {declared}")]
    CodecSizeMismatch { declared: usize, written: usize },

    /// Native memory allocation failed
    #[error("off-heap allocation of {bytes} bytes failed")]
    OffHeapAllocation { bytes: usize },

    /// Valid key range has min above max
    #[error("invalid key range: minimum {min} greater than maximum {max}")]
    InvalidKeyRange { min: u64, max: u64 },
    /// A location names a file ordinal the collection has never created
    #[error("location names file {ordinal} but the next ordinal is {next}")]
    LocationBeyondFiles { ordinal: u32, next: u32 },
    /// Index dump was written with a different chunk geometry
    #[error("index file uses {file} longs per chunk, array uses {ours}")]
    IndexGeometryMismatch { file: usize, ours: usize },
    /// Index dump holds more entries than this array allows
    #[error("index file holds {size} longs, array capacity is {capacity}")]
    IndexTooLarge { size: u64, capacity: u64 },
}

impl Error {
    /// True for failures that can succeed on a retry after the caller
    /// re-reads its index (a merge removed a file mid-lookup).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::FileNotFound { .. })
    }
}
