use bitflags::bitflags;

// Data file header flags
bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FileHeaderFlags: u16 {
        /// File was produced by a merge pass rather than a write epoch
        const MERGE_OUTPUT = 0x01;
    }
}

/// Magic number for data files ("JDBF")
pub const DATA_FILE_MAGIC: u32 = 0x4A44_4246;
/// Magic number for index dump files ("JDBI")
pub const INDEX_FILE_MAGIC: u32 = 0x4A44_4249;
/// On-disk format version for data files
pub const DATA_FILE_FORMAT_VERSION: u16 = 1;
/// On-disk format version for index dump files
pub const INDEX_FILE_FORMAT_VERSION: u32 = 1;
/// On-disk format version for collection metadata files
pub const METADATA_FILE_FORMAT_VERSION: u32 = 1;
/// Size in bytes of the fixed data file header
pub const FILE_HEADER_SIZE: usize = 48;
/// Extension for every file the collection creates
pub const FILE_EXTENSION: &str = "jdb";
/// Suffix of the collection metadata file, before the extension
pub const METADATA_SUFFIX: &str = "metadata";
/// Decimal digits used for the ordinal in a data file name
pub const ORDINAL_DIGITS: usize = 10;

/// Location value meaning "no item"
pub const NON_EXISTENT_LOCATION: u64 = 0;
/// Index values of 0 are reserved to mean "absent"
pub const IMPERMISSIBLE_VALUE: u64 = 0;

/// Default number of u64 slots per index chunk
pub const DEFAULT_LONGS_PER_CHUNK: usize = 4096;
/// Default upper bound on index paths
pub const DEFAULT_MAX_LONGS: u64 = 2_000_000_000;
/// Default cap on a single data file, kept under the u32 offset space
pub const DEFAULT_MAX_FILE_BYTES: u64 = 16 * 1024 * 1024 * 1024;
/// Default writer buffer size
pub const DEFAULT_WRITE_BUFFER_BYTES: usize = 1024 * 1024;
/// Attempts made by an index-driven read when files vanish mid-lookup
pub const NUM_OF_READ_RETRIES: u32 = 5;
