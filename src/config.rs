use crate::constants::{
    DEFAULT_LONGS_PER_CHUNK, DEFAULT_MAX_FILE_BYTES, DEFAULT_MAX_LONGS,
    DEFAULT_WRITE_BUFFER_BYTES, NUM_OF_READ_RETRIES,
};

/// Configuration for a data file collection.
///
/// All settings are plain values fixed at construction; there is no
/// process-wide configuration state.
#[derive(Debug, Clone)]
pub struct JasperDbConfig {
    /// Maximum size of one data file. Epoch writers fail with
    /// [`crate::Error::DataFileFull`] at this point; merges roll over to a
    /// new output file. Offsets are 32-bit, so values above `u32::MAX` are
    /// clamped at open.
    pub max_data_file_bytes: u64,
    /// Buffer size for sequential appends
    pub write_buffer_bytes: usize,
    /// Attempts an index-driven read makes when a file disappears between
    /// the index lookup and the file access
    pub read_retries: u32,
}

impl Default for JasperDbConfig {
    fn default() -> Self {
        Self {
            max_data_file_bytes: DEFAULT_MAX_FILE_BYTES,
            write_buffer_bytes: DEFAULT_WRITE_BUFFER_BYTES,
            read_retries: NUM_OF_READ_RETRIES,
        }
    }
}

/// Configuration for a long-indexed array.
#[derive(Debug, Clone)]
pub struct LongIndexConfig {
    /// Number of u64 slots in each lazily allocated chunk
    pub longs_per_chunk: usize,
    /// Upper bound on paths; fixes the chunk table size so it is never
    /// reallocated while readers are live
    pub max_longs: u64,
}

impl Default for LongIndexConfig {
    fn default() -> Self {
        Self {
            longs_per_chunk: DEFAULT_LONGS_PER_CHUNK,
            max_longs: DEFAULT_MAX_LONGS,
        }
    }
}

impl LongIndexConfig {
    /// Number of chunk slots implied by this geometry
    pub(crate) fn max_chunks(&self) -> usize {
        let per_chunk = self.longs_per_chunk as u64;
        ((self.max_longs + per_chunk - 1) / per_chunk) as usize
    }
}
