//! Immutable data files and their writer/reader.
//!
//! A data file is created during exactly one write epoch (or one merge
//! pass), appended to sequentially, then sealed. After sealing it never
//! changes, which is what allows readers to share memory maps freely and
//! snapshots to hard-link files. Layout: a fixed header followed by
//! back-to-back encoded items with no padding.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use byteorder::{BigEndian, ByteOrder};
use memmap2::Mmap;

use crate::codec::DataItemCodec;
use crate::constants::{
    DATA_FILE_FORMAT_VERSION, DATA_FILE_MAGIC, FILE_EXTENSION, FILE_HEADER_SIZE,
    FileHeaderFlags, METADATA_SUFFIX, ORDINAL_DIGITS,
};
use crate::error::{Error, Result};
use crate::location::pack_location;

/// Name of the data file with the given ordinal
pub fn data_file_name(store_name: &str, ordinal: u32) -> String {
    format!(
        "{}_{:0width$}.{}",
        store_name,
        ordinal,
        FILE_EXTENSION,
        width = ORDINAL_DIGITS
    )
}

/// Full path of the data file with the given ordinal
pub fn data_file_path(dir: &Path, store_name: &str, ordinal: u32) -> PathBuf {
    dir.join(data_file_name(store_name, ordinal))
}

/// Full path of the collection metadata file
pub fn metadata_file_path(dir: &Path, store_name: &str) -> PathBuf {
    dir.join(format!("{}_{}.{}", store_name, METADATA_SUFFIX, FILE_EXTENSION))
}

/// Parse the ordinal out of a data file name for this store. Returns
/// `None` for foreign files and for the metadata file.
pub fn ordinal_from_file_name(file_name: &str, store_name: &str) -> Option<u32> {
    let rest = file_name.strip_prefix(store_name)?.strip_prefix('_')?;
    let digits = rest.strip_suffix(&format!(".{}", FILE_EXTENSION))?;
    if digits.len() != ORDINAL_DIGITS {
        return None;
    }
    digits.parse().ok()
}

fn now_epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Fixed-size header at the start of every data file.
///
/// `item_count`, `min_key`, `max_key` and the checksum are zero while
/// the file is open for writing and patched in place when it seals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub format_version: u16,
    pub flags: FileHeaderFlags,
    pub serialization_version: u32,
    pub ordinal: u32,
    pub creation_ms: u64,
    pub item_count: u64,
    pub min_key: u64,
    pub max_key: u64,
}

impl FileHeader {
    fn new(ordinal: u32, serialization_version: u32, flags: FileHeaderFlags) -> Self {
        Self {
            format_version: DATA_FILE_FORMAT_VERSION,
            flags,
            serialization_version,
            ordinal,
            creation_ms: now_epoch_millis(),
            item_count: 0,
            min_key: 0,
            max_key: 0,
        }
    }

    /// Encode the header; `sealed` controls whether the checksum is
    /// computed or left zero
    fn encode(&self, sealed: bool) -> [u8; FILE_HEADER_SIZE] {
        let mut buf = [0u8; FILE_HEADER_SIZE];
        BigEndian::write_u32(&mut buf[0..4], DATA_FILE_MAGIC);
        BigEndian::write_u16(&mut buf[4..6], self.format_version);
        BigEndian::write_u16(&mut buf[6..8], self.flags.bits());
        BigEndian::write_u32(&mut buf[8..12], self.serialization_version);
        BigEndian::write_u32(&mut buf[12..16], self.ordinal);
        BigEndian::write_u64(&mut buf[16..24], self.creation_ms);
        BigEndian::write_u64(&mut buf[24..32], self.item_count);
        BigEndian::write_u64(&mut buf[32..40], self.min_key);
        BigEndian::write_u64(&mut buf[40..48], self.max_key);
        if sealed {
            let crc = crc32fast::hash(&buf[..FILE_HEADER_SIZE - 4]);
            BigEndian::write_u32(&mut buf[FILE_HEADER_SIZE - 4..], crc);
        }
        buf
    }

    /// Decode and validate a sealed file's header
    fn decode(bytes: &[u8], path: &Path) -> Result<Self> {
        let corrupt = |reason: &str| Error::CorruptFile {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };
        if bytes.len() < FILE_HEADER_SIZE {
            return Err(corrupt("file shorter than header"));
        }
        if BigEndian::read_u32(&bytes[0..4]) != DATA_FILE_MAGIC {
            return Err(corrupt("bad magic number"));
        }
        let format_version = BigEndian::read_u16(&bytes[4..6]);
        if format_version != DATA_FILE_FORMAT_VERSION {
            return Err(corrupt(&format!(
                "unsupported format version {}",
                format_version
            )));
        }
        let stored_crc = BigEndian::read_u32(&bytes[FILE_HEADER_SIZE - 4..FILE_HEADER_SIZE]);
        let computed_crc = crc32fast::hash(&bytes[..FILE_HEADER_SIZE - 4]);
        if stored_crc != computed_crc {
            if stored_crc == 0 {
                return Err(Error::FileNeverSealed {
                    path: path.to_path_buf(),
                });
            }
            return Err(corrupt("header checksum mismatch"));
        }
        let flags = FileHeaderFlags::from_bits_truncate(BigEndian::read_u16(&bytes[6..8]));
        Ok(Self {
            format_version,
            flags,
            serialization_version: BigEndian::read_u32(&bytes[8..12]),
            ordinal: BigEndian::read_u32(&bytes[12..16]),
            creation_ms: BigEndian::read_u64(&bytes[16..24]),
            item_count: BigEndian::read_u64(&bytes[24..32]),
            min_key: BigEndian::read_u64(&bytes[32..40]),
            max_key: BigEndian::read_u64(&bytes[40..48]),
        })
    }

    pub fn is_merge_output(&self) -> bool {
        self.flags.contains(FileHeaderFlags::MERGE_OUTPUT)
    }
}

/// Sequential writer for one data file during one epoch or merge pass.
///
/// Strictly single-threaded; the collection hands exclusive ownership to
/// whichever thread holds the epoch or runs the merge.
pub struct DataFileWriter<C: DataItemCodec> {
    codec: Arc<C>,
    path: PathBuf,
    out: BufWriter<File>,
    header: FileHeader,
    /// Absolute offset of the next append
    offset: u64,
    max_file_bytes: u64,
    scratch: Vec<u8>,
}

impl<C: DataItemCodec> DataFileWriter<C> {
    /// Create the file and write its open-state header
    pub fn new(
        dir: &Path,
        store_name: &str,
        ordinal: u32,
        codec: Arc<C>,
        flags: FileHeaderFlags,
        max_file_bytes: u64,
        buffer_bytes: usize,
    ) -> Result<Self> {
        let path = data_file_path(dir, store_name, ordinal);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        let header = FileHeader::new(ordinal, codec.current_format_version(), flags);
        let mut out = BufWriter::with_capacity(buffer_bytes, file);
        out.write_all(&header.encode(false))?;
        Ok(Self {
            codec,
            path,
            out,
            header,
            offset: FILE_HEADER_SIZE as u64,
            max_file_bytes: max_file_bytes.min(u32::MAX as u64),
            scratch: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ordinal(&self) -> u32 {
        self.header.ordinal
    }

    /// Bytes written so far, header included
    pub fn current_size(&self) -> u64 {
        self.offset
    }

    pub fn item_count(&self) -> u64 {
        self.header.item_count
    }

    fn check_capacity(&self, item_size: usize) -> Result<()> {
        if self.offset + item_size as u64 > self.max_file_bytes {
            return Err(Error::DataFileFull {
                offset: self.offset,
                item_size,
            });
        }
        Ok(())
    }

    fn track_key(&mut self, key: u64) {
        if self.header.item_count == 0 {
            self.header.min_key = key;
            self.header.max_key = key;
        } else {
            self.header.min_key = self.header.min_key.min(key);
            self.header.max_key = self.header.max_key.max(key);
        }
        self.header.item_count += 1;
    }

    /// Encode and append one item, returning its packed location
    pub fn store_item(&mut self, item: &C::Item) -> Result<u64> {
        let declared = self.codec.serialized_size(item);
        self.check_capacity(declared)?;
        self.scratch.clear();
        self.codec.serialize(item, &mut self.scratch);
        if self.scratch.len() != declared {
            return Err(Error::CodecSizeMismatch {
                declared,
                written: self.scratch.len(),
            });
        }
        let key = self.codec.deserialize_header(&self.scratch)?.key;
        self.out.write_all(&self.scratch)?;
        let location = pack_location(self.header.ordinal, self.offset as u32);
        self.offset += declared as u64;
        self.track_key(key);
        Ok(location)
    }

    /// Append an already-encoded item, used by merge to copy bytes
    /// between files without decoding them
    pub fn store_raw(&mut self, key: u64, bytes: &[u8]) -> Result<u64> {
        self.check_capacity(bytes.len())?;
        self.out.write_all(bytes)?;
        let location = pack_location(self.header.ordinal, self.offset as u32);
        self.offset += bytes.len() as u64;
        self.track_key(key);
        Ok(location)
    }

    /// Flush, patch the header with final counts and checksum, and make
    /// the file durable. The file is immutable from here on.
    pub fn seal(mut self) -> Result<FileHeader> {
        self.out.flush()?;
        let mut file = self
            .out
            .into_inner()
            .map_err(|e| Error::Io(e.into_error()))?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&self.header.encode(true))?;
        file.sync_all()?;
        Ok(self.header)
    }
}

/// Random-access and sequential reader over one sealed data file.
///
/// The file is memory mapped; the map stays valid for this reader's
/// lifetime even if the file is unlinked underneath it, so in-flight
/// reads survive a merge deleting consumed inputs.
pub struct DataFileReader<C: DataItemCodec> {
    codec: Arc<C>,
    path: PathBuf,
    header: FileHeader,
    mmap: Mmap,
    file_size: u64,
    available_for_merging: AtomicBool,
}

impl<C: DataItemCodec> DataFileReader<C> {
    /// Open a sealed file, validating its header
    pub fn open(path: &Path, codec: Arc<C>) -> Result<Self> {
        let file = File::open(path)?;
        // Safe because sealed files are never modified again
        let mmap = unsafe { Mmap::map(&file)? };
        let header = FileHeader::decode(&mmap, path)?;
        let file_size = mmap.len() as u64;
        Ok(Self {
            codec,
            path: path.to_path_buf(),
            header,
            mmap,
            file_size,
            available_for_merging: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn ordinal(&self) -> u32 {
        self.header.ordinal
    }

    /// Total file size in bytes, header included
    pub fn size(&self) -> u64 {
        self.file_size
    }

    pub fn item_count(&self) -> u64 {
        self.header.item_count
    }

    pub fn is_available_for_merging(&self) -> bool {
        self.available_for_merging.load(Ordering::SeqCst)
    }

    pub fn set_available_for_merging(&self, available: bool) {
        self.available_for_merging.store(available, Ordering::SeqCst);
    }

    fn corrupt(&self, reason: String) -> Error {
        Error::CorruptFile {
            path: self.path.clone(),
            reason,
        }
    }

    /// Bounds-checked slice of one encoded item starting at `offset`
    fn item_bytes(&self, offset: u64) -> Result<&[u8]> {
        if offset < FILE_HEADER_SIZE as u64 || offset >= self.file_size {
            return Err(self.corrupt(format!(
                "offset {} outside data region of {} byte file",
                offset, self.file_size
            )));
        }
        let start = offset as usize;
        let header_size = self.codec.header_size();
        if start + header_size > self.mmap.len() {
            return Err(self.corrupt(format!("truncated item header at offset {}", offset)));
        }
        let item_header = self.codec.deserialize_header(&self.mmap[start..])?;
        if start + item_header.total_size > self.mmap.len() {
            return Err(self.corrupt(format!(
                "item at offset {} claims {} bytes past end of file",
                offset, item_header.total_size
            )));
        }
        Ok(&self.mmap[start..start + item_header.total_size])
    }

    /// Decode the item whose header starts at `offset`
    pub fn read_item(&self, offset: u64) -> Result<C::Item> {
        let bytes = self.item_bytes(offset)?;
        self.codec.deserialize(bytes, self.header.serialization_version)
    }

    /// Stream all items in file order as `(key, location, raw bytes)`
    pub fn iter(&self) -> DataFileIterator<'_, C> {
        DataFileIterator {
            reader: self,
            offset: FILE_HEADER_SIZE as u64,
        }
    }
}

/// Iterator over `(key, location, raw encoded bytes)` of one file,
/// yielding items oldest write first.
pub struct DataFileIterator<'a, C: DataItemCodec> {
    reader: &'a DataFileReader<C>,
    offset: u64,
}

impl<'a, C: DataItemCodec> Iterator for DataFileIterator<'a, C> {
    type Item = Result<(u64, u64, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.reader.file_size {
            return None;
        }
        let bytes = match self.reader.item_bytes(self.offset) {
            Ok(bytes) => bytes,
            Err(e) => {
                // Poison further iteration
                self.offset = self.reader.file_size;
                return Some(Err(e));
            }
        };
        let key = match self.reader.codec.deserialize_header(bytes) {
            Ok(header) => header.key,
            Err(e) => {
                self.offset = self.reader.file_size;
                return Some(Err(e));
            }
        };
        let location = pack_location(self.reader.header.ordinal, self.offset as u32);
        self.offset += bytes.len() as u64;
        Some(Ok((key, location, bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::TwoLongsCodec;
    use crate::location::{byte_offset, file_ordinal};
    use tempfile::TempDir;

    fn new_writer(dir: &Path, ordinal: u32) -> DataFileWriter<TwoLongsCodec> {
        DataFileWriter::new(
            dir,
            "store",
            ordinal,
            Arc::new(TwoLongsCodec),
            FileHeaderFlags::empty(),
            u32::MAX as u64,
            64 * 1024,
        )
        .unwrap()
    }

    #[test]
    fn test_file_naming() {
        assert_eq!(data_file_name("leaves", 7), "leaves_0000000007.jdb");
        assert_eq!(ordinal_from_file_name("leaves_0000000007.jdb", "leaves"), Some(7));
        assert_eq!(ordinal_from_file_name("leaves_metadata.jdb", "leaves"), None);
        assert_eq!(ordinal_from_file_name("other_0000000007.jdb", "leaves"), None);
        assert_eq!(ordinal_from_file_name("leaves_7.jdb", "leaves"), None);
    }

    #[test]
    fn test_write_seal_read_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut writer = new_writer(dir.path(), 1);

        let mut locations = Vec::new();
        for i in 0..100u64 {
            locations.push(writer.store_item(&[i, i + 10_000]).unwrap());
        }
        let header = writer.seal().unwrap();
        assert_eq!(header.item_count, 100);
        assert_eq!(header.min_key, 0);
        assert_eq!(header.max_key, 99);

        let reader = DataFileReader::open(
            &data_file_path(dir.path(), "store", 1),
            Arc::new(TwoLongsCodec),
        )
        .unwrap();
        assert_eq!(reader.ordinal(), 1);
        assert_eq!(reader.item_count(), 100);
        for (i, location) in locations.iter().enumerate() {
            assert_eq!(file_ordinal(*location), 1);
            let item = reader.read_item(byte_offset(*location) as u64).unwrap();
            assert_eq!(item, [i as u64, i as u64 + 10_000]);
        }
    }

    #[test]
    fn test_iterator_yields_in_write_order() {
        let dir = TempDir::new().unwrap();
        let mut writer = new_writer(dir.path(), 3);
        for i in 0..10u64 {
            writer.store_item(&[i * 2, i]).unwrap();
        }
        writer.seal().unwrap();

        let reader = DataFileReader::open(
            &data_file_path(dir.path(), "store", 3),
            Arc::new(TwoLongsCodec),
        )
        .unwrap();
        let mut expected_offset = FILE_HEADER_SIZE as u64;
        let mut count = 0u64;
        for entry in reader.iter() {
            let (key, location, bytes) = entry.unwrap();
            assert_eq!(key, count * 2);
            assert_eq!(file_ordinal(location), 3);
            assert_eq!(byte_offset(location) as u64, expected_offset);
            assert_eq!(bytes.len(), 16);
            expected_offset += bytes.len() as u64;
            count += 1;
        }
        assert_eq!(count, 10);
    }

    #[test]
    fn test_unsealed_file_rejected() {
        let dir = TempDir::new().unwrap();
        let mut writer = new_writer(dir.path(), 1);
        writer.store_item(&[1, 2]).unwrap();
        // Flush the buffered bytes but never seal
        drop(writer);

        let result = DataFileReader::open(
            &data_file_path(dir.path(), "store", 1),
            Arc::new(TwoLongsCodec),
        );
        assert!(matches!(result, Err(Error::FileNeverSealed { .. })));
    }

    #[test]
    fn test_corrupt_header_rejected() {
        let dir = TempDir::new().unwrap();
        let mut writer = new_writer(dir.path(), 1);
        writer.store_item(&[1, 2]).unwrap();
        writer.seal().unwrap();

        let path = data_file_path(dir.path(), "store", 1);
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[20] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let result = DataFileReader::open(&path, Arc::new(TwoLongsCodec));
        assert!(matches!(result, Err(Error::CorruptFile { .. })));
    }

    #[test]
    fn test_empty_sealed_file() {
        let dir = TempDir::new().unwrap();
        let writer = new_writer(dir.path(), 2);
        let header = writer.seal().unwrap();
        assert_eq!(header.item_count, 0);

        let reader = DataFileReader::open(
            &data_file_path(dir.path(), "store", 2),
            Arc::new(TwoLongsCodec),
        )
        .unwrap();
        assert_eq!(reader.item_count(), 0);
        assert_eq!(reader.iter().count(), 0);
    }

    #[test]
    fn test_writer_respects_max_file_size() {
        let dir = TempDir::new().unwrap();
        let mut writer = DataFileWriter::new(
            dir.path(),
            "store",
            1,
            Arc::new(TwoLongsCodec),
            FileHeaderFlags::empty(),
            // Header plus two 16 byte items
            (FILE_HEADER_SIZE + 32) as u64,
            1024,
        )
        .unwrap();
        writer.store_item(&[1, 1]).unwrap();
        writer.store_item(&[2, 2]).unwrap();
        assert!(matches!(
            writer.store_item(&[3, 3]),
            Err(Error::DataFileFull { .. })
        ));
        // Earlier items are unaffected
        let header = writer.seal().unwrap();
        assert_eq!(header.item_count, 2);
    }

    #[test]
    fn test_merge_output_flag_round_trips() {
        let dir = TempDir::new().unwrap();
        let writer = DataFileWriter::<TwoLongsCodec>::new(
            dir.path(),
            "store",
            9,
            Arc::new(TwoLongsCodec),
            FileHeaderFlags::MERGE_OUTPUT,
            u32::MAX as u64,
            1024,
        )
        .unwrap();
        writer.seal().unwrap();

        let reader = DataFileReader::open(
            &data_file_path(dir.path(), "store", 9),
            Arc::new(TwoLongsCodec),
        )
        .unwrap();
        assert!(reader.header().is_merge_output());
    }
}
