//! The data file collection: an ordered set of immutable data files with
//! one write epoch at a time, lock-free concurrent reads, and an online
//! merge that compacts old files while the caller's index is moved
//! forward through compare-and-set.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, info, warn};

use crate::codec::DataItemCodec;
use crate::config::JasperDbConfig;
use crate::constants::{FileHeaderFlags, METADATA_FILE_FORMAT_VERSION, NON_EXISTENT_LOCATION};
use crate::data_file::{
    data_file_path, metadata_file_path, ordinal_from_file_name, DataFileReader, DataFileWriter,
};
use crate::error::{Error, Result};
use crate::index::LongIndex;
use crate::location::{byte_offset, file_ordinal, location_to_string};

/// Inclusive range of keys whose data the collection must retain.
/// Items with keys outside this range are dropped during merges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyRange {
    pub min_valid_key: u64,
    pub max_valid_key: u64,
}

impl KeyRange {
    pub fn new(min_valid_key: u64, max_valid_key: u64) -> Result<Self> {
        if min_valid_key > max_valid_key {
            return Err(Error::InvalidKeyRange {
                min: min_valid_key,
                max: max_valid_key,
            });
        }
        Ok(Self {
            min_valid_key,
            max_valid_key,
        })
    }

    pub fn contains(&self, key: u64) -> bool {
        key >= self.min_valid_key && key <= self.max_valid_key
    }
}

/// Index view a merge pass uses to prove an item copy is live and to
/// relocate index entries.
///
/// Every [`LongIndex`] implements this directly. Callers may wrap one to
/// observe or veto relocations.
pub trait RelocationIndex: Sync {
    /// Location the index currently holds for `key`, or 0 when absent
    fn current_location(&self, key: u64) -> u64;

    /// Move `key` forward from `old_location` to `new_location` iff the
    /// index still holds `old_location`. Returns whether the relocation
    /// was accepted; false means a newer write already superseded it.
    fn on_relocated(&self, key: u64, old_location: u64, new_location: u64) -> bool;
}

impl<T: LongIndex + ?Sized> RelocationIndex for T {
    fn current_location(&self, key: u64) -> u64 {
        self.get(key, NON_EXISTENT_LOCATION)
    }

    fn on_relocated(&self, key: u64, old_location: u64, new_location: u64) -> bool {
        // New locations name real files, never 0, so the reserved-value
        // check inside put_if_equal cannot trip
        self.put_if_equal(key, old_location, new_location)
            .unwrap_or(false)
    }
}

/// Callback invoked once per item when an existing store is opened, so
/// callers can rebuild an index that was not persisted. Arguments are
/// the item's key, its packed location, and its raw encoded bytes.
pub type LoadedDataCallback<'a> = dyn FnMut(u64, u64, &[u8]) -> Result<()> + 'a;

/// An append-only collection of immutable data files.
///
/// At most one file is open for writing at any instant; everything else
/// is sealed and safe for concurrent reads. The collection never touches
/// the caller's index during normal writes; it only moves index entries
/// forward, via [`RelocationIndex`], while merging.
pub struct DataFileCollection<C: DataItemCodec> {
    store_name: String,
    store_dir: PathBuf,
    config: JasperDbConfig,
    /// Config limit clamped to the 32-bit offset space
    max_file_bytes: u64,
    codec: Arc<C>,
    next_ordinal: AtomicU32,
    /// Sealed files keyed by ordinal, so iteration is creation order
    files: RwLock<BTreeMap<u32, Arc<DataFileReader<C>>>>,
    current_writer: Mutex<Option<DataFileWriter<C>>>,
    valid_key_range: RwLock<Option<KeyRange>>,
    /// One merge pass at a time
    merge_lock: Mutex<()>,
    /// Keeps merge input deletion and snapshot link loops from
    /// interleaving
    snapshot_lock: Mutex<()>,
    loaded_from_existing: bool,
    closed: AtomicBool,
}

impl<C: DataItemCodec> DataFileCollection<C> {
    /// Open a collection, loading any files a previous run left in
    /// `store_dir`
    pub fn open(
        store_dir: &Path,
        store_name: &str,
        codec: C,
        config: JasperDbConfig,
    ) -> Result<Self> {
        Self::open_with_callback(store_dir, store_name, codec, config, None)
    }

    /// Open a collection and additionally replay every loaded item
    /// through `loaded_data_callback`, oldest file first, so the caller
    /// can rebuild an index that was not persisted. Replaying reads and
    /// parses every file, so prefer a persisted index dump when one
    /// exists.
    pub fn open_with_callback(
        store_dir: &Path,
        store_name: &str,
        codec: C,
        config: JasperDbConfig,
        mut loaded_data_callback: Option<&mut LoadedDataCallback<'_>>,
    ) -> Result<Self> {
        fs::create_dir_all(store_dir)?;
        let codec = Arc::new(codec);

        // Scan for data files from a previous run
        let mut data_paths: Vec<(u32, PathBuf)> = Vec::new();
        for entry in fs::read_dir(store_dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if let Some(ordinal) = ordinal_from_file_name(name, store_name) {
                data_paths.push((ordinal, entry.path()));
            }
        }
        data_paths.sort_by_key(|(ordinal, _)| *ordinal);

        let mut files = BTreeMap::new();
        let mut max_ordinal = 0u32;
        for (ordinal, path) in &data_paths {
            let reader = match DataFileReader::open(path, Arc::clone(&codec)) {
                Ok(reader) => reader,
                Err(Error::FileNeverSealed { .. }) => {
                    // Leftover from an epoch that crashed before sealing.
                    // It was never exposed for reads, so deleting it is
                    // safe; its ordinal is still retired in case an index
                    // persisted during the crashed epoch references it.
                    warn!(
                        "store [{}] deleting never-sealed data file {}",
                        store_name,
                        path.display()
                    );
                    fs::remove_file(path)?;
                    max_ordinal = max_ordinal.max(*ordinal);
                    continue;
                }
                Err(e) => return Err(e),
            };
            if reader.ordinal() != *ordinal {
                return Err(Error::CorruptFile {
                    path: path.clone(),
                    reason: format!(
                        "header ordinal {} does not match file name ordinal {}",
                        reader.ordinal(),
                        ordinal
                    ),
                });
            }
            max_ordinal = max_ordinal.max(*ordinal);
            files.insert(*ordinal, Arc::new(reader));
        }

        let loaded_from_existing = !files.is_empty();
        let valid_key_range = if loaded_from_existing {
            info!(
                "store [{}] loading existing set of {} data files",
                store_name,
                files.len()
            );
            let range = load_metadata(&metadata_file_path(store_dir, store_name))?;
            if range.is_none() {
                warn!(
                    "store [{}] has existing data files but no metadata file in {}",
                    store_name,
                    store_dir.display()
                );
            }
            range
        } else {
            None
        };

        // Replay all items for callers rebuilding an index
        if let Some(callback) = loaded_data_callback.as_deref_mut() {
            for reader in files.values() {
                for entry in reader.iter() {
                    let (key, location, bytes) = entry?;
                    callback(key, location, bytes)?;
                }
            }
        }

        // Everything loaded is already sealed and safe to merge
        for reader in files.values() {
            reader.set_available_for_merging(true);
        }
        if loaded_from_existing {
            info!("store [{}] finished loading existing data files", store_name);
        }

        Ok(Self {
            store_name: store_name.to_string(),
            store_dir: store_dir.to_path_buf(),
            max_file_bytes: config.max_data_file_bytes.min(u32::MAX as u64),
            config,
            codec,
            next_ordinal: AtomicU32::new(max_ordinal + 1),
            files: RwLock::new(files),
            current_writer: Mutex::new(None),
            valid_key_range: RwLock::new(valid_key_range),
            merge_lock: Mutex::new(()),
            snapshot_lock: Mutex::new(()),
            loaded_from_existing,
            closed: AtomicBool::new(false),
        })
    }

    /// Whether this collection was opened over files from a previous run
    pub fn is_loaded_from_existing_files(&self) -> bool {
        self.loaded_from_existing
    }

    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed);
        }
        Ok(())
    }

    fn writer_guard(&self) -> MutexGuard<'_, Option<DataFileWriter<C>>> {
        self.current_writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn files_read(&self) -> RwLockReadGuard<'_, BTreeMap<u32, Arc<DataFileReader<C>>>> {
        self.files
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn files_write(&self) -> RwLockWriteGuard<'_, BTreeMap<u32, Arc<DataFileReader<C>>>> {
        self.files
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn new_data_file(&self, flags: FileHeaderFlags) -> Result<DataFileWriter<C>> {
        let ordinal = self.next_ordinal.fetch_add(1, Ordering::SeqCst);
        DataFileWriter::new(
            &self.store_dir,
            &self.store_name,
            ordinal,
            Arc::clone(&self.codec),
            flags,
            self.max_file_bytes,
            self.config.write_buffer_bytes,
        )
    }

    // ==== Write epoch protocol ====

    /// Open a new data file for writing. Errors if an epoch is already
    /// open.
    pub fn start_writing(&self) -> Result<()> {
        self.check_open()?;
        let mut writer = self.writer_guard();
        if writer.is_some() {
            return Err(Error::WriterAlreadyOpen);
        }
        *writer = Some(self.new_data_file(FileHeaderFlags::empty())?);
        Ok(())
    }

    /// Append one item to the current epoch's file and return its packed
    /// location. The caller is responsible for recording the location in
    /// its own index.
    pub fn store_data_item(&self, item: &C::Item) -> Result<u64> {
        self.check_open()?;
        let mut writer = self.writer_guard();
        match writer.as_mut() {
            Some(writer) => writer.store_item(item),
            None => Err(Error::NoOpenWriter),
        }
    }

    /// Seal the current epoch's file and publish it for reading. The
    /// returned reader is NOT yet available for merging; the caller
    /// marks it so once its own bookkeeping (index updates, external
    /// consistency checks) is complete.
    pub fn end_writing(
        &self,
        min_valid_key: u64,
        max_valid_key: u64,
    ) -> Result<Arc<DataFileReader<C>>> {
        self.check_open()?;
        let range = KeyRange::new(min_valid_key, max_valid_key)?;
        let writer = match self.writer_guard().take() {
            Some(writer) => writer,
            None => return Err(Error::NoOpenWriter),
        };
        let ordinal = writer.ordinal();
        writer.seal()?;
        let path = data_file_path(&self.store_dir, &self.store_name, ordinal);
        let reader = Arc::new(DataFileReader::open(&path, Arc::clone(&self.codec))?);
        self.files_write().insert(ordinal, Arc::clone(&reader));
        *self
            .valid_key_range
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(range);
        self.save_metadata(&self.store_dir)?;
        Ok(reader)
    }

    // ==== Read path ====

    /// Read the item at `location` from whichever sealed file it names.
    /// Returns `Ok(None)` for the "no item" location. A location naming
    /// a file that was merged away fails with a retryable error; one
    /// naming a file this collection never created is a fatal
    /// consistency violation.
    pub fn read_data_item(&self, location: u64) -> Result<Option<C::Item>> {
        self.check_open()?;
        if location == NON_EXISTENT_LOCATION {
            return Ok(None);
        }
        let ordinal = file_ordinal(location);
        let reader = self.files_read().get(&ordinal).cloned();
        match reader {
            Some(reader) => reader.read_item(byte_offset(location) as u64).map(Some),
            None => {
                let next = self.next_ordinal.load(Ordering::SeqCst);
                if ordinal >= next {
                    Err(Error::LocationBeyondFiles { ordinal, next })
                } else {
                    Err(Error::FileNotFound { ordinal })
                }
            }
        }
    }

    /// Resolve `key` through `index` and read the item it points at,
    /// retrying with a fresh index lookup when a merge deletes the file
    /// between the lookup and the read.
    pub fn read_data_item_using_index(
        &self,
        index: &dyn LongIndex,
        key: u64,
    ) -> Result<Option<C::Item>> {
        for retry in 0..self.config.read_retries {
            let location = index.get(key, NON_EXISTENT_LOCATION);
            if location == NON_EXISTENT_LOCATION {
                return Ok(None);
            }
            match self.read_data_item(location) {
                Ok(item) => return Ok(item),
                Err(e) if e.is_retryable() => {
                    warn!(
                        "store [{}] read of key {} at {} failed on retry {}: {}",
                        self.store_name,
                        key,
                        location_to_string(location),
                        retry,
                        e
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Err(Error::Io(io::Error::new(
            io::ErrorKind::Other,
            format!(
                "read of key {} failed after {} retries",
                key, self.config.read_retries
            ),
        )))
    }

    // ==== Queries ====

    /// Range of keys whose data must be retained, or `None` before the
    /// first epoch completes
    pub fn get_valid_key_range(&self) -> Option<KeyRange> {
        *self
            .valid_key_range
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of sealed files
    pub fn get_number_of_files(&self) -> usize {
        self.files_read().len()
    }

    /// All sealed files smaller than `max_size_bytes`, in creation order
    pub fn get_all_fully_written_files(
        &self,
        max_size_bytes: u64,
    ) -> Vec<Arc<DataFileReader<C>>> {
        self.files_read()
            .values()
            .filter(|reader| reader.size() < max_size_bytes)
            .cloned()
            .collect()
    }

    /// All sealed files marked available for merging, in creation order
    pub fn get_all_files_available_for_merge(&self) -> Vec<Arc<DataFileReader<C>>> {
        self.files_read()
            .values()
            .filter(|reader| reader.is_available_for_merging())
            .cloned()
            .collect()
    }

    /// Total bytes across all sealed files
    pub fn get_total_size_of_files(&self) -> u64 {
        self.files_read().values().map(|reader| reader.size()).sum()
    }

    // ==== Metadata and snapshots ====

    /// Write the collection metadata (format version and valid key
    /// range) into `directory`
    pub fn save_metadata(&self, directory: &Path) -> Result<()> {
        fs::create_dir_all(directory)?;
        let path = metadata_file_path(directory, &self.store_name);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        let mut out = BufWriter::new(file);
        out.write_u32::<BigEndian>(METADATA_FILE_FORMAT_VERSION)?;
        match self.get_valid_key_range() {
            Some(range) => {
                out.write_u8(1)?;
                out.write_u64::<BigEndian>(range.min_valid_key)?;
                out.write_u64::<BigEndian>(range.max_valid_key)?;
            }
            None => {
                out.write_u8(0)?;
                out.write_u64::<BigEndian>(0)?;
                out.write_u64::<BigEndian>(0)?;
            }
        }
        out.flush()?;
        out.into_inner()
            .map_err(|e| Error::Io(e.into_error()))?
            .sync_all()?;
        Ok(())
    }

    /// Hard-link every sealed file into `snapshot_directory` along with
    /// the metadata file. Sealed files are immutable, so the links form
    /// a consistent, independently loadable copy. The file currently
    /// open for writing, if any, is not part of the snapshot.
    pub fn snapshot(&self, snapshot_directory: &Path) -> Result<()> {
        self.check_open()?;
        let _guard = self
            .snapshot_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.save_metadata(snapshot_directory)?;
        let readers = self.get_all_fully_written_files(u64::MAX);
        for reader in readers {
            let file_name = data_file_path(snapshot_directory, &self.store_name, reader.ordinal());
            fs::hard_link(reader.path(), file_name)?;
        }
        Ok(())
    }

    // ==== Merge ====

    /// Merge the given sealed files into one or more new files,
    /// relocating the caller's index entries as it goes.
    ///
    /// For every live item copied, `index.on_relocated(key, old, new)`
    /// is invoked when the output file holding the copy seals; a false
    /// return means a concurrent write superseded the copy, which is an
    /// expected outcome, not an error. Setting `abort` stops the pass at
    /// the next item; everything already sealed and relocated stays
    /// valid and the input files are kept. On full completion the input
    /// files are deleted. Returns the paths of the files created.
    pub fn merge_files(
        &self,
        index: &dyn RelocationIndex,
        files_to_merge: Vec<Arc<DataFileReader<C>>>,
        abort: &AtomicBool,
    ) -> Result<Vec<PathBuf>> {
        self.check_open()?;
        let _merging = self
            .merge_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if files_to_merge.len() < 2 {
            info!(
                "store [{}] no files were available for merging",
                self.store_name
            );
            return Ok(Vec::new());
        }
        for reader in &files_to_merge {
            if !reader.is_available_for_merging() {
                return Err(Error::NotAvailableForMerging {
                    ordinal: reader.ordinal(),
                });
            }
        }
        let mut inputs = files_to_merge;
        inputs.sort_by_key(|reader| reader.ordinal());
        let input_size: u64 = inputs.iter().map(|reader| reader.size()).sum();
        info!(
            "store [{}] merging {} files totalling {} bytes",
            self.store_name,
            inputs.len(),
            input_size
        );

        let key_range = self.get_valid_key_range();
        let mut new_paths = Vec::new();
        let mut writer = self.new_data_file(FileHeaderFlags::MERGE_OUTPUT)?;
        new_paths.push(writer.path().to_path_buf());
        // Relocations recorded for the current output, applied when it
        // seals so a failed output never touches the index
        let mut moves: Vec<(u64, u64, u64)> = Vec::new();
        let mut copied = 0u64;
        let mut skipped_dead = 0u64;
        let mut skipped_range = 0u64;
        let mut aborted = false;

        'all_inputs: for input in &inputs {
            for entry in input.iter() {
                if abort.load(Ordering::SeqCst) {
                    aborted = true;
                    break 'all_inputs;
                }
                let (key, item_location, bytes) = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        self.discard_output(writer, &mut new_paths);
                        return Err(e);
                    }
                };
                if let Some(range) = key_range {
                    if !range.contains(key) {
                        skipped_range += 1;
                        continue;
                    }
                }
                // Copy only the copy the index currently points at;
                // stale duplicates from older files are left behind
                if index.current_location(key) != item_location {
                    skipped_dead += 1;
                    continue;
                }
                if writer.item_count() > 0
                    && writer.current_size() + bytes.len() as u64 > self.max_file_bytes
                {
                    if let Err(e) = self.seal_merge_output(writer, &mut moves, index) {
                        return Err(e);
                    }
                    writer = self.new_data_file(FileHeaderFlags::MERGE_OUTPUT)?;
                    new_paths.push(writer.path().to_path_buf());
                }
                let new_location = match writer.store_raw(key, bytes) {
                    Ok(location) => location,
                    Err(e) => {
                        self.discard_output(writer, &mut new_paths);
                        return Err(e);
                    }
                };
                moves.push((key, item_location, new_location));
                copied += 1;
            }
        }

        if writer.item_count() == 0 {
            self.discard_output(writer, &mut new_paths);
        } else {
            self.seal_merge_output(writer, &mut moves, index)?;
        }

        if aborted {
            info!(
                "store [{}] merge aborted after copying {} items, input files kept",
                self.store_name, copied
            );
            return Ok(new_paths);
        }

        // No index entry references the inputs any more; readers caught
        // mid-lookup fall back to the retry path
        {
            let _snapshotting = self
                .snapshot_lock
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            self.delete_files(&inputs)?;
        }
        info!(
            "store [{}] merge complete: copied {} items into {} files, skipped {} superseded and {} out of range",
            self.store_name,
            copied,
            new_paths.len(),
            skipped_dead,
            skipped_range
        );
        Ok(new_paths)
    }

    /// Seal one merge output, publish it for reading, apply its recorded
    /// relocations, and mark it eligible for future merges. A seal
    /// failure removes the file and leaves the index untouched.
    fn seal_merge_output(
        &self,
        writer: DataFileWriter<C>,
        moves: &mut Vec<(u64, u64, u64)>,
        index: &dyn RelocationIndex,
    ) -> Result<Arc<DataFileReader<C>>> {
        let ordinal = writer.ordinal();
        let path = writer.path().to_path_buf();
        let sealed = writer.seal().and_then(|_| {
            DataFileReader::open(&path, Arc::clone(&self.codec)).map(Arc::new)
        });
        let reader = match sealed {
            Ok(reader) => reader,
            Err(e) => {
                moves.clear();
                if let Err(remove_err) = fs::remove_file(&path) {
                    warn!(
                        "store [{}] failed to remove incomplete merge output {}: {}",
                        self.store_name,
                        path.display(),
                        remove_err
                    );
                }
                return Err(e);
            }
        };
        self.files_write().insert(ordinal, Arc::clone(&reader));
        let mut rejected = 0u64;
        for (key, old_location, new_location) in moves.drain(..) {
            if !index.on_relocated(key, old_location, new_location) {
                rejected += 1;
            }
        }
        if rejected > 0 {
            debug!(
                "store [{}] {} relocations into file {} were superseded by newer writes",
                self.store_name, rejected, ordinal
            );
        }
        reader.set_available_for_merging(true);
        Ok(reader)
    }

    /// Drop an output file that holds nothing the index will ever point
    /// at
    fn discard_output(&self, writer: DataFileWriter<C>, new_paths: &mut Vec<PathBuf>) {
        let path = writer.path().to_path_buf();
        drop(writer);
        if let Err(e) = fs::remove_file(&path) {
            warn!(
                "store [{}] failed to remove merge output {}: {}",
                self.store_name,
                path.display(),
                e
            );
        }
        new_paths.retain(|p| p != &path);
    }

    /// Unregister files then delete them from disk. Readers holding the
    /// old list keep their maps alive until they drop.
    fn delete_files(&self, files: &[Arc<DataFileReader<C>>]) -> Result<()> {
        {
            let mut map = self.files_write();
            for reader in files {
                map.remove(&reader.ordinal());
            }
        }
        for reader in files {
            fs::remove_file(reader.path())?;
            debug!(
                "store [{}] deleted merged data file {}",
                self.store_name,
                reader.path().display()
            );
        }
        Ok(())
    }

    /// Seal any open epoch file, persist metadata and release all
    /// readers. Further operations fail with [`Error::Closed`].
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(writer) = self.writer_guard().take() {
            // The file becomes durable and will be picked up on the
            // next open; it is not published to the current file list
            writer.seal()?;
        }
        self.save_metadata(&self.store_dir)?;
        self.files_write().clear();
        Ok(())
    }
}

/// Read a metadata file, returning the stored valid key range. A
/// missing file yields `Ok(None)`.
fn load_metadata(path: &Path) -> Result<Option<KeyRange>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut input = BufReader::new(file);
    let version = input.read_u32::<BigEndian>()?;
    if version != METADATA_FILE_FORMAT_VERSION {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unsupported metadata file version {}", version),
        )));
    }
    let has_range = input.read_u8()?;
    let min = input.read_u64::<BigEndian>()?;
    let max = input.read_u64::<BigEndian>()?;
    if has_range == 0 {
        return Ok(None);
    }
    Ok(Some(KeyRange::new(min, max)?))
}
