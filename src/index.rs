//! Long-indexed arrays mapping dense paths to 64-bit values.
//!
//! Both implementations store values in fixed-size chunks that are
//! allocated lazily and never moved or freed while the array is live, so
//! `get` needs no locking against concurrent writers. The value 0 is
//! reserved as the universal "absent" sentinel and cannot be stored.

use std::alloc::{self, Layout};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicPtr, AtomicU64, Ordering};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use once_cell::sync::OnceCell;

use crate::config::LongIndexConfig;
use crate::constants::{IMPERMISSIBLE_VALUE, INDEX_FILE_FORMAT_VERSION, INDEX_FILE_MAGIC};
use crate::error::{Error, Result};

/// Mapping from a dense non-negative path to a 64-bit value.
///
/// `get` is lock-free and may race benignly with concurrent `put` and
/// `put_if_equal` on the same slot; `put_if_equal` is the race-safe
/// update primitive. Paths at or beyond [`LongIndex::capacity`] are a
/// programming error and panic.
pub trait LongIndex: Send + Sync {
    /// Read the value at `path`, or `not_found` if the path was never
    /// written or lies beyond the current logical size
    fn get(&self, path: u64, not_found: u64) -> u64;

    /// Store `value` at `path`, allocating its chunk if needed and
    /// extending the logical size
    fn put(&self, path: u64, value: u64) -> Result<()>;

    /// Atomically replace the value at `path` with `new_value` iff it
    /// currently equals `expected`. Returns false without allocating
    /// when the path's chunk was never written.
    fn put_if_equal(&self, path: u64, expected: u64, new_value: u64) -> Result<bool>;

    /// Fixed maximum number of paths
    fn capacity(&self) -> u64;

    /// One past the highest path ever written
    fn size(&self) -> u64;

    /// Dump all values up to [`LongIndex::size`] to a file for fast
    /// restart
    fn write_to_file(&self, path: &Path) -> Result<()>;
}

fn check_value(path: u64, value: u64) -> Result<()> {
    if value == IMPERMISSIBLE_VALUE {
        return Err(Error::ZeroValueStored { path });
    }
    Ok(())
}

fn write_index_header<W: Write>(out: &mut W, longs_per_chunk: usize, size: u64) -> Result<()> {
    out.write_u32::<BigEndian>(INDEX_FILE_MAGIC)?;
    out.write_u32::<BigEndian>(INDEX_FILE_FORMAT_VERSION)?;
    out.write_u32::<BigEndian>(longs_per_chunk as u32)?;
    out.write_u64::<BigEndian>(size)?;
    Ok(())
}

fn read_index_header<R: Read>(input: &mut R, config: &LongIndexConfig) -> Result<u64> {
    let magic = input.read_u32::<BigEndian>()?;
    if magic != INDEX_FILE_MAGIC {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("bad index file magic {:#x}", magic),
        )));
    }
    let version = input.read_u32::<BigEndian>()?;
    if version != INDEX_FILE_FORMAT_VERSION {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("unsupported index file version {}", version),
        )));
    }
    let longs_per_chunk = input.read_u32::<BigEndian>()? as usize;
    if longs_per_chunk != config.longs_per_chunk {
        return Err(Error::IndexGeometryMismatch {
            file: longs_per_chunk,
            ours: config.longs_per_chunk,
        });
    }
    let size = input.read_u64::<BigEndian>()?;
    if size > config.max_longs {
        return Err(Error::IndexTooLarge {
            size,
            capacity: config.max_longs,
        });
    }
    Ok(size)
}

fn dump_values<W: Write, F: Fn(u64) -> u64>(out: &mut W, size: u64, raw: F) -> Result<()> {
    for path in 0..size {
        out.write_u64::<BigEndian>(raw(path))?;
    }
    Ok(())
}

/// Heap-backed long index. Chunks are boxed slices of atomics.
pub struct HeapLongIndex {
    config: LongIndexConfig,
    /// One cell per possible chunk; the table itself is sized once and
    /// never reallocated
    chunks: Box<[OnceCell<Box<[AtomicU64]>>]>,
    size: AtomicU64,
}

impl HeapLongIndex {
    pub fn new(config: LongIndexConfig) -> Self {
        let max_chunks = config.max_chunks();
        let mut chunks = Vec::with_capacity(max_chunks);
        chunks.resize_with(max_chunks, OnceCell::new);
        Self {
            config,
            chunks: chunks.into_boxed_slice(),
            size: AtomicU64::new(0),
        }
    }

    /// Rebuild an index from a dump written by
    /// [`LongIndex::write_to_file`] with the same chunk geometry
    pub fn from_file(config: LongIndexConfig, path: &Path) -> Result<Self> {
        let mut input = BufReader::new(File::open(path)?);
        let size = read_index_header(&mut input, &config)?;
        let index = Self::new(config);
        for p in 0..size {
            let value = input.read_u64::<BigEndian>()?;
            if value != IMPERMISSIBLE_VALUE {
                index.put(p, value)?;
            }
        }
        index.size.store(size, Ordering::SeqCst);
        Ok(index)
    }

    fn check_path(&self, path: u64) {
        assert!(
            path < self.config.max_longs,
            "path {} out of range, capacity is {}",
            path,
            self.config.max_longs
        );
    }

    fn chunk_for(&self, path: u64) -> &OnceCell<Box<[AtomicU64]>> {
        &self.chunks[(path / self.config.longs_per_chunk as u64) as usize]
    }

    fn slot_value(&self, path: u64) -> u64 {
        match self.chunk_for(path).get() {
            Some(chunk) => {
                chunk[(path % self.config.longs_per_chunk as u64) as usize].load(Ordering::SeqCst)
            }
            None => IMPERMISSIBLE_VALUE,
        }
    }
}

impl LongIndex for HeapLongIndex {
    fn get(&self, path: u64, not_found: u64) -> u64 {
        self.check_path(path);
        if path >= self.size.load(Ordering::SeqCst) {
            return not_found;
        }
        let value = self.slot_value(path);
        if value == IMPERMISSIBLE_VALUE {
            not_found
        } else {
            value
        }
    }

    fn put(&self, path: u64, value: u64) -> Result<()> {
        self.check_path(path);
        check_value(path, value)?;
        let per_chunk = self.config.longs_per_chunk as u64;
        let chunk = self.chunk_for(path).get_or_init(|| {
            let mut slots = Vec::with_capacity(per_chunk as usize);
            slots.resize_with(per_chunk as usize, || AtomicU64::new(0));
            slots.into_boxed_slice()
        });
        chunk[(path % per_chunk) as usize].store(value, Ordering::SeqCst);
        self.size.fetch_max(path + 1, Ordering::SeqCst);
        Ok(())
    }

    fn put_if_equal(&self, path: u64, expected: u64, new_value: u64) -> Result<bool> {
        self.check_path(path);
        check_value(path, new_value)?;
        let chunk = match self.chunk_for(path).get() {
            Some(chunk) => chunk,
            None => return Ok(false),
        };
        let slot = &chunk[(path % self.config.longs_per_chunk as u64) as usize];
        let swapped = slot
            .compare_exchange(expected, new_value, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if swapped {
            self.size.fetch_max(path + 1, Ordering::SeqCst);
        }
        Ok(swapped)
    }

    fn capacity(&self) -> u64 {
        self.config.max_longs
    }

    fn size(&self) -> u64 {
        self.size.load(Ordering::SeqCst)
    }

    fn write_to_file(&self, path: &Path) -> Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let mut out = BufWriter::new(file);
        let size = self.size();
        write_index_header(&mut out, self.config.longs_per_chunk, size)?;
        dump_values(&mut out, size, |p| self.slot_value(p))?;
        out.flush()?;
        out.into_inner().map_err(|e| Error::Io(e.into_error()))?.sync_all()?;
        Ok(())
    }
}

/// Off-heap long index. Chunks are raw 8-byte-aligned allocations
/// outside the Rust heap accounting, addressed through atomic loads and
/// stores on each slot.
pub struct OffHeapLongIndex {
    config: LongIndexConfig,
    /// One pointer per possible chunk; null means unallocated. A
    /// non-null pointer is never replaced or freed before drop.
    chunks: Box<[AtomicPtr<u8>]>,
    chunk_layout: Layout,
    size: AtomicU64,
}

// Chunk pointers are only ever published once and the pointed-to memory
// is accessed exclusively through AtomicU64 operations.
unsafe impl Send for OffHeapLongIndex {}
unsafe impl Sync for OffHeapLongIndex {}

impl OffHeapLongIndex {
    pub fn new(config: LongIndexConfig) -> Result<Self> {
        let chunk_layout = Layout::from_size_align(config.longs_per_chunk * 8, 8)
            .map_err(|_| Error::OffHeapAllocation {
                bytes: config.longs_per_chunk * 8,
            })?;
        let max_chunks = config.max_chunks();
        let mut chunks = Vec::with_capacity(max_chunks);
        chunks.resize_with(max_chunks, || AtomicPtr::new(std::ptr::null_mut()));
        Ok(Self {
            config,
            chunks: chunks.into_boxed_slice(),
            chunk_layout,
            size: AtomicU64::new(0),
        })
    }

    /// Rebuild an index from a dump written by
    /// [`LongIndex::write_to_file`] with the same chunk geometry
    pub fn from_file(config: LongIndexConfig, path: &Path) -> Result<Self> {
        let mut input = BufReader::new(File::open(path)?);
        let size = read_index_header(&mut input, &config)?;
        let index = Self::new(config)?;
        for p in 0..size {
            let value = input.read_u64::<BigEndian>()?;
            if value != IMPERMISSIBLE_VALUE {
                index.put(p, value)?;
            }
        }
        index.size.store(size, Ordering::SeqCst);
        Ok(index)
    }

    fn check_path(&self, path: u64) {
        assert!(
            path < self.config.max_longs,
            "path {} out of range, capacity is {}",
            path,
            self.config.max_longs
        );
    }

    /// Atomic view of one slot inside an allocated chunk
    fn slot<'a>(&self, chunk: *mut u8, path: u64) -> &'a AtomicU64 {
        let sub_index = (path % self.config.longs_per_chunk as u64) as usize;
        // Chunks are zero-initialized, 8-byte aligned and live until drop
        unsafe { &*(chunk.add(sub_index * 8) as *const AtomicU64) }
    }

    /// Get the chunk for `path`, allocating it if needed. Exactly one
    /// allocation wins under concurrent calls; losers free theirs and
    /// adopt the winner's.
    fn create_or_get_chunk(&self, path: u64) -> Result<*mut u8> {
        let chunk_index = (path / self.config.longs_per_chunk as u64) as usize;
        let existing = self.chunks[chunk_index].load(Ordering::SeqCst);
        if !existing.is_null() {
            return Ok(existing);
        }
        let fresh = unsafe { alloc::alloc_zeroed(self.chunk_layout) };
        if fresh.is_null() {
            return Err(Error::OffHeapAllocation {
                bytes: self.chunk_layout.size(),
            });
        }
        match self.chunks[chunk_index].compare_exchange(
            std::ptr::null_mut(),
            fresh,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => Ok(fresh),
            Err(winner) => {
                // Another thread allocated first
                unsafe { alloc::dealloc(fresh, self.chunk_layout) };
                Ok(winner)
            }
        }
    }

    fn slot_value(&self, path: u64) -> u64 {
        let chunk_index = (path / self.config.longs_per_chunk as u64) as usize;
        let chunk = self.chunks[chunk_index].load(Ordering::SeqCst);
        if chunk.is_null() {
            IMPERMISSIBLE_VALUE
        } else {
            self.slot(chunk, path).load(Ordering::SeqCst)
        }
    }
}

impl LongIndex for OffHeapLongIndex {
    fn get(&self, path: u64, not_found: u64) -> u64 {
        self.check_path(path);
        if path >= self.size.load(Ordering::SeqCst) {
            return not_found;
        }
        let value = self.slot_value(path);
        if value == IMPERMISSIBLE_VALUE {
            not_found
        } else {
            value
        }
    }

    fn put(&self, path: u64, value: u64) -> Result<()> {
        self.check_path(path);
        check_value(path, value)?;
        let chunk = self.create_or_get_chunk(path)?;
        self.slot(chunk, path).store(value, Ordering::SeqCst);
        self.size.fetch_max(path + 1, Ordering::SeqCst);
        Ok(())
    }

    fn put_if_equal(&self, path: u64, expected: u64, new_value: u64) -> Result<bool> {
        self.check_path(path);
        check_value(path, new_value)?;
        let chunk_index = (path / self.config.longs_per_chunk as u64) as usize;
        let chunk = self.chunks[chunk_index].load(Ordering::SeqCst);
        if chunk.is_null() {
            return Ok(false);
        }
        let swapped = self
            .slot(chunk, path)
            .compare_exchange(expected, new_value, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if swapped {
            self.size.fetch_max(path + 1, Ordering::SeqCst);
        }
        Ok(swapped)
    }

    fn capacity(&self) -> u64 {
        self.config.max_longs
    }

    fn size(&self) -> u64 {
        self.size.load(Ordering::SeqCst)
    }

    fn write_to_file(&self, path: &Path) -> Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let mut out = BufWriter::new(file);
        let size = self.size();
        write_index_header(&mut out, self.config.longs_per_chunk, size)?;
        dump_values(&mut out, size, |p| self.slot_value(p))?;
        out.flush()?;
        out.into_inner().map_err(|e| Error::Io(e.into_error()))?.sync_all()?;
        Ok(())
    }
}

impl Drop for OffHeapLongIndex {
    fn drop(&mut self) {
        for cell in self.chunks.iter() {
            let chunk = cell.load(Ordering::SeqCst);
            if !chunk.is_null() {
                unsafe { alloc::dealloc(chunk, self.chunk_layout) };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn small_config() -> LongIndexConfig {
        LongIndexConfig {
            longs_per_chunk: 16,
            max_longs: 16 * 8,
        }
    }

    fn both(config: LongIndexConfig) -> Vec<Box<dyn LongIndex>> {
        vec![
            Box::new(HeapLongIndex::new(config.clone())),
            Box::new(OffHeapLongIndex::new(config).unwrap()),
        ]
    }

    #[test]
    fn test_get_on_empty_returns_not_found() {
        for index in both(small_config()) {
            assert_eq!(index.get(0, u64::MAX), u64::MAX);
            assert_eq!(index.get(100, 7), 7);
            assert_eq!(index.size(), 0);
        }
    }

    #[test]
    fn test_put_then_get_across_chunk_boundaries() {
        for index in both(small_config()) {
            // Touch paths in the first, third and last chunk
            for path in [0u64, 1, 15, 16, 17, 40, 127] {
                index.put(path, path + 1000).unwrap();
            }
            for path in [0u64, 1, 15, 16, 17, 40, 127] {
                assert_eq!(index.get(path, 0), path + 1000);
            }
            // Untouched path inside an allocated chunk
            assert_eq!(index.get(2, 9999), 9999);
            // Untouched path in an unallocated chunk, below size
            assert_eq!(index.get(100, 9999), 9999);
            assert_eq!(index.size(), 128);
            assert_eq!(index.capacity(), 128);
        }
    }

    #[test]
    fn test_put_zero_is_rejected() {
        for index in both(small_config()) {
            assert!(matches!(
                index.put(3, 0),
                Err(Error::ZeroValueStored { path: 3 })
            ));
            assert!(matches!(
                index.put_if_equal(3, 0, 0),
                Err(Error::ZeroValueStored { path: 3 })
            ));
        }
    }

    #[test]
    fn test_put_if_equal_semantics() {
        for index in both(small_config()) {
            // No chunk yet: CAS fails without allocating
            assert!(!index.put_if_equal(5, 123, 456).unwrap());
            assert_eq!(index.size(), 0);

            index.put(5, 123).unwrap();
            // Wrong expected value
            assert!(!index.put_if_equal(5, 999, 456).unwrap());
            assert_eq!(index.get(5, 0), 123);
            // Matching expected value
            assert!(index.put_if_equal(5, 123, 456).unwrap());
            assert_eq!(index.get(5, 0), 456);
            // Absent slot in an allocated chunk: expected 0 matches
            assert!(index.put_if_equal(6, 0, 777).unwrap());
            assert_eq!(index.get(6, 0), 777);
        }
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_path_beyond_capacity_panics() {
        let index = HeapLongIndex::new(small_config());
        index.get(128, 0);
    }

    #[test]
    fn test_size_tracks_highest_path() {
        for index in both(small_config()) {
            index.put(10, 1).unwrap();
            assert_eq!(index.size(), 11);
            index.put(3, 2).unwrap();
            assert_eq!(index.size(), 11);
            // Allocate the second chunk so a CAS there has a slot to see
            index.put(16, 3).unwrap();
            assert_eq!(index.size(), 17);
            assert!(index.put_if_equal(20, 0, 4).unwrap());
            assert_eq!(index.size(), 21);
        }
    }

    #[test]
    fn test_heap_off_heap_equivalence() {
        use rand::prelude::*;
        let mut rng = StdRng::seed_from_u64(42);
        let heap = HeapLongIndex::new(small_config());
        let off_heap = OffHeapLongIndex::new(small_config()).unwrap();
        for _ in 0..2000 {
            let path = rng.gen_range(0..128u64);
            match rng.gen_range(0..3) {
                0 => {
                    let value = rng.gen_range(1..1000u64);
                    heap.put(path, value).unwrap();
                    off_heap.put(path, value).unwrap();
                }
                1 => {
                    let expected = rng.gen_range(0..1000u64);
                    let value = rng.gen_range(1..1000u64);
                    assert_eq!(
                        heap.put_if_equal(path, expected, value).unwrap(),
                        off_heap.put_if_equal(path, expected, value).unwrap()
                    );
                }
                _ => {
                    assert_eq!(heap.get(path, u64::MAX), off_heap.get(path, u64::MAX));
                }
            }
        }
        assert_eq!(heap.size(), off_heap.size());
        for path in 0..128 {
            assert_eq!(heap.get(path, 0), off_heap.get(path, 0));
        }
    }

    #[test]
    fn test_write_and_load() {
        let dir = TempDir::new().unwrap();
        let dump = dir.path().join("index.jdb");
        let heap = HeapLongIndex::new(small_config());
        for path in [0u64, 5, 17, 99] {
            heap.put(path, path * 3 + 1).unwrap();
        }
        heap.write_to_file(&dump).unwrap();

        let reloaded = HeapLongIndex::from_file(small_config(), &dump).unwrap();
        assert_eq!(reloaded.size(), heap.size());
        for path in 0..100 {
            assert_eq!(reloaded.get(path, u64::MAX), heap.get(path, u64::MAX));
        }

        // Off-heap can load a heap dump, the format is shared
        let off_heap = OffHeapLongIndex::from_file(small_config(), &dump).unwrap();
        for path in 0..100 {
            assert_eq!(off_heap.get(path, u64::MAX), heap.get(path, u64::MAX));
        }
    }

    #[test]
    fn test_load_rejects_wrong_geometry() {
        let dir = TempDir::new().unwrap();
        let dump = dir.path().join("index.jdb");
        let heap = HeapLongIndex::new(small_config());
        heap.put(1, 2).unwrap();
        heap.write_to_file(&dump).unwrap();

        let other = LongIndexConfig {
            longs_per_chunk: 32,
            max_longs: 128,
        };
        assert!(matches!(
            HeapLongIndex::from_file(other, &dump),
            Err(Error::IndexGeometryMismatch { file: 16, ours: 32 })
        ));
    }

    #[test]
    fn test_concurrent_chunk_allocation_single_winner() {
        let index = std::sync::Arc::new(OffHeapLongIndex::new(small_config()).unwrap());
        std::thread::scope(|scope| {
            for thread in 0..8u64 {
                let index = &index;
                scope.spawn(move || {
                    // All threads race on paths of the same fresh chunk
                    for i in 0..16u64 {
                        index.put(16 + i, thread * 100 + i + 1).unwrap();
                    }
                });
            }
        });
        // Every slot holds one of the racing writes, no tearing, no lost chunk
        for i in 0..16u64 {
            let value = index.get(16 + i, 0);
            assert!(value > 0, "slot {} lost", i);
            assert_eq!((value - 1) % 100, i);
        }
    }

    #[test]
    fn test_contended_cas_exactly_one_winner_per_round() {
        let config = small_config();
        let index = HeapLongIndex::new(config);
        index.put(0, 1).unwrap();
        for round in 1..50u64 {
            let wins = std::sync::atomic::AtomicU64::new(0);
            std::thread::scope(|scope| {
                for _ in 0..8 {
                    let index = &index;
                    let wins = &wins;
                    scope.spawn(move || {
                        if index.put_if_equal(0, round, round + 1).unwrap() {
                            wins.fetch_add(1, Ordering::SeqCst);
                        }
                    });
                }
            });
            assert_eq!(wins.load(Ordering::SeqCst), 1, "round {}", round);
            assert_eq!(index.get(0, 0), round + 1);
        }
    }
}
