//! JasperDB: an embedded, append-only key/value storage engine backing a
//! virtual merkle-tree state store.
//!
//! The crate provides three building blocks: a lock-free long-indexed
//! array mapping dense paths to packed file locations ([`index`]), an
//! immutable data file format with a sequential writer and concurrent
//! readers ([`data_file`]), and a [`collection::DataFileCollection`] that
//! owns the file set, runs write epochs and compacts old files online
//! while the caller's index is moved forward through compare-and-set.

pub mod codec;
pub mod collection;
pub mod config;
pub mod constants;
pub mod data_file;
pub mod error;
pub mod index;
pub mod location;

pub use codec::{DataItemCodec, ItemHeader, TwoLongsCodec, VarLongsCodec};
pub use collection::{DataFileCollection, KeyRange, RelocationIndex};
pub use config::{JasperDbConfig, LongIndexConfig};
pub use constants::NON_EXISTENT_LOCATION;
pub use data_file::{DataFileReader, DataFileWriter, FileHeader};
pub use error::{Error, Result};
pub use index::{HeapLongIndex, LongIndex, OffHeapLongIndex};
pub use location::{byte_offset, file_ordinal, pack_location};
