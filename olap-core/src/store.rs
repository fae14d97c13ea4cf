//! Read-only store handle
//!
//! A store is a directory holding `offset.olap` plus shard files
//! `data01.olap, data02.olap, ...`. Opening a store loads and validates the
//! index; shard files are opened lazily by [`OverlapStream`].

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{StoreError, StoreResult};
use crate::index::{OffsetIndex, INDEX_FILE_NAME};
use crate::patch::ExclusiveStore;
use crate::record::SHORT_RECORD_SIZE;
use crate::shard::shard_file_name;
use crate::stream::OverlapStream;
use crate::types::{FragId, OverlapRecord};

#[derive(Debug)]
pub struct Store {
    dir: PathBuf,
    index: OffsetIndex,
}

impl Store {
    /// Open the store in `dir`
    ///
    /// Fails with `NotFound` if the directory, the index or any shard the
    /// index refers to is missing, and with `Format` if the index is malformed.
    pub fn open<P: AsRef<Path>>(dir: P) -> StoreResult<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(StoreError::not_found(dir));
        }

        let index = OffsetIndex::load(dir.join(INDEX_FILE_NAME))?;
        for shard in 1..=index.shard_count() {
            let path = dir.join(shard_file_name(shard));
            if !path.is_file() {
                return Err(StoreError::not_found(path));
            }
        }

        log::debug!(
            "Opened store {}: max_id={}, {} records in {} shards",
            dir.display(),
            index.max_id(),
            index.total_records(),
            index.shard_count()
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            index,
        })
    }

    /// Highest fragment id covered by the index
    pub fn last_id(&self) -> FragId {
        self.index.max_id()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn index(&self) -> &OffsetIndex {
        &self.index
    }

    pub fn records_per_shard(&self) -> u32 {
        self.index.records_per_shard()
    }

    pub fn total_records(&self) -> u64 {
        self.index.total_records()
    }

    pub fn shard_path(&self, shard: u32) -> PathBuf {
        self.dir.join(shard_file_name(shard))
    }

    /// Stream the records of ids `first..=last` in ascending id order
    pub fn stream(&self, first: FragId, last: FragId) -> StoreResult<OverlapStream<'_>> {
        OverlapStream::open(self, first, last)
    }

    /// Stream every record in the store; empty stores yield nothing
    pub fn stream_all(&self) -> StoreResult<OverlapStream<'_>> {
        if self.last_id() == 0 {
            Ok(OverlapStream::empty(self))
        } else {
            self.stream(1, self.last_id())
        }
    }

    /// All records filed under `id`
    pub fn overlaps_of(&self, id: FragId) -> StoreResult<Vec<OverlapRecord>> {
        self.stream(id, id)?.collect()
    }

    /// Check that every shard holds exactly the bytes the index accounts for
    pub fn verify_shard_sizes(&self) -> StoreResult<()> {
        for shard in 1..=self.index.shard_count() {
            let path = self.shard_path(shard);
            let actual = fs::metadata(&path)?.len();
            let expected = self.index.shard_records(shard) as u64 * SHORT_RECORD_SIZE as u64;
            if actual != expected {
                return Err(StoreError::format(
                    path,
                    format!("shard holds {actual} bytes, index implies {expected}"),
                ));
            }
        }
        Ok(())
    }

    /// Give up shared access in exchange for a handle that may patch in place
    ///
    /// A cursor borrows its store, so no cursor on this handle can outlive
    /// the conversion:
    ///
    /// ```compile_fail
    /// # fn demo(store: olap_core::Store) -> olap_core::StoreResult<()> {
    /// let mut cursor = store.stream(1, 1)?;
    /// let mut patcher = store.into_exclusive();
    /// patcher.update(1, 1, &[900])?;
    /// let _ = cursor.next();
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// and the handle cannot be duplicated to keep a reader alongside the patcher:
    ///
    /// ```compile_fail
    /// # fn demo(store: olap_core::Store) {
    /// let reader = store.clone();
    /// let _patcher = store.into_exclusive();
    /// let _ = reader.stream_all();
    /// # }
    /// ```
    pub fn into_exclusive(self) -> ExclusiveStore {
        ExclusiveStore::new(self)
    }
}
