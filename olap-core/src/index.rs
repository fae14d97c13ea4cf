//! Offset index (`offset.olap`)
//!
//! Layout, all little-endian `u32`:
//!
//! ```text
//! max_id, record_size, records_per_shard, offsets[0 ..= max_id + 1]
//! ```
//!
//! `offsets[i]` is the position of id `i`'s first record in the logical
//! record stream spanning all shards; `offsets[max_id + 1]` is the total
//! record count.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{StoreError, StoreResult};
use crate::record::SHORT_RECORD_SIZE;
use crate::shard;
use crate::types::FragId;

/// Published index file name
pub const INDEX_FILE_NAME: &str = "offset.olap";

/// Index file name while a generation is being written
pub const INDEX_TMP_NAME: &str = "offset.tmp";

const HEADER_BYTES: u64 = 3 * 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetIndex {
    records_per_shard: u32,
    offsets: Vec<u32>,
}

impl OffsetIndex {
    /// Index of a store with no fragments
    pub fn empty(records_per_shard: u32) -> Self {
        Self {
            records_per_shard,
            offsets: vec![0, 0],
        }
    }

    /// Build from a complete offsets array of length `max_id + 2`
    pub(crate) fn from_offsets(records_per_shard: u32, offsets: Vec<u32>) -> Self {
        debug_assert!(offsets.len() >= 2);
        debug_assert!(offsets.windows(2).all(|w| w[0] <= w[1]));
        Self {
            records_per_shard,
            offsets,
        }
    }

    /// Read and validate an index file
    pub fn load<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::not_found(path));
            }
            Err(e) => return Err(e.into()),
        };
        let file_len = file.metadata()?.len();
        if file_len < HEADER_BYTES {
            return Err(StoreError::format(path, "file shorter than index header"));
        }

        let mut reader = BufReader::new(file);
        let max_id = reader.read_u32::<LittleEndian>()?;
        let record_size = reader.read_u32::<LittleEndian>()?;
        let records_per_shard = reader.read_u32::<LittleEndian>()?;

        if record_size as usize != SHORT_RECORD_SIZE {
            return Err(StoreError::format(
                path,
                format!("record size {record_size} does not match expected {SHORT_RECORD_SIZE}"),
            ));
        }
        if records_per_shard == 0 {
            return Err(StoreError::format(path, "records per shard is zero"));
        }

        let count = max_id as u64 + 2;
        let expected_len = HEADER_BYTES + 4 * count;
        if file_len < expected_len {
            return Err(StoreError::format(
                path,
                format!("truncated: {file_len} bytes, header implies {expected_len}"),
            ));
        }
        if file_len > expected_len {
            return Err(StoreError::format(
                path,
                format!("{} trailing bytes after offsets", file_len - expected_len),
            ));
        }

        let mut offsets = vec![0u32; count as usize];
        reader.read_u32_into::<LittleEndian>(&mut offsets)?;

        if let Some(i) = offsets.windows(2).position(|w| w[0] > w[1]) {
            return Err(StoreError::format(
                path,
                format!("offsets decrease between ids {} and {}", i, i + 1),
            ));
        }

        Ok(Self {
            records_per_shard,
            offsets,
        })
    }

    /// Write header and offsets; callers publish by renaming
    pub fn save<P: AsRef<Path>>(&self, path: P) -> StoreResult<()> {
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        writer.write_u32::<LittleEndian>(self.max_id())?;
        writer.write_u32::<LittleEndian>(SHORT_RECORD_SIZE as u32)?;
        writer.write_u32::<LittleEndian>(self.records_per_shard)?;
        for &offset in &self.offsets {
            writer.write_u32::<LittleEndian>(offset)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    pub fn max_id(&self) -> FragId {
        (self.offsets.len() - 2) as FragId
    }

    pub fn record_size(&self) -> u32 {
        SHORT_RECORD_SIZE as u32
    }

    pub fn records_per_shard(&self) -> u32 {
        self.records_per_shard
    }

    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    /// Total records across all shards
    pub fn total_records(&self) -> u64 {
        self.offsets[self.offsets.len() - 1] as u64
    }

    /// Position of `id`'s first record in the logical stream
    pub fn start(&self, id: FragId) -> u32 {
        self.offsets[id as usize]
    }

    /// Number of records filed under `id`
    pub fn count(&self, id: FragId) -> u32 {
        self.offsets[id as usize + 1] - self.offsets[id as usize]
    }

    pub fn shard_count(&self) -> u32 {
        shard::shard_count(self.max_id(), self.records_per_shard)
    }

    pub fn shard_of(&self, id: FragId) -> u32 {
        shard::shard_of(id, self.records_per_shard)
    }

    /// Ids covered by shard `k` in this generation
    pub fn shard_id_range(&self, shard: u32) -> Option<(FragId, FragId)> {
        shard::shard_id_range(shard, self.records_per_shard, self.max_id())
    }

    /// Logical position of the first record stored in shard `k`
    pub fn shard_base(&self, shard: u32) -> u32 {
        match self.shard_id_range(shard) {
            Some((lo, _)) => self.offsets[lo as usize],
            None => self.offsets[self.offsets.len() - 1],
        }
    }

    /// Records held by shard `k`
    pub fn shard_records(&self, shard: u32) -> u32 {
        match self.shard_id_range(shard) {
            Some((lo, hi)) => self.offsets[hi as usize + 1] - self.offsets[lo as usize],
            None => 0,
        }
    }

    /// Record position of `id` inside its own shard file
    pub fn position_in_shard(&self, id: FragId) -> u32 {
        self.start(id) - self.shard_base(self.shard_of(id))
    }

    /// Record boundaries for ids `first..=last`
    pub fn range(&self, first: FragId, last: FragId) -> StoreResult<OffsetSlice> {
        self.check_range(first, last)?;
        Ok(OffsetSlice {
            first,
            bounds: self.offsets[first as usize..=last as usize + 1].to_vec(),
        })
    }

    pub fn check_range(&self, first: FragId, last: FragId) -> StoreResult<()> {
        let max_id = self.max_id();
        if first < 1 || last < first || last > max_id {
            return Err(StoreError::Range { first, last, max_id });
        }
        Ok(())
    }
}

/// Bounds-checked view of the offsets for a contiguous id range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetSlice {
    first: FragId,
    bounds: Vec<u32>,
}

impl OffsetSlice {
    pub fn first(&self) -> FragId {
        self.first
    }

    pub fn last(&self) -> FragId {
        self.first + self.bounds.len() as FragId - 2
    }

    fn slot(&self, id: FragId) -> Option<usize> {
        if id < self.first || id > self.last() {
            None
        } else {
            Some((id - self.first) as usize)
        }
    }

    pub fn start(&self, id: FragId) -> Option<u32> {
        self.slot(id).map(|i| self.bounds[i])
    }

    pub fn count(&self, id: FragId) -> Option<u32> {
        self.slot(id).map(|i| self.bounds[i + 1] - self.bounds[i])
    }

    /// Records covered by the whole slice
    pub fn total(&self) -> u64 {
        (self.bounds[self.bounds.len() - 1] - self.bounds[0]) as u64
    }

    /// First id at or after `id` with at least one record
    pub fn next_nonempty(&self, id: FragId) -> Option<FragId> {
        let mut cur = id.max(self.first);
        while cur <= self.last() {
            if self.count(cur).unwrap_or(0) > 0 {
                return Some(cur);
            }
            cur += 1;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn sample() -> OffsetIndex {
        // ids 1..=5, two per shard; counts 1,1,0,2,3
        OffsetIndex::from_offsets(2, vec![0, 0, 1, 2, 2, 4, 7])
    }

    #[test]
    fn test_save_load_roundtrip() -> StoreResult<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join(INDEX_FILE_NAME);
        let index = sample();
        index.save(&path)?;

        assert_eq!(fs::metadata(&path)?.len(), 12 + 4 * 7);
        let loaded = OffsetIndex::load(&path)?;
        assert_eq!(loaded, index);
        assert_eq!(loaded.max_id(), 5);
        assert_eq!(loaded.total_records(), 7);
        Ok(())
    }

    #[test]
    fn test_shard_geometry() {
        let index = sample();
        assert_eq!(index.shard_count(), 3);
        assert_eq!(index.shard_base(1), 0);
        assert_eq!(index.shard_base(2), 2);
        assert_eq!(index.shard_base(3), 4);
        assert_eq!(index.shard_records(2), 2);
        assert_eq!(index.shard_records(3), 3);
        assert_eq!(index.position_in_shard(4), 0);
        assert_eq!(index.position_in_shard(5), 0);
        assert_eq!(index.position_in_shard(2), 1);
    }

    #[test]
    fn test_range_slice() -> StoreResult<()> {
        let index = sample();
        let slice = index.range(2, 4)?;
        assert_eq!(slice.first(), 2);
        assert_eq!(slice.last(), 4);
        assert_eq!(slice.count(3), Some(0));
        assert_eq!(slice.count(4), Some(2));
        assert_eq!(slice.count(5), None);
        assert_eq!(slice.total(), 3);
        assert_eq!(slice.next_nonempty(3), Some(4));
        Ok(())
    }

    #[test]
    fn test_range_rejects_bad_bounds() {
        let index = sample();
        assert!(matches!(index.range(0, 2), Err(StoreError::Range { .. })));
        assert!(matches!(index.range(3, 2), Err(StoreError::Range { .. })));
        assert!(matches!(index.range(1, 6), Err(StoreError::Range { .. })));
    }

    #[test]
    fn test_load_rejects_truncated_file() -> StoreResult<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join(INDEX_FILE_NAME);
        sample().save(&path)?;
        let bytes = fs::read(&path)?;
        fs::write(&path, &bytes[..bytes.len() - 4])?;

        assert!(matches!(OffsetIndex::load(&path), Err(StoreError::Format { .. })));
        Ok(())
    }

    #[test]
    fn test_load_rejects_wrong_record_size() -> StoreResult<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join(INDEX_FILE_NAME);
        sample().save(&path)?;
        let mut bytes = fs::read(&path)?;
        bytes[4] = 16;
        fs::write(&path, &bytes)?;

        let err = OffsetIndex::load(&path).unwrap_err();
        assert!(err.to_string().contains("record size 16"));
        Ok(())
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = OffsetIndex::load(dir.path().join(INDEX_FILE_NAME)).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
}
