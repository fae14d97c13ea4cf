//! Streaming cursor over a range of fragment ids
//!
//! The cursor walks ids in ascending order, skips ids without records and
//! crosses shard files as needed. It holds at most one shard open.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Seek, SeekFrom};

use crate::error::{StoreError, StoreResult};
use crate::index::OffsetSlice;
use crate::record::{read_short, SHORT_RECORD_SIZE};
use crate::store::Store;
use crate::types::{FragId, OverlapRecord};

struct OpenShard {
    number: u32,
    reader: BufReader<File>,
}

pub struct OverlapStream<'a> {
    store: &'a Store,
    slice: Option<OffsetSlice>,
    /// Id the next non-empty search starts from
    next_id: FragId,
    current_id: FragId,
    /// Records left for `current_id`
    remaining: u32,
    shard: Option<OpenShard>,
    finished: bool,
}

impl<'a> OverlapStream<'a> {
    /// Position a cursor on the first record of `first..=last`
    pub fn open(store: &'a Store, first: FragId, last: FragId) -> StoreResult<Self> {
        let slice = store.index().range(first, last)?;
        let mut stream = Self {
            store,
            slice: Some(slice),
            next_id: first,
            current_id: first,
            remaining: 0,
            shard: None,
            finished: false,
        };
        stream.advance()?;
        Ok(stream)
    }

    /// A cursor that yields nothing
    pub(crate) fn empty(store: &'a Store) -> Self {
        Self {
            store,
            slice: None,
            next_id: 1,
            current_id: 0,
            remaining: 0,
            shard: None,
            finished: true,
        }
    }

    /// Move to the next id with records, opening its shard if needed
    fn advance(&mut self) -> StoreResult<()> {
        let Some(slice) = &self.slice else {
            self.finished = true;
            return Ok(());
        };
        let Some(id) = slice.next_nonempty(self.next_id) else {
            self.finished = true;
            self.shard = None;
            return Ok(());
        };
        self.current_id = id;
        self.remaining = slice.count(id).unwrap_or(0);
        self.next_id = id + 1;

        let index = self.store.index();
        let shard = index.shard_of(id);
        if self.shard.as_ref().map(|s| s.number) != Some(shard) {
            // Records of skipped empty ids take no space, so within one shard
            // the reader is already positioned; only a fresh shard needs a seek.
            let file = File::open(self.store.shard_path(shard))?;
            let mut reader = BufReader::new(file);
            let pos = index.position_in_shard(id) as u64 * SHORT_RECORD_SIZE as u64;
            reader.seek(SeekFrom::Start(pos))?;
            self.shard = Some(OpenShard { number: shard, reader });
        }
        Ok(())
    }

    fn next_record(&mut self) -> StoreResult<Option<OverlapRecord>> {
        loop {
            if self.finished {
                return Ok(None);
            }
            if self.remaining == 0 {
                self.advance()?;
                continue;
            }

            let id = self.current_id;
            let Some(shard) = self.shard.as_mut() else {
                return Err(StoreError::CorruptStore { shard: 0, id });
            };
            return match read_short(&mut shard.reader, id) {
                Ok(rec) => {
                    self.remaining -= 1;
                    Ok(Some(rec))
                }
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(StoreError::CorruptStore {
                    shard: shard.number,
                    id,
                }),
                Err(e) => Err(e.into()),
            };
        }
    }

    pub fn first(&self) -> Option<FragId> {
        self.slice.as_ref().map(OffsetSlice::first)
    }

    pub fn last(&self) -> Option<FragId> {
        self.slice.as_ref().map(OffsetSlice::last)
    }

    /// Records this cursor will yield in total
    pub fn len_hint(&self) -> u64 {
        self.slice.as_ref().map_or(0, OffsetSlice::total)
    }
}

impl Iterator for OverlapStream<'_> {
    type Item = StoreResult<OverlapRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_record() {
            Ok(rec) => rec.map(Ok),
            Err(e) => {
                self.finished = true;
                self.shard = None;
                Some(Err(e))
            }
        }
    }
}
