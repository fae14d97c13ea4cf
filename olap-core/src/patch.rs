//! In-place rewriting of `corr_erate`
//!
//! Both patch operations need an [`ExclusiveStore`], which can only be
//! obtained by giving up a [`Store`]. Cursors borrow the `Store`, so none can
//! be alive while a patch runs in this process.

use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::error::{StoreError, StoreResult};
use crate::index::OffsetIndex;
use crate::io::patch_input::check_sorted_pairs;
use crate::record::{set_short_corr_erate, short_b_id, SHORT_RECORD_SIZE};
use crate::store::Store;
use crate::types::FragId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchConfig {
    /// Records read, patched and written back per chunk
    pub io_buffer_records: usize,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            io_buffer_records: 10_000,
        }
    }
}

/// A store handle that may overwrite records in place
#[derive(Debug)]
pub struct ExclusiveStore {
    store: Store,
    config: PatchConfig,
}

impl ExclusiveStore {
    pub(crate) fn new(store: Store) -> Self {
        Self {
            store,
            config: PatchConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Read-only view, e.g. to stream records between patches
    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn into_shared(self) -> Store {
        self.store
    }

    fn chunk_records(&self) -> usize {
        self.config.io_buffer_records.max(1)
    }

    /// Replace `corr_erate` of every record of ids `lo_id..=hi_id`, in stream order
    ///
    /// `erates` must hold exactly one value per record; otherwise nothing is
    /// written and `CountMismatch` is returned.
    pub fn update(&mut self, lo_id: FragId, hi_id: FragId, erates: &[u16]) -> StoreResult<u64> {
        let index = self.store.index();
        index.check_range(lo_id, hi_id)?;

        let actual = (index.start(hi_id + 1) - index.start(lo_id)) as u64;
        if erates.len() as u64 != actual {
            return Err(StoreError::CountMismatch {
                lo_id,
                hi_id,
                expected: erates.len() as u64,
                actual,
            });
        }

        let spans = shard_spans(index, lo_id, hi_id);
        for span in &spans {
            self.check_span(span)?;
        }

        let chunk = self.chunk_records();
        let mut next = 0usize;
        for span in &spans {
            let mut file = self.open_shard(span.shard)?;
            rewrite_records(&mut file, span.start, span.count, chunk, |bytes| {
                for record in bytes.chunks_exact_mut(SHORT_RECORD_SIZE) {
                    set_short_corr_erate(record, erates[next]);
                    next += 1;
                }
                true
            })
            .map_err(|e| self.corrupt_or_io(e, span))?;
            file.sync_all()?;
        }

        log::info!(
            "Updated corr_erate of {} records for ids {lo_id}..={hi_id}",
            erates.len()
        );
        Ok(erates.len() as u64)
    }

    /// Set `corr_erate` to `erate` for every record matching a listed `(a_id, b_id)`
    ///
    /// `pairs` must be sorted by `a_id`. Returns the number of records changed.
    pub fn force(&mut self, pairs: &[(FragId, FragId)], erate: u16) -> StoreResult<u64> {
        if pairs.is_empty() {
            return Ok(0);
        }
        check_sorted_pairs(pairs)?;

        let index = self.store.index();
        let max_id = index.max_id();
        if let Some(&(a, _)) = pairs.iter().find(|(a, _)| *a == 0 || *a > max_id) {
            return Err(StoreError::Range {
                first: a,
                last: a,
                max_id,
            });
        }

        let groups: Vec<(FragId, Vec<FragId>)> = pairs
            .chunk_by(|x, y| x.0 == y.0)
            .map(|group| (group[0].0, group.iter().map(|&(_, b)| b).collect()))
            .collect();

        let mut spans = Vec::with_capacity(groups.len());
        for (a_id, _) in &groups {
            let span = shard_spans(index, *a_id, *a_id).into_iter().next();
            if let Some(span) = &span {
                self.check_span(span)?;
            }
            spans.push(span);
        }

        let chunk = self.chunk_records();
        let mut patched = 0u64;
        let mut open: Option<(u32, File)> = None;
        for ((_, targets), span) in groups.iter().zip(&spans) {
            let Some(span) = span else { continue };
            if span.count == 0 {
                continue;
            }
            if open.as_ref().map(|(shard, _)| *shard) != Some(span.shard) {
                if let Some((_, file)) = open.take() {
                    file.sync_all()?;
                }
                open = Some((span.shard, self.open_shard(span.shard)?));
            }
            let Some((_, file)) = open.as_mut() else { continue };

            rewrite_records(file, span.start, span.count, chunk, |bytes| {
                let mut dirty = false;
                for record in bytes.chunks_exact_mut(SHORT_RECORD_SIZE) {
                    if targets.contains(&short_b_id(record)) {
                        set_short_corr_erate(record, erate);
                        patched += 1;
                        dirty = true;
                    }
                }
                dirty
            })
            .map_err(|e| self.corrupt_or_io(e, span))?;
        }
        if let Some((_, file)) = open {
            file.sync_all()?;
        }

        log::info!(
            "Forced corr_erate to {erate} on {patched} records ({} pairs listed)",
            pairs.len()
        );
        Ok(patched)
    }

    fn open_shard(&self, shard: u32) -> StoreResult<File> {
        Ok(OpenOptions::new()
            .read(true)
            .write(true)
            .open(self.store.shard_path(shard))?)
    }

    /// Fail before writing anything if a shard is too short for its span
    fn check_span(&self, span: &ShardSpan) -> StoreResult<()> {
        let len = std::fs::metadata(self.store.shard_path(span.shard))?.len();
        let needed = (span.start + span.count) * SHORT_RECORD_SIZE as u64;
        if len < needed {
            let position = self.store.index().shard_base(span.shard) as u64 + len / SHORT_RECORD_SIZE as u64;
            return Err(StoreError::CorruptStore {
                shard: span.shard,
                id: id_at(self.store.index(), position),
            });
        }
        Ok(())
    }

    fn corrupt_or_io(&self, err: io::Error, span: &ShardSpan) -> StoreError {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            StoreError::CorruptStore {
                shard: span.shard,
                id: span.first_id,
            }
        } else {
            err.into()
        }
    }
}

/// Records of one shard touched by a patch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ShardSpan {
    shard: u32,
    first_id: FragId,
    /// First record, counted from the start of the shard file
    start: u64,
    count: u64,
}

/// Split ids `lo..=hi` into per-shard record spans
fn shard_spans(index: &OffsetIndex, lo: FragId, hi: FragId) -> Vec<ShardSpan> {
    let mut spans = Vec::new();
    for shard in index.shard_of(lo)..=index.shard_of(hi) {
        let Some((shard_lo, shard_hi)) = index.shard_id_range(shard) else {
            continue;
        };
        let first = lo.max(shard_lo);
        let last = hi.min(shard_hi);
        spans.push(ShardSpan {
            shard,
            first_id: first,
            start: index.position_in_shard(first) as u64,
            count: (index.start(last + 1) - index.start(first)) as u64,
        });
    }
    spans
}

/// Id owning the record at logical `position`
fn id_at(index: &OffsetIndex, position: u64) -> FragId {
    let offsets = index.offsets();
    let after = offsets.partition_point(|&o| o as u64 <= position);
    after.saturating_sub(1).min(index.max_id() as usize) as FragId
}

/// Read-modify-write `count` records starting at record `start`, one chunk at a time
///
/// `patch` edits a chunk's bytes and returns whether it must be written back.
fn rewrite_records<F>(file: &mut File, start: u64, count: u64, chunk_records: usize, mut patch: F) -> io::Result<()>
where
    F: FnMut(&mut [u8]) -> bool,
{
    let mut buf = vec![0u8; chunk_records * SHORT_RECORD_SIZE];
    let mut done = 0u64;
    while done < count {
        let n = (count - done).min(chunk_records as u64) as usize;
        let bytes = &mut buf[..n * SHORT_RECORD_SIZE];
        let pos = (start + done) * SHORT_RECORD_SIZE as u64;

        file.seek(SeekFrom::Start(pos))?;
        file.read_exact(bytes)?;
        if patch(bytes) {
            file.seek(SeekFrom::Start(pos))?;
            file.write_all(bytes)?;
        }
        done += n as u64;
    }
    Ok(())
}
