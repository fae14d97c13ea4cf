//! Grower: ingest new overlaps and publish a new store generation
//!
//! New records are appended, by shard, to long-form spill files
//! (`new%02d.tmp`) in the output directory. When a shard's spill reaches
//! `max_batch` records, or when the grower is finished, the spilled batch is
//! read back, bucket-sorted by `a_id` and merged with the previous
//! generation's shard: for every id the old records come first, followed by
//! the new ones in ingestion order.
//!
//! Every merge publishes a complete generation. Shards are written to
//! `data%02d.tmp` and the index to `offset.tmp`; the shard files are renamed
//! into place first and the index last, so a reader never sees an index
//! describing data that is not yet on disk.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{StoreError, StoreResult};
use crate::index::{OffsetIndex, INDEX_FILE_NAME, INDEX_TMP_NAME};
use crate::record::{read_long, write_long, write_short, SHORT_RECORD_SIZE};
use crate::shard::{shard_count, shard_file_name, shard_id_range, shard_of, shard_tmp_name, spill_file_name};
use crate::store::Store;
use crate::types::{check_frag_id, FragId, OverlapRecord, PhysicalOverlap};

/// Default fragment ids per shard file
pub const DEFAULT_RECORDS_PER_SHARD: u32 = 2_000_000;

/// Tuning knobs for a grow run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrowConfig {
    /// Spilled records per shard that trigger a merge
    pub max_batch: usize,
    /// Leave shards without new records untouched instead of rewriting them
    pub save_space: bool,
    /// Numbered backup directories tried before an append gives up
    pub max_backups: u32,
}

impl Default for GrowConfig {
    fn default() -> Self {
        Self {
            max_batch: 100_000_000,
            save_space: false,
            max_backups: 10,
        }
    }
}

/// Where the grower reads the previous generation and where it publishes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrowMode {
    /// Start a new, empty store in `output`
    Create {
        output: PathBuf,
        records_per_shard: u32,
        force: bool,
    },
    /// Grow `store` in place, optionally copying it to `<store>.backNNN` first
    Append { store: PathBuf, backup: bool },
    /// Leave `input` untouched and publish the grown store to `output`
    Copy {
        input: PathBuf,
        output: PathBuf,
        force: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrowPhase {
    Collecting,
    Flushing(u32),
    Merging(u32),
    Publishing,
    Done,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrowSummary {
    /// Physical overlaps consumed, including skipped ones
    pub overlaps_read: u64,
    /// Overlaps dropped because their orientation was unknown
    pub overlaps_skipped: u64,
    /// Logical records added to the store
    pub records_written: u64,
    /// Generations published
    pub batches: u32,
    pub max_id: FragId,
    pub shards: u32,
    pub total_records: u64,
    pub backup: Option<PathBuf>,
}

struct SpillFile {
    path: PathBuf,
    writer: BufWriter<File>,
    count: usize,
}

/// Per-shard spill files for records not yet merged
struct SpillSet {
    dir: PathBuf,
    files: BTreeMap<u32, SpillFile>,
}

impl SpillSet {
    fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            files: BTreeMap::new(),
        }
    }

    /// Append `rec` to its shard's spill; returns the spill's record count
    fn push(&mut self, shard: u32, rec: &OverlapRecord) -> StoreResult<usize> {
        let spill = match self.files.entry(shard) {
            std::collections::btree_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::btree_map::Entry::Vacant(e) => {
                let path = self.dir.join(spill_file_name(shard));
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(&path)?;
                e.insert(SpillFile {
                    path,
                    writer: BufWriter::new(file),
                    count: 0,
                })
            }
        };
        write_long(&mut spill.writer, rec)?;
        spill.count += 1;
        Ok(spill.count)
    }

    /// Shards holding spilled records
    fn pending(&self) -> Vec<u32> {
        self.files
            .iter()
            .filter(|(_, spill)| spill.count > 0)
            .map(|(&shard, _)| shard)
            .collect()
    }

    /// Read back and clear the spill for `shard`
    fn take(&mut self, shard: u32) -> StoreResult<Vec<OverlapRecord>> {
        let Some(spill) = self.files.get_mut(&shard) else {
            return Ok(Vec::new());
        };
        spill.writer.flush()?;
        let file = spill.writer.get_mut();
        file.seek(SeekFrom::Start(0))?;

        let mut records = Vec::with_capacity(spill.count);
        {
            let mut reader = BufReader::new(&mut *file);
            for _ in 0..spill.count {
                records.push(read_long(&mut reader)?);
            }
        }

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        spill.count = 0;
        Ok(records)
    }

    fn remove_all(&mut self) -> StoreResult<()> {
        for (_, spill) in std::mem::take(&mut self.files) {
            drop(spill.writer);
            fs::remove_file(&spill.path)?;
        }
        Ok(())
    }
}

impl Drop for SpillSet {
    fn drop(&mut self) {
        for spill in self.files.values() {
            let _ = fs::remove_file(&spill.path);
        }
    }
}

/// Temp files staged by one publish; removed on drop unless committed
#[derive(Default)]
struct StagedFiles {
    paths: Vec<PathBuf>,
    committed: bool,
}

impl StagedFiles {
    fn track(&mut self, path: PathBuf) -> PathBuf {
        self.paths.push(path.clone());
        path
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for StagedFiles {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for path in &self.paths {
            if fs::remove_file(path).is_ok() {
                log::debug!("Removed staged file {}", path.display());
            }
        }
    }
}

/// One shard's batch, stably bucket-sorted by `a_id`
struct SortedBatch {
    lo: FragId,
    /// `bounds[i]..bounds[i + 1]` are the records of id `lo + i`
    bounds: Vec<u32>,
    records: Vec<OverlapRecord>,
}

impl SortedBatch {
    /// Counting sort over ids `lo..=hi`; ingestion order is kept within an id
    fn sort(batch: Vec<OverlapRecord>, lo: FragId, hi: FragId) -> StoreResult<Self> {
        let span = (hi - lo + 1) as usize;
        let mut bounds = vec![0u32; span + 1];
        for rec in &batch {
            if rec.a_id < lo || rec.a_id > hi {
                return Err(StoreError::invalid_input(format!(
                    "spilled record for id {} outside shard range [{lo}, {hi}]",
                    rec.a_id
                )));
            }
            bounds[(rec.a_id - lo) as usize + 1] += 1;
        }
        for i in 1..=span {
            bounds[i] += bounds[i - 1];
        }

        let mut next = bounds.clone();
        let mut order = vec![0usize; batch.len()];
        for (i, rec) in batch.iter().enumerate() {
            let slot = &mut next[(rec.a_id - lo) as usize];
            order[*slot as usize] = i;
            *slot += 1;
        }
        let records = order.into_iter().map(|i| batch[i]).collect();

        Ok(Self { lo, bounds, records })
    }

    fn records_for(&self, id: FragId) -> &[OverlapRecord] {
        let i = (id - self.lo) as usize;
        &self.records[self.bounds[i] as usize..self.bounds[i + 1] as usize]
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}

pub struct Grower {
    output: PathBuf,
    /// Directory holding the shards of `current`
    source: PathBuf,
    current: OffsetIndex,
    records_per_shard: u32,
    config: GrowConfig,
    spills: SpillSet,
    max_id_seen: FragId,
    phase: GrowPhase,
    summary: GrowSummary,
}

impl Grower {
    /// Prepare the output directory and load the previous generation, if any
    pub fn new(mode: GrowMode, config: GrowConfig) -> StoreResult<Self> {
        if config.max_batch == 0 {
            return Err(StoreError::invalid_input("max_batch must be at least 1"));
        }

        let mut backup = None;
        let (source, output, current) = match mode {
            GrowMode::Create {
                output,
                records_per_shard,
                force,
            } => {
                if records_per_shard == 0 {
                    return Err(StoreError::invalid_input("records_per_shard must be at least 1"));
                }
                prepare_output(&output, force)?;
                (output.clone(), output, OffsetIndex::empty(records_per_shard))
            }
            GrowMode::Append { store, backup: make_backup } => {
                let existing = Store::open(&store)?;
                if make_backup {
                    backup = Some(backup_store(&existing, config.max_backups)?);
                }
                let index = existing.index().clone();
                (store.clone(), store, index)
            }
            GrowMode::Copy {
                input,
                output,
                force,
            } => {
                let existing = Store::open(&input)?;
                if same_dir(&input, &output) {
                    return Err(StoreError::invalid_input(format!(
                        "input and output are both {}; grow in place with append instead",
                        input.display()
                    )));
                }
                prepare_output(&output, force)?;
                (input, output, existing.index().clone())
            }
        };

        log::info!(
            "Growing store {} (records per shard {}, previous max id {})",
            output.display(),
            current.records_per_shard(),
            current.max_id()
        );

        Ok(Self {
            spills: SpillSet::new(output.clone()),
            records_per_shard: current.records_per_shard(),
            max_id_seen: current.max_id(),
            output,
            source,
            current,
            config,
            phase: GrowPhase::Collecting,
            summary: GrowSummary {
                backup,
                ..GrowSummary::default()
            },
        })
    }

    pub fn phase(&self) -> GrowPhase {
        self.phase
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn summary(&self) -> &GrowSummary {
        &self.summary
    }

    /// Add both reciprocal records of a physical overlap
    ///
    /// Returns `false` if the overlap was skipped for unknown orientation.
    pub fn add_overlap(&mut self, overlap: &PhysicalOverlap) -> StoreResult<bool> {
        match overlap.to_records()? {
            Some((fwd, rev)) => {
                self.add_pair(fwd, rev)?;
                Ok(true)
            }
            None => {
                log::warn!(
                    "Skipping overlap {} - {} with unknown orientation",
                    overlap.a_id,
                    overlap.b_id
                );
                self.summary.overlaps_read += 1;
                self.summary.overlaps_skipped += 1;
                Ok(false)
            }
        }
    }

    /// Add an overlap already normalized into its two records
    pub fn add_pair(&mut self, fwd: OverlapRecord, rev: OverlapRecord) -> StoreResult<()> {
        self.summary.overlaps_read += 1;
        self.push(fwd)?;
        self.push(rev)
    }

    fn push(&mut self, rec: OverlapRecord) -> StoreResult<()> {
        check_frag_id(rec.a_id)?;
        check_frag_id(rec.b_id)?;
        self.max_id_seen = self.max_id_seen.max(rec.a_id).max(rec.b_id);

        let shard = shard_of(rec.a_id, self.records_per_shard);
        let count = self.spills.push(shard, &rec)?;
        self.summary.records_written += 1;

        if count >= self.config.max_batch {
            enter(&mut self.phase, GrowPhase::Flushing(shard));
            self.publish(&[shard])?;
            enter(&mut self.phase, GrowPhase::Collecting);
        }
        Ok(())
    }

    /// Merge every pending batch, publish, and remove the spill files
    pub fn finish(mut self) -> StoreResult<GrowSummary> {
        let pending = self.spills.pending();
        if !pending.is_empty() || self.summary.batches == 0 {
            self.publish(&pending)?;
        }
        self.spills.remove_all()?;
        enter(&mut self.phase, GrowPhase::Done);

        self.summary.max_id = self.current.max_id();
        self.summary.shards = self.current.shard_count();
        self.summary.total_records = self.current.total_records();
        log::info!(
            "Grow finished: {} overlaps read, {} records added, {} generation(s), {} records total",
            self.summary.overlaps_read,
            self.summary.records_written,
            self.summary.batches,
            self.summary.total_records
        );
        Ok(self.summary.clone())
    }

    /// Merge the spilled batches of `flush` into a new generation and publish it
    fn publish(&mut self, flush: &[u32]) -> StoreResult<()> {
        let rps = self.records_per_shard;
        let old = &self.current;
        let new_max = old.max_id().max(self.max_id_seen);
        let num_shards = shard_count(new_max, rps);
        let old_shards = old.shard_count();
        let old_count = |id: FragId| if id <= old.max_id() { old.count(id) } else { 0 };
        let index_tmp = self.output.join(INDEX_TMP_NAME);

        let mut offsets = Vec::with_capacity(new_max as usize + 2);
        offsets.push(0u32);
        let mut position: u64 = 0;
        let mut staged = Vec::new();
        let mut tmp_files = StagedFiles::default();

        for shard in 1..=num_shards {
            let Some((lo, hi)) = shard_id_range(shard, rps, new_max) else {
                continue;
            };

            let batch = if flush.contains(&shard) {
                enter(&mut self.phase, GrowPhase::Flushing(shard));
                let records = self.spills.take(shard)?;
                Some(SortedBatch::sort(records, lo, hi)?)
            } else {
                None
            };

            if batch.is_none() && self.config.save_space && shard <= old_shards {
                for id in lo..=hi {
                    offsets.push(to_offset(position, &index_tmp)?);
                    position += old_count(id) as u64;
                }
                if self.source != self.output {
                    tmp_files.track(self.output.join(shard_tmp_name(shard)));
                    copy_unchanged_shard(&self.source, &self.output, shard)?;
                    staged.push(shard);
                }
                log::debug!("Shard {shard}: no new records");
                continue;
            }

            enter(&mut self.phase, GrowPhase::Merging(shard));
            let tmp_path = tmp_files.track(self.output.join(shard_tmp_name(shard)));
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            let mut old_reader = if shard <= old_shards {
                Some(BufReader::new(File::open(self.source.join(shard_file_name(shard)))?))
            } else {
                None
            };

            let mut copied = 0u64;
            for id in lo..=hi {
                offsets.push(to_offset(position, &index_tmp)?);

                let n_old = old_count(id) as u64;
                if n_old > 0 {
                    let reader = old_reader
                        .as_mut()
                        .ok_or(StoreError::CorruptStore { shard, id })?;
                    let bytes = n_old * SHORT_RECORD_SIZE as u64;
                    if io::copy(&mut reader.by_ref().take(bytes), &mut writer)? != bytes {
                        return Err(StoreError::CorruptStore { shard, id });
                    }
                    copied += n_old;
                    position += n_old;
                }

                if let Some(batch) = &batch {
                    for rec in batch.records_for(id) {
                        write_short(&mut writer, rec)?;
                    }
                    position += batch.records_for(id).len() as u64;
                }
            }

            writer.flush()?;
            writer.get_ref().sync_all()?;
            log::debug!(
                "Shard {shard}: ids {lo}..={hi}, {copied} old + {} new records",
                batch.as_ref().map_or(0, SortedBatch::len)
            );
            staged.push(shard);
        }
        offsets.push(to_offset(position, &index_tmp)?);

        enter(&mut self.phase, GrowPhase::Publishing);
        let index = OffsetIndex::from_offsets(rps, offsets);
        index.save(tmp_files.track(index_tmp))?;

        for &shard in &staged {
            fs::rename(
                self.output.join(shard_tmp_name(shard)),
                self.output.join(shard_file_name(shard)),
            )?;
        }
        fs::rename(self.output.join(INDEX_TMP_NAME), self.output.join(INDEX_FILE_NAME))?;
        tmp_files.commit();

        log::info!(
            "Published generation: max_id={}, {} records in {} shards ({} rewritten)",
            index.max_id(),
            index.total_records(),
            num_shards,
            staged.len()
        );

        self.current = index;
        self.source = self.output.clone();
        self.summary.batches += 1;
        Ok(())
    }
}

fn enter(phase: &mut GrowPhase, next: GrowPhase) {
    match next {
        GrowPhase::Flushing(shard) => log::info!("Flushing batch for shard {shard}"),
        GrowPhase::Merging(shard) => log::debug!("Merging shard {shard}"),
        GrowPhase::Publishing => log::info!("Publishing new generation"),
        GrowPhase::Collecting | GrowPhase::Done => {}
    }
    *phase = next;
}

fn to_offset(position: u64, path: &Path) -> StoreResult<u32> {
    u32::try_from(position)
        .map_err(|_| StoreError::format(path, format!("record count {position} exceeds 32-bit offsets")))
}

/// Make an output directory ready for a fresh store
fn prepare_output(dir: &Path, force: bool) -> StoreResult<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
        return Ok(());
    }
    if !force {
        return Err(StoreError::invalid_input(format!(
            "output store {} already exists; use force to overwrite it",
            dir.display()
        )));
    }

    log::warn!("Removing existing store files in {}", dir.display());
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_store_file = path
            .extension()
            .is_some_and(|ext| ext == "olap" || ext == "tmp");
        if path.is_file() && is_store_file {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Stage an unchanged shard of `source` in `output`
///
/// A byte copy, not a link: the patcher rewrites shards in place, and the
/// input store must not change when the output is patched.
fn copy_unchanged_shard(source: &Path, output: &Path, shard: u32) -> StoreResult<()> {
    let to = output.join(shard_tmp_name(shard));
    fs::copy(source.join(shard_file_name(shard)), &to)?;
    File::open(&to)?.sync_all()?;
    Ok(())
}

/// Copy the store's index and shards into the first free `<store>.backNNN`
fn backup_store(store: &Store, max_backups: u32) -> StoreResult<PathBuf> {
    let base = store.dir().canonicalize()?;
    for n in 1..=max_backups {
        let mut name = OsString::from(base.as_os_str());
        name.push(format!(".back{n:03}"));
        let dir = PathBuf::from(name);
        if dir.exists() {
            continue;
        }

        fs::create_dir_all(&dir)?;
        fs::copy(store.dir().join(INDEX_FILE_NAME), dir.join(INDEX_FILE_NAME))?;
        for shard in 1..=store.index().shard_count() {
            fs::copy(store.shard_path(shard), dir.join(shard_file_name(shard)))?;
        }
        log::info!("Backed up {} to {}", store.dir().display(), dir.display());
        return Ok(dir);
    }

    Err(StoreError::invalid_input(format!(
        "no free backup directory for {} (tried {max_backups})",
        base.display()
    )))
}
