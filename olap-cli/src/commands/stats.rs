//! Stats command implementation - summarize the records of a store range

use anyhow::{Context, Result};
use olap_core::quality::expand_percent;
use olap_core::{OverlapClass, OverlapRecord};
use std::fmt;
use std::path::Path;

/// Running min / max / sum of a quantized error rate
#[derive(Debug, Clone, Copy, Default)]
struct ErateSummary {
    min: u16,
    max: u16,
    sum: u64,
}

impl ErateSummary {
    fn add(&mut self, q: u16, first: bool) {
        if first {
            self.min = q;
            self.max = q;
        } else {
            self.min = self.min.min(q);
            self.max = self.max.max(q);
        }
        self.sum += q as u64;
    }

    fn mean_percent(&self, n: u64) -> f64 {
        if n == 0 {
            0.0
        } else {
            expand_percent(1) as f64 * self.sum as f64 / n as f64
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub records: u64,
    /// Ids with at least one overlap
    pub ids_with_overlaps: u64,
    pub five_prime: u64,
    pub three_prime: u64,
    pub contains: u64,
    pub contained: u64,
    orig: ErateSummary,
    corr: ErateSummary,
    last_a_id: Option<u32>,
}

impl StoreStats {
    pub fn add(&mut self, record: &OverlapRecord) {
        let first = self.records == 0;
        self.records += 1;
        if self.last_a_id != Some(record.a_id) {
            self.ids_with_overlaps += 1;
            self.last_a_id = Some(record.a_id);
        }
        match record.class() {
            OverlapClass::FivePrime => self.five_prime += 1,
            OverlapClass::ThreePrime => self.three_prime += 1,
            OverlapClass::Contains => self.contains += 1,
            OverlapClass::Contained => self.contained += 1,
        }
        self.orig.add(record.orig_erate, first);
        self.corr.add(record.corr_erate, first);
    }

    pub fn mean_orig_percent(&self) -> f64 {
        self.orig.mean_percent(self.records)
    }

    pub fn mean_corr_percent(&self) -> f64 {
        self.corr.mean_percent(self.records)
    }
}

impl fmt::Display for StoreStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "records:            {}", self.records)?;
        writeln!(f, "ids with overlaps:  {}", self.ids_with_overlaps)?;
        writeln!(f, "  {:<12} {}", OverlapClass::FivePrime.label(), self.five_prime)?;
        writeln!(f, "  {:<12} {}", OverlapClass::ThreePrime.label(), self.three_prime)?;
        writeln!(f, "  {:<12} {}", OverlapClass::Contains.label(), self.contains)?;
        writeln!(f, "  {:<12} {}", OverlapClass::Contained.label(), self.contained)?;
        if self.records > 0 {
            writeln!(
                f,
                "orig erate %:       min {:.2} mean {:.2} max {:.2}",
                expand_percent(self.orig.min),
                self.mean_orig_percent(),
                expand_percent(self.orig.max)
            )?;
            write!(
                f,
                "corr erate %:       min {:.2} mean {:.2} max {:.2}",
                expand_percent(self.corr.min),
                self.mean_corr_percent(),
                expand_percent(self.corr.max)
            )?;
        }
        Ok(())
    }
}

pub fn execute(store_dir: &Path, begin: u32, end: Option<u32>, verify: bool) -> Result<()> {
    let stats = collect(store_dir, begin, end, verify)?;
    println!("{stats}");
    Ok(())
}

fn collect(store_dir: &Path, begin: u32, end: Option<u32>, verify: bool) -> Result<StoreStats> {
    let store = super::open_store(store_dir)?;
    log::info!(
        "Store {}: last id {}, {} records in {} shard(s) of {} ids",
        store_dir.display(),
        store.last_id(),
        store.total_records(),
        store.index().shard_count(),
        store.records_per_shard()
    );

    if verify {
        store
            .verify_shard_sizes()
            .context("Shard sizes do not match the offset index")?;
        log::info!("All shard sizes match the offset index");
    }

    let mut stats = StoreStats::default();
    for record in super::stream_range(&store, begin, end)? {
        stats.add(&record?);
    }
    Ok(stats)
}
