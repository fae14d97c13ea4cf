//! Dump command implementation - print store records as text

use anyhow::Result;
use olap_core::quality::shrink_percent;
use olap_core::{OverlapClass, OverlapRecord};
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Record filter for `olap dump`; no class flags means every class
#[derive(Debug, Clone, Default)]
pub struct DumpFilter {
    max_corr_erate: Option<u16>,
    classes: Vec<OverlapClass>,
}

impl DumpFilter {
    pub fn new(
        max_erate_percent: Option<f32>,
        five_prime: bool,
        three_prime: bool,
        contains: bool,
        contained: bool,
    ) -> Self {
        let classes = [
            (five_prime, OverlapClass::FivePrime),
            (three_prime, OverlapClass::ThreePrime),
            (contains, OverlapClass::Contains),
            (contained, OverlapClass::Contained),
        ]
        .into_iter()
        .filter_map(|(wanted, class)| wanted.then_some(class))
        .collect();

        Self {
            max_corr_erate: max_erate_percent.map(shrink_percent),
            classes,
        }
    }

    pub fn matches(&self, record: &OverlapRecord) -> bool {
        if let Some(max) = self.max_corr_erate {
            if record.corr_erate > max {
                return false;
            }
        }
        self.classes.is_empty() || self.classes.contains(&record.class())
    }
}

pub fn execute(store_dir: &Path, begin: u32, end: Option<u32>, filter: &DumpFilter) -> Result<()> {
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let printed = write_records(store_dir, begin, end, filter, &mut out)?;
    out.flush()?;
    log::debug!("Printed {printed} record(s)");
    Ok(())
}

fn write_records<W: Write>(
    store_dir: &Path,
    begin: u32,
    end: Option<u32>,
    filter: &DumpFilter,
    out: &mut W,
) -> Result<u64> {
    let store = super::open_store(store_dir)?;
    let mut printed = 0u64;
    for record in super::stream_range(&store, begin, end)? {
        let record = record?;
        if filter.matches(&record) {
            writeln!(out, "{record}")?;
            printed += 1;
        }
    }
    Ok(printed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn build_store(tmp: &Path) -> PathBuf {
        // 5'-dovetail at 2%, containment at 5%
        testing::build_store(
            tmp,
            2,
            &[
                OverlapRecord::new(1, 2, false, -10, -5, 20),
                OverlapRecord::new(3, 4, true, 3, -2, 50),
            ],
        )
    }

    fn dump(dir: &Path, begin: u32, end: Option<u32>, filter: &DumpFilter) -> Vec<String> {
        let mut buf = Vec::new();
        write_records(dir, begin, end, filter, &mut buf).unwrap();
        String::from_utf8(buf).unwrap().lines().map(str::to_string).collect()
    }

    #[test]
    fn test_dump_whole_store_in_id_order() {
        let tmp = TempDir::new().unwrap();
        let dir = build_store(tmp.path());
        let lines = dump(&dir, 1, None, &DumpFilter::default());
        assert_eq!(lines.len(), 4);
        let a_ids: Vec<u32> = lines
            .iter()
            .map(|l| l.split_whitespace().next().unwrap().parse().unwrap())
            .collect();
        assert_eq!(a_ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_dump_subrange_and_filters() {
        let tmp = TempDir::new().unwrap();
        let dir = build_store(tmp.path());

        assert_eq!(dump(&dir, 3, Some(3), &DumpFilter::default()).len(), 1);

        let low_error = DumpFilter::new(Some(2.0), false, false, false, false);
        assert_eq!(dump(&dir, 1, None, &low_error).len(), 2);

        let contains = DumpFilter::new(None, false, false, true, false);
        let lines = dump(&dir, 1, None, &contains);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].trim_start().starts_with('3'));
    }

    #[test]
    fn test_dump_of_empty_store_prints_nothing() {
        let tmp = TempDir::new().unwrap();
        let dir = testing::build_store(tmp.path(), 10, &[]);
        assert!(dump(&dir, 1, None, &DumpFilter::default()).is_empty());
    }

    #[test]
    fn test_bad_range_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let dir = build_store(tmp.path());
        let mut buf = Vec::new();
        assert!(write_records(&dir, 3, Some(9), &DumpFilter::default(), &mut buf).is_err());
    }
}
