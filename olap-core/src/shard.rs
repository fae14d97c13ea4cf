//! Shard naming and sizing
//!
//! Shard `k` (1-based) owns fragment ids
//! `[(k - 1) * records_per_shard + 1, k * records_per_shard]`.

use crate::types::FragId;

/// Shard file holding the published records for shard `k`
pub fn shard_file_name(shard: u32) -> String {
    format!("data{:02}.olap", shard)
}

/// Shard file being written for the next generation
pub fn shard_tmp_name(shard: u32) -> String {
    format!("data{:02}.tmp", shard)
}

/// Spill file collecting new long records for shard `k`
pub fn spill_file_name(shard: u32) -> String {
    format!("new{:02}.tmp", shard)
}

/// Shard number that owns `id`
pub fn shard_of(id: FragId, records_per_shard: u32) -> u32 {
    debug_assert!(id > 0 && records_per_shard > 0);
    (id - 1) / records_per_shard + 1
}

/// Number of shards needed to cover ids `1..=max_id`
pub fn shard_count(max_id: FragId, records_per_shard: u32) -> u32 {
    max_id.div_ceil(records_per_shard)
}

/// Ids owned by shard `k`, clipped to `max_id`; `None` if the shard is empty
pub fn shard_id_range(shard: u32, records_per_shard: u32, max_id: FragId) -> Option<(FragId, FragId)> {
    let lo = (shard - 1) as u64 * records_per_shard as u64 + 1;
    let hi = (shard as u64 * records_per_shard as u64).min(max_id as u64);
    if lo > hi {
        None
    } else {
        Some((lo as FragId, hi as FragId))
    }
}
