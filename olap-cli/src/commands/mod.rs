//! Command implementations for the olap CLI

pub mod config;
pub mod dump;
pub mod force;
pub mod grow;
pub mod stats;
pub mod update;

use anyhow::{Context, Result};
use olap_core::{OverlapStream, Store};
use std::path::Path;

pub(crate) fn open_store(path: &Path) -> Result<Store> {
    Store::open(path).with_context(|| format!("Failed to open store {}", path.display()))
}

/// Stream `begin..=end`, where a missing `end` means the store's last id
///
/// An empty store with no explicit end yields nothing instead of a range error.
pub(crate) fn stream_range(store: &Store, begin: u32, end: Option<u32>) -> Result<OverlapStream<'_>> {
    let stream = match end {
        None if store.last_id() == 0 => store.stream_all()?,
        None => store.stream(begin, store.last_id())?,
        Some(end) => store.stream(begin, end)?,
    };
    Ok(stream)
}
