//! Update command implementation - bulk replace corrected error rates

use anyhow::{Context, Result};
use olap_core::io::read_erate_file;
use std::path::Path;

use crate::config::Config;

pub fn execute(config: &Config, store_dir: &Path, erate_path: &Path) -> Result<()> {
    let erates = read_erate_file(erate_path)
        .with_context(|| format!("Failed to read erate file {}", erate_path.display()))?;
    log::info!(
        "Updating ids {}..={} of {} with {} corrected error rates",
        erates.lo_id,
        erates.hi_id,
        store_dir.display(),
        erates.erates.len()
    );

    let mut patcher = super::open_store(store_dir)?
        .into_exclusive()
        .with_config(config.patch.clone());
    let patched = patcher
        .update(erates.lo_id, erates.hi_id, &erates.erates)
        .with_context(|| format!("Failed to update store {}", store_dir.display()))?;

    log::info!("Rewrote {patched} record(s)");
    Ok(())
}
