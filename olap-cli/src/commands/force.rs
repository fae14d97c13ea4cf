//! Force command implementation - set one corrected error rate on listed overlaps

use anyhow::{Context, Result};
use olap_core::io::read_pair_list;
use olap_core::quality::shrink_percent;
use std::path::Path;

use crate::config::Config;
use crate::error::CliError;

pub fn execute(config: &Config, store_dir: &Path, pair_path: &Path, rate_percent: f32) -> Result<()> {
    if !rate_percent.is_finite() || rate_percent < 0.0 {
        return Err(CliError::validation(format!(
            "rate must be a non-negative percentage, got {rate_percent}"
        ))
        .into());
    }
    let erate = shrink_percent(rate_percent);

    let pairs = read_pair_list(pair_path)
        .with_context(|| format!("Failed to read pair list {}", pair_path.display()))?;
    log::info!(
        "Forcing corrected error rate {:.2}% on {} listed overlap(s) in {}",
        rate_percent,
        pairs.len(),
        store_dir.display()
    );

    let mut patcher = super::open_store(store_dir)?
        .into_exclusive()
        .with_config(config.patch.clone());
    let patched = patcher
        .force(&pairs, erate)
        .with_context(|| format!("Failed to patch store {}", store_dir.display()))?;

    if (patched as usize) < pairs.len() {
        log::warn!(
            "{} listed pair(s) matched no stored overlap",
            pairs.len() - patched as usize
        );
    }
    log::info!("Rewrote {patched} record(s)");
    Ok(())
}
