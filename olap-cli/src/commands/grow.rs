//! Grow command implementation - ingest overlap files into a store

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use olap_core::io::{read_list_file, DumpReader, OvlReader};
use olap_core::{GrowMode, Grower};
use std::path::PathBuf;

use crate::config::Config;
use crate::error::CliError;
use crate::GrowModeArg;

const PROGRESS_EVERY: u64 = 100_000;

/// Grow arguments as parsed from the command line
#[derive(Debug, Clone)]
pub struct GrowOptions {
    pub mode: GrowModeArg,
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub lists: Vec<PathBuf>,
    pub dumps: Vec<PathBuf>,
    pub files: Vec<PathBuf>,
    pub force: bool,
    pub backup: bool,
    pub save_space: bool,
    pub records_per_shard: Option<u32>,
    pub max_batch: Option<usize>,
    pub progress: bool,
}

pub fn execute(config: &Config, options: GrowOptions) -> Result<()> {
    let mode = resolve_mode(config, &options)?;

    let mut ovl_files = options.files.clone();
    for list in &options.lists {
        let listed = read_list_file(list)
            .with_context(|| format!("Failed to read list file: {}", list.display()))?;
        log::debug!("{} lists {} overlap file(s)", list.display(), listed.len());
        ovl_files.extend(listed);
    }
    for path in ovl_files.iter().chain(&options.dumps) {
        if !path.exists() {
            return Err(CliError::file_not_found(path.clone()).into());
        }
    }
    if ovl_files.is_empty() && options.dumps.is_empty() {
        log::warn!("No overlap files given; publishing the store unchanged");
    }

    let mut grow_config = config.grow.clone();
    if let Some(max_batch) = options.max_batch {
        grow_config.max_batch = max_batch;
    }
    grow_config.save_space |= options.save_space;

    let mut grower = Grower::new(mode, grow_config).context("Failed to prepare the output store")?;
    let progress = options.progress.then(spinner);

    for path in &ovl_files {
        log::info!("Reading overlap messages from {}", path.display());
        for overlap in OvlReader::open(path)? {
            let overlap = overlap.with_context(|| format!("Failed to read {}", path.display()))?;
            grower.add_overlap(&overlap)?;
            tick(progress.as_ref(), &grower);
        }
    }
    for path in &options.dumps {
        log::info!("Reading dump-format overlaps from {}", path.display());
        for pair in DumpReader::open(path)? {
            let (fwd, rev) = pair.with_context(|| format!("Failed to read {}", path.display()))?;
            grower.add_pair(fwd, rev)?;
            tick(progress.as_ref(), &grower);
        }
    }

    if let Some(pb) = &progress {
        pb.set_message("Merging and publishing...");
    }
    let output = grower.output().to_path_buf();
    let summary = grower
        .finish()
        .with_context(|| format!("Failed to grow store {}", output.display()))?;
    if let Some(pb) = progress {
        pb.finish_with_message(format!("Read {} overlaps", summary.overlaps_read));
    }

    if let Some(backup) = &summary.backup {
        log::info!("Backup written to {}", backup.display());
    }
    if summary.overlaps_skipped > 0 {
        log::warn!("{} overlap(s) skipped for unknown orientation", summary.overlaps_skipped);
    }
    log::info!(
        "Store {}: last id {}, {} shard(s), {} records",
        output.display(),
        summary.max_id,
        summary.shards,
        summary.total_records
    );

    Ok(())
}

/// Turn the mode flags into a [`GrowMode`], rejecting combinations it cannot express
pub fn resolve_mode(config: &Config, options: &GrowOptions) -> Result<GrowMode> {
    if options.backup && options.mode != GrowModeArg::Append {
        return Err(CliError::validation("--backup is only meaningful with --mode append").into());
    }

    let mode = match options.mode {
        GrowModeArg::Create => {
            if options.input.is_some() {
                return Err(CliError::validation("--input needs --mode copy or --mode append").into());
            }
            let output = options
                .output
                .clone()
                .ok_or_else(|| CliError::validation("--output is required to create a store"))?;
            GrowMode::Create {
                output,
                records_per_shard: options
                    .records_per_shard
                    .unwrap_or(config.store.records_per_shard),
                force: options.force,
            }
        }
        GrowModeArg::Append => {
            if options.force {
                return Err(CliError::validation("--force cannot be used when appending").into());
            }
            let store = match (&options.input, &options.output) {
                (Some(input), Some(output)) if input != output => {
                    return Err(CliError::validation(
                        "append grows one store in place; use --mode copy for a separate output",
                    )
                    .into());
                }
                (Some(dir), _) | (None, Some(dir)) => dir.clone(),
                (None, None) => {
                    return Err(CliError::validation("--output names the store to append to").into());
                }
            };
            GrowMode::Append {
                store,
                backup: options.backup,
            }
        }
        GrowModeArg::Copy => {
            let (Some(input), Some(output)) = (&options.input, &options.output) else {
                return Err(CliError::validation("--mode copy needs both --input and --output").into());
            };
            GrowMode::Copy {
                input: input.clone(),
                output: output.clone(),
                force: options.force,
            }
        }
    };

    if options.records_per_shard.is_some() && options.mode != GrowModeArg::Create {
        log::warn!("--records-per-shard is ignored; an existing store keeps its shard size");
    }

    Ok(mode)
}

fn spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message("Reading overlaps...");
    pb
}

fn tick(progress: Option<&ProgressBar>, grower: &Grower) {
    let read = grower.summary().overlaps_read;
    if let Some(pb) = progress {
        if read % PROGRESS_EVERY == 0 {
            pb.set_message(format!("Read {read} overlaps"));
        }
    }
}
