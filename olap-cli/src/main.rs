use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

mod commands;
mod config;
mod error;

use config::Config;

#[derive(Parser)]
#[command(name = "olap")]
#[command(about = "olap - sharded overlap store for whole-genome shotgun assembly")]
#[command(version)]
#[command(long_about = "
olap builds, inspects and patches overlap stores: sharded, append-only binary
databases of pairwise fragment overlaps indexed by fragment id.

Examples:
  olap grow --output asm.ovlStore batch1.ovl.gz batch2.ovl.gz
  olap grow --mode append --output asm.ovlStore --backup -L more_batches.list
  olap dump asm.ovlStore --begin 100 --end 200 --max-erate 4.5
  olap stats asm.ovlStore --verify
  olap update asm.ovlStore corrected.erates
  olap force asm.ovlStore pairs.txt 1.5
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build a new store or grow an existing one from overlap files
    Grow {
        /// How the output relates to an existing store
        #[arg(long, value_enum, default_value = "create")]
        mode: GrowModeArg,

        /// Existing store to read (copy mode, or append instead of --output)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Store directory to write
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// File listing overlap files, one path per line
        #[arg(short = 'L', long = "list")]
        lists: Vec<PathBuf>,

        /// Overlap files in dump format (as printed by 'olap dump')
        #[arg(short = 'D', long = "dump")]
        dumps: Vec<PathBuf>,

        /// Overlap message files ({OVL ...} records, optionally gzipped)
        files: Vec<PathBuf>,

        /// Replace an existing output directory
        #[arg(long)]
        force: bool,

        /// Copy the store to <store>.backNNN before appending
        #[arg(long, conflicts_with = "no_backup")]
        backup: bool,

        /// Append without making a backup (the default)
        #[arg(long)]
        no_backup: bool,

        /// Leave shards that receive no new records untouched
        #[arg(long)]
        save_space: bool,

        /// Fragment ids per shard for a new store
        #[arg(long)]
        records_per_shard: Option<u32>,

        /// Spilled records per shard that trigger a merge
        #[arg(long)]
        max_batch: Option<usize>,
    },

    /// Print overlaps of a store in id order
    Dump {
        /// Store directory
        store: PathBuf,

        /// First fragment id
        #[arg(short, long, default_value = "1")]
        begin: u32,

        /// Last fragment id (defaults to the store's last id)
        #[arg(short, long)]
        end: Option<u32>,

        /// Keep records whose corrected error rate is at most this percentage
        #[arg(long)]
        max_erate: Option<f32>,

        /// Keep 5'-dovetail overlaps
        #[arg(long = "5p")]
        five_prime: bool,

        /// Keep 3'-dovetail overlaps
        #[arg(long = "3p")]
        three_prime: bool,

        /// Keep overlaps where A contains B
        #[arg(long)]
        contains: bool,

        /// Keep overlaps where B contains A
        #[arg(long)]
        contained: bool,
    },

    /// Summarize the overlaps of a store
    Stats {
        /// Store directory
        store: PathBuf,

        /// First fragment id
        #[arg(short, long, default_value = "1")]
        begin: u32,

        /// Last fragment id (defaults to the store's last id)
        #[arg(short, long)]
        end: Option<u32>,

        /// Check shard file sizes against the offset index
        #[arg(long)]
        verify: bool,
    },

    /// Replace corrected error rates of an id range from an erate file
    Update {
        /// Store directory
        store: PathBuf,

        /// Binary erate file (lo_id, hi_id, count, then count u16 values)
        erates: PathBuf,
    },

    /// Set the corrected error rate of listed (a_id, b_id) overlaps
    Force {
        /// Store directory
        store: PathBuf,

        /// Whitespace-separated a_id b_id pairs, sorted by a_id
        pairs: PathBuf,

        /// New corrected error rate, in percent
        rate: f32,
    },

    /// Show or generate configuration
    Config {
        /// Print the default configuration as TOML
        #[arg(long)]
        example: bool,

        /// Write the effective configuration to a file
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrowModeArg {
    Create,
    Append,
    Copy,
}

fn setup_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Grow {
            mode,
            input,
            output,
            lists,
            dumps,
            files,
            force,
            backup,
            no_backup,
            save_space,
            records_per_shard,
            max_batch,
        } => {
            let options = commands::grow::GrowOptions {
                mode,
                input,
                output,
                lists,
                dumps,
                files,
                force,
                backup: backup && !no_backup,
                save_space,
                records_per_shard,
                max_batch,
                progress: !cli.quiet,
            };
            commands::grow::execute(&config, options)
        }

        Commands::Dump {
            store,
            begin,
            end,
            max_erate,
            five_prime,
            three_prime,
            contains,
            contained,
        } => {
            let filter = commands::dump::DumpFilter::new(
                max_erate,
                five_prime,
                three_prime,
                contains,
                contained,
            );
            commands::dump::execute(&store, begin, end, &filter)
        }

        Commands::Stats {
            store,
            begin,
            end,
            verify,
        } => commands::stats::execute(&store, begin, end, verify),

        Commands::Update { store, erates } => commands::update::execute(&config, &store, &erates),

        Commands::Force { store, pairs, rate } => {
            commands::force::execute(&config, &store, &pairs, rate)
        }

        Commands::Config { example, save } => commands::config::execute(&config, example, save),
    }
}

fn main() {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    if let Err(err) = run(cli) {
        error::print_error_and_exit(&err);
    }
}
