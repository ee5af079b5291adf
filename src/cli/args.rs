use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "satellite-ingest")]
#[command(about = "Satellite indicator ingestion for the Mesonet station network")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Suppress progress bars")]
    pub quiet: bool,

    #[arg(long, global = true, help = "Settings file (TOML); environment wins")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Close the gap between the store's latest observations and today
    Update {
        #[arg(long, help = "Re-extract from the historical epoch instead of the latest timestamps")]
        backfill: bool,

        #[arg(short, long, num_args = 1.., help = "Restrict extraction to these stations")]
        stations: Option<Vec<String>>,

        #[arg(short, long, help = "Download directory [default: a temporary directory]")]
        workdir: Option<PathBuf>,

        #[arg(long, help = "Seconds between polling passes [default: from settings]")]
        poll_interval: Option<u64>,

        #[arg(long, help = "Give up after this many polling passes [default: wait forever]")]
        max_attempts: Option<u32>,
    },

    /// Backfill new stations, copying from a collocated partner where one exists
    Backfill {
        #[arg(
            short,
            long,
            num_args = 1..,
            required_unless_present = "check",
            help = "Stations to backfill, separated by spaces"
        )]
        stations: Option<Vec<String>>,

        #[arg(
            long,
            requires = "record_dates",
            help = "Scan the first-record-date file and backfill whatever needs it"
        )]
        check: bool,

        #[arg(long, help = "JSON file of {station: \"YYYY-MM-DD\"} first record dates")]
        record_dates: Option<PathBuf>,

        #[arg(short, long, help = "Download directory [default: a temporary directory]")]
        workdir: Option<PathBuf>,

        #[arg(long, help = "Seconds between polling passes [default: from settings]")]
        poll_interval: Option<u64>,

        #[arg(long, help = "Give up after this many polling passes [default: wait forever]")]
        max_attempts: Option<u32>,
    },

    /// Normalize already-downloaded export files into bulk-load chunks
    Normalize {
        #[arg(short, long, help = "Directory of raw export files")]
        input_dir: PathBuf,

        #[arg(
            short,
            long,
            help = "Directory to write chunk files to [default: the store import directory]"
        )]
        output_dir: Option<PathBuf>,

        #[arg(long, help = "Rows per chunk file [default: from settings]")]
        chunk_size: Option<usize>,
    },

    /// Create store constraints/indexes and bulk-load pre-staged chunk files
    InitDb {
        #[arg(
            short,
            long,
            help = "Directory containing the data_init chunk files [default: the store import directory]"
        )]
        dir: Option<PathBuf>,

        #[arg(
            long,
            help = "Pass filesystem paths to LOAD CSV instead of file:/// import names"
        )]
        use_path: bool,
    },

    /// Delete every remote job that is not done or expired
    StopJobs,
}
