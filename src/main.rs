use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use seqsift::accel::ExecMode;
use seqsift::search::{self, BackendChoice, SearchConfig};

#[derive(Parser)]
#[command(name = "seqsift")]
#[command(about = "Accelerated membership queries of sequence reads against an IBF index", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    /// Compiled-in software simulator
    Simulator,
    /// Runtime-loaded probe artifact
    Hardware,
}

#[derive(Subcommand)]
enum Commands {
    /// Query reads against a prebuilt IBF index
    Search {
        /// Serialized IBF index archive
        #[arg(long, value_name = "FILE")]
        index: PathBuf,

        /// Query reads, 4-line records ('-' for stdin, .gz accepted)
        #[arg(long, value_name = "FILE")]
        queries: PathBuf,

        /// Output file ('-' for stdout)
        #[arg(short = 'o', long, value_name = "FILE", default_value = "-")]
        output: PathBuf,

        /// Precomputed threshold table, one integer per line
        #[arg(long, value_name = "FILE")]
        thresholds: PathBuf,

        /// Minimizer window size used to build the index
        #[arg(short = 'w', long, value_name = "INT", default_value = "23")]
        window: u8,

        /// K-mer size used to build the index
        #[arg(short = 'k', long, value_name = "INT", default_value = "19")]
        kmer: u8,

        /// Length of the query patterns
        #[arg(short = 'q', long, value_name = "INT")]
        pattern_len: u64,

        /// Byte budget of one batch buffer, in MiB
        #[arg(long, value_name = "INT", default_value = "64")]
        buffer_mib: usize,

        /// Number of replicated kernel instances per batch
        #[arg(long, value_name = "INT", default_value = "1")]
        replication: usize,

        /// Offload backend
        #[arg(long, value_enum, default_value = "simulator")]
        backend: BackendArg,

        /// Run the hardware artifact in emulation mode
        #[arg(long)]
        emulate: bool,

        /// Directory searched first for probe artifacts
        #[arg(long, value_name = "DIR")]
        artifact_dir: Option<PathBuf>,

        /// Report per-phase timings
        #[arg(long)]
        profile: bool,

        /// Verbosity (-v: debug, -vv: trace)
        #[arg(short = 'v', action = clap::ArgAction::Count)]
        verbosity: u8,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Search {
            index,
            queries,
            output,
            thresholds,
            window,
            kmer,
            pattern_len,
            buffer_mib,
            replication,
            backend,
            emulate,
            artifact_dir,
            profile,
            verbosity,
        } => {
            let level = match verbosity {
                0 => log::LevelFilter::Info,
                1 => log::LevelFilter::Debug,
                _ => log::LevelFilter::Trace,
            };
            env_logger::Builder::from_default_env()
                .filter_level(level)
                .format_timestamp(None)
                .format_target(false)
                .init();

            let config = SearchConfig {
                index_path: index,
                query_path: queries,
                output_path: output,
                thresholds_path: thresholds,
                window_size: window,
                kmer_size: kmer,
                pattern_len,
                buffer_mib,
                replication,
                backend: match backend {
                    BackendArg::Simulator => BackendChoice::Simulator,
                    BackendArg::Hardware => BackendChoice::Hardware,
                },
                mode: if emulate {
                    ExecMode::Emulated
                } else {
                    ExecMode::Hardware
                },
                artifact_dir,
                profile,
            };

            if let Err(e) = search::run(&config) {
                log::error!("Search failed: {e}");
                std::process::exit(1);
            }
        }
    }
}
