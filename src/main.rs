use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, ValueEnum};

use slidetree::convert::InputEncoding;
use slidetree::hashing::Resolution;
use slidetree::session::{self, ConfigError, RunMode, SessionConfig, Variant, Width};
use slidetree::upkeep::Upkeep;
use slidetree::Algorithm;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TreeArg {
    #[value(name = "SL")]
    Sl,
    #[value(name = "SH")]
    Sh,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AlgorithmArg {
    #[value(name = "U")]
    Ukkonen,
    #[value(name = "UB")]
    MinimizedBranching,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BenchArg {
    #[value(name = "C")]
    Construct,
    #[value(name = "T")]
    Traverse,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ResolutionArg {
    #[value(name = "C")]
    Cuckoo,
    #[value(name = "D")]
    Double,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MaintenanceArg {
    #[value(name = "B")]
    Batch,
    #[value(name = "F")]
    FialaGreene,
}

/// Sliding-window suffix tree construction.
#[derive(Parser, Debug)]
#[command(name = "slidetree")]
struct Cli {
    /// Tree implementation.
    #[arg(short = 't', value_enum)]
    tree: TreeArg,

    /// Construction algorithm: U = Ukkonen, UB = minimized branching.
    #[arg(short = 'a', value_enum)]
    algorithm: AlgorithmArg,

    /// What to do: C = construct+delete, T = construct+traverse+delete.
    #[arg(short = 'b', value_enum)]
    bench: BenchArg,

    /// Collision resolution for the SH edge table.
    #[arg(short = 'r', value_enum, default_value = "C")]
    resolution: ResolutionArg,

    /// Cuckoo hash function count.
    #[arg(short = 'c', default_value_t = 8)]
    cuckoo_functions: u32,

    /// Edge-label maintenance: B = batch, F = Fiala-Greene credit bits.
    #[arg(short = 'm', value_enum, default_value = "B")]
    maintenance: MaintenanceArg,

    /// Simple traversal format (no suffix-link targets).
    #[arg(short = 's')]
    simple: bool,

    /// Dump the traversal to a file instead of standard output.
    #[arg(short = 'd')]
    dump: Option<PathBuf>,

    /// Input encoding.
    #[arg(short = 'e', default_value = "utf-8")]
    encoding: String,

    /// Internal encoding (default ascii; ucs-2le and ucs-4le widen the
    /// code unit).
    #[arg(short = 'i')]
    internal: Option<String>,

    /// Block size in code units.
    #[arg(short = 'k', default_value_t = 8_388_608)]
    block_size: u32,

    /// Active-part scale factor.
    #[arg(short = 'A', default_value_t = 1)]
    ap_scale: u32,

    /// Window scale factor (default 2*A under batch maintenance, A+2
    /// otherwise; must exceed A).
    #[arg(short = 'S')]
    sw_scale: Option<u32>,

    /// Verbosity: 0 = warnings, 1 = progress, 2 = debug.
    #[arg(short = 'v', default_value_t = 0)]
    verbosity: u8,

    filename: PathBuf,
}

fn config_from(cli: Cli) -> Result<SessionConfig, ConfigError> {
    let mut config = SessionConfig::new(
        cli.filename,
        match cli.tree {
            TreeArg::Sl => Variant::List,
            TreeArg::Sh => Variant::Hashed,
        },
        match cli.algorithm {
            AlgorithmArg::Ukkonen => Algorithm::TopDown,
            AlgorithmArg::MinimizedBranching => Algorithm::BottomUp,
        },
    );
    config.mode = match cli.bench {
        BenchArg::Construct => RunMode::Construct,
        BenchArg::Traverse => RunMode::ConstructTraverse,
    };
    config.upkeep = match cli.maintenance {
        MaintenanceArg::Batch => Upkeep::Batch,
        MaintenanceArg::FialaGreene => Upkeep::Credit,
    };
    config.resolution = match cli.resolution {
        ResolutionArg::Cuckoo => Resolution::Cuckoo,
        ResolutionArg::Double => Resolution::Double,
    };
    config.cuckoo_functions = cli.cuckoo_functions;
    config.input_encoding = InputEncoding::parse(&cli.encoding)
        .ok_or_else(|| ConfigError::UnknownEncoding(cli.encoding.clone()))?;
    config.width = match cli.internal.as_deref() {
        None => Width::U8,
        Some(name) => match name.to_ascii_lowercase().as_str() {
            "ascii" | "latin1" => Width::U8,
            "ucs-2le" | "ucs2le" | "ucs2" => Width::U16,
            "ucs-4le" | "ucs4le" | "ucs4" => Width::U32,
            _ => return Err(ConfigError::UnknownInternalEncoding(name.to_string())),
        },
    };
    config.block_size = cli.block_size;
    config.ap_scale = cli.ap_scale;
    config.sw_scale = cli.sw_scale.unwrap_or(0);
    config.simple_traversal = cli.simple;
    config.dump = cli.dump;
    config.validate()?;
    Ok(config)
}

fn main() -> ExitCode {
    // clap would exit(2) on its own; every parse failure has to report
    // through the same status as configuration and runtime errors, with
    // only help and version output counting as success.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                clap::error::ErrorKind::DisplayHelp
                | clap::error::ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
            let _ = e.print();
            return code;
        }
    };
    env_logger::Builder::new()
        .filter_level(match cli.verbosity {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .init();

    let result = config_from(cli)
        .map_err(anyhow::Error::from)
        .and_then(|config| {
            let input = config.path.clone();
            session::run(config)
                .with_context(|| format!("building over {}", input.display()))
        });

    match result {
        Ok(summary) => {
            log::info!(
                "done: {} code units, {} blocks, {} deletions",
                summary.code_units,
                summary.blocks,
                summary.deletions
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("slidetree: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
