//! One construction session: window, reader, engine and upkeep wired
//! together over a single input.
//!
//! The consumer loop receives blocks in circular order and folds each code
//! unit into the tree with one `prolong_suffixes`, followed by one
//! `delete_longest_suffix` once the active part is saturated. Every
//! `ap_scale` processed blocks the batch refresh runs (batch mode) and
//! blocks whose cells can no longer be referenced are recycled to the
//! reader — release happens before the next receive, which keeps the
//! pipeline moving at the tight `sw = 2·ap` sizing.
//!
//! Block positions are tracked as monotonically growing global unit
//! counts; only the window and the tree think circularly.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use log::{debug, info};

use crate::convert::InputEncoding;
use crate::engine::{Algorithm, Engine, EngineError};
use crate::hashing::Resolution;
use crate::reader::{ReadError, Reader};
use crate::traverse;
use crate::tree::hashed::HashedTree;
use crate::tree::list::ListTree;
use crate::tree::{TreeError, TreeStore};
use crate::unit::CodeUnit;
use crate::upkeep::Upkeep;
use crate::window::{BlockState, Window, WindowError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Sibling lists (SL).
    List,
    /// Hashed children (SH).
    Hashed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    U8,
    U16,
    U32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Construct, then delete back to the empty window.
    Construct,
    /// Construct, traverse, then delete.
    ConstructTraverse,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub path: PathBuf,
    pub variant: Variant,
    pub algorithm: Algorithm,
    pub upkeep: Upkeep,
    pub resolution: Resolution,
    pub cuckoo_functions: u32,
    pub input_encoding: InputEncoding,
    pub width: Width,
    pub block_size: u32,
    pub ap_scale: u32,
    pub sw_scale: u32,
    pub mode: RunMode,
    pub simple_traversal: bool,
    pub dump: Option<PathBuf>,
}

impl SessionConfig {
    /// Defaults per the driver contract: 8 MiC blocks, active part of one
    /// block, window scale derived from the maintenance mode.
    pub fn new(path: PathBuf, variant: Variant, algorithm: Algorithm) -> Self {
        SessionConfig {
            path,
            variant,
            algorithm,
            upkeep: Upkeep::Batch,
            resolution: Resolution::Cuckoo,
            cuckoo_functions: 8,
            input_encoding: InputEncoding::Utf8,
            width: Width::U8,
            block_size: 8 * 1024 * 1024,
            ap_scale: 1,
            sw_scale: 0, // 0: derive in validate()
            mode: RunMode::Construct,
            simple_traversal: false,
            dump: None,
        }
    }

    /// Resolve derived values and reject inconsistent settings.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.ap_scale == 0 {
            return Err(ConfigError::ZeroScale);
        }
        if self.sw_scale == 0 {
            self.sw_scale = match self.upkeep {
                Upkeep::Batch => 2 * self.ap_scale,
                Upkeep::Credit => self.ap_scale + 2,
            };
        }
        if self.sw_scale <= self.ap_scale {
            return Err(ConfigError::ScaleOrder {
                ap_scale: self.ap_scale,
                sw_scale: self.sw_scale,
            });
        }
        if self.upkeep.is_batch() && self.sw_scale < 2 * self.ap_scale {
            return Err(ConfigError::BatchScale {
                ap_scale: self.ap_scale,
                sw_scale: self.sw_scale,
            });
        }
        if self.cuckoo_functions < 2 {
            return Err(ConfigError::FewFunctions {
                requested: self.cuckoo_functions,
            });
        }
        if self.dump.is_some() && self.mode != RunMode::ConstructTraverse {
            return Err(ConfigError::DumpWithoutTraversal);
        }
        Ok(())
    }

    fn max_ap(&self) -> u32 {
        self.block_size * self.ap_scale
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ZeroScale,
    ScaleOrder { ap_scale: u32, sw_scale: u32 },
    /// Batch maintenance needs a full retired window of slack.
    BatchScale { ap_scale: u32, sw_scale: u32 },
    FewFunctions { requested: u32 },
    DumpWithoutTraversal,
    UnknownEncoding(String),
    UnknownInternalEncoding(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroScale => write!(f, "scale factors must be at least 1"),
            ConfigError::ScaleOrder { ap_scale, sw_scale } => write!(
                f,
                "window scale {} must exceed active-part scale {}",
                sw_scale, ap_scale
            ),
            ConfigError::BatchScale { ap_scale, sw_scale } => write!(
                f,
                "batch maintenance needs window scale >= {}, got {}",
                2 * ap_scale,
                sw_scale
            ),
            ConfigError::FewFunctions { requested } => {
                write!(f, "cuckoo hashing needs at least 2 functions, got {}", requested)
            }
            ConfigError::DumpWithoutTraversal => {
                write!(f, "a traversal dump needs the traversal run mode")
            }
            ConfigError::UnknownEncoding(name) => write!(f, "unknown input encoding {:?}", name),
            ConfigError::UnknownInternalEncoding(name) => {
                write!(f, "unknown internal encoding {:?}", name)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug)]
pub enum SessionError {
    Config(ConfigError),
    Window(WindowError),
    Read(ReadError),
    Engine(EngineError),
    Tree(TreeError),
    Io(std::io::Error),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Config(e) => write!(f, "configuration: {}", e),
            SessionError::Window(e) => write!(f, "window: {}", e),
            SessionError::Read(e) => write!(f, "reader: {}", e),
            SessionError::Engine(e) => write!(f, "construction: {}", e),
            SessionError::Tree(e) => write!(f, "tree: {}", e),
            SessionError::Io(e) => write!(f, "i/o: {}", e),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<ConfigError> for SessionError {
    fn from(e: ConfigError) -> Self {
        SessionError::Config(e)
    }
}

impl From<WindowError> for SessionError {
    fn from(e: WindowError) -> Self {
        SessionError::Window(e)
    }
}

impl From<ReadError> for SessionError {
    fn from(e: ReadError) -> Self {
        SessionError::Read(e)
    }
}

impl From<EngineError> for SessionError {
    fn from(e: EngineError) -> Self {
        SessionError::Engine(e)
    }
}

impl From<TreeError> for SessionError {
    fn from(e: TreeError) -> Self {
        SessionError::Tree(e)
    }
}

impl From<std::io::Error> for SessionError {
    fn from(e: std::io::Error) -> Self {
        SessionError::Io(e)
    }
}

/// What a finished session reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct Summary {
    pub code_units: u64,
    pub blocks: u64,
    pub deletions: u64,
    /// Peak live node counts, observed at the end of construction.
    pub branches: u32,
    pub leaves: u32,
}

/// Run a fully validated configuration to completion.
pub fn run(mut config: SessionConfig) -> Result<Summary, SessionError> {
    config.validate()?;
    match (config.width, config.variant) {
        (Width::U8, Variant::List) => {
            let tree = ListTree::<u8>::new(config.max_ap() + 1);
            run_typed(&config, tree)
        }
        (Width::U8, Variant::Hashed) => {
            let tree = hashed_tree::<u8>(&config)?;
            run_typed(&config, tree)
        }
        (Width::U16, Variant::List) => {
            let tree = ListTree::<u16>::new(config.max_ap() + 1);
            run_typed(&config, tree)
        }
        (Width::U16, Variant::Hashed) => {
            let tree = hashed_tree::<u16>(&config)?;
            run_typed(&config, tree)
        }
        (Width::U32, Variant::List) => {
            let tree = ListTree::<u32>::new(config.max_ap() + 1);
            run_typed(&config, tree)
        }
        (Width::U32, Variant::Hashed) => {
            let tree = hashed_tree::<u32>(&config)?;
            run_typed(&config, tree)
        }
    }
}

fn hashed_tree<C: CodeUnit>(config: &SessionConfig) -> Result<HashedTree<C>, SessionError> {
    let edges = 2 * (config.max_ap() as usize + 2);
    Ok(HashedTree::new(
        config.max_ap() + 1,
        config.resolution,
        config.cuckoo_functions,
        edges,
    )?)
}

fn run_typed<C: CodeUnit, S: TreeStore<C>>(
    config: &SessionConfig,
    mut tree: S,
) -> Result<Summary, SessionError> {
    let mut window = Window::<C>::new(config.block_size, config.ap_scale, config.sw_scale)?;
    let reader = Reader::spawn::<C>(
        &config.path,
        config.input_encoding,
        window.cells(),
        window.geometry(),
    )?;
    let mut engine = Engine::new(config.algorithm, config.upkeep);
    let max_ap = window.max_ap();
    let block_size = config.block_size as u64;
    let sw_blocks = config.sw_scale as u64;

    let mut summary = Summary::default();
    let mut global_units: u64 = 0;
    let mut next_release: u64 = 0; // global block index
    let mut processed_blocks: u64 = 0;

    loop {
        let block = reader.recv()?;
        window.set_block_state(block.index, BlockState::ReadUnprocessed);
        debug_assert_eq!(block.index as u64, processed_blocks % sw_blocks);
        for _ in 0..block.units {
            window.grow_ap();
            engine.prolong_suffixes(&mut tree, &window)?;
            if window.ap_size > max_ap {
                engine.delete_longest_suffix(&mut tree, &mut window)?;
                summary.deletions += 1;
            }
            global_units += 1;
        }
        window.set_block_state(block.index, BlockState::StillInUse);
        processed_blocks += 1;
        summary.blocks = processed_blocks;
        summary.code_units = global_units;
        debug!(
            "block {} processed ({} units, {} leaves, {} branches)",
            processed_blocks,
            global_units,
            tree.leaf_count(),
            tree.branch_count()
        );

        let boundary_refresh =
            config.upkeep.is_batch() && processed_blocks % config.ap_scale as u64 == 0;
        if boundary_refresh {
            config.upkeep.batch_refresh(&mut tree, &window);
        }
        // recycle expired blocks before blocking on the next one
        if boundary_refresh || !config.upkeep.is_batch() {
            let global_begin = global_units - window.ap_size as u64;
            while (next_release + 1) * block_size <= global_begin {
                let index = (next_release % sw_blocks) as u32;
                window.set_block_state(index, BlockState::Unknown);
                reader.release(index);
                next_release += 1;
            }
        }
        if block.last {
            break;
        }
    }

    summary.branches = tree.branch_count();
    summary.leaves = tree.leaf_count();
    info!(
        "construction done: {} units in {} blocks, {} branching nodes, {} leaves",
        summary.code_units, summary.blocks, summary.branches, summary.leaves
    );

    if config.mode == RunMode::ConstructTraverse {
        match &config.dump {
            Some(path) => {
                let mut out = BufWriter::new(File::create(path)?);
                traverse::write_edges(&tree, &window, &mut out, config.simple_traversal)?;
                out.flush()?;
            }
            None => {
                let stdout = std::io::stdout();
                let mut out = BufWriter::new(stdout.lock());
                traverse::write_edges(&tree, &window, &mut out, config.simple_traversal)?;
                out.flush()?;
            }
        }
    }

    // shrink back to the empty window
    while tree.leaf_count() > 0 {
        engine.delete_longest_suffix(&mut tree, &mut window)?;
        summary.deletions += 1;
    }
    info!("tree deleted, {} deletions total", summary.deletions);
    Ok(summary)
}
