//! A suffix tree over a sliding window of a streaming text.
//!
//! Unlike a suffix tree built once over a fixed string, this structure
//! absorbs new code units at one end and retires the longest suffix at the
//! other, so it always represents exactly the suffixes of a bounded window
//! moving over an arbitrarily long input.
//!
//! The pieces, bottom up:
//!
//! * [`window`] — the circular code-unit buffer, split into blocks, with
//!   the active-part bookkeeping and the single position primitive.
//! * [`convert`] / [`reader`] — streaming decoding and the producer thread
//!   feeding blocks through a bounded-channel handshake.
//! * [`tree`] — the node arenas in two representations: sibling lists
//!   (`SL`) and a hashed edge table (`SH`, cuckoo or double hashing over
//!   [`hashing`] settings sized with [`primes`]).
//! * [`engine`] — on-line Ukkonen construction adapted to circular
//!   indexing, with `delete_longest_suffix` for the retiring end.
//! * [`upkeep`] — the two edge-label maintenance disciplines that keep
//!   head positions pointing at live window cells.
//! * [`session`] — the consumer loop driving all of the above; the `check`
//!   and `traverse` modules validate and print the result.

pub mod check;
pub mod convert;
pub mod engine;
pub mod hashing;
pub mod primes;
pub mod reader;
pub mod session;
pub mod traverse;
pub mod tree;
pub mod unit;
pub mod upkeep;
pub mod window;

pub use engine::{Algorithm, Engine};
pub use session::{run, RunMode, SessionConfig, Summary, Variant, Width};
pub use tree::{hashed::HashedTree, list::ListTree, BranchId, LeafId, NodeRef, TreeStore};
pub use unit::CodeUnit;
pub use upkeep::Upkeep;
pub use window::Window;
