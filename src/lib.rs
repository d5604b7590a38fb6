//! An on-disk, persistent one-to-many key-value store: each key maps to an
//! ordered, append-only sequence of opaque byte values.
//!
//! The engine shards keys across independent [`Partition`]s, each backed by
//! its own memory-mapped append log ([`Store`]) and hash-indexed list table.
//! See `SPEC_FULL.md` for the full design.

mod arena;
mod block;
mod descriptor;
mod error;
mod iterator;
mod list;
mod lock;
mod map;
mod options;
mod partition;
mod sink;
mod stats;
mod store;
mod sys;
mod uint_vector;
mod varint;

pub use error::{Error, Result};
pub use iterator::{ListIter, ListIterMut};
pub use list::List;
pub use map::Map;
pub use options::Options;
pub use partition::{Partition, MAX_KEY_SIZE};
pub use sink::BlockSink;
pub use stats::Stats;
pub use store::{BlockId, Store};

pub mod optimize;
