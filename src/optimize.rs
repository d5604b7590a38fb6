//! Rebuilds a map into a fresh directory, defragmenting block layout (every
//! list's values become contiguous) and garbage-collecting tombstones.
//! See `operations.hpp`'s `optimize()` in the original and spec.md §6's
//! `optimize` CLI command, which this module backs.

use std::path::Path;

use crate::error::Result;
use crate::map::Map;
use crate::options::Options;

#[derive(Clone, Debug, Default)]
pub struct OptimizeOptions {
	pub block_size: Option<u32>,
	pub num_shards: Option<u16>,
}

/// Opens `source` read-only, writes every live value for every key into a
/// freshly created map at `target`, then closes both. Tombstoned values are
/// dropped (they were never yielded by the source's iterator); values for
/// one key land in a single contiguous run of freshly allocated blocks.
pub fn optimize(source: &Path, target: &Path, options: OptimizeOptions) -> Result<()> {
	let source_map = Map::open(&Options::new(source).read_only(true))?;

	let mut target_options = Options::new(target).create_if_missing(true).error_if_exists(true);
	if let Some(block_size) = options.block_size {
		target_options = target_options.block_size(block_size);
	}
	if let Some(num_shards) = options.num_shards {
		target_options = target_options.num_shards(num_shards);
	}
	let target_map = Map::open(&target_options)?;

	let mut keys = Vec::new();
	source_map.for_each_key(|k| keys.push(k.to_vec()));
	for key in &keys {
		for value in source_map.get(key)? {
			target_map.put(key, &value)?;
		}
	}

	target_map.close()?;
	Ok(())
}
