// Shard router: owns the directory lock and descriptor, routes every
// operation to one of `num_shards` Partitions by key hash. See spec.md
// §4.9.

use std::fs;
use std::hash::Hasher;
use std::path::{Path, PathBuf};

use fnv::FnvHasher;

use crate::descriptor::Descriptor;
use crate::error::{Error, Result};
use crate::lock::DirectoryLock;
use crate::options::Options;
use crate::partition::Partition;
use crate::stats::Stats;

fn fnv1a_hash(key: &[u8]) -> u64 {
	let mut hasher = FnvHasher::default();
	hasher.write(key);
	hasher.finish()
}

fn shard_index(key: &[u8], num_shards: u16) -> usize {
	(fnv1a_hash(key) % num_shards as u64) as usize
}

fn prefix(shard: usize) -> String {
	format!("multimap.{}", shard)
}

#[derive(Debug)]
pub struct Map {
	_lock: DirectoryLock,
	directory: PathBuf,
	num_shards: u16,
	partitions: Vec<Partition>,
}

impl Map {
	pub fn open(options: &Options) -> Result<Map> {
		let directory = &options.directory;
		if !directory.exists() {
			if !options.create_if_missing {
				return Err(Error::NotFound(format!("directory {} does not exist", directory.display())));
			}
			fs::create_dir_all(directory)?;
		}
		let lock = DirectoryLock::acquire(directory)?;

		let descriptor_path = directory.join("multimap.id");
		let descriptor = if descriptor_path.exists() {
			if options.error_if_exists {
				return Err(Error::AlreadyExists(format!("map already exists at {}", directory.display())));
			}
			Descriptor::open(directory)?
		} else {
			if !options.create_if_missing {
				return Err(Error::NotFound(format!("descriptor missing at {}", directory.display())));
			}
			let d = Descriptor::current(options.block_size, options.num_shards);
			Descriptor::write_new(directory, d)?;
			d
		};

		let block_size = descriptor.block_size as u32;
		let num_shards = descriptor.num_shards as u16;
		let mut partitions = Vec::with_capacity(num_shards as usize);
		for shard in 0..num_shards as usize {
			partitions.push(Partition::open(
				directory,
				&prefix(shard),
				block_size,
				options.buffer_size,
				options.read_only,
				options.create_if_missing,
			)?);
		}

		log::info!(target: "multimap", "opened map {} with {} shards, block_size {}", directory.display(), num_shards, block_size);

		Ok(Map { _lock: lock, directory: directory.clone(), num_shards, partitions })
	}

	fn partition_for(&self, key: &[u8]) -> &Partition {
		&self.partitions[shard_index(key, self.num_shards)]
	}

	pub fn directory(&self) -> &Path {
		&self.directory
	}

	pub fn num_shards(&self) -> u16 {
		self.num_shards
	}

	pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
		self.partition_for(key).put(key, value)
	}

	pub fn contains(&self, key: &[u8]) -> bool {
		self.partition_for(key).contains(key)
	}

	pub fn count(&self, key: &[u8]) -> u32 {
		self.partition_for(key).count(key)
	}

	/// Reads every live value for `key` into a `Vec` under one shared lock.
	/// A thin convenience built on the shared iterator (spec.md §4.7); callers
	/// needing to hold the iterator open across other work should go through
	/// `Partition::get_list` directly.
	pub fn get(&self, key: &[u8]) -> Result<Vec<Vec<u8>>> {
		let partition = self.partition_for(key);
		match partition.get_list(key) {
			Some(list) => {
				let mut it = list.iter();
				let mut out = Vec::new();
				while let Some(v) = it.next(partition.store())? {
					out.push(v);
				}
				Ok(out)
			}
			None => Ok(Vec::new()),
		}
	}

	pub fn remove_first(&self, key: &[u8], predicate: impl FnMut(&[u8]) -> bool) -> Result<bool> {
		self.partition_for(key).remove_first(key, predicate)
	}

	pub fn remove_all(&self, key: &[u8], predicate: impl FnMut(&[u8]) -> bool) -> Result<u32> {
		self.partition_for(key).remove_all(key, predicate)
	}

	pub fn replace_first(&self, key: &[u8], map_fn: impl FnMut(&[u8]) -> Option<Vec<u8>>) -> Result<bool> {
		self.partition_for(key).replace_first(key, map_fn)
	}

	pub fn replace_all(&self, key: &[u8], map_fn: impl FnMut(&[u8]) -> Option<Vec<u8>>) -> Result<u32> {
		self.partition_for(key).replace_all(key, map_fn)
	}

	/// Visits every key across every shard, sequentially, shard by shard.
	/// No cross-shard lock is held; no ordering is guaranteed (spec.md §4.9).
	pub fn for_each_key(&self, mut f: impl FnMut(&[u8])) {
		for partition in &self.partitions {
			partition.for_each_key(&mut f);
		}
	}

	/// Invokes `f` once per live value of `key`, in order.
	pub fn for_each_value(&self, key: &[u8], f: impl FnMut(&[u8])) -> Result<()> {
		self.partition_for(key).for_each_value(key, f)
	}

	pub fn for_each_entry(&self, mut f: impl FnMut(&[u8], &crate::list::List)) {
		for partition in &self.partitions {
			partition.for_each_entry(&mut f);
		}
	}

	/// Aggregates every shard's stats with [`Stats::total`].
	pub fn stats(&self) -> Stats {
		let per_partition: Vec<Stats> = self.partitions.iter().map(|p| p.stats()).collect();
		Stats::total(&per_partition)
	}

	/// Per-field maximum across shards, via [`Stats::max`]. Useful for
	/// spotting a single hot/overloaded partition that `stats()`'s totals
	/// would average away.
	pub fn stats_max(&self) -> Stats {
		let per_partition: Vec<Stats> = self.partitions.iter().map(|p| p.stats()).collect();
		Stats::max(&per_partition)
	}

	pub fn close(self) -> Result<()> {
		for partition in &self.partitions {
			partition.close()?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn opts(dir: &Path) -> Options {
		env_logger::try_init().ok();
		Options::new(dir).block_size(64).buffer_size(128).num_shards(5).create_if_missing(true)
	}

	#[test]
	fn put_then_get_roundtrips_across_shards() {
		let dir = tempfile::tempdir().unwrap();
		let map = Map::open(&opts(dir.path())).unwrap();
		for i in 0..50u32 {
			map.put(format!("key{}", i).as_bytes(), b"v").unwrap();
		}
		for i in 0..50u32 {
			assert!(map.contains(format!("key{}", i).as_bytes()));
		}
		map.close().unwrap();
	}

	#[test]
	fn close_then_reopen_preserves_values() {
		let dir = tempfile::tempdir().unwrap();
		{
			let map = Map::open(&opts(dir.path())).unwrap();
			map.put(b"k1", b"v1").unwrap();
			map.put(b"k1", b"v2").unwrap();
			map.put(b"k1", b"v3").unwrap();
			map.close().unwrap();
		}
		let map = Map::open(&Options::new(dir.path()).block_size(64).buffer_size(128).num_shards(5)).unwrap();
		assert_eq!(map.get(b"k1").unwrap(), vec![b"v1".to_vec(), b"v2".to_vec(), b"v3".to_vec()]);
	}

	#[test]
	fn error_if_exists_rejects_existing_map() {
		let dir = tempfile::tempdir().unwrap();
		{
			let map = Map::open(&opts(dir.path())).unwrap();
			map.close().unwrap();
		}
		let err = Map::open(&opts(dir.path()).error_if_exists(true)).unwrap_err();
		assert!(matches!(err, Error::AlreadyExists(_)));
	}

	#[test]
	fn missing_directory_without_create_if_missing_is_not_found() {
		let dir = tempfile::tempdir().unwrap();
		let missing = dir.path().join("nope");
		let err = Map::open(&Options::new(&missing)).unwrap_err();
		assert!(matches!(err, Error::NotFound(_)));
	}

	#[test]
	fn non_power_of_two_block_size_rejected() {
		let dir = tempfile::tempdir().unwrap();
		let err = Map::open(&Options::new(dir.path()).block_size(100).num_shards(5).create_if_missing(true)).unwrap_err();
		assert!(matches!(err, Error::InvalidArgument(_)));
	}

	#[test]
	fn remove_all_on_missing_key_is_zero_and_not_contains() {
		let dir = tempfile::tempdir().unwrap();
		let map = Map::open(&opts(dir.path())).unwrap();
		assert_eq!(map.remove_all(b"nope", |_| true).unwrap(), 0);
		assert!(!map.contains(b"nope"));
	}

	#[test]
	fn for_each_value_visits_live_values_in_order() {
		let dir = tempfile::tempdir().unwrap();
		let map = Map::open(&opts(dir.path())).unwrap();
		map.put(b"k1", b"v1").unwrap();
		map.put(b"k1", b"v2").unwrap();
		let mut seen = Vec::new();
		map.for_each_value(b"k1", |v| seen.push(v.to_vec())).unwrap();
		assert_eq!(seen, vec![b"v1".to_vec(), b"v2".to_vec()]);
	}

	#[test]
	fn stats_max_picks_the_busiest_shard() {
		let dir = tempfile::tempdir().unwrap();
		let map = Map::open(&opts(dir.path())).unwrap();
		for i in 0..50u32 {
			map.put(format!("key{}", i).as_bytes(), b"v").unwrap();
		}
		let total = map.stats();
		let max = map.stats_max();
		assert!(max.num_keys_valid <= total.num_keys_valid);
		assert!(max.num_keys_valid > 0);
	}
}
