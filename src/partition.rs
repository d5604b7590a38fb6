// Hash map from key to List; owns the Store and Arena for one shard and
// persists/replays its `.map`/`.stats` files. See spec.md §3/§4.8.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use fnv::FnvHashMap;
use parking_lot::RwLock;

use crate::arena::Arena;
use crate::error::{Error, Result};
use crate::list::{List, ListHead};
use crate::stats::{Stats, StatsBuilder};
use crate::store::Store;
use crate::varint;

/// Largest key accepted by `put`, per spec.md §3's varint-32 size-prefix bound.
pub const MAX_KEY_SIZE: u32 = (1u32 << 30) - 1;

/// How long `close` waits for a stuck writer before giving up on flushing
/// that list's tail and persisting only its last-known head (spec.md §7:
/// "a still-locked list triggers a logged warning but does not fail the close").
const CLOSE_LOCK_TIMEOUT: Duration = Duration::from_millis(200);

#[derive(Debug)]
struct Paths {
	map: PathBuf,
	map_old: PathBuf,
	stats: PathBuf,
	store: PathBuf,
}

impl Paths {
	fn new(directory: &Path, prefix: &str) -> Paths {
		Paths {
			map: directory.join(format!("{}.map", prefix)),
			map_old: directory.join(format!("{}.map.old", prefix)),
			stats: directory.join(format!("{}.stats", prefix)),
			store: directory.join(format!("{}.store", prefix)),
		}
	}
}

#[derive(Debug)]
pub struct Partition {
	paths: Paths,
	block_size: u32,
	read_only: bool,
	map: RwLock<FnvHashMap<&'static [u8], Arc<List>>>,
	store: Store,
	arena: Arena,
}

impl Partition {
	pub fn open(directory: &Path, prefix: &str, block_size: u32, buffer_size: u32, read_only: bool, create_if_missing: bool) -> Result<Partition> {
		let paths = Paths::new(directory, prefix);
		if paths.stats.exists() {
			let bytes = fs::read(&paths.stats)?;
			let stats = Stats::from_bytes(&bytes)?;
			let actual_block_size = stats.block_size as u32;
			let store = Store::open(&paths.store, actual_block_size, buffer_size.max(actual_block_size), read_only, false)?;
			let arena = Arena::new();
			let map = RwLock::new(FnvHashMap::default());
			let partition = Partition { paths, block_size: actual_block_size, read_only, map, store, arena };
			partition.replay()?;
			Ok(partition)
		} else {
			if !create_if_missing {
				return Err(Error::NotFound(format!("partition {} does not exist", prefix)));
			}
			let store = Store::open(&paths.store, block_size, buffer_size, read_only, true)?;
			Ok(Partition { paths, block_size, read_only, map: RwLock::new(FnvHashMap::default()), store, arena: Arena::new() })
		}
	}

	fn replay(&self) -> Result<()> {
		if !self.paths.map.exists() {
			return Ok(());
		}
		let bytes = fs::read(&self.paths.map)?;
		let mut offset = 0;
		let mut map = self.map.write();
		while offset < bytes.len() {
			let (key_len, n) = varint::read_u32(&bytes[offset..]);
			offset += n;
			let key = &bytes[offset..offset + key_len as usize];
			offset += key_len as usize;
			let (head, consumed) = ListHead::deserialize(&bytes[offset..]);
			offset += consumed;
			let owned_key = self.arena.allocate(key);
			map.insert(owned_key, Arc::new(List::from_head(head, self.block_size)));
		}
		Ok(())
	}

	pub fn block_size(&self) -> u32 {
		self.block_size
	}

	pub fn is_read_only(&self) -> bool {
		self.read_only
	}

	fn get_or_create_list(&self, key: &[u8]) -> Arc<List> {
		if let Some(list) = self.map.read().get(key) {
			return list.clone();
		}
		let mut map = self.map.write();
		if let Some(list) = map.get(key) {
			return list.clone();
		}
		let owned_key: &'static [u8] = self.arena.allocate(key);
		let list = Arc::new(List::new(self.block_size));
		map.insert(owned_key, list.clone());
		list
	}

	pub fn get_list(&self, key: &[u8]) -> Option<Arc<List>> {
		self.map.read().get(key).cloned()
	}

	pub fn store(&self) -> &Store {
		&self.store
	}

	fn check_key_size(key: &[u8]) -> Result<()> {
		if key.len() as u64 > MAX_KEY_SIZE as u64 {
			return Err(Error::InvalidArgument(format!("key of {} bytes exceeds max_key_size {}", key.len(), MAX_KEY_SIZE)));
		}
		Ok(())
	}

	pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
		if self.read_only {
			return Err(Error::Concurrency("put on a read-only partition".into()));
		}
		Self::check_key_size(key)?;
		let list = self.get_or_create_list(key);
		list.append(value, &self.store)
	}

	pub fn contains(&self, key: &[u8]) -> bool {
		self.get_list(key).map(|l| l.num_values_valid() > 0).unwrap_or(false)
	}

	pub fn count(&self, key: &[u8]) -> u32 {
		self.get_list(key).map(|l| l.num_values_valid()).unwrap_or(0)
	}

	pub fn remove_first(&self, key: &[u8], predicate: impl FnMut(&[u8]) -> bool) -> Result<bool> {
		match self.get_list(key) {
			Some(list) => list.remove_first(&self.store, predicate),
			None => Ok(false),
		}
	}

	pub fn remove_all(&self, key: &[u8], predicate: impl FnMut(&[u8]) -> bool) -> Result<u32> {
		match self.get_list(key) {
			Some(list) => list.remove_all(&self.store, predicate),
			None => Ok(0),
		}
	}

	pub fn replace_first(&self, key: &[u8], map_fn: impl FnMut(&[u8]) -> Option<Vec<u8>>) -> Result<bool> {
		match self.get_list(key) {
			Some(list) => list.replace_first(&self.store, map_fn),
			None => Ok(false),
		}
	}

	pub fn replace_all(&self, key: &[u8], map_fn: impl FnMut(&[u8]) -> Option<Vec<u8>>) -> Result<u32> {
		match self.get_list(key) {
			Some(list) => list.replace_all(&self.store, map_fn),
			None => Ok(0),
		}
	}

	/// Invokes `f` once per live value of `key`, in order. A no-op if `key`
	/// isn't present.
	pub fn for_each_value(&self, key: &[u8], f: impl FnMut(&[u8])) -> Result<()> {
		match self.get_list(key) {
			Some(list) => list.for_each_value(&self.store, f),
			None => Ok(()),
		}
	}

	pub fn for_each_key(&self, mut f: impl FnMut(&[u8])) {
		for key in self.map.read().keys() {
			f(*key);
		}
	}

	pub fn for_each_entry(&self, mut f: impl FnMut(&[u8], &List)) {
		for (key, list) in self.map.read().iter() {
			f(*key, list);
		}
	}

	/// Collects per-partition stats by walking every key's current head.
	/// Live rather than incrementally maintained, per DESIGN.md's Open
	/// Question resolution: recomputed on demand instead of tracked through
	/// every put/remove.
	pub fn stats(&self) -> Stats {
		let mut builder = StatsBuilder::new(self.block_size as u64);
		for (key, list) in self.map.read().iter() {
			let valid = list.num_values_valid();
			builder.add_key(key.len() as u64, list.num_values_total() as u64, valid as u64);
		}
		builder.num_blocks(self.store.num_blocks()).finish()
	}

	/// Flushes every list, persists `.map`/`.stats`, and performs the
	/// crash-safe `.map` → `.map.old` → delete handoff. A no-op on
	/// read-only partitions.
	pub fn close(&self) -> Result<()> {
		if self.read_only {
			return Ok(());
		}
		if self.paths.map.exists() {
			fs::rename(&self.paths.map, &self.paths.map_old)?;
		}
		let mut out = Vec::new();
		let mut builder = StatsBuilder::new(self.block_size as u64);
		for (key, list) in self.map.read().iter() {
			// The timeout path must never fall back to a blocking `read()`:
			// that would wait for the same stuck writer `try_write_for` just
			// gave up on, defeating the bounded wait entirely. `try_read`
			// keeps the whole path non-blocking; if even that fails we drop
			// the key from this close rather than hang.
			let head_snapshot = match list.try_write_for(CLOSE_LOCK_TIMEOUT) {
				Some(mut guard) => {
					List::flush_locked(&mut guard, &self.store)?;
					guard.head.clone()
				}
				None => {
					log::warn!(target: "multimap", "list was locked at shutdown; recent updates may be lost");
					match list.try_read() {
						Some(guard) => guard.head.clone(),
						None => {
							log::warn!(target: "multimap", "list head unreadable at shutdown; key dropped from persisted map");
							continue;
						}
					}
				}
			};
			let valid = head_snapshot.num_values_valid();
			if valid > 0 {
				builder.add_key(key.len() as u64, head_snapshot.num_values_total as u64, valid as u64);
				let mut entry = Vec::new();
				let mut key_len_buf = [0u8; varint::MAX_VARINT32_BYTES];
				let n = varint::write_u32(key.len() as u32, &mut key_len_buf);
				entry.extend_from_slice(&key_len_buf[..n]);
				entry.extend_from_slice(key);
				head_snapshot.serialize(&mut entry);
				out.extend_from_slice(&entry);
			}
		}
		fs::write(&self.paths.map, &out)?;
		self.store.flush()?;
		let stats = builder.num_blocks(self.store.num_blocks()).finish();
		fs::write(&self.paths.stats, stats.to_bytes())?;
		if self.paths.map_old.exists() {
			fs::remove_file(&self.paths.map_old)?;
		}
		Ok(())
	}
}
