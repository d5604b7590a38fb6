// Block-addressed append log backed by a file. Memory-maps the
// already-flushed prefix for random read and in-place flag mutation,
// buffers the unflushed tail in RAM, and assigns dense 32-bit block IDs.
// See spec.md §3/§4.5.

use std::fs::{File, OpenOptions};
use std::path::Path;

use memmap2::{Advice, MmapMut, MmapOptions};
use parking_lot::Mutex;

use crate::block::Block;
use crate::error::{Error, Result};

pub type BlockId = u32;

#[derive(Clone, Copy)]
pub enum AccessPattern {
	Random,
	WillNeed,
}

#[derive(Debug)]
struct State {
	mapped: Option<MmapMut>,
	/// Blocks currently covered by `mapped`, i.e. durably flushed to the file.
	num_blocks_mapped: u64,
	buffer: Vec<u8>,
	buffer_offset: usize,
	/// Total blocks, mapped plus buffered-but-not-yet-flushed.
	num_blocks: u64,
}

/// One partition's block log. Every operation is internally synchronized;
/// callers need no external lock (spec.md §5 lock level 4).
#[derive(Debug)]
pub struct Store {
	file: File,
	block_size: u32,
	buffer_size: u32,
	read_only: bool,
	state: Mutex<State>,
}

impl Store {
	pub fn open(path: &Path, block_size: u32, buffer_size: u32, read_only: bool, create_if_missing: bool) -> Result<Store> {
		if !block_size.is_power_of_two() {
			return Err(Error::InvalidArgument(format!("block_size {} is not a power of two", block_size)));
		}
		if buffer_size < block_size {
			return Err(Error::InvalidArgument(format!(
				"buffer_size {} is smaller than block_size {}",
				buffer_size, block_size
			)));
		}
		if buffer_size % block_size != 0 {
			return Err(Error::InvalidArgument(format!(
				"buffer_size {} is not a multiple of block_size {}",
				buffer_size, block_size
			)));
		}
		let exists = path.exists();
		if !exists && !create_if_missing {
			return Err(Error::NotFound(format!("store file {} does not exist", path.display())));
		}
		let file = OpenOptions::new().read(true).write(!read_only).create(!read_only && create_if_missing).open(path)?;
		let file_len = file.metadata()?.len();
		if file_len % block_size as u64 != 0 {
			return Err(Error::Corruption(format!(
				"store file {} length {} is not a multiple of block_size {}",
				path.display(),
				file_len,
				block_size
			)));
		}
		let num_blocks_mapped = file_len / block_size as u64;
		let mapped = if file_len > 0 {
			// SAFETY: `file` stays open for the lifetime of the Store and is
			// not truncated by anything outside this struct.
			let mmap = unsafe { MmapOptions::new().len(file_len as usize).map_mut(&file)? };
			Some(mmap)
		} else {
			None
		};
		log::debug!(target: "multimap", "opened store {} with {} blocks", path.display(), num_blocks_mapped);
		Ok(Store {
			file,
			block_size,
			buffer_size,
			read_only,
			state: Mutex::new(State {
				mapped,
				num_blocks_mapped,
				buffer: if read_only { Vec::new() } else { vec![0u8; buffer_size as usize] },
				buffer_offset: 0,
				num_blocks: num_blocks_mapped,
			}),
		})
	}

	pub fn block_size(&self) -> u32 {
		self.block_size
	}

	pub fn is_read_only(&self) -> bool {
		self.read_only
	}

	pub fn num_blocks(&self) -> u64 {
		self.state.lock().num_blocks
	}

	/// Copies `block`'s data into the tail buffer, flushing to the file
	/// whenever the buffer fills. Returns the newly assigned block ID.
	pub fn append(&self, block: &Block) -> Result<BlockId> {
		if self.read_only {
			return Err(Error::Concurrency("append on a read-only store".into()));
		}
		assert_eq!(block.size(), self.block_size as usize);
		let mut state = self.state.lock();
		let id = state.num_blocks as u32;
		let offset = state.buffer_offset;
		state.buffer[offset..offset + self.block_size as usize].copy_from_slice(block.as_bytes());
		state.buffer_offset += self.block_size as usize;
		state.num_blocks += 1;
		if state.buffer_offset == self.buffer_size as usize {
			self.flush_locked(&mut state)?;
		}
		Ok(id)
	}

	fn flush_locked(&self, state: &mut State) -> Result<()> {
		if state.buffer_offset == 0 {
			return Ok(());
		}
		let write_at = state.num_blocks_mapped * self.block_size as u64;
		crate::sys::write_all_at(&self.file, &state.buffer[..state.buffer_offset], write_at)?;
		let new_len = write_at as usize + state.buffer_offset;
		self.remap(state, new_len)?;
		state.num_blocks_mapped = new_len as u64 / self.block_size as u64;
		state.buffer_offset = 0;
		Ok(())
	}

	#[cfg(unix)]
	fn remap(&self, state: &mut State, new_len: usize) -> Result<()> {
		use memmap2::RemapOptions;
		match &mut state.mapped {
			Some(mmap) => {
				// SAFETY: the file has just been extended to at least
				// `new_len` bytes by the write above; `may_move` lets the
				// kernel relocate the mapping (mremap/MREMAP_MAYMOVE).
				unsafe { mmap.remap(new_len, RemapOptions::new().may_move(true))? };
			}
			None => {
				// SAFETY: file length is exactly `new_len` after the write above.
				let mmap = unsafe { MmapOptions::new().len(new_len).map_mut(&self.file)? };
				state.mapped = Some(mmap);
			}
		}
		Ok(())
	}

	#[cfg(not(unix))]
	fn remap(&self, state: &mut State, new_len: usize) -> Result<()> {
		// memmap2's incremental remap is unix-only; fall back to a fresh
		// mapping. Callers on non-unified-cache platforms must still
		// msync/FlushViewOfFile before relying on reader visibility (spec.md §5).
		let mmap = unsafe { MmapOptions::new().len(new_len).map_mut(&self.file)? };
		state.mapped = Some(mmap);
		Ok(())
	}

	/// Returns a copy of the block at `id`.
	pub fn get(&self, id: BlockId) -> Result<Block> {
		let state = self.state.lock();
		let mut buf = vec![0u8; self.block_size as usize];
		self.read_into_locked(&state, id, &mut buf)?;
		Ok(Block::from_bytes(buf))
	}

	fn read_into_locked(&self, state: &State, id: BlockId, dst: &mut [u8]) -> Result<()> {
		let id = id as u64;
		if id < state.num_blocks_mapped {
			let mmap = state.mapped.as_ref().expect("mapped blocks imply a mapping");
			let start = id as usize * self.block_size as usize;
			dst.copy_from_slice(&mmap[start..start + self.block_size as usize]);
		} else if id < state.num_blocks {
			let offset = (id - state.num_blocks_mapped) as usize * self.block_size as usize;
			dst.copy_from_slice(&state.buffer[offset..offset + self.block_size as usize]);
		} else {
			return Err(Error::Corruption(format!("block id {} out of range (num_blocks={})", id, state.num_blocks)));
		}
		Ok(())
	}

	/// Identical to looped `get`, but takes the Store's lock once and
	/// preserves the requested order — used for prefetching a list's
	/// upcoming blocks in one batch.
	pub fn get_batch(&self, ids: &[BlockId]) -> Result<Vec<Block>> {
		let state = self.state.lock();
		let mut out = Vec::with_capacity(ids.len());
		for &id in ids {
			let mut buf = vec![0u8; self.block_size as usize];
			self.read_into_locked(&state, id, &mut buf)?;
			out.push(Block::from_bytes(buf));
		}
		Ok(out)
	}

	/// Overwrites block `id`'s bytes in place. Used only for tombstone-flag
	/// mutation by iterators (spec.md §4.7); never changes a block's size.
	pub fn replace(&self, id: BlockId, block: &Block) -> Result<()> {
		if self.read_only {
			return Err(Error::Concurrency("replace on a read-only store".into()));
		}
		assert_eq!(block.size(), self.block_size as usize);
		let mut state = self.state.lock();
		let idu = id as u64;
		if idu < state.num_blocks_mapped {
			let start = idu as usize * self.block_size as usize;
			let mmap = state.mapped.as_mut().expect("mapped blocks imply a mapping");
			mmap[start..start + self.block_size as usize].copy_from_slice(block.as_bytes());
		} else if idu < state.num_blocks {
			let offset = (idu - state.num_blocks_mapped) as usize * self.block_size as usize;
			state.buffer[offset..offset + self.block_size as usize].copy_from_slice(block.as_bytes());
		} else {
			return Err(Error::Corruption(format!("block id {} out of range", id)));
		}
		Ok(())
	}

	/// Hints the kernel about upcoming access patterns over the mapped
	/// region and the underlying file descriptor. Best-effort; failures are
	/// logged, not propagated.
	pub fn advise_access_pattern(&self, pattern: AccessPattern) {
		let state = self.state.lock();
		if let Some(mmap) = state.mapped.as_ref() {
			let advice = match pattern {
				AccessPattern::Random => Advice::Random,
				AccessPattern::WillNeed => Advice::WillNeed,
			};
			if let Err(e) = mmap.advise(advice) {
				log::warn!(target: "multimap", "advise_access_pattern failed: {}", e);
			}
		}
		drop(state);
		#[cfg(unix)]
		self.fadvise(pattern);
	}

	/// `posix_fadvise` on the store's raw fd. Covers the buffered tail and
	/// any not-yet-mapped file range that `mmap.advise` above can't reach.
	#[cfg(unix)]
	fn fadvise(&self, pattern: AccessPattern) {
		use std::os::unix::io::AsRawFd;
		let advice = match pattern {
			AccessPattern::Random => libc::POSIX_FADV_RANDOM,
			AccessPattern::WillNeed => libc::POSIX_FADV_WILLNEED,
		};
		// SAFETY: `self.file`'s fd is open for the lifetime of `self`;
		// posix_fadvise is advisory and never touches the mapped memory.
		let rc = unsafe { libc::posix_fadvise(self.file.as_raw_fd(), 0, 0, advice) };
		if rc != 0 {
			log::warn!(target: "multimap", "posix_fadvise failed: errno {}", rc);
		}
	}

	/// Flushes the in-RAM tail buffer to the file, if non-empty, and syncs.
	pub fn flush(&self) -> Result<()> {
		let mut state = self.state.lock();
		self.flush_locked(&mut state)?;
		if let Some(mmap) = state.mapped.as_ref() {
			mmap.flush()?;
		}
		self.file.sync_data()?;
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn block_with(block_size: usize, value: &[u8]) -> Block {
		let mut b = Block::new(block_size);
		b.write_data(value);
		b
	}

	#[test]
	fn append_then_get_byte_equal() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("test.store");
		let store = Store::open(&path, 64, 64, false, true).unwrap();
		let b = block_with(64, b"hello store");
		let id = store.append(&b).unwrap();
		let got = store.get(id).unwrap();
		assert_eq!(got.as_bytes(), b.as_bytes());
	}

	#[test]
	fn append_across_buffer_flush_boundary() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("test.store");
		let store = Store::open(&path, 16, 32, false, true).unwrap();
		let mut ids = Vec::new();
		let mut blocks = Vec::new();
		for i in 0..10u8 {
			let b = block_with(16, &[i; 4]);
			ids.push(store.append(&b).unwrap());
			blocks.push(b);
		}
		assert_eq!(ids, (0..10).collect::<Vec<_>>());
		for (id, b) in ids.iter().zip(blocks.iter()) {
			let got = store.get(*id).unwrap();
			assert_eq!(got.as_bytes(), b.as_bytes());
		}
	}

	#[test]
	fn replace_flips_bytes_in_mapped_region() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("test.store");
		let store = Store::open(&path, 16, 16, false, true).unwrap();
		let b = block_with(16, b"abcd");
		let id = store.append(&b).unwrap();
		let mut modified = store.get(id).unwrap();
		modified.write_flag_at(true, 0);
		store.replace(id, &modified).unwrap();
		let got = store.get(id).unwrap();
		assert_eq!(got.as_bytes(), modified.as_bytes());
	}

	#[test]
	fn reopen_sees_persisted_blocks() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("test.store");
		{
			let store = Store::open(&path, 16, 16, false, true).unwrap();
			let b = block_with(16, b"persisted");
			store.append(&b).unwrap();
			store.flush().unwrap();
		}
		let store = Store::open(&path, 16, 16, false, false).unwrap();
		assert_eq!(store.num_blocks(), 1);
		let got = store.get(0).unwrap();
		assert_eq!(&got.as_bytes()[..9], b"persisted");
	}

	#[test]
	fn non_power_of_two_block_size_rejected() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("test.store");
		let err = Store::open(&path, 100, 100, false, true).unwrap_err();
		assert!(matches!(err, Error::InvalidArgument(_)));
	}

	#[test]
	fn advise_access_pattern_does_not_error_on_mapped_or_empty_store() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("test.store");
		let store = Store::open(&path, 16, 16, false, true).unwrap();
		store.advise_access_pattern(AccessPattern::Random);
		store.append(&block_with(16, b"abcd")).unwrap();
		store.flush().unwrap();
		store.advise_access_pattern(AccessPattern::WillNeed);
	}

	#[test]
	fn buffer_size_smaller_than_block_size_rejected() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("test.store");
		let err = Store::open(&path, 64, 0, false, true).unwrap_err();
		assert!(matches!(err, Error::InvalidArgument(_)));
		let err = Store::open(&path, 64, 32, false, true).unwrap_err();
		assert!(matches!(err, Error::InvalidArgument(_)));
	}
}
