// Iterator protocol over a List's values: a shared, read-only iterator and
// an exclusive iterator that supports in-place removal. See spec.md §4.7.
//
// Both variants decode directly out of each Block's raw byte buffer using
// their own read cursor, rather than `Block`'s internal cursor, so that
// cached blocks can be read without needing `&mut` access into the cache.

use std::collections::VecDeque;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::block::Block;
use crate::error::Result;
use crate::list::ListState;
use crate::sink::BlockSink;
use crate::store::BlockId;
use crate::varint;

/// Blocks to keep resident in the iterator's cache at once.
const BLOCK_CACHE_SIZE: usize = 1024;

/// Where inside the cursor state the most recently yielded record's
/// size-with-flag header lives, so `remove()` knows what to flip.
#[derive(Clone, Copy)]
enum Loc {
	Cached { idx: usize, header_offset: usize },
	Tail { header_offset: usize },
}

struct Cursor {
	pending_block_ids: VecDeque<BlockId>,
	cache: Vec<(BlockId, Block)>,
	/// Index into `cache` of the block currently being read.
	cache_idx: usize,
	read_offset: usize,
	in_tail: bool,
	tail_read_offset: usize,
	last_loc: Option<Loc>,
	num_values_total: u32,
	num_values_removed_at_start: u32,
	num_yielded: u32,
}

impl Cursor {
	fn new(state: &ListState) -> Cursor {
		Cursor {
			pending_block_ids: state.head.block_ids.unpack().into(),
			cache: Vec::new(),
			cache_idx: 0,
			read_offset: 0,
			in_tail: false,
			tail_read_offset: 0,
			last_loc: None,
			num_values_total: state.head.num_values_total,
			num_values_removed_at_start: state.head.num_values_removed,
			num_yielded: 0,
		}
	}

	fn available(&self) -> u32 {
		(self.num_values_total - self.num_values_removed_at_start).saturating_sub(self.num_yielded)
	}

	fn fill_cache(&mut self, sink: &impl BlockSink) -> Result<()> {
		if self.cache_idx < self.cache.len() || self.pending_block_ids.is_empty() {
			return Ok(());
		}
		let batch: Vec<BlockId> = self.pending_block_ids.drain(..self.pending_block_ids.len().min(BLOCK_CACHE_SIZE)).collect();
		let blocks = sink.request_blocks(&batch)?;
		self.cache = batch.into_iter().zip(blocks).collect();
		self.cache_idx = 0;
		self.read_offset = 0;
		Ok(())
	}

	/// Decodes the next live (non-tombstoned) record, if any, advancing past
	/// removed records transparently. `tail` is the list's in-RAM tail block.
	fn advance(&mut self, sink: &impl BlockSink, tail: Option<&Block>) -> Result<Option<Vec<u8>>> {
		loop {
			if !self.in_tail {
				self.fill_cache(sink)?;
				if self.cache_idx >= self.cache.len() {
					self.in_tail = true;
					self.tail_read_offset = 0;
					continue;
				}
				let (_, block) = &self.cache[self.cache_idx];
				let bytes = block.as_bytes();
				if self.read_offset >= bytes.len() || bytes[self.read_offset] == 0 {
					self.cache_idx += 1;
					self.read_offset = 0;
					continue;
				}
				let header_offset = self.read_offset;
				let (size, flag, n) = varint::read_u32_with_flag(&bytes[self.read_offset..]);
				self.read_offset += n;
				let data = bytes[self.read_offset..self.read_offset + size as usize].to_vec();
				self.read_offset += size as usize;
				if flag {
					continue;
				}
				self.last_loc = Some(Loc::Cached { idx: self.cache_idx, header_offset });
				self.num_yielded += 1;
				return Ok(Some(data));
			} else {
				let Some(tail) = tail else { return Ok(None) };
				let bytes = tail.as_bytes();
				if self.tail_read_offset >= tail.write_offset() {
					return Ok(None);
				}
				let header_offset = self.tail_read_offset;
				let (size, flag, n) = varint::read_u32_with_flag(&bytes[self.tail_read_offset..]);
				self.tail_read_offset += n;
				let data = bytes[self.tail_read_offset..self.tail_read_offset + size as usize].to_vec();
				self.tail_read_offset += size as usize;
				if flag {
					continue;
				}
				self.last_loc = Some(Loc::Tail { header_offset });
				self.num_yielded += 1;
				return Ok(Some(data));
			}
		}
	}
}

/// Read-only iteration over a list's live values. Holds the list's reader
/// lock for its entire lifetime.
pub struct ListIter<'a> {
	guard: RwLockReadGuard<'a, ListState>,
	cursor: Cursor,
}

impl<'a> ListIter<'a> {
	pub fn new(guard: RwLockReadGuard<'a, ListState>) -> ListIter<'a> {
		let cursor = Cursor::new(&guard);
		ListIter { guard, cursor }
	}

	pub fn available(&self) -> u32 {
		self.cursor.available()
	}

	pub fn next(&mut self, sink: &impl BlockSink) -> Result<Option<Vec<u8>>> {
		let tail = self.guard.tail.as_ref();
		self.cursor.advance(sink, tail)
	}
}

/// Mutating iteration: like [`ListIter`] but additionally supports
/// [`ListIterMut::remove`], which flips the tombstone flag of the
/// last-yielded record in place.
pub struct ListIterMut<'a> {
	guard: RwLockWriteGuard<'a, ListState>,
	cursor: Cursor,
	num_removed: u32,
}

impl<'a> ListIterMut<'a> {
	pub fn new(guard: RwLockWriteGuard<'a, ListState>) -> ListIterMut<'a> {
		let cursor = Cursor::new(&guard);
		ListIterMut { guard, cursor, num_removed: 0 }
	}

	pub fn available(&self) -> u32 {
		self.cursor.available()
	}

	pub fn next(&mut self, sink: &impl BlockSink) -> Result<Option<Vec<u8>>> {
		let tail = self.guard.tail.as_ref();
		self.cursor.advance(sink, tail)
	}

	pub fn num_removed(&self) -> u32 {
		self.num_removed
	}

	/// Tombstones the record last returned by `next`. Panics if called
	/// before any `next()` call or twice for the same record without an
	/// intervening `next()`, mirroring spec.md §4.7's iterator contract.
	pub fn remove(&mut self, sink: &impl BlockSink) -> Result<()> {
		match self.cursor.last_loc.take().expect("remove() called without a preceding next()") {
			Loc::Cached { idx, header_offset } => {
				let (id, block) = &mut self.cursor.cache[idx];
				block.write_flag_at(true, header_offset);
				let id = *id;
				sink.replace_block(id, block)?;
			}
			Loc::Tail { header_offset } => {
				let tail = self.guard.tail.as_mut().expect("tail loc implies a tail block");
				tail.write_flag_at(true, header_offset);
			}
		}
		self.guard.head.num_values_removed += 1;
		self.num_removed += 1;
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::list::List;
	use crate::store::Store;

	fn store(block_size: u32) -> (tempfile::TempDir, Store) {
		let dir = tempfile::tempdir().unwrap();
		let store = Store::open(&dir.path().join("t.store"), block_size, block_size * 2, false, true).unwrap();
		(dir, store)
	}

	#[test]
	fn iterates_values_in_order_spanning_blocks_and_tail() {
		let (_dir, store) = store(16);
		let list = List::new(16);
		for i in 0..20u8 {
			list.append(&[i; 3], &store).unwrap();
		}
		let guard = list.read();
		let mut it = ListIter::new(guard);
		assert_eq!(it.available(), 20);
		let mut seen = Vec::new();
		while let Some(v) = it.next(&store).unwrap() {
			seen.push(v[0]);
		}
		assert_eq!(seen, (0..20u8).collect::<Vec<_>>());
	}

	#[test]
	fn remove_hides_value_from_subsequent_iteration() {
		let (_dir, store) = store(16);
		let list = List::new(16);
		for i in 0..20u8 {
			list.append(&[i; 3], &store).unwrap();
		}
		{
			let guard = list.write();
			let mut it = ListIterMut::new(guard);
			while let Some(v) = it.next(&store).unwrap() {
				if v[0] == 5 {
					it.remove(&store).unwrap();
				}
			}
			assert_eq!(it.num_removed(), 1);
		}
		assert_eq!(list.num_values_valid(), 19);
		let guard = list.read();
		let mut it = ListIter::new(guard);
		assert_eq!(it.available(), 19);
		let mut seen = Vec::new();
		while let Some(v) = it.next(&store).unwrap() {
			seen.push(v[0]);
		}
		assert!(!seen.contains(&5));
		assert_eq!(seen.len(), 19);
	}

	#[test]
	fn remove_persists_after_store_reread() {
		let (_dir, store) = store(64);
		let list = List::new(64);
		for i in 0..5u8 {
			list.append(&[i; 3], &store).unwrap();
		}
		list.flush(&store).unwrap();
		{
			let guard = list.write();
			let mut it = ListIterMut::new(guard);
			while let Some(v) = it.next(&store).unwrap() {
				if v[0] == 2 {
					it.remove(&store).unwrap();
				}
			}
		}
		let guard = list.read();
		let mut it = ListIter::new(guard);
		let mut seen = Vec::new();
		while let Some(v) = it.next(&store).unwrap() {
			seen.push(v[0]);
		}
		assert!(!seen.contains(&2));
	}
}
