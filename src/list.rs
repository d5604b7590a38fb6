// Per-key metadata plus append/flush; owns a reader/writer lock.
// See spec.md §3/§4.6.

use std::convert::TryInto;
use std::time::Duration;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::block::Block;
use crate::error::{Error, Result};
use crate::iterator::{ListIter, ListIterMut};
use crate::sink::BlockSink;
use crate::uint_vector::UintVector;
use crate::varint;

/// Persistent summary of a list: the block-id vector and value counters.
/// This is exactly what gets written to a partition's `.map` file.
#[derive(Clone, Default, Debug)]
pub struct ListHead {
	pub block_ids: UintVector,
	pub num_values_total: u32,
	pub num_values_removed: u32,
}

impl ListHead {
	pub fn num_values_valid(&self) -> u32 {
		debug_assert!(self.num_values_total >= self.num_values_removed);
		self.num_values_total - self.num_values_removed
	}

	/// `u16 block_ids_byte_len; block_ids_bytes; u32 num_values_total; u32 num_values_removed`.
	pub fn serialize(&self, out: &mut Vec<u8>) {
		self.block_ids.serialize(out);
		out.extend_from_slice(&self.num_values_total.to_le_bytes());
		out.extend_from_slice(&self.num_values_removed.to_le_bytes());
	}

	pub fn deserialize(buf: &[u8]) -> (ListHead, usize) {
		let (block_ids, mut consumed) = UintVector::deserialize(buf);
		let num_values_total = u32::from_le_bytes(buf[consumed..consumed + 4].try_into().unwrap());
		consumed += 4;
		let num_values_removed = u32::from_le_bytes(buf[consumed..consumed + 4].try_into().unwrap());
		consumed += 4;
		(ListHead { block_ids, num_values_total, num_values_removed }, consumed)
	}
}

/// Mutable list state behind the reader/writer lock: the persistent head
/// plus the currently-filling in-RAM tail block (`None` if there is none).
#[derive(Debug)]
pub struct ListState {
	pub head: ListHead,
	pub tail: Option<Block>,
}

#[derive(Debug)]
pub struct List {
	block_size: u32,
	state: RwLock<ListState>,
}

/// Max bytes a single value may occupy, leaving room for the largest
/// possible size-with-flag header in a block of `block_size`.
pub fn max_value_size(block_size: u32) -> u32 {
	block_size - varint::MAX_VARINT32_WITH_FLAG_BYTES as u32
}

impl List {
	pub fn new(block_size: u32) -> List {
		List::from_head(ListHead::default(), block_size)
	}

	pub fn from_head(head: ListHead, block_size: u32) -> List {
		List { block_size, state: RwLock::new(ListState { head, tail: None }) }
	}

	pub fn read(&self) -> RwLockReadGuard<'_, ListState> {
		self.state.read()
	}

	pub fn write(&self) -> RwLockWriteGuard<'_, ListState> {
		self.state.write()
	}

	pub fn try_read(&self) -> Option<RwLockReadGuard<'_, ListState>> {
		self.state.try_read()
	}

	pub fn try_write(&self) -> Option<RwLockWriteGuard<'_, ListState>> {
		self.state.try_write()
	}

	/// Bounded-wait variant used by the close protocol's best-effort flush
	/// of still-locked lists (spec.md §7).
	pub fn try_write_for(&self, timeout: Duration) -> Option<RwLockWriteGuard<'_, ListState>> {
		self.state.try_write_for(timeout)
	}

	pub fn num_values_total(&self) -> u32 {
		self.read().head.num_values_total
	}

	pub fn num_values_valid(&self) -> u32 {
		self.read().head.num_values_valid()
	}

	/// Appends `value` to the tail of the list. Takes the writer lock.
	pub fn append(&self, value: &[u8], sink: &impl BlockSink) -> Result<()> {
		let max = max_value_size(self.block_size) as usize;
		if value.len() > max {
			return Err(Error::InvalidArgument(format!("value of {} bytes exceeds max_value_size {}", value.len(), max)));
		}
		let mut state = self.write();
		if state.tail.is_none() {
			state.tail = Some(sink.allocate_block());
		}
		if !Self::try_write_record(state.tail.as_mut().unwrap(), value) {
			Self::flush_locked(&mut state, sink)?;
			state.tail = Some(sink.allocate_block());
			let ok = Self::try_write_record(state.tail.as_mut().unwrap(), value);
			debug_assert!(ok, "a fresh block must always fit one max-sized record");
		}
		state.head.num_values_total += 1;
		Ok(())
	}

	fn try_write_record(block: &mut Block, value: &[u8]) -> bool {
		let header_offset = block.write_offset();
		let header_len = block.write_size_with_flag(value.len() as u32, false);
		if header_len == 0 {
			return false;
		}
		let written = block.write_data(value);
		if written != value.len() {
			// Roll back: there wasn't room for the payload either. The
			// header bytes are overwritten by the next attempt's header
			// write into the same (fresh) block, so no separate undo is
			// needed once we `flush_locked` and retry on a clean block.
			block.set_read_offset(header_offset);
			return false;
		}
		true
	}

	/// Commits a non-empty tail block to the sink given an already-held
	/// writer guard. A no-op if the tail is absent or empty (idempotent,
	/// per spec.md §8). Exposed so callers that already hold the lock (the
	/// close protocol) don't have to re-acquire it.
	pub fn flush_locked(state: &mut ListState, sink: &impl BlockSink) -> Result<()> {
		if let Some(tail) = state.tail.take() {
			if tail.write_offset() > 0 {
				let id = sink.commit_block(tail)?;
				state.head.block_ids.add(id);
			}
		}
		Ok(())
	}

	pub fn flush(&self, sink: &impl BlockSink) -> Result<()> {
		let mut state = self.write();
		Self::flush_locked(&mut state, sink)
	}

	pub fn serialize_head(&self, out: &mut Vec<u8>) {
		self.read().head.serialize(out);
	}

	pub fn iter(&self) -> ListIter<'_> {
		ListIter::new(self.read())
	}

	pub fn iter_mut(&self) -> ListIterMut<'_> {
		ListIterMut::new(self.write())
	}

	/// Invokes `f` once per live value, in order. A read-only convenience
	/// over [`List::iter`] for callers that don't need to hold the iterator
	/// open across other work.
	pub fn for_each_value(&self, sink: &impl BlockSink, mut f: impl FnMut(&[u8])) -> Result<()> {
		let mut it = self.iter();
		while let Some(v) = it.next(sink)? {
			f(&v);
		}
		Ok(())
	}

	/// Tombstones the first live value matching `predicate`. Returns whether
	/// a match was found.
	pub fn remove_first(&self, sink: &impl BlockSink, mut predicate: impl FnMut(&[u8]) -> bool) -> Result<bool> {
		let mut it = self.iter_mut();
		while let Some(v) = it.next(sink)? {
			if predicate(&v) {
				it.remove(sink)?;
				return Ok(true);
			}
		}
		Ok(false)
	}

	/// Tombstones every live value matching `predicate`. Returns the count removed.
	pub fn remove_all(&self, sink: &impl BlockSink, mut predicate: impl FnMut(&[u8]) -> bool) -> Result<u32> {
		let mut it = self.iter_mut();
		let mut count = 0u32;
		while let Some(v) = it.next(sink)? {
			if predicate(&v) {
				it.remove(sink)?;
				count += 1;
			}
		}
		Ok(count)
	}

	/// Replaces the first live value for which `map_fn` returns `Some(new)`:
	/// tombstones the old record, then appends `new` once iteration has
	/// finished (avoids invalidating the iterator mid-scan).
	pub fn replace_first(&self, sink: &impl BlockSink, mut map_fn: impl FnMut(&[u8]) -> Option<Vec<u8>>) -> Result<bool> {
		let pending = {
			let mut it = self.iter_mut();
			let mut pending = None;
			while let Some(v) = it.next(sink)? {
				if let Some(new_value) = map_fn(&v) {
					it.remove(sink)?;
					pending = Some(new_value);
					break;
				}
			}
			pending
		};
		match pending {
			Some(new_value) => {
				self.append(&new_value, sink)?;
				Ok(true)
			}
			None => Ok(false),
		}
	}

	/// Same as [`List::replace_first`] but for every matching live value.
	pub fn replace_all(&self, sink: &impl BlockSink, mut map_fn: impl FnMut(&[u8]) -> Option<Vec<u8>>) -> Result<u32> {
		let pending = {
			let mut it = self.iter_mut();
			let mut pending = Vec::new();
			while let Some(v) = it.next(sink)? {
				if let Some(new_value) = map_fn(&v) {
					it.remove(sink)?;
					pending.push(new_value);
				}
			}
			pending
		};
		let count = pending.len() as u32;
		for v in pending {
			self.append(&v, sink)?;
		}
		Ok(count)
	}
}
