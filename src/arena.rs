// Scoped byte allocator producing stable pointers into pooled chunks.
// Sole owner of interned keys and other long-lived per-partition byte spans.

use parking_lot::Mutex;

const DEFAULT_CHUNK_SIZE: usize = 4096;

#[derive(Debug)]
struct Inner {
	chunk_size: usize,
	chunks: Vec<Vec<u8>>,
	oversized: Vec<Vec<u8>>,
	current_offset: usize,
}

/// Allocates byte spans with a lifetime tied to the arena itself. Pointers
/// handed out remain valid until the arena is dropped or `deallocate_all`
/// is called; they are never invalidated by further allocations.
#[derive(Debug)]
pub struct Arena {
	inner: Mutex<Inner>,
}

impl Arena {
	pub fn new() -> Arena {
		Arena::with_chunk_size(DEFAULT_CHUNK_SIZE)
	}

	pub fn with_chunk_size(chunk_size: usize) -> Arena {
		Arena {
			inner: Mutex::new(Inner {
				chunk_size,
				chunks: Vec::new(),
				oversized: Vec::new(),
				current_offset: 0,
			}),
		}
	}

	/// Copies `data` into arena-owned storage and returns a pointer/length
	/// pair stable for the arena's lifetime.
	///
	/// # Safety
	/// The returned slice must not outlive the arena.
	pub fn allocate(&self, data: &[u8]) -> &'static [u8] {
		let mut inner = self.inner.lock();
		let n = data.len();
		if n > inner.chunk_size {
			inner.oversized.push(data.to_vec());
			let v = inner.oversized.last().unwrap();
			return unsafe { std::slice::from_raw_parts(v.as_ptr(), v.len()) };
		}
		let chunk_size = inner.chunk_size;
		let need_new_chunk = inner.chunks.is_empty() || inner.current_offset + n > chunk_size;
		if need_new_chunk {
			inner.chunks.push(Vec::with_capacity(chunk_size));
			inner.current_offset = 0;
		}
		let idx = inner.chunks.len() - 1;
		let current_offset = inner.current_offset;
		let chunk = &mut inner.chunks[idx];
		let start = chunk.len();
		debug_assert_eq!(start, current_offset);
		chunk.extend_from_slice(data);
		let new_offset = start + n;
		debug_assert!(new_offset <= chunk_size);
		let ptr = chunk.as_ptr();
		inner.current_offset = new_offset;
		unsafe { std::slice::from_raw_parts(ptr, n) }
	}

	/// Releases all memory owned by the arena. Any spans previously
	/// returned by `allocate` become dangling; callers must not use them
	/// afterwards.
	pub fn deallocate_all(&self) {
		let mut inner = self.inner.lock();
		inner.chunks.clear();
		inner.oversized.clear();
		inner.current_offset = 0;
	}
}

impl Default for Arena {
	fn default() -> Arena {
		Arena::new()
	}
}

// SAFETY: all mutation goes through the internal mutex; the raw pointers
// handed out alias `Vec<u8>` buffers that are never reallocated in place
// (each chunk is filled exactly once, up to its capacity) and are only
// freed by `deallocate_all`/`Drop`, which callers are required to outlive.
unsafe impl Send for Arena {}
unsafe impl Sync for Arena {}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn allocate_returns_stable_bytes() {
		let arena = Arena::with_chunk_size(16);
		let a = arena.allocate(b"hello");
		let b = arena.allocate(b"world!!");
		assert_eq!(a, b"hello");
		assert_eq!(b, b"world!!");
	}

	#[test]
	fn oversize_allocation() {
		let arena = Arena::with_chunk_size(4);
		let big = vec![7u8; 64];
		let got = arena.allocate(&big);
		assert_eq!(got, &big[..]);
	}

	#[test]
	fn deallocate_all_resets_chunks() {
		let arena = Arena::with_chunk_size(64);
		arena.allocate(b"abc");
		arena.deallocate_all();
		let got = arena.allocate(b"xyz");
		assert_eq!(got, b"xyz");
	}
}
