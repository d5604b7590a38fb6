// Configuration surface threaded through `Map::open`. Mirrors the shape of
// the teacher's single-struct `Options`/`ColumnOptions` pair.

use std::path::PathBuf;

pub const DEFAULT_BLOCK_SIZE: u32 = 512;
pub const DEFAULT_BUFFER_SIZE: u32 = 64 * 1024;
pub const DEFAULT_NUM_SHARDS: u16 = 23;

#[derive(Clone, Debug)]
pub struct Options {
	pub directory: PathBuf,
	pub block_size: u32,
	pub buffer_size: u32,
	pub num_shards: u16,
	pub create_if_missing: bool,
	pub error_if_exists: bool,
	pub read_only: bool,
}

impl Options {
	pub fn new(directory: impl Into<PathBuf>) -> Options {
		Options {
			directory: directory.into(),
			block_size: DEFAULT_BLOCK_SIZE,
			buffer_size: DEFAULT_BUFFER_SIZE,
			num_shards: DEFAULT_NUM_SHARDS,
			create_if_missing: false,
			error_if_exists: false,
			read_only: false,
		}
	}

	pub fn block_size(mut self, block_size: u32) -> Options {
		self.block_size = block_size;
		self
	}

	pub fn buffer_size(mut self, buffer_size: u32) -> Options {
		self.buffer_size = buffer_size;
		self
	}

	pub fn num_shards(mut self, num_shards: u16) -> Options {
		self.num_shards = num_shards;
		self
	}

	pub fn create_if_missing(mut self, v: bool) -> Options {
		self.create_if_missing = v;
		self
	}

	pub fn error_if_exists(mut self, v: bool) -> Options {
		self.error_if_exists = v;
		self
	}

	pub fn read_only(mut self, v: bool) -> Options {
		self.read_only = v;
		self
	}
}
