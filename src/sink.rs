// Parameterizes List over where committed blocks actually live, replacing
// the original's injected allocate/commit/request callbacks (spec.md §9).
// Store is the only production implementor.

use crate::block::Block;
use crate::error::Result;
use crate::store::{BlockId, Store};

pub trait BlockSink {
	fn block_size(&self) -> u32;
	fn allocate_block(&self) -> Block {
		Block::new(self.block_size() as usize)
	}
	fn commit_block(&self, block: Block) -> Result<BlockId>;
	fn replace_block(&self, id: BlockId, block: &Block) -> Result<()>;
	fn request_block(&self, id: BlockId) -> Result<Block>;
	fn request_blocks(&self, ids: &[BlockId]) -> Result<Vec<Block>>;
}

impl BlockSink for Store {
	fn block_size(&self) -> u32 {
		Store::block_size(self)
	}

	fn commit_block(&self, block: Block) -> Result<BlockId> {
		self.append(&block)
	}

	fn replace_block(&self, id: BlockId, block: &Block) -> Result<()> {
		self.replace(id, block)
	}

	fn request_block(&self, id: BlockId) -> Result<Block> {
		self.get(id)
	}

	fn request_blocks(&self, ids: &[BlockId]) -> Result<Vec<Block>> {
		self.get_batch(ids)
	}
}
