use crate::block::{Block, BlockView};
use crate::config::CompressionLevel;
use crate::ops::{combine_block, Operation};
use crate::BLOCK_BITS;

static EMPTY: Block = Block::Empty;

/// Sparse collection of blocks, indexed by block number.
///
/// Blocks are kept in a vector sorted by index so that pairwise operations are
/// a single linear merge walk. `Empty` blocks are never stored: an absent index
/// is empty, and a store with no blocks holds no bits.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "allocative", derive(allocative::Allocative))]
pub struct BlockStore {
    blocks: Vec<(u16, Block)>,
}

impl BlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The block at `index`; absent indexes are `Empty`.
    pub fn get(&self, index: u16) -> &Block {
        match self.position(index) {
            Ok(i) => &self.blocks[i].1,
            Err(_) => &EMPTY,
        }
    }

    /// Insert or replace the block at `index`, canonicalizing it first.
    pub fn set(&mut self, index: u16, mut block: Block) {
        block.canonicalize();
        match (self.position(index), block.is_empty()) {
            (Ok(i), true) => {
                self.blocks.remove(i);
            }
            (Ok(i), false) => self.blocks[i].1 = block,
            (Err(_), true) => {}
            (Err(i), false) => self.blocks.insert(i, (index, block)),
        }
    }

    /// Remove and return the block at `index`.
    pub fn remove(&mut self, index: u16) -> Block {
        match self.position(index) {
            Ok(i) => self.blocks.remove(i).1,
            Err(_) => Block::Empty,
        }
    }

    /// Number of stored (non-empty) blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns `true` if no bits are set.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
    }

    /// Iterate over stored blocks in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Block)> + '_ {
        self.blocks.iter().map(|(index, block)| (*index, block))
    }

    /// Total number of set bits.
    pub fn count(&self) -> u64 {
        self.blocks.iter().map(|(_, b)| b.count() as u64).sum()
    }

    /// The number of heap-allocated bytes used by the store and its blocks.
    pub fn heap_bytes(&self) -> usize {
        self.blocks.capacity() * std::mem::size_of::<(u16, Block)>()
            + self.blocks.iter().map(|(_, b)| b.heap_bytes()).sum::<usize>()
    }

    /// Rewrite every block into its most compact form for `level`.
    pub fn optimize(&mut self, level: CompressionLevel) {
        for (_, block) in self.blocks.iter_mut() {
            block.optimize(level);
        }
        self.blocks.retain(|(_, b)| !b.is_empty());
        self.blocks.shrink_to_fit();
    }

    /// Clear every bit at or beyond `pos`.
    pub(crate) fn truncate(&mut self, pos: u32) {
        let (index, offset) = crate::split(pos);
        let keep = self.blocks.partition_point(|(i, _)| *i < index);
        let boundary = match self.blocks.get(keep) {
            Some((i, _)) if *i == index && offset > 0 => Some(self.blocks.swap_remove(keep).1),
            _ => None,
        };
        self.blocks.truncate(keep);

        if let Some(block) = boundary {
            // A run list with a single toggle covers `offset..BLOCK_BITS`.
            let tail = [offset];
            let block = combine_block(block, BlockView::RunList(&tail), Operation::Sub);
            self.set(index, block);
        }
    }

    /// Apply `value` to every bit of `[start, end)`, with `end <= BLOCK_BITS`,
    /// inside block `index`.
    pub(crate) fn fill_range(&mut self, index: u16, start: u32, end: u32, value: bool) {
        if start >= end {
            return;
        }

        let op = if value { Operation::Or } else { Operation::Sub };
        if start == 0 && end == BLOCK_BITS {
            let block = combine_block(self.remove(index), BlockView::Full, op);
            self.set(index, block);
            return;
        }

        let range = [start as u16, end as u16];
        let toggles: &[u16] = if end == BLOCK_BITS { &range[..1] } else { &range };
        let block = combine_block(self.remove(index), BlockView::RunList(toggles), op);
        self.set(index, block);
    }

    /// Run `f` against the block at `index`, inserting an `Empty` slot first
    /// if needed and dropping the slot again if the block ends up empty.
    pub(crate) fn update<R>(&mut self, index: u16, f: impl FnOnce(&mut Block) -> R) -> R {
        let i = match self.position(index) {
            Ok(i) => i,
            Err(i) => {
                self.blocks.insert(i, (index, Block::Empty));
                i
            }
        };

        let result = f(&mut self.blocks[i].1);
        if self.blocks[i].1.is_empty() {
            self.blocks.remove(i);
        }
        result
    }

    pub(crate) fn blocks(&self) -> &[(u16, Block)] {
        &self.blocks
    }

    pub(crate) fn take_blocks(&mut self) -> Vec<(u16, Block)> {
        std::mem::take(&mut self.blocks)
    }

    /// Install a sorted, canonical, `Empty`-free block vector.
    pub(crate) fn put_blocks(&mut self, blocks: Vec<(u16, Block)>) {
        debug_assert!(blocks.windows(2).all(|w| w[0].0 < w[1].0));
        debug_assert!(blocks.iter().all(|(_, b)| !b.is_empty()));
        self.blocks = blocks;
    }

    #[inline]
    fn position(&self, index: u16) -> Result<usize, usize> {
        self.blocks.binary_search_by_key(&index, |(i, _)| *i)
    }
}
