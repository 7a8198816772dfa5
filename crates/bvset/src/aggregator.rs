use tracing::trace;

use crate::block::{Block, BlockView};
use crate::config::CompressionLevel;
use crate::ops::{combine_block, push_block, Operation};
use crate::store::BlockStore;
use crate::vector::BitVector;
use crate::max_size;

/// Combines many vectors into one target in a single block-by-block pass.
///
/// Sources are borrowed, so they outlive the aggregator by construction. For
/// each block index the sources are scanned together, stopping early once the
/// result is decided: the first `Full` source block for OR, the first missing
/// (`Empty`) source block for AND.
///
/// ```
/// use bvset::{Aggregator, BitVector};
///
/// let (a, b, c) = (BitVector::from([1, 2]), BitVector::from([2, 3]), BitVector::from([3, 4]));
/// let mut agg = Aggregator::new();
/// agg.set_optimization();
/// agg.add(&a);
/// agg.add(&b);
/// agg.add(&c);
///
/// let mut target = BitVector::new();
/// agg.combine_or(&mut target);
/// assert_eq!(target.iter().collect::<Vec<_>>(), vec![1, 2, 3, 4]);
/// ```
#[derive(Debug, Default)]
pub struct Aggregator<'a> {
    sources: Vec<&'a BitVector>,
    /// Second group, subtracted by [`combine_and_sub`](Self::combine_and_sub).
    sub_sources: Vec<&'a BitVector>,
    optimization: Option<CompressionLevel>,
}

impl<'a> Aggregator<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a source vector. Returns the number of attached sources.
    pub fn add(&mut self, bv: &'a BitVector) -> usize {
        self.sources.push(bv);
        self.sources.len()
    }

    /// Attach a vector to the group subtracted by
    /// [`combine_and_sub`](Self::combine_and_sub).
    pub fn add_sub(&mut self, bv: &'a BitVector) -> usize {
        self.sub_sources.push(bv);
        self.sub_sources.len()
    }

    /// Optimize the target after each combine at the default level.
    pub fn set_optimization(&mut self) {
        self.set_optimization_level(CompressionLevel::default());
    }

    /// Optimize the target after each combine at `level`.
    pub fn set_optimization_level(&mut self, level: CompressionLevel) {
        self.optimization = Some(level);
    }

    /// Number of sources in the main group.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Detach all sources and disable optimization.
    pub fn reset(&mut self) {
        self.sources.clear();
        self.sub_sources.clear();
        self.optimization = None;
    }

    /// `target = OR of all sources`. With no sources the target is empty.
    pub fn combine_or(&self, target: &mut BitVector) {
        let blocks = or_blocks(&self.sources);
        self.finish(target, blocks, sizes(&self.sources), Operation::Or);
    }

    /// `target = AND of all sources`.
    ///
    /// AND over zero sources has no meaningful result; the target becomes an
    /// empty vector.
    pub fn combine_and(&self, target: &mut BitVector) {
        let blocks = and_blocks(&self.sources);
        self.finish(target, blocks, sizes(&self.sources), Operation::And);
    }

    /// `target = (AND of all sources) - (OR of the sub group)`.
    pub fn combine_and_sub(&self, target: &mut BitVector) {
        let mut blocks = and_blocks(&self.sources);
        if !blocks.is_empty() && !self.sub_sources.is_empty() {
            let mut kept = Vec::with_capacity(blocks.len());
            for (index, block) in blocks {
                let mut block = block;
                for bv in &self.sub_sources {
                    if block.is_empty() {
                        break;
                    }
                    block = combine_block(block, bv.store().get(index).view(), Operation::Sub);
                }
                push_block(&mut kept, index, block);
            }
            blocks = kept;
        }

        let size = max_size(sizes(&self.sources), sizes(&self.sub_sources));
        self.finish(target, blocks, size, Operation::Sub);
    }

    fn finish(
        &self,
        target: &mut BitVector,
        blocks: Vec<(u16, Block)>,
        size: Option<u32>,
        op: Operation,
    ) {
        // No sources: the target is a fresh, unbounded empty vector.
        let size = if self.sources.is_empty() { None } else { size };

        let mut store = BlockStore::new();
        store.put_blocks(blocks);
        *target = BitVector::from_parts(size, store);

        if let Some(level) = self.optimization {
            target.optimize(level);
        }

        trace!(
            sources = self.sources.len(),
            sub_sources = self.sub_sources.len(),
            ?op,
            blocks = target.store().len(),
            "aggregated bit-vectors"
        );
    }
}

/// Largest size among `sources`; `None` when any is unbounded. An empty group
/// contributes a zero bound.
fn sizes(sources: &[&BitVector]) -> Option<u32> {
    sources
        .iter()
        .map(|bv| bv.size())
        .reduce(max_size)
        .unwrap_or(Some(0))
}

fn or_blocks(sources: &[&BitVector]) -> Vec<(u16, Block)> {
    let mut indexes: Vec<u16> = sources
        .iter()
        .flat_map(|bv| bv.store().iter().map(|(index, _)| index))
        .collect();
    indexes.sort_unstable();
    indexes.dedup();

    let mut out = Vec::with_capacity(indexes.len());
    for index in indexes {
        let mut acc = Block::Empty;
        for bv in sources {
            match bv.store().get(index).view() {
                BlockView::Empty => {}
                BlockView::Full => {
                    acc = Block::Full;
                    break;
                }
                view => acc = combine_block(acc, view, Operation::Or),
            }
        }
        push_block(&mut out, index, acc);
    }
    out
}

fn and_blocks(sources: &[&BitVector]) -> Vec<(u16, Block)> {
    // Only indexes present in every source can survive; walk the sparsest.
    let Some(sparsest) = sources.iter().min_by_key(|bv| bv.store().len()) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    'blocks: for (index, _) in sparsest.store().iter() {
        let mut acc = Block::Full;
        for bv in sources {
            match bv.store().get(index).view() {
                BlockView::Empty => continue 'blocks,
                BlockView::Full => {}
                view => {
                    acc = combine_block(acc, view, Operation::And);
                    if acc.is_empty() {
                        continue 'blocks;
                    }
                }
            }
        }
        push_block(&mut out, index, acc);
    }
    out
}
