use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, BitXor, BitXorAssign, Sub, SubAssign};
use std::ops::{Bound, RangeBounds};

use tracing::debug;

use crate::block::{Block, BlockKind};
use crate::config::{CompressionLevel, SortHint};
use crate::iter::Enumerator;
use crate::ops::{combine_block, combine_stores, Operation};
use crate::store::BlockStore;
use crate::{join, max_size, split, BLOCK_BITS};

/// A compressed set of `u32` positions with an optional logical size.
///
/// The size is an exclusive upper bound on addressable positions; `None`
/// means unbounded. No bit at or beyond a bounded size is ever set: setting
/// such a bit grows the size, and shrinking clears the tail.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "allocative", derive(allocative::Allocative))]
pub struct BitVector {
    size: Option<u32>,
    store: BlockStore,
}

/// Block-level breakdown of a vector's memory use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Statistics {
    pub full_blocks: usize,
    pub bitmap_blocks: usize,
    pub run_blocks: usize,
    /// Total toggles across all run-list blocks.
    pub run_toggles: usize,
    pub heap_bytes: usize,
}

impl BitVector {
    /// Create an empty, unbounded vector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty vector with a bounded logical size.
    pub fn with_size(size: u32) -> Self {
        Self {
            size: Some(size),
            store: BlockStore::new(),
        }
    }

    pub(crate) fn from_parts(size: Option<u32>, store: BlockStore) -> Self {
        Self { size, store }
    }

    /// The logical size, or `None` when unbounded.
    pub fn size(&self) -> Option<u32> {
        self.size
    }

    /// Change the logical size.
    ///
    /// Growing never sets bits. Shrinking clears every bit at or beyond
    /// `new_size`.
    pub fn resize(&mut self, new_size: u32) {
        let shrinking = self.size.is_none_or(|size| new_size < size);
        if shrinking {
            self.store.truncate(new_size);
        }
        self.size = Some(new_size);
    }

    /// Test whether `pos` is set.
    pub fn get(&self, pos: u32) -> bool {
        let (index, offset) = split(pos);
        self.store.get(index).contains(offset)
    }

    /// Alias for [`get`](Self::get).
    pub fn contains(&self, pos: u32) -> bool {
        self.get(pos)
    }

    /// Set `pos`, returning `true` if it was previously clear.
    pub fn set(&mut self, pos: u32) -> bool {
        self.set_bit(pos, true)
    }

    /// Clear `pos`, returning `true` if it was previously set.
    pub fn clear_bit(&mut self, pos: u32) -> bool {
        self.set_bit(pos, false)
    }

    /// Set `pos` to `value`, returning `true` if the bit changed.
    ///
    /// Setting a bit at or beyond a bounded size grows the size to `pos + 1`.
    pub fn set_bit(&mut self, pos: u32, value: bool) -> bool {
        if value {
            self.cover(pos);
        } else if self.size.is_some_and(|size| pos >= size) {
            return false;
        }

        let (index, offset) = split(pos);
        self.store.update(index, |block| block.set_bit(offset, value))
    }

    /// Set every position in `positions`.
    ///
    /// With [`SortHint::Sorted`] the positions must be strictly ascending and
    /// are merged in one pass, one block group at a time. With
    /// [`SortHint::Unsorted`] each position is inserted on its own.
    pub fn set_positions(&mut self, positions: &[u32], hint: SortHint) {
        match hint {
            SortHint::Unsorted => {
                for &pos in positions {
                    self.set(pos);
                }
            }
            SortHint::Sorted => self.merge_sorted(positions),
        }
    }

    fn merge_sorted(&mut self, positions: &[u32]) {
        let mut offsets = Vec::new();
        let mut rest = positions;

        while let Some(&first) = rest.first() {
            let (index, _) = split(first);
            let len = rest.partition_point(|&pos| split(pos).0 <= index).max(1);
            let (group, tail) = rest.split_at(len);

            offsets.clear();
            offsets.extend(group.iter().map(|&pos| split(pos).1));
            let incoming = Block::from_sorted_offsets(&offsets);

            let block = combine_block(self.store.remove(index), incoming.view(), Operation::Or);
            self.store.set(index, block);

            if let Some(&max) = group.iter().max() {
                self.cover(max);
            }
            rest = tail;
        }
    }

    /// Set or clear every position in `range`.
    ///
    /// Fully covered blocks become `Full` (or are dropped when clearing)
    /// without touching individual bits.
    pub fn set_range(&mut self, range: impl RangeBounds<u32>, value: bool) {
        let Some((start, end)) = bounds(range) else {
            return;
        };

        if value {
            self.cover((end - 1) as u32);
        }
        let end = match self.size {
            Some(size) if !value => end.min(size as u64),
            _ => end,
        };
        if start >= end {
            return;
        }

        let first = (start >> 16) as u16;
        let last = ((end - 1) >> 16) as u16;
        for index in first..=last {
            let base = (index as u64) << 16;
            let lo = start.saturating_sub(base).min(BLOCK_BITS as u64) as u32;
            let hi = (end - base).min(BLOCK_BITS as u64) as u32;
            self.store.fill_range(index, lo, hi, value);
        }
    }

    /// Clear all bits, keeping the size.
    pub fn clear(&mut self) {
        self.store.clear();
    }

    /// Number of set bits.
    pub fn count(&self) -> u64 {
        self.store.count()
    }

    /// Number of set bits inside `range`.
    pub fn count_range(&self, range: impl RangeBounds<u32>) -> u64 {
        let Some((start, end)) = bounds(range) else {
            return 0;
        };

        let first = (start >> 16) as u16;
        let last = ((end - 1) >> 16) as u16;
        self.store
            .iter()
            .filter(|(index, _)| (first..=last).contains(index))
            .map(|(index, block)| {
                let base = (index as u64) << 16;
                let lo = start.saturating_sub(base).min(BLOCK_BITS as u64) as u32;
                let hi = (end - base).min(BLOCK_BITS as u64) as u32;
                block.count_range(lo, hi) as u64
            })
            .sum()
    }

    /// Returns `true` if no bits are set.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Returns `true` if at least one bit is set.
    pub fn any(&self) -> bool {
        !self.store.is_empty()
    }

    /// The smallest set position.
    pub fn min(&self) -> Option<u32> {
        let (index, block) = self.store.iter().next()?;
        block.first().map(|offset| join(index, offset))
    }

    /// The largest set position.
    pub fn max(&self) -> Option<u32> {
        let (index, block) = self.store.blocks().last()?;
        block.last().map(|offset| join(*index, offset))
    }

    /// An enumerator over set positions in ascending order.
    pub fn first(&self) -> Enumerator<'_> {
        Enumerator::new(&self.store)
    }

    /// Alias for [`first`](Self::first).
    pub fn iter(&self) -> Enumerator<'_> {
        self.first()
    }

    /// Rewrite every block into its most compact form for `level`.
    pub fn optimize(&mut self, level: CompressionLevel) {
        let before = self.store.heap_bytes();
        self.store.optimize(level);
        debug!(
            level = level.get(),
            blocks = self.store.len(),
            before,
            after = self.store.heap_bytes(),
            "optimized bit-vector"
        );
    }

    /// Per-variant block counts and memory use.
    pub fn statistics(&self) -> Statistics {
        let mut stats = Statistics {
            heap_bytes: self.store.heap_bytes(),
            ..Statistics::default()
        };

        for (_, block) in self.store.iter() {
            match block {
                Block::Full => stats.full_blocks += 1,
                Block::Bitmap(_) => stats.bitmap_blocks += 1,
                Block::RunList(runs) => {
                    stats.run_blocks += 1;
                    stats.run_toggles += runs.len();
                }
                Block::Empty => {}
            }
        }

        stats
    }

    /// The number of heap-allocated bytes used by this vector.
    pub fn heap_bytes(&self) -> usize {
        self.store.heap_bytes()
    }

    /// The underlying block store.
    pub fn store(&self) -> &BlockStore {
        &self.store
    }

    /// The variant of the block holding `pos`.
    pub fn block_kind(&self, pos: u32) -> BlockKind {
        self.store.get(split(pos).0).kind()
    }

    /// Union with `other`, in place.
    pub fn bit_or(&mut self, other: &BitVector) -> &mut Self {
        self.combine_operation(other, Operation::Or)
    }

    /// Intersection with `other`, in place.
    pub fn bit_and(&mut self, other: &BitVector) -> &mut Self {
        self.combine_operation(other, Operation::And)
    }

    /// Difference `self - other`, in place.
    pub fn bit_sub(&mut self, other: &BitVector) -> &mut Self {
        self.combine_operation(other, Operation::Sub)
    }

    /// Symmetric difference with `other`, in place.
    pub fn bit_xor(&mut self, other: &BitVector) -> &mut Self {
        self.combine_operation(other, Operation::Xor)
    }

    /// Combine with `other` under a runtime-selected operation.
    ///
    /// Whatever the operation, the resulting size is the larger of the two
    /// sizes (unbounded wins).
    pub fn combine_operation(&mut self, other: &BitVector, op: Operation) -> &mut Self {
        self.size = max_size(self.size, other.size);
        combine_stores(&mut self.store, &other.store, op);
        self
    }

    pub(crate) fn set_size(&mut self, size: Option<u32>) {
        self.size = size;
    }

    pub(crate) fn store_mut(&mut self) -> &mut BlockStore {
        &mut self.store
    }

    /// Grow a bounded size so that `pos` is addressable.
    pub(crate) fn cover(&mut self, pos: u32) {
        if let Some(size) = self.size {
            if pos >= size {
                self.size = pos.checked_add(1);
            }
        }
    }
}

/// Resolve a range into a non-empty half-open `[start, end)` in `u64`.
fn bounds(range: impl RangeBounds<u32>) -> Option<(u64, u64)> {
    let start = match range.start_bound() {
        Bound::Included(&n) => n as u64,
        Bound::Excluded(&n) => n as u64 + 1,
        Bound::Unbounded => 0,
    };
    let end = match range.end_bound() {
        Bound::Included(&n) => n as u64 + 1,
        Bound::Excluded(&n) => n as u64,
        Bound::Unbounded => u32::MAX as u64 + 1,
    };

    (start < end).then_some((start, end))
}

impl PartialEq for BitVector {
    fn eq(&self, other: &Self) -> bool {
        self.size == other.size
            && self.store.len() == other.store.len()
            && self
                .store
                .iter()
                .zip(other.store.iter())
                .all(|((ia, a), (ib, b))| ia == ib && a.content_eq(b))
    }
}

impl Eq for BitVector {}

impl FromIterator<u32> for BitVector {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        let mut bv = BitVector::new();
        bv.extend(iter);
        bv
    }
}

impl Extend<u32> for BitVector {
    fn extend<I: IntoIterator<Item = u32>>(&mut self, iter: I) {
        let mut positions: Vec<u32> = iter.into_iter().collect();
        positions.sort_unstable();
        positions.dedup();
        self.set_positions(&positions, SortHint::Sorted);
    }
}

impl From<&[u32]> for BitVector {
    fn from(positions: &[u32]) -> Self {
        positions.iter().copied().collect()
    }
}

impl<const N: usize> From<[u32; N]> for BitVector {
    fn from(positions: [u32; N]) -> Self {
        positions.into_iter().collect()
    }
}

impl<'a> IntoIterator for &'a BitVector {
    type Item = u32;
    type IntoIter = Enumerator<'a>;

    fn into_iter(self) -> Enumerator<'a> {
        self.first()
    }
}

impl BitOrAssign<&BitVector> for BitVector {
    fn bitor_assign(&mut self, rhs: &BitVector) {
        self.bit_or(rhs);
    }
}

impl BitAndAssign<&BitVector> for BitVector {
    fn bitand_assign(&mut self, rhs: &BitVector) {
        self.bit_and(rhs);
    }
}

impl SubAssign<&BitVector> for BitVector {
    fn sub_assign(&mut self, rhs: &BitVector) {
        self.bit_sub(rhs);
    }
}

impl BitXorAssign<&BitVector> for BitVector {
    fn bitxor_assign(&mut self, rhs: &BitVector) {
        self.bit_xor(rhs);
    }
}

impl BitOr for &BitVector {
    type Output = BitVector;
    fn bitor(self, rhs: Self) -> BitVector {
        let mut out = self.clone();
        out.bit_or(rhs);
        out
    }
}

impl BitAnd for &BitVector {
    type Output = BitVector;
    fn bitand(self, rhs: Self) -> BitVector {
        let mut out = self.clone();
        out.bit_and(rhs);
        out
    }
}

impl Sub for &BitVector {
    type Output = BitVector;
    fn sub(self, rhs: Self) -> BitVector {
        let mut out = self.clone();
        out.bit_sub(rhs);
        out
    }
}

impl BitXor for &BitVector {
    type Output = BitVector;
    fn bitxor(self, rhs: Self) -> BitVector {
        let mut out = self.clone();
        out.bit_xor(rhs);
        out
    }
}
