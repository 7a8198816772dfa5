use crate::config::{CompressionLevel, MUTATION_RUN_BUDGET};
use crate::ops::{Operation, Tag};
use crate::{BLOCK_BITS, BLOCK_WORDS};

/// Packed bits of one bitmap block.
pub type Words = [u64; BLOCK_WORDS];

/// Contents of one [`BLOCK_BITS`]-wide slice of the bit space.
///
/// Blocks held by a [`BlockStore`](crate::BlockStore) are always canonical:
/// a payload whose bits are all zero is [`Block::Empty`] (and is not stored at
/// all), a payload whose bits are all one is [`Block::Full`].
#[derive(Clone, Debug)]
#[cfg_attr(feature = "allocative", derive(allocative::Allocative))]
pub enum Block {
    /// All bits clear.
    Empty,
    /// All bits set.
    Full,
    /// Raw packed bits, bit `i` lives in word `i / 64` at position `i % 64`.
    Bitmap(Box<Words>),
    /// Toggle positions, compact for long runs.
    RunList(RunList),
}

/// The variant of a [`Block`], without its payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Empty,
    Full,
    Bitmap,
    RunList,
}

/// Borrowed block contents. Lets the engine fold decoded scratch payloads and
/// stored blocks through the same code path.
#[derive(Clone, Copy, Debug)]
pub(crate) enum BlockView<'a> {
    Empty,
    Full,
    Bitmap(&'a Words),
    RunList(&'a [u16]),
}

impl BlockView<'_> {
    #[inline]
    pub(crate) fn tag(&self) -> Tag {
        match self {
            BlockView::Empty => Tag::Empty,
            BlockView::Full => Tag::Full,
            BlockView::Bitmap(_) | BlockView::RunList(_) => Tag::Payload,
        }
    }

    /// Copy the viewed contents into an owned block.
    pub(crate) fn to_block(self) -> Block {
        match self {
            BlockView::Empty => Block::Empty,
            BlockView::Full => Block::Full,
            BlockView::Bitmap(words) => Block::Bitmap(Box::new(*words)),
            BlockView::RunList(toggles) => Block::RunList(RunList::from_toggles(toggles.to_vec())),
        }
    }
}

impl Block {
    pub fn kind(&self) -> BlockKind {
        match self {
            Block::Empty => BlockKind::Empty,
            Block::Full => BlockKind::Full,
            Block::Bitmap(_) => BlockKind::Bitmap,
            Block::RunList(_) => BlockKind::RunList,
        }
    }

    #[inline]
    pub(crate) fn tag(&self) -> Tag {
        match self {
            Block::Empty => Tag::Empty,
            Block::Full => Tag::Full,
            Block::Bitmap(_) | Block::RunList(_) => Tag::Payload,
        }
    }

    #[inline]
    pub(crate) fn view(&self) -> BlockView<'_> {
        match self {
            Block::Empty => BlockView::Empty,
            Block::Full => BlockView::Full,
            Block::Bitmap(words) => BlockView::Bitmap(words),
            Block::RunList(runs) => BlockView::RunList(&runs.toggles),
        }
    }

    /// Returns `true` for the `Empty` variant. Canonical blocks with no set
    /// bit are always `Empty`.
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, Block::Empty)
    }

    /// Test whether the bit at `offset` is set.
    pub fn contains(&self, offset: u16) -> bool {
        match self {
            Block::Empty => false,
            Block::Full => true,
            Block::Bitmap(words) => words[(offset / 64) as usize] & (1u64 << (offset % 64)) != 0,
            Block::RunList(runs) => runs.contains(offset),
        }
    }

    /// Number of set bits.
    pub fn count(&self) -> u32 {
        match self {
            Block::Empty => 0,
            Block::Full => BLOCK_BITS,
            Block::Bitmap(words) => words.iter().map(|w| w.count_ones()).sum(),
            Block::RunList(runs) => runs.count(),
        }
    }

    /// Number of set bits with offsets in `[start, end)`, `end <= BLOCK_BITS`.
    pub fn count_range(&self, start: u32, end: u32) -> u32 {
        let end = end.min(BLOCK_BITS);
        if start >= end {
            return 0;
        }

        match self {
            Block::Empty => 0,
            Block::Full => end - start,
            Block::Bitmap(words) => {
                let mut count = 0;
                for_each_mask(start, end, |i, mask| count += (words[i] & mask).count_ones());
                count
            }
            Block::RunList(runs) => runs
                .runs()
                .map(|(s, e)| e.min(end).saturating_sub(s.max(start)))
                .sum(),
        }
    }

    /// The lowest set offset.
    pub fn first(&self) -> Option<u16> {
        match self {
            Block::Empty => None,
            Block::Full => Some(0),
            Block::Bitmap(words) => words
                .iter()
                .position(|&w| w != 0)
                .map(|i| (i * 64) as u16 + words[i].trailing_zeros() as u16),
            Block::RunList(runs) => runs.toggles.first().copied(),
        }
    }

    /// The highest set offset.
    pub fn last(&self) -> Option<u16> {
        match self {
            Block::Empty => None,
            Block::Full => Some(u16::MAX),
            Block::Bitmap(words) => words
                .iter()
                .rposition(|&w| w != 0)
                .map(|i| (i * 64) as u16 + 63 - words[i].leading_zeros() as u16),
            Block::RunList(runs) => runs.last(),
        }
    }

    /// The number of heap-allocated bytes used by this block.
    pub fn heap_bytes(&self) -> usize {
        match self {
            Block::Empty | Block::Full => 0,
            Block::Bitmap(_) => std::mem::size_of::<Words>(),
            Block::RunList(runs) => runs.toggles.capacity() * std::mem::size_of::<u16>(),
        }
    }

    /// Replace all-zero payloads with `Empty` and all-one payloads with `Full`.
    pub fn canonicalize(&mut self) {
        let replacement = match self {
            Block::Bitmap(words) => {
                if words.iter().all(|&w| w == 0) {
                    Some(Block::Empty)
                } else if words.iter().all(|&w| w == u64::MAX) {
                    Some(Block::Full)
                } else {
                    None
                }
            }
            Block::RunList(runs) => {
                if runs.is_empty() {
                    Some(Block::Empty)
                } else if runs.is_full() {
                    Some(Block::Full)
                } else {
                    None
                }
            }
            Block::Empty | Block::Full => None,
        };

        if let Some(block) = replacement {
            *self = block;
        }
    }

    /// Rewrite the block into its most compact faithful form for `level`.
    pub fn optimize(&mut self, level: CompressionLevel) {
        self.canonicalize();

        let Some(budget) = level.run_budget() else {
            return;
        };

        match self {
            Block::Bitmap(words) => {
                if let Some(mut runs) = RunList::from_words(words, budget) {
                    runs.toggles.shrink_to_fit();
                    *self = Block::RunList(runs);
                }
            }
            Block::RunList(runs) => {
                if runs.len() * std::mem::size_of::<u16>() > std::mem::size_of::<Words>() {
                    *self = Block::Bitmap(runs.to_words());
                } else {
                    runs.toggles.shrink_to_fit();
                }
            }
            Block::Empty | Block::Full => {}
        }
    }

    /// Logical equality, independent of the representation.
    pub fn content_eq(&self, other: &Block) -> bool {
        match (self, other) {
            (Block::Empty, Block::Empty) | (Block::Full, Block::Full) => true,
            (Block::Bitmap(a), Block::Bitmap(b)) => a == b,
            // Toggle lists are unique for a given set of bits.
            (Block::RunList(a), Block::RunList(b)) => a == b,
            _ => self.to_words()[..] == other.to_words()[..],
        }
    }

    /// Materialize the block as packed bits.
    pub fn to_words(&self) -> Box<Words> {
        match self {
            Block::Empty => new_words(0),
            Block::Full => new_words(u64::MAX),
            Block::Bitmap(words) => words.clone(),
            Block::RunList(runs) => runs.to_words(),
        }
    }

    /// Build a canonical block from ascending offsets.
    ///
    /// Starts as a run list and falls back to a bitmap as soon as the toggle
    /// count exceeds the mutation budget.
    pub(crate) fn from_sorted_offsets(offsets: &[u16]) -> Block {
        let mut block = match RunList::build(offsets.iter().copied(), MUTATION_RUN_BUDGET) {
            Some(runs) => Block::RunList(runs),
            None => {
                let mut words = new_words(0);
                for &offset in offsets {
                    words[(offset / 64) as usize] |= 1u64 << (offset % 64);
                }
                Block::Bitmap(words)
            }
        };
        block.canonicalize();
        block
    }

    /// Set or clear one bit, returning `true` if the block changed.
    pub(crate) fn set_bit(&mut self, offset: u16, value: bool) -> bool {
        match self {
            Block::Empty => {
                if !value {
                    return false;
                }
                *self = Block::RunList(RunList::single(offset));
                true
            }
            Block::Full => {
                if value {
                    return false;
                }
                let mut runs = RunList::full();
                runs.set(offset, false);
                *self = Block::RunList(runs);
                true
            }
            Block::Bitmap(words) => {
                let (i, bit) = ((offset / 64) as usize, 1u64 << (offset % 64));
                let old = words[i];
                let new = if value { old | bit } else { old & !bit };
                if new == old {
                    return false;
                }
                words[i] = new;
                if new == 0 || new == u64::MAX {
                    self.canonicalize();
                }
                true
            }
            Block::RunList(runs) => {
                if !runs.set(offset, value) {
                    return false;
                }
                if runs.len() > MUTATION_RUN_BUDGET {
                    *self = Block::Bitmap(runs.to_words());
                } else {
                    self.canonicalize();
                }
                true
            }
        }
    }

    /// The logical complement of this block.
    pub(crate) fn complement(self) -> Block {
        match self {
            Block::Empty => Block::Full,
            Block::Full => Block::Empty,
            Block::Bitmap(mut words) => {
                for w in words.iter_mut() {
                    *w = !*w;
                }
                Block::Bitmap(words)
            }
            Block::RunList(mut runs) => {
                runs.complement();
                Block::RunList(runs)
            }
        }
    }
}

/// A block encoded as strictly ascending toggle positions.
///
/// The running bit value starts at 0 and flips at every toggle, so offset `x`
/// is set iff an odd number of toggles are `<= x`. A trailing run that reaches
/// the end of the block has no closing toggle. The toggle list of a given set
/// of bits is unique.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "allocative", derive(allocative::Allocative))]
pub struct RunList {
    toggles: Vec<u16>,
}

impl RunList {
    /// Wrap a toggle list. Toggles must be strictly ascending.
    pub fn from_toggles(toggles: Vec<u16>) -> Self {
        debug_assert!(
            toggles.windows(2).all(|w| w[0] < w[1]),
            "toggles must be strictly ascending"
        );
        Self { toggles }
    }

    pub(crate) fn single(offset: u16) -> Self {
        let mut toggles = vec![offset];
        if offset < u16::MAX {
            toggles.push(offset + 1);
        }
        Self { toggles }
    }

    pub(crate) fn full() -> Self {
        Self { toggles: vec![0] }
    }

    /// Build from ascending offsets, or `None` once more than `budget` toggles
    /// would be needed. Duplicates are tolerated.
    pub(crate) fn build(offsets: impl IntoIterator<Item = u16>, budget: usize) -> Option<Self> {
        let mut toggles = Vec::new();
        let mut run: Option<(u32, u32)> = None;

        for offset in offsets {
            let offset = offset as u32;
            match &mut run {
                Some((start, end)) if offset >= *start && offset <= *end => {
                    *end = (*end).max(offset + 1);
                }
                _ => {
                    if let Some((start, end)) = run.take() {
                        push_run(&mut toggles, start, end);
                        if toggles.len() > budget {
                            return None;
                        }
                    }
                    run = Some((offset, offset + 1));
                }
            }
        }

        if let Some((start, end)) = run {
            push_run(&mut toggles, start, end);
        }
        if toggles.len() > budget {
            return None;
        }

        Some(Self { toggles })
    }

    /// Build from packed bits, scanning for value flips word by word, or
    /// `None` once more than `budget` toggles would be needed.
    pub(crate) fn from_words(words: &Words, budget: usize) -> Option<Self> {
        let mut toggles = Vec::new();
        collect_toggles(words, &mut toggles, budget).then_some(Self { toggles })
    }

    /// Merge two toggle streams under `op`, emitting a toggle wherever the
    /// combined value changes.
    pub(crate) fn merge(a: &[u16], b: &[u16], op: Operation) -> Self {
        let mut toggles = Vec::with_capacity(a.len() + b.len());
        let (mut i, mut j) = (0, 0);
        let (mut va, mut vb, mut current) = (false, false, false);

        while i < a.len() || j < b.len() {
            let pa = a.get(i).map_or(u32::MAX, |&t| t as u32);
            let pb = b.get(j).map_or(u32::MAX, |&t| t as u32);
            let pos = pa.min(pb);

            if pa == pos {
                va = !va;
                i += 1;
            }
            if pb == pos {
                vb = !vb;
                j += 1;
            }

            let value = op.apply_bit(va, vb);
            if value != current {
                toggles.push(pos as u16);
                current = value;
            }
        }

        Self { toggles }
    }

    /// The toggle positions.
    pub fn toggles(&self) -> &[u16] {
        &self.toggles
    }

    /// Number of toggles.
    pub fn len(&self) -> usize {
        self.toggles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.toggles.is_empty()
    }

    pub(crate) fn is_full(&self) -> bool {
        self.toggles.as_slice() == [0]
    }

    pub fn contains(&self, offset: u16) -> bool {
        self.toggles.partition_point(|&t| t <= offset) % 2 == 1
    }

    pub fn count(&self) -> u32 {
        self.runs().map(|(start, end)| end - start).sum()
    }

    /// Set runs as half-open `[start, end)` offset ranges.
    pub fn runs(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        runs(&self.toggles)
    }

    pub(crate) fn last(&self) -> Option<u16> {
        if self.toggles.len() % 2 == 1 {
            Some(u16::MAX)
        } else {
            self.toggles.last().map(|&end| end - 1)
        }
    }

    /// Set or clear one offset, returning `true` if anything changed.
    pub(crate) fn set(&mut self, offset: u16, value: bool) -> bool {
        if self.contains(offset) == value {
            return false;
        }
        self.flip_range(offset as u32, offset as u32 + 1);
        true
    }

    /// Invert `[start, end)` by toggling both boundaries.
    pub(crate) fn flip_range(&mut self, start: u32, end: u32) {
        self.toggle(start);
        self.toggle(end);
    }

    fn toggle(&mut self, pos: u32) {
        if pos >= BLOCK_BITS {
            return;
        }
        match self.toggles.binary_search(&(pos as u16)) {
            Ok(i) => {
                self.toggles.remove(i);
            }
            Err(i) => self.toggles.insert(i, pos as u16),
        }
    }

    pub(crate) fn complement(&mut self) {
        if self.toggles.first() == Some(&0) {
            self.toggles.remove(0);
        } else {
            self.toggles.insert(0, 0);
        }
    }

    pub(crate) fn to_words(&self) -> Box<Words> {
        let mut words = new_words(0);
        self.write_words(&mut words);
        words
    }

    /// Overwrite `words` with the contents of this run list.
    pub(crate) fn write_words(&self, words: &mut Words) {
        words.fill(0);
        for (start, end) in self.runs() {
            set_range(words, start, end);
        }
    }
}

/// Write the toggle positions of `words` into `out`. Returns `false` (with
/// `out` partially filled) as soon as more than `budget` toggles are needed.
pub(crate) fn collect_toggles(words: &Words, out: &mut Vec<u16>, budget: usize) -> bool {
    out.clear();
    let mut carry = 0u64;

    for (i, &w) in words.iter().enumerate() {
        let mut flips = w ^ ((w << 1) | carry);
        carry = w >> 63;

        if flips == 0 {
            continue;
        }
        if out.len() + flips.count_ones() as usize > budget {
            return false;
        }

        while flips != 0 {
            out.push((i * 64) as u16 + flips.trailing_zeros() as u16);
            flips &= flips - 1;
        }
    }

    true
}

fn push_run(toggles: &mut Vec<u16>, start: u32, end: u32) {
    toggles.push(start as u16);
    if end < BLOCK_BITS {
        toggles.push(end as u16);
    }
}

/// Iterate `[start, end)` runs of a toggle list.
pub(crate) fn runs(toggles: &[u16]) -> impl Iterator<Item = (u32, u32)> + '_ {
    toggles.chunks(2).map(|pair| {
        let end = pair.get(1).map_or(BLOCK_BITS, |&end| end as u32);
        (pair[0] as u32, end)
    })
}

pub(crate) fn new_words(fill: u64) -> Box<Words> {
    Box::new([fill; BLOCK_WORDS])
}

/// Call `f(word_index, mask)` for every word overlapping `[start, end)`.
#[inline]
fn for_each_mask(start: u32, end: u32, mut f: impl FnMut(usize, u64)) {
    if start >= end {
        return;
    }

    let first = (start / 64) as usize;
    let last = ((end - 1) / 64) as usize;
    for i in first..=last {
        let mut mask = u64::MAX;
        if i == first {
            mask &= u64::MAX << (start % 64);
        }
        if i == last {
            mask &= u64::MAX >> (63 - (end - 1) % 64);
        }
        f(i, mask);
    }
}

pub(crate) fn set_range(words: &mut Words, start: u32, end: u32) {
    for_each_mask(start, end, |i, mask| words[i] |= mask);
}

pub(crate) fn clear_range(words: &mut Words, start: u32, end: u32) {
    for_each_mask(start, end, |i, mask| words[i] &= !mask);
}

pub(crate) fn flip_range(words: &mut Words, start: u32, end: u32) {
    for_each_mask(start, end, |i, mask| words[i] ^= mask);
}

/// Apply `op` between packed bits and a toggle list, in place.
pub(crate) fn apply_runs(words: &mut Words, toggles: &[u16], op: Operation) {
    match op {
        Operation::Or => runs(toggles).for_each(|(s, e)| set_range(words, s, e)),
        Operation::Sub => runs(toggles).for_each(|(s, e)| clear_range(words, s, e)),
        Operation::Xor => runs(toggles).for_each(|(s, e)| flip_range(words, s, e)),
        Operation::And => {
            // Clear the gaps between runs.
            let mut cursor = 0;
            for (start, end) in runs(toggles) {
                clear_range(words, cursor, start);
                cursor = end;
            }
            clear_range(words, cursor, BLOCK_BITS);
        }
    }
}
