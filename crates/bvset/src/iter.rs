use crate::block::{Block, Words};
use crate::store::BlockStore;
use crate::{BLOCK_BITS, BLOCK_WORDS};

/// Iterator over the set positions of a [`BitVector`](crate::BitVector), in
/// ascending order.
///
/// Walks the stored blocks one at a time: `Full` blocks and run lists are
/// yielded as ranges, bitmaps by clearing the lowest set bit of each word.
/// Empty regions cost nothing since they are not stored.
pub struct Enumerator<'a> {
    blocks: std::slice::Iter<'a, (u16, Block)>,
    cursor: Cursor<'a>,
    /// Position of offset 0 of the current block.
    base: u32,
}

enum Cursor<'a> {
    Done,
    /// Remaining offsets `[next, end)` of a `Full` block.
    Range { next: u32, end: u32 },
    Words {
        words: &'a Words,
        /// Index of the word `bits` was loaded from.
        index: usize,
        /// Remaining set bits of the current word.
        bits: u64,
    },
    Runs {
        /// Toggles not yet consumed.
        toggles: &'a [u16],
        next: u32,
        end: u32,
    },
}

impl<'a> Enumerator<'a> {
    pub(crate) fn new(store: &'a BlockStore) -> Self {
        Self {
            blocks: store.blocks().iter(),
            cursor: Cursor::Done,
            base: 0,
        }
    }

    /// Load the next stored block. Returns `false` when exhausted.
    fn advance_block(&mut self) -> bool {
        let Some((index, block)) = self.blocks.next() else {
            return false;
        };

        self.base = (*index as u32) << 16;
        self.cursor = match block {
            Block::Empty => Cursor::Done,
            Block::Full => Cursor::Range {
                next: 0,
                end: BLOCK_BITS,
            },
            Block::Bitmap(words) => Cursor::Words {
                words,
                index: 0,
                bits: words[0],
            },
            Block::RunList(runs) => Cursor::Runs {
                toggles: runs.toggles(),
                next: 0,
                end: 0,
            },
        };
        true
    }

    /// The next set offset inside the current block.
    fn next_offset(&mut self) -> Option<u32> {
        match &mut self.cursor {
            Cursor::Done => None,
            Cursor::Range { next, end } => {
                if next < end {
                    *next += 1;
                    Some(*next - 1)
                } else {
                    None
                }
            }
            Cursor::Words { words, index, bits } => loop {
                if *bits != 0 {
                    let bit = bits.trailing_zeros();
                    *bits &= *bits - 1;
                    return Some((*index as u32) * 64 + bit);
                }
                *index += 1;
                if *index >= BLOCK_WORDS {
                    return None;
                }
                *bits = words[*index];
            },
            Cursor::Runs { toggles, next, end } => {
                if next == end {
                    let remaining: &'a [u16] = *toggles;
                    let (&start, rest) = remaining.split_first()?;
                    let (stop, rest) = match rest.split_first() {
                        Some((&stop, rest)) => (stop as u32, rest),
                        None => (BLOCK_BITS, rest),
                    };
                    *next = start as u32;
                    *end = stop;
                    *toggles = rest;
                }
                *next += 1;
                Some(*next - 1)
            }
        }
    }
}

impl Iterator for Enumerator<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        loop {
            if let Some(offset) = self.next_offset() {
                return Some(self.base + offset);
            }
            if !self.advance_block() {
                return None;
            }
        }
    }
}
