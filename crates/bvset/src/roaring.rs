use roaring::RoaringBitmap;

use crate::block::Block;
use crate::config::SortHint;
use crate::vector::BitVector;
use crate::{join, BLOCK_BITS};

impl BitVector {
    /// Build an unbounded vector holding the positions of `rb`.
    pub fn from_roaring(rb: &RoaringBitmap) -> Self {
        let positions: Vec<u32> = rb.iter().collect();
        let mut bv = BitVector::new();
        bv.set_positions(&positions, SortHint::Sorted);
        bv
    }

    /// Convert this vector to a `RoaringBitmap`.
    ///
    /// `Full` blocks and runs are inserted as ranges.
    pub fn to_roaring(&self) -> RoaringBitmap {
        let mut rb = RoaringBitmap::new();
        for (index, block) in self.store().iter() {
            let base = join(index, 0);
            match block {
                Block::Empty => {}
                Block::Full => {
                    rb.insert_range(base..=base + (BLOCK_BITS - 1));
                }
                Block::RunList(runs) => {
                    for (start, end) in runs.runs() {
                        rb.insert_range(base + start..=base + (end - 1));
                    }
                }
                Block::Bitmap(words) => {
                    for (i, &word) in words.iter().enumerate() {
                        let mut bits = word;
                        while bits != 0 {
                            let bit = bits.trailing_zeros();
                            rb.insert(base + (i as u32) * 64 + bit);
                            bits &= bits - 1;
                        }
                    }
                }
            }
        }
        rb
    }
}

impl From<&RoaringBitmap> for BitVector {
    fn from(rb: &RoaringBitmap) -> Self {
        BitVector::from_roaring(rb)
    }
}
