//! Compressed bit-vector with block-level set algebra.
//!
//! The bit space is cut into blocks of [`BLOCK_BITS`] bits. Each block is
//! stored in the cheapest of four forms (see [`Block`]) and the boolean
//! operators are applied block by block, short-circuiting whenever one side is
//! all-zero or all-one.
//!
//! ```
//! use bvset::{Aggregator, BitVector, CompressionLevel, Operation};
//!
//! let mut a = BitVector::from([1, 2, 3]);
//! let b = BitVector::from([1, 2, 4]);
//! a.bit_or(&b);
//! assert_eq!(a.iter().collect::<Vec<_>>(), vec![1, 2, 3, 4]);
//!
//! // Fold a serialized vector into `a` without decoding it first.
//! let blob = bvset::serialize(&b, CompressionLevel::default());
//! bvset::deserialize_into(&mut a, &blob, Operation::And).unwrap();
//! assert_eq!(a.iter().collect::<Vec<_>>(), vec![1, 2, 4]);
//!
//! let (x, y) = (BitVector::from([1, 2]), BitVector::from([2, 3]));
//! let mut agg = Aggregator::new();
//! agg.add(&x);
//! agg.add(&y);
//! let mut target = BitVector::new();
//! agg.combine_or(&mut target);
//! assert_eq!(target.count(), 3);
//! ```

mod aggregator;
mod algo;
mod block;
mod codec;
mod config;
mod error;
mod iter;
mod ops;
#[cfg(feature = "roaring")]
mod roaring;
mod serial;
#[cfg(feature = "serde")]
mod serde_impl;
mod store;
mod vector;

#[cfg(test)]
mod tests_block;
#[cfg(test)]
mod tests_serial;

pub use aggregator::Aggregator;
pub use algo::{combine_and, combine_or, combine_sub, combine_xor};
pub use block::{Block, BlockKind, RunList, Words};
pub use config::{CompressionLevel, SortHint};
pub use error::{Error, Result};
pub use iter::Enumerator;
pub use ops::Operation;
pub use serial::{deserialize, deserialize_into, deserialize_op, serialize, Serializer, TempBlock};
pub use store::BlockStore;
pub use vector::{BitVector, Statistics};

/// Number of bits covered by one block.
pub const BLOCK_BITS: u32 = 1 << 16;

/// Number of 64-bit words in a bitmap block.
pub const BLOCK_WORDS: usize = (BLOCK_BITS / 64) as usize;

/// Split a bit position into its block index and the offset inside the block.
#[inline]
pub(crate) fn split(pos: u32) -> (u16, u16) {
    ((pos >> 16) as u16, pos as u16)
}

/// Inverse of [`split`].
#[inline]
pub(crate) fn join(index: u16, offset: u16) -> u32 {
    ((index as u32) << 16) | offset as u32
}

/// The larger of two logical sizes, where `None` (unbounded) dominates.
#[inline]
pub(crate) fn max_size(a: Option<u32>, b: Option<u32>) -> Option<u32> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        _ => None,
    }
}
