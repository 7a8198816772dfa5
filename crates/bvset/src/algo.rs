//! Set operations between a vector and a plain sequence of positions.
//!
//! The sequence may be unsorted and may repeat positions; each function behaves
//! as if the positions were first collected into a vector. OR and XOR grow a
//! bounded size to cover the largest position, AND and SUB never change it.

use crate::config::SortHint;
use crate::ops::{combine_stores, Operation};
use crate::vector::BitVector;

/// `bv |= positions`.
pub fn combine_or(bv: &mut BitVector, positions: impl IntoIterator<Item = u32>) {
    let positions = sorted_unique(positions);
    bv.set_positions(&positions, SortHint::Sorted);
}

/// `bv &= positions`.
pub fn combine_and(bv: &mut BitVector, positions: impl IntoIterator<Item = u32>) {
    combine(bv, positions, Operation::And);
}

/// `bv -= positions`.
pub fn combine_sub(bv: &mut BitVector, positions: impl IntoIterator<Item = u32>) {
    combine(bv, positions, Operation::Sub);
}

/// `bv ^= positions`.
pub fn combine_xor(bv: &mut BitVector, positions: impl IntoIterator<Item = u32>) {
    combine(bv, positions, Operation::Xor);
}

fn combine(bv: &mut BitVector, positions: impl IntoIterator<Item = u32>, op: Operation) {
    let positions = sorted_unique(positions);

    let mut other = BitVector::new();
    other.set_positions(&positions, SortHint::Sorted);

    if op == Operation::Xor {
        if let Some(&max) = positions.last() {
            bv.cover(max);
        }
    }
    combine_stores(bv.store_mut(), other.store(), op);
}

fn sorted_unique(positions: impl IntoIterator<Item = u32>) -> Vec<u32> {
    let mut positions: Vec<u32> = positions.into_iter().collect();
    positions.sort_unstable();
    positions.dedup();
    positions
}
