use crate::block::{apply_runs, Block, BlockView, RunList, Words};
use crate::config::MUTATION_RUN_BUDGET;
use crate::error::Error;
use crate::store::BlockStore;

/// A binary set operation.
///
/// The discriminants double as the runtime operation codes accepted by
/// [`Operation::try_from`], for callers interpreting opcode streams.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Operation {
    /// Intersection.
    And = 0,
    /// Union.
    Or = 1,
    /// Difference (`left - right`).
    Sub = 2,
    /// Symmetric difference.
    Xor = 3,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::And,
        Operation::Or,
        Operation::Sub,
        Operation::Xor,
    ];

    /// The runtime code of this operation.
    pub fn code(self) -> u8 {
        self as u8
    }

    #[inline]
    pub(crate) fn apply_bit(self, a: bool, b: bool) -> bool {
        match self {
            Operation::And => a & b,
            Operation::Or => a | b,
            Operation::Sub => a & !b,
            Operation::Xor => a ^ b,
        }
    }

    #[inline]
    pub(crate) fn apply_word(self, a: u64, b: u64) -> u64 {
        match self {
            Operation::And => a & b,
            Operation::Or => a | b,
            Operation::Sub => a & !b,
            Operation::Xor => a ^ b,
        }
    }
}

impl TryFrom<u8> for Operation {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self, Error> {
        match code {
            0 => Ok(Operation::And),
            1 => Ok(Operation::Or),
            2 => Ok(Operation::Sub),
            3 => Ok(Operation::Xor),
            other => Err(Error::UnknownOperation(other)),
        }
    }
}

/// Coarse block class used to index the dispatch table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Tag {
    Empty = 0,
    Full = 1,
    /// `Bitmap` or `RunList`.
    Payload = 2,
}

/// What the engine does for one `(operation, left, right)` combination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Outcome {
    Empty,
    Full,
    Left,
    Right,
    NotLeft,
    NotRight,
    /// Both sides carry payloads; a bit-level pass is required.
    Compute,
}

use Outcome as O;

// Rows are the left tag, columns the right tag, both in `Tag` order
// (Empty, Full, Payload).
const DISPATCH: [[[Outcome; 3]; 3]; 4] = [
    // AND
    [
        [O::Empty, O::Empty, O::Empty],
        [O::Empty, O::Full, O::Right],
        [O::Empty, O::Left, O::Compute],
    ],
    // OR
    [
        [O::Empty, O::Full, O::Right],
        [O::Full, O::Full, O::Full],
        [O::Left, O::Full, O::Compute],
    ],
    // SUB
    [
        [O::Empty, O::Empty, O::Empty],
        [O::Full, O::Empty, O::NotRight],
        [O::Left, O::Empty, O::Compute],
    ],
    // XOR
    [
        [O::Empty, O::Full, O::Right],
        [O::Full, O::Empty, O::NotRight],
        [O::Left, O::NotLeft, O::Compute],
    ],
];

#[inline]
pub(crate) fn outcome(op: Operation, left: Tag, right: Tag) -> Outcome {
    DISPATCH[op as usize][left as usize][right as usize]
}

/// Combine one block pair, consuming the left block and reusing its storage
/// where possible.
///
/// The left block must be canonical; the right side may be a freshly decoded
/// payload that is not, so anything copied from it is canonicalized.
pub(crate) fn combine_block(left: Block, right: BlockView<'_>, op: Operation) -> Block {
    match outcome(op, left.tag(), right.tag()) {
        Outcome::Empty => Block::Empty,
        Outcome::Full => Block::Full,
        Outcome::Left => left,
        Outcome::Right => canonical(right.to_block()),
        Outcome::NotLeft => left.complement(),
        Outcome::NotRight => canonical(right.to_block().complement()),
        Outcome::Compute => compute(left, right, op),
    }
}

#[inline]
fn canonical(mut block: Block) -> Block {
    block.canonicalize();
    block
}

/// Word- or toggle-level combination of two blocks. Only payload pairs reach
/// here from the dispatch table; anything else goes through packed words.
pub(crate) fn compute(left: Block, right: BlockView<'_>, op: Operation) -> Block {
    let mut out = match (left, right) {
        (Block::Bitmap(mut words), BlockView::Bitmap(rhs)) => {
            combine_words(&mut words, rhs, op);
            Block::Bitmap(words)
        }
        (Block::Bitmap(mut words), BlockView::RunList(toggles)) => {
            apply_runs(&mut words, toggles, op);
            Block::Bitmap(words)
        }
        (Block::RunList(runs), BlockView::RunList(toggles)) => {
            let merged = RunList::merge(runs.toggles(), toggles, op);
            if merged.len() > MUTATION_RUN_BUDGET {
                Block::Bitmap(merged.to_words())
            } else {
                Block::RunList(merged)
            }
        }
        (Block::RunList(runs), BlockView::Bitmap(rhs)) => {
            let mut words = runs.to_words();
            combine_words(&mut words, rhs, op);
            Block::Bitmap(words)
        }
        (left, right) => {
            let mut words = left.to_words();
            combine_words(&mut words, &right.to_block().to_words(), op);
            Block::Bitmap(words)
        }
    };

    out.canonicalize();
    out
}

#[inline]
fn combine_words(dst: &mut Words, src: &Words, op: Operation) {
    for (a, b) in dst.iter_mut().zip(src.iter()) {
        *a = op.apply_word(*a, *b);
    }
}

/// Apply `op` to every block of `dst` against the block with the same index in
/// `src`, in one merge walk over the two sorted block vectors.
pub(crate) fn combine_stores(dst: &mut BlockStore, src: &BlockStore, op: Operation) {
    let left = dst.take_blocks();
    let mut out = Vec::with_capacity(left.len().max(src.len()));
    let mut right = src.blocks().iter().peekable();

    for (key, block) in left {
        while let Some((rk, rb)) = right.next_if(|(rk, _)| *rk < key) {
            push_block(&mut out, *rk, combine_block(Block::Empty, rb.view(), op));
        }

        let rhs = match right.next_if(|(rk, _)| *rk == key) {
            Some((_, rb)) => rb.view(),
            None => BlockView::Empty,
        };
        push_block(&mut out, key, combine_block(block, rhs, op));
    }

    for (rk, rb) in right {
        push_block(&mut out, *rk, combine_block(Block::Empty, rb.view(), op));
    }

    dst.put_blocks(out);
}

#[inline]
pub(crate) fn push_block(out: &mut Vec<(u16, Block)>, key: u16, block: Block) {
    if !block.is_empty() {
        out.push((key, block));
    }
}
