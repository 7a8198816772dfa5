use crate::block::{new_words, BlockView};
use crate::ops::{combine_block, compute, outcome, Outcome, Tag};
use crate::*;

fn is_canonical(block: &Block) -> bool {
    let mut copy = block.clone();
    copy.canonicalize();
    copy.kind() == block.kind()
}

fn bits(block: &Block) -> Vec<u32> {
    let words = block.to_words();
    (0..BLOCK_BITS)
        .filter(|&i| words[(i / 64) as usize] & (1u64 << (i % 64)) != 0)
        .collect()
}

/// One block of every variant, including payloads close to both extremes.
fn samples() -> Vec<Block> {
    let mut sparse = new_words(0);
    sparse[0] = 0xdead_beef;
    sparse[513] = u64::MAX;
    sparse[1023] = 1 << 63;

    let mut dense = new_words(u64::MAX);
    dense[7] = 0x0f0f;

    vec![
        Block::Empty,
        Block::Full,
        Block::Bitmap(sparse),
        Block::Bitmap(dense),
        Block::RunList(RunList::from_toggles(vec![3, 100, 5000, 5001, 40000])),
        Block::RunList(RunList::from_toggles(vec![0, 64, 128, 65535])),
    ]
}

// ---- RunList ----

#[test]
fn runlist_contains_follows_toggle_parity() {
    let runs = RunList::from_toggles(vec![10, 20, 65530]);
    assert!(!runs.contains(9));
    assert!(runs.contains(10));
    assert!(runs.contains(19));
    assert!(!runs.contains(20));
    assert!(!runs.contains(65529));
    assert!(runs.contains(65530));
    assert!(runs.contains(u16::MAX));

    assert_eq!(runs.runs().collect::<Vec<_>>(), vec![(10, 20), (65530, BLOCK_BITS)]);
    assert_eq!(runs.count(), 10 + 6);
}

#[test]
fn runlist_build_merges_adjacent_offsets() {
    let runs = RunList::build([1, 2, 3, 3, 7, 8, u16::MAX], 16).unwrap();
    assert_eq!(runs.toggles(), &[1, 4, 7, 9, u16::MAX]);
    assert_eq!(runs.count(), 6);
    assert_eq!(runs.last(), Some(u16::MAX));
}

#[test]
fn runlist_build_respects_budget() {
    let offsets: Vec<u16> = (0..200).map(|i| i * 2).collect();
    assert!(RunList::build(offsets.iter().copied(), 128).is_none());

    let runs = RunList::build(offsets.iter().copied(), 400).unwrap();
    assert_eq!(runs.len(), 400);
}

#[test]
fn runlist_from_words_matches_build() {
    let offsets: Vec<u16> = vec![0, 1, 2, 63, 64, 65, 200, 4095, 65535];
    let block = Block::from_sorted_offsets(&offsets);
    let words = block.to_words();

    let from_words = RunList::from_words(&words, usize::MAX).unwrap();
    let built = RunList::build(offsets.iter().copied(), usize::MAX).unwrap();
    assert_eq!(from_words, built);

    assert!(RunList::from_words(&words, 3).is_none());
}

#[test]
fn runlist_set_and_complement() {
    let mut runs = RunList::default();
    assert!(runs.set(5, true));
    assert!(!runs.set(5, true));
    assert!(runs.set(6, true));
    assert_eq!(runs.toggles(), &[5, 7]);

    assert!(runs.set(5, false));
    assert_eq!(runs.toggles(), &[6, 7]);

    runs.complement();
    assert_eq!(runs.toggles(), &[0, 6, 7]);
    assert!(runs.contains(0));
    assert!(!runs.contains(6));
    assert!(runs.contains(u16::MAX));

    runs.complement();
    assert_eq!(runs.toggles(), &[6, 7]);
}

// ---- Block queries ----

#[test]
fn block_queries_agree_across_variants() {
    for block in samples() {
        let expected = bits(&block);

        assert_eq!(block.count() as usize, expected.len(), "{:?}", block.kind());
        assert_eq!(block.first().map(u32::from), expected.first().copied());
        assert_eq!(block.last().map(u32::from), expected.last().copied());

        for (start, end) in [(0, BLOCK_BITS), (3, 101), (64, 128), (5000, 5001), (40000, 65535)] {
            let want = expected.iter().filter(|&&b| b >= start && b < end).count();
            assert_eq!(block.count_range(start, end) as usize, want);
        }

        for &offset in expected.iter().take(32) {
            assert!(block.contains(offset as u16));
        }
    }
}

#[test]
fn content_eq_ignores_representation() {
    let offsets: Vec<u16> = (100..300).collect();
    let runs = Block::from_sorted_offsets(&offsets);
    assert_eq!(runs.kind(), BlockKind::RunList);

    let bitmap = Block::Bitmap(runs.to_words());
    assert!(runs.content_eq(&bitmap));
    assert!(bitmap.content_eq(&runs));

    let other = Block::from_sorted_offsets(&[100]);
    assert!(!other.content_eq(&bitmap));
}

#[test]
fn from_sorted_offsets_canonicalizes() {
    assert_eq!(Block::from_sorted_offsets(&[]).kind(), BlockKind::Empty);

    let all: Vec<u16> = (0..=u16::MAX).collect();
    assert_eq!(Block::from_sorted_offsets(&all).kind(), BlockKind::Full);

    // Alternating bits need more toggles than the mutation budget allows.
    let alternating: Vec<u16> = (0..2000).map(|i| i * 2).collect();
    let block = Block::from_sorted_offsets(&alternating);
    assert_eq!(block.kind(), BlockKind::Bitmap);
    assert_eq!(block.count(), 2000);
}

// ---- Mutation ----

#[test]
fn set_bit_walks_through_variants() {
    let mut block = Block::Empty;
    assert!(block.set_bit(7, true));
    assert_eq!(block.kind(), BlockKind::RunList);
    assert!(!block.set_bit(7, true));

    assert!(block.set_bit(7, false));
    assert_eq!(block.kind(), BlockKind::Empty);

    let mut block = Block::Full;
    assert!(!block.set_bit(0, true));
    assert!(block.set_bit(0, false));
    assert_eq!(block.kind(), BlockKind::RunList);
    assert!(!block.contains(0));
    assert!(block.contains(1));
    assert_eq!(block.count(), BLOCK_BITS - 1);

    assert!(block.set_bit(0, true));
    assert_eq!(block.kind(), BlockKind::Full);
}

#[test]
fn set_bit_switches_to_bitmap_past_budget() {
    let mut block = Block::Empty;
    for i in 0..1000u16 {
        block.set_bit(i * 3, true);
    }
    assert_eq!(block.kind(), BlockKind::Bitmap);
    assert_eq!(block.count(), 1000);

    let mut words = new_words(0);
    words[5] = 1;
    let mut block = Block::Bitmap(words);
    assert!(block.set_bit(320, false));
    assert_eq!(block.kind(), BlockKind::Empty);
}

#[test]
fn complement_inverts_every_bit() {
    for block in samples() {
        let count = block.count();
        let complement = block.clone().complement();
        assert_eq!(complement.count(), BLOCK_BITS - count);
        assert!(complement.clone().complement().content_eq(&block));
    }
}

// ---- Dispatch ----

#[test]
fn dispatch_table_matches_bit_semantics() {
    let tags = [Tag::Empty, Tag::Full];
    let value = |tag: Tag| tag == Tag::Full;

    for op in Operation::ALL {
        for left in tags {
            for right in tags {
                let expected = op.apply_bit(value(left), value(right));
                let got = match outcome(op, left, right) {
                    Outcome::Empty => false,
                    Outcome::Full => true,
                    Outcome::Left => value(left),
                    Outcome::Right => value(right),
                    Outcome::NotLeft => !value(left),
                    Outcome::NotRight => !value(right),
                    Outcome::Compute => panic!("constant blocks never need a bit pass"),
                };
                assert_eq!(got, expected, "{op:?} {left:?} {right:?}");
            }
        }
        assert_eq!(outcome(op, Tag::Payload, Tag::Payload), Outcome::Compute);
    }
}

#[test]
fn combine_block_matches_word_semantics() {
    let blocks = samples();
    for op in Operation::ALL {
        for left in &blocks {
            for right in &blocks {
                let lhs = left.to_words();
                let rhs = right.to_words();
                let mut expected = new_words(0);
                for i in 0..BLOCK_WORDS {
                    expected[i] = op.apply_word(lhs[i], rhs[i]);
                }

                let got = combine_block(left.clone(), right.view(), op);
                assert!(
                    got.to_words()[..] == expected[..],
                    "{op:?} {:?} {:?}",
                    left.kind(),
                    right.kind()
                );
                assert!(is_canonical(&got), "{op:?} produced {:?}", got.kind());

                // The word pass agrees with the table's short-cuts, constant
                // blocks included.
                let direct = compute(left.clone(), right.view(), op);
                assert!(direct.to_words()[..] == expected[..], "{op:?} {:?}", left.kind());
                assert!(is_canonical(&direct));
            }
        }
    }
}

#[test]
fn combine_block_canonicalizes_borrowed_payloads() {
    // A decoded payload may be all-zero or all-one without being tagged so.
    let zeros = new_words(0);
    let ones = new_words(u64::MAX);

    let got = combine_block(Block::Empty, BlockView::Bitmap(&zeros), Operation::Or);
    assert_eq!(got.kind(), BlockKind::Empty);

    let got = combine_block(Block::Empty, BlockView::Bitmap(&ones), Operation::Or);
    assert_eq!(got.kind(), BlockKind::Full);

    let got = combine_block(Block::Full, BlockView::RunList(&[0]), Operation::Sub);
    assert_eq!(got.kind(), BlockKind::Empty);
}

// ---- Optimize ----

#[test]
fn optimize_picks_compact_form_without_changing_content() {
    let offsets: Vec<u16> = (1000..9000).collect();
    let runs = Block::from_sorted_offsets(&offsets);
    let bitmap = Block::Bitmap(runs.to_words());

    let mut optimized = bitmap.clone();
    optimized.optimize(CompressionLevel::default());
    assert_eq!(optimized.kind(), BlockKind::RunList);
    assert!(optimized.content_eq(&bitmap));

    let mut untouched = bitmap.clone();
    untouched.optimize(CompressionLevel::NONE);
    assert_eq!(untouched.kind(), BlockKind::Bitmap);

    // A run list never turns into a larger bitmap, whatever the level.
    let toggles: Vec<u16> = (0..100).flat_map(|i| [i * 300, i * 300 + 200]).collect();
    let runs = Block::RunList(RunList::from_toggles(toggles));
    for level in 1..=5 {
        let mut block = runs.clone();
        block.optimize(CompressionLevel::new(level));
        assert_eq!(block.kind(), BlockKind::RunList, "level {level}");
        assert!(block.heap_bytes() <= runs.heap_bytes(), "level {level}");
        assert_eq!(block.count(), 20_000);
    }

    // Past the break-even point the bitmap is the smaller form.
    let toggles: Vec<u16> = (0..5000).map(|i| i * 2).collect();
    let mut block = Block::RunList(RunList::from_toggles(toggles));
    block.optimize(CompressionLevel::new(1));
    assert_eq!(block.kind(), BlockKind::Bitmap);
    assert_eq!(block.count(), 2500);

    for level in 0..=5 {
        for block in samples() {
            let mut copy = block.clone();
            copy.optimize(CompressionLevel::new(level));
            assert!(copy.content_eq(&block), "level {level} {:?}", block.kind());
            assert!(copy.heap_bytes() <= block.heap_bytes(), "level {level} {:?}", block.kind());
        }
    }
}

#[test]
fn compression_level_clamps() {
    assert_eq!(CompressionLevel::new(9), CompressionLevel::MAX);
    assert_eq!(CompressionLevel::from(3).get(), 3);
    assert_eq!(CompressionLevel::default().get(), 4);
}
