use crate::*;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A vector with every block variant and every serializer encoding in reach.
fn mixed() -> BitVector {
    let mut bv = BitVector::new();
    // Consecutive full blocks 0..3.
    bv.set_range(0..3 * BLOCK_BITS, true);
    // Sparse bitmap in block 3.
    bv.extend((0..2000).map(|i| 3 * BLOCK_BITS + i * 31));
    // Dense bitmap in block 4.
    bv.set_range(4 * BLOCK_BITS..5 * BLOCK_BITS, true);
    for i in 0..2000 {
        bv.clear_bit(4 * BLOCK_BITS + i * 29);
    }
    // Run list in block 6.
    bv.set_range(6 * BLOCK_BITS + 100..6 * BLOCK_BITS + 40_000, true);
    // Lone full block.
    bv.set_range(8 * BLOCK_BITS..9 * BLOCK_BITS, true);
    bv.set(u32::MAX);
    bv
}

fn other() -> BitVector {
    let mut bv: BitVector = (0..5000).map(|i| i * 97).collect();
    bv.set_range(2 * BLOCK_BITS + 10..4 * BLOCK_BITS + 10, true);
    bv.resize(10 * BLOCK_BITS);
    bv
}

/// Header of an unbounded stream with `records` records.
fn header(records: u8) -> Vec<u8> {
    let mut buf = b"BVSA".to_vec();
    buf.extend_from_slice(&[1, 4, 0, records]);
    buf
}

// ---- Round trips ----

#[test]
fn round_trip_at_every_level() {
    init_tracing();

    let unbounded = mixed();
    assert_eq!(unbounded.block_kind(3 * BLOCK_BITS), BlockKind::Bitmap);
    assert_eq!(unbounded.block_kind(4 * BLOCK_BITS), BlockKind::Bitmap);
    assert_eq!(unbounded.block_kind(6 * BLOCK_BITS), BlockKind::RunList);

    let mut bounded = mixed();
    bounded.resize(9 * BLOCK_BITS + 7);

    for level in 0..=5 {
        let level = CompressionLevel::new(level);
        for bv in [&unbounded, &bounded, &BitVector::new(), &BitVector::with_size(3)] {
            let bytes = serialize(bv, level);
            let back = deserialize(&bytes).unwrap();
            assert_eq!(&back, bv, "level {}", level.get());
        }
    }
}

#[test]
fn encoding_is_deterministic() {
    let bv = mixed();
    let mut serializer = Serializer::new(CompressionLevel::MAX);

    let first = serializer.serialize(&bv);
    let second = serializer.serialize(&bv);
    assert_eq!(first, second);
    assert_eq!(first, serialize(&bv, CompressionLevel::MAX));

    let mut appended = vec![0xaa];
    serializer.serialize_into(&bv, &mut appended);
    assert_eq!(&appended[1..], &first[..]);
}

#[test]
fn header_records_level_and_size() {
    let mut bv = BitVector::from([3]);
    bv.resize(300);

    let bytes = serialize(&bv, CompressionLevel::new(2));
    assert_eq!(&bytes[..4], b"BVSA");
    assert_eq!(bytes[4], 1);
    assert_eq!(bytes[5], 2);
    assert_eq!(bytes[6], 0x01);
    assert_eq!(&bytes[7..11], &300u32.to_le_bytes());
    assert_eq!(bytes[11], 1);

    let unbounded = serialize(&BitVector::new(), CompressionLevel::default());
    assert_eq!(unbounded, header(0));
}

#[test]
fn higher_levels_shrink_output() {
    let bv = mixed();
    let sizes: Vec<usize> = (0..=5)
        .map(|level| serialize(&bv, CompressionLevel::new(level)).len())
        .collect();

    assert!(sizes[4] < sizes[0], "{sizes:?}");
    assert!(sizes[5] <= sizes[4], "{sizes:?}");
}

#[test]
fn full_span_collapses_consecutive_full_blocks() {
    let mut bv = BitVector::new();
    bv.set_range(0..3 * BLOCK_BITS, true);

    let spans = serialize(&bv, CompressionLevel::new(4));
    assert_eq!(spans.len(), 12);
    let plain = serialize(&bv, CompressionLevel::new(3));
    assert_eq!(plain.len(), 17);

    assert_eq!(deserialize(&spans).unwrap(), bv);
    assert_eq!(deserialize(&plain).unwrap(), bv);
}

#[test]
fn bitmap_encoding_follows_density() {
    // Record tag sits after the header, record count and block index.
    let tag_of = |bv: &BitVector, level: u8| serialize(bv, CompressionLevel::new(level))[10];

    let sparse: BitVector = (0..2000).map(|i| i * 31).collect();
    assert_eq!(sparse.block_kind(0), BlockKind::Bitmap);
    assert_eq!(tag_of(&sparse, 0), 0x03);
    assert_eq!(tag_of(&sparse, 4), 0x06);

    let mut dense = BitVector::new();
    dense.set_range(0..BLOCK_BITS, true);
    for i in 0..2000 {
        dense.clear_bit(i * 29);
    }
    assert_eq!(dense.block_kind(0), BlockKind::Bitmap);
    assert_eq!(tag_of(&dense, 4), 0x07);

    let runs = BitVector::from([5, 6, 7, 100]);
    assert_eq!(tag_of(&runs, 1), 0x04);
    assert_eq!(tag_of(&runs, 2), 0x05);
}

// ---- Operation deserialization ----

#[test]
fn deserialize_op_matches_combine_operation() {
    init_tracing();

    let mut temp = TempBlock::new();
    for level in 0..=5 {
        let level = CompressionLevel::new(level);
        for (dest, src) in [(other(), mixed()), (mixed(), other())] {
            let bytes = serialize(&src, level);

            for op in Operation::ALL {
                let mut expected = dest.clone();
                expected.combine_operation(&src, op);

                let mut got = dest.clone();
                deserialize_op(&mut got, &bytes, op, &mut temp).unwrap();
                assert_eq!(got, expected, "{op:?} level {}", level.get());
            }
        }
    }
}

#[test]
fn deserialize_and_drops_unmatched_blocks() {
    let mut dest = BitVector::from([1, 70_000, 140_000, 500_000]);
    let src = BitVector::from([1, 140_000]);

    deserialize_into(&mut dest, &serialize(&src, CompressionLevel::default()), Operation::And)
        .unwrap();
    assert_eq!(dest.iter().collect::<Vec<_>>(), vec![1, 140_000]);
    assert_eq!(dest.store().len(), 2);
}

#[test]
fn deserialize_op_grows_size() {
    let mut src = BitVector::from([5]);
    src.resize(100);
    let bytes = serialize(&src, CompressionLevel::default());

    let mut dest = BitVector::with_size(10);
    deserialize_into(&mut dest, &bytes, Operation::Sub).unwrap();
    assert_eq!(dest.size(), Some(100));
    assert!(dest.is_empty());
}

#[test]
fn stream_bits_past_bounded_size_are_dropped() {
    let mut buf = b"BVSA".to_vec();
    buf.extend_from_slice(&[1, 4, 0x01]);
    buf.extend_from_slice(&5u32.to_le_bytes());
    buf.extend_from_slice(&[1, 0, 0, 0x01]);

    let bv = deserialize(&buf).unwrap();
    assert_eq!(bv.size(), Some(5));
    assert_eq!(bv.iter().collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn stream_bits_past_bounded_size_are_dropped_for_unbounded_destinations() {
    // Size 5, FULL at block 0 and FULL at block 1.
    let mut buf = b"BVSA".to_vec();
    buf.extend_from_slice(&[1, 4, 0x01]);
    buf.extend_from_slice(&5u32.to_le_bytes());
    buf.extend_from_slice(&[2, 0, 0, 0x01, 1, 0, 0x01]);

    let mut dest = BitVector::new();
    deserialize_into(&mut dest, &buf, Operation::Or).unwrap();
    assert_eq!(dest.size(), None);
    assert_eq!(dest.iter().collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);

    let decoded = deserialize(&buf).unwrap();
    let mut base = BitVector::new();
    base.extend([1, 10, 70_000, 200_000]);
    for op in Operation::ALL {
        let mut direct = base.clone();
        direct.combine_operation(&decoded, op);

        let mut streamed = base.clone();
        deserialize_into(&mut streamed, &buf, op).unwrap();
        assert_eq!(streamed, direct, "{op:?}");
    }
}

#[test]
fn failed_stream_keeps_destination_valid() {
    init_tracing();

    // FULL at block 0, then an unknown tag at block 2.
    let mut buf = header(2);
    buf.extend_from_slice(&[0, 0, 0x01, 2, 0, 0x7f]);

    let mut dest = BitVector::from([1, 70_000]);
    let err = deserialize_into(&mut dest, &buf, Operation::Or).unwrap_err();
    assert_eq!(err, Error::UnknownTag { tag: 0x7f, offset: 13 });

    assert_eq!(dest.block_kind(0), BlockKind::Full);
    assert!(dest.get(70_000));
    assert_eq!(dest.count(), BLOCK_BITS as u64 + 1);

    // AND keeps unvisited blocks when the stream fails.
    let mut dest = BitVector::from([1, 70_000]);
    assert!(deserialize_into(&mut dest, &buf, Operation::And).is_err());
    assert!(dest.get(1));
    assert!(dest.get(70_000));
}

// ---- Errors ----

#[test]
fn rejects_malformed_headers() {
    assert_eq!(deserialize(b"BVS").unwrap_err(), Error::TooShort(3, 7));
    assert_eq!(deserialize(b"XXXX\x01\x04\x00\x00").unwrap_err(), Error::InvalidMagic);
    assert_eq!(
        deserialize(b"BVSA\x02\x04\x00\x00").unwrap_err(),
        Error::UnsupportedVersion(2)
    );
    assert_eq!(
        deserialize(b"BVSA\x01\x04\x06\x00").unwrap_err(),
        Error::UnsupportedFlags(6)
    );
    assert_eq!(deserialize(b"BVSA\x01\x04\x01\x05").unwrap_err(), Error::Truncated(7));
    assert_eq!(deserialize(b"BVSA\x01\x04\x00").unwrap_err(), Error::Truncated(7));
}

#[test]
fn rejects_truncated_records() {
    let bytes = serialize(&mixed(), CompressionLevel::NONE);
    for cut in [1, 100, 5000] {
        let err = deserialize(&bytes[..bytes.len() - cut]).unwrap_err();
        assert!(matches!(err, Error::Truncated(_)), "{err:?}");
    }

    // Record count promises more records than present.
    assert_eq!(deserialize(&header(1)).unwrap_err(), Error::Truncated(8));
}

#[test]
fn rejects_unknown_tag() {
    let mut buf = header(1);
    buf.extend_from_slice(&[0, 0, 0x09]);
    assert_eq!(
        deserialize(&buf).unwrap_err(),
        Error::UnknownTag { tag: 0x09, offset: 10 }
    );
}

#[test]
fn rejects_out_of_order_blocks() {
    let mut buf = header(2);
    buf.extend_from_slice(&[5, 0, 0x01, 3, 0, 0x01]);
    assert_eq!(deserialize(&buf).unwrap_err(), Error::BlockOrder(3));

    let mut buf = header(2);
    buf.extend_from_slice(&[5, 0, 0x01, 5, 0, 0x01]);
    assert_eq!(deserialize(&buf).unwrap_err(), Error::BlockOrder(5));

    // A span covers the following indexes.
    let mut buf = header(2);
    buf.extend_from_slice(&[5, 0, 0x02, 2, 7, 0, 0x01]);
    assert_eq!(deserialize(&buf).unwrap_err(), Error::BlockOrder(7));
}

#[test]
fn rejects_corrupt_payloads() {
    // Deltas must be strictly ascending.
    let mut buf = header(1);
    buf.extend_from_slice(&[4, 0, 0x05, 2, 5, 0]);
    assert_eq!(deserialize(&buf).unwrap_err(), Error::CorruptBlock(4));

    // Offsets must fit in a block.
    let mut buf = header(1);
    buf.extend_from_slice(&[4, 0, 0x06, 2, 0xff, 0xff, 0x03, 0x01]);
    assert_eq!(deserialize(&buf).unwrap_err(), Error::CorruptBlock(4));

    // Raw toggles must be strictly ascending.
    let mut buf = header(1);
    buf.extend_from_slice(&[4, 0, 0x04, 2, 9, 0, 9, 0]);
    assert_eq!(deserialize(&buf).unwrap_err(), Error::CorruptBlock(4));

    // A span may not run past the last block.
    let mut buf = header(1);
    buf.extend_from_slice(&[0xff, 0xff, 0x02, 1]);
    assert_eq!(deserialize(&buf).unwrap_err(), Error::CorruptBlock(u16::MAX));
}

#[test]
fn rejects_trailing_bytes() {
    let mut bytes = serialize(&BitVector::from([1, 2, 3]), CompressionLevel::default());
    bytes.extend_from_slice(&[0, 0]);
    assert_eq!(deserialize(&bytes).unwrap_err(), Error::TrailingBytes(2));
}

#[test]
fn errors_display() {
    assert_eq!(Error::InvalidMagic.to_string(), "invalid magic (expected \"BVSA\")");
    assert_eq!(
        Error::TooShort(3, 7).to_string(),
        "buffer too short (3 bytes, need at least 7)"
    );
}

#[cfg(feature = "serde")]
#[test]
fn serde_carries_wire_image() {
    let mut bv = mixed();
    bv.resize(7 * BLOCK_BITS);

    let json = serde_json::to_string(&bv).unwrap();
    let back: BitVector = serde_json::from_str(&json).unwrap();
    assert_eq!(back, bv);

    let json = serde_json::to_string(&CompressionLevel::MAX).unwrap();
    assert_eq!(json, "5");

    assert!(serde_json::from_str::<BitVector>("[1, 2, 3]").is_err());
}
