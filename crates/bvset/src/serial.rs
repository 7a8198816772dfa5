//! Serialized form of a [`BitVector`] and the streaming operation decoder.
//!
//! # Layout
//!
//! ```text
//! [magic "BVSA"][version u8][level u8][flags u8][size u32 LE, if bounded][records varint]
//! [record]*
//!
//! record: [block index u16 LE][tag u8][payload]
//! ```
//!
//! | tag  | name         | payload                                              |
//! |------|--------------|------------------------------------------------------|
//! | 0x01 | `FULL`       | none                                                 |
//! | 0x02 | `FULL_SPAN`  | varint `n`: this block and the next `n` are full     |
//! | 0x03 | `BITMAP`     | 1024 × u64 LE                                        |
//! | 0x04 | `RUNS`       | varint count, count × u16 LE toggles                 |
//! | 0x05 | `RUNS_DELTA` | varint count, LEB128 toggle deltas                   |
//! | 0x06 | `POSITIONS`  | varint count, LEB128 deltas of set offsets           |
//! | 0x07 | `INVERTED`   | varint count, LEB128 deltas of clear offsets         |
//!
//! Empty blocks are never written. Records appear in ascending block order.
//! The chosen tags depend only on the vector and the compression level, so
//! encoding is deterministic per level.

use std::iter::Peekable;

use tracing::{debug, trace};

use crate::block::{collect_toggles, new_words, Block, BlockView, Words};
use crate::codec::{put_u16, put_u32, put_u64, put_u8, put_varint, varint_len, Reader};
use crate::config::CompressionLevel;
use crate::error::{Error, Result};
use crate::ops::{combine_block, push_block, Operation};
use crate::store::BlockStore;
use crate::vector::BitVector;
use crate::{join, max_size, BLOCK_BITS, BLOCK_WORDS};

const MAGIC: &[u8; 4] = b"BVSA";
const VERSION: u8 = 1;
const HEADER_SIZE: usize = 7; // magic(4) + version(1) + level(1) + flags(1)
const FLAG_BOUNDED: u8 = 0x01;

const TAG_FULL: u8 = 0x01;
const TAG_FULL_SPAN: u8 = 0x02;
const TAG_BITMAP: u8 = 0x03;
const TAG_RUNS: u8 = 0x04;
const TAG_RUNS_DELTA: u8 = 0x05;
const TAG_POSITIONS: u8 = 0x06;
const TAG_INVERTED: u8 = 0x07;

const BITMAP_BYTES: usize = BLOCK_WORDS * 8;

/// Reusable scratch space for encoding and decoding one block.
///
/// Allocate once and pass it to [`deserialize_op`] to avoid a fresh 8 KiB
/// allocation per call.
#[derive(Clone, Debug)]
pub struct TempBlock {
    words: Box<Words>,
    toggles: Vec<u16>,
}

impl TempBlock {
    pub fn new() -> Self {
        Self {
            words: new_words(0),
            toggles: Vec::new(),
        }
    }
}

impl Default for TempBlock {
    fn default() -> Self {
        Self::new()
    }
}

/// Encodes bit-vectors at a fixed compression level.
///
/// Call [`BitVector::optimize`] first for the most compact output; encoding
/// never depends on it for correctness.
#[derive(Debug)]
pub struct Serializer {
    level: CompressionLevel,
    temp: TempBlock,
    body: Vec<u8>,
}

impl Serializer {
    pub fn new(level: CompressionLevel) -> Self {
        Self::with_temp_block(level, TempBlock::new())
    }

    /// Create a serializer around an existing scratch block.
    pub fn with_temp_block(level: CompressionLevel, temp: TempBlock) -> Self {
        Self {
            level,
            temp,
            body: Vec::new(),
        }
    }

    pub fn compression_level(&self) -> CompressionLevel {
        self.level
    }

    pub fn set_compression_level(&mut self, level: CompressionLevel) {
        self.level = level;
    }

    /// Serialize `bv` into a new buffer.
    pub fn serialize(&mut self, bv: &BitVector) -> Vec<u8> {
        let mut out = Vec::new();
        self.serialize_into(bv, &mut out);
        out
    }

    /// Append the serialized form of `bv` to `out`.
    pub fn serialize_into(&mut self, bv: &BitVector, out: &mut Vec<u8>) {
        self.body.clear();
        let records = self.encode_blocks(bv.store().blocks());

        let start = out.len();
        out.extend_from_slice(MAGIC);
        put_u8(out, VERSION);
        put_u8(out, self.level.get());
        match bv.size() {
            Some(size) => {
                put_u8(out, FLAG_BOUNDED);
                put_u32(out, size);
            }
            None => put_u8(out, 0),
        }
        put_varint(out, records);
        out.extend_from_slice(&self.body);

        trace!(
            level = self.level.get(),
            blocks = bv.store().len(),
            records,
            bytes = out.len() - start,
            "serialized bit-vector"
        );
    }

    fn encode_blocks(&mut self, blocks: &[(u16, Block)]) -> u32 {
        let spans = self.level.get() >= 4;
        let mut records = 0;
        let mut i = 0;

        while i < blocks.len() {
            let (index, block) = &blocks[i];

            if spans && matches!(block, Block::Full) {
                let span = blocks[i..]
                    .iter()
                    .enumerate()
                    .take_while(|(n, (k, b))| {
                        matches!(b, Block::Full) && *k as usize == *index as usize + n
                    })
                    .count();

                if span > 1 {
                    put_u16(&mut self.body, *index);
                    put_u8(&mut self.body, TAG_FULL_SPAN);
                    put_varint(&mut self.body, (span - 1) as u32);
                    records += 1;
                    i += span;
                    continue;
                }
            }

            match block {
                Block::Empty => {}
                Block::Full => {
                    put_u16(&mut self.body, *index);
                    put_u8(&mut self.body, TAG_FULL);
                    records += 1;
                }
                Block::Bitmap(words) => {
                    self.encode_bitmap(*index, words);
                    records += 1;
                }
                Block::RunList(runs) => {
                    self.encode_runs(*index, runs.toggles());
                    records += 1;
                }
            }
            i += 1;
        }

        records
    }

    fn encode_bitmap(&mut self, index: u16, words: &Words) {
        put_u16(&mut self.body, index);

        let level = self.level.get();
        if level < 4 {
            put_raw_bitmap(&mut self.body, words);
            return;
        }

        let ones = words.iter().map(|w| w.count_ones() as usize).sum::<usize>();
        let zeros = BLOCK_BITS as usize - ones;

        let mut best = (BITMAP_BYTES, TAG_BITMAP);
        // Every delta costs at least one byte.
        if ones < best.0 {
            let len = offsets_len(words, false);
            if len < best.0 {
                best = (len, TAG_POSITIONS);
            }
        }
        if zeros < best.0 {
            let len = offsets_len(words, true);
            if len < best.0 {
                best = (len, TAG_INVERTED);
            }
        }
        if level >= 5 {
            collect_toggles(words, &mut self.temp.toggles, usize::MAX);
            let len = deltas_len(&self.temp.toggles);
            if len < best.0 {
                best = (len, TAG_RUNS_DELTA);
            }
        }

        put_u8(&mut self.body, best.1);
        match best.1 {
            TAG_POSITIONS | TAG_INVERTED => {
                collect_offsets(words, best.1 == TAG_INVERTED, &mut self.temp.toggles);
                put_deltas(&mut self.body, &self.temp.toggles);
            }
            TAG_RUNS_DELTA => put_deltas(&mut self.body, &self.temp.toggles),
            _ => put_raw_bitmap_payload(&mut self.body, words),
        }
    }

    fn encode_runs(&mut self, index: u16, toggles: &[u16]) {
        put_u16(&mut self.body, index);

        let level = self.level.get();
        if level < 2 {
            put_u8(&mut self.body, TAG_RUNS);
            put_varint(&mut self.body, toggles.len() as u32);
            for &t in toggles {
                put_u16(&mut self.body, t);
            }
            return;
        }

        if level >= 5 {
            let runs_len = deltas_len(toggles);
            let ones: usize = crate::block::runs(toggles).map(|(s, e)| (e - s) as usize).sum();
            if ones < runs_len {
                self.temp.toggles.clear();
                for (start, end) in crate::block::runs(toggles) {
                    self.temp.toggles.extend((start..end).map(|offset| offset as u16));
                }
                if deltas_len(&self.temp.toggles) < runs_len {
                    put_u8(&mut self.body, TAG_POSITIONS);
                    put_deltas(&mut self.body, &self.temp.toggles);
                    return;
                }
            }
        }

        put_u8(&mut self.body, TAG_RUNS_DELTA);
        put_deltas(&mut self.body, toggles);
    }
}

fn put_raw_bitmap(out: &mut Vec<u8>, words: &Words) {
    put_u8(out, TAG_BITMAP);
    put_raw_bitmap_payload(out, words);
}

fn put_raw_bitmap_payload(out: &mut Vec<u8>, words: &Words) {
    out.reserve(BITMAP_BYTES);
    for &w in words.iter() {
        put_u64(out, w);
    }
}

/// Set (or, with `invert`, clear) offsets of a bitmap, ascending.
fn collect_offsets(words: &Words, invert: bool, out: &mut Vec<u16>) {
    out.clear();
    for (i, &w) in words.iter().enumerate() {
        let mut bits = if invert { !w } else { w };
        while bits != 0 {
            out.push((i * 64) as u16 + bits.trailing_zeros() as u16);
            bits &= bits - 1;
        }
    }
}

/// Encoded size of [`collect_offsets`] followed by [`put_deltas`].
fn offsets_len(words: &Words, invert: bool) -> usize {
    let mut count = 0u32;
    let mut len = 0;
    let mut prev = 0u32;

    for (i, &w) in words.iter().enumerate() {
        let mut bits = if invert { !w } else { w };
        while bits != 0 {
            let offset = (i * 64) as u32 + bits.trailing_zeros();
            len += varint_len(offset - prev);
            prev = offset;
            count += 1;
            bits &= bits - 1;
        }
    }

    len + varint_len(count)
}

fn deltas_len(values: &[u16]) -> usize {
    let mut prev = 0u16;
    let deltas: usize = values
        .iter()
        .map(|&v| {
            let delta = v - prev;
            prev = v;
            varint_len(delta as u32)
        })
        .sum();
    varint_len(values.len() as u32) + deltas
}

/// Write a count followed by the first value and successive differences.
fn put_deltas(out: &mut Vec<u8>, values: &[u16]) {
    put_varint(out, values.len() as u32);
    let mut prev = 0u16;
    for &v in values {
        put_varint(out, (v - prev) as u32);
        prev = v;
    }
}

/// Inverse of [`put_deltas`]. Rejects values that are not strictly ascending
/// or do not fit in a block.
fn read_deltas(reader: &mut Reader<'_>, index: u16, out: &mut Vec<u16>) -> Result<()> {
    let count = reader.varint()?;
    if count > BLOCK_BITS {
        return Err(Error::CorruptBlock(index));
    }

    out.clear();
    let mut prev = 0u32;
    for i in 0..count {
        let delta = reader.varint()?;
        if i > 0 && delta == 0 {
            return Err(Error::CorruptBlock(index));
        }
        let value = prev
            .checked_add(delta)
            .filter(|&v| v < BLOCK_BITS)
            .ok_or(Error::CorruptBlock(index))?;
        out.push(value as u16);
        prev = value;
    }

    Ok(())
}

/// Parsed header fields.
#[derive(Debug)]
struct Header {
    level: u8,
    size: Option<u32>,
    records: u32,
}

impl Header {
    fn read(reader: &mut Reader<'_>, len: usize) -> Result<Self> {
        if len < HEADER_SIZE {
            return Err(Error::TooShort(len, HEADER_SIZE));
        }
        if reader.bytes(MAGIC.len())? != MAGIC {
            return Err(Error::InvalidMagic);
        }

        let version = reader.u8()?;
        if version != VERSION {
            return Err(Error::UnsupportedVersion(version));
        }

        let level = reader.u8()?;
        let flags = reader.u8()?;
        if flags & !FLAG_BOUNDED != 0 {
            return Err(Error::UnsupportedFlags(flags));
        }

        let size = if flags & FLAG_BOUNDED != 0 {
            Some(reader.u32()?)
        } else {
            None
        };
        let records = reader.varint()?;

        Ok(Self {
            level,
            size,
            records,
        })
    }
}

/// One decoded record: `span` consecutive blocks starting at `index`, all
/// holding `view`.
struct Record<'t> {
    index: u16,
    span: u32,
    view: BlockView<'t>,
}

fn read_record<'t>(reader: &mut Reader<'_>, temp: &'t mut TempBlock) -> Result<Record<'t>> {
    let index = reader.u16()?;
    let tag_offset = reader.pos();
    let tag = reader.u8()?;

    let (view, span) = match tag {
        TAG_FULL => (BlockView::Full, 1),
        TAG_FULL_SPAN => {
            let extra = reader.varint()?;
            if index as u32 + extra > u16::MAX as u32 {
                return Err(Error::CorruptBlock(index));
            }
            (BlockView::Full, extra + 1)
        }
        TAG_BITMAP => {
            if reader.remaining() < BITMAP_BYTES {
                return Err(Error::Truncated(reader.pos()));
            }
            for w in temp.words.iter_mut() {
                *w = reader.u64()?;
            }
            (BlockView::Bitmap(&temp.words), 1)
        }
        TAG_RUNS => {
            let count = reader.varint()?;
            if count > BLOCK_BITS {
                return Err(Error::CorruptBlock(index));
            }
            temp.toggles.clear();
            for _ in 0..count {
                temp.toggles.push(reader.u16()?);
            }
            if !temp.toggles.windows(2).all(|w| w[0] < w[1]) {
                return Err(Error::CorruptBlock(index));
            }
            (BlockView::RunList(&temp.toggles), 1)
        }
        TAG_RUNS_DELTA => {
            read_deltas(reader, index, &mut temp.toggles)?;
            (BlockView::RunList(&temp.toggles), 1)
        }
        TAG_POSITIONS | TAG_INVERTED => {
            read_deltas(reader, index, &mut temp.toggles)?;
            let inverted = tag == TAG_INVERTED;
            temp.words.fill(if inverted { u64::MAX } else { 0 });
            for &offset in &temp.toggles {
                temp.words[(offset / 64) as usize] ^= 1u64 << (offset % 64);
            }
            (BlockView::Bitmap(&temp.words), 1)
        }
        other => {
            return Err(Error::UnknownTag {
                tag: other,
                offset: tag_offset,
            });
        }
    };

    Ok(Record { index, span, view })
}

/// Serialize `bv` at `level`.
pub fn serialize(bv: &BitVector, level: CompressionLevel) -> Vec<u8> {
    Serializer::new(level).serialize(bv)
}

/// Decode a serialized buffer into a new vector, restoring its size.
pub fn deserialize(buf: &[u8]) -> Result<BitVector> {
    let header = Header::read(&mut Reader::new(buf), buf.len())?;
    let mut bv = BitVector::from_parts(header.size, BlockStore::new());
    deserialize_op(&mut bv, buf, Operation::Or, &mut TempBlock::new())?;
    Ok(bv)
}

/// [`deserialize_op`] with a freshly allocated scratch block.
pub fn deserialize_into(dest: &mut BitVector, buf: &[u8], op: Operation) -> Result<()> {
    deserialize_op(dest, buf, op, &mut TempBlock::new())
}

/// Combine `dest` with the serialized vector in `buf` under `op`, in place.
///
/// Equivalent to decoding `buf` and calling
/// [`BitVector::combine_operation`], but only one block is ever decoded at a
/// time: each record is read into `temp` and folded straight into the
/// destination block with the same index.
///
/// On error the destination keeps a valid state (canonical blocks, no bit at
/// or beyond its size) but its contents are unspecified: records before the
/// failing one have been applied, the failing record has not.
pub fn deserialize_op(
    dest: &mut BitVector,
    buf: &[u8],
    op: Operation,
    temp: &mut TempBlock,
) -> Result<()> {
    let mut reader = Reader::new(buf);
    let header = Header::read(&mut reader, buf.len())?;
    trace!(
        level = header.level,
        size = ?header.size,
        records = header.records,
        ?op,
        "deserializing with operation"
    );

    dest.set_size(max_size(dest.size(), header.size));

    let mut left = dest.store_mut().take_blocks().into_iter().peekable();
    let mut out = Vec::with_capacity(left.len());
    let result = fold_records(&mut reader, &header, temp, op, &mut left, &mut out);

    // Blocks after the last record meet an implicit `Empty`: only AND drops
    // them, and only once the whole stream has been applied.
    if result.is_err() || op != Operation::And {
        out.extend(left);
    }
    dest.store_mut().put_blocks(out);

    if let Err(err) = &result {
        debug!(%err, ?op, "operation deserialize failed");
    }
    result
}

fn fold_records<I>(
    reader: &mut Reader<'_>,
    header: &Header,
    temp: &mut TempBlock,
    op: Operation,
    left: &mut Peekable<I>,
    out: &mut Vec<(u16, Block)>,
) -> Result<()>
where
    I: Iterator<Item = (u16, Block)>,
{
    let mut next_index = 0u32;

    for _ in 0..header.records {
        let record = read_record(reader, temp)?;
        if (record.index as u32) < next_index {
            return Err(Error::BlockOrder(record.index));
        }

        let first = record.index as u32;
        let last = first + record.span - 1;
        next_index = last + 1;

        for index in first..=last {
            let index = index as u16;
            while let Some((key, block)) = left.next_if(|(k, _)| *k < index) {
                if op != Operation::And {
                    out.push((key, block));
                }
            }

            let block = match left.next_if(|(k, _)| *k == index) {
                Some((_, block)) => block,
                None => Block::Empty,
            };
            // Only the bits below a bounded header size take part.
            let clipped;
            let view = match header.size {
                Some(size) if join(index, 0) >= size => BlockView::Empty,
                Some(size) if size - join(index, 0) < BLOCK_BITS => {
                    let tail = [(size - join(index, 0)) as u16];
                    clipped = combine_block(
                        record.view.to_block(),
                        BlockView::RunList(&tail),
                        Operation::Sub,
                    );
                    clipped.view()
                }
                _ => record.view,
            };
            push_block(out, index, combine_block(block, view, op));
        }
    }

    if reader.remaining() > 0 {
        return Err(Error::TrailingBytes(reader.remaining()));
    }

    Ok(())
}
