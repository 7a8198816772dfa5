use thiserror::Error;

/// Errors produced while decoding serialized vectors or operation codes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("buffer too short ({0} bytes, need at least {1})")]
    TooShort(usize, usize),

    #[error("invalid magic (expected \"BVSA\")")]
    InvalidMagic,

    #[error("unsupported version: {0}")]
    UnsupportedVersion(u8),

    #[error("unsupported header flags: {0:#04x}")]
    UnsupportedFlags(u8),

    /// The stream ended in the middle of a header or record.
    #[error("truncated stream at offset {0}")]
    Truncated(usize),

    #[error("malformed varint at offset {0}")]
    Varint(usize),

    #[error("unknown block tag {tag:#04x} at offset {offset}")]
    UnknownTag { tag: u8, offset: usize },

    /// Block records must appear in strictly ascending index order.
    #[error("block index {0} out of order")]
    BlockOrder(u16),

    #[error("corrupt payload in block {0}")]
    CorruptBlock(u16),

    #[error("{0} trailing bytes after last block")]
    TrailingBytes(usize),

    #[error("unknown operation code: {0}")]
    UnknownOperation(u8),
}

/// A specialized Result type for decoding operations.
pub type Result<T> = std::result::Result<T, Error>;
