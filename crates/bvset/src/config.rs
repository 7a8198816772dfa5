/// Effort level for block optimization and serialization.
///
/// Higher levels spend more time looking for a smaller representation. The
/// level never changes the logical content of a vector.
///
/// | level | `optimize` run-list budget | serializer encodings                    |
/// |-------|----------------------------|-----------------------------------------|
/// | 0     | canonicalize only          | raw bitmaps, raw run lists              |
/// | 1     | 128 toggles                | raw bitmaps, raw run lists              |
/// | 2     | 512 toggles                | + delta-coded run lists                 |
/// | 3     | 1280 toggles               | + delta-coded run lists                 |
/// | 4     | 2048 toggles               | + full spans, position lists, inverted  |
/// | 5     | 4096 toggles               | + cross run/position re-encoding        |
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CompressionLevel(u8);

impl CompressionLevel {
    pub const NONE: Self = Self(0);
    pub const MAX: Self = Self(5);

    /// Create a level, clamping anything above [`CompressionLevel::MAX`].
    pub const fn new(level: u8) -> Self {
        if level > Self::MAX.0 {
            Self::MAX
        } else {
            Self(level)
        }
    }

    /// The numeric level.
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Maximum number of toggles `optimize` will try when turning a bitmap
    /// into a run list, or `None` when the level only canonicalizes.
    ///
    /// A run list costs two bytes per toggle and a bitmap 8 KiB, so 4096 is
    /// the size break-even point. Lower levels give up earlier.
    pub(crate) fn run_budget(self) -> Option<usize> {
        match self.0 {
            0 => None,
            1 => Some(128),
            2 => Some(512),
            3 => Some(1280),
            4 => Some(2048),
            _ => Some(4096),
        }
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self(4)
    }
}

impl From<u8> for CompressionLevel {
    fn from(level: u8) -> Self {
        Self::new(level)
    }
}

/// Run-list budget used by mutating paths (`set`, bulk imports, run merges).
pub(crate) const MUTATION_RUN_BUDGET: usize = 1280;

/// Ordering promise for bulk position imports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SortHint {
    /// Positions are strictly ascending. Enables a single merge pass; passing
    /// unsorted input with this hint is a caller error with unspecified
    /// (but memory safe) results.
    Sorted,
    /// No ordering promise. Each position is inserted on its own.
    #[default]
    Unsorted,
}
