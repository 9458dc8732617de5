//! Storage formats and format descriptors

use std::fmt;

/// Storage format of a matrix.
///
/// The numeric values are part of device kernel signatures and must stay stable.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Format {
    /// Hypersparse: offsets, explicit list of occupied vectors, indices
    Hypersparse = 0,
    /// Sparse: offsets for every vector, indices
    Sparse = 1,
    /// Bitmap: dense values plus one existence flag per slot
    Bitmap = 2,
    /// Full: dense values, every slot present
    Full = 3,
}

impl Format {
    /// All formats
    pub const ALL: [Format; 4] = [
        Format::Hypersparse,
        Format::Sparse,
        Format::Bitmap,
        Format::Full,
    ];

    /// Returns true for the offset-based formats
    #[inline]
    pub const fn is_compressed(self) -> bool {
        matches!(self, Format::Sparse | Format::Hypersparse)
    }

    /// Returns true for the dense-index formats
    #[inline]
    pub const fn is_dense(self) -> bool {
        matches!(self, Format::Bitmap | Format::Full)
    }

    /// Short name
    pub const fn name(self) -> &'static str {
        match self {
            Format::Hypersparse => "hypersparse",
            Format::Sparse => "sparse",
            Format::Bitmap => "bitmap",
            Format::Full => "full",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Read-only summary of a matrix's storage state, inspected during dispatch.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FormatDesc {
    /// Storage format
    pub format: Format,
    /// All entries share one stored value
    pub iso: bool,
    /// Some vector holds unsorted indices
    pub jumbled: bool,
    /// Entries deleted but not yet compacted
    pub nzombies: usize,
    /// Insertions queued but not yet assembled
    pub npending: usize,
    /// Number of stored vectors
    pub nvec: usize,
    /// Number of live stored entries
    pub nvals: usize,
}

impl FormatDesc {
    /// Returns true if zombies or pending tuples must be resolved first
    pub fn has_deferred_work(&self) -> bool {
        self.nzombies > 0 || self.npending > 0
    }
}
