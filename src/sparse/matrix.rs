//! Matrix storage
//!
//! Matrices are held by column: a "vector" is one column, and compressed
//! formats store row indices. All buffers are reference counted; cloning a
//! matrix is a shallow copy, and mutation goes through `Arc::make_mut` so a
//! shared buffer is copied before it is written.

use super::{Format, FormatDesc, Values};
use crate::dtype::{ElemType, Element, Scalar};
use crate::error::{Error, Result};
use crate::runtime::workspace::{dense_len, try_vec, try_with_capacity};
use std::ops::Range;
use std::sync::Arc;

/// Row index stored for a deleted entry that has not been compacted yet
#[inline]
pub(crate) const fn flip(i: i64) -> i64 {
    -i - 2
}

/// Returns true for a zombie row index
#[inline]
pub(crate) const fn is_zombie(i: i64) -> bool {
    i < 0
}

/// Row index of an entry, live or zombie
#[inline]
pub(crate) const fn unflip(i: i64) -> i64 {
    if i < 0 { -i - 2 } else { i }
}

/// Pattern storage of a matrix.
#[derive(Clone, Debug)]
pub(crate) enum Structure {
    Full,
    Bitmap {
        b: Arc<Vec<u8>>,
        nvals: usize,
    },
    Sparse {
        p: Arc<Vec<i64>>,
        i: Arc<Vec<i64>>,
    },
    Hypersparse {
        p: Arc<Vec<i64>>,
        h: Arc<Vec<i64>>,
        i: Arc<Vec<i64>>,
    },
}

/// A queued insertion, with its value already cast to the matrix type.
#[derive(Clone, Debug)]
pub(crate) struct PendingTuple {
    pub(crate) row: i64,
    pub(crate) col: i64,
    pub(crate) value: Vec<u8>,
}

/// Borrowed view of a sparse or hypersparse pattern.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Compressed<'a> {
    pub(crate) p: &'a [i64],
    pub(crate) h: Option<&'a [i64]>,
    pub(crate) i: &'a [i64],
}

impl<'a> Compressed<'a> {
    /// Number of stored vectors
    #[inline]
    pub(crate) fn nvec(&self) -> usize {
        self.p.len() - 1
    }

    /// Number of stored entries, zombies included
    #[inline]
    pub(crate) fn nnz(&self) -> usize {
        self.p[self.nvec()] as usize
    }

    /// Column index of the `k`-th stored vector
    #[inline]
    pub(crate) fn vector(&self, k: usize) -> i64 {
        match self.h {
            Some(h) => h[k],
            None => k as i64,
        }
    }

    /// Entry positions of the `k`-th stored vector
    #[inline]
    pub(crate) fn range(&self, k: usize) -> Range<usize> {
        self.p[k] as usize..self.p[k + 1] as usize
    }

    /// First stored vector whose column index is `>= j`, and whether it equals `j`
    pub(crate) fn lower_bound(&self, j: i64) -> (usize, bool) {
        match self.h {
            Some(h) => {
                let k = h.partition_point(|&v| v < j);
                (k, k < h.len() && h[k] == j)
            }
            None => {
                let nvec = self.nvec() as i64;
                if j < 0 {
                    (0, false)
                } else if j >= nvec {
                    (nvec as usize, false)
                } else {
                    (j as usize, true)
                }
            }
        }
    }

    /// Stored vector holding column `j`
    #[inline]
    pub(crate) fn find(&self, j: i64) -> Option<usize> {
        match self.lower_bound(j) {
            (k, true) => Some(k),
            _ => None,
        }
    }
}

/// A sparse matrix in one of four storage formats.
#[derive(Clone, Debug)]
pub struct Matrix {
    pub(crate) ty: ElemType,
    pub(crate) nrows: usize,
    pub(crate) ncols: usize,
    pub(crate) structure: Structure,
    pub(crate) x: Arc<Values>,
    pub(crate) iso: bool,
    pub(crate) jumbled: bool,
    pub(crate) nzombies: usize,
    pub(crate) pending: Vec<PendingTuple>,
}

impl Matrix {
    // ========================================================================
    // Construction
    // ========================================================================

    fn check_header(ty: &ElemType, nrows: usize, ncols: usize) -> Result<()> {
        if ty.size() == 0 {
            return Err(Error::invalid_argument("ty", "element type has zero size"));
        }
        let limit = i64::MAX as usize;
        if nrows > limit || ncols > limit {
            return Err(Error::invalid_argument(
                "dims",
                format!("{nrows} x {ncols} exceeds the index range"),
            ));
        }
        Ok(())
    }

    pub(crate) fn from_parts(
        ty: ElemType,
        nrows: usize,
        ncols: usize,
        structure: Structure,
        x: Values,
        iso: bool,
    ) -> Self {
        Matrix {
            ty,
            nrows,
            ncols,
            structure,
            x: Arc::new(x),
            iso,
            jumbled: false,
            nzombies: 0,
            pending: Vec::new(),
        }
    }

    /// Empty hypersparse matrix
    pub fn new(ty: impl Into<ElemType>, nrows: usize, ncols: usize) -> Result<Self> {
        Self::empty_with_format(ty, nrows, ncols, Format::Hypersparse)
    }

    /// Empty matrix in the given format.
    ///
    /// A full matrix is only empty when it has no slots at all.
    pub fn empty_with_format(
        ty: impl Into<ElemType>,
        nrows: usize,
        ncols: usize,
        format: Format,
    ) -> Result<Self> {
        let ty = ty.into();
        Self::check_header(&ty, nrows, ncols)?;
        let size = ty.size();
        let (structure, x) = match format {
            Format::Hypersparse => (
                Structure::Hypersparse {
                    p: Arc::new(vec![0]),
                    h: Arc::new(Vec::new()),
                    i: Arc::new(Vec::new()),
                },
                Values::try_zeroed(0, size)?,
            ),
            Format::Sparse => (
                Structure::Sparse {
                    p: Arc::new(try_vec(ncols + 1, 0)?),
                    i: Arc::new(Vec::new()),
                },
                Values::try_zeroed(0, size)?,
            ),
            Format::Bitmap => {
                let n = dense_len(nrows, ncols)?;
                (
                    Structure::Bitmap {
                        b: Arc::new(try_vec(n, 0)?),
                        nvals: 0,
                    },
                    Values::try_zeroed(n, size)?,
                )
            }
            Format::Full => {
                if dense_len(nrows, ncols)? != 0 {
                    return Err(Error::invalid_argument(
                        "format",
                        "a full matrix with slots cannot be empty",
                    ));
                }
                (Structure::Full, Values::try_zeroed(0, size)?)
            }
        };
        Ok(Self::from_parts(ty, nrows, ncols, structure, x, false))
    }

    /// Empty matrix shaped like `self`, compressed in `self`'s flavor
    pub(crate) fn empty_like(&self, ty: &ElemType) -> Result<Self> {
        let format = match self.format() {
            Format::Hypersparse => Format::Hypersparse,
            _ => Format::Sparse,
        };
        Self::empty_with_format(ty.clone(), self.nrows, self.ncols, format)
    }

    fn validated(mut self) -> Result<Self> {
        self.jumbled = self.detect_jumbled();
        self.check()?;
        Ok(self)
    }

    /// Sparse matrix from compressed-column parts.
    ///
    /// Row indices within a column may be unsorted; the matrix is then
    /// flagged jumbled.
    pub fn from_csc<T: Element>(
        nrows: usize,
        ncols: usize,
        p: Vec<i64>,
        i: Vec<i64>,
        x: &[T],
    ) -> Result<Self> {
        Self::check_header(&T::DTYPE.into(), nrows, ncols)?;
        let structure = Structure::Sparse {
            p: Arc::new(p),
            i: Arc::new(i),
        };
        Self::from_parts(T::DTYPE.into(), nrows, ncols, structure, Values::from_slice(x)?, false)
            .validated()
    }

    /// Hypersparse matrix from offsets, the sorted list of occupied columns, and row indices
    pub fn from_hyper_csc<T: Element>(
        nrows: usize,
        ncols: usize,
        p: Vec<i64>,
        h: Vec<i64>,
        i: Vec<i64>,
        x: &[T],
    ) -> Result<Self> {
        Self::check_header(&T::DTYPE.into(), nrows, ncols)?;
        let structure = Structure::Hypersparse {
            p: Arc::new(p),
            h: Arc::new(h),
            i: Arc::new(i),
        };
        Self::from_parts(T::DTYPE.into(), nrows, ncols, structure, Values::from_slice(x)?, false)
            .validated()
    }

    /// Sparse iso matrix: every entry of the pattern holds `value`
    pub fn from_csc_iso(
        nrows: usize,
        ncols: usize,
        p: Vec<i64>,
        i: Vec<i64>,
        value: &Scalar,
    ) -> Result<Self> {
        let ty = value.ty().clone();
        Self::check_header(&ty, nrows, ncols)?;
        let x = Values::from_bytes(value.bytes(), ty.size())?;
        let structure = Structure::Sparse {
            p: Arc::new(p),
            i: Arc::new(i),
        };
        Self::from_parts(ty, nrows, ncols, structure, x, true).validated()
    }

    /// Bitmap matrix; `b` and `x` are column-major with `nrows * ncols` slots
    pub fn from_bitmap<T: Element>(
        nrows: usize,
        ncols: usize,
        b: Vec<u8>,
        x: &[T],
    ) -> Result<Self> {
        Self::check_header(&T::DTYPE.into(), nrows, ncols)?;
        let nvals = b.iter().filter(|&&f| f != 0).count();
        let structure = Structure::Bitmap {
            b: Arc::new(b),
            nvals,
        };
        Self::from_parts(T::DTYPE.into(), nrows, ncols, structure, Values::from_slice(x)?, false)
            .validated()
    }

    /// Full matrix; `x` is column-major with `nrows * ncols` values
    pub fn from_full<T: Element>(nrows: usize, ncols: usize, x: &[T]) -> Result<Self> {
        Self::check_header(&T::DTYPE.into(), nrows, ncols)?;
        Self::from_parts(
            T::DTYPE.into(),
            nrows,
            ncols,
            Structure::Full,
            Values::from_slice(x)?,
            false,
        )
        .validated()
    }

    /// Matrix from coordinate tuples, stored in `format`.
    ///
    /// Duplicate coordinates are rejected; use `MatrixOps::build` to combine them.
    pub fn from_tuples<T: Element>(
        nrows: usize,
        ncols: usize,
        rows: &[usize],
        cols: &[usize],
        vals: &[T],
        format: Format,
    ) -> Result<Self> {
        if rows.len() != cols.len() || rows.len() != vals.len() {
            return Err(Error::invalid_argument(
                "tuples",
                "rows, cols and values must have equal length",
            ));
        }
        for (&r, &c) in rows.iter().zip(cols) {
            if r >= nrows {
                return Err(Error::IndexOutOfBounds {
                    index: r,
                    size: nrows,
                });
            }
            if c >= ncols {
                return Err(Error::IndexOutOfBounds {
                    index: c,
                    size: ncols,
                });
            }
        }
        let mut order: Vec<usize> = (0..rows.len()).collect();
        order.sort_unstable_by_key(|&k| (cols[k], rows[k]));
        if order
            .windows(2)
            .any(|w| (cols[w[0]], rows[w[0]]) == (cols[w[1]], rows[w[1]]))
        {
            return Err(Error::invalid_argument("tuples", "duplicate coordinates"));
        }
        let mut p = try_vec(ncols + 1, 0i64)?;
        for &c in cols {
            p[c + 1] += 1;
        }
        for k in 0..ncols {
            p[k + 1] += p[k];
        }
        let i: Vec<i64> = order.iter().map(|&k| rows[k] as i64).collect();
        let x: Vec<T> = order.iter().map(|&k| vals[k]).collect();
        Self::from_csc(nrows, ncols, p, i, &x)?.to_format(format)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Number of rows (the length of each vector)
    #[inline]
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Number of columns (the number of vectors)
    #[inline]
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Element type
    #[inline]
    pub fn ty(&self) -> &ElemType {
        &self.ty
    }

    /// Storage format
    pub fn format(&self) -> Format {
        match self.structure {
            Structure::Full => Format::Full,
            Structure::Bitmap { .. } => Format::Bitmap,
            Structure::Sparse { .. } => Format::Sparse,
            Structure::Hypersparse { .. } => Format::Hypersparse,
        }
    }

    /// Returns true if all entries share one stored value
    #[inline]
    pub fn is_iso(&self) -> bool {
        self.iso
    }

    /// Returns true if some vector holds unsorted indices
    #[inline]
    pub fn is_jumbled(&self) -> bool {
        self.jumbled
    }

    /// Number of deleted entries awaiting compaction
    #[inline]
    pub fn nzombies(&self) -> usize {
        self.nzombies
    }

    /// Number of queued insertions awaiting assembly
    #[inline]
    pub fn npending(&self) -> usize {
        self.pending.len()
    }

    /// Number of stored vectors
    pub fn nvec(&self) -> usize {
        match self.compressed() {
            Some(c) => c.nvec(),
            None => self.ncols,
        }
    }

    /// Number of live stored entries; queued insertions are not counted
    pub fn nvals(&self) -> usize {
        match &self.structure {
            Structure::Full => self.nrows * self.ncols,
            Structure::Bitmap { nvals, .. } => *nvals,
            Structure::Sparse { i, .. } | Structure::Hypersparse { i, .. } => {
                i.len() - self.nzombies
            }
        }
    }

    /// Format descriptor
    pub fn desc(&self) -> FormatDesc {
        FormatDesc {
            format: self.format(),
            iso: self.iso,
            jumbled: self.jumbled,
            nzombies: self.nzombies,
            npending: self.pending.len(),
            nvec: self.nvec(),
            nvals: self.nvals(),
        }
    }

    /// Column offsets of a sparse or hypersparse matrix
    pub fn col_ptrs(&self) -> Option<&[i64]> {
        self.compressed().map(|c| c.p)
    }

    /// Occupied columns of a hypersparse matrix
    pub fn hyper_list(&self) -> Option<&[i64]> {
        self.compressed().and_then(|c| c.h)
    }

    /// Row indices of a sparse or hypersparse matrix
    pub fn row_indices(&self) -> Option<&[i64]> {
        self.compressed().map(|c| c.i)
    }

    /// Existence flags of a bitmap matrix
    pub fn bitmap(&self) -> Option<&[u8]> {
        match &self.structure {
            Structure::Bitmap { b, .. } => Some(b),
            _ => None,
        }
    }

    /// Stored values (a single value when iso)
    #[inline]
    pub fn values(&self) -> &Values {
        &self.x
    }

    /// The shared value of an iso matrix
    pub fn iso_value(&self) -> Option<Scalar> {
        if self.iso {
            Scalar::from_bytes(self.ty.clone(), self.x.get(0).to_vec()).ok()
        } else {
            None
        }
    }

    /// Shallow copy sharing every buffer with `self`
    pub fn shallow_copy(&self) -> Matrix {
        self.clone()
    }

    /// Returns true if the value buffer is shared with another matrix
    pub fn is_shallow(&self) -> bool {
        Arc::strong_count(&self.x) > 1
    }

    /// Returns true if both matrices use the same value buffer
    pub fn shares_values_with(&self, other: &Matrix) -> bool {
        Arc::ptr_eq(&self.x, &other.x)
    }

    pub(crate) fn compressed(&self) -> Option<Compressed<'_>> {
        match &self.structure {
            Structure::Sparse { p, i } => Some(Compressed { p, h: None, i }),
            Structure::Hypersparse { p, h, i } => Some(Compressed { p, h: Some(h), i }),
            _ => None,
        }
    }

    /// Value bytes of the entry at storage position `p`
    #[inline]
    pub(crate) fn value(&self, p: usize) -> &[u8] {
        if self.iso { self.x.get(0) } else { self.x.get(p) }
    }

    /// Dense-slot count of a bitmap or full matrix
    pub(crate) fn dense_slots(&self) -> usize {
        self.nrows * self.ncols
    }

    /// Returns true for a sparse or hypersparse matrix with every slot present
    pub(crate) fn as_if_full(&self) -> bool {
        match self.compressed() {
            Some(c) => {
                !self.jumbled
                    && self.nzombies == 0
                    && self.pending.is_empty()
                    && c.nvec() == self.ncols
                    && Some(c.nnz()) == self.nrows.checked_mul(self.ncols)
            }
            None => false,
        }
    }

    /// Returns true if zombies or pending tuples must be resolved first
    pub fn has_deferred_work(&self) -> bool {
        self.nzombies > 0 || !self.pending.is_empty()
    }

    // ========================================================================
    // Whole-matrix utilities
    // ========================================================================

    /// Visit every live stored entry in column-major storage order
    pub(crate) fn for_each_entry(&self, mut f: impl FnMut(usize, usize, &[u8])) {
        match &self.structure {
            Structure::Full | Structure::Bitmap { .. } => {
                let b = self.bitmap();
                for col in 0..self.ncols {
                    for row in 0..self.nrows {
                        let p = row + col * self.nrows;
                        if b.is_none_or(|b| b[p] != 0) {
                            f(row, col, self.value(p));
                        }
                    }
                }
            }
            _ => {
                if let Some(c) = self.compressed() {
                    for k in 0..c.nvec() {
                        let col = c.vector(k) as usize;
                        for p in c.range(k) {
                            if !is_zombie(c.i[p]) {
                                f(c.i[p] as usize, col, self.value(p));
                            }
                        }
                    }
                }
            }
        }
    }

    /// Coordinates and raw value bytes of every live stored entry
    pub fn extract_tuples_bytes(&self) -> (Vec<usize>, Vec<usize>, Vec<u8>) {
        let n = self.nvals();
        let mut rows = Vec::with_capacity(n);
        let mut cols = Vec::with_capacity(n);
        let mut vals = Vec::with_capacity(n * self.ty.size());
        self.for_each_entry(|r, c, v| {
            rows.push(r);
            cols.push(c);
            vals.extend_from_slice(v);
        });
        (rows, cols, vals)
    }

    /// Coordinates and values of every live stored entry, column by column
    pub fn extract_tuples<T: Element>(&self) -> Result<(Vec<usize>, Vec<usize>, Vec<T>)> {
        if self.ty != ElemType::Builtin(T::DTYPE) {
            return Err(Error::domain_mismatch(
                &self.ty,
                &T::DTYPE.into(),
                "extract_tuples",
            ));
        }
        let (rows, cols, bytes) = self.extract_tuples_bytes();
        let vals = bytes
            .chunks_exact(std::mem::size_of::<T>())
            .map(bytemuck::pod_read_unaligned)
            .collect();
        Ok((rows, cols, vals))
    }

    /// Compress to an iso matrix if every live entry holds the same value.
    ///
    /// Returns true if the matrix is iso afterwards.
    pub fn make_iso(&mut self) -> bool {
        if self.iso {
            return true;
        }
        if self.nvals() == 0 || !self.pending.is_empty() {
            return false;
        }
        let mut first: Option<Vec<u8>> = None;
        let mut uniform = true;
        self.for_each_entry(|_, _, v| match &first {
            None => first = Some(v.to_vec()),
            Some(f) => uniform &= f.as_slice() == v,
        });
        match (uniform, first) {
            (true, Some(value)) => match Values::from_bytes(&value, self.ty.size()) {
                Ok(x) => {
                    self.x = Arc::new(x);
                    self.iso = true;
                    true
                }
                Err(_) => false,
            },
            _ => false,
        }
    }

    /// Replace the single iso value by one stored value per entry
    pub(crate) fn expand_iso(&mut self) -> Result<()> {
        if !self.iso {
            return Ok(());
        }
        let count = match &self.structure {
            Structure::Full | Structure::Bitmap { .. } => self.dense_slots(),
            Structure::Sparse { i, .. } | Structure::Hypersparse { i, .. } => i.len(),
        };
        self.x = Arc::new(Values::filled(self.x.get(0), count)?);
        self.iso = false;
        Ok(())
    }

    fn detect_jumbled(&self) -> bool {
        match self.compressed() {
            Some(c) => (0..c.nvec()).any(|k| {
                let r = c.range(k);
                c.i[r].windows(2).any(|w| unflip(w[0]) > unflip(w[1]))
            }),
            None => false,
        }
    }

    /// Sort the indices of every vector; values move with their indices
    pub fn unjumble(&mut self) -> Result<()> {
        if !self.jumbled {
            return Ok(());
        }
        let size = self.ty.size();
        let iso = self.iso;
        let (p, i) = match &mut self.structure {
            Structure::Sparse { p, i } | Structure::Hypersparse { p, i, .. } => (p.clone(), i),
            _ => {
                self.jumbled = false;
                return Ok(());
            }
        };
        let i = Arc::make_mut(i);
        let x = Arc::make_mut(&mut self.x);
        let mut perm: Vec<usize> = try_with_capacity(0)?;
        let mut scratch_i: Vec<i64> = Vec::new();
        let mut scratch_x: Vec<u8> = Vec::new();
        for k in 0..p.len() - 1 {
            let (start, end) = (p[k] as usize, p[k + 1] as usize);
            if i[start..end].windows(2).all(|w| unflip(w[0]) <= unflip(w[1])) {
                continue;
            }
            perm.clear();
            perm.extend(start..end);
            perm.sort_unstable_by_key(|&q| unflip(i[q]));
            scratch_i.clear();
            scratch_i.extend(perm.iter().map(|&q| i[q]));
            i[start..end].copy_from_slice(&scratch_i);
            if !iso {
                scratch_x.clear();
                for &q in &perm {
                    scratch_x.extend_from_slice(x.get(q));
                }
                x.bytes_mut()[start * size..end * size].copy_from_slice(&scratch_x);
            }
        }
        self.jumbled = false;
        Ok(())
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// Verify every storage invariant
    pub fn check(&self) -> Result<()> {
        let bad = |msg: String| Err(Error::InvalidObject(msg));
        if self.x.elem_size() != self.ty.size() {
            return bad(format!(
                "value size {} does not match type {}",
                self.x.elem_size(),
                self.ty
            ));
        }
        let expected_values = match &self.structure {
            Structure::Full => self.dense_slots(),
            Structure::Bitmap { b, nvals } => {
                if b.len() != self.dense_slots() {
                    return bad(format!("bitmap has {} slots, expected {}", b.len(), self.dense_slots()));
                }
                if b.iter().any(|&f| f > 1) {
                    return bad("bitmap flags must be 0 or 1".into());
                }
                let count = b.iter().filter(|&&f| f == 1).count();
                if count != *nvals {
                    return bad(format!("bitmap holds {count} entries but records {nvals}"));
                }
                self.dense_slots()
            }
            Structure::Sparse { .. } | Structure::Hypersparse { .. } => {
                self.check_compressed()?;
                self.compressed().map_or(0, |c| c.nnz())
            }
        };
        if self.iso {
            if self.x.len() != 1 {
                return bad(format!("iso matrix stores {} values", self.x.len()));
            }
        } else if self.x.len() != expected_values {
            return bad(format!(
                "{} values stored, expected {}",
                self.x.len(),
                expected_values
            ));
        }
        for t in &self.pending {
            if t.row < 0 || t.row as usize >= self.nrows || t.col < 0 || t.col as usize >= self.ncols
            {
                return bad(format!("pending tuple ({}, {}) out of range", t.row, t.col));
            }
        }
        Ok(())
    }

    fn check_compressed(&self) -> Result<()> {
        let bad = |msg: String| Err(Error::InvalidObject(msg));
        let Some(c) = self.compressed() else {
            return Ok(());
        };
        if c.p.is_empty() || c.p[0] != 0 {
            return bad("offsets must start at 0".into());
        }
        match c.h {
            None if c.p.len() != self.ncols + 1 => {
                return bad(format!("{} offsets for {} columns", c.p.len(), self.ncols));
            }
            Some(h) => {
                if c.p.len() != h.len() + 1 {
                    return bad(format!("{} offsets for {} hyper vectors", c.p.len(), h.len()));
                }
                if h.windows(2).any(|w| w[0] >= w[1]) {
                    return bad("hyper list must be strictly increasing".into());
                }
                if h.iter().any(|&j| j < 0 || j as usize >= self.ncols) {
                    return bad("hyper list entry out of range".into());
                }
            }
            None => {}
        }
        if c.p.windows(2).any(|w| w[0] > w[1]) {
            return bad("offsets must be non-decreasing".into());
        }
        if c.nnz() != c.i.len() {
            return bad(format!("offsets end at {} but {} indices stored", c.nnz(), c.i.len()));
        }
        let mut zombies = 0;
        let mut sorted = Vec::new();
        for k in 0..c.nvec() {
            let r = c.range(k);
            for &v in &c.i[r.clone()] {
                let row = unflip(v);
                if row < 0 || row as usize >= self.nrows {
                    return bad(format!("row index {row} out of range"));
                }
                zombies += is_zombie(v) as usize;
            }
            let ordered = c.i[r.clone()].windows(2).all(|w| unflip(w[0]) < unflip(w[1]));
            if !ordered {
                if !self.jumbled {
                    return bad(format!("column {} is not sorted", c.vector(k)));
                }
                sorted.clear();
                sorted.extend(c.i[r].iter().map(|&v| unflip(v)));
                sorted.sort_unstable();
                if sorted.windows(2).any(|w| w[0] == w[1]) {
                    return bad(format!("column {} holds a duplicate row", c.vector(k)));
                }
            }
        }
        if zombies != self.nzombies {
            return bad(format!("{zombies} zombies stored but {} recorded", self.nzombies));
        }
        Ok(())
    }
}
