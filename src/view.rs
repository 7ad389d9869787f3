//! Strided matrix views.
//!
//! [`MatrixRef`] and [`MatrixMut`] are 2-D handles over borrowed memory with
//! arbitrary (possibly negative) row and column strides. Besides the layout
//! they carry the attributes the level-3 engine needs to treat an operand
//! correctly:
//!
//! - a conjugation flag (read side only)
//! - a [`Structure`] with its stored triangle ([`Uplo`]) and [`Diag`]
//! - a diagonal offset: element `(i, j)` lies on the diagonal when
//!   `j - i == diag_off`, is in the upper triangle when `j - i >= diag_off`
//!   and in the lower triangle when `j - i <= diag_off`
//!
//! Sub-views are pure pointer and extent arithmetic. Taking the sub-view at
//! `(i0, j0)` shifts the diagonal offset by `i0 - j0`, so structure survives
//! partitioning. Reading an element of a Hermitian or symmetric view that
//! lies in the unstored triangle returns its mirror, which always lies inside
//! the square root view the sub-view was cut from.

use std::marker::PhantomData;
use std::ops::Range;

use strided_blis_traits::Scalar;

use crate::{BlisError, Result};

/// How the elements of a matrix relate to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Structure {
    General,
    Hermitian,
    Symmetric,
    Triangular,
}

/// Which triangle is stored (or referenced).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Uplo {
    Upper,
    Lower,
}

impl Uplo {
    #[inline]
    pub fn flip(self) -> Self {
        match self {
            Uplo::Upper => Uplo::Lower,
            Uplo::Lower => Uplo::Upper,
        }
    }
}

/// Whether a triangular matrix has an implicit unit diagonal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diag {
    NonUnit,
    Unit,
}

/// Validate that all accessed offsets stay within `[0, len)`.
fn validate_bounds(
    len: usize,
    rows: usize,
    cols: usize,
    rs: isize,
    cs: isize,
    offset: usize,
) -> Result<()> {
    if rows == 0 || cols == 0 {
        return Ok(());
    }
    let offset = isize::try_from(offset).map_err(|_| BlisError::OffsetOverflow)?;
    let mut min_offset = offset;
    let mut max_offset = offset;
    for (dim, stride) in [(rows, rs), (cols, cs)] {
        if dim > 1 {
            let end = stride
                .checked_mul(dim as isize - 1)
                .ok_or(BlisError::OffsetOverflow)?;
            if end >= 0 {
                max_offset = max_offset
                    .checked_add(end)
                    .ok_or(BlisError::OffsetOverflow)?;
            } else {
                min_offset = min_offset
                    .checked_add(end)
                    .ok_or(BlisError::OffsetOverflow)?;
            }
        }
    }
    if min_offset < 0 || max_offset < 0 || max_offset as usize >= len {
        return Err(BlisError::OffsetOverflow);
    }
    Ok(())
}

/// An output view must address each element once: no zero stride along a
/// dimension longer than one, and the shorter stride times its extent must
/// not reach past the longer one (`ldc >= m` for column-major storage).
fn validate_disjoint(rows: usize, cols: usize, rs: isize, cs: isize) -> Result<()> {
    if (rows > 1 && rs == 0) || (cols > 1 && cs == 0) {
        return Err(BlisError::InvalidStructure(
            "output view with zero stride aliases its own elements".into(),
        ));
    }
    if rows > 1 && cols > 1 {
        let ((inner, extent), outer) = if rs.unsigned_abs() <= cs.unsigned_abs() {
            ((rs.unsigned_abs(), rows), cs.unsigned_abs())
        } else {
            ((cs.unsigned_abs(), cols), rs.unsigned_abs())
        };
        if inner.saturating_mul(extent) > outer {
            return Err(BlisError::InvalidStructure(format!(
                "output view {rows}x{cols} with strides ({rs}, {cs}) overlaps itself"
            )));
        }
    }
    Ok(())
}

#[inline]
fn check_range(r: &Range<usize>, extent: usize) -> Result<()> {
    if r.start > r.end || r.end > extent {
        return Err(BlisError::DimensionMismatch {
            op: "submatrix",
            detail: format!("range {}..{} outside extent {extent}", r.start, r.end),
        });
    }
    Ok(())
}

#[inline]
fn stored(structure: Structure, uplo: Uplo, diag_off: isize, i: isize, j: isize) -> bool {
    match structure {
        Structure::General => true,
        _ => match uplo {
            Uplo::Upper => j - i >= diag_off,
            Uplo::Lower => j - i <= diag_off,
        },
    }
}

// ============================================================================
// MatrixRef
// ============================================================================

/// Immutable strided matrix view.
pub struct MatrixRef<'a, T> {
    ptr: *const T,
    rows: usize,
    cols: usize,
    rs: isize,
    cs: isize,
    conj: bool,
    structure: Structure,
    uplo: Uplo,
    diag: Diag,
    diag_off: isize,
    _marker: PhantomData<&'a [T]>,
}

unsafe impl<T: Sync> Send for MatrixRef<'_, T> {}
unsafe impl<T: Sync> Sync for MatrixRef<'_, T> {}

impl<T> Clone for MatrixRef<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for MatrixRef<'_, T> {}

impl<T> std::fmt::Debug for MatrixRef<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatrixRef")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .field("rs", &self.rs)
            .field("cs", &self.cs)
            .field("conj", &self.conj)
            .field("structure", &self.structure)
            .field("uplo", &self.uplo)
            .field("diag_off", &self.diag_off)
            .finish()
    }
}

impl<'a, T: Scalar> MatrixRef<'a, T> {
    /// View `rows x cols` elements of `data` starting at index 0.
    pub fn from_slice(data: &'a [T], rows: usize, cols: usize, rs: isize, cs: isize) -> Result<Self> {
        Self::from_slice_offset(data, rows, cols, rs, cs, 0)
    }

    /// View `rows x cols` elements of `data` starting at `offset`.
    pub fn from_slice_offset(
        data: &'a [T],
        rows: usize,
        cols: usize,
        rs: isize,
        cs: isize,
        offset: usize,
    ) -> Result<Self> {
        validate_bounds(data.len(), rows, cols, rs, cs, offset)?;
        let ptr = if rows == 0 || cols == 0 {
            data.as_ptr()
        } else {
            unsafe { data.as_ptr().add(offset) }
        };
        Ok(unsafe { Self::from_raw_parts(ptr, rows, cols, rs, cs) })
    }

    /// Column-major view with leading dimension `rows`.
    pub fn col_major(data: &'a [T], rows: usize, cols: usize) -> Result<Self> {
        Self::from_slice(data, rows, cols, 1, rows.max(1) as isize)
    }

    /// Row-major view with leading dimension `cols`.
    pub fn row_major(data: &'a [T], rows: usize, cols: usize) -> Result<Self> {
        Self::from_slice(data, rows, cols, cols.max(1) as isize, 1)
    }

    /// Create a view over raw memory.
    ///
    /// # Safety
    /// Every `ptr + i*rs + j*cs` for `i < rows`, `j < cols` must be readable
    /// for `'a`.
    pub unsafe fn from_raw_parts(ptr: *const T, rows: usize, cols: usize, rs: isize, cs: isize) -> Self {
        Self {
            ptr,
            rows,
            cols,
            rs,
            cs,
            conj: false,
            structure: Structure::General,
            uplo: Uplo::Lower,
            diag: Diag::NonUnit,
            diag_off: 0,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn rs(&self) -> isize {
        self.rs
    }

    #[inline]
    pub fn cs(&self) -> isize {
        self.cs
    }

    #[inline]
    pub fn is_conj(&self) -> bool {
        self.conj
    }

    #[inline]
    pub fn structure(&self) -> Structure {
        self.structure
    }

    #[inline]
    pub fn uplo(&self) -> Uplo {
        self.uplo
    }

    #[inline]
    pub fn diag(&self) -> Diag {
        self.diag
    }

    #[inline]
    pub fn diag_off(&self) -> isize {
        self.diag_off
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    #[inline]
    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    /// Raw const pointer to element `(0, 0)`.
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.ptr
    }

    /// Mark the view Hermitian with the given stored triangle.
    pub fn hermitian(self, uplo: Uplo) -> Result<Self> {
        self.structured(Structure::Hermitian, uplo)
    }

    /// Mark the view symmetric with the given stored triangle.
    pub fn symmetric(self, uplo: Uplo) -> Result<Self> {
        self.structured(Structure::Symmetric, uplo)
    }

    fn structured(mut self, structure: Structure, uplo: Uplo) -> Result<Self> {
        if !self.is_square() {
            return Err(BlisError::NonSquare {
                rows: self.rows,
                cols: self.cols,
            });
        }
        self.structure = structure;
        self.uplo = uplo;
        self.diag_off = 0;
        Ok(self)
    }

    /// Mark the view triangular. Elements outside the `uplo` triangle read as
    /// zero; with [`Diag::Unit`] the diagonal reads as one.
    pub fn triangular(mut self, uplo: Uplo, diag: Diag) -> Self {
        self.structure = Structure::Triangular;
        self.uplo = uplo;
        self.diag = diag;
        self.diag_off = 0;
        self
    }

    /// Drop structure; every element is read from memory as stored.
    pub fn as_general(mut self) -> Self {
        self.structure = Structure::General;
        self
    }

    /// Transpose (zero-copy).
    pub fn t(&self) -> Self {
        Self {
            rows: self.cols,
            cols: self.rows,
            rs: self.cs,
            cs: self.rs,
            uplo: self.uplo.flip(),
            diag_off: -self.diag_off,
            ..*self
        }
    }

    /// Conjugate transpose (zero-copy).
    pub fn h(&self) -> Self {
        let mut v = self.t();
        v.conj = !v.conj;
        v
    }

    /// Toggle conjugation (zero-copy).
    pub fn conj(&self) -> Self {
        Self {
            conj: !self.conj,
            ..*self
        }
    }

    /// Checked sub-view.
    pub fn submatrix(&self, rows: Range<usize>, cols: Range<usize>) -> Result<Self> {
        check_range(&rows, self.rows)?;
        check_range(&cols, self.cols)?;
        Ok(self.part(rows.start, rows.len(), cols.start, cols.len()))
    }

    /// Sub-view of `m x n` elements at `(i0, j0)`; the caller guarantees the
    /// window lies inside the view.
    #[inline]
    pub(crate) fn part(&self, i0: usize, m: usize, j0: usize, n: usize) -> Self {
        debug_assert!(i0 + m <= self.rows && j0 + n <= self.cols);
        let ptr = if m == 0 || n == 0 {
            self.ptr
        } else {
            self.ptr
                .wrapping_offset(i0 as isize * self.rs + j0 as isize * self.cs)
        };
        Self {
            ptr,
            rows: m,
            cols: n,
            diag_off: self.diag_off + i0 as isize - j0 as isize,
            ..*self
        }
    }

    /// Whether `(i, j)` lies in the referenced part of the view.
    #[inline]
    pub fn is_stored(&self, i: usize, j: usize) -> bool {
        stored(self.structure, self.uplo, self.diag_off, i as isize, j as isize)
    }

    /// Whether `(i, j)` lies on the diagonal.
    #[inline]
    pub fn is_diag(&self, i: usize, j: usize) -> bool {
        j as isize - i as isize == self.diag_off
    }

    /// Element as stored in memory, with the view's conjugation applied.
    #[inline]
    pub fn get_stored(&self, i: usize, j: usize) -> T {
        assert!(i < self.rows && j < self.cols, "index ({i}, {j}) out of bounds");
        let v = unsafe { self.raw(i as isize, j as isize) };
        if self.conj {
            v.conj()
        } else {
            v
        }
    }

    /// Logical element `(i, j)` of the dense matrix the view represents.
    ///
    /// Unstored Hermitian/symmetric elements are read from their mirror,
    /// unstored triangular elements read as zero.
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> T {
        assert!(i < self.rows && j < self.cols, "index ({i}, {j}) out of bounds");
        let (ii, jj) = (i as isize, j as isize);
        let d = self.diag_off;
        let on_diag = jj - ii == d;
        let is_stored = stored(self.structure, self.uplo, d, ii, jj);
        let v = unsafe {
            match self.structure {
                Structure::General => self.raw(ii, jj),
                Structure::Triangular => {
                    if on_diag && self.diag == Diag::Unit {
                        T::one()
                    } else if is_stored {
                        self.raw(ii, jj)
                    } else {
                        T::zero()
                    }
                }
                Structure::Hermitian => {
                    if on_diag {
                        self.raw(ii, jj).real_only()
                    } else if is_stored {
                        self.raw(ii, jj)
                    } else {
                        self.raw(jj - d, ii + d).conj()
                    }
                }
                Structure::Symmetric => {
                    if is_stored {
                        self.raw(ii, jj)
                    } else {
                        self.raw(jj - d, ii + d)
                    }
                }
            }
        };
        if self.conj {
            v.conj()
        } else {
            v
        }
    }

    /// # Safety
    /// `(i, j)` must address memory covered by the root view.
    #[inline(always)]
    unsafe fn raw(&self, i: isize, j: isize) -> T {
        *self.ptr.offset(i * self.rs + j * self.cs)
    }

    /// Copy the logical matrix into a column-major `Vec`.
    pub fn to_dense_col_major(&self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.rows * self.cols);
        for j in 0..self.cols {
            for i in 0..self.rows {
                out.push(self.get(i, j));
            }
        }
        out
    }
}

// ============================================================================
// MatrixMut
// ============================================================================

/// Mutable strided matrix view.
///
/// A structured `MatrixMut` (Hermitian or symmetric) marks which triangle of
/// the output is referenced; elements outside it are never written.
pub struct MatrixMut<'a, T> {
    ptr: *mut T,
    rows: usize,
    cols: usize,
    rs: isize,
    cs: isize,
    structure: Structure,
    uplo: Uplo,
    diag_off: isize,
    _marker: PhantomData<&'a mut [T]>,
}

// Shared references only read; concurrent writes go through `alias`.
unsafe impl<T: Send> Send for MatrixMut<'_, T> {}
unsafe impl<T: Send + Sync> Sync for MatrixMut<'_, T> {}

impl<T> std::fmt::Debug for MatrixMut<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatrixMut")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .field("rs", &self.rs)
            .field("cs", &self.cs)
            .field("structure", &self.structure)
            .field("uplo", &self.uplo)
            .field("diag_off", &self.diag_off)
            .finish()
    }
}

impl<'a, T: Scalar> MatrixMut<'a, T> {
    pub fn from_slice(
        data: &'a mut [T],
        rows: usize,
        cols: usize,
        rs: isize,
        cs: isize,
    ) -> Result<Self> {
        Self::from_slice_offset(data, rows, cols, rs, cs, 0)
    }

    pub fn from_slice_offset(
        data: &'a mut [T],
        rows: usize,
        cols: usize,
        rs: isize,
        cs: isize,
        offset: usize,
    ) -> Result<Self> {
        validate_bounds(data.len(), rows, cols, rs, cs, offset)?;
        validate_disjoint(rows, cols, rs, cs)?;
        let ptr = if rows == 0 || cols == 0 {
            data.as_mut_ptr()
        } else {
            unsafe { data.as_mut_ptr().add(offset) }
        };
        Ok(unsafe { Self::from_raw_parts(ptr, rows, cols, rs, cs) })
    }

    pub fn col_major(data: &'a mut [T], rows: usize, cols: usize) -> Result<Self> {
        Self::from_slice(data, rows, cols, 1, rows.max(1) as isize)
    }

    pub fn row_major(data: &'a mut [T], rows: usize, cols: usize) -> Result<Self> {
        Self::from_slice(data, rows, cols, cols.max(1) as isize, 1)
    }

    /// Create a view over raw memory.
    ///
    /// # Safety
    /// Every `ptr + i*rs + j*cs` for `i < rows`, `j < cols` must be writable
    /// for `'a`, distinct, and not aliased elsewhere.
    pub unsafe fn from_raw_parts(ptr: *mut T, rows: usize, cols: usize, rs: isize, cs: isize) -> Self {
        Self {
            ptr,
            rows,
            cols,
            rs,
            cs,
            structure: Structure::General,
            uplo: Uplo::Lower,
            diag_off: 0,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn rs(&self) -> isize {
        self.rs
    }

    #[inline]
    pub fn cs(&self) -> isize {
        self.cs
    }

    #[inline]
    pub fn structure(&self) -> Structure {
        self.structure
    }

    #[inline]
    pub fn uplo(&self) -> Uplo {
        self.uplo
    }

    #[inline]
    pub fn diag_off(&self) -> isize {
        self.diag_off
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    #[inline]
    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.ptr as *const T
    }

    #[inline]
    pub fn as_mut_ptr(&self) -> *mut T {
        self.ptr
    }

    /// Restrict writes to the `uplo` triangle of a Hermitian result.
    pub fn hermitian(self, uplo: Uplo) -> Result<Self> {
        self.structured(Structure::Hermitian, uplo)
    }

    /// Restrict writes to the `uplo` triangle of a symmetric result.
    pub fn symmetric(self, uplo: Uplo) -> Result<Self> {
        self.structured(Structure::Symmetric, uplo)
    }

    fn structured(mut self, structure: Structure, uplo: Uplo) -> Result<Self> {
        if !self.is_square() {
            return Err(BlisError::NonSquare {
                rows: self.rows,
                cols: self.cols,
            });
        }
        self.structure = structure;
        self.uplo = uplo;
        self.diag_off = 0;
        Ok(self)
    }

    /// Read-only reborrow carrying the same structure.
    pub fn as_ref(&self) -> MatrixRef<'_, T> {
        let mut v = unsafe {
            MatrixRef::from_raw_parts(self.ptr as *const T, self.rows, self.cols, self.rs, self.cs)
        };
        v.structure = self.structure;
        v.uplo = self.uplo;
        v.diag_off = self.diag_off;
        v
    }

    /// Mutable reborrow.
    pub fn reborrow(&mut self) -> MatrixMut<'_, T> {
        MatrixMut {
            ptr: self.ptr,
            _marker: PhantomData,
            ..*self
        }
    }

    /// Transposed mutable reborrow.
    pub fn t(&mut self) -> MatrixMut<'_, T> {
        MatrixMut {
            ptr: self.ptr,
            rows: self.cols,
            cols: self.rows,
            rs: self.cs,
            cs: self.rs,
            structure: self.structure,
            uplo: self.uplo.flip(),
            diag_off: -self.diag_off,
            _marker: PhantomData,
        }
    }

    /// Checked mutable sub-view.
    pub fn submatrix(&mut self, rows: Range<usize>, cols: Range<usize>) -> Result<MatrixMut<'_, T>> {
        check_range(&rows, self.rows)?;
        check_range(&cols, self.cols)?;
        Ok(unsafe { self.alias() }.into_part(rows.start, rows.len(), cols.start, cols.len()))
    }

    /// Sub-view of `m x n` elements at `(i0, j0)`, consuming the handle.
    #[inline]
    pub(crate) fn into_part(self, i0: usize, m: usize, j0: usize, n: usize) -> Self {
        debug_assert!(i0 + m <= self.rows && j0 + n <= self.cols);
        let ptr = if m == 0 || n == 0 {
            self.ptr
        } else {
            self.ptr
                .wrapping_offset(i0 as isize * self.rs + j0 as isize * self.cs)
        };
        Self {
            ptr,
            rows: m,
            cols: n,
            diag_off: self.diag_off + i0 as isize - j0 as isize,
            ..self
        }
    }

    /// Second handle to the same memory.
    ///
    /// # Safety
    /// The caller must ensure that the handles never write (or write and
    /// read) the same element concurrently. The driver hands aliases to gang
    /// members whose sub-ranges are disjoint.
    #[inline]
    pub(crate) unsafe fn alias(&self) -> MatrixMut<'a, T> {
        MatrixMut {
            ptr: self.ptr,
            _marker: PhantomData,
            ..*self
        }
    }

    #[inline]
    pub fn is_stored(&self, i: usize, j: usize) -> bool {
        stored(self.structure, self.uplo, self.diag_off, i as isize, j as isize)
    }

    #[inline]
    pub fn is_diag(&self, i: usize, j: usize) -> bool {
        j as isize - i as isize == self.diag_off
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> T {
        assert!(i < self.rows && j < self.cols, "index ({i}, {j}) out of bounds");
        unsafe { *self.ptr.offset(i as isize * self.rs + j as isize * self.cs) }
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, v: T) {
        assert!(i < self.rows && j < self.cols, "index ({i}, {j}) out of bounds");
        unsafe { *self.ptr.offset(i as isize * self.rs + j as isize * self.cs) = v }
    }

    /// Pointer to element `(i, j)`; `(i, j)` must lie inside the view.
    #[inline]
    pub(crate) fn ptr_at(&self, i: usize, j: usize) -> *mut T {
        self.ptr
            .wrapping_offset(i as isize * self.rs + j as isize * self.cs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;

    #[test]
    fn test_from_slice_bounds() {
        let data = vec![0.0f64; 6];
        assert!(MatrixRef::from_slice(&data, 2, 3, 3, 1).is_ok());
        assert!(matches!(
            MatrixRef::from_slice(&data, 3, 3, 3, 1),
            Err(BlisError::OffsetOverflow)
        ));
        // Negative row stride starting from the last row.
        let v = MatrixRef::from_slice_offset(&data, 2, 3, -3, 1, 3).unwrap();
        assert_eq!(v.rows(), 2);
        assert!(MatrixRef::from_slice(&data, 2, 3, -3, 1).is_err());
    }

    #[test]
    fn test_empty_view_needs_no_memory() {
        let data: Vec<f64> = vec![];
        let v = MatrixRef::from_slice(&data, 0, 5, 1, 1).unwrap();
        assert!(v.is_empty());
    }

    #[test]
    fn test_zero_stride_output_rejected() {
        let mut data = vec![0.0f64; 4];
        assert!(MatrixMut::from_slice(&mut data, 2, 2, 0, 1).is_err());
    }

    #[test]
    fn test_overlapping_output_rejected() {
        let mut data = vec![0.0f64; 12];
        assert!(matches!(
            MatrixMut::from_slice(&mut data, 2, 2, 1, 1),
            Err(BlisError::InvalidStructure(_))
        ));
        // column stride shorter than the column
        assert!(MatrixMut::from_slice(&mut data, 3, 3, 1, 2).is_err());
        assert!(MatrixMut::from_slice(&mut data, 3, 3, 2, 1).is_err());
        assert!(MatrixMut::from_slice_offset(&mut data, 2, 3, -2, 1, 2).is_err());
        assert!(MatrixMut::from_slice(&mut data, 3, 1, 0, 1).is_err());

        assert!(MatrixMut::col_major(&mut data, 3, 4).is_ok());
        assert!(MatrixMut::row_major(&mut data, 3, 4).is_ok());
        // padded leading dimension and negative strides
        assert!(MatrixMut::from_slice(&mut data, 2, 3, 1, 4).is_ok());
        assert!(MatrixMut::from_slice_offset(&mut data, 2, 3, -3, 1, 3).is_ok());
        // a single row or column may use any nonzero stride
        assert!(MatrixMut::from_slice(&mut data, 1, 4, 7, 3).is_ok());
    }

    #[test]
    fn test_transpose_and_submatrix() {
        let data: Vec<f64> = (0..12).map(|x| x as f64).collect();
        let a = MatrixRef::row_major(&data, 3, 4).unwrap();
        assert_eq!(a.get(1, 2), 6.0);
        let at = a.t();
        assert_eq!(at.rows(), 4);
        assert_eq!(at.get(2, 1), 6.0);
        let s = a.submatrix(1..3, 1..4).unwrap();
        assert_eq!(s.get(0, 0), 5.0);
        assert_eq!(s.get(1, 2), 11.0);
        assert!(a.submatrix(2..4, 0..1).is_err());
    }

    #[test]
    fn test_hermitian_mirror_read() {
        // Lower-stored 2x2 Hermitian, upper garbage.
        let data = vec![
            Complex64::new(1.0, 5.0),
            Complex64::new(2.0, 3.0),
            Complex64::new(99.0, 99.0),
            Complex64::new(4.0, 0.0),
        ];
        // col-major: (0,0)=data[0], (1,0)=data[1], (0,1)=data[2]
        let a = MatrixRef::col_major(&data, 2, 2)
            .unwrap()
            .hermitian(Uplo::Lower)
            .unwrap();
        assert_eq!(a.get(0, 1), Complex64::new(2.0, -3.0));
        assert_eq!(a.get(1, 0), Complex64::new(2.0, 3.0));
        // diagonal imaginary part is dropped
        assert_eq!(a.get(0, 0), Complex64::new(1.0, 0.0));
        // transposition keeps the logical matrix consistent
        let at = a.t();
        assert_eq!(at.uplo(), Uplo::Upper);
        assert_eq!(at.get(1, 0), Complex64::new(2.0, -3.0));
        assert_eq!(a.h().get(1, 0), Complex64::new(2.0, 3.0));
    }

    #[test]
    fn test_sub_view_keeps_diagonal() {
        let data: Vec<f64> = (1..=16).map(|x| x as f64).collect();
        let a = MatrixRef::col_major(&data, 4, 4)
            .unwrap()
            .symmetric(Uplo::Upper)
            .unwrap();
        // Lower-left block: entirely mirrored.
        let s = a.submatrix(2..4, 0..2).unwrap();
        assert_eq!(s.diag_off(), 2);
        assert!(!s.is_stored(0, 0));
        // (2,0) of the root mirrors (0,2) = data[8]
        assert_eq!(s.get(0, 0), 9.0);
        assert_eq!(s.get(1, 1), a.get(3, 1));
    }

    #[test]
    fn test_triangular_reads() {
        let data = vec![7.0f64; 9];
        let a = MatrixRef::col_major(&data, 3, 3)
            .unwrap()
            .triangular(Uplo::Upper, Diag::Unit);
        assert_eq!(a.get(0, 0), 1.0);
        assert_eq!(a.get(0, 2), 7.0);
        assert_eq!(a.get(2, 0), 0.0);
    }

    #[test]
    fn test_structured_requires_square() {
        let data = vec![0.0f64; 6];
        assert!(matches!(
            MatrixRef::col_major(&data, 2, 3).unwrap().hermitian(Uplo::Lower),
            Err(BlisError::NonSquare { rows: 2, cols: 3 })
        ));
    }

    #[test]
    fn test_matrix_mut_transpose_and_set() {
        let mut data = vec![0.0f64; 6];
        {
            let mut c = MatrixMut::row_major(&mut data, 2, 3).unwrap();
            c.set(0, 2, 5.0);
            let mut ct = c.t();
            ct.set(1, 1, 3.0);
            assert_eq!(ct.get(2, 0), 5.0);
        }
        assert_eq!(data, vec![0.0, 0.0, 5.0, 0.0, 3.0, 0.0]);
    }

    #[test]
    fn test_conj_flag_applies_on_read() {
        let data = vec![Complex64::new(1.0, 2.0)];
        let a = MatrixRef::col_major(&data, 1, 1).unwrap();
        assert_eq!(a.conj().get(0, 0), Complex64::new(1.0, -2.0));
        assert_eq!(a.conj().conj().get(0, 0), Complex64::new(1.0, 2.0));
    }
}
