//! Packing engine.
//!
//! Copies a (sub-)operand into a contiguous buffer laid out the way the
//! micro-kernels read it. Extents are padded up to the pack node's multiples
//! and the padding is zero, so kernels always see full `MR x k` and `k x NR`
//! micro-panels. While copying, the engine can scale by alpha, materialize
//! the unstored part of a structured operand and replace diagonal entries by
//! their reciprocals.

use num_traits::One;
use strided_blis_traits::Scalar;

use crate::blksz::round_up;
use crate::cntl::{PackNode, PackSchema};
use crate::view::{MatrixRef, Structure};
use crate::{BlisError, Result};

/// Runtime packing parameters, derived from a [`PackNode`] for one operand.
#[derive(Debug, Clone, Copy)]
pub struct PackParams<T> {
    pub schema: PackSchema,
    pub mult_m: usize,
    pub mult_n: usize,
    pub scale: Option<T>,
    pub densify: bool,
    pub invert_diag: bool,
    pub reverse: bool,
}

impl<T: Scalar> PackParams<T> {
    /// Parameters for packing `src` under `node`. `alpha` is applied only if
    /// the node scales and `alpha != 1`.
    pub fn from_node(node: &PackNode, src: &MatrixRef<'_, T>, alpha: T) -> Self {
        let dt = T::DATATYPE;
        let flags = node.flags();
        let reverse = src.structure() != Structure::General && node.reverse_for(src.uplo());
        Self {
            schema: node.schema(),
            mult_m: node.mult_m().get(dt),
            mult_n: node.mult_n().get(dt),
            scale: (flags.scale && !alpha.is_one()).then_some(alpha),
            densify: flags.densify,
            invert_diag: flags.invert_diag,
            reverse,
        }
    }
}

/// A packed copy of an `m x n` operand.
#[derive(Debug, Clone)]
pub struct PackedMatrix<T> {
    buf: Vec<T>,
    schema: PackSchema,
    m: usize,
    n: usize,
    m_pad: usize,
    n_pad: usize,
    panel_dim: usize,
    panel_len: usize,
    n_panels: usize,
    reverse: bool,
}

impl<T: Scalar> PackedMatrix<T> {
    fn alloc(m: usize, n: usize, p: &PackParams<T>) -> Self {
        let m_pad = round_up(m, p.mult_m);
        let n_pad = round_up(n, p.mult_n);
        let (panel_dim, panel_len, n_panels) = match p.schema {
            PackSchema::RowPanels => (p.mult_m, n_pad, m_pad / p.mult_m),
            PackSchema::ColPanels => (p.mult_n, m_pad, n_pad / p.mult_n),
            PackSchema::Rows => (m_pad, n_pad, 1),
            PackSchema::Cols => (n_pad, m_pad, 1),
        };
        Self {
            buf: vec![T::zero(); m_pad * n_pad],
            schema: p.schema,
            m,
            n,
            m_pad,
            n_pad,
            panel_dim,
            panel_len,
            n_panels,
            reverse: p.reverse,
        }
    }

    #[inline]
    pub fn schema(&self) -> PackSchema {
        self.schema
    }

    /// Logical (unpadded) extents.
    #[inline]
    pub fn dims(&self) -> (usize, usize) {
        (self.m, self.n)
    }

    /// Padded extents.
    #[inline]
    pub fn padded_dims(&self) -> (usize, usize) {
        (self.m_pad, self.n_pad)
    }

    /// Width of one strip (MR for row panels, NR for column panels).
    #[inline]
    pub fn panel_dim(&self) -> usize {
        self.panel_dim
    }

    /// Length of one strip along the other dimension.
    #[inline]
    pub fn panel_len(&self) -> usize {
        self.panel_len
    }

    #[inline]
    pub fn n_panels(&self) -> usize {
        self.n_panels
    }

    /// Physical slot of logical strip `s`.
    #[inline]
    fn slot(&self, s: usize) -> usize {
        if self.reverse {
            self.n_panels - 1 - s
        } else {
            s
        }
    }

    /// Logical strip indices in the order the strips were laid out.
    pub fn strip_order(&self) -> impl DoubleEndedIterator<Item = usize> + Clone {
        let (n, rev) = (self.n_panels, self.reverse);
        (0..n).map(move |s| if rev { n - 1 - s } else { s })
    }

    #[inline]
    fn index(&self, i: usize, j: usize) -> usize {
        match self.schema {
            PackSchema::RowPanels => {
                let mr = self.panel_dim;
                self.slot(i / mr) * mr * self.n_pad + j * mr + i % mr
            }
            PackSchema::ColPanels => {
                let nr = self.panel_dim;
                self.slot(j / nr) * nr * self.m_pad + i * nr + j % nr
            }
            PackSchema::Rows => i * self.n_pad + j,
            PackSchema::Cols => i + j * self.m_pad,
        }
    }

    /// Element `(i, j)` of the packed operand; padding reads as stored.
    pub fn get(&self, i: usize, j: usize) -> T {
        assert!(i < self.m_pad && j < self.n_pad, "index ({i}, {j}) out of bounds");
        self.buf[self.index(i, j)]
    }

    /// Logical strip `s` as a slice.
    pub fn panel(&self, s: usize) -> &[T] {
        let len = self.panel_dim * self.panel_len;
        let start = self.slot(s) * len;
        &self.buf[start..start + len]
    }

    #[inline]
    pub(crate) fn panel_ptr(&self, s: usize) -> *const T {
        self.buf
            .as_ptr()
            .wrapping_add(self.slot(s) * self.panel_dim * self.panel_len)
    }

    #[inline]
    pub(crate) fn panel_mut_ptr(&mut self, s: usize) -> *mut T {
        let off = self.slot(s) * self.panel_dim * self.panel_len;
        self.buf.as_mut_ptr().wrapping_add(off)
    }

    pub fn as_slice(&self) -> &[T] {
        &self.buf
    }
}

/// Pack `src` according to `params`.
///
/// Plain schemas (`Rows`, `Cols`) do not densify, so they reject structured
/// sources.
pub fn pack<T: Scalar>(src: &MatrixRef<'_, T>, params: &PackParams<T>) -> Result<PackedMatrix<T>> {
    if params.mult_m == 0 || params.mult_n == 0 {
        return Err(BlisError::InvalidConfig("pack multiples must be positive".into()));
    }
    if !params.schema.is_panel() && src.structure() != Structure::General {
        return Err(BlisError::InvalidStructure(format!(
            "{:?} packing cannot densify a {:?} operand",
            params.schema,
            src.structure()
        )));
    }
    Ok(pack_unchecked(src, params))
}

/// [`pack`] for parameters already validated through the control tree.
pub(crate) fn pack_unchecked<T: Scalar>(
    src: &MatrixRef<'_, T>,
    params: &PackParams<T>,
) -> PackedMatrix<T> {
    let (m, n) = (src.rows(), src.cols());
    let mut out = PackedMatrix::alloc(m, n, params);
    let densify = params.densify && src.structure() != Structure::General;

    for j in 0..n {
        for i in 0..m {
            let mut v = if densify {
                src.get(i, j)
            } else {
                src.get_stored(i, j)
            };
            if params.invert_diag && src.is_diag(i, j) {
                v = v.recip();
            }
            if let Some(alpha) = params.scale {
                v = alpha * v;
            }
            let idx = out.index(i, j);
            out.buf[idx] = v;
        }
    }

    // Identity on the padded part of the diagonal, so that inverted pad
    // rows solve to zero instead of dividing by it.
    if params.invert_diag {
        for j in 0..out.n_pad {
            let i = j as isize - src.diag_off();
            if i >= 0 && (i as usize) < out.m_pad && ((i as usize) >= m || j >= n) {
                let idx = out.index(i as usize, j);
                out.buf[idx] = T::one();
            }
        }
    }

    tracing::trace!(
        schema = ?params.schema,
        m,
        n,
        m_pad = out.m_pad,
        n_pad = out.n_pad,
        reverse = params.reverse,
        densify,
        "packed operand"
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::{Diag, Uplo};
    use num_complex::Complex64;

    fn params(schema: PackSchema, mult_m: usize, mult_n: usize) -> PackParams<f64> {
        PackParams {
            schema,
            mult_m,
            mult_n,
            scale: None,
            densify: false,
            invert_diag: false,
            reverse: false,
        }
    }

    #[test]
    fn test_row_panels_layout_and_padding() {
        let data: Vec<f64> = (0..15).map(|x| x as f64 + 1.0).collect();
        let a = MatrixRef::row_major(&data, 5, 3).unwrap();
        let p = pack(&a, &params(PackSchema::RowPanels, 4, 1)).unwrap();
        assert_eq!(p.padded_dims(), (8, 3));
        assert_eq!(p.n_panels(), 2);
        // First strip, column 0 holds rows 0..4.
        assert_eq!(&p.panel(0)[..4], &[1.0, 4.0, 7.0, 10.0]);
        // Second strip: row 4 then three rows of padding.
        assert_eq!(&p.panel(1)[..4], &[13.0, 0.0, 0.0, 0.0]);
        for i in 0..5 {
            for j in 0..3 {
                assert_eq!(p.get(i, j), a.get(i, j));
            }
        }
        for i in 5..8 {
            for j in 0..3 {
                assert_eq!(p.get(i, j), 0.0);
            }
        }
    }

    #[test]
    fn test_col_panels_layout() {
        let data: Vec<f64> = (0..6).map(|x| x as f64).collect();
        let b = MatrixRef::col_major(&data, 2, 3).unwrap();
        let p = pack(&b, &params(PackSchema::ColPanels, 1, 2)).unwrap();
        assert_eq!(p.padded_dims(), (2, 4));
        // Strip 0 holds columns 0..2 row by row.
        assert_eq!(p.panel(0), &[0.0, 2.0, 1.0, 3.0]);
        assert_eq!(p.panel(1), &[4.0, 0.0, 5.0, 0.0]);
    }

    #[test]
    fn test_plain_schemas() {
        let data: Vec<f64> = (0..6).map(|x| x as f64).collect();
        let a = MatrixRef::col_major(&data, 2, 3).unwrap();
        let rows = pack(&a, &params(PackSchema::Rows, 1, 1)).unwrap();
        assert_eq!(rows.as_slice(), &[0.0, 2.0, 4.0, 1.0, 3.0, 5.0]);
        let cols = pack(&a, &params(PackSchema::Cols, 1, 1)).unwrap();
        assert_eq!(cols.as_slice(), data.as_slice());
    }

    #[test]
    fn test_plain_schema_rejects_structure() {
        let data = vec![1.0f64; 4];
        let a = MatrixRef::col_major(&data, 2, 2)
            .unwrap()
            .symmetric(Uplo::Lower)
            .unwrap();
        assert!(matches!(
            pack(&a, &params(PackSchema::Cols, 1, 1)),
            Err(BlisError::InvalidStructure(_))
        ));
    }

    #[test]
    fn test_densify_upper_symmetric() {
        // Upper triangle holds 1..6 row by row; lower triangle is garbage.
        let data = vec![1.0, 2.0, 3.0, -9.0, 4.0, 5.0, -9.0, -9.0, 6.0];
        let a = MatrixRef::row_major(&data, 3, 3)
            .unwrap()
            .symmetric(Uplo::Upper)
            .unwrap();
        let mut pp = params(PackSchema::RowPanels, 4, 1);
        pp.densify = true;
        let p = pack(&a, &pp).unwrap();
        let expected = [[1.0, 2.0, 3.0], [2.0, 4.0, 5.0], [3.0, 5.0, 6.0]];
        for (i, row) in expected.iter().enumerate() {
            for (j, &v) in row.iter().enumerate() {
                assert_eq!(p.get(i, j), v);
            }
        }
    }

    #[test]
    fn test_densify_hermitian_conjugates_mirror() {
        let z = |re, im| Complex64::new(re, im);
        let data = vec![z(1.0, 0.0), z(2.0, 1.0), z(0.0, 0.0), z(3.0, 0.0)];
        let a = MatrixRef::row_major(&data, 2, 2)
            .unwrap()
            .hermitian(Uplo::Upper)
            .unwrap();
        let pp = PackParams {
            schema: PackSchema::ColPanels,
            mult_m: 1,
            mult_n: 2,
            scale: Some(z(2.0, 0.0)),
            densify: true,
            invert_diag: false,
            reverse: false,
        };
        let p = pack(&a, &pp).unwrap();
        assert_eq!(p.get(0, 1), z(4.0, 2.0));
        assert_eq!(p.get(1, 0), z(4.0, -2.0));
        assert_eq!(p.get(1, 1), z(6.0, 0.0));
    }

    #[test]
    fn test_triangular_invert_and_pad_identity() {
        let data = vec![2.0, 0.0, 0.0, 3.0, 4.0, 0.0, 5.0, 6.0, 8.0];
        let a = MatrixRef::row_major(&data, 3, 3)
            .unwrap()
            .triangular(Uplo::Lower, Diag::NonUnit);
        let mut pp = params(PackSchema::RowPanels, 4, 4);
        pp.densify = true;
        pp.invert_diag = true;
        let p = pack(&a, &pp).unwrap();
        assert_eq!(p.get(0, 0), 0.5);
        assert_eq!(p.get(1, 1), 0.25);
        assert_eq!(p.get(2, 2), 0.125);
        assert_eq!(p.get(2, 0), 5.0);
        assert_eq!(p.get(0, 2), 0.0);
        // padded diagonal is identity, the rest of the pad stays zero
        assert_eq!(p.get(3, 3), 1.0);
        assert_eq!(p.get(3, 0), 0.0);
    }

    #[test]
    fn test_unit_diagonal_densifies_to_one() {
        let data = vec![9.0, 1.0, 9.0, 9.0];
        let a = MatrixRef::col_major(&data, 2, 2)
            .unwrap()
            .triangular(Uplo::Lower, Diag::Unit);
        let mut pp = params(PackSchema::RowPanels, 2, 1);
        pp.densify = true;
        let p = pack(&a, &pp).unwrap();
        assert_eq!(p.get(0, 0), 1.0);
        assert_eq!(p.get(1, 0), 1.0);
        assert_eq!(p.get(0, 1), 0.0);
        assert_eq!(p.get(1, 1), 1.0);
    }

    #[test]
    fn test_reverse_layout() {
        let data: Vec<f64> = (0..4).map(|x| x as f64).collect();
        let a = MatrixRef::col_major(&data, 4, 1).unwrap();
        let mut pp = params(PackSchema::RowPanels, 2, 1);
        pp.reverse = true;
        let p = pack(&a, &pp).unwrap();
        // The last strip is stored first.
        assert_eq!(p.as_slice(), &[2.0, 3.0, 0.0, 1.0]);
        assert_eq!(p.panel(0), &[0.0, 1.0]);
        assert_eq!(p.strip_order().collect::<Vec<_>>(), vec![1, 0]);
        assert_eq!(p.get(3, 0), 3.0);
    }
}
