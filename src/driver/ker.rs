//! Macro-kernel: NR x MR tile loops over packed A and B.

use strided_blis_traits::{AuxInfo, Kernels, Scalar, MAX_REGISTER_BLOCK};

use super::PackGang;
use crate::packm::PackedMatrix;
use crate::view::{MatrixMut, Structure, Uplo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tile {
    /// No element is referenced.
    Skip,
    /// Every element is referenced.
    Full,
    /// The tile crosses the diagonal of a structured C.
    Diagonal,
}

/// Classify an `m x n` tile whose top-left element has diagonal offset `d`.
fn classify(uplo: Uplo, d: isize, m: usize, n: usize) -> Tile {
    let lowest = -(m as isize - 1);
    let highest = n as isize - 1;
    match uplo {
        Uplo::Lower if lowest > d => Tile::Skip,
        Uplo::Lower if highest <= d => Tile::Full,
        Uplo::Upper if highest < d => Tile::Skip,
        Uplo::Upper if lowest >= d => Tile::Full,
        _ => Tile::Diagonal,
    }
}

/// `C := ct + beta * C` for an `m x n` tile; `ct` is column-major with
/// leading dimension `ld`.
///
/// # Safety
/// Every `c + i*rs_c + j*cs_c` with `i < m`, `j < n` must be writable.
#[allow(clippy::too_many_arguments)]
unsafe fn adds_mxn<T: Scalar>(m: usize, n: usize, ct: &[T], ld: usize, beta: T, c: *mut T, rs_c: isize, cs_c: isize) {
    let beta_zero = beta.is_zero();
    for j in 0..n {
        for i in 0..m {
            let cij = c.offset(i as isize * rs_c + j as isize * cs_c);
            let v = ct[i + j * ld];
            *cij = if beta_zero { v } else { v + beta * *cij };
        }
    }
}

/// [`adds_mxn`] restricted to the `uplo` triangle of diagonal offset `d`.
///
/// # Safety
/// See [`adds_mxn`]; only referenced elements are touched.
#[allow(clippy::too_many_arguments)]
unsafe fn adds_mxn_uplo<T: Scalar>(
    uplo: Uplo,
    d: isize,
    m: usize,
    n: usize,
    ct: &[T],
    ld: usize,
    beta: T,
    c: *mut T,
    rs_c: isize,
    cs_c: isize,
) {
    let beta_zero = beta.is_zero();
    for j in 0..n {
        for i in 0..m {
            let off = j as isize - i as isize;
            let stored = match uplo {
                Uplo::Lower => off <= d,
                Uplo::Upper => off >= d,
            };
            if !stored {
                continue;
            }
            let cij = c.offset(i as isize * rs_c + j as isize * cs_c);
            let v = ct[i + j * ld];
            *cij = if beta_zero { v } else { v + beta * *cij };
        }
    }
}

/// Run the micro-kernel over every tile of this thread's share of C.
///
/// Columns are split across the jr gang, rows across the ir gang below it.
/// Full tiles of a general C are computed in place; edge tiles and tiles on
/// the diagonal of a structured C are computed into a scratch tile first, so
/// every element sees the same arithmetic on both paths.
pub(super) fn ker_var2<T: Scalar>(
    alpha: T,
    a: &PackedMatrix<T>,
    b: &PackedMatrix<T>,
    beta: T,
    c: &MatrixMut<'_, T>,
    gang: &PackGang<T>,
    kernels: &Kernels<T>,
) {
    let (mr, nr) = (a.panel_dim(), b.panel_dim());
    let k = a.padded_dims().1;
    debug_assert_eq!(k, b.padded_dims().0);
    let (m, n) = (c.rows(), c.cols());
    let (rs_c, cs_c) = (c.rs(), c.cs());
    let structured = c.structure() != Structure::General;

    let cols = gang.get_range(0, n, nr);
    let rows = gang.sub().get_range(0, m, mr);
    if cols.is_empty() || rows.is_empty() {
        return;
    }
    let (jb0, jb1) = (cols.start / nr, cols.end.div_ceil(nr));
    let (ib0, ib1) = (rows.start / mr, rows.end.div_ceil(mr));

    let ukr = &kernels.gemm;
    let mut ct = [T::zero(); MAX_REGISTER_BLOCK * MAX_REGISTER_BLOCK];

    for jb in jb0..jb1 {
        let j0 = jb * nr;
        let n_cur = nr.min(n - j0);
        let bp = b.panel_ptr(jb);

        for ib in ib0..ib1 {
            let i0 = ib * mr;
            let m_cur = mr.min(m - i0);
            let ap = a.panel_ptr(ib);

            let (next_ib, next_jb) = if ib + 1 < ib1 {
                (ib + 1, jb)
            } else if jb + 1 < jb1 {
                (ib0, jb + 1)
            } else {
                (ib0, jb0)
            };
            let aux = AuxInfo {
                next_a: a.panel_ptr(next_ib),
                next_b: b.panel_ptr(next_jb),
            };

            let d = c.diag_off() + i0 as isize - j0 as isize;
            let tile = if structured {
                classify(c.uplo(), d, m_cur, n_cur)
            } else {
                Tile::Full
            };
            let cp = c.ptr_at(i0, j0);

            // SAFETY: the packed panels span k * MR and k * NR elements; the
            // tile at (i0, j0) lies inside C and belongs to this thread alone.
            unsafe {
                match tile {
                    Tile::Skip => {}
                    Tile::Full if m_cur == mr && n_cur == nr => {
                        ukr.gemm(mr, nr, k, alpha, ap, bp, beta, cp, rs_c, cs_c, &aux);
                    }
                    Tile::Full => {
                        ukr.gemm(mr, nr, k, alpha, ap, bp, T::zero(), ct.as_mut_ptr(), 1, mr as isize, &aux);
                        adds_mxn(m_cur, n_cur, &ct, mr, beta, cp, rs_c, cs_c);
                    }
                    Tile::Diagonal => {
                        ukr.gemm(mr, nr, k, alpha, ap, bp, T::zero(), ct.as_mut_ptr(), 1, mr as isize, &aux);
                        adds_mxn_uplo(c.uplo(), d, m_cur, n_cur, &ct, mr, beta, cp, rs_c, cs_c);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_lower() {
        // 4x4 tile on the diagonal
        assert_eq!(classify(Uplo::Lower, 0, 4, 4), Tile::Diagonal);
        // tile fully below: top-left element is 4 rows under the diagonal
        assert_eq!(classify(Uplo::Lower, 4, 4, 4), Tile::Full);
        assert_eq!(classify(Uplo::Lower, 3, 4, 4), Tile::Full);
        // tile fully above
        assert_eq!(classify(Uplo::Lower, -4, 4, 4), Tile::Skip);
        assert_eq!(classify(Uplo::Lower, -3, 4, 4), Tile::Diagonal);
    }

    #[test]
    fn test_classify_upper() {
        assert_eq!(classify(Uplo::Upper, 0, 4, 4), Tile::Diagonal);
        assert_eq!(classify(Uplo::Upper, -3, 4, 4), Tile::Full);
        assert_eq!(classify(Uplo::Upper, 4, 4, 4), Tile::Skip);
        assert_eq!(classify(Uplo::Upper, 3, 4, 4), Tile::Diagonal);
        // a 1x1 tile is either on or off
        assert_eq!(classify(Uplo::Upper, 0, 1, 1), Tile::Full);
        assert_eq!(classify(Uplo::Upper, 1, 1, 1), Tile::Skip);
    }

    #[test]
    fn test_adds_uplo_writes_stored_only() {
        let ct = [1.0f64, 2.0, 3.0, 4.0];
        let mut c = [10.0f64; 4];
        unsafe {
            adds_mxn_uplo(Uplo::Lower, 0, 2, 2, &ct, 2, 0.5, c.as_mut_ptr(), 1, 2);
        }
        // (0,1) lies above the diagonal
        assert_eq!(c, [6.0, 7.0, 10.0, 9.0]);
    }
}
