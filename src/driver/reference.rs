//! Reference leaves: naive loops over the logical operands.
//!
//! Columns of C (or B) are split among every thread that reaches the leaf.

use strided_blis_traits::Scalar;

use super::{c_part, PackGang};
use crate::view::{MatrixMut, MatrixRef, Uplo};

pub(super) fn ref_var1<T: Scalar>(
    alpha: T,
    a: &MatrixRef<'_, T>,
    b: &MatrixRef<'_, T>,
    beta: T,
    c: &MatrixMut<'_, T>,
    gang: &PackGang<T>,
) {
    let (m, n) = (c.rows(), c.cols());
    let k = a.cols();
    let cols = gang.get_range_ocomm(0, n, 1);
    let mut c1 = c_part(c, 0, m, cols.start, cols.len());
    let beta_zero = beta.is_zero();

    for (jj, j) in cols.enumerate() {
        for i in 0..m {
            if !c1.is_stored(i, jj) {
                continue;
            }
            let mut acc = T::zero();
            for p in 0..k {
                acc = acc + a.get(i, p) * b.get(p, j);
            }
            let v = alpha * acc;
            let v = if beta_zero { v } else { v + beta * c1.get(i, jj) };
            c1.set(i, jj, v);
        }
    }
}

/// Forward (lower) or backward (upper) substitution, one column at a time.
pub(super) fn trsm_ref<T: Scalar>(alpha: T, a: &MatrixRef<'_, T>, b: &MatrixMut<'_, T>, gang: &PackGang<T>) {
    let m = b.rows();
    let cols = gang.get_range_ocomm(0, b.cols(), 1);
    let mut b1 = c_part(b, 0, m, cols.start, cols.len());
    let mut x = vec![T::zero(); m];

    for j in 0..b1.cols() {
        for (i, xi) in x.iter_mut().enumerate() {
            *xi = alpha * b1.get(i, j);
        }
        let order: Box<dyn Iterator<Item = usize>> = match a.uplo() {
            Uplo::Lower => Box::new(0..m),
            Uplo::Upper => Box::new((0..m).rev()),
        };
        for i in order {
            let solved = match a.uplo() {
                Uplo::Lower => 0..i,
                Uplo::Upper => i + 1..m,
            };
            let mut acc = x[i];
            for l in solved {
                acc = acc - a.get(i, l) * x[l];
            }
            x[i] = acc / a.get(i, i);
        }
        for (i, &xi) in x.iter().enumerate() {
            b1.set(i, j, xi);
        }
    }
}
