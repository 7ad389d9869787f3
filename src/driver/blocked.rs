//! Blocked variants: partition one dimension, pack, recurse.

use strided_blis_traits::{Kernels, Scalar};

use super::{c_part, child, execute, pack_operand, prune_m, prune_n, Operand, PackGang};
use crate::cntl::Node;
use crate::view::MatrixMut;

/// Partition m. Each sub-gang takes a contiguous, MR-aligned share of the
/// rows and walks it in MC blocks, packing A per block when the node asks.
#[allow(clippy::too_many_arguments)]
pub(super) fn blk_var1<T: Scalar>(
    alpha: T,
    a: &Operand<'_, T>,
    b: &Operand<'_, T>,
    beta: T,
    c: &MatrixMut<'_, T>,
    node: &Node,
    gang: &PackGang<T>,
    kernels: &Kernels<T>,
) {
    let dt = T::DATATYPE;
    let (mc, mr) = (node.blksz_for(dt), node.blksz_aux_for(dt));
    let n = c.cols();
    let k = a.dims().1;
    let sub = child(node);

    let (lo, hi) = prune_m(c, mr);
    let range = gang.get_range(lo, hi, mr);
    for i0 in range.clone().step_by(mc) {
        let len = mc.min(range.end - i0);
        let a1 = Operand::View(a.view().part(i0, len, 0, k));
        let (a1, alpha1) = match node.sub_pack_a() {
            Some(p) => pack_operand(p, &a1, alpha, gang),
            None => (a1, alpha),
        };
        let c1 = c_part(c, i0, len, 0, n);
        execute(alpha1, &a1, b, beta, &c1, sub, gang.sub(), kernels);
    }
}

/// Partition n, the dual of [`blk_var1`].
#[allow(clippy::too_many_arguments)]
pub(super) fn blk_var2<T: Scalar>(
    alpha: T,
    a: &Operand<'_, T>,
    b: &Operand<'_, T>,
    beta: T,
    c: &MatrixMut<'_, T>,
    node: &Node,
    gang: &PackGang<T>,
    kernels: &Kernels<T>,
) {
    let dt = T::DATATYPE;
    let (nc, nr) = (node.blksz_for(dt), node.blksz_aux_for(dt));
    let m = c.rows();
    let k = b.dims().0;
    let sub = child(node);

    let (lo, hi) = prune_n(c, nr);
    let range = gang.get_range(lo, hi, nr);
    for j0 in range.clone().step_by(nc) {
        let len = nc.min(range.end - j0);
        let b1 = Operand::View(b.view().part(0, k, j0, len));
        let (b1, alpha1) = match node.sub_pack_b() {
            Some(p) => pack_operand(p, &b1, alpha, gang),
            None => (b1, alpha),
        };
        let c1 = c_part(c, 0, m, j0, len);
        execute(alpha1, a, &b1, beta, &c1, sub, gang.sub(), kernels);
    }
}

/// Partition k. Every step updates the whole of C, so the k loop is never
/// split across threads; beta applies to the first step only.
#[allow(clippy::too_many_arguments)]
pub(super) fn blk_var3<T: Scalar>(
    alpha: T,
    a: &Operand<'_, T>,
    b: &Operand<'_, T>,
    beta: T,
    c: &MatrixMut<'_, T>,
    node: &Node,
    gang: &PackGang<T>,
    kernels: &Kernels<T>,
) {
    let kc = node.blksz_for(T::DATATYPE);
    let (m, n) = (c.rows(), c.cols());
    let k = a.dims().1;
    let sub = child(node);

    for (step, p0) in (0..k).step_by(kc).enumerate() {
        let len = kc.min(k - p0);
        let a1 = Operand::View(a.view().part(0, m, p0, len));
        let b1 = Operand::View(b.view().part(p0, len, 0, n));
        let (a1, alpha1) = match node.sub_pack_a() {
            Some(p) => pack_operand(p, &a1, alpha, gang),
            None => (a1, alpha),
        };
        let (b1, alpha1) = match node.sub_pack_b() {
            Some(p) => pack_operand(p, &b1, alpha1, gang),
            None => (b1, alpha1),
        };
        let beta1 = if step == 0 { beta } else { T::one() };
        execute(alpha1, &a1, &b1, beta1, c, sub, gang.sub(), kernels);
    }
}

/// `C := beta * C` over the referenced part of C. A zero beta overwrites,
/// so NaN in C does not survive.
pub(crate) fn scalm<T: Scalar>(beta: T, c: &MatrixMut<'_, T>) {
    if beta.is_one() || c.is_empty() {
        return;
    }
    let zero = beta.is_zero();
    // SAFETY: the caller owns `c` for the duration of the call.
    let mut c = unsafe { c.alias() };
    for j in 0..c.cols() {
        for i in 0..c.rows() {
            if !c.is_stored(i, j) {
                continue;
            }
            let v = if zero { T::zero() } else { beta * c.get(i, j) };
            c.set(i, j, v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::Uplo;

    #[test]
    fn test_scalm_zero_clears_nan() {
        let mut data = vec![f64::NAN; 4];
        let c = MatrixMut::col_major(&mut data, 2, 2).unwrap();
        scalm(0.0, &c);
        assert_eq!(data, vec![0.0; 4]);
    }

    #[test]
    fn test_scalm_stored_triangle_only() {
        let mut data = vec![2.0f64; 9];
        let c = MatrixMut::col_major(&mut data, 3, 3)
            .unwrap()
            .symmetric(Uplo::Upper)
            .unwrap();
        scalm(3.0, &c);
        // column-major: upper triangle scaled, strictly lower untouched
        assert_eq!(data, vec![6.0, 2.0, 2.0, 6.0, 6.0, 2.0, 6.0, 6.0, 6.0]);
    }
}
