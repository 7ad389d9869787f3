//! Blocked algorithm driver.
//!
//! Walks a control tree over the operands. Every node is dispatched on its
//! `(ImplKind, Variant)` pair; blocked nodes partition one dimension and
//! recurse into their sub-node, leaves run the macro-kernel or the reference
//! loops. Trees are validated before execution, so nothing here can fail:
//! every function returns `()` and no gang member can leave a barrier
//! unmatched.

mod blocked;
mod ker;
mod reference;
mod trsm;

use std::sync::Arc;

use strided_blis_traits::{Kernels, Scalar};

use crate::cntl::{ImplKind, Node, PackNode, Variant};
use crate::packm::{pack_unchecked, PackParams, PackedMatrix};
use crate::thread::Gang;
use crate::view::{MatrixMut, MatrixRef, Structure, Uplo};

pub(crate) use blocked::scalm;

/// Gang handle type used by the driver: members exchange packed buffers.
pub(crate) type PackGang<T> = Gang<Arc<PackedMatrix<T>>>;

/// An input operand: either still a strided view or already packed.
#[derive(Debug, Clone)]
pub(crate) enum Operand<'a, T> {
    View(MatrixRef<'a, T>),
    Packed(Arc<PackedMatrix<T>>),
}

impl<'a, T: Scalar> Operand<'a, T> {
    fn dims(&self) -> (usize, usize) {
        match self {
            Operand::View(v) => (v.rows(), v.cols()),
            Operand::Packed(p) => p.dims(),
        }
    }

    /// The view; tree validation rejects partitioning a packed operand.
    fn view(&self) -> &MatrixRef<'a, T> {
        match self {
            Operand::View(v) => v,
            Operand::Packed(_) => unreachable!("validated trees never partition a packed operand"),
        }
    }

    fn packed(&self) -> &PackedMatrix<T> {
        match self {
            Operand::Packed(p) => p,
            Operand::View(_) => unreachable!("validated trees pack both operands above the kernel"),
        }
    }
}

/// Execute `C := alpha * A * B + beta * C` under `node`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn execute<T: Scalar>(
    alpha: T,
    a: &Operand<'_, T>,
    b: &Operand<'_, T>,
    beta: T,
    c: &MatrixMut<'_, T>,
    node: &Node,
    gang: &PackGang<T>,
    kernels: &Kernels<T>,
) {
    if c.is_empty() {
        return;
    }
    match (node.impl_kind(), node.variant()) {
        (ImplKind::Blocked, Variant::Var1) => blocked::blk_var1(alpha, a, b, beta, c, node, gang, kernels),
        (ImplKind::Blocked, Variant::Var2) => blocked::blk_var2(alpha, a, b, beta, c, node, gang, kernels),
        (ImplKind::Blocked, Variant::Var3) => blocked::blk_var3(alpha, a, b, beta, c, node, gang, kernels),
        (ImplKind::UnblockedOptimized, Variant::Var2) => {
            ker::ker_var2(alpha, a.packed(), b.packed(), beta, c, gang, kernels)
        }
        (ImplKind::UnblockedReference, _) => {
            reference::ref_var1(alpha, a.view(), b.view(), beta, c, gang)
        }
        (kind, variant) => unreachable!("unchecked gemm node {kind:?}/{variant:?}"),
    }
}

/// Execute `B := alpha * inv(A) * B` under `node`, A triangular.
pub(crate) fn execute_trsm<T: Scalar>(
    alpha: T,
    a: &MatrixRef<'_, T>,
    b: &MatrixMut<'_, T>,
    node: &Node,
    gang: &PackGang<T>,
    kernels: &Kernels<T>,
) {
    if b.is_empty() {
        return;
    }
    match (node.impl_kind(), node.variant()) {
        (ImplKind::Blocked, Variant::Var2) => trsm::trsm_blk_var2(alpha, a, b, node, gang, kernels),
        (ImplKind::Blocked, Variant::Var1) => trsm::trsm_blk_var1(alpha, a, b, node, gang, kernels),
        (ImplKind::UnblockedReference, _) => reference::trsm_ref(alpha, a, b, gang),
        (kind, variant) => unreachable!("unchecked trsm node {kind:?}/{variant:?}"),
    }
}

/// Pack `src` under `node`, shared among the members of the gang's icomm.
///
/// Returns the packed operand and the alpha still to be applied.
fn pack_operand<'a, T: Scalar>(
    node: &PackNode,
    src: &Operand<'a, T>,
    alpha: T,
    gang: &PackGang<T>,
) -> (Operand<'a, T>, T) {
    let Operand::View(view) = src else {
        return (src.clone(), alpha);
    };
    let params = PackParams::from_node(node, view, alpha);
    let packed = gang.broadcast(|| Arc::new(pack_unchecked(view, &params)));
    let alpha = if params.scale.is_some() { T::one() } else { alpha };
    (Operand::Packed(packed), alpha)
}

fn child(node: &Node) -> &Node {
    match node.sub_node() {
        Some(sub) => sub,
        None => unreachable!("validated blocked nodes have a sub-node"),
    }
}

/// Sub-view of C handed to one gang member.
#[inline]
fn c_part<'a, T: Scalar>(c: &MatrixMut<'a, T>, i0: usize, m: usize, j0: usize, n: usize) -> MatrixMut<'a, T> {
    // SAFETY: gang members receive disjoint row/column ranges of C.
    unsafe { c.alias() }.into_part(i0, m, j0, n)
}

#[inline]
fn is_structured<T: Scalar>(c: &MatrixMut<'_, T>) -> bool {
    c.structure() != Structure::General
}

#[inline]
fn align_down(x: usize, align: usize) -> usize {
    x - x % align.max(1)
}

/// Rows of a structured C holding at least one stored element, with the
/// start aligned down to `align`.
fn prune_m<T: Scalar>(c: &MatrixMut<'_, T>, align: usize) -> (usize, usize) {
    let (m, n) = (c.rows() as isize, c.cols() as isize);
    if !is_structured(c) {
        return (0, c.rows());
    }
    let d = c.diag_off();
    let (lo, hi) = match c.uplo() {
        Uplo::Lower => ((-d).max(0), m),
        Uplo::Upper => (0, (n - d).min(m)),
    };
    if hi <= lo {
        return (0, 0);
    }
    (align_down(lo as usize, align), hi as usize)
}

/// Columns of a structured C holding at least one stored element.
fn prune_n<T: Scalar>(c: &MatrixMut<'_, T>, align: usize) -> (usize, usize) {
    let (m, n) = (c.rows() as isize, c.cols() as isize);
    if !is_structured(c) {
        return (0, c.cols());
    }
    let d = c.diag_off();
    let (lo, hi) = match c.uplo() {
        Uplo::Lower => (0, (m + d).min(n)),
        Uplo::Upper => (d.max(0), n),
    };
    if hi <= lo {
        return (0, 0);
    }
    (align_down(lo as usize, align), hi as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prune_lower_block() {
        let mut data = vec![0.0f64; 36];
        let c = MatrixMut::col_major(&mut data, 6, 6)
            .unwrap()
            .hermitian(Uplo::Lower)
            .unwrap();
        // top-right 2x3 block at (0, 3): entirely above the diagonal
        let blk = c_part(&c, 0, 2, 3, 3);
        assert_eq!(prune_m(&blk, 1), (0, 0));
        // bottom-left block at (3, 0): fully stored
        let blk = c_part(&c, 3, 3, 0, 3);
        assert_eq!(prune_m(&blk, 1), (0, 3));
        assert_eq!(prune_n(&blk, 1), (0, 3));
        // diagonal block at (2, 2) with 4 columns: rows 0..4, cols 0..4
        let blk = c_part(&c, 2, 4, 2, 4);
        assert_eq!(prune_n(&blk, 1), (0, 4));
        // block at (0, 2): rows from 2 on are stored
        let blk = c_part(&c, 0, 6, 2, 4);
        assert_eq!(prune_m(&blk, 1), (2, 6));
        assert_eq!(prune_m(&blk, 4), (0, 6));
    }

    #[test]
    fn test_prune_upper_block() {
        let mut data = vec![0.0f64; 36];
        let c = MatrixMut::col_major(&mut data, 6, 6)
            .unwrap()
            .symmetric(Uplo::Upper)
            .unwrap();
        assert_eq!(prune_m(&c, 1), (0, 6));
        // columns 0..3 of rows 3..6: below the diagonal
        let blk = c_part(&c, 3, 3, 0, 3);
        assert_eq!(prune_n(&blk, 1), (0, 0));
        // rows 0..6 of columns 3..6: rows below 6 that reach column 5
        let blk = c_part(&c, 0, 6, 3, 3);
        assert_eq!(prune_m(&blk, 1), (0, 6));
        let blk = c_part(&c, 0, 6, 0, 2);
        assert_eq!(prune_m(&blk, 1), (0, 2));
        assert_eq!(prune_n(&blk, 1), (0, 2));
    }
}
