//! Triangular solve variants.
//!
//! Right-hand sides are independent, so only n is split across threads. The
//! m dimension is walked block by block in dependency order: top-down for a
//! lower-stored A, bottom-up for an upper-stored one. Each block first
//! subtracts the contribution of the already solved rows through the gemm
//! update tree, then solves its diagonal block with the trsm micro-kernel.

use std::sync::Arc;

use strided_blis_traits::{AuxInfo, Kernels, Scalar, MAX_REGISTER_BLOCK};

use super::{c_part, child, execute, scalm, Operand, PackGang};
use crate::cntl::{ImplKind, Node, Variant};
use crate::packm::{pack_unchecked, PackParams, PackedMatrix};
use crate::view::{MatrixMut, MatrixRef, Uplo};

/// Partition n. The root scales its columns of B by alpha before solving.
pub(super) fn trsm_blk_var2<T: Scalar>(
    alpha: T,
    a: &MatrixRef<'_, T>,
    b: &MatrixMut<'_, T>,
    node: &Node,
    gang: &PackGang<T>,
    kernels: &Kernels<T>,
) {
    let dt = T::DATATYPE;
    let (nc, nr) = (node.blksz_for(dt), node.blksz_aux_for(dt));
    let m = b.rows();
    let sub = child(node);

    let range = gang.get_range(0, b.cols(), nr);
    let alpha = if node.sub_scalm().is_some() {
        let cols = gang.get_range_icomm(range.start, range.end, 1);
        scalm(alpha, &c_part(b, 0, m, cols.start, cols.len()));
        gang.icomm().barrier();
        T::one()
    } else {
        alpha
    };

    for j0 in range.clone().step_by(nc) {
        let len = nc.min(range.end - j0);
        let b1 = c_part(b, 0, m, j0, len);
        super::execute_trsm(alpha, a, &b1, sub, gang.sub(), kernels);
    }
}

/// Walk the diagonal blocks of A in dependency order.
pub(super) fn trsm_blk_var1<T: Scalar>(
    alpha: T,
    a: &MatrixRef<'_, T>,
    b: &MatrixMut<'_, T>,
    node: &Node,
    gang: &PackGang<T>,
    kernels: &Kernels<T>,
) {
    let mc = node.blksz_for(T::DATATYPE);
    let (m, n) = (b.rows(), b.cols());
    let uplo = a.uplo();
    let sub = child(node);
    let (Some(update), Some(pack_a), Some(pack_b)) =
        (node.sub_gemm(), node.sub_pack_a(), node.sub_pack_b())
    else {
        unreachable!("validated solve nodes carry an update tree and both packs")
    };

    scalm(alpha, b);

    let n_blocks = m.div_ceil(mc);
    let backward = node.reverse_for(uplo);
    for t in 0..n_blocks {
        let blk = if backward { n_blocks - 1 - t } else { t };
        let i0 = blk * mc;
        let i1 = (i0 + mc).min(m);
        let len = i1 - i0;
        let b1 = c_part(b, i0, len, 0, n);

        // B1 -= A10 * X0 (lower) or A12 * X2 (upper)
        let (a_solved, x_solved) = match uplo {
            Uplo::Lower => (a.part(i0, len, 0, i0), b.as_ref().part(0, i0, 0, n)),
            Uplo::Upper => (a.part(i0, len, i1, m - i1), b.as_ref().part(i1, m - i1, 0, n)),
        };
        if a_solved.cols() > 0 {
            execute(
                -T::one(),
                &Operand::View(a_solved.as_general()),
                &Operand::View(x_solved),
                T::one(),
                &b1,
                update,
                gang.sub(),
                kernels,
            );
        }

        let a11 = a.part(i0, len, i0, len);
        let params = PackParams::from_node(pack_a, &a11, T::one());
        let a11p = gang.broadcast(|| Arc::new(pack_unchecked(&a11, &params)));
        let b1_view = b1.as_ref();
        let mut b1p = pack_unchecked(&b1_view, &PackParams::from_node(pack_b, &b1_view, T::one()));

        match (sub.impl_kind(), sub.variant()) {
            (ImplKind::UnblockedOptimized, Variant::Var2) => {
                trsm_ker_var2(&a11p, &mut b1p, &b1, uplo, gang.sub(), kernels)
            }
            (kind, variant) => unreachable!("unchecked solve leaf {kind:?}/{variant:?}"),
        }
    }
}

/// Solve packed `A11 * X = B1` strip by strip, writing X into C.
///
/// Each MR strip of B is first updated with the strips solved before it
/// (gemm micro-kernel on the packed buffers), then solved against its
/// diagonal block. The solve writes both the packed B, so that later strips
/// read solved values, and C.
fn trsm_ker_var2<T: Scalar>(
    a: &PackedMatrix<T>,
    b: &mut PackedMatrix<T>,
    c: &MatrixMut<'_, T>,
    uplo: Uplo,
    gang: &PackGang<T>,
    kernels: &Kernels<T>,
) {
    let (mr, nr) = (a.panel_dim(), b.panel_dim());
    let m_pad = a.padded_dims().0;
    debug_assert_eq!(m_pad, b.padded_dims().0);
    let (m, n) = (c.rows(), c.cols());
    let (rs_c, cs_c) = (c.rs(), c.cs());

    let cols = gang.get_range(0, n, nr);
    if cols.is_empty() {
        return;
    }
    let minus_one = -T::one();
    let aux = AuxInfo::default();
    let mut ct = [T::zero(); MAX_REGISTER_BLOCK * MAX_REGISTER_BLOCK];

    for jb in cols.start / nr..cols.end.div_ceil(nr) {
        let j0 = jb * nr;
        let n_cur = nr.min(n - j0);
        let bp = b.panel_mut_ptr(jb);

        for s in a.strip_order() {
            let i0 = s * mr;
            let m_cur = mr.min(m - i0);
            let (p0, k) = match uplo {
                Uplo::Lower => (0, i0),
                Uplo::Upper => (i0 + mr, m_pad - i0 - mr),
            };
            let ap = a.panel_ptr(s);

            // SAFETY: the packed strips span m_pad * MR (A) and m_pad * NR
            // (B) elements; the update reads rows of B disjoint from the
            // MR rows it writes. The C tile belongs to this thread alone.
            unsafe {
                let b11 = bp.add(i0 * nr);
                if k > 0 {
                    kernels.gemm.gemm(
                        mr,
                        nr,
                        k,
                        minus_one,
                        ap.add(p0 * mr),
                        bp.add(p0 * nr),
                        T::one(),
                        b11,
                        nr as isize,
                        1,
                        &aux,
                    );
                }

                let a11 = ap.add(i0 * mr);
                let full = m_cur == mr && n_cur == nr;
                let (cp, rs, cs) = if full {
                    (c.ptr_at(i0, j0), rs_c, cs_c)
                } else {
                    (ct.as_mut_ptr(), 1, mr as isize)
                };
                match uplo {
                    Uplo::Lower => kernels.trsm.trsm_lower(mr, nr, a11, b11, cp, rs, cs),
                    Uplo::Upper => kernels.trsm.trsm_upper(mr, nr, a11, b11, cp, rs, cs),
                }
                if !full {
                    for j in 0..n_cur {
                        for i in 0..m_cur {
                            *c.ptr_at(i0 + i, j0 + j) = ct[i + j * mr];
                        }
                    }
                }
            }
        }
    }
}
