//! Default trsm control tree (left side; right-side solves are transposed
//! into left-side ones before execution).
//!
//! ```text
//! Var2 (NC)  partition n across every thread, scale B by alpha
//!  └ Var1 (MC)  walk diagonal blocks in dependency order
//!     │           (backwards for upper-stored A)
//!     ├ update: gemm k-loop tree, B1 -= A10 * X0
//!     └ macro-kernel: packed A11 (inverted diagonal) against packed B1
//! ```

use crate::blksz::Blocksizes;
use crate::cntl::{
    gemm, ImplKind, Node, OpFamily, PackFlags, PackNode, PackSchema, ScalmNode, SubNodes, Variant,
};

pub fn build_left(bs: &Blocksizes) -> Node {
    let ker = Node::new(
        OpFamily::Trsm,
        ImplKind::UnblockedOptimized,
        Variant::Var2,
        Some(bs.nr.clone()),
        Some(bs.mr.clone()),
        SubNodes::default(),
    );

    let pack_a11 = PackNode::new(
        ImplKind::Blocked,
        Variant::Var2,
        bs.mr.clone(),
        bs.mr.clone(),
        PackFlags {
            densify: true,
            invert_diag: true,
            rev_iter_if_upper: true,
            ..Default::default()
        },
        PackSchema::RowPanels,
    );
    let pack_b1 = PackNode::new(
        ImplKind::Blocked,
        Variant::Var2,
        bs.mr.clone(),
        bs.nr.clone(),
        PackFlags::default(),
        PackSchema::ColPanels,
    );
    let m_loop = Node::new(
        OpFamily::Trsm,
        ImplKind::Blocked,
        Variant::Var1,
        Some(bs.mc.clone()),
        Some(bs.mr.clone()),
        SubNodes {
            pack_a: Some(pack_a11),
            pack_b: Some(pack_b1),
            gemm: Some(gemm::build_update(bs)),
            next: Some(ker),
            ..Default::default()
        },
    )
    .reverse_if(true, false);

    Node::new(
        OpFamily::Trsm,
        ImplKind::Blocked,
        Variant::Var2,
        Some(bs.nc.clone()),
        Some(bs.nr.clone()),
        SubNodes {
            scalm: Some(ScalmNode::new(ImplKind::UnblockedOptimized, Variant::Var1)),
            next: Some(m_loop),
            ..Default::default()
        },
    )
}

/// Reference solve: forward/backward substitution on the logical operands.
pub fn build_reference() -> Node {
    Node::new(
        OpFamily::Trsm,
        ImplKind::UnblockedReference,
        Variant::Var1,
        None,
        None,
        SubNodes::default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::Uplo;
    use crate::BlisError;

    fn kernel(bs: &Blocksizes) -> Node {
        Node::new(
            OpFamily::Trsm,
            ImplKind::UnblockedOptimized,
            Variant::Var2,
            Some(bs.nr.clone()),
            Some(bs.mr.clone()),
            SubNodes::default(),
        )
    }

    fn scaling_root(bs: &Blocksizes, next: Node) -> Node {
        Node::new(
            OpFamily::Trsm,
            ImplKind::Blocked,
            Variant::Var2,
            Some(bs.nc.clone()),
            Some(bs.nr.clone()),
            SubNodes {
                scalm: Some(ScalmNode::new(ImplKind::UnblockedOptimized, Variant::Var1)),
                next: Some(next),
                ..Default::default()
            },
        )
    }

    /// The default m-loop with the diagonal block packed under `a11_flags`.
    fn m_loop(bs: &Blocksizes, a11_flags: PackFlags) -> Node {
        let pack_a11 = PackNode::new(
            ImplKind::Blocked,
            Variant::Var2,
            bs.mr.clone(),
            bs.mr.clone(),
            a11_flags,
            PackSchema::RowPanels,
        );
        let pack_b1 = PackNode::new(
            ImplKind::Blocked,
            Variant::Var2,
            bs.mr.clone(),
            bs.nr.clone(),
            PackFlags::default(),
            PackSchema::ColPanels,
        );
        Node::new(
            OpFamily::Trsm,
            ImplKind::Blocked,
            Variant::Var1,
            Some(bs.mc.clone()),
            Some(bs.mr.clone()),
            SubNodes {
                pack_a: Some(pack_a11),
                pack_b: Some(pack_b1),
                gemm: Some(gemm::build_update(bs)),
                next: Some(kernel(bs)),
                ..Default::default()
            },
        )
        .reverse_if(true, false)
    }

    fn a11_flags() -> PackFlags {
        PackFlags {
            densify: true,
            invert_diag: true,
            rev_iter_if_upper: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_direction_follows_storage() {
        let tree = build_left(&Blocksizes::default());
        let m_loop = tree.sub_node().unwrap();
        assert!(m_loop.reverse_for(Uplo::Upper));
        assert!(!m_loop.reverse_for(Uplo::Lower));
        let pack_a = m_loop.sub_pack_a().unwrap();
        assert!(pack_a.flags().invert_diag);
        assert!(pack_a.reverse_for(Uplo::Upper));
        assert!(m_loop.sub_gemm().is_some());
    }

    #[test]
    fn test_handbuilt_tree_matches_default() {
        let bs = Blocksizes::default();
        scaling_root(&bs, m_loop(&bs, a11_flags()))
            .check(OpFamily::Trsm)
            .unwrap();
    }

    #[test]
    fn test_missing_update_tree_rejected() {
        let bs = Blocksizes::default();
        let m_loop = Node::new(
            OpFamily::Trsm,
            ImplKind::Blocked,
            Variant::Var1,
            Some(bs.mc.clone()),
            Some(bs.mr.clone()),
            SubNodes {
                next: Some(kernel(&bs)),
                ..Default::default()
            },
        )
        .reverse_if(true, false);
        let err = scaling_root(&bs, m_loop).check(OpFamily::Trsm).unwrap_err();
        assert!(err.to_string().contains("update tree"));
    }

    #[test]
    fn test_forward_walk_over_upper_rejected() {
        let bs = Blocksizes::default();
        let m_loop = Node::new(
            OpFamily::Trsm,
            ImplKind::Blocked,
            Variant::Var1,
            Some(bs.mc.clone()),
            Some(bs.mr.clone()),
            SubNodes {
                gemm: Some(gemm::build_update(&bs)),
                next: Some(build_reference()),
                ..Default::default()
            },
        );
        let err = scaling_root(&bs, m_loop).check(OpFamily::Trsm).unwrap_err();
        assert!(err.to_string().contains("backwards"));
    }

    #[test]
    fn test_unpacked_m_loop_rejected() {
        let bs = Blocksizes::default();
        let m_loop = Node::new(
            OpFamily::Trsm,
            ImplKind::Blocked,
            Variant::Var1,
            Some(bs.mc.clone()),
            Some(bs.mr.clone()),
            SubNodes {
                gemm: Some(gemm::build_update(&bs)),
                next: Some(kernel(&bs)),
                ..Default::default()
            },
        )
        .reverse_if(true, false);
        let err = scaling_root(&bs, m_loop).check(OpFamily::Trsm).unwrap_err();
        assert!(err.to_string().contains("pack both"));
    }

    #[test]
    fn test_pack_direction_mismatch_rejected() {
        let bs = Blocksizes::default();
        // diagonal block packed forwards while the m-loop walks upper A backwards
        let flags = PackFlags {
            rev_iter_if_upper: false,
            ..a11_flags()
        };
        let err = scaling_root(&bs, m_loop(&bs, flags))
            .check(OpFamily::Trsm)
            .unwrap_err();
        assert!(err.to_string().contains("against the solve direction"));

        let flags = PackFlags {
            rev_iter_if_lower: true,
            ..a11_flags()
        };
        assert!(scaling_root(&bs, m_loop(&bs, flags))
            .check(OpFamily::Trsm)
            .is_err());
    }

    #[test]
    fn test_diagonal_not_inverted_rejected() {
        let bs = Blocksizes::default();
        let flags = PackFlags {
            invert_diag: false,
            ..a11_flags()
        };
        let err = scaling_root(&bs, m_loop(&bs, flags))
            .check(OpFamily::Trsm)
            .unwrap_err();
        assert!(err.to_string().contains("inverted diagonal"));
    }

    #[test]
    fn test_m_loop_root_rejected() {
        // every thread would scale and solve all of B
        let bs = Blocksizes::default();
        let err = m_loop(&bs, a11_flags()).check(OpFamily::Trsm).unwrap_err();
        assert!(matches!(err, BlisError::InvalidControlTree(_)));
        assert!(err.to_string().contains("root"));
    }

    #[test]
    fn test_root_without_scaling_rejected() {
        let bs = Blocksizes::default();
        let root = Node::new(
            OpFamily::Trsm,
            ImplKind::Blocked,
            Variant::Var2,
            Some(bs.nc.clone()),
            Some(bs.nr.clone()),
            SubNodes {
                next: Some(m_loop(&bs, a11_flags())),
                ..Default::default()
            },
        );
        let err = root.check(OpFamily::Trsm).unwrap_err();
        assert!(err.to_string().contains("scale B"));
    }

    #[test]
    fn test_k_partition_rejected() {
        let bs = Blocksizes::default();
        let k_loop = Node::new(
            OpFamily::Trsm,
            ImplKind::Blocked,
            Variant::Var3,
            Some(bs.kc.clone()),
            Some(bs.kr.clone()),
            SubNodes {
                next: Some(m_loop(&bs, a11_flags())),
                ..Default::default()
            },
        );
        assert!(matches!(
            scaling_root(&bs, k_loop).check(OpFamily::Trsm),
            Err(BlisError::NotYetImplemented(_))
        ));
    }

    #[test]
    fn test_packing_var2_rejected() {
        let bs = Blocksizes::default();
        let root = Node::new(
            OpFamily::Trsm,
            ImplKind::Blocked,
            Variant::Var2,
            Some(bs.nc.clone()),
            Some(bs.nr.clone()),
            SubNodes {
                scalm: Some(ScalmNode::new(ImplKind::UnblockedOptimized, Variant::Var1)),
                pack_b: Some(PackNode::new(
                    ImplKind::Blocked,
                    Variant::Var2,
                    bs.mr.clone(),
                    bs.nr.clone(),
                    PackFlags::default(),
                    PackSchema::ColPanels,
                )),
                next: Some(m_loop(&bs, a11_flags())),
                ..Default::default()
            },
        );
        let err = root.check(OpFamily::Trsm).unwrap_err();
        assert!(err.to_string().contains("does not pack"));
    }

    #[test]
    fn test_kernel_without_m_loop_rejected() {
        let bs = Blocksizes::default();
        let err = scaling_root(&bs, kernel(&bs))
            .check(OpFamily::Trsm)
            .unwrap_err();
        assert!(err.to_string().contains("under a Var1"));
    }

    #[test]
    fn test_reference_tree_checks() {
        build_reference().check(OpFamily::Trsm).unwrap();
    }
}
