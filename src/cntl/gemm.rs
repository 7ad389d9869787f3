//! Default gemm control tree.
//!
//! ```text
//! Var2 (NC)  partition n, split across jc ways
//!  └ Var3 (KC)  partition k, pack B into column panels scaled by alpha
//!     └ Var1 (MC)  partition m, split across ic ways, pack A into row panels
//!        └ macro-kernel (NR x MR tiles, split across jr / ir ways)
//! ```

use crate::blksz::Blocksizes;
use crate::cntl::{ImplKind, Node, OpFamily, PackFlags, PackNode, PackSchema, SubNodes, Variant};

pub fn build(bs: &Blocksizes) -> Node {
    build_family(bs, OpFamily::Gemm)
}

/// Tree rooted at the k loop, used to update a block of a triangular solve
/// with the part of the solution computed so far.
pub fn build_update(bs: &Blocksizes) -> Node {
    build_k_loop(bs, OpFamily::Gemm)
}

/// A single reference node computing the whole product with naive loops.
pub fn build_reference() -> Node {
    Node::new(
        OpFamily::Gemm,
        ImplKind::UnblockedReference,
        Variant::Var1,
        None,
        None,
        SubNodes::default(),
    )
}

pub(crate) fn build_family(bs: &Blocksizes, family: OpFamily) -> Node {
    Node::new(
        family,
        ImplKind::Blocked,
        Variant::Var2,
        Some(bs.nc.clone()),
        Some(bs.nr.clone()),
        SubNodes {
            next: Some(build_k_loop(bs, family)),
            ..Default::default()
        },
    )
}

fn build_k_loop(bs: &Blocksizes, family: OpFamily) -> Node {
    let ker = Node::new(
        family,
        ImplKind::UnblockedOptimized,
        Variant::Var2,
        Some(bs.nr.clone()),
        Some(bs.mr.clone()),
        SubNodes::default(),
    );

    let pack_a = PackNode::new(
        ImplKind::Blocked,
        Variant::Var2,
        bs.mr.clone(),
        bs.kr.clone(),
        PackFlags {
            densify: true,
            ..Default::default()
        },
        PackSchema::RowPanels,
    );
    let m_loop = Node::new(
        family,
        ImplKind::Blocked,
        Variant::Var1,
        Some(bs.mc.clone()),
        Some(bs.mr.clone()),
        SubNodes {
            pack_a: Some(pack_a),
            next: Some(ker),
            ..Default::default()
        },
    );

    let pack_b = PackNode::new(
        ImplKind::Blocked,
        Variant::Var2,
        bs.kr.clone(),
        bs.nr.clone(),
        PackFlags {
            scale: true,
            densify: true,
            ..Default::default()
        },
        PackSchema::ColPanels,
    );
    Node::new(
        family,
        ImplKind::Blocked,
        Variant::Var3,
        Some(bs.kc.clone()),
        Some(bs.kr.clone()),
        SubNodes {
            pack_b: Some(pack_b),
            next: Some(m_loop),
            ..Default::default()
        },
    )
}
