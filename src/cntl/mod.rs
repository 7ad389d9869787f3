//! Control trees.
//!
//! A control tree describes *how* an operation is executed: which dimension
//! each level partitions and by which blocksize, which operands are packed at
//! that level and into which layout, and what runs underneath. The driver in
//! `crate::driver` walks the tree; the tree itself is plain data, built once
//! per [`ControlTrees`] and never mutated afterwards.
//!
//! Nodes own their children exclusively (`Box`), so a tree is always a tree.
//! Blocksize descriptors are the only shared leaves (`Arc<BlockSize>`).

pub mod gemm;
pub mod herk;
pub mod trsm;

use std::sync::Arc;

use strided_blis_traits::{Datatype, MAX_REGISTER_BLOCK};

use crate::blksz::{BlockSize, Blocksizes};
use crate::view::Uplo;
use crate::{BlisError, Result};

/// Operation family a tree belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpFamily {
    Gemm,
    Herk,
    Trsm,
}

/// Implementation kind of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImplKind {
    /// Naive loops over the logical operands; used for validation.
    UnblockedReference,
    /// Micro-kernel loops over packed operands.
    UnblockedOptimized,
    /// Partition one dimension and recurse.
    Blocked,
}

/// Which dimension a blocked node partitions.
///
/// `Var1` partitions m, `Var2` partitions n, `Var3` partitions k. For
/// `UnblockedOptimized` nodes, `Var2` is the macro-kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Var1,
    Var2,
    Var3,
}

/// Layout of a packed buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackSchema {
    /// Strips of `mult_m` rows, each stored column by column.
    RowPanels,
    /// Strips of `mult_n` columns, each stored row by row.
    ColPanels,
    /// Plain row-major copy.
    Rows,
    /// Plain column-major copy.
    Cols,
}

impl PackSchema {
    #[inline]
    pub fn is_panel(self) -> bool {
        matches!(self, PackSchema::RowPanels | PackSchema::ColPanels)
    }
}

/// Behaviour switches of a pack node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PackFlags {
    /// Multiply by the operation's alpha while copying.
    pub scale: bool,
    /// Materialize the unstored part of a structured operand.
    pub densify: bool,
    /// Store reciprocals on the diagonal.
    pub invert_diag: bool,
    /// Lay strips out back-to-front when the source stores its upper triangle.
    pub rev_iter_if_upper: bool,
    /// Lay strips out back-to-front when the source stores its lower triangle.
    pub rev_iter_if_lower: bool,
}

/// Packing sub-node.
#[derive(Debug, Clone)]
pub struct PackNode {
    impl_kind: ImplKind,
    variant: Variant,
    mult_m: Arc<BlockSize>,
    mult_n: Arc<BlockSize>,
    flags: PackFlags,
    schema: PackSchema,
}

impl PackNode {
    pub fn new(
        impl_kind: ImplKind,
        variant: Variant,
        mult_m: Arc<BlockSize>,
        mult_n: Arc<BlockSize>,
        flags: PackFlags,
        schema: PackSchema,
    ) -> Self {
        Self {
            impl_kind,
            variant,
            mult_m,
            mult_n,
            flags,
            schema,
        }
    }

    #[inline]
    pub fn impl_kind(&self) -> ImplKind {
        self.impl_kind
    }

    #[inline]
    pub fn variant(&self) -> Variant {
        self.variant
    }

    #[inline]
    pub fn mult_m(&self) -> &Arc<BlockSize> {
        &self.mult_m
    }

    #[inline]
    pub fn mult_n(&self) -> &Arc<BlockSize> {
        &self.mult_n
    }

    #[inline]
    pub fn flags(&self) -> PackFlags {
        self.flags
    }

    #[inline]
    pub fn schema(&self) -> PackSchema {
        self.schema
    }

    /// Whether strips of an operand stored in `uplo` are laid out in reverse.
    #[inline]
    pub fn reverse_for(&self, uplo: Uplo) -> bool {
        match uplo {
            Uplo::Upper => self.flags.rev_iter_if_upper,
            Uplo::Lower => self.flags.rev_iter_if_lower,
        }
    }

    fn check(&self) -> Result<()> {
        match (self.schema.is_panel(), self.impl_kind, self.variant) {
            (true, ImplKind::Blocked, Variant::Var2) => Ok(()),
            (false, ImplKind::UnblockedOptimized, Variant::Var1) => Ok(()),
            (_, kind, var) => Err(BlisError::NotYetImplemented(format!(
                "packm {kind:?}/{var:?} for schema {:?}",
                self.schema
            ))),
        }
    }
}

/// Scaling sub-node (`C := beta * C`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalmNode {
    impl_kind: ImplKind,
    variant: Variant,
}

impl ScalmNode {
    pub fn new(impl_kind: ImplKind, variant: Variant) -> Self {
        Self { impl_kind, variant }
    }

    #[inline]
    pub fn impl_kind(&self) -> ImplKind {
        self.impl_kind
    }

    #[inline]
    pub fn variant(&self) -> Variant {
        self.variant
    }

    fn check(&self) -> Result<()> {
        match (self.impl_kind, self.variant) {
            (ImplKind::UnblockedOptimized | ImplKind::UnblockedReference, Variant::Var1) => Ok(()),
            (kind, var) => Err(BlisError::NotYetImplemented(format!("scalm {kind:?}/{var:?}"))),
        }
    }
}

/// Children of a [`Node`], consumed by [`Node::new`].
#[derive(Debug, Default)]
pub struct SubNodes {
    pub pack_a: Option<PackNode>,
    pub pack_b: Option<PackNode>,
    pub pack_c: Option<PackNode>,
    pub scalm: Option<ScalmNode>,
    /// Update tree used by triangular solves for the already-solved part.
    pub gemm: Option<Node>,
    /// Next level of this tree.
    pub next: Option<Node>,
}

/// One algorithm node.
///
/// For blocked nodes `blksz` is the cache blocksize of the partitioned
/// dimension and `blksz_aux` the register blocksize thread sub-ranges are
/// aligned to. For the macro-kernel, `blksz` is NR and `blksz_aux` is MR.
#[derive(Debug)]
pub struct Node {
    family: OpFamily,
    impl_kind: ImplKind,
    variant: Variant,
    blksz: Option<Arc<BlockSize>>,
    blksz_aux: Option<Arc<BlockSize>>,
    rev_iter_if_upper: bool,
    rev_iter_if_lower: bool,
    sub_pack_a: Option<Box<PackNode>>,
    sub_pack_b: Option<Box<PackNode>>,
    sub_pack_c: Option<Box<PackNode>>,
    sub_scalm: Option<Box<ScalmNode>>,
    sub_gemm: Option<Box<Node>>,
    sub_node: Option<Box<Node>>,
}

impl Node {
    pub fn new(
        family: OpFamily,
        impl_kind: ImplKind,
        variant: Variant,
        blksz: Option<Arc<BlockSize>>,
        blksz_aux: Option<Arc<BlockSize>>,
        subs: SubNodes,
    ) -> Self {
        Self {
            family,
            impl_kind,
            variant,
            blksz,
            blksz_aux,
            rev_iter_if_upper: false,
            rev_iter_if_lower: false,
            sub_pack_a: subs.pack_a.map(Box::new),
            sub_pack_b: subs.pack_b.map(Box::new),
            sub_pack_c: subs.pack_c.map(Box::new),
            sub_scalm: subs.scalm.map(Box::new),
            sub_gemm: subs.gemm.map(Box::new),
            sub_node: subs.next.map(Box::new),
        }
    }

    /// Iterate this level's partition backwards for operands stored in the
    /// given triangle.
    pub fn reverse_if(mut self, upper: bool, lower: bool) -> Self {
        self.rev_iter_if_upper = upper;
        self.rev_iter_if_lower = lower;
        self
    }

    #[inline]
    pub fn family(&self) -> OpFamily {
        self.family
    }

    #[inline]
    pub fn impl_kind(&self) -> ImplKind {
        self.impl_kind
    }

    #[inline]
    pub fn variant(&self) -> Variant {
        self.variant
    }

    #[inline]
    pub fn blksz(&self) -> Option<&Arc<BlockSize>> {
        self.blksz.as_ref()
    }

    #[inline]
    pub fn blksz_aux(&self) -> Option<&Arc<BlockSize>> {
        self.blksz_aux.as_ref()
    }

    /// Blocksize for `dt`; 1 when the node has none.
    #[inline]
    pub fn blksz_for(&self, dt: Datatype) -> usize {
        self.blksz.as_ref().map_or(1, |b| b.get(dt))
    }

    /// Auxiliary blocksize for `dt`; 1 when the node has none.
    #[inline]
    pub fn blksz_aux_for(&self, dt: Datatype) -> usize {
        self.blksz_aux.as_ref().map_or(1, |b| b.get(dt))
    }

    #[inline]
    pub fn reverse_for(&self, uplo: Uplo) -> bool {
        match uplo {
            Uplo::Upper => self.rev_iter_if_upper,
            Uplo::Lower => self.rev_iter_if_lower,
        }
    }

    #[inline]
    pub fn sub_pack_a(&self) -> Option<&PackNode> {
        self.sub_pack_a.as_deref()
    }

    #[inline]
    pub fn sub_pack_b(&self) -> Option<&PackNode> {
        self.sub_pack_b.as_deref()
    }

    #[inline]
    pub fn sub_pack_c(&self) -> Option<&PackNode> {
        self.sub_pack_c.as_deref()
    }

    #[inline]
    pub fn sub_scalm(&self) -> Option<&ScalmNode> {
        self.sub_scalm.as_deref()
    }

    #[inline]
    pub fn sub_gemm(&self) -> Option<&Node> {
        self.sub_gemm.as_deref()
    }

    #[inline]
    pub fn sub_node(&self) -> Option<&Node> {
        self.sub_node.as_deref()
    }

    /// This node followed by every node on its `sub_node` chain.
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        std::iter::successors(Some(self), |n| n.sub_node())
    }

    /// Number of nodes on the `sub_node` chain, this one included.
    pub fn depth(&self) -> usize {
        self.iter().count()
    }

    /// Validate the tree for `family` before it is executed.
    ///
    /// Checks the family of every node, that blocked nodes have a blocksize
    /// and a child, that each blocked variant packs only the operands it
    /// partitions, that no blocked node partitions an operand an ancestor
    /// already packed, that the macro-kernel sees row-panel A and
    /// column-panel B matching register blocksizes within
    /// [`MAX_REGISTER_BLOCK`], and that the chain ends in a leaf.
    ///
    /// Triangular solve trees are further restricted to the shapes the solve
    /// driver runs: a scaling `Var2` (or reference) root, `Var1` nodes that
    /// walk upper-stored blocks backwards, pack the diagonal block in the
    /// same direction and sit directly above the macro-kernel.
    pub fn check(&self, family: OpFamily) -> Result<()> {
        let mut a_pack: Option<&PackNode> = None;
        let mut b_pack: Option<&PackNode> = None;
        let mut parent: Option<&Node> = None;

        for (level, node) in self.iter().enumerate() {
            if node.family != family {
                return Err(BlisError::InvalidControlTree(format!(
                    "level {level}: {:?} node in a {family:?} tree",
                    node.family
                )));
            }
            if node.sub_pack_c.is_some() {
                return Err(BlisError::NotYetImplemented("packing of C".into()));
            }
            if let Some(scalm) = node.sub_scalm() {
                scalm.check()?;
            }
            if family == OpFamily::Trsm && level == 0 {
                check_trsm_root(node)?;
            }

            match (node.impl_kind, node.variant) {
                (ImplKind::Blocked, variant) => {
                    if node.blksz.is_none() {
                        return Err(BlisError::InvalidControlTree(format!(
                            "level {level}: blocked {variant:?} node without blocksize"
                        )));
                    }
                    if node.sub_node.is_none() {
                        return Err(BlisError::InvalidControlTree(format!(
                            "level {level}: blocked {variant:?} node without sub-node"
                        )));
                    }
                    let (splits_a, splits_b) = match variant {
                        Variant::Var1 => (true, false),
                        Variant::Var2 => (false, true),
                        Variant::Var3 => (true, true),
                    };
                    if (splits_a && a_pack.is_some()) || (splits_b && b_pack.is_some()) {
                        return Err(BlisError::InvalidControlTree(format!(
                            "level {level}: {variant:?} partitions an operand packed above it"
                        )));
                    }
                    if family == OpFamily::Trsm {
                        check_trsm_blocked(level, node)?;
                    } else {
                        // blk_var1 packs A, blk_var2 packs B, blk_var3 both
                        if (node.sub_pack_a.is_some() && !splits_a)
                            || (node.sub_pack_b.is_some() && !splits_b)
                        {
                            return Err(BlisError::InvalidControlTree(format!(
                                "level {level}: {variant:?} can only pack the operands it partitions"
                            )));
                        }
                    }
                    if let Some(p) = node.sub_pack_a() {
                        p.check()?;
                        a_pack = Some(p);
                    }
                    if let Some(p) = node.sub_pack_b() {
                        p.check()?;
                        b_pack = Some(p);
                    }
                }
                (ImplKind::UnblockedOptimized, Variant::Var2) => {
                    if node.sub_node.is_some() {
                        return Err(BlisError::InvalidControlTree(format!(
                            "level {level}: macro-kernel must be a leaf"
                        )));
                    }
                    let (Some(nr), Some(mr)) = (&node.blksz, &node.blksz_aux) else {
                        return Err(BlisError::InvalidControlTree(format!(
                            "level {level}: macro-kernel needs NR and MR blocksizes"
                        )));
                    };
                    if mr.max() > MAX_REGISTER_BLOCK || nr.max() > MAX_REGISTER_BLOCK {
                        return Err(BlisError::InvalidControlTree(format!(
                            "level {level}: register blocksize {}x{} exceeds {MAX_REGISTER_BLOCK}",
                            mr.max(),
                            nr.max()
                        )));
                    }
                    if family == OpFamily::Trsm
                        && !parent.is_some_and(|p| {
                            p.impl_kind == ImplKind::Blocked && p.variant == Variant::Var1
                        })
                    {
                        return Err(BlisError::InvalidControlTree(format!(
                            "level {level}: solve macro-kernel must sit under a Var1 node"
                        )));
                    }
                    let (Some(pa), Some(pb)) = (a_pack, b_pack) else {
                        return Err(BlisError::InvalidControlTree(format!(
                            "level {level}: macro-kernel reached with unpacked operands"
                        )));
                    };
                    if pa.schema != PackSchema::RowPanels || pb.schema != PackSchema::ColPanels {
                        return Err(BlisError::InvalidControlTree(format!(
                            "level {level}: macro-kernel needs row-panel A and column-panel B"
                        )));
                    }
                    if *pa.mult_m != **mr || *pb.mult_n != **nr {
                        return Err(BlisError::InvalidControlTree(format!(
                            "level {level}: packed panel widths do not match the register blocksizes"
                        )));
                    }
                    if family == OpFamily::Trsm && (*pa.mult_n != **mr || *pb.mult_m != **mr) {
                        return Err(BlisError::InvalidControlTree(format!(
                            "level {level}: triangular block must be padded to MR columns"
                        )));
                    }
                    if family != OpFamily::Trsm && *pa.mult_n != *pb.mult_m {
                        return Err(BlisError::InvalidControlTree(format!(
                            "level {level}: A and B packed with different k granularity"
                        )));
                    }
                    return Ok(());
                }
                (ImplKind::UnblockedReference, _) => {
                    if node.sub_node.is_some() {
                        return Err(BlisError::InvalidControlTree(format!(
                            "level {level}: reference node must be a leaf"
                        )));
                    }
                    if a_pack.is_some() || b_pack.is_some() {
                        return Err(BlisError::InvalidControlTree(format!(
                            "level {level}: reference node reads unpacked operands only"
                        )));
                    }
                    return Ok(());
                }
                (kind, variant) => {
                    return Err(BlisError::NotYetImplemented(format!(
                        "{family:?} {kind:?}/{variant:?}"
                    )))
                }
            }
            parent = Some(node);
        }
        Err(BlisError::InvalidControlTree("tree has no leaf".into()))
    }
}

/// A solve starts either in the reference loops or in a `Var2` node that
/// splits the right-hand sides and scales them by alpha.
fn check_trsm_root(node: &Node) -> Result<()> {
    match (node.impl_kind, node.variant) {
        (ImplKind::UnblockedReference, _) => Ok(()),
        (ImplKind::Blocked, Variant::Var2) if node.sub_scalm.is_some() => Ok(()),
        (ImplKind::Blocked, Variant::Var2) => Err(BlisError::InvalidControlTree(
            "triangular solve root must scale B".into(),
        )),
        (kind, variant) => Err(BlisError::InvalidControlTree(format!(
            "triangular solve root must be a blocked Var2 node, got {kind:?}/{variant:?}"
        ))),
    }
}

/// Blocked nodes the solve driver runs: `Var2` over the right-hand sides
/// without packing, and `Var1` over the diagonal blocks.
fn check_trsm_blocked(level: usize, node: &Node) -> Result<()> {
    match node.variant {
        Variant::Var2 => {
            if node.sub_pack_a.is_some() || node.sub_pack_b.is_some() {
                return Err(BlisError::InvalidControlTree(format!(
                    "level {level}: solve Var2 node does not pack"
                )));
            }
            Ok(())
        }
        Variant::Var1 => {
            if !node.rev_iter_if_upper || node.rev_iter_if_lower {
                return Err(BlisError::InvalidControlTree(format!(
                    "level {level}: triangular solve must walk upper-stored blocks backwards"
                )));
            }
            match node.sub_gemm() {
                Some(update) => update.check(OpFamily::Gemm)?,
                None => {
                    return Err(BlisError::InvalidControlTree(format!(
                        "level {level}: triangular solve without update tree"
                    )))
                }
            }
            let (Some(pa), Some(_)) = (node.sub_pack_a(), node.sub_pack_b()) else {
                return Err(BlisError::InvalidControlTree(format!(
                    "level {level}: triangular solve must pack both A11 and B1"
                )));
            };
            if [Uplo::Upper, Uplo::Lower]
                .iter()
                .any(|&u| pa.reverse_for(u) != node.reverse_for(u))
            {
                return Err(BlisError::InvalidControlTree(format!(
                    "level {level}: diagonal block packed against the solve direction"
                )));
            }
            if !pa.flags.densify || !pa.flags.invert_diag {
                return Err(BlisError::InvalidControlTree(format!(
                    "level {level}: diagonal block must be densified with an inverted diagonal"
                )));
            }
            match node.sub_node() {
                Some(k)
                    if k.impl_kind == ImplKind::UnblockedOptimized
                        && k.variant == Variant::Var2 =>
                {
                    Ok(())
                }
                _ => Err(BlisError::InvalidControlTree(format!(
                    "level {level}: solve Var1 node must sit directly above the macro-kernel"
                ))),
            }
        }
        Variant::Var3 => Err(BlisError::NotYetImplemented(format!(
            "level {level}: triangular solve cannot partition k"
        ))),
    }
}

/// Default control trees for every operation family.
#[derive(Debug)]
pub struct ControlTrees {
    gemm: Node,
    herk: Node,
    trsm: Node,
}

impl ControlTrees {
    /// Build every family's default tree from one blocksize set.
    pub fn new(bs: &Blocksizes) -> Self {
        Self {
            gemm: gemm::build(bs),
            herk: herk::build(bs),
            trsm: trsm::build_left(bs),
        }
    }

    #[inline]
    pub fn gemm(&self) -> &Node {
        &self.gemm
    }

    #[inline]
    pub fn herk(&self) -> &Node {
        &self.herk
    }

    #[inline]
    pub fn trsm(&self) -> &Node {
        &self.trsm
    }

    pub fn get(&self, family: OpFamily) -> &Node {
        match family {
            OpFamily::Gemm => &self.gemm,
            OpFamily::Herk => &self.herk,
            OpFamily::Trsm => &self.trsm,
        }
    }

    /// Release every tree. Shared blocksize descriptors outlive this call
    /// while other owners hold them.
    pub fn free(self) {
        tracing::debug!(
            gemm_depth = self.gemm.depth(),
            herk_depth = self.herk.depth(),
            trsm_depth = self.trsm.depth(),
            "freeing control trees"
        );
    }
}
