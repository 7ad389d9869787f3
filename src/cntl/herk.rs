//! Default herk/syrk control tree.
//!
//! Same loop nest as gemm; the driver recognizes the structured C operand and
//! skips blocks and tiles that lie entirely outside its stored triangle.

use crate::blksz::Blocksizes;
use crate::cntl::{gemm, Node, OpFamily};

pub fn build(bs: &Blocksizes) -> Node {
    gemm::build_family(bs, OpFamily::Herk)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_node_is_herk() {
        let tree = build(&Blocksizes::default());
        assert!(tree.iter().all(|n| n.family() == OpFamily::Herk));
        tree.check(OpFamily::Herk).unwrap();
    }
}
