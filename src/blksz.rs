//! Blocksize descriptors.
//!
//! A [`BlockSize`] stores one positive value per datatype. Descriptors are
//! immutable once built and are shared between control-tree nodes through
//! `Arc`, so a descriptor lives exactly as long as the last node (or
//! [`Blocksizes`] set) that references it.

use std::sync::Arc;

use strided_blis_traits::{Datatype, MAX_REGISTER_BLOCK};

use crate::{BlisError, Result};

/// One blocksize per datatype.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSize {
    s: usize,
    d: usize,
    c: usize,
    z: usize,
}

impl BlockSize {
    /// Create a descriptor; every value must be positive.
    pub fn new(s: usize, d: usize, c: usize, z: usize) -> Result<Self> {
        if [s, d, c, z].contains(&0) {
            return Err(BlisError::InvalidConfig(format!(
                "blocksize must be positive, got s={s} d={d} c={c} z={z}"
            )));
        }
        Ok(Self { s, d, c, z })
    }

    /// The same value for every datatype.
    pub fn uniform(b: usize) -> Result<Self> {
        Self::new(b, b, b, b)
    }

    #[inline]
    pub fn get(&self, dt: Datatype) -> usize {
        match dt {
            Datatype::Float => self.s,
            Datatype::Double => self.d,
            Datatype::SComplex => self.c,
            Datatype::DComplex => self.z,
        }
    }

    /// Largest value over all datatypes.
    pub fn max(&self) -> usize {
        Datatype::ALL
            .iter()
            .map(|&dt| self.get(dt))
            .max()
            .unwrap_or(0)
    }

    fn values(&self) -> [(Datatype, usize); 4] {
        [
            (Datatype::Float, self.s),
            (Datatype::Double, self.d),
            (Datatype::SComplex, self.c),
            (Datatype::DComplex, self.z),
        ]
    }
}

/// The full set of blocksizes one control tree family is built from.
///
/// - `mr`, `nr`: register blocksizes (micro-tile shape)
/// - `kr`: granularity of the k dimension inside a micro-panel
/// - `mc`, `kc`, `nc`: cache blocksizes for the m, k and n loops
#[derive(Debug, Clone)]
pub struct Blocksizes {
    pub mr: Arc<BlockSize>,
    pub nr: Arc<BlockSize>,
    pub kr: Arc<BlockSize>,
    pub mc: Arc<BlockSize>,
    pub kc: Arc<BlockSize>,
    pub nc: Arc<BlockSize>,
}

impl Blocksizes {
    pub fn new(
        mr: BlockSize,
        nr: BlockSize,
        kr: BlockSize,
        mc: BlockSize,
        kc: BlockSize,
        nc: BlockSize,
    ) -> Result<Self> {
        let set = Self {
            mr: Arc::new(mr),
            nr: Arc::new(nr),
            kr: Arc::new(kr),
            mc: Arc::new(mc),
            kc: Arc::new(kc),
            nc: Arc::new(nc),
        };
        set.validate()?;
        Ok(set)
    }

    /// Check the divisibility rules the packing and kernel layers rely on.
    pub fn validate(&self) -> Result<()> {
        for (dt, mr) in self.mr.values() {
            let nr = self.nr.get(dt);
            let kr = self.kr.get(dt);
            let (mc, kc, nc) = (self.mc.get(dt), self.kc.get(dt), self.nc.get(dt));
            let p = dt.prefix();
            if mr > MAX_REGISTER_BLOCK || nr > MAX_REGISTER_BLOCK {
                return Err(BlisError::InvalidConfig(format!(
                    "{p}: register blocksize {mr}x{nr} exceeds {MAX_REGISTER_BLOCK}"
                )));
            }
            if mc % mr != 0 {
                return Err(BlisError::InvalidConfig(format!(
                    "{p}: mc={mc} is not a multiple of mr={mr}"
                )));
            }
            if nc % nr != 0 {
                return Err(BlisError::InvalidConfig(format!(
                    "{p}: nc={nc} is not a multiple of nr={nr}"
                )));
            }
            if kc % kr != 0 {
                return Err(BlisError::InvalidConfig(format!(
                    "{p}: kc={kc} is not a multiple of kr={kr}"
                )));
            }
        }
        Ok(())
    }
}

impl Default for Blocksizes {
    fn default() -> Self {
        let bs = |s, d, c, z| Arc::new(BlockSize { s, d, c, z });
        Self {
            mr: bs(8, 8, 4, 4),
            nr: bs(8, 4, 4, 4),
            kr: bs(1, 1, 1, 1),
            mc: bs(128, 96, 64, 64),
            kc: bs(256, 256, 192, 128),
            nc: bs(4096, 4096, 2048, 2048),
        }
    }
}

/// Round `x` up to the next multiple of `b`.
#[inline]
pub(crate) fn round_up(x: usize, b: usize) -> usize {
    x.div_ceil(b) * b
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_by_datatype() {
        let b = BlockSize::new(1, 2, 3, 4).unwrap();
        assert_eq!(b.get(Datatype::Float), 1);
        assert_eq!(b.get(Datatype::Double), 2);
        assert_eq!(b.get(Datatype::SComplex), 3);
        assert_eq!(b.get(Datatype::DComplex), 4);
    }

    #[test]
    fn test_zero_rejected() {
        assert!(matches!(
            BlockSize::new(4, 0, 4, 4),
            Err(BlisError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_default_is_valid() {
        Blocksizes::default().validate().unwrap();
    }

    #[test]
    fn test_mc_must_be_multiple_of_mr() {
        let u = |b| BlockSize::uniform(b).unwrap();
        let err = Blocksizes::new(u(4), u(4), u(1), u(10), u(16), u(16)).unwrap_err();
        assert!(err.to_string().contains("mc=10"));
    }

    #[test]
    fn test_register_block_limit() {
        let u = |b| BlockSize::uniform(b).unwrap();
        assert!(Blocksizes::new(u(32), u(4), u(1), u(32), u(16), u(16)).is_err());
    }

    #[test]
    fn test_shared_descriptor_lifetime() {
        let set = Blocksizes::default();
        let held = Arc::clone(&set.mr);
        assert_eq!(Arc::strong_count(&held), 2);
        drop(set);
        assert_eq!(Arc::strong_count(&held), 1);
        assert_eq!(held.get(Datatype::Double), 8);
    }

    #[test]
    fn test_round_up() {
        assert_eq!(round_up(0, 4), 0);
        assert_eq!(round_up(5, 4), 8);
        assert_eq!(round_up(8, 4), 8);
    }
}
