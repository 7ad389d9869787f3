//! Control-tree driven level-3 linear algebra over strided matrix views.
//!
//! Every operation (`gemm`, `hemm`/`symm`, `herk`/`syrk`, `her2k`/`syr2k`,
//! `trsm`) is executed by walking a small tree of algorithm nodes. Each node
//! partitions one dimension by a cache blocksize, optionally packs an operand
//! into contiguous zero-padded micro-panels, and hands the sub-problem to its
//! child. Leaves call a fixed-shape micro-kernel.
//!
//! # Core Types
//!
//! - [`MatrixRef`] / [`MatrixMut`]: zero-copy strided matrix views carrying
//!   conjugation, structure (`Hermitian`, `Symmetric`, `Triangular`) and a
//!   diagonal offset
//! - [`BlockSize`] / [`Blocksizes`]: per-datatype cache and register blocksizes
//! - [`cntl::Node`]: one algorithm node of a control tree
//! - [`Config`] / [`Context`]: runtime configuration, owning the control
//!   trees, the micro-kernels and the thread pool
//!
//! # Example
//!
//! ```rust
//! use strided_blis::{gemm, Config, Context, MatrixMut, MatrixRef};
//!
//! let ctx = Context::new(Config::default().with_threads(1, 1, 1, 1)).unwrap();
//!
//! // 2x3 * 3x2, row-major storage
//! let a_data = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
//! let b_data = [7.0, 8.0, 9.0, 10.0, 11.0, 12.0];
//! let mut c_data = [0.0f64; 4];
//!
//! let a = MatrixRef::from_slice(&a_data, 2, 3, 3, 1).unwrap();
//! let b = MatrixRef::from_slice(&b_data, 3, 2, 2, 1).unwrap();
//! let mut c = MatrixMut::from_slice(&mut c_data, 2, 2, 2, 1).unwrap();
//!
//! gemm(&ctx, 1.0, &a, &b, 0.0, &mut c).unwrap();
//! assert_eq!(c_data, [58.0, 64.0, 139.0, 154.0]);
//! ```
//!
//! # Threading
//!
//! With the `parallel` feature (default), a [`Context`] owns a fixed-size
//! rayon pool sized by its [`ThreadLayout`]. Every operation runs SPMD on all
//! pool threads; each thread carries a [`thread::Gang`] handle that tells it
//! which slice of every partitioned loop it owns. Results do not depend on the
//! thread layout.

pub mod blksz;
mod check;
pub mod cntl;
pub mod compat;
mod config;
mod driver;
mod level3;
pub mod packm;
pub mod thread;
pub mod view;

pub use strided_blis_traits::{
    AuxInfo, Datatype, GemmMicroKernel, KernelSet, Kernels, RefKernel, Scalar, TrsmMicroKernel,
    MAX_REGISTER_BLOCK,
};

// ============================================================================
// Configuration
// ============================================================================
pub use blksz::{BlockSize, Blocksizes};
pub use config::{Config, Context, ThreadLayout};

// ============================================================================
// Views
// ============================================================================
pub use view::{Diag, MatrixMut, MatrixRef, Structure, Uplo};

// ============================================================================
// Level-3 operations
// ============================================================================
pub use level3::{
    gemm, gemm_with_cntl, hemm, her2k, herk, symm, syr2k, syrk, trsm, trsm_with_cntl, Side,
};

// ============================================================================
// Error types
// ============================================================================

/// Errors reported before an operation starts executing.
///
/// Once argument checking has passed, execution itself cannot fail.
#[derive(Debug, thiserror::Error)]
pub enum BlisError {
    /// Operand extents are not conformal for the operation.
    #[error("dimension mismatch in {op}: {detail}")]
    DimensionMismatch { op: &'static str, detail: String },

    /// Matrix is not square when a square matrix was required.
    #[error("non-square matrix: rows={rows}, cols={cols}")]
    NonSquare { rows: usize, cols: usize },

    /// Operand structure does not fit the operation.
    #[error("invalid structure: {0}")]
    InvalidStructure(String),

    /// Control tree is malformed or belongs to another operation family.
    #[error("invalid control tree: {0}")]
    InvalidControlTree(String),

    /// Configured combination exists in the tree vocabulary but has no
    /// implementation.
    #[error("not yet implemented: {0}")]
    NotYetImplemented(String),

    /// View would reach memory outside its backing slice.
    #[error("offset overflow while computing pointer")]
    OffsetOverflow,

    /// Legacy character flag could not be parsed.
    #[error("invalid {param} flag '{flag}'")]
    InvalidFlag { param: &'static str, flag: char },

    /// Blocksizes or thread layout are inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The worker pool could not be created.
    #[error("thread pool: {0}")]
    ThreadPool(String),
}

impl BlisError {
    /// Stable negative diagnostic code, one per variant.
    pub fn code(&self) -> i32 {
        match self {
            BlisError::DimensionMismatch { .. } => -10,
            BlisError::NonSquare { .. } => -11,
            BlisError::InvalidStructure(_) => -12,
            BlisError::InvalidControlTree(_) => -13,
            BlisError::NotYetImplemented(_) => -14,
            BlisError::OffsetOverflow => -15,
            BlisError::InvalidFlag { .. } => -16,
            BlisError::InvalidConfig(_) => -17,
            BlisError::ThreadPool(_) => -18,
        }
    }
}

#[cfg(feature = "parallel")]
impl From<rayon::ThreadPoolBuildError> for BlisError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        BlisError::ThreadPool(err.to_string())
    }
}

/// Result type for level-3 operations.
pub type Result<T> = std::result::Result<T, BlisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_distinct() {
        let errs = [
            BlisError::DimensionMismatch {
                op: "gemm",
                detail: String::new(),
            },
            BlisError::NonSquare { rows: 2, cols: 3 },
            BlisError::InvalidStructure(String::new()),
            BlisError::InvalidControlTree(String::new()),
            BlisError::NotYetImplemented(String::new()),
            BlisError::OffsetOverflow,
            BlisError::InvalidFlag {
                param: "trans",
                flag: 'x',
            },
            BlisError::InvalidConfig(String::new()),
            BlisError::ThreadPool(String::new()),
        ];
        let mut codes: Vec<i32> = errs.iter().map(|e| e.code()).collect();
        assert!(codes.iter().all(|&c| c < 0));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errs.len());
    }

    #[test]
    fn test_error_display() {
        let err = BlisError::NonSquare { rows: 2, cols: 3 };
        assert_eq!(err.to_string(), "non-square matrix: rows=2, cols=3");
    }
}
