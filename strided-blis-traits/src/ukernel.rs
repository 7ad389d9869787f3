//! Micro-kernel contract.
//!
//! The engine reduces every level-3 operation to two fixed-shape kernels that
//! operate on packed micro-panels:
//!
//! - [`GemmMicroKernel`]: `C := alpha * A * B + beta * C` for an `mr x nr`
//!   tile, where `A` is an `mr x k` micro-panel stored column by column
//!   (`a[p * mr + i]`) and `B` is a `k x nr` micro-panel stored row by row
//!   (`b[p * nr + j]`).
//! - [`TrsmMicroKernel`]: solves an `mr x mr` triangular block against an
//!   `mr x nr` right-hand side in place, given a block whose diagonal already
//!   holds reciprocals.
//!
//! [`RefKernel`] is a portable implementation of both for every
//! [`Scalar`].

use std::sync::Arc;

use num_complex::{Complex32, Complex64};
use num_traits::Zero;

use crate::scalar::Scalar;

/// Largest register blocksize (MR or NR) a kernel is ever called with.
pub const MAX_REGISTER_BLOCK: usize = 16;

/// Addresses of the micro-panels the next kernel call will read.
///
/// Kernels may use them for prefetching; they are never dereferenced by the
/// reference kernel.
#[derive(Debug, Clone, Copy)]
pub struct AuxInfo<T> {
    pub next_a: *const T,
    pub next_b: *const T,
}

impl<T> Default for AuxInfo<T> {
    fn default() -> Self {
        Self {
            next_a: std::ptr::null(),
            next_b: std::ptr::null(),
        }
    }
}

/// Fixed-shape matrix multiply kernel.
pub trait GemmMicroKernel<T: Scalar>: Send + Sync {
    /// Compute `C := alpha * A * B + beta * C` on an `mr x nr` tile.
    ///
    /// When `beta` is zero, `C` is write-only and may hold NaN on entry.
    ///
    /// # Safety
    /// `a` must point to `k * mr` readable elements, `b` to `k * nr` readable
    /// elements, and every `c + i*rs_c + j*cs_c` for `i < mr`, `j < nr` must be
    /// writable. `mr` and `nr` must not exceed [`MAX_REGISTER_BLOCK`].
    #[allow(clippy::too_many_arguments)]
    unsafe fn gemm(
        &self,
        mr: usize,
        nr: usize,
        k: usize,
        alpha: T,
        a: *const T,
        b: *const T,
        beta: T,
        c: *mut T,
        rs_c: isize,
        cs_c: isize,
        aux: &AuxInfo<T>,
    );
}

/// Fixed-shape triangular solve kernel.
///
/// `a` is an `mr x mr` block stored column by column (`a[i + l * mr]`) whose
/// diagonal holds reciprocals of the original diagonal. `b` is the packed
/// `mr x nr` right-hand side (`b[i * nr + j]`). The solution overwrites `b`
/// and is also written to `c`.
pub trait TrsmMicroKernel<T: Scalar>: Send + Sync {
    /// Forward substitution with the lower triangle of `a`.
    ///
    /// # Safety
    /// Same pointer requirements as [`GemmMicroKernel::gemm`], with `a`
    /// spanning `mr * mr` elements and `b` spanning `mr * nr` elements.
    #[allow(clippy::too_many_arguments)]
    unsafe fn trsm_lower(
        &self,
        mr: usize,
        nr: usize,
        a: *const T,
        b: *mut T,
        c: *mut T,
        rs_c: isize,
        cs_c: isize,
    );

    /// Backward substitution with the upper triangle of `a`.
    ///
    /// # Safety
    /// See [`TrsmMicroKernel::trsm_lower`].
    #[allow(clippy::too_many_arguments)]
    unsafe fn trsm_upper(
        &self,
        mr: usize,
        nr: usize,
        a: *const T,
        b: *mut T,
        c: *mut T,
        rs_c: isize,
        cs_c: isize,
    );
}

/// Portable kernel used when no architecture-specific kernel is registered.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefKernel;

impl<T: Scalar> GemmMicroKernel<T> for RefKernel {
    unsafe fn gemm(
        &self,
        mr: usize,
        nr: usize,
        k: usize,
        alpha: T,
        a: *const T,
        b: *const T,
        beta: T,
        c: *mut T,
        rs_c: isize,
        cs_c: isize,
        _aux: &AuxInfo<T>,
    ) {
        debug_assert!(mr <= MAX_REGISTER_BLOCK && nr <= MAX_REGISTER_BLOCK);
        let mut ab = [T::zero(); MAX_REGISTER_BLOCK * MAX_REGISTER_BLOCK];

        for p in 0..k {
            let ap = a.add(p * mr);
            let bp = b.add(p * nr);
            for j in 0..nr {
                let bj = *bp.add(j);
                let col = &mut ab[j * mr..j * mr + mr];
                for (i, acc) in col.iter_mut().enumerate() {
                    *acc = *acc + *ap.add(i) * bj;
                }
            }
        }

        let beta_is_zero = beta.is_zero();
        for j in 0..nr {
            for i in 0..mr {
                let cij = c.offset(i as isize * rs_c + j as isize * cs_c);
                let v = alpha * ab[j * mr + i];
                *cij = if beta_is_zero { v } else { v + beta * *cij };
            }
        }
    }
}

impl<T: Scalar> TrsmMicroKernel<T> for RefKernel {
    unsafe fn trsm_lower(
        &self,
        mr: usize,
        nr: usize,
        a: *const T,
        b: *mut T,
        c: *mut T,
        rs_c: isize,
        cs_c: isize,
    ) {
        for i in 0..mr {
            let inv = *a.add(i + i * mr);
            for j in 0..nr {
                let mut acc = *b.add(i * nr + j);
                for l in 0..i {
                    acc = acc - *a.add(i + l * mr) * *b.add(l * nr + j);
                }
                let x = acc * inv;
                *b.add(i * nr + j) = x;
                *c.offset(i as isize * rs_c + j as isize * cs_c) = x;
            }
        }
    }

    unsafe fn trsm_upper(
        &self,
        mr: usize,
        nr: usize,
        a: *const T,
        b: *mut T,
        c: *mut T,
        rs_c: isize,
        cs_c: isize,
    ) {
        for i in (0..mr).rev() {
            let inv = *a.add(i + i * mr);
            for j in 0..nr {
                let mut acc = *b.add(i * nr + j);
                for l in i + 1..mr {
                    acc = acc - *a.add(i + l * mr) * *b.add(l * nr + j);
                }
                let x = acc * inv;
                *b.add(i * nr + j) = x;
                *c.offset(i as isize * rs_c + j as isize * cs_c) = x;
            }
        }
    }
}

/// The kernels registered for one datatype.
#[derive(Clone)]
pub struct Kernels<T: Scalar> {
    pub gemm: Arc<dyn GemmMicroKernel<T>>,
    pub trsm: Arc<dyn TrsmMicroKernel<T>>,
}

impl<T: Scalar> Kernels<T> {
    pub fn new(gemm: Arc<dyn GemmMicroKernel<T>>, trsm: Arc<dyn TrsmMicroKernel<T>>) -> Self {
        Self { gemm, trsm }
    }

    pub fn reference() -> Self {
        Self {
            gemm: Arc::new(RefKernel),
            trsm: Arc::new(RefKernel),
        }
    }
}

impl<T: Scalar> std::fmt::Debug for Kernels<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernels")
            .field("datatype", &T::DATATYPE)
            .finish_non_exhaustive()
    }
}

/// Kernels for all four datatypes.
#[derive(Debug, Clone)]
pub struct KernelSet {
    pub s: Kernels<f32>,
    pub d: Kernels<f64>,
    pub c: Kernels<Complex32>,
    pub z: Kernels<Complex64>,
}

impl KernelSet {
    pub fn reference() -> Self {
        Self {
            s: Kernels::reference(),
            d: Kernels::reference(),
            c: Kernels::reference(),
            z: Kernels::reference(),
        }
    }

    pub fn get<T: Scalar>(&self) -> &Kernels<T> {
        T::kernels(self)
    }
}

impl Default for KernelSet {
    fn default() -> Self {
        Self::reference()
    }
}
