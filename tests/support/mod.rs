//! Shared helpers: seeded operands and naive reference loops.

#![allow(dead_code)]

use num_complex::{Complex32, Complex64};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::StandardNormal;
use strided_blis::{BlockSize, Blocksizes, Config, Context, MatrixRef, Scalar};

/// Element types the tests draw random operands for.
pub trait Sample: Scalar {
    fn sample(rng: &mut StdRng) -> Self;
    /// Relative accuracy expected of one multiply-add.
    const EPS: f64;
}

impl Sample for f32 {
    fn sample(rng: &mut StdRng) -> Self {
        rng.sample::<f32, _>(StandardNormal)
    }
    const EPS: f64 = 1e-6;
}

impl Sample for f64 {
    fn sample(rng: &mut StdRng) -> Self {
        rng.sample::<f64, _>(StandardNormal)
    }
    const EPS: f64 = 1e-15;
}

impl Sample for Complex32 {
    fn sample(rng: &mut StdRng) -> Self {
        Complex32::new(rng.sample(StandardNormal), rng.sample(StandardNormal))
    }
    const EPS: f64 = 1e-6;
}

impl Sample for Complex64 {
    fn sample(rng: &mut StdRng) -> Self {
        Complex64::new(rng.sample(StandardNormal), rng.sample(StandardNormal))
    }
    const EPS: f64 = 1e-15;
}

pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

pub fn random_vec<T: Sample>(rng: &mut StdRng, len: usize) -> Vec<T> {
    (0..len).map(|_| T::sample(rng)).collect()
}

/// Small blocksizes so that modest extents cross every blocking boundary.
pub fn small_blocksizes() -> Blocksizes {
    let u = |b| BlockSize::uniform(b).unwrap();
    Blocksizes::new(u(4), u(4), u(1), u(8), u(8), u(12)).unwrap()
}

pub fn small_context(jc: usize, ic: usize, jr: usize, ir: usize) -> Context {
    Context::new(
        Config::default()
            .with_blocksizes(small_blocksizes())
            .with_threads(jc, ic, jr, ir),
    )
    .unwrap()
}

/// Dense column-major `alpha * A * B + beta * C` over the logical operands.
pub fn ref_gemm<T: Scalar>(alpha: T, a: &MatrixRef<'_, T>, b: &MatrixRef<'_, T>, beta: T, c: &[T]) -> Vec<T> {
    let (m, n, k) = (a.rows(), b.cols(), a.cols());
    let mut out = vec![T::zero(); m * n];
    for j in 0..n {
        for i in 0..m {
            let mut acc = T::zero();
            for p in 0..k {
                acc = acc + a.get(i, p) * b.get(p, j);
            }
            let v = alpha * acc;
            out[i + j * m] = if beta.is_zero() { v } else { v + beta * c[i + j * m] };
        }
    }
    out
}

pub fn max_abs<T: Scalar>(m: &MatrixRef<'_, T>) -> f64 {
    m.to_dense_col_major()
        .iter()
        .map(|v| v.abs1())
        .fold(0.0, f64::max)
}

/// Tolerance for a k-term product of operands bounded by `amax` and `bmax`.
pub fn tolerance<T: Sample>(k: usize, amax: f64, bmax: f64) -> f64 {
    16.0 * T::EPS * (k.max(1) as f64) * amax.max(1.0) * bmax.max(1.0)
}

#[track_caller]
pub fn assert_close<T: Scalar>(got: T, expected: T, tol: f64) {
    let err = (got - expected).abs1();
    assert!(
        err <= tol,
        "got {got:?}, expected {expected:?} (error {err:e} > {tol:e})"
    );
}
