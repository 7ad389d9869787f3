//! Object-level entry points.
//!
//! Each operation checks its arguments, reduces itself to a left-sided
//! problem over the gemm, herk or trsm control tree, and runs the tree SPMD on
//! the context's workers. After the checks pass, execution cannot fail.

use strided_blis_traits::Scalar;

use crate::check;
use crate::cntl::{Node, OpFamily};
use crate::config::Context;
use crate::driver::{self, Operand, PackGang};
use crate::thread::build_gangs;
use crate::view::{MatrixMut, MatrixRef, Structure};
use crate::Result;

/// Side of the structured operand in `hemm`/`symm` and `trsm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// `C := alpha * A * B + beta * C`.
///
/// With `beta == 0`, C is write-only: NaN or Inf in C do not propagate.
pub fn gemm<T: Scalar>(
    ctx: &Context,
    alpha: T,
    a: &MatrixRef<'_, T>,
    b: &MatrixRef<'_, T>,
    beta: T,
    c: &mut MatrixMut<'_, T>,
) -> Result<()> {
    gemm_with_cntl(ctx, ctx.trees().gemm(), alpha, a, b, beta, c)
}

/// [`gemm`] under a caller-supplied control tree.
pub fn gemm_with_cntl<T: Scalar>(
    ctx: &Context,
    tree: &Node,
    alpha: T,
    a: &MatrixRef<'_, T>,
    b: &MatrixRef<'_, T>,
    beta: T,
    c: &mut MatrixMut<'_, T>,
) -> Result<()> {
    let _span = tracing::debug_span!("gemm", m = c.rows(), n = c.cols(), k = a.cols()).entered();
    check::gemm_dims("gemm", a, b, c)?;
    tree.check(OpFamily::Gemm)?;
    run_gemm(ctx, tree, alpha, a, b, beta, c);
    Ok(())
}

/// `C := alpha * A * B + beta * C` (left) or `C := alpha * B * A + beta * C`
/// (right) with A Hermitian; only A's stored triangle is read.
pub fn hemm<T: Scalar>(
    ctx: &Context,
    side: Side,
    alpha: T,
    a: &MatrixRef<'_, T>,
    b: &MatrixRef<'_, T>,
    beta: T,
    c: &mut MatrixMut<'_, T>,
) -> Result<()> {
    structured_mm(ctx, "hemm", Structure::Hermitian, side, alpha, a, b, beta, c)
}

/// [`hemm`] with A symmetric.
pub fn symm<T: Scalar>(
    ctx: &Context,
    side: Side,
    alpha: T,
    a: &MatrixRef<'_, T>,
    b: &MatrixRef<'_, T>,
    beta: T,
    c: &mut MatrixMut<'_, T>,
) -> Result<()> {
    structured_mm(ctx, "symm", Structure::Symmetric, side, alpha, a, b, beta, c)
}

#[allow(clippy::too_many_arguments)]
fn structured_mm<T: Scalar>(
    ctx: &Context,
    op: &'static str,
    expected: Structure,
    side: Side,
    alpha: T,
    a: &MatrixRef<'_, T>,
    b: &MatrixRef<'_, T>,
    beta: T,
    c: &mut MatrixMut<'_, T>,
) -> Result<()> {
    let _span =
        tracing::debug_span!("structured_mm", op, ?side, m = c.rows(), n = c.cols()).entered();
    check::square(a)?;
    check::structure(ctx.config().error_checking, op, "A", expected, a.structure())?;
    let tree = ctx.trees().gemm();
    tree.check(OpFamily::Gemm)?;
    match side {
        Side::Left => {
            check::gemm_dims(op, a, b, c)?;
            run_gemm(ctx, tree, alpha, a, b, beta, c);
        }
        Side::Right => {
            // C^T = A^T * B^T
            let (at, bt) = (a.t(), b.t());
            let mut ct = c.t();
            check::gemm_dims(op, &at, &bt, &ct)?;
            run_gemm(ctx, tree, alpha, &at, &bt, beta, &mut ct);
        }
    }
    Ok(())
}

/// `C := alpha * A * A^H + beta * C`, updating only C's stored triangle.
///
/// C must be marked Hermitian; the imaginary parts of its diagonal are
/// zeroed.
pub fn herk<T: Scalar>(
    ctx: &Context,
    alpha: T::Real,
    a: &MatrixRef<'_, T>,
    beta: T::Real,
    c: &mut MatrixMut<'_, T>,
) -> Result<()> {
    rank_k(
        ctx,
        "herk",
        Structure::Hermitian,
        &[(T::from_real(alpha), *a, a.h())],
        T::from_real(beta),
        c,
    )
}

/// `C := alpha * A * A^T + beta * C`, updating only C's stored triangle.
pub fn syrk<T: Scalar>(
    ctx: &Context,
    alpha: T,
    a: &MatrixRef<'_, T>,
    beta: T,
    c: &mut MatrixMut<'_, T>,
) -> Result<()> {
    rank_k(ctx, "syrk", Structure::Symmetric, &[(alpha, *a, a.t())], beta, c)
}

/// `C := alpha * A * B^H + conj(alpha) * B * A^H + beta * C`.
pub fn her2k<T: Scalar>(
    ctx: &Context,
    alpha: T,
    a: &MatrixRef<'_, T>,
    b: &MatrixRef<'_, T>,
    beta: T::Real,
    c: &mut MatrixMut<'_, T>,
) -> Result<()> {
    rank_k(
        ctx,
        "her2k",
        Structure::Hermitian,
        &[(alpha, *a, b.h()), (alpha.conj(), *b, a.h())],
        T::from_real(beta),
        c,
    )
}

/// `C := alpha * A * B^T + alpha * B * A^T + beta * C`.
pub fn syr2k<T: Scalar>(
    ctx: &Context,
    alpha: T,
    a: &MatrixRef<'_, T>,
    b: &MatrixRef<'_, T>,
    beta: T,
    c: &mut MatrixMut<'_, T>,
) -> Result<()> {
    rank_k(
        ctx,
        "syr2k",
        Structure::Symmetric,
        &[(alpha, *a, b.t()), (alpha, *b, a.t())],
        beta,
        c,
    )
}

/// Apply every `(alpha, A, B)` pass to C through the herk tree; beta applies
/// to the first pass only.
fn rank_k<T: Scalar>(
    ctx: &Context,
    op: &'static str,
    expected: Structure,
    passes: &[(T, MatrixRef<'_, T>, MatrixRef<'_, T>)],
    beta: T,
    c: &mut MatrixMut<'_, T>,
) -> Result<()> {
    let k = passes.first().map_or(0, |(_, a, _)| a.cols());
    let _span = tracing::debug_span!("rank_k", op, n = c.rows(), k).entered();
    check::square_out(c)?;
    check::structure(ctx.config().error_checking, op, "C", expected, c.structure())?;
    for (_, a, b) in passes {
        check::gemm_dims(op, a, b, c)?;
    }
    let tree = ctx.trees().herk();
    tree.check(OpFamily::Herk)?;

    for (pass, (alpha, a, b)) in passes.iter().enumerate() {
        let beta = if pass == 0 { beta } else { T::one() };
        run_gemm(ctx, tree, *alpha, a, b, beta, c);
    }
    if c.structure() == Structure::Hermitian {
        for i in 0..c.rows() {
            let v = c.get(i, i).real_only();
            c.set(i, i, v);
        }
    }
    Ok(())
}

/// Solve `A * X = alpha * B` (left) or `X * A = alpha * B` (right) for X,
/// overwriting B. A must be marked triangular.
pub fn trsm<T: Scalar>(
    ctx: &Context,
    side: Side,
    alpha: T,
    a: &MatrixRef<'_, T>,
    b: &mut MatrixMut<'_, T>,
) -> Result<()> {
    trsm_with_cntl(ctx, ctx.trees().trsm(), side, alpha, a, b)
}

/// [`trsm`] under a caller-supplied control tree.
pub fn trsm_with_cntl<T: Scalar>(
    ctx: &Context,
    tree: &Node,
    side: Side,
    alpha: T,
    a: &MatrixRef<'_, T>,
    b: &mut MatrixMut<'_, T>,
) -> Result<()> {
    let _span = tracing::debug_span!("trsm", ?side, m = b.rows(), n = b.cols()).entered();
    check::structure(
        ctx.config().error_checking,
        "trsm",
        "A",
        Structure::Triangular,
        a.structure(),
    )?;
    tree.check(OpFamily::Trsm)?;
    match side {
        Side::Left => {
            check::trsm_dims(a, b)?;
            run_trsm(ctx, tree, alpha, a, b);
        }
        Side::Right => {
            // A^T * X^T = alpha * B^T
            let at = a.t();
            let mut bt = b.t();
            check::trsm_dims(&at, &bt)?;
            run_trsm(ctx, tree, alpha, &at, &mut bt);
        }
    }
    Ok(())
}

fn run_gemm<T: Scalar>(
    ctx: &Context,
    tree: &Node,
    alpha: T,
    a: &MatrixRef<'_, T>,
    b: &MatrixRef<'_, T>,
    beta: T,
    c: &mut MatrixMut<'_, T>,
) {
    if c.is_empty() {
        return;
    }
    if a.cols() == 0 || alpha.is_zero() {
        driver::scalm(beta, c);
        return;
    }
    let gangs: Vec<PackGang<T>> = build_gangs(&ctx.config().threads.ways());
    let kernels = ctx.kernels::<T>();
    let (a, b) = (Operand::View(*a), Operand::View(*b));
    let c = &*c;
    ctx.workers().distribute(&gangs, |gang| {
        driver::execute(alpha, &a, &b, beta, c, tree, gang, kernels)
    });
}

fn run_trsm<T: Scalar>(ctx: &Context, tree: &Node, alpha: T, a: &MatrixRef<'_, T>, b: &mut MatrixMut<'_, T>) {
    if b.is_empty() {
        return;
    }
    if alpha.is_zero() {
        driver::scalm(T::zero(), b);
        return;
    }
    // Right-hand sides are independent; every thread takes its own columns.
    let gangs: Vec<PackGang<T>> = build_gangs(&[ctx.config().threads.total()]);
    let kernels = ctx.kernels::<T>();
    let b = &*b;
    ctx.workers().distribute(&gangs, |gang| {
        driver::execute_trsm(alpha, a, b, tree, gang, kernels)
    });
}
