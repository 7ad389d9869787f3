//! BLAS-style adapters over flat column-major arrays.
//!
//! Each adapter parses its character flags, wraps the arrays in strided views
//! (row stride 1, column stride = leading dimension) and forwards to the
//! object-level operation. Leading dimensions smaller than the stored row
//! count are rejected.

use strided_blis_traits::Scalar;

use crate::config::Context;
use crate::level3::{self, Side};
use crate::view::{Diag, MatrixMut, MatrixRef, Uplo};
use crate::{BlisError, Result};

/// Operation applied to an operand before use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trans {
    NoTrans,
    Trans,
    ConjTrans,
}

impl Trans {
    pub fn from_char(c: char) -> Result<Self> {
        match c.to_ascii_uppercase() {
            'N' => Ok(Trans::NoTrans),
            'T' => Ok(Trans::Trans),
            'C' => Ok(Trans::ConjTrans),
            _ => Err(BlisError::InvalidFlag {
                param: "trans",
                flag: c,
            }),
        }
    }

    pub fn to_char(self) -> char {
        match self {
            Trans::NoTrans => 'N',
            Trans::Trans => 'T',
            Trans::ConjTrans => 'C',
        }
    }

    fn is_trans(self) -> bool {
        self != Trans::NoTrans
    }

    fn apply<'a, T: Scalar>(self, v: MatrixRef<'a, T>) -> MatrixRef<'a, T> {
        match self {
            Trans::NoTrans => v,
            Trans::Trans => v.t(),
            Trans::ConjTrans => v.h(),
        }
    }
}

impl Side {
    pub fn from_char(c: char) -> Result<Self> {
        match c.to_ascii_uppercase() {
            'L' => Ok(Side::Left),
            'R' => Ok(Side::Right),
            _ => Err(BlisError::InvalidFlag {
                param: "side",
                flag: c,
            }),
        }
    }

    pub fn to_char(self) -> char {
        match self {
            Side::Left => 'L',
            Side::Right => 'R',
        }
    }
}

impl Uplo {
    pub fn from_char(c: char) -> Result<Self> {
        match c.to_ascii_uppercase() {
            'U' => Ok(Uplo::Upper),
            'L' => Ok(Uplo::Lower),
            _ => Err(BlisError::InvalidFlag {
                param: "uplo",
                flag: c,
            }),
        }
    }

    pub fn to_char(self) -> char {
        match self {
            Uplo::Upper => 'U',
            Uplo::Lower => 'L',
        }
    }
}

impl Diag {
    pub fn from_char(c: char) -> Result<Self> {
        match c.to_ascii_uppercase() {
            'N' => Ok(Diag::NonUnit),
            'U' => Ok(Diag::Unit),
            _ => Err(BlisError::InvalidFlag {
                param: "diag",
                flag: c,
            }),
        }
    }

    pub fn to_char(self) -> char {
        match self {
            Diag::NonUnit => 'N',
            Diag::Unit => 'U',
        }
    }
}

fn check_ld(op: &'static str, name: &str, ld: usize, rows: usize) -> Result<()> {
    if ld < rows.max(1) {
        return Err(BlisError::DimensionMismatch {
            op,
            detail: format!("{name}={ld} is smaller than max(1, {rows})"),
        });
    }
    Ok(())
}

fn col_major<'a, T: Scalar>(
    op: &'static str,
    name: &str,
    data: &'a [T],
    rows: usize,
    cols: usize,
    ld: usize,
) -> Result<MatrixRef<'a, T>> {
    check_ld(op, name, ld, rows)?;
    MatrixRef::from_slice(data, rows, cols, 1, ld as isize)
}

fn col_major_mut<'a, T: Scalar>(
    op: &'static str,
    name: &str,
    data: &'a mut [T],
    rows: usize,
    cols: usize,
    ld: usize,
) -> Result<MatrixMut<'a, T>> {
    check_ld(op, name, ld, rows)?;
    MatrixMut::from_slice(data, rows, cols, 1, ld as isize)
}

/// Stored extents of an operand whose `trans`-applied shape is `rows x cols`.
fn stored_dims(trans: Trans, rows: usize, cols: usize) -> (usize, usize) {
    if trans.is_trans() {
        (cols, rows)
    } else {
        (rows, cols)
    }
}

/// `C := alpha * op(A) * op(B) + beta * C`.
#[allow(clippy::too_many_arguments)]
pub fn gemm<T: Scalar>(
    ctx: &Context,
    transa: char,
    transb: char,
    m: usize,
    n: usize,
    k: usize,
    alpha: T,
    a: &[T],
    lda: usize,
    b: &[T],
    ldb: usize,
    beta: T,
    c: &mut [T],
    ldc: usize,
) -> Result<()> {
    let (ta, tb) = (Trans::from_char(transa)?, Trans::from_char(transb)?);
    let (ar, ac) = stored_dims(ta, m, k);
    let (br, bc) = stored_dims(tb, k, n);
    let a = ta.apply(col_major("gemm", "lda", a, ar, ac, lda)?);
    let b = tb.apply(col_major("gemm", "ldb", b, br, bc, ldb)?);
    let mut c = col_major_mut("gemm", "ldc", c, m, n, ldc)?;
    level3::gemm(ctx, alpha, &a, &b, beta, &mut c)
}

/// `C := alpha * A * B + beta * C` or `C := alpha * B * A + beta * C`, A
/// symmetric with its `uplo` triangle stored.
#[allow(clippy::too_many_arguments)]
pub fn symm<T: Scalar>(
    ctx: &Context,
    side: char,
    uplo: char,
    m: usize,
    n: usize,
    alpha: T,
    a: &[T],
    lda: usize,
    b: &[T],
    ldb: usize,
    beta: T,
    c: &mut [T],
    ldc: usize,
) -> Result<()> {
    let (side, uplo) = (Side::from_char(side)?, Uplo::from_char(uplo)?);
    let ka = if side == Side::Left { m } else { n };
    let a = col_major("symm", "lda", a, ka, ka, lda)?.symmetric(uplo)?;
    let b = col_major("symm", "ldb", b, m, n, ldb)?;
    let mut c = col_major_mut("symm", "ldc", c, m, n, ldc)?;
    level3::symm(ctx, side, alpha, &a, &b, beta, &mut c)
}

/// [`symm`] with A Hermitian.
#[allow(clippy::too_many_arguments)]
pub fn hemm<T: Scalar>(
    ctx: &Context,
    side: char,
    uplo: char,
    m: usize,
    n: usize,
    alpha: T,
    a: &[T],
    lda: usize,
    b: &[T],
    ldb: usize,
    beta: T,
    c: &mut [T],
    ldc: usize,
) -> Result<()> {
    let (side, uplo) = (Side::from_char(side)?, Uplo::from_char(uplo)?);
    let ka = if side == Side::Left { m } else { n };
    let a = col_major("hemm", "lda", a, ka, ka, lda)?.hermitian(uplo)?;
    let b = col_major("hemm", "ldb", b, m, n, ldb)?;
    let mut c = col_major_mut("hemm", "ldc", c, m, n, ldc)?;
    level3::hemm(ctx, side, alpha, &a, &b, beta, &mut c)
}

/// `C := alpha * A * A^T + beta * C` (`trans = 'N'`) or
/// `C := alpha * A^T * A + beta * C` (`trans = 'T'`).
#[allow(clippy::too_many_arguments)]
pub fn syrk<T: Scalar>(
    ctx: &Context,
    uplo: char,
    trans: char,
    n: usize,
    k: usize,
    alpha: T,
    a: &[T],
    lda: usize,
    beta: T,
    c: &mut [T],
    ldc: usize,
) -> Result<()> {
    let (uplo, t) = (Uplo::from_char(uplo)?, rank_k_trans("syrk", trans, Trans::Trans)?);
    let (ar, ac) = stored_dims(t, n, k);
    let a = t.apply(col_major("syrk", "lda", a, ar, ac, lda)?);
    let mut c = col_major_mut("syrk", "ldc", c, n, n, ldc)?.symmetric(uplo)?;
    level3::syrk(ctx, alpha, &a, beta, &mut c)
}

/// `C := alpha * A * A^H + beta * C` (`trans = 'N'`) or
/// `C := alpha * A^H * A + beta * C` (`trans = 'C'`).
#[allow(clippy::too_many_arguments)]
pub fn herk<T: Scalar>(
    ctx: &Context,
    uplo: char,
    trans: char,
    n: usize,
    k: usize,
    alpha: T::Real,
    a: &[T],
    lda: usize,
    beta: T::Real,
    c: &mut [T],
    ldc: usize,
) -> Result<()> {
    let (uplo, t) = (Uplo::from_char(uplo)?, rank_k_trans("herk", trans, Trans::ConjTrans)?);
    let (ar, ac) = stored_dims(t, n, k);
    let a = t.apply(col_major("herk", "lda", a, ar, ac, lda)?);
    let mut c = col_major_mut("herk", "ldc", c, n, n, ldc)?.hermitian(uplo)?;
    level3::herk(ctx, alpha, &a, beta, &mut c)
}

/// `C := alpha * A * B^T + alpha * B * A^T + beta * C`, or the transposed
/// form with `trans = 'T'`.
#[allow(clippy::too_many_arguments)]
pub fn syr2k<T: Scalar>(
    ctx: &Context,
    uplo: char,
    trans: char,
    n: usize,
    k: usize,
    alpha: T,
    a: &[T],
    lda: usize,
    b: &[T],
    ldb: usize,
    beta: T,
    c: &mut [T],
    ldc: usize,
) -> Result<()> {
    let (uplo, t) = (Uplo::from_char(uplo)?, rank_k_trans("syr2k", trans, Trans::Trans)?);
    let (r, cc) = stored_dims(t, n, k);
    let a = t.apply(col_major("syr2k", "lda", a, r, cc, lda)?);
    let b = t.apply(col_major("syr2k", "ldb", b, r, cc, ldb)?);
    let mut c = col_major_mut("syr2k", "ldc", c, n, n, ldc)?.symmetric(uplo)?;
    level3::syr2k(ctx, alpha, &a, &b, beta, &mut c)
}

/// `C := alpha * A * B^H + conj(alpha) * B * A^H + beta * C`, or the
/// conjugate-transposed form with `trans = 'C'`.
#[allow(clippy::too_many_arguments)]
pub fn her2k<T: Scalar>(
    ctx: &Context,
    uplo: char,
    trans: char,
    n: usize,
    k: usize,
    alpha: T,
    a: &[T],
    lda: usize,
    b: &[T],
    ldb: usize,
    beta: T::Real,
    c: &mut [T],
    ldc: usize,
) -> Result<()> {
    let (uplo, t) = (Uplo::from_char(uplo)?, rank_k_trans("her2k", trans, Trans::ConjTrans)?);
    let (r, cc) = stored_dims(t, n, k);
    let a = t.apply(col_major("her2k", "lda", a, r, cc, lda)?);
    let b = t.apply(col_major("her2k", "ldb", b, r, cc, ldb)?);
    let mut c = col_major_mut("her2k", "ldc", c, n, n, ldc)?.hermitian(uplo)?;
    level3::her2k(ctx, alpha, &a, &b, beta, &mut c)
}

/// Solve `op(A) * X = alpha * B` or `X * op(A) = alpha * B`, overwriting B.
#[allow(clippy::too_many_arguments)]
pub fn trsm<T: Scalar>(
    ctx: &Context,
    side: char,
    uplo: char,
    transa: char,
    diag: char,
    m: usize,
    n: usize,
    alpha: T,
    a: &[T],
    lda: usize,
    b: &mut [T],
    ldb: usize,
) -> Result<()> {
    let side = Side::from_char(side)?;
    let uplo = Uplo::from_char(uplo)?;
    let ta = Trans::from_char(transa)?;
    let diag = Diag::from_char(diag)?;
    let ka = if side == Side::Left { m } else { n };
    let a = ta.apply(col_major("trsm", "lda", a, ka, ka, lda)?.triangular(uplo, diag));
    let mut b = col_major_mut("trsm", "ldb", b, m, n, ldb)?;
    level3::trsm(ctx, side, alpha, &a, &mut b)
}

/// Parse the `trans` flag of a rank-k update; `allowed` is the one
/// transposition the operation accepts besides `'N'`.
fn rank_k_trans(op: &'static str, flag: char, allowed: Trans) -> Result<Trans> {
    match Trans::from_char(flag)? {
        Trans::NoTrans => Ok(Trans::NoTrans),
        t if t == allowed => Ok(t),
        _ => Err(BlisError::InvalidFlag {
            param: op_trans_param(op),
            flag,
        }),
    }
}

fn op_trans_param(op: &'static str) -> &'static str {
    match op {
        "herk" | "her2k" => "trans (expected N or C)",
        _ => "trans (expected N or T)",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_round_trip() {
        for c in ['N', 'T', 'C'] {
            assert_eq!(Trans::from_char(c).unwrap().to_char(), c);
        }
        assert_eq!(Trans::from_char('t').unwrap(), Trans::Trans);
        assert_eq!(Side::from_char('r').unwrap(), Side::Right);
        assert_eq!(Uplo::from_char('U').unwrap().to_char(), 'U');
        assert_eq!(Diag::from_char('u').unwrap(), Diag::Unit);
    }

    #[test]
    fn test_invalid_flag() {
        let err = Trans::from_char('x').unwrap_err();
        assert!(matches!(err, BlisError::InvalidFlag { param: "trans", flag: 'x' }));
        assert_eq!(err.code(), -16);
        assert!(Side::from_char('N').is_err());
    }

    #[test]
    fn test_rank_k_trans_restrictions() {
        assert_eq!(rank_k_trans("herk", 'C', Trans::ConjTrans).unwrap(), Trans::ConjTrans);
        assert!(rank_k_trans("herk", 'T', Trans::ConjTrans).is_err());
        assert!(rank_k_trans("syrk", 'C', Trans::Trans).is_err());
    }

    #[test]
    fn test_leading_dimension_too_small() {
        let ctx = Context::new(Default::default()).unwrap();
        let a = vec![1.0f64; 6];
        let b = vec![1.0f64; 6];
        let mut c = vec![0.0f64; 4];
        let err = gemm(&ctx, 'N', 'N', 2, 2, 3, 1.0, &a, 1, &b, 3, 0.0, &mut c, 2).unwrap_err();
        assert!(matches!(err, BlisError::DimensionMismatch { op: "gemm", .. }));
    }

    #[test]
    fn test_gemm_transposed_operands() {
        let ctx = Context::new(Default::default()).unwrap();
        // A^T stored as 3x2 column-major: A = [1 2 3; 4 5 6]
        let a = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        // B stored 3x2 column-major
        let b = vec![7.0, 9.0, 11.0, 8.0, 10.0, 12.0];
        let mut c = vec![0.0f64; 4];
        gemm(&ctx, 'T', 'N', 2, 2, 3, 1.0, &a, 3, &b, 3, 0.0, &mut c, 2).unwrap();
        assert_eq!(c, vec![58.0, 139.0, 64.0, 154.0]);
    }
}
