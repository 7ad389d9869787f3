//! Argument checking, run before any worker starts.
//!
//! Conformance and squareness always hold after these functions return `Ok`:
//! the driver relies on them for memory safety. Structure checks (is the
//! operand of a Hermitian multiply actually marked Hermitian, ...) only run
//! when `Config::error_checking` is set.

use strided_blis_traits::Scalar;

use crate::view::{MatrixMut, MatrixRef, Structure};
use crate::{BlisError, Result};

fn mismatch(op: &'static str, detail: String) -> BlisError {
    BlisError::DimensionMismatch { op, detail }
}

/// `C (m x n) := A (m x k) * B (k x n)`.
pub(crate) fn gemm_dims<T: Scalar>(
    op: &'static str,
    a: &MatrixRef<'_, T>,
    b: &MatrixRef<'_, T>,
    c: &MatrixMut<'_, T>,
) -> Result<()> {
    if a.rows() != c.rows() {
        return Err(mismatch(
            op,
            format!("A has {} rows, C has {}", a.rows(), c.rows()),
        ));
    }
    if b.cols() != c.cols() {
        return Err(mismatch(
            op,
            format!("B has {} columns, C has {}", b.cols(), c.cols()),
        ));
    }
    if a.cols() != b.rows() {
        return Err(mismatch(
            op,
            format!("A has {} columns, B has {} rows", a.cols(), b.rows()),
        ));
    }
    Ok(())
}

pub(crate) fn square<T: Scalar>(a: &MatrixRef<'_, T>) -> Result<()> {
    if !a.is_square() {
        return Err(BlisError::NonSquare {
            rows: a.rows(),
            cols: a.cols(),
        });
    }
    Ok(())
}

pub(crate) fn square_out<T: Scalar>(c: &MatrixMut<'_, T>) -> Result<()> {
    if !c.is_square() {
        return Err(BlisError::NonSquare {
            rows: c.rows(),
            cols: c.cols(),
        });
    }
    Ok(())
}

/// Fails unless `found` is `expected`; skipped without error checking.
pub(crate) fn structure(
    enabled: bool,
    op: &'static str,
    operand: &'static str,
    expected: Structure,
    found: Structure,
) -> Result<()> {
    if enabled && expected != found {
        return Err(BlisError::InvalidStructure(format!(
            "{op}: {operand} must be {expected:?}, got {found:?}"
        )));
    }
    Ok(())
}

/// `B (m x n)` solved against a square `A (m x m)`.
pub(crate) fn trsm_dims<T: Scalar>(a: &MatrixRef<'_, T>, b: &MatrixMut<'_, T>) -> Result<()> {
    square(a)?;
    if a.rows() != b.rows() {
        return Err(mismatch(
            "trsm",
            format!("A is {0}x{0}, B has {1} rows", a.rows(), b.rows()),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gemm_dims() {
        let d = vec![0.0f64; 12];
        let mut e = vec![0.0f64; 12];
        let a = MatrixRef::col_major(&d, 2, 3).unwrap();
        let b = MatrixRef::col_major(&d, 3, 4).unwrap();
        let c = MatrixMut::col_major(&mut e, 2, 4).unwrap();
        gemm_dims("gemm", &a, &b, &c).unwrap();
        let err = gemm_dims("gemm", &a, &a.t(), &c).unwrap_err();
        assert_eq!(err.code(), -10);
        assert!(err.to_string().contains("gemm"));
    }

    #[test]
    fn test_structure_toggle() {
        assert!(structure(true, "hemm", "A", Structure::Hermitian, Structure::General).is_err());
        assert!(structure(false, "hemm", "A", Structure::Hermitian, Structure::General).is_ok());
    }

    #[test]
    fn test_trsm_dims() {
        let d = vec![1.0f64; 6];
        let mut e = vec![0.0f64; 6];
        let a = MatrixRef::col_major(&d, 2, 3).unwrap();
        let b = MatrixMut::col_major(&mut e, 2, 3).unwrap();
        assert!(matches!(trsm_dims(&a, &b), Err(BlisError::NonSquare { .. })));
    }
}
