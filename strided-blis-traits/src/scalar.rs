//! Scalar type bounds for the level-3 engine.

use num_complex::{Complex32, Complex64};
use std::fmt::Debug;
use std::ops::{Div, Neg, Sub};

use crate::ukernel::{KernelSet, Kernels};

/// Numeric precision tag.
///
/// Blocksize descriptors store one value per datatype and are indexed by
/// this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Datatype {
    Float,
    Double,
    SComplex,
    DComplex,
}

impl Datatype {
    pub const ALL: [Datatype; 4] = [
        Datatype::Float,
        Datatype::Double,
        Datatype::SComplex,
        Datatype::DComplex,
    ];

    /// One-letter BLAS prefix (`s`, `d`, `c`, `z`).
    pub fn prefix(self) -> char {
        match self {
            Datatype::Float => 's',
            Datatype::Double => 'd',
            Datatype::SComplex => 'c',
            Datatype::DComplex => 'z',
        }
    }
}

/// Arithmetic bounds shared by every element type the packing and kernel
/// layers move around.
pub trait ScalarBase:
    Copy
    + Send
    + Sync
    + std::ops::Mul<Output = Self>
    + std::ops::Add<Output = Self>
    + num_traits::Zero
    + num_traits::One
    + PartialEq
{
}

impl<T> ScalarBase for T where
    T: Copy
        + Send
        + Sync
        + std::ops::Mul<Output = T>
        + std::ops::Add<Output = T>
        + num_traits::Zero
        + num_traits::One
        + PartialEq
{
}

/// A floating-point element type supported by the engine.
///
/// The four implementations (`f32`, `f64`, `Complex32`, `Complex64`) are the
/// only datatypes a [`Datatype`] tag can name; generic algorithms are
/// instantiated once per implementation.
pub trait Scalar:
    ScalarBase
    + Debug
    + Sub<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + 'static
{
    /// The underlying real type (`Self` for real scalars).
    type Real: Scalar + PartialOrd;

    const DATATYPE: Datatype;

    fn conj(self) -> Self;

    fn real(self) -> Self::Real;

    fn from_real(re: Self::Real) -> Self;

    /// `|re| + |im|`, the BLAS "absolute value" used for tolerances.
    fn abs1(self) -> f64;

    #[inline]
    fn recip(self) -> Self {
        Self::one() / self
    }

    /// Drop the imaginary part. Identity for real scalars.
    #[inline]
    fn real_only(self) -> Self {
        Self::from_real(self.real())
    }

    /// Pick this datatype's kernels out of a [`KernelSet`].
    fn kernels(set: &KernelSet) -> &Kernels<Self>;
}

macro_rules! impl_scalar_real {
    ($t:ty, $dt:expr, $field:ident) => {
        impl Scalar for $t {
            type Real = $t;
            const DATATYPE: Datatype = $dt;

            #[inline(always)]
            fn conj(self) -> Self {
                self
            }

            #[inline(always)]
            fn real(self) -> Self::Real {
                self
            }

            #[inline(always)]
            fn from_real(re: Self::Real) -> Self {
                re
            }

            #[inline]
            fn abs1(self) -> f64 {
                (self as f64).abs()
            }

            fn kernels(set: &KernelSet) -> &Kernels<Self> {
                &set.$field
            }
        }
    };
}

macro_rules! impl_scalar_complex {
    ($t:ty, $re:ty, $dt:expr, $field:ident) => {
        impl Scalar for $t {
            type Real = $re;
            const DATATYPE: Datatype = $dt;

            #[inline(always)]
            fn conj(self) -> Self {
                <$t>::new(self.re, -self.im)
            }

            #[inline(always)]
            fn real(self) -> Self::Real {
                self.re
            }

            #[inline(always)]
            fn from_real(re: Self::Real) -> Self {
                <$t>::new(re, 0.0)
            }

            #[inline]
            fn abs1(self) -> f64 {
                (self.re as f64).abs() + (self.im as f64).abs()
            }

            fn kernels(set: &KernelSet) -> &Kernels<Self> {
                &set.$field
            }
        }
    };
}

impl_scalar_real!(f32, Datatype::Float, s);
impl_scalar_real!(f64, Datatype::Double, d);
impl_scalar_complex!(Complex32, f32, Datatype::SComplex, c);
impl_scalar_complex!(Complex64, f64, Datatype::DComplex, z);

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn assert_scalar_base<T: ScalarBase>() {}

    #[test]
    fn test_standard_types() {
        assert_scalar_base::<f32>();
        assert_scalar_base::<f64>();
        assert_scalar_base::<i64>();
        assert_scalar_base::<Complex64>();
    }

    #[test]
    fn test_datatype_tags() {
        assert_eq!(f32::DATATYPE, Datatype::Float);
        assert_eq!(f64::DATATYPE, Datatype::Double);
        assert_eq!(Complex32::DATATYPE, Datatype::SComplex);
        assert_eq!(Complex64::DATATYPE, Datatype::DComplex);
        let prefixes: String = Datatype::ALL.iter().map(|d| d.prefix()).collect();
        assert_eq!(prefixes, "sdcz");
    }

    #[test]
    fn test_complex_conj_and_real() {
        let z = Complex64::new(2.0, -3.0);
        assert_eq!(z.conj(), Complex64::new(2.0, 3.0));
        assert_eq!(Scalar::real(z), 2.0);
        assert_eq!(z.real_only(), Complex64::new(2.0, 0.0));
        assert_eq!(z.abs1(), 5.0);
    }

    #[test]
    fn test_recip() {
        assert_relative_eq!(4.0f64.recip(), 0.25);
        let z = Complex64::new(0.0, 2.0);
        let inv = Scalar::recip(z);
        assert_relative_eq!(inv.re, 0.0);
        assert_relative_eq!(inv.im, -0.5);
    }
}
