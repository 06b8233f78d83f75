//! Floating point abstraction the lattice kernels are generic over

use bytemuck::Pod;
use std::fmt::Debug;
use std::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub, SubAssign};

/// Numeric precision a solver is built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Precision {
    /// 16 bit floats; accepted in configuration but no kernels exist for it
    Half,
    Single,
    Double,
}

impl Precision {
    pub fn size_of(&self) -> usize {
        match self {
            Precision::Half => 2,
            Precision::Single => 4,
            Precision::Double => 8,
        }
    }
}

/// Scalar type usable in lattice buffers and kernels
pub trait Real:
    Pod
    + Default
    + Debug
    + Send
    + Sync
    + PartialOrd
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
    + 'static
{
    const PRECISION: Precision;
    const ZERO: Self;
    const ONE: Self;

    fn from_f64(value: f64) -> Self;
    fn to_f64(self) -> f64;
    fn sqrt(self) -> Self;
    fn abs(self) -> Self;
    fn max(self, other: Self) -> Self;
    fn min(self, other: Self) -> Self;
    fn is_finite(self) -> bool;
}

macro_rules! impl_real {
    ($type:ty, $precision:expr) => {
        impl Real for $type {
            const PRECISION: Precision = $precision;
            const ZERO: Self = 0.0;
            const ONE: Self = 1.0;

            #[inline]
            fn from_f64(value: f64) -> Self {
                value as $type
            }

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn sqrt(self) -> Self {
                <$type>::sqrt(self)
            }

            #[inline]
            fn abs(self) -> Self {
                <$type>::abs(self)
            }

            #[inline]
            fn max(self, other: Self) -> Self {
                <$type>::max(self, other)
            }

            #[inline]
            fn min(self, other: Self) -> Self {
                <$type>::min(self, other)
            }

            #[inline]
            fn is_finite(self) -> bool {
                <$type>::is_finite(self)
            }
        }
    };
}

impl_real!(f32, Precision::Single);
impl_real!(f64, Precision::Double);

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T: Real>(value: f64) -> f64 {
        T::from_f64(value).to_f64()
    }

    #[test]
    fn test_precision_tags() {
        assert_eq!(<f32 as Real>::PRECISION, Precision::Single);
        assert_eq!(<f64 as Real>::PRECISION, Precision::Double);
        assert_eq!(Precision::Double.size_of(), std::mem::size_of::<f64>());
    }

    #[test]
    fn test_generic_math() {
        assert_eq!(roundtrip::<f64>(0.1), 0.1);
        assert!((roundtrip::<f32>(0.1) - 0.1).abs() < 1e-7);
        assert_eq!(Real::sqrt(4.0f64), 2.0);
        assert_eq!(Real::max(1.0f32, -2.0), 1.0);
        assert!(!Real::is_finite(f64::NAN));
    }
}
