// src/backend/numeric.rs

use rand_distr::num_traits::{FromPrimitive, One, Zero};
use std::fmt::{Debug, Display};
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

/// Base trait for every element type a tensor can hold.
///
/// Bundles the arithmetic, comparison and conversion bounds the backend needs
/// so the rest of the crate can write a single `T: Numeric` bound instead of
/// repeating the full list. Unsigned integers are intentionally excluded since
/// gradients require negation.
pub trait Numeric:
    // Basic arithmetic operations
    Add<Output = Self> + Sub<Output = Self> + Mul<Output = Self> + Div<Output = Self>
    // Assignment operations (ndarray's in-place arithmetic relies on these)
    + AddAssign + SubAssign + MulAssign + DivAssign
    // Negation
    + Neg<Output = Self>
    // Comparisons
    + PartialOrd + PartialEq
    // Essential traits
    + Clone + Copy + Debug + Display + Default
    // Identities and conversions, shared with ndarray via num_traits
    + Zero + One + FromPrimitive
    + Send + Sync + 'static
{
    /// Minimum value representable by this type
    fn min_value() -> Self;

    /// Maximum value representable by this type
    fn max_value() -> Self;

    /// Larger of two values, by `PartialOrd`
    fn maxv(self, other: Self) -> Self {
        if self >= other { self } else { other }
    }

    /// Smaller of two values, by `PartialOrd`
    fn minv(self, other: Self) -> Self {
        if self <= other { self } else { other }
    }
}

/// Floating-point element types. Everything differentiable in this crate is
/// generic over `Float` rather than `Numeric`.
pub trait Float: Numeric {
    /// Square root
    fn sqrt(self) -> Self;

    /// Absolute value
    fn abs(self) -> Self;
}

macro_rules! impl_float_numeric {
    ($t:ty) => {
        impl Numeric for $t {
            fn min_value() -> Self {
                <$t>::MIN
            }

            fn max_value() -> Self {
                <$t>::MAX
            }
        }

        impl Float for $t {
            fn sqrt(self) -> Self {
                self.sqrt()
            }

            fn abs(self) -> Self {
                self.abs()
            }
        }
    };
}

impl_float_numeric!(f32);
impl_float_numeric!(f64);
