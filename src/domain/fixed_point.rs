//! Fixed-point math kernel.
//!
//! Every authoritative quantity (shares, costs, prices, fees) is a signed
//! 9-decimal fixed-point number stored in an `i64`. Intermediate products
//! are widened to `i128` and every operation is checked: overflow,
//! underflow and division by zero surface as [`ArithmeticError`], never as
//! a wrap or a panic.
//!
//! Division is only available through [`Fixed::ratio`], which scales the
//! numerator before dividing. Callers cannot divide first and lose the
//! fractional part.
//!
//! `exp` and `ln` are evaluated at 18 decimals internally (range reduction
//! by powers of two plus a short series) and rounded back to 9 decimals.

use std::fmt;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use super::error::ArithmeticError;

/// Number of decimal places carried by [`Fixed`].
pub const DECIMALS: u32 = 9;

/// Raw value of `1.0`.
pub const SCALE: i64 = 1_000_000_000;

const SCALE_WIDE: i128 = SCALE as i128;

/// Internal precision used by `exp`/`ln` (18 decimals).
const WIDE: i128 = 1_000_000_000_000_000_000;

/// ln(2) at 18 decimals.
const LN_2_WIDE: i128 = 693_147_180_559_945_309;

/// Hard cap on series terms; the series converge long before this.
const MAX_SERIES_TERMS: i128 = 64;

/// Largest magnitude accepted by [`Fixed::exp`].
///
/// e^20 ≈ 4.85e8, comfortably inside the `i64` raw range.
pub const MAX_EXP_ARG: Fixed = Fixed(20 * SCALE);

/// ln(2), rounded up so that loss bounds derived from it are conservative.
pub const LN_2: Fixed = Fixed(693_147_181);

/// Basis-point denominator (10000 bps = 100%).
pub const BPS_DENOMINATOR: u32 = 10_000;

/// Signed 9-decimal fixed-point number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fixed(i64);

impl Fixed {
    /// `0.0`
    pub const ZERO: Self = Self(0);
    /// `1.0`
    pub const ONE: Self = Self(SCALE);

    /// Wraps a raw 9-decimal value.
    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    /// Returns the raw 9-decimal value.
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Converts a whole number.
    pub fn from_int(value: i64) -> Result<Self, ArithmeticError> {
        value
            .checked_mul(SCALE)
            .map(Self)
            .ok_or(if value < 0 {
                ArithmeticError::Underflow
            } else {
                ArithmeticError::Overflow
            })
    }

    /// Converts an exact decimal, truncating anything beyond 9 decimals.
    pub fn from_decimal(value: Decimal) -> Result<Self, ArithmeticError> {
        let scaled = value
            .checked_mul(Decimal::from(SCALE))
            .ok_or(ArithmeticError::Overflow)?
            .trunc();
        scaled.to_i64().map(Self).ok_or(if value.is_sign_negative() {
            ArithmeticError::Underflow
        } else {
            ArithmeticError::Overflow
        })
    }

    /// Exact decimal view of this value.
    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, DECIMALS)
    }

    /// Lossy conversion for display and reference comparisons only.
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / SCALE as f64
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Absolute value, failing on `i64::MIN`.
    pub fn checked_abs(self) -> Result<Self, ArithmeticError> {
        self.0.checked_abs().map(Self).ok_or(ArithmeticError::Overflow)
    }

    pub fn checked_add(self, rhs: Self) -> Result<Self, ArithmeticError> {
        self.0.checked_add(rhs.0).map(Self).ok_or(if rhs.0 < 0 {
            ArithmeticError::Underflow
        } else {
            ArithmeticError::Overflow
        })
    }

    pub fn checked_sub(self, rhs: Self) -> Result<Self, ArithmeticError> {
        self.0.checked_sub(rhs.0).map(Self).ok_or(if rhs.0 > 0 {
            ArithmeticError::Underflow
        } else {
            ArithmeticError::Overflow
        })
    }

    /// `(self · rhs) / SCALE`, truncated toward zero.
    pub fn checked_mul(self, rhs: Self) -> Result<Self, ArithmeticError> {
        let product = i128::from(self.0) * i128::from(rhs.0);
        narrow(product / SCALE_WIDE).map(Self)
    }

    /// Scaled quotient `(numerator · SCALE) / denominator`.
    ///
    /// This is the only division primitive of the kernel; the numerator is
    /// always widened and scaled before the divide.
    pub fn ratio(numerator: Self, denominator: Self) -> Result<Self, ArithmeticError> {
        if denominator.0 == 0 {
            return Err(ArithmeticError::DivisionByZero);
        }
        let scaled = i128::from(numerator.0) * SCALE_WIDE;
        narrow(scaled / i128::from(denominator.0)).map(Self)
    }

    /// `self / rhs` through [`Fixed::ratio`].
    pub fn checked_div(self, rhs: Self) -> Result<Self, ArithmeticError> {
        Self::ratio(self, rhs)
    }

    /// `self · numerator / denominator` with a single widened division.
    ///
    /// Used for pro-rata splits where `numerator / denominator` is a share
    /// of a whole and must not be rounded on its own.
    pub fn mul_div(self, numerator: Self, denominator: Self) -> Result<Self, ArithmeticError> {
        if denominator.0 == 0 {
            return Err(ArithmeticError::DivisionByZero);
        }
        let product = i128::from(self.0) * i128::from(numerator.0);
        narrow(product / i128::from(denominator.0)).map(Self)
    }

    /// `self · bps / 10000`, truncated toward zero.
    pub fn mul_bps(self, bps: u32) -> Result<Self, ArithmeticError> {
        let product = i128::from(self.0) * i128::from(bps);
        narrow(product / i128::from(BPS_DENOMINATOR)).map(Self)
    }

    /// e^self for `|self| ≤ 20`.
    pub fn exp(self) -> Result<Self, ArithmeticError> {
        if self.0 > MAX_EXP_ARG.0 || self.0 < -MAX_EXP_ARG.0 {
            return Err(ArithmeticError::OutOfDomain { operation: "exp" });
        }

        // x = k·ln2 + r with |r| ≤ ln2/2
        let x = i128::from(self.0) * SCALE_WIDE;
        let k = div_round(x, LN_2_WIDE);
        let r = x - k * LN_2_WIDE;

        let mut term = WIDE;
        let mut sum = WIDE;
        let mut n: i128 = 1;
        while n <= MAX_SERIES_TERMS {
            term = term * r / (n * WIDE);
            if term == 0 {
                break;
            }
            sum += term;
            n += 1;
        }

        // |k| ≤ 29 inside the accepted domain
        let shift = u32::try_from(k.unsigned_abs()).map_err(|_| ArithmeticError::Overflow)?;
        let wide = if k >= 0 { sum << shift } else { sum >> shift };
        narrow(div_round(wide, SCALE_WIDE)).map(Self)
    }

    /// Natural logarithm for `self > 0`.
    pub fn ln(self) -> Result<Self, ArithmeticError> {
        if self.0 <= 0 {
            return Err(ArithmeticError::OutOfDomain { operation: "ln" });
        }
        if self.0 == SCALE {
            return Ok(Self::ZERO);
        }

        // m = self / 2^k with m in [1, 2)
        let mut m = i128::from(self.0) * SCALE_WIDE;
        let mut k: i128 = 0;
        while m >= 2 * WIDE {
            m >>= 1;
            k += 1;
        }
        while m < WIDE {
            m <<= 1;
            k -= 1;
        }

        // ln(m) = 2·atanh(y), y = (m - 1) / (m + 1) ∈ [0, 1/3)
        let y = (m - WIDE) * WIDE / (m + WIDE);
        let y2 = y * y / WIDE;
        let mut power = y;
        let mut sum: i128 = 0;
        let mut denominator: i128 = 1;
        while power != 0 && denominator < 2 * MAX_SERIES_TERMS {
            sum += power / denominator;
            power = power * y2 / WIDE;
            denominator += 2;
        }

        let wide = 2 * sum + k * LN_2_WIDE;
        narrow(div_round(wide, SCALE_WIDE)).map(Self)
    }
}

impl fmt::Display for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal().normalize())
    }
}

impl From<Fixed> for Decimal {
    fn from(value: Fixed) -> Self {
        value.to_decimal()
    }
}

impl TryFrom<Decimal> for Fixed {
    type Error = ArithmeticError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::from_decimal(value)
    }
}

fn narrow(value: i128) -> Result<i64, ArithmeticError> {
    i64::try_from(value).map_err(|_| {
        if value < 0 {
            ArithmeticError::Underflow
        } else {
            ArithmeticError::Overflow
        }
    })
}

/// Division rounding half away from zero (`divisor > 0`).
fn div_round(value: i128, divisor: i128) -> i128 {
    if value >= 0 {
        (value + divisor / 2) / divisor
    } else {
        (value - divisor / 2) / divisor
    }
}
