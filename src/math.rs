//! Fixed-point utilities shared by the CDP contracts
//! Every amount, price and ratio is a U256 carrying 18 decimals.
use odra::casper_types::U256;
use crate::errors::CdpError;

/// 1.0 in 18-decimal fixed point
pub const DECIMAL_PRECISION: u128 = 1_000_000_000_000_000_000;

/// Precision of the nominal collateral ratio used to order troves
pub const NICR_PRECISION: u128 = 100_000_000_000_000_000_000;

/// Renormalisation step of the stability pool product (1e9)
pub const SCALE_FACTOR: u128 = 1_000_000_000;

/// Cap on the exponent of the base rate decay (1000 years in minutes)
pub const MAX_DECAY_MINUTES: u64 = 525_600_000;

/// Shorthand for 1.0
pub fn one() -> U256 {
    U256::from(DECIMAL_PRECISION)
}

/// Safe math operations for U256
pub struct SafeMath;

impl SafeMath {
    /// Safe addition with overflow check
    pub fn add(a: U256, b: U256) -> Result<U256, CdpError> {
        a.checked_add(b).ok_or(CdpError::Overflow)
    }

    /// Safe subtraction with underflow check
    pub fn sub(a: U256, b: U256) -> Result<U256, CdpError> {
        a.checked_sub(b).ok_or(CdpError::Underflow)
    }

    /// Safe multiplication with overflow check
    pub fn mul(a: U256, b: U256) -> Result<U256, CdpError> {
        a.checked_mul(b).ok_or(CdpError::Overflow)
    }

    /// Safe division with zero check, rounds down
    pub fn div(a: U256, b: U256) -> Result<U256, CdpError> {
        if b.is_zero() {
            return Err(CdpError::DivisionByZero);
        }
        Ok(a / b)
    }

    /// Division rounding up
    pub fn div_up(a: U256, b: U256) -> Result<U256, CdpError> {
        let q = Self::div(a, b)?;
        if (q * b) == a {
            Ok(q)
        } else {
            Self::add(q, U256::one())
        }
    }

    /// `a * b / c`, rounding down
    pub fn mul_div(a: U256, b: U256, c: U256) -> Result<U256, CdpError> {
        Self::div(Self::mul(a, b)?, c)
    }

    /// `a * b / c`, rounding up
    pub fn mul_div_up(a: U256, b: U256, c: U256) -> Result<U256, CdpError> {
        Self::div_up(Self::mul(a, b)?, c)
    }

    /// Returns the minimum of two U256 values
    pub fn min(a: U256, b: U256) -> U256 {
        if a < b { a } else { b }
    }
}

/// 18-decimal fixed point helpers
pub struct DecimalMath;

impl DecimalMath {
    /// Multiplies two decimals, rounding half up
    pub fn mul(x: U256, y: U256) -> Result<U256, CdpError> {
        let prod = SafeMath::mul(x, y)?;
        let half = U256::from(DECIMAL_PRECISION / 2);
        Ok(SafeMath::add(prod, half)? / one())
    }

    /// `base ^ minutes` by squaring, with the exponent capped at
    /// `MAX_DECAY_MINUTES`. `base` must be a decimal in [0, 1].
    pub fn pow(base: U256, minutes: u64) -> Result<U256, CdpError> {
        let mut n = if minutes > MAX_DECAY_MINUTES { MAX_DECAY_MINUTES } else { minutes };
        if n == 0 {
            return Ok(one());
        }

        let mut y = one();
        let mut x = base;
        while n > 1 {
            if n % 2 == 0 {
                x = Self::mul(x, x)?;
                n /= 2;
            } else {
                y = Self::mul(x, y)?;
                x = Self::mul(x, x)?;
                n = (n - 1) / 2;
            }
        }
        Self::mul(x, y)
    }

    /// Collateral ratio `coll * price / debt`; U256::MAX when there is no debt
    pub fn compute_cr(coll: U256, debt: U256, price: U256) -> Result<U256, CdpError> {
        if debt.is_zero() {
            return Ok(U256::MAX);
        }
        SafeMath::mul_div(coll, price, debt)
    }

    /// Price-independent ratio used as the sort key of the trove index
    pub fn compute_nominal_cr(coll: U256, debt: U256) -> Result<U256, CdpError> {
        if debt.is_zero() {
            return Ok(U256::MAX);
        }
        SafeMath::mul_div(coll, U256::from(NICR_PRECISION), debt)
    }
}
