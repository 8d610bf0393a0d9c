//! Fixed point numbers with exactly 18 decimals.
//!
//! Every multiplication and division comes in a rounding-down and a
//! rounding-up flavour; callers pick whichever favours the pool.

use {
    super::error::Error,
    anyhow::{Context, Result, bail},
    num::BigInt,
    number::conversions::u256_to_big_int,
    primitive_types::U256,
    serde::{Deserialize, Deserializer, Serialize, Serializer, de},
    std::{
        fmt::{self, Debug, Display, Formatter},
        str::FromStr,
        sync::LazyLock,
    },
};

pub mod logexpmath;

/// Fixed point numbers that represent exactly any rational number that can be
/// represented with up to 18 decimals as long as it can be stored in 256 bits.
/// It corresponds to Solidity's `ufixed256x18`.
#[derive(Clone, Copy, Default, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub struct Bfp(U256);

static ONE_18: LazyLock<U256> = LazyLock::new(|| U256::exp10(18));
static ZERO: LazyLock<Bfp> = LazyLock::new(|| Bfp(U256::zero()));
static EPSILON: LazyLock<Bfp> = LazyLock::new(|| Bfp(U256::one()));
static ONE: LazyLock<Bfp> = LazyLock::new(|| Bfp(*ONE_18));
static TWO: LazyLock<Bfp> = LazyLock::new(|| Bfp(*ONE_18 * 2));
static FOUR: LazyLock<Bfp> = LazyLock::new(|| Bfp(*ONE_18 * 4));
/// Relative error bound of [`logexpmath::pow`], 1e-14.
static MAX_POW_RELATIVE_ERROR: LazyLock<Bfp> = LazyLock::new(|| Bfp(10_000.into()));

impl From<u64> for Bfp {
    fn from(num: u64) -> Self {
        // u64::MAX * 1e18 fits comfortably in 256 bits.
        Self(U256::from(num) * *ONE_18)
    }
}

impl FromStr for Bfp {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut split_dot = s.splitn(2, '.');
        let units = split_dot.next().unwrap_or_default();
        let decimals = split_dot.next().unwrap_or("0");
        if units.is_empty() || decimals.is_empty() || decimals.len() > 18 {
            bail!("invalid decimal representation {s:?}");
        }
        Ok(Bfp(U256::from_dec_str(&format!("{decimals:0<18}"))?
            .checked_add(
                U256::from_dec_str(units)?
                    .checked_mul(*ONE_18)
                    .context("too large number")?,
            )
            .context("too large number")?))
    }
}

impl Debug for Bfp {
    fn fmt(&self, formatter: &mut Formatter) -> fmt::Result {
        write!(
            formatter,
            "{}.{:0>18}",
            self.0 / *ONE_18,
            (self.0 % *ONE_18).as_u128()
        )
    }
}

impl Display for Bfp {
    fn fmt(&self, formatter: &mut Formatter) -> fmt::Result {
        Debug::fmt(self, formatter)
    }
}

impl Serialize for Bfp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Bfp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

impl Bfp {
    pub fn zero() -> Self {
        *ZERO
    }

    pub fn one() -> Self {
        *ONE
    }

    /// `10^exp` as a fixed point number, `exp` may be negative down to -18.
    pub fn exp10(exp: i32) -> Self {
        match 18 + exp {
            shift if shift >= 0 => Bfp(U256::exp10(shift.unsigned_abs() as usize)),
            _ => Self::zero(),
        }
    }

    pub fn from_wei(num: U256) -> Self {
        Self(num)
    }

    pub fn as_uint256(self) -> U256 {
        self.0
    }

    pub fn to_big_int(self) -> BigInt {
        u256_to_big_int(&self.0)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn add(self, other: Self) -> Result<Self, Error> {
        Ok(Self(self.0.checked_add(other.0).ok_or(Error::AddOverflow)?))
    }

    pub fn sub(self, other: Self) -> Result<Self, Error> {
        Ok(Self(self.0.checked_sub(other.0).ok_or(Error::SubOverflow)?))
    }

    pub fn mul_down(self, other: Self) -> Result<Self, Error> {
        Ok(Self(
            self.0.checked_mul(other.0).ok_or(Error::MulOverflow)? / *ONE_18,
        ))
    }

    pub fn mul_up(self, other: Self) -> Result<Self, Error> {
        let product = self.0.checked_mul(other.0).ok_or(Error::MulOverflow)?;
        Ok(if product.is_zero() {
            Bfp::zero()
        } else {
            Bfp(((product - 1) / *ONE_18) + 1)
        })
    }

    pub fn div_down(self, other: Self) -> Result<Self, Error> {
        if other.is_zero() {
            Err(Error::ZeroDivision)
        } else if self.is_zero() {
            Ok(Bfp::zero())
        } else {
            let a_inflated = self.0.checked_mul(*ONE_18).ok_or(Error::DivInternal)?;
            Ok(Self(a_inflated / other.0))
        }
    }

    pub fn div_up(self, other: Self) -> Result<Self, Error> {
        if other.is_zero() {
            Err(Error::ZeroDivision)
        } else if self.is_zero() {
            Ok(Bfp::zero())
        } else {
            let a_inflated = self.0.checked_mul(*ONE_18).ok_or(Error::DivInternal)?;
            Ok(Self(((a_inflated - 1) / other.0) + 1))
        }
    }

    /// `1 - self`, floored at zero.
    pub fn complement(self) -> Self {
        if self.0 < *ONE_18 {
            Self(*ONE_18 - self.0)
        } else {
            Self::zero()
        }
    }

    /// Power rounded down: the result is guaranteed to be at most the exact
    /// value.
    pub fn pow_down(self, exp: Self) -> Result<Self, Error> {
        if exp == *ONE {
            Ok(self)
        } else if exp == *TWO {
            self.mul_down(self)
        } else if exp == *FOUR {
            let square = self.mul_down(self)?;
            square.mul_down(square)
        } else {
            let raw = Bfp(logexpmath::pow(self.0, exp.0)?);
            let max_error = raw.mul_up(*MAX_POW_RELATIVE_ERROR)?.add(*EPSILON)?;
            Ok(raw.sub(max_error).unwrap_or_else(|_| Bfp::zero()))
        }
    }

    /// Power rounded up: the result is guaranteed to be at least the exact
    /// value.
    pub fn pow_up(self, exp: Self) -> Result<Self, Error> {
        if exp == *ONE {
            Ok(self)
        } else if exp == *TWO {
            self.mul_up(self)
        } else if exp == *FOUR {
            let square = self.mul_up(self)?;
            square.mul_up(square)
        } else {
            let raw = Bfp(logexpmath::pow(self.0, exp.0)?);
            let max_error = raw.mul_up(*MAX_POW_RELATIVE_ERROR)?.add(*EPSILON)?;
            raw.add(max_error)
        }
    }
}

/// Parses a decimal literal into a [`Bfp`], panicking on malformed input.
/// Intended for constants and tests.
#[macro_export]
macro_rules! bfp {
    ($val:literal) => {
        $val.parse::<$crate::fixed_point::Bfp>().unwrap()
    };
}
