//! Conversions between the 256-bit unsigned integers used for on-ledger
//! amounts and the arbitrary precision integers used for signed math.

use {
    anyhow::{Result, ensure},
    num::{BigInt, Zero, bigint::Sign},
    primitive_types::U256,
};

pub fn u256_to_big_int(input: &U256) -> BigInt {
    let mut bytes = [0; 32];
    input.to_big_endian(&mut bytes);
    BigInt::from_bytes_be(Sign::Plus, &bytes)
}

pub fn big_int_to_u256(input: &BigInt) -> Result<U256> {
    let (sign, bytes) = input.to_bytes_be();
    ensure!(sign != Sign::Minus, "negative");
    ensure!(bytes.len() <= 32, "too large");
    Ok(U256::from_big_endian(&bytes))
}

pub trait U256Ext: Sized {
    fn to_big_int(&self) -> BigInt;
    fn checked_ceil_div(&self, other: &Self) -> Option<Self>;
}

impl U256Ext for U256 {
    fn to_big_int(&self) -> BigInt {
        u256_to_big_int(self)
    }

    fn checked_ceil_div(&self, other: &Self) -> Option<Self> {
        if other.is_zero() {
            return None;
        }
        let (quotient, remainder) = self.div_mod(*other);
        Some(if remainder.is_zero() {
            quotient
        } else {
            quotient + 1
        })
    }
}

/// Splits a signed amount into its magnitude and whether it is negative.
pub fn big_int_to_signed_u256(input: &BigInt) -> Result<(bool, U256)> {
    let negative = input.sign() == Sign::Minus;
    let magnitude = if negative { -input } else { input.clone() };
    Ok((negative && !magnitude.is_zero(), big_int_to_u256(&magnitude)?))
}
