//! Low resolution logarithms of prices for the time weighted oracle.
//!
//! Values are stored as `ln(x)` with 4 decimals of precision, which keeps the
//! relative error of a round trip within about 0.005% while fitting samples in
//! a few bytes.

use {
    super::{
        error::Error,
        fixed_point::{Bfp, logexpmath},
    },
    num::{BigInt, Signed, ToPrimitive},
    number::conversions::big_int_to_u256,
    std::sync::LazyLock,
};

static LOG_COMPRESSION_FACTOR: LazyLock<BigInt> = LazyLock::new(|| BigInt::from(10).pow(14));
static HALF_LOG_COMPRESSION_FACTOR: LazyLock<BigInt> =
    LazyLock::new(|| BigInt::from(5) * BigInt::from(10).pow(13));

/// Rounds a full precision natural logarithm to the compressed resolution,
/// away from zero at the midpoint.
fn compress(ln: BigInt) -> Result<i64, Error> {
    let rounding = if ln.is_positive() {
        HALF_LOG_COMPRESSION_FACTOR.clone()
    } else {
        -HALF_LOG_COMPRESSION_FACTOR.clone()
    };
    ((ln + rounding) / &*LOG_COMPRESSION_FACTOR)
        .to_i64()
        .ok_or(Error::OutOfBounds)
}

/// `ln(value)` with 4 decimals.
pub fn to_low_res_log(value: Bfp) -> Result<i64, Error> {
    compress(logexpmath::ln(&value.to_big_int())?)
}

/// Inverse of [`to_low_res_log`].
pub fn from_low_res_log(value: i64) -> Result<Bfp, Error> {
    let exponent = BigInt::from(value) * &*LOG_COMPRESSION_FACTOR;
    let result = logexpmath::exp(&exponent)?;
    Ok(Bfp::from_wei(
        big_int_to_u256(&result).map_err(|_| Error::OutOfBounds)?,
    ))
}

/// Log of the price of token A in units of token B,
/// `(balance_a / weight_a) / (balance_b / weight_b)`. The two terms are
/// subtracted in log space so that the ratio itself never has to be
/// represented.
pub fn calc_log_spot_price(
    normalized_weight_a: Bfp,
    balance_a: Bfp,
    normalized_weight_b: Bfp,
    balance_b: Bfp,
) -> Result<i64, Error> {
    let ln_a = logexpmath::ln(&balance_a.div_down(normalized_weight_a)?.to_big_int())?;
    let ln_b = logexpmath::ln(&balance_b.div_down(normalized_weight_b)?.to_big_int())?;
    compress(ln_a - ln_b)
}

/// Log of the price of one pool share in units of a token,
/// `(balance / weight) / supply`, given the compressed log of the supply.
/// Both terms are compressed, so the error bound is twice that of the spot
/// price.
pub fn calc_log_share_price(
    normalized_weight: Bfp,
    balance: Bfp,
    log_total_supply: i64,
) -> Result<i64, Error> {
    let log_balance_over_weight = to_low_res_log(balance.div_down(normalized_weight)?)?;
    log_balance_over_weight
        .checked_sub(log_total_supply)
        .ok_or(Error::SubOverflow)
}
