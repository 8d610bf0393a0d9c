//! Exponentiation and logarithms over signed 18-decimal fixed point numbers.
//!
//! Values are decomposed against a table of precomputed powers of e and the
//! remainder is handled with a Taylor series (exp) or an atanh series (ln).
//! Intermediate math runs on [`BigInt`] so that the truncating division
//! semantics of signed 256-bit integers are reproduced exactly.

use {
    super::super::error::Error,
    num::{BigInt, Signed, Zero},
    number::conversions::{big_int_to_u256, u256_to_big_int},
    primitive_types::U256,
    std::sync::LazyLock,
};

/// `mantissa * 10^exp`
fn scaled(mantissa: u128, exp: u32) -> BigInt {
    BigInt::from(mantissa) * BigInt::from(10).pow(exp)
}

static ONE_18: LazyLock<BigInt> = LazyLock::new(|| BigInt::from(10).pow(18));
static ONE_20: LazyLock<BigInt> = LazyLock::new(|| BigInt::from(10).pow(20));
static ONE_36: LazyLock<BigInt> = LazyLock::new(|| BigInt::from(10).pow(36));

static MAX_NATURAL_EXPONENT: LazyLock<BigInt> = LazyLock::new(|| scaled(130, 18));
static MIN_NATURAL_EXPONENT: LazyLock<BigInt> = LazyLock::new(|| -scaled(41, 18));

// Bounds of the interval in which the higher precision logarithm is used.
static LN_36_LOWER_BOUND: LazyLock<BigInt> = LazyLock::new(|| &*ONE_18 - BigInt::from(10).pow(17));
static LN_36_UPPER_BOUND: LazyLock<BigInt> = LazyLock::new(|| &*ONE_18 + BigInt::from(10).pow(17));

static MILD_EXPONENT_BOUND: LazyLock<BigInt> =
    LazyLock::new(|| BigInt::from(2).pow(254) / &*ONE_20);
static MAX_INT256: LazyLock<BigInt> = LazyLock::new(|| BigInt::from(2).pow(255));

// 18 decimal exponents, powers of e without decimals.
static X0: LazyLock<BigInt> = LazyLock::new(|| scaled(128, 18));
static A0: LazyLock<BigInt> = LazyLock::new(|| scaled(388_770_840_599_459_509_222, 35));
static X1: LazyLock<BigInt> = LazyLock::new(|| scaled(64, 18));
static A1: LazyLock<BigInt> = LazyLock::new(|| scaled(623_514_908_081_161_688_291, 7));

// 20 decimal exponents and powers of e.
static X2: LazyLock<BigInt> = LazyLock::new(|| scaled(32, 20));
static A2: LazyLock<BigInt> = LazyLock::new(|| scaled(78_962_960_182_680_695_161, 14));
static X3: LazyLock<BigInt> = LazyLock::new(|| scaled(16, 20));
static A3: LazyLock<BigInt> = LazyLock::new(|| scaled(888_611_052_050_787_263_676, 6));
static X4: LazyLock<BigInt> = LazyLock::new(|| scaled(8, 20));
static A4: LazyLock<BigInt> = LazyLock::new(|| scaled(298_095_798_704_172_827_474, 3));
static X5: LazyLock<BigInt> = LazyLock::new(|| scaled(4, 20));
static A5: LazyLock<BigInt> = LazyLock::new(|| scaled(545_981_500_331_442_390_781, 1));
static X6: LazyLock<BigInt> = LazyLock::new(|| scaled(2, 20));
static A6: LazyLock<BigInt> = LazyLock::new(|| scaled(738_905_609_893_065_022_723, 0));
static X7: LazyLock<BigInt> = LazyLock::new(|| scaled(1, 20));
static A7: LazyLock<BigInt> = LazyLock::new(|| scaled(271_828_182_845_904_523_536, 0));
static X8: LazyLock<BigInt> = LazyLock::new(|| scaled(5, 19));
static A8: LazyLock<BigInt> = LazyLock::new(|| scaled(164_872_127_070_012_814_685, 0));
static X9: LazyLock<BigInt> = LazyLock::new(|| scaled(25, 18));
static A9: LazyLock<BigInt> = LazyLock::new(|| scaled(128_402_541_668_774_148_407, 0));
static X10: LazyLock<BigInt> = LazyLock::new(|| scaled(125, 17));
static A10: LazyLock<BigInt> = LazyLock::new(|| scaled(113_314_845_306_682_631_683, 0));
static X11: LazyLock<BigInt> = LazyLock::new(|| scaled(625, 16));
static A11: LazyLock<BigInt> = LazyLock::new(|| scaled(106_449_445_891_785_942_956, 0));

/// `x^y` for unsigned 18-decimal fixed point arguments.
pub fn pow(x: U256, y: U256) -> Result<U256, Error> {
    if y.is_zero() {
        return Ok(U256::exp10(18));
    }
    if x.is_zero() {
        return Ok(U256::zero());
    }

    let x = u256_to_big_int(&x);
    if x >= *MAX_INT256 {
        return Err(Error::XOutOfBounds);
    }
    let y = u256_to_big_int(&y);
    if y >= *MILD_EXPONENT_BOUND {
        return Err(Error::YOutOfBounds);
    }

    let logx_times_y = if *LN_36_LOWER_BOUND < x && x < *LN_36_UPPER_BOUND {
        let ln_36_x = ln_36(&x);
        // Split the 36-decimal logarithm to keep the product in range.
        (&ln_36_x / &*ONE_18) * &y + ((&ln_36_x % &*ONE_18) * &y) / &*ONE_18
    } else {
        ln_internal(&x)? * &y
    };
    let logx_times_y = logx_times_y / &*ONE_18;

    if logx_times_y < *MIN_NATURAL_EXPONENT || logx_times_y > *MAX_NATURAL_EXPONENT {
        return Err(Error::ProductOutOfBounds);
    }

    big_int_to_u256(&exp(&logx_times_y)?).map_err(|_| Error::ProductOutOfBounds)
}

/// Natural exponentiation `e^x` with 18 decimals of precision.
pub fn exp(x: &BigInt) -> Result<BigInt, Error> {
    if *x < *MIN_NATURAL_EXPONENT || *x > *MAX_NATURAL_EXPONENT {
        return Err(Error::InvalidExponent);
    }

    if x.is_negative() {
        // e^(-x) = 1 / e^x, and e^x never gets small enough to divide by zero.
        return Ok((&*ONE_18 * &*ONE_18) / exp(&-x)?);
    }

    let mut x = x.clone();
    let first_an = if x >= *X0 {
        x -= &*X0;
        A0.clone()
    } else if x >= *X1 {
        x -= &*X1;
        A1.clone()
    } else {
        BigInt::from(1)
    };

    // Switch to 20 decimals for the remaining terms.
    x *= 100_u32;

    let mut product = ONE_20.clone();
    for (x_n, a_n) in [
        (&*X2, &*A2),
        (&*X3, &*A3),
        (&*X4, &*A4),
        (&*X5, &*A5),
        (&*X6, &*A6),
        (&*X7, &*A7),
        (&*X8, &*A8),
        (&*X9, &*A9),
    ] {
        if x >= *x_n {
            x -= x_n;
            product = (product * a_n) / &*ONE_20;
        }
    }

    // Taylor series, 12 terms are enough for x < 0.25.
    let mut series_sum = ONE_20.clone();
    let mut term = x.clone();
    series_sum += &term;
    for n in 2..=12_u32 {
        term = ((term * &x) / &*ONE_20) / n;
        series_sum += &term;
    }

    Ok((((product * series_sum) / &*ONE_20) * first_an) / 100_u32)
}

/// Natural logarithm with 18 decimals of precision.
pub fn ln(a: &BigInt) -> Result<BigInt, Error> {
    if !a.is_positive() {
        return Err(Error::OutOfBounds);
    }
    if *LN_36_LOWER_BOUND < *a && *a < *LN_36_UPPER_BOUND {
        Ok(ln_36(a) / &*ONE_18)
    } else {
        ln_internal(a)
    }
}

fn ln_internal(a: &BigInt) -> Result<BigInt, Error> {
    if a.is_zero() {
        return Err(Error::OutOfBounds);
    }
    if *a < *ONE_18 {
        // ln(a) = -ln(1/a), and 1/a is above one.
        return Ok(-ln_internal(&((&*ONE_18 * &*ONE_18) / a))?);
    }

    let mut a = a.clone();
    let mut sum = BigInt::zero();
    if a >= &*A0 * &*ONE_18 {
        a /= &*A0;
        sum += &*X0;
    }
    if a >= &*A1 * &*ONE_18 {
        a /= &*A1;
        sum += &*X1;
    }

    // Switch to 20 decimals.
    sum *= 100_u32;
    a *= 100_u32;

    for (x_n, a_n) in [
        (&*X2, &*A2),
        (&*X3, &*A3),
        (&*X4, &*A4),
        (&*X5, &*A5),
        (&*X6, &*A6),
        (&*X7, &*A7),
        (&*X8, &*A8),
        (&*X9, &*A9),
        (&*X10, &*A10),
        (&*X11, &*A11),
    ] {
        if a >= *a_n {
            a = (a * &*ONE_20) / a_n;
            sum += x_n;
        }
    }

    // ln(a) = 2 * atanh(z), z = (a - 1) / (a + 1).
    let z = ((&a - &*ONE_20) * &*ONE_20) / (&a + &*ONE_20);
    let z_squared = (&z * &z) / &*ONE_20;
    let mut num = z.clone();
    let mut series_sum = num.clone();
    for n in [3_u32, 5, 7, 9, 11] {
        num = (num * &z_squared) / &*ONE_20;
        series_sum += &num / n;
    }
    series_sum *= 2_u32;

    Ok((sum + series_sum) / 100_u32)
}

/// Logarithm with 36 decimals of precision for arguments close to one. The
/// result is scaled by 1e36.
fn ln_36(x: &BigInt) -> BigInt {
    let x = x * &*ONE_18;

    let z = ((&x - &*ONE_36) * &*ONE_36) / (&x + &*ONE_36);
    let z_squared = (&z * &z) / &*ONE_36;
    let mut num = z.clone();
    let mut series_sum = num.clone();
    for n in [3_u32, 5, 7, 9, 11, 13, 15] {
        num = (num * &z_squared) / &*ONE_36;
        series_sum += &num / n;
    }

    series_sum * 2_u32
}
