use thiserror::Error;

/// Failures of the pool math. Each variant maps to a stable numeric code.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum Error {
    #[error("ADD_OVERFLOW")]
    AddOverflow,
    #[error("SUB_OVERFLOW")]
    SubOverflow,
    #[error("MUL_OVERFLOW")]
    MulOverflow,
    #[error("ZERO_DIVISION")]
    ZeroDivision,
    #[error("DIV_INTERNAL")]
    DivInternal,
    #[error("X_OUT_OF_BOUNDS")]
    XOutOfBounds,
    #[error("Y_OUT_OF_BOUNDS")]
    YOutOfBounds,
    #[error("PRODUCT_OUT_OF_BOUNDS")]
    ProductOutOfBounds,
    #[error("INVALID_EXPONENT")]
    InvalidExponent,
    #[error("OUT_OF_BOUNDS")]
    OutOfBounds,
    #[error("MAX_IN_RATIO")]
    MaxInRatio,
    #[error("MAX_OUT_RATIO")]
    MaxOutRatio,
    #[error("MIN_BPT_IN_FOR_TOKEN_OUT")]
    MinShareInForTokenOut,
    #[error("MAX_OUT_BPT_FOR_TOKEN_IN")]
    MaxShareOutForTokenIn,
    #[error("ZERO_INVARIANT")]
    ZeroInvariant,
    #[error("STABLE_INVARIANT_DIDNT_CONVERGE")]
    StableInvariantDidntConverge,
    #[error("STABLE_GET_BALANCE_DIDNT_CONVERGE")]
    StableGetBalanceDidntConverge,
}

impl Error {
    pub fn code(&self) -> u16 {
        match self {
            Error::AddOverflow => 0,
            Error::SubOverflow => 1,
            Error::MulOverflow => 3,
            Error::ZeroDivision => 4,
            Error::DivInternal => 5,
            Error::XOutOfBounds => 6,
            Error::YOutOfBounds => 7,
            Error::ProductOutOfBounds => 8,
            Error::InvalidExponent => 9,
            Error::OutOfBounds => 100,
            Error::MaxInRatio => 304,
            Error::MaxOutRatio => 305,
            Error::MinShareInForTokenOut => 306,
            Error::MaxShareOutForTokenIn => 307,
            Error::ZeroInvariant => 311,
            Error::StableInvariantDidntConverge => 321,
            Error::StableGetBalanceDidntConverge => 322,
        }
    }
}
