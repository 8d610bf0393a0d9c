use {crate::transfers::TransferError, thiserror::Error};

/// Coarse classification of [`Error`]s.
#[derive(Clone, Copy, Debug, Eq, PartialEq, strum::Display)]
pub enum ErrorKind {
    /// Overflow, division by zero, out-of-domain power or a solver that did
    /// not converge.
    Numeric,
    /// Pool parameters that can never form a valid pool.
    InvariantViolation,
    /// The pool is in a state that does not allow the operation.
    State,
    /// Slippage limit or deadline exceeded.
    Limit,
    /// The asset transfer layer refused to move funds.
    Transfer,
    /// Malformed request: unknown pool, wrong tokens, bad user data.
    Input,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Math(#[from] pool_math::Error),
    #[error(transparent)]
    Transfer(#[from] TransferError),

    // Pool creation.
    #[error("MIN_TOKENS")]
    MinTokens,
    #[error("MAX_TOKENS")]
    MaxTokens,
    #[error("NOT_TWO_TOKENS")]
    NotTwoTokens,
    #[error("MAX_STABLE_TOKENS")]
    MaxStableTokens,
    #[error("UNSORTED_TOKENS")]
    UnsortedTokens,
    #[error("ZERO_TOKEN")]
    ZeroToken,
    #[error("MIN_WEIGHT")]
    MinWeight,
    #[error("NORMALIZED_WEIGHT_INVARIANT")]
    NormalizedWeightInvariant,
    #[error("MIN_AMP")]
    MinAmp,
    #[error("MAX_AMP")]
    MaxAmp,
    #[error("MIN_SWAP_FEE_PERCENTAGE")]
    MinSwapFeePercentage,
    #[error("MAX_SWAP_FEE_PERCENTAGE")]
    MaxSwapFeePercentage,
    #[error("MAX_MANAGEMENT_SWAP_FEE_PERCENTAGE")]
    MaxManagementSwapFeePercentage,
    #[error("SWAP_FEE_PERCENTAGE_TOO_HIGH")]
    MaxProtocolSwapFeePercentage,
    #[error("MAX_PAUSE_WINDOW_DURATION")]
    MaxPauseWindowDuration,
    #[error("MAX_BUFFER_PERIOD_DURATION")]
    MaxBufferPeriodDuration,
    #[error("UNHANDLED_BY_POOL_TYPE")]
    UnhandledByPoolType,

    // Requests.
    #[error("INPUT_LENGTH_MISMATCH")]
    InputLengthMismatch,
    #[error("INVALID_POOL_ID")]
    InvalidPoolId,
    #[error("TOKENS_MISMATCH")]
    TokensMismatch,
    #[error("TOKEN_NOT_REGISTERED")]
    TokenNotRegistered,
    #[error("OUT_OF_BOUNDS")]
    OutOfBounds,
    #[error("MALFORMED_USER_DATA")]
    MalformedUserData,
    #[error("UNHANDLED_JOIN_KIND")]
    UnhandledJoinKind,
    #[error("UNHANDLED_EXIT_KIND")]
    UnhandledExitKind,
    #[error("CANNOT_SWAP_SAME_TOKEN")]
    CannotSwapSameToken,
    #[error("UNKNOWN_AMOUNT_IN_FIRST_SWAP")]
    UnknownAmountInFirstSwap,
    #[error("MALCONSTRUCTED_MULTIHOP_SWAP")]
    MalconstructedMultihopSwap,
    #[error("ORACLE_INVALID_SECONDS_QUERY")]
    OracleInvalidSecondsQuery,
    #[error("CALLER_IS_NOT_OWNER")]
    CallerNotOwner,

    // Pool state.
    #[error("UNINITIALIZED")]
    Uninitialized,
    #[error("ALREADY_INITIALIZED")]
    AlreadyInitialized,
    #[error("PAUSED")]
    Paused,
    #[error("PAUSE_WINDOW_EXPIRED")]
    PauseWindowExpired,
    #[error("BUFFER_PERIOD_EXPIRED")]
    BufferPeriodExpired,
    #[error("SWAPS_DISABLED")]
    SwapsDisabled,
    #[error("INVALID_JOIN_EXIT_KIND_WHILE_SWAPS_DISABLED")]
    InvalidJoinExitKindWhileSwapsDisabled,
    #[error("ADDRESS_NOT_ALLOWLISTED")]
    AddressNotAllowlisted,
    #[error("ADDRESS_ALREADY_ALLOWLISTED")]
    AddressAlreadyAllowlisted,
    #[error("MINIMUM_BPT")]
    MinimumShares,
    #[error("INSUFFICIENT_SHARES")]
    InsufficientShares,
    #[error("GRADUAL_UPDATE_TIME_TRAVEL")]
    GradualUpdateTimeTravel,
    #[error("ORACLE_NOT_INITIALIZED")]
    OracleNotInitialized,
    #[error("ORACLE_QUERY_TOO_OLD")]
    OracleQueryTooOld,

    // Limits.
    #[error("BPT_OUT_MIN_AMOUNT")]
    ShareOutMinAmount,
    #[error("BPT_IN_MAX_AMOUNT")]
    ShareInMaxAmount,
    #[error("JOIN_ABOVE_MAX")]
    JoinAboveMax,
    #[error("EXIT_BELOW_MIN")]
    ExitBelowMin,
    #[error("SWAP_LIMIT")]
    SwapLimit,
    #[error("SWAP_DEADLINE")]
    SwapDeadline,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Math(_) => ErrorKind::Numeric,
            Self::Transfer(_) => ErrorKind::Transfer,
            Self::MinTokens
            | Self::MaxTokens
            | Self::NotTwoTokens
            | Self::MaxStableTokens
            | Self::UnsortedTokens
            | Self::ZeroToken
            | Self::MinWeight
            | Self::NormalizedWeightInvariant
            | Self::MinAmp
            | Self::MaxAmp
            | Self::MinSwapFeePercentage
            | Self::MaxSwapFeePercentage
            | Self::MaxManagementSwapFeePercentage
            | Self::MaxProtocolSwapFeePercentage
            | Self::MaxPauseWindowDuration
            | Self::MaxBufferPeriodDuration
            | Self::UnhandledByPoolType => ErrorKind::InvariantViolation,
            Self::InputLengthMismatch
            | Self::InvalidPoolId
            | Self::TokensMismatch
            | Self::TokenNotRegistered
            | Self::OutOfBounds
            | Self::MalformedUserData
            | Self::UnhandledJoinKind
            | Self::UnhandledExitKind
            | Self::CannotSwapSameToken
            | Self::UnknownAmountInFirstSwap
            | Self::MalconstructedMultihopSwap
            | Self::OracleInvalidSecondsQuery
            | Self::CallerNotOwner => ErrorKind::Input,
            Self::Uninitialized
            | Self::AlreadyInitialized
            | Self::Paused
            | Self::PauseWindowExpired
            | Self::BufferPeriodExpired
            | Self::SwapsDisabled
            | Self::InvalidJoinExitKindWhileSwapsDisabled
            | Self::AddressNotAllowlisted
            | Self::AddressAlreadyAllowlisted
            | Self::MinimumShares
            | Self::InsufficientShares
            | Self::GradualUpdateTimeTravel
            | Self::OracleNotInitialized
            | Self::OracleQueryTooOld => ErrorKind::State,
            Self::ShareOutMinAmount
            | Self::ShareInMaxAmount
            | Self::JoinAboveMax
            | Self::ExitBelowMin
            | Self::SwapLimit
            | Self::SwapDeadline => ErrorKind::Limit,
        }
    }

    /// Stable numeric error code.
    pub fn code(&self) -> u16 {
        match self {
            Self::Math(err) => err.code(),
            Self::Transfer(err) => err.code(),
            Self::OutOfBounds => 100,
            Self::UnsortedTokens => 102,
            Self::InputLengthMismatch => 103,
            Self::ZeroToken => 104,
            Self::MinTokens => 200,
            Self::MaxTokens => 201,
            Self::MaxSwapFeePercentage => 202,
            Self::MinSwapFeePercentage => 203,
            Self::MinimumShares => 204,
            Self::Uninitialized => 206,
            Self::ShareInMaxAmount => 207,
            Self::ShareOutMinAmount => 208,
            Self::NotTwoTokens => 210,
            Self::MinAmp => 300,
            Self::MaxAmp => 301,
            Self::MinWeight => 302,
            Self::MaxStableTokens => 303,
            Self::NormalizedWeightInvariant => 308,
            Self::UnhandledJoinKind => 310,
            Self::OracleInvalidSecondsQuery => 312,
            Self::OracleNotInitialized => 313,
            Self::OracleQueryTooOld => 314,
            Self::GradualUpdateTimeTravel => 326,
            Self::SwapsDisabled => 327,
            Self::InvalidJoinExitKindWhileSwapsDisabled => 330,
            Self::UnhandledExitKind => 336,
            Self::MaxManagementSwapFeePercentage => 338,
            Self::UnhandledByPoolType => 339,
            Self::AddressNotAllowlisted => 340,
            Self::AddressAlreadyAllowlisted => 341,
            Self::AlreadyInitialized => 342,
            Self::MalformedUserData => 343,
            Self::InsufficientShares => 344,
            Self::Paused => 402,
            Self::PauseWindowExpired => 403,
            Self::MaxPauseWindowDuration => 404,
            Self::MaxBufferPeriodDuration => 405,
            Self::BufferPeriodExpired => 407,
            Self::CallerNotOwner => 426,
            Self::InvalidPoolId => 500,
            Self::ExitBelowMin => 505,
            Self::JoinAboveMax => 506,
            Self::SwapLimit => 507,
            Self::SwapDeadline => 508,
            Self::CannotSwapSameToken => 509,
            Self::UnknownAmountInFirstSwap => 510,
            Self::MalconstructedMultihopSwap => 511,
            Self::TokensMismatch => 520,
            Self::TokenNotRegistered => 521,
            Self::MaxProtocolSwapFeePercentage => 600,
        }
    }
}
