//! Pool types and the parameters they are registered with.

use {
    crate::{
        Account,
        Token,
        config::Config,
        error::Error,
        ids::Specialization,
    },
    pool_math::{Bfp, stable_math, weighted_math},
    primitive_types::U256,
    serde::{Deserialize, Serialize},
};

pub mod pause;
pub mod weights;

pub const MIN_TOKENS: usize = 2;
pub const MAX_TOKENS: usize = 20;

#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    PartialEq,
    Serialize,
    strum::Display,
    strum::EnumIter,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum PoolType {
    Weighted,
    WeightedTwoToken,
    LiquidityBootstrapping,
    Managed,
    Stable,
    StablePhantom,
}

impl PoolType {
    pub fn is_weighted(self) -> bool {
        matches!(
            self,
            Self::Weighted | Self::WeightedTwoToken | Self::LiquidityBootstrapping | Self::Managed
        )
    }

    pub fn is_stable(self) -> bool {
        !self.is_weighted()
    }

    /// Pool types whose weights and swap toggle can change after creation.
    pub fn is_dynamic(self) -> bool {
        matches!(self, Self::LiquidityBootstrapping | Self::Managed)
    }

    /// Whether swap fees are shared with the protocol as tokens on joins and
    /// exits.
    pub fn pays_protocol_fee_in_tokens(self) -> bool {
        !matches!(self, Self::LiquidityBootstrapping | Self::StablePhantom)
    }

    pub fn specialization(self) -> Specialization {
        match self {
            Self::WeightedTwoToken => Specialization::TwoToken,
            Self::Weighted | Self::LiquidityBootstrapping => Specialization::MinimalSwapInfo,
            Self::Managed | Self::Stable | Self::StablePhantom => Specialization::General,
        }
    }
}

/// How a pool prices its tokens.
#[derive(Clone, Debug, PartialEq)]
pub enum Pricing {
    Weighted { normalized_weights: Vec<Bfp> },
    /// The amplification parameter without the `AMP_PRECISION` scaling,
    /// within `[MIN_AMP, MAX_AMP]`.
    Stable { amplification_parameter: u64 },
}

/// Amplification parameter as consumed by the stable math.
pub(crate) fn scaled_amplification_parameter(amplification_parameter: u64) -> U256 {
    U256::from(amplification_parameter) * U256::from(stable_math::AMP_PRECISION)
}

/// Everything needed to register a pool.
#[derive(Clone, Debug, PartialEq)]
pub struct PoolParams {
    pub pool_type: PoolType,
    /// Strictly increasing token addresses.
    pub tokens: Vec<Token>,
    pub pricing: Pricing,
    pub swap_fee_percentage: Bfp,
    /// Either empty or one entry per token, the zero account meaning no
    /// manager.
    pub asset_managers: Vec<Account>,
    pub owner: Account,
    /// Managed and liquidity bootstrapping pools only.
    pub swap_enabled_on_start: bool,
    /// Managed pools only.
    pub must_allowlist_lps: bool,
    /// Managed pools only.
    pub management_swap_fee_percentage: Bfp,
    /// Weighted two token pools only.
    pub oracle_enabled: bool,
}

impl PoolParams {
    pub fn weighted(
        pool_type: PoolType,
        tokens: Vec<Token>,
        normalized_weights: Vec<Bfp>,
        swap_fee_percentage: Bfp,
    ) -> Self {
        Self::new(
            pool_type,
            tokens,
            Pricing::Weighted { normalized_weights },
            swap_fee_percentage,
        )
    }

    pub fn stable(
        pool_type: PoolType,
        tokens: Vec<Token>,
        amplification_parameter: u64,
        swap_fee_percentage: Bfp,
    ) -> Self {
        Self::new(
            pool_type,
            tokens,
            Pricing::Stable {
                amplification_parameter,
            },
            swap_fee_percentage,
        )
    }

    fn new(
        pool_type: PoolType,
        tokens: Vec<Token>,
        pricing: Pricing,
        swap_fee_percentage: Bfp,
    ) -> Self {
        Self {
            pool_type,
            tokens,
            pricing,
            swap_fee_percentage,
            asset_managers: Vec::new(),
            owner: Account::zero(),
            swap_enabled_on_start: true,
            must_allowlist_lps: false,
            management_swap_fee_percentage: Bfp::zero(),
            oracle_enabled: false,
        }
    }

    pub fn with_owner(mut self, owner: Account) -> Self {
        self.owner = owner;
        self
    }

    pub fn with_asset_managers(mut self, asset_managers: Vec<Account>) -> Self {
        self.asset_managers = asset_managers;
        self
    }

    pub fn with_swap_enabled_on_start(mut self, enabled: bool) -> Self {
        self.swap_enabled_on_start = enabled;
        self
    }

    pub fn with_must_allowlist_lps(mut self, must_allowlist_lps: bool) -> Self {
        self.must_allowlist_lps = must_allowlist_lps;
        self
    }

    pub fn with_management_swap_fee_percentage(mut self, percentage: Bfp) -> Self {
        self.management_swap_fee_percentage = percentage;
        self
    }

    pub fn with_oracle(mut self, enabled: bool) -> Self {
        self.oracle_enabled = enabled;
        self
    }

    /// Checks the parameters against the pool type and the vault limits.
    pub fn validate(&self, config: &Config) -> Result<(), Error> {
        validate_tokens(&self.tokens)?;
        if self.pool_type == PoolType::WeightedTwoToken && self.tokens.len() != 2 {
            return Err(Error::NotTwoTokens);
        }
        if !self.asset_managers.is_empty() && self.asset_managers.len() != self.tokens.len() {
            return Err(Error::InputLengthMismatch);
        }

        match (&self.pricing, self.pool_type.is_weighted()) {
            (Pricing::Weighted { normalized_weights }, true) => {
                validate_weights(normalized_weights, self.tokens.len())?
            }
            (
                Pricing::Stable {
                    amplification_parameter,
                },
                false,
            ) => {
                if self.tokens.len() > stable_math::MAX_STABLE_TOKENS {
                    return Err(Error::MaxStableTokens);
                }
                if *amplification_parameter < stable_math::MIN_AMP {
                    return Err(Error::MinAmp);
                }
                if *amplification_parameter > stable_math::MAX_AMP {
                    return Err(Error::MaxAmp);
                }
            }
            _ => return Err(Error::UnhandledByPoolType),
        }

        if self.swap_fee_percentage < config.min_swap_fee_percentage {
            return Err(Error::MinSwapFeePercentage);
        }
        if self.swap_fee_percentage > config.max_swap_fee_percentage {
            return Err(Error::MaxSwapFeePercentage);
        }
        if self.management_swap_fee_percentage > config.max_management_swap_fee_percentage {
            return Err(Error::MaxManagementSwapFeePercentage);
        }

        let dynamic_only = !self.swap_enabled_on_start
            || self.must_allowlist_lps
            || !self.management_swap_fee_percentage.is_zero();
        if dynamic_only && !self.pool_type.is_dynamic() {
            return Err(Error::UnhandledByPoolType);
        }
        if (self.must_allowlist_lps || !self.management_swap_fee_percentage.is_zero())
            && self.pool_type != PoolType::Managed
        {
            return Err(Error::UnhandledByPoolType);
        }
        if self.oracle_enabled && self.pool_type != PoolType::WeightedTwoToken {
            return Err(Error::UnhandledByPoolType);
        }
        Ok(())
    }
}

/// Token lists must hold between [`MIN_TOKENS`] and [`MAX_TOKENS`] non-zero,
/// strictly increasing addresses.
pub fn validate_tokens(tokens: &[Token]) -> Result<(), Error> {
    if tokens.len() < MIN_TOKENS {
        return Err(Error::MinTokens);
    }
    if tokens.len() > MAX_TOKENS {
        return Err(Error::MaxTokens);
    }
    if tokens.iter().any(Token::is_zero) {
        return Err(Error::ZeroToken);
    }
    if tokens.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(Error::UnsortedTokens);
    }
    Ok(())
}

/// Weights need one entry per token, each at least `MIN_WEIGHT`, summing to
/// exactly one.
pub fn validate_weights(normalized_weights: &[Bfp], token_count: usize) -> Result<(), Error> {
    if normalized_weights.len() != token_count {
        return Err(Error::InputLengthMismatch);
    }
    let mut sum = Bfp::zero();
    for weight in normalized_weights {
        if *weight < *weighted_math::MIN_WEIGHT {
            return Err(Error::MinWeight);
        }
        sum = sum.add(*weight)?;
    }
    if sum != Bfp::one() {
        return Err(Error::NormalizedWeightInvariant);
    }
    Ok(())
}
