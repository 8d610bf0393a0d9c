use {
    crate::{Account, error::Error},
    anyhow::{Context, Result},
    pool_math::Bfp,
    serde::Deserialize,
    std::{path::Path, sync::LazyLock, time::Duration},
};

const DAY: u64 = 24 * 60 * 60;

pub const MAX_PAUSE_WINDOW_DURATION: Duration = Duration::from_secs(270 * DAY);
pub const MAX_BUFFER_PERIOD_DURATION: Duration = Duration::from_secs(90 * DAY);
/// 50%
pub static MAX_PROTOCOL_SWAP_FEE_PERCENTAGE: LazyLock<Bfp> =
    LazyLock::new(|| Bfp::from_wei(500_000_000_000_000_000_u64.into()));

/// Vault wide settings consumed when pools are registered and when fees are
/// charged.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct Config {
    /// Time after the vault is created during which pools can be paused.
    #[serde(with = "humantime_serde")]
    pub pause_window_duration: Duration,

    /// Time after the pause window during which a paused pool stays paused.
    #[serde(with = "humantime_serde")]
    pub buffer_period_duration: Duration,

    pub min_swap_fee_percentage: Bfp,
    pub max_swap_fee_percentage: Bfp,

    /// Cut of the swap fees collected by the protocol.
    pub protocol_swap_fee_percentage: Bfp,

    /// Receives the phantom pool protocol fee shares. Defaults to the zero
    /// account, which locks them.
    pub protocol_fee_recipient: Account,

    pub max_management_swap_fee_percentage: Bfp,

    pub oracle: OracleConfig,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct OracleConfig {
    /// Number of samples kept per pool.
    pub buffer_size: usize,

    /// Updates closer together than this are merged into one sample.
    #[serde(with = "humantime_serde")]
    pub sample_duration: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pause_window_duration: Duration::from_secs(90 * DAY),
            buffer_period_duration: Duration::from_secs(30 * DAY),
            // 0.0001%
            min_swap_fee_percentage: Bfp::from_wei(1_000_000_000_000_u64.into()),
            // 10%
            max_swap_fee_percentage: Bfp::from_wei(100_000_000_000_000_000_u64.into()),
            protocol_swap_fee_percentage: Bfp::zero(),
            protocol_fee_recipient: Account::zero(),
            max_management_swap_fee_percentage: Bfp::one(),
            oracle: OracleConfig::default(),
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1024,
            sample_duration: Duration::from_secs(2 * 60),
        }
    }
}

impl Config {
    /// Reads a TOML file and validates it.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading vault config {}", path.display()))?;
        let config = Self::from_toml(&data)
            .with_context(|| format!("parsing vault config {}", path.display()))?;
        tracing::debug!(?config, "loaded vault config");
        Ok(config)
    }

    pub fn from_toml(data: &str) -> Result<Self> {
        let config: Self = toml::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.pause_window_duration > MAX_PAUSE_WINDOW_DURATION {
            return Err(Error::MaxPauseWindowDuration);
        }
        if self.buffer_period_duration > MAX_BUFFER_PERIOD_DURATION {
            return Err(Error::MaxBufferPeriodDuration);
        }
        if self.min_swap_fee_percentage > self.max_swap_fee_percentage {
            return Err(Error::MinSwapFeePercentage);
        }
        if self.max_swap_fee_percentage >= Bfp::one() {
            return Err(Error::MaxSwapFeePercentage);
        }
        if self.protocol_swap_fee_percentage > *MAX_PROTOCOL_SWAP_FEE_PERCENTAGE {
            return Err(Error::MaxProtocolSwapFeePercentage);
        }
        if self.max_management_swap_fee_percentage > Bfp::one() {
            return Err(Error::MaxManagementSwapFeePercentage);
        }
        Ok(())
    }
}
