//! Per pool accounting: balances, share supply and the invariant snapshot
//! that fees are measured against.
//!
//! Every mutating method works on `&mut self` and may leave the record half
//! updated when it fails. The vault only ever calls them on a copy that is
//! dropped on error.

use {
    crate::{
        Account,
        Token,
        batch::SwapKind,
        error::Error,
        ids::PoolId,
        oracle::Observation,
        pools::{
            PoolParams,
            PoolType,
            Pricing,
            pause::PauseState,
            scaled_amplification_parameter,
            validate_weights,
            weights::GradualWeights,
        },
        user_data::{ExitKind, JoinKind},
    },
    itertools::Itertools,
    num::{BigInt, bigint::Sign},
    number::conversions::big_int_to_u256,
    pool_math::{Bfp, fees, oracle_math, stable_math, weighted_math},
    primitive_types::U256,
    std::{
        cmp::Reverse,
        collections::{BTreeMap, BTreeSet},
    },
};

/// Shares minted to the zero account when a pool is initialized, so that
/// the supply can never drop back to zero.
pub const MINIMUM_SHARES: u64 = 1_000_000;

#[derive(Clone, Copy, Debug, Eq, PartialEq, strum::Display)]
pub enum PoolStatus {
    Uninitialized,
    Active,
    Paused,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Curve {
    Weighted(GradualWeights),
    /// Amplification parameter scaled by `AMP_PRECISION`.
    Stable { amplification_parameter: U256 },
}

/// Pool state right after the last join or exit.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InvariantSnapshot {
    pub invariant: Bfp,
    /// Weights the invariant was computed with. Empty for stable pools.
    pub normalized_weights: Vec<Bfp>,
    pub swap_fee_percentage: Bfp,
}

/// Vault wide fee settings an operation runs with.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FeeSettings {
    pub protocol_swap_fee_percentage: Bfp,
    pub protocol_fee_recipient: Account,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SwapOutcome {
    pub amount_in: Bfp,
    pub amount_out: Bfp,
    pub fee_amount: Bfp,
}

/// Result of a join or an exit.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BalanceChange {
    /// Paid into the pool on joins, out of it on exits.
    pub amounts: Vec<Bfp>,
    /// Taken out of the pool balances for the protocol.
    pub protocol_fee_amounts: Vec<Bfp>,
    /// Minted on joins, burned on exits.
    pub shares: Bfp,
    /// Minted to the owner of a managed pool.
    pub management_fee_shares: Bfp,
}

#[derive(Clone, Debug)]
pub struct PoolRecord {
    id: PoolId,
    pool_type: PoolType,
    tokens: Vec<Token>,
    asset_managers: Vec<Account>,
    owner: Account,
    curve: Curve,
    swap_fee_percentage: Bfp,
    management_swap_fee_percentage: Bfp,
    swap_enabled: bool,
    must_allowlist_lps: bool,
    allowlist: BTreeSet<Account>,
    oracle_enabled: bool,
    pause: PauseState,
    balances: Vec<Bfp>,
    total_supply: Bfp,
    shares: BTreeMap<Account, Bfp>,
    snapshot: InvariantSnapshot,
    due_protocol_fee_shares: Bfp,
    unclaimed_management_fee_shares: Bfp,
}

impl PoolRecord {
    /// A new pool. `params` must have been validated.
    pub(crate) fn new(id: PoolId, params: PoolParams, pause: PauseState) -> Self {
        let token_count = params.tokens.len();
        let curve = match params.pricing {
            Pricing::Weighted { normalized_weights } => {
                Curve::Weighted(GradualWeights::fixed(normalized_weights))
            }
            Pricing::Stable {
                amplification_parameter,
            } => Curve::Stable {
                amplification_parameter: scaled_amplification_parameter(amplification_parameter),
            },
        };
        let asset_managers = if params.asset_managers.is_empty() {
            vec![Account::zero(); token_count]
        } else {
            params.asset_managers
        };
        Self {
            id,
            pool_type: params.pool_type,
            tokens: params.tokens,
            asset_managers,
            owner: params.owner,
            curve,
            swap_fee_percentage: params.swap_fee_percentage,
            management_swap_fee_percentage: params.management_swap_fee_percentage,
            swap_enabled: params.swap_enabled_on_start,
            must_allowlist_lps: params.must_allowlist_lps,
            allowlist: BTreeSet::new(),
            oracle_enabled: params.oracle_enabled,
            pause,
            balances: vec![Bfp::zero(); token_count],
            total_supply: Bfp::zero(),
            shares: BTreeMap::new(),
            snapshot: InvariantSnapshot::default(),
            due_protocol_fee_shares: Bfp::zero(),
            unclaimed_management_fee_shares: Bfp::zero(),
        }
    }

    pub fn id(&self) -> PoolId {
        self.id
    }

    pub fn pool_type(&self) -> PoolType {
        self.pool_type
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn asset_managers(&self) -> &[Account] {
        &self.asset_managers
    }

    pub fn owner(&self) -> Account {
        self.owner
    }

    pub fn curve(&self) -> &Curve {
        &self.curve
    }

    pub fn balances(&self) -> &[Bfp] {
        &self.balances
    }

    pub fn total_supply(&self) -> Bfp {
        self.total_supply
    }

    pub fn shares_of(&self, account: Account) -> Bfp {
        self.shares.get(&account).copied().unwrap_or_default()
    }

    pub fn swap_fee_percentage(&self) -> Bfp {
        self.swap_fee_percentage
    }

    pub fn management_swap_fee_percentage(&self) -> Bfp {
        self.management_swap_fee_percentage
    }

    pub fn swap_enabled(&self) -> bool {
        self.swap_enabled
    }

    pub fn must_allowlist_lps(&self) -> bool {
        self.must_allowlist_lps
    }

    pub fn is_allowed(&self, account: Account) -> bool {
        !self.must_allowlist_lps || self.allowlist.contains(&account)
    }

    pub fn oracle_enabled(&self) -> bool {
        self.oracle_enabled
    }

    pub fn pause_state(&self) -> PauseState {
        self.pause
    }

    pub fn snapshot(&self) -> &InvariantSnapshot {
        &self.snapshot
    }

    /// Protocol fee shares accrued by a stable phantom pool and not yet
    /// collected.
    pub fn due_protocol_fee_shares(&self) -> Bfp {
        self.due_protocol_fee_shares
    }

    /// Management fee shares minted to the owner and not yet withdrawn with
    /// [`ExitKind::ManagementFeeTokensOut`].
    pub fn unclaimed_management_fee_shares(&self) -> Bfp {
        self.unclaimed_management_fee_shares
    }

    pub fn status(&self, now: u64) -> PoolStatus {
        if self.pause.is_paused(now) {
            PoolStatus::Paused
        } else if self.total_supply.is_zero() {
            PoolStatus::Uninitialized
        } else {
            PoolStatus::Active
        }
    }

    /// Normalized weights in effect at `now`. Stable pools weigh every token
    /// the same.
    pub fn normalized_weights(&self, now: u64) -> Result<Vec<Bfp>, Error> {
        match &self.curve {
            Curve::Weighted(weights) => Ok(weights.weights_at(now)?),
            Curve::Stable { .. } => {
                let count = Bfp::from(self.tokens.len() as u64);
                Ok(vec![Bfp::one().div_down(count)?; self.tokens.len()])
            }
        }
    }

    pub fn token_index(&self, token: Token) -> Result<usize, Error> {
        self.tokens
            .iter()
            .position(|registered| *registered == token)
            .ok_or(Error::TokenNotRegistered)
    }

    pub(crate) fn set_paused(&mut self, paused: bool, now: u64) -> Result<(), Error> {
        self.pause.set_paused(paused, now)
    }

    pub(crate) fn set_swap_enabled(&mut self, enabled: bool, now: u64) -> Result<(), Error> {
        if !self.pool_type.is_dynamic() {
            return Err(Error::UnhandledByPoolType);
        }
        self.ensure_not_paused(now)?;
        self.swap_enabled = enabled;
        Ok(())
    }

    /// Schedules a linear move from the current weights to `end_weights`.
    /// A start time in the past starts the update now.
    pub(crate) fn update_weights_gradually(
        &mut self,
        start_time: u64,
        end_time: u64,
        end_weights: Vec<Bfp>,
        now: u64,
    ) -> Result<&GradualWeights, Error> {
        if !self.pool_type.is_dynamic() {
            return Err(Error::UnhandledByPoolType);
        }
        self.ensure_not_paused(now)?;
        validate_weights(&end_weights, self.tokens.len())?;
        let Curve::Weighted(schedule) = &mut self.curve else {
            return Err(Error::UnhandledByPoolType);
        };
        let start_time = start_time.max(now);
        if end_time < start_time {
            return Err(Error::GradualUpdateTimeTravel);
        }
        *schedule = GradualWeights {
            start_time,
            end_time,
            start_weights: schedule.weights_at(now)?,
            end_weights,
        };
        Ok(&*schedule)
    }

    pub(crate) fn add_allowed_address(&mut self, account: Account) -> Result<(), Error> {
        if self.pool_type != PoolType::Managed {
            return Err(Error::UnhandledByPoolType);
        }
        if !self.allowlist.insert(account) {
            return Err(Error::AddressAlreadyAllowlisted);
        }
        Ok(())
    }

    pub(crate) fn remove_allowed_address(&mut self, account: Account) -> Result<(), Error> {
        if self.pool_type != PoolType::Managed {
            return Err(Error::UnhandledByPoolType);
        }
        if !self.allowlist.remove(&account) {
            return Err(Error::AddressNotAllowlisted);
        }
        Ok(())
    }

    /// Applies signed balance deltas reported by asset managers. The snapshot
    /// moves with the balances, so these changes never count as fee bearing
    /// growth.
    pub(crate) fn update_balances(&mut self, deltas: &[BigInt]) -> Result<(), Error> {
        if deltas.len() != self.balances.len() {
            return Err(Error::InputLengthMismatch);
        }
        let previous_invariant = if self.total_supply.is_zero() {
            None
        } else {
            Some(self.invariant_with_snapshot_curve()?)
        };
        for (balance, delta) in self.balances.iter_mut().zip(deltas) {
            let updated = balance.to_big_int() + delta;
            if updated.sign() == Sign::Minus {
                return Err(pool_math::Error::SubOverflow.into());
            }
            let updated =
                big_int_to_u256(&updated).map_err(|_| pool_math::Error::AddOverflow)?;
            *balance = Bfp::from_wei(updated);
        }
        if let Some(previous_invariant) = previous_invariant {
            let current_invariant = self.invariant_with_snapshot_curve()?;
            self.snapshot.invariant = self
                .snapshot
                .invariant
                .mul_up(current_invariant)?
                .div_up(previous_invariant)?;
        }
        Ok(())
    }

    pub(crate) fn on_swap(
        &mut self,
        kind: SwapKind,
        token_in: usize,
        token_out: usize,
        amount: Bfp,
        fees: &FeeSettings,
        now: u64,
    ) -> Result<SwapOutcome, Error> {
        self.ensure_active(now)?;
        if !self.swap_enabled {
            return Err(Error::SwapsDisabled);
        }
        if token_in == token_out {
            return Err(Error::CannotSwapSameToken);
        }
        let count = self.tokens.len();
        if token_in >= count || token_out >= count {
            return Err(Error::OutOfBounds);
        }

        let outcome = match kind {
            SwapKind::GivenIn => {
                let fee_amount = amount.mul_up(self.swap_fee_percentage)?;
                let amount_out =
                    self.calc_out_given_in(token_in, token_out, amount.sub(fee_amount)?, now)?;
                SwapOutcome {
                    amount_in: amount,
                    amount_out,
                    fee_amount,
                }
            }
            SwapKind::GivenOut => {
                let amount_in_without_fee =
                    self.calc_in_given_out(token_in, token_out, amount, now)?;
                let amount_in =
                    amount_in_without_fee.div_up(self.swap_fee_percentage.complement())?;
                SwapOutcome {
                    amount_in,
                    amount_out: amount,
                    fee_amount: amount_in.sub(amount_in_without_fee)?,
                }
            }
        };

        self.balances[token_in] = self.balances[token_in].add(outcome.amount_in)?;
        self.balances[token_out] = self.balances[token_out].sub(outcome.amount_out)?;
        if self.pool_type == PoolType::StablePhantom {
            self.accrue_protocol_fee_shares(token_in, outcome.fee_amount, fees)?;
        }
        Ok(outcome)
    }

    pub(crate) fn on_join(
        &mut self,
        sender: Account,
        recipient: Account,
        kind: JoinKind,
        fees: &FeeSettings,
        now: u64,
    ) -> Result<BalanceChange, Error> {
        self.ensure_not_paused(now)?;
        if self.total_supply.is_zero() {
            return match kind {
                JoinKind::Init { amounts_in } => self.initialize(recipient, &amounts_in, now),
                _ => Err(Error::Uninitialized),
            };
        }
        if !self.is_allowed(sender) {
            return Err(Error::AddressNotAllowlisted);
        }
        if !self.swap_enabled && !kind.is_proportional() {
            return Err(Error::InvalidJoinExitKindWhileSwapsDisabled);
        }

        let protocol_fee_amounts = self.charge_protocol_fees(fees)?;
        let management_fee_shares = self.charge_management_fee()?;
        let mut shares_recipient = recipient;
        let (amounts_in, shares_out) = match kind {
            JoinKind::Init { .. } => return Err(Error::AlreadyInitialized),
            JoinKind::ExactTokensInForSharesOut {
                amounts_in,
                min_shares_out,
            } => {
                let amounts_in = self.token_amounts(&amounts_in)?;
                let shares_out = self.share_out_given_exact_tokens_in(&amounts_in, now)?;
                if shares_out < Bfp::from_wei(min_shares_out) {
                    return Err(Error::ShareOutMinAmount);
                }
                (amounts_in, shares_out)
            }
            JoinKind::TokenInForExactSharesOut {
                shares_out,
                token_index,
            } => {
                self.check_index(token_index)?;
                let shares_out = Bfp::from_wei(shares_out);
                let amount_in = self.token_in_given_exact_share_out(token_index, shares_out, now)?;
                (self.single_token(token_index, amount_in), shares_out)
            }
            JoinKind::AllTokensInForExactSharesOut { shares_out } => {
                let shares_out = Bfp::from_wei(shares_out);
                let amounts_in = weighted_math::calc_all_tokens_in_given_exact_share_out(
                    &self.balances,
                    shares_out,
                    self.virtual_supply()?,
                )?;
                (amounts_in, shares_out)
            }
            JoinKind::CollectProtocolFees => {
                if self.pool_type != PoolType::StablePhantom {
                    return Err(Error::UnhandledJoinKind);
                }
                shares_recipient = fees.protocol_fee_recipient;
                let shares_out = std::mem::take(&mut self.due_protocol_fee_shares);
                (vec![Bfp::zero(); self.tokens.len()], shares_out)
            }
        };

        for (balance, amount_in) in self.balances.iter_mut().zip(&amounts_in) {
            *balance = balance.add(*amount_in)?;
        }
        self.mint(shares_recipient, shares_out)?;
        self.update_snapshot(now)?;
        Ok(BalanceChange {
            amounts: amounts_in,
            protocol_fee_amounts,
            shares: shares_out,
            management_fee_shares,
        })
    }

    pub(crate) fn on_exit(
        &mut self,
        sender: Account,
        kind: ExitKind,
        fees: &FeeSettings,
        now: u64,
    ) -> Result<BalanceChange, Error> {
        self.ensure_active(now)?;
        if !self.swap_enabled && !kind.is_proportional() {
            return Err(Error::InvalidJoinExitKindWhileSwapsDisabled);
        }
        if kind == ExitKind::ManagementFeeTokensOut {
            if self.pool_type != PoolType::Managed {
                return Err(Error::UnhandledExitKind);
            }
            if sender != self.owner {
                return Err(Error::CallerNotOwner);
            }
        }

        let protocol_fee_amounts = self.charge_protocol_fees(fees)?;
        let management_fee_shares = self.charge_management_fee()?;
        let (amounts_out, shares_in) = match kind {
            ExitKind::ExactSharesInForOneTokenOut {
                shares_in,
                token_index,
            } => {
                self.check_index(token_index)?;
                let shares_in = Bfp::from_wei(shares_in);
                let amount_out = self.token_out_given_exact_share_in(token_index, shares_in, now)?;
                (self.single_token(token_index, amount_out), shares_in)
            }
            ExitKind::ExactSharesInForTokensOut { shares_in } => {
                let shares_in = Bfp::from_wei(shares_in);
                let amounts_out = weighted_math::calc_tokens_out_given_exact_share_in(
                    &self.balances,
                    shares_in,
                    self.virtual_supply()?,
                )?;
                (amounts_out, shares_in)
            }
            ExitKind::SharesInForExactTokensOut {
                amounts_out,
                max_shares_in,
            } => {
                let amounts_out = self.token_amounts(&amounts_out)?;
                let shares_in = self.share_in_given_exact_tokens_out(&amounts_out, now)?;
                if shares_in > Bfp::from_wei(max_shares_in) {
                    return Err(Error::ShareInMaxAmount);
                }
                (amounts_out, shares_in)
            }
            ExitKind::ManagementFeeTokensOut => {
                // The owner may have exited some of the fee shares already.
                let shares_in = std::mem::take(&mut self.unclaimed_management_fee_shares)
                    .min(self.shares_of(sender));
                let amounts_out = weighted_math::calc_tokens_out_given_exact_share_in(
                    &self.balances,
                    shares_in,
                    self.virtual_supply()?,
                )?;
                (amounts_out, shares_in)
            }
        };

        self.burn(sender, shares_in)?;
        for (balance, amount_out) in self.balances.iter_mut().zip(&amounts_out) {
            *balance = balance.sub(*amount_out)?;
        }
        self.update_snapshot(now)?;
        Ok(BalanceChange {
            amounts: amounts_out,
            protocol_fee_amounts,
            shares: shares_in,
            management_fee_shares,
        })
    }

    /// Oracle values for the current state of an initialized two token
    /// weighted pool with the oracle enabled.
    pub(crate) fn observation(&self, now: u64) -> Result<Option<Observation>, Error> {
        let Curve::Weighted(weights) = &self.curve else {
            return Ok(None);
        };
        if !self.oracle_enabled || self.total_supply.is_zero() {
            return Ok(None);
        }
        let weights = weights.weights_at(now)?;
        let log_total_supply = oracle_math::to_low_res_log(self.total_supply)?;
        Ok(Some(Observation {
            log_pair_price: oracle_math::calc_log_spot_price(
                weights[0],
                self.balances[0],
                weights[1],
                self.balances[1],
            )?,
            log_share_price: oracle_math::calc_log_share_price(
                weights[0],
                self.balances[0],
                log_total_supply,
            )?,
            log_invariant: oracle_math::to_low_res_log(weighted_math::calculate_invariant(
                &weights,
                &self.balances,
            )?)?,
        }))
    }

    fn initialize(
        &mut self,
        recipient: Account,
        amounts_in: &[U256],
        now: u64,
    ) -> Result<BalanceChange, Error> {
        let amounts_in = self.token_amounts(amounts_in)?;
        let shares_out = match &self.curve {
            Curve::Weighted(weights) => {
                let invariant = weighted_math::calculate_invariant(&weights.weights_at(now)?, &amounts_in)?;
                invariant.mul_down(Bfp::from(self.tokens.len() as u64))?
            }
            Curve::Stable {
                amplification_parameter,
            } => stable_math::calculate_invariant(*amplification_parameter, &amounts_in)?,
        };
        let minimum = Bfp::from_wei(MINIMUM_SHARES.into());
        if shares_out <= minimum {
            return Err(Error::MinimumShares);
        }

        self.balances.clone_from(&amounts_in);
        self.mint(Account::zero(), minimum)?;
        self.mint(recipient, shares_out.sub(minimum)?)?;
        self.update_snapshot(now)?;
        Ok(BalanceChange {
            amounts: amounts_in,
            protocol_fee_amounts: vec![Bfp::zero(); self.tokens.len()],
            shares: shares_out,
            management_fee_shares: Bfp::zero(),
        })
    }

    /// Takes the protocol's cut of the swap fees earned since the last
    /// snapshot out of the balances, in a single token.
    fn charge_protocol_fees(&mut self, fees: &FeeSettings) -> Result<Vec<Bfp>, Error> {
        let mut amounts = vec![Bfp::zero(); self.tokens.len()];
        let percentage = fees.protocol_swap_fee_percentage;
        if !self.pool_type.pays_protocol_fee_in_tokens() || percentage.is_zero() {
            return Ok(amounts);
        }

        let previous_invariant = self.snapshot.invariant;
        let (index, amount) = match &self.curve {
            Curve::Weighted(_) => {
                let weights = &self.snapshot.normalized_weights;
                let index = first_max(weights);
                let current_invariant = weighted_math::calculate_invariant(weights, &self.balances)?;
                let amount = weighted_math::calc_due_token_protocol_swap_fee_amount(
                    self.balances[index],
                    weights[index],
                    previous_invariant,
                    current_invariant,
                    percentage,
                )?;
                (index, amount)
            }
            Curve::Stable {
                amplification_parameter,
            } => {
                let index = first_max(&self.balances);
                let amount = stable_math::calc_due_token_protocol_swap_fee_amount(
                    *amplification_parameter,
                    &self.balances,
                    previous_invariant,
                    index,
                    percentage,
                )?;
                (index, amount)
            }
        };
        self.balances[index] = self.balances[index].sub(amount)?;
        amounts[index] = amount;
        Ok(amounts)
    }

    /// Mints the owner of a managed pool its share of the invariant growth
    /// since the last snapshot.
    fn charge_management_fee(&mut self) -> Result<Bfp, Error> {
        if self.pool_type != PoolType::Managed || self.management_swap_fee_percentage.is_zero() {
            return Ok(Bfp::zero());
        }
        let shares = fees::calc_fee_share_amount(
            self.total_supply,
            self.snapshot.invariant,
            self.invariant_with_snapshot_curve()?,
            self.management_swap_fee_percentage,
        )?;
        self.mint(self.owner, shares)?;
        self.unclaimed_management_fee_shares = self.unclaimed_management_fee_shares.add(shares)?;
        Ok(shares)
    }

    /// Invariant of the current balances with the weights or amplification
    /// of the last snapshot, comparable to `snapshot.invariant`.
    fn invariant_with_snapshot_curve(&self) -> Result<Bfp, Error> {
        Ok(match &self.curve {
            Curve::Weighted(_) => weighted_math::calculate_invariant(
                &self.snapshot.normalized_weights,
                &self.balances,
            )?,
            Curve::Stable {
                amplification_parameter,
            } => stable_math::calculate_invariant(*amplification_parameter, &self.balances)?,
        })
    }

    /// Converts the protocol cut of a phantom pool swap fee into shares owed
    /// to the protocol.
    fn accrue_protocol_fee_shares(
        &mut self,
        token_in: usize,
        fee_amount: Bfp,
        fees: &FeeSettings,
    ) -> Result<(), Error> {
        let Curve::Stable {
            amplification_parameter,
        } = self.curve
        else {
            return Ok(());
        };
        let protocol_fee = fee_amount.mul_down(fees.protocol_swap_fee_percentage)?;
        if protocol_fee.is_zero() {
            return Ok(());
        }

        // Value the fee as a single token join on top of the balances without
        // it.
        let mut balances = self.balances.clone();
        balances[token_in] = balances[token_in].sub(protocol_fee)?;
        let mut amounts_in = vec![Bfp::zero(); balances.len()];
        amounts_in[token_in] = protocol_fee;
        let invariant = stable_math::calculate_invariant(amplification_parameter, &balances)?;
        let shares = stable_math::calc_share_out_given_exact_tokens_in(
            amplification_parameter,
            &balances,
            &amounts_in,
            self.virtual_supply()?,
            invariant,
            Bfp::zero(),
        )?;
        self.due_protocol_fee_shares = self.due_protocol_fee_shares.add(shares)?;
        Ok(())
    }

    fn update_snapshot(&mut self, now: u64) -> Result<(), Error> {
        self.snapshot = match &self.curve {
            Curve::Weighted(weights) => {
                let normalized_weights = weights.weights_at(now)?;
                InvariantSnapshot {
                    invariant: weighted_math::calculate_invariant(
                        &normalized_weights,
                        &self.balances,
                    )?,
                    normalized_weights,
                    swap_fee_percentage: self.swap_fee_percentage,
                }
            }
            Curve::Stable {
                amplification_parameter,
            } => InvariantSnapshot {
                invariant: stable_math::calculate_invariant(
                    *amplification_parameter,
                    &self.balances,
                )?,
                normalized_weights: Vec::new(),
                swap_fee_percentage: self.swap_fee_percentage,
            },
        };
        Ok(())
    }

    fn calc_out_given_in(
        &self,
        token_in: usize,
        token_out: usize,
        amount_in: Bfp,
        now: u64,
    ) -> Result<Bfp, Error> {
        let balances = &self.balances;
        Ok(match &self.curve {
            Curve::Weighted(weights) => {
                let weights = weights.weights_at(now)?;
                weighted_math::calc_out_given_in(
                    balances[token_in],
                    weights[token_in],
                    balances[token_out],
                    weights[token_out],
                    amount_in,
                )?
            }
            Curve::Stable {
                amplification_parameter,
            } => {
                let invariant = stable_math::calculate_invariant(*amplification_parameter, balances)?;
                stable_math::calc_out_given_in(
                    *amplification_parameter,
                    balances,
                    token_in,
                    token_out,
                    amount_in,
                    invariant,
                )?
            }
        })
    }

    fn calc_in_given_out(
        &self,
        token_in: usize,
        token_out: usize,
        amount_out: Bfp,
        now: u64,
    ) -> Result<Bfp, Error> {
        let balances = &self.balances;
        Ok(match &self.curve {
            Curve::Weighted(weights) => {
                let weights = weights.weights_at(now)?;
                weighted_math::calc_in_given_out(
                    balances[token_in],
                    weights[token_in],
                    balances[token_out],
                    weights[token_out],
                    amount_out,
                )?
            }
            Curve::Stable {
                amplification_parameter,
            } => {
                let invariant = stable_math::calculate_invariant(*amplification_parameter, balances)?;
                stable_math::calc_in_given_out(
                    *amplification_parameter,
                    balances,
                    token_in,
                    token_out,
                    amount_out,
                    invariant,
                )?
            }
        })
    }

    fn share_out_given_exact_tokens_in(&self, amounts_in: &[Bfp], now: u64) -> Result<Bfp, Error> {
        let supply = self.virtual_supply()?;
        Ok(match &self.curve {
            Curve::Weighted(weights) => weighted_math::calc_share_out_given_exact_tokens_in(
                &self.balances,
                &weights.weights_at(now)?,
                amounts_in,
                supply,
                self.swap_fee_percentage,
            )?,
            Curve::Stable {
                amplification_parameter,
            } => stable_math::calc_share_out_given_exact_tokens_in(
                *amplification_parameter,
                &self.balances,
                amounts_in,
                supply,
                stable_math::calculate_invariant(*amplification_parameter, &self.balances)?,
                self.swap_fee_percentage,
            )?,
        })
    }

    fn token_in_given_exact_share_out(
        &self,
        token_index: usize,
        shares_out: Bfp,
        now: u64,
    ) -> Result<Bfp, Error> {
        let supply = self.virtual_supply()?;
        Ok(match &self.curve {
            Curve::Weighted(weights) => weighted_math::calc_token_in_given_exact_share_out(
                self.balances[token_index],
                weights.weights_at(now)?[token_index],
                shares_out,
                supply,
                self.swap_fee_percentage,
            )?,
            Curve::Stable {
                amplification_parameter,
            } => stable_math::calc_token_in_given_exact_share_out(
                *amplification_parameter,
                &self.balances,
                token_index,
                shares_out,
                supply,
                stable_math::calculate_invariant(*amplification_parameter, &self.balances)?,
                self.swap_fee_percentage,
            )?,
        })
    }

    fn share_in_given_exact_tokens_out(&self, amounts_out: &[Bfp], now: u64) -> Result<Bfp, Error> {
        let supply = self.virtual_supply()?;
        Ok(match &self.curve {
            Curve::Weighted(weights) => weighted_math::calc_share_in_given_exact_tokens_out(
                &self.balances,
                &weights.weights_at(now)?,
                amounts_out,
                supply,
                self.swap_fee_percentage,
            )?,
            Curve::Stable {
                amplification_parameter,
            } => stable_math::calc_share_in_given_exact_tokens_out(
                *amplification_parameter,
                &self.balances,
                amounts_out,
                supply,
                stable_math::calculate_invariant(*amplification_parameter, &self.balances)?,
                self.swap_fee_percentage,
            )?,
        })
    }

    fn token_out_given_exact_share_in(
        &self,
        token_index: usize,
        shares_in: Bfp,
        now: u64,
    ) -> Result<Bfp, Error> {
        let supply = self.virtual_supply()?;
        Ok(match &self.curve {
            Curve::Weighted(weights) => weighted_math::calc_token_out_given_exact_share_in(
                self.balances[token_index],
                weights.weights_at(now)?[token_index],
                shares_in,
                supply,
                self.swap_fee_percentage,
            )?,
            Curve::Stable {
                amplification_parameter,
            } => stable_math::calc_token_out_given_exact_share_in(
                *amplification_parameter,
                &self.balances,
                token_index,
                shares_in,
                supply,
                stable_math::calculate_invariant(*amplification_parameter, &self.balances)?,
                self.swap_fee_percentage,
            )?,
        })
    }

    /// Supply including protocol fee shares that are owed but not minted.
    fn virtual_supply(&self) -> Result<Bfp, Error> {
        Ok(self.total_supply.add(self.due_protocol_fee_shares)?)
    }

    fn ensure_not_paused(&self, now: u64) -> Result<(), Error> {
        if self.pause.is_paused(now) {
            return Err(Error::Paused);
        }
        Ok(())
    }

    fn ensure_active(&self, now: u64) -> Result<(), Error> {
        match self.status(now) {
            PoolStatus::Active => Ok(()),
            PoolStatus::Paused => Err(Error::Paused),
            PoolStatus::Uninitialized => Err(Error::Uninitialized),
        }
    }

    fn check_index(&self, token_index: usize) -> Result<(), Error> {
        if token_index >= self.tokens.len() {
            return Err(Error::OutOfBounds);
        }
        Ok(())
    }

    fn token_amounts(&self, amounts: &[U256]) -> Result<Vec<Bfp>, Error> {
        if amounts.len() != self.tokens.len() {
            return Err(Error::InputLengthMismatch);
        }
        Ok(amounts.iter().copied().map(Bfp::from_wei).collect())
    }

    fn single_token(&self, token_index: usize, amount: Bfp) -> Vec<Bfp> {
        let mut amounts = vec![Bfp::zero(); self.tokens.len()];
        amounts[token_index] = amount;
        amounts
    }

    fn mint(&mut self, account: Account, amount: Bfp) -> Result<(), Error> {
        if amount.is_zero() {
            return Ok(());
        }
        let balance = self.shares.entry(account).or_default();
        *balance = balance.add(amount)?;
        self.total_supply = self.total_supply.add(amount)?;
        Ok(())
    }

    fn burn(&mut self, account: Account, amount: Bfp) -> Result<(), Error> {
        let balance = self.shares.entry(account).or_default();
        *balance = balance.sub(amount).map_err(|_| Error::InsufficientShares)?;
        self.total_supply = self.total_supply.sub(amount)?;
        Ok(())
    }
}

/// Index of the first largest value.
fn first_max(values: &[Bfp]) -> usize {
    values
        .iter()
        .position_min_by_key(|value| Reverse(**value))
        .unwrap_or_default()
}
