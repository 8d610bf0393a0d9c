//! StableSwap invariant, swap and liquidity formulas.
//!
//! The amplification parameter is always passed multiplied by
//! [`AMP_PRECISION`].

use {
    super::{error::Error, fixed_point::Bfp, math::BalU256},
    primitive_types::U256,
    std::sync::LazyLock,
};

pub const MIN_AMP: u64 = 1;
pub const MAX_AMP: u64 = 5_000;
pub const AMP_PRECISION: u64 = 1_000;
pub const MAX_STABLE_TOKENS: usize = 5;

const MAX_ITERATIONS: usize = 255;

static AMP_PRECISION_U256: LazyLock<U256> = LazyLock::new(|| U256::from(AMP_PRECISION));

fn has_converged(current: U256, previous: U256) -> bool {
    current.abs_diff(previous) <= U256::one()
}

fn sum(balances: &[Bfp]) -> Result<Bfp, Error> {
    balances
        .iter()
        .try_fold(Bfp::zero(), |sum, balance| sum.add(*balance))
}

/// Computes the invariant `D` by Newton iteration on
/// `A * n^n * S + D = A * D * n^n + D^(n+1) / (n^n * P)`, rounding down.
pub fn calculate_invariant(amplification_parameter: U256, balances: &[Bfp]) -> Result<Bfp, Error> {
    invariant_within(amplification_parameter, balances, MAX_ITERATIONS)
}

fn invariant_within(
    amplification_parameter: U256,
    balances: &[Bfp],
    max_iterations: usize,
) -> Result<Bfp, Error> {
    let sum = sum(balances)?.as_uint256();
    if sum.is_zero() {
        return Ok(Bfp::zero());
    }

    let num_tokens = U256::from(balances.len());
    let amp_times_total = amplification_parameter.bmul(num_tokens)?;
    let mut invariant = sum;

    for _ in 0..max_iterations {
        let mut d_p = invariant;
        for balance in balances {
            d_p = d_p
                .bmul(invariant)?
                .bdiv_down(balance.as_uint256().bmul(num_tokens)?)?;
        }

        let previous_invariant = invariant;
        let numerator = amp_times_total
            .bmul(sum)?
            .bdiv_down(*AMP_PRECISION_U256)?
            .badd(d_p.bmul(num_tokens)?)?
            .bmul(invariant)?;
        let denominator = amp_times_total
            .bsub(*AMP_PRECISION_U256)?
            .bmul(invariant)?
            .bdiv_down(*AMP_PRECISION_U256)?
            .badd(num_tokens.badd(U256::one())?.bmul(d_p)?)?;
        invariant = numerator.bdiv_down(denominator)?;

        if has_converged(invariant, previous_invariant) {
            return Ok(Bfp::from_wei(invariant));
        }
    }

    Err(Error::StableInvariantDidntConverge)
}

/// Solves the invariant equation for the balance of `token_index` keeping
/// every other balance fixed, rounding up.
pub fn get_token_balance_given_invariant_and_all_other_balances(
    amplification_parameter: U256,
    balances: &[Bfp],
    invariant: Bfp,
    token_index: usize,
) -> Result<Bfp, Error> {
    token_balance_within(
        amplification_parameter,
        balances,
        invariant,
        token_index,
        MAX_ITERATIONS,
    )
}

fn token_balance_within(
    amplification_parameter: U256,
    balances: &[Bfp],
    invariant: Bfp,
    token_index: usize,
    max_iterations: usize,
) -> Result<Bfp, Error> {
    let invariant = invariant.as_uint256();
    let num_tokens = U256::from(balances.len());
    let amp_times_total = amplification_parameter.bmul(num_tokens)?;
    let first = balances.first().ok_or(Error::OutOfBounds)?.as_uint256();
    let current = balances.get(token_index).ok_or(Error::OutOfBounds)?.as_uint256();

    let mut sum = first;
    let mut p_d = first.bmul(num_tokens)?;
    for balance in &balances[1..] {
        p_d = p_d
            .bmul(balance.as_uint256())?
            .bmul(num_tokens)?
            .bdiv_down(invariant)?;
        sum = sum.badd(balance.as_uint256())?;
    }
    let sum = sum.bsub(current)?;

    let inv2 = invariant.bmul(invariant)?;
    // Quadratic terms of `balance^2 + (b - D) * balance = c`.
    let c = inv2
        .bdiv_up(amp_times_total.bmul(p_d)?)?
        .bmul(*AMP_PRECISION_U256)?
        .bmul(current)?;
    let b = sum.badd(
        invariant
            .bdiv_down(amp_times_total)?
            .bmul(*AMP_PRECISION_U256)?,
    )?;

    let mut token_balance = inv2.badd(c)?.bdiv_up(invariant.badd(b)?)?;
    for _ in 0..max_iterations {
        let previous_token_balance = token_balance;
        token_balance = token_balance
            .bmul(token_balance)?
            .badd(c)?
            .bdiv_up(
                token_balance
                    .bmul(U256::from(2))?
                    .badd(b)?
                    .bsub(invariant)?,
            )?;

        if has_converged(token_balance, previous_token_balance) {
            return Ok(Bfp::from_wei(token_balance));
        }
    }

    Err(Error::StableGetBalanceDidntConverge)
}

/// Tokens out for exactly `token_amount_in`, rounded down.
pub fn calc_out_given_in(
    amplification_parameter: U256,
    balances: &[Bfp],
    token_index_in: usize,
    token_index_out: usize,
    token_amount_in: Bfp,
    invariant: Bfp,
) -> Result<Bfp, Error> {
    let mut balances = balances.to_vec();
    let balance_in = balances.get_mut(token_index_in).ok_or(Error::OutOfBounds)?;
    *balance_in = balance_in.add(token_amount_in)?;

    let final_balance_out = get_token_balance_given_invariant_and_all_other_balances(
        amplification_parameter,
        &balances,
        invariant,
        token_index_out,
    )?;

    balances[token_index_out]
        .sub(final_balance_out)?
        .sub(Bfp::from_wei(U256::one()))
}

/// Tokens in for exactly `token_amount_out`, rounded up.
pub fn calc_in_given_out(
    amplification_parameter: U256,
    balances: &[Bfp],
    token_index_in: usize,
    token_index_out: usize,
    token_amount_out: Bfp,
    invariant: Bfp,
) -> Result<Bfp, Error> {
    let mut balances = balances.to_vec();
    let balance_out = balances.get_mut(token_index_out).ok_or(Error::OutOfBounds)?;
    *balance_out = balance_out.sub(token_amount_out)?;

    let final_balance_in = get_token_balance_given_invariant_and_all_other_balances(
        amplification_parameter,
        &balances,
        invariant,
        token_index_in,
    )?;

    final_balance_in
        .sub(balances[token_index_in])?
        .add(Bfp::from_wei(U256::one()))
}

/// Shares minted for an arbitrary deposit. The share of each balance in the
/// pool total plays the role of the weight: deposits above the ratio at which
/// the invariant grows pay the swap fee.
pub fn calc_share_out_given_exact_tokens_in(
    amplification_parameter: U256,
    balances: &[Bfp],
    amounts_in: &[Bfp],
    total_supply: Bfp,
    current_invariant: Bfp,
    swap_fee_percentage: Bfp,
) -> Result<Bfp, Error> {
    let sum_balances = sum(balances)?;

    let mut balance_ratios_with_fee = Vec::with_capacity(amounts_in.len());
    let mut invariant_ratio_with_fees = Bfp::zero();
    for (balance, amount_in) in balances.iter().zip(amounts_in) {
        let current_weight = balance.div_down(sum_balances)?;
        let ratio = balance.add(*amount_in)?.div_down(*balance)?;
        invariant_ratio_with_fees = invariant_ratio_with_fees.add(ratio.mul_down(current_weight)?)?;
        balance_ratios_with_fee.push(ratio);
    }

    let new_balances = balances
        .iter()
        .zip(amounts_in)
        .zip(&balance_ratios_with_fee)
        .map(|((balance, amount_in), balance_ratio_with_fee)| {
            let amount_in_without_fee = if *balance_ratio_with_fee > invariant_ratio_with_fees {
                let non_taxable_amount =
                    balance.mul_down(invariant_ratio_with_fees.sub(Bfp::one())?)?;
                let taxable_amount = amount_in.sub(non_taxable_amount)?;
                non_taxable_amount.add(taxable_amount.mul_down(swap_fee_percentage.complement())?)?
            } else {
                *amount_in
            };
            balance.add(amount_in_without_fee)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let new_invariant = calculate_invariant(amplification_parameter, &new_balances)?;
    let invariant_ratio = new_invariant.div_down(current_invariant)?;
    if invariant_ratio > Bfp::one() {
        total_supply.mul_down(invariant_ratio.sub(Bfp::one())?)
    } else {
        Ok(Bfp::zero())
    }
}

/// Single token deposit for exactly `share_amount_out`, rounded up.
pub fn calc_token_in_given_exact_share_out(
    amplification_parameter: U256,
    balances: &[Bfp],
    token_index: usize,
    share_amount_out: Bfp,
    total_supply: Bfp,
    current_invariant: Bfp,
    swap_fee_percentage: Bfp,
) -> Result<Bfp, Error> {
    let new_invariant = total_supply
        .add(share_amount_out)?
        .div_up(total_supply)?
        .mul_up(current_invariant)?;
    let new_balance = get_token_balance_given_invariant_and_all_other_balances(
        amplification_parameter,
        balances,
        new_invariant,
        token_index,
    )?;
    let balance = balances[token_index];
    let amount_in_without_fee = new_balance.sub(balance)?;

    let current_weight = balance.div_down(sum(balances)?)?;
    let taxable_amount = amount_in_without_fee.mul_up(current_weight.complement())?;
    let non_taxable_amount = amount_in_without_fee.sub(taxable_amount)?;

    non_taxable_amount.add(taxable_amount.div_up(swap_fee_percentage.complement())?)
}

/// Shares burned for an arbitrary withdrawal, rounded up.
pub fn calc_share_in_given_exact_tokens_out(
    amplification_parameter: U256,
    balances: &[Bfp],
    amounts_out: &[Bfp],
    total_supply: Bfp,
    current_invariant: Bfp,
    swap_fee_percentage: Bfp,
) -> Result<Bfp, Error> {
    let sum_balances = sum(balances)?;

    let mut balance_ratios_without_fee = Vec::with_capacity(amounts_out.len());
    let mut invariant_ratio_without_fees = Bfp::zero();
    for (balance, amount_out) in balances.iter().zip(amounts_out) {
        let current_weight = balance.div_up(sum_balances)?;
        let ratio = balance.sub(*amount_out)?.div_up(*balance)?;
        invariant_ratio_without_fees =
            invariant_ratio_without_fees.add(ratio.mul_up(current_weight)?)?;
        balance_ratios_without_fee.push(ratio);
    }

    let new_balances = balances
        .iter()
        .zip(amounts_out)
        .zip(&balance_ratios_without_fee)
        .map(|((balance, amount_out), balance_ratio_without_fee)| {
            let amount_out_with_fee = if invariant_ratio_without_fees > *balance_ratio_without_fee {
                let non_taxable_amount =
                    balance.mul_down(invariant_ratio_without_fees.complement())?;
                let taxable_amount = amount_out.sub(non_taxable_amount)?;
                non_taxable_amount.add(taxable_amount.div_up(swap_fee_percentage.complement())?)?
            } else {
                *amount_out
            };
            balance.sub(amount_out_with_fee)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let new_invariant = calculate_invariant(amplification_parameter, &new_balances)?;
    let invariant_ratio = new_invariant.div_down(current_invariant)?;
    total_supply.mul_up(invariant_ratio.complement())
}

/// Single token withdrawal for exactly `share_amount_in`, rounded down.
pub fn calc_token_out_given_exact_share_in(
    amplification_parameter: U256,
    balances: &[Bfp],
    token_index: usize,
    share_amount_in: Bfp,
    total_supply: Bfp,
    current_invariant: Bfp,
    swap_fee_percentage: Bfp,
) -> Result<Bfp, Error> {
    let new_invariant = total_supply
        .sub(share_amount_in)?
        .div_up(total_supply)?
        .mul_up(current_invariant)?;
    let new_balance = get_token_balance_given_invariant_and_all_other_balances(
        amplification_parameter,
        balances,
        new_invariant,
        token_index,
    )?;
    let balance = balances[token_index];
    let amount_out_without_fee = balance.sub(new_balance)?;

    let current_weight = balance.div_down(sum(balances)?)?;
    let taxable_amount = amount_out_without_fee.mul_up(current_weight.complement())?;
    let non_taxable_amount = amount_out_without_fee.sub(taxable_amount)?;

    non_taxable_amount.add(taxable_amount.mul_down(swap_fee_percentage.complement())?)
}

/// Amount of `token_index` owed to the protocol: the part of its balance
/// above what the last invariant requires, times the protocol percentage.
pub fn calc_due_token_protocol_swap_fee_amount(
    amplification_parameter: U256,
    balances: &[Bfp],
    last_invariant: Bfp,
    token_index: usize,
    protocol_swap_fee_percentage: Bfp,
) -> Result<Bfp, Error> {
    let final_balance = get_token_balance_given_invariant_and_all_other_balances(
        amplification_parameter,
        balances,
        last_invariant,
        token_index,
    )?;
    let balance = balances[token_index];
    if balance <= final_balance {
        return Ok(Bfp::zero());
    }

    balance
        .sub(final_balance)?
        .mul_down(protocol_swap_fee_percentage)
}
