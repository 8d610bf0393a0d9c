//! Invariant, swap and liquidity formulas of weighted pools.

use {
    super::{error::Error, fixed_point::Bfp},
    primitive_types::U256,
    std::sync::LazyLock,
};

/// Minimum normalized weight of any token, 1%.
pub static MIN_WEIGHT: LazyLock<Bfp> = LazyLock::new(|| Bfp::from_wei(U256::exp10(16)));
// Swap limits: amounts in and out cannot exceed 30% of the current balance.
static MAX_IN_RATIO: LazyLock<Bfp> = LazyLock::new(|| Bfp::from_wei(U256::exp10(17) * 3));
static MAX_OUT_RATIO: LazyLock<Bfp> = LazyLock::new(|| Bfp::from_wei(U256::exp10(17) * 3));
// Single token joins and exits cannot grow the invariant beyond 300% or shrink
// it below 70%.
static MAX_INVARIANT_RATIO: LazyLock<Bfp> = LazyLock::new(|| Bfp::from_wei(U256::exp10(18) * 3));
static MIN_INVARIANT_RATIO: LazyLock<Bfp> = LazyLock::new(|| Bfp::from_wei(U256::exp10(17) * 7));
/// Lower bound for the base of `pow` when the exponent is free; keeps the
/// relative error of the protocol fee computation bounded.
static MIN_POW_BASE_FREE_EXPONENT: LazyLock<Bfp> =
    LazyLock::new(|| Bfp::from_wei(U256::exp10(17) * 7));

/// `invariant = prod(balance_i ^ weight_i)`, rounded down.
pub fn calculate_invariant(normalized_weights: &[Bfp], balances: &[Bfp]) -> Result<Bfp, Error> {
    let mut invariant = Bfp::one();
    for (weight, balance) in normalized_weights.iter().zip(balances) {
        invariant = invariant.mul_down(balance.pow_down(*weight)?)?;
    }
    if invariant.is_zero() {
        return Err(Error::ZeroInvariant);
    }
    Ok(invariant)
}

/// Computes how many tokens can be taken out of a pool if `amount_in` are
/// sent, given the current balances and weights.
pub fn calc_out_given_in(
    balance_in: Bfp,
    weight_in: Bfp,
    balance_out: Bfp,
    weight_out: Bfp,
    amount_in: Bfp,
) -> Result<Bfp, Error> {
    // The exponent is rounded down and the base up, so the power is rounded up
    // and its complement (and the output) is rounded down.
    if amount_in > balance_in.mul_down(*MAX_IN_RATIO)? {
        return Err(Error::MaxInRatio);
    }

    let denominator = balance_in.add(amount_in)?;
    let base = balance_in.div_up(denominator)?;
    let exponent = weight_in.div_down(weight_out)?;
    let power = base.pow_up(exponent)?;

    balance_out.mul_down(power.complement())
}

/// Computes how many tokens must be sent to a pool in order to take
/// `amount_out`, given the current balances and weights.
pub fn calc_in_given_out(
    balance_in: Bfp,
    weight_in: Bfp,
    balance_out: Bfp,
    weight_out: Bfp,
    amount_out: Bfp,
) -> Result<Bfp, Error> {
    if amount_out > balance_out.mul_down(*MAX_OUT_RATIO)? {
        return Err(Error::MaxOutRatio);
    }

    let base = balance_out.div_up(balance_out.sub(amount_out)?)?;
    let exponent = weight_out.div_up(weight_in)?;
    let power = base.pow_up(exponent)?;

    let ratio = power.sub(Bfp::one())?;
    balance_in.mul_up(ratio)
}

/// Shares minted for an arbitrary deposit. Every token deposited above the
/// ratio at which the invariant grows is charged the swap fee, as if it had
/// been swapped into the other tokens first.
pub fn calc_share_out_given_exact_tokens_in(
    balances: &[Bfp],
    normalized_weights: &[Bfp],
    amounts_in: &[Bfp],
    total_supply: Bfp,
    swap_fee_percentage: Bfp,
) -> Result<Bfp, Error> {
    let mut balance_ratios_with_fee = Vec::with_capacity(amounts_in.len());
    let mut invariant_ratio_with_fees = Bfp::zero();
    for ((balance, weight), amount_in) in balances.iter().zip(normalized_weights).zip(amounts_in) {
        let ratio = balance.add(*amount_in)?.div_down(*balance)?;
        invariant_ratio_with_fees = invariant_ratio_with_fees.add(ratio.mul_down(*weight)?)?;
        balance_ratios_with_fee.push(ratio);
    }

    let mut invariant_ratio = Bfp::one();
    for (((balance, weight), amount_in), balance_ratio_with_fee) in balances
        .iter()
        .zip(normalized_weights)
        .zip(amounts_in)
        .zip(&balance_ratios_with_fee)
    {
        let amount_in_without_fee = if *balance_ratio_with_fee > invariant_ratio_with_fees {
            let non_taxable_amount =
                balance.mul_down(invariant_ratio_with_fees.sub(Bfp::one())?)?;
            let taxable_amount = amount_in.sub(non_taxable_amount)?;
            non_taxable_amount.add(taxable_amount.mul_down(swap_fee_percentage.complement())?)?
        } else {
            *amount_in
        };

        let balance_ratio = balance.add(amount_in_without_fee)?.div_down(*balance)?;
        invariant_ratio = invariant_ratio.mul_down(balance_ratio.pow_down(*weight)?)?;
    }

    if invariant_ratio >= Bfp::one() {
        total_supply.mul_down(invariant_ratio.sub(Bfp::one())?)
    } else {
        Ok(Bfp::zero())
    }
}

/// Token amount needed to mint exactly `share_amount_out` with a single token
/// deposit. The share of the deposit that is not proportional, `1 - weight`,
/// pays the swap fee.
pub fn calc_token_in_given_exact_share_out(
    balance: Bfp,
    normalized_weight: Bfp,
    share_amount_out: Bfp,
    total_supply: Bfp,
    swap_fee_percentage: Bfp,
) -> Result<Bfp, Error> {
    let invariant_ratio = total_supply.add(share_amount_out)?.div_up(total_supply)?;
    if invariant_ratio > *MAX_INVARIANT_RATIO {
        return Err(Error::MaxShareOutForTokenIn);
    }

    let balance_ratio = invariant_ratio.pow_up(Bfp::one().div_up(normalized_weight)?)?;
    let amount_in_without_fee = balance.mul_up(balance_ratio.sub(Bfp::one())?)?;

    let taxable_amount = amount_in_without_fee.mul_up(normalized_weight.complement())?;
    let non_taxable_amount = amount_in_without_fee.sub(taxable_amount)?;

    non_taxable_amount.add(taxable_amount.div_up(swap_fee_percentage.complement())?)
}

/// Proportional deposit for `share_amount_out`, rounded up.
pub fn calc_all_tokens_in_given_exact_share_out(
    balances: &[Bfp],
    share_amount_out: Bfp,
    total_supply: Bfp,
) -> Result<Vec<Bfp>, Error> {
    let share_ratio = share_amount_out.div_up(total_supply)?;
    balances
        .iter()
        .map(|balance| balance.mul_up(share_ratio))
        .collect()
}

/// Shares burned for an arbitrary withdrawal. Tokens withdrawn above the
/// proportional ratio pay the swap fee.
pub fn calc_share_in_given_exact_tokens_out(
    balances: &[Bfp],
    normalized_weights: &[Bfp],
    amounts_out: &[Bfp],
    total_supply: Bfp,
    swap_fee_percentage: Bfp,
) -> Result<Bfp, Error> {
    let mut balance_ratios_without_fee = Vec::with_capacity(amounts_out.len());
    let mut invariant_ratio_without_fees = Bfp::zero();
    for ((balance, weight), amount_out) in balances.iter().zip(normalized_weights).zip(amounts_out) {
        let ratio = balance.sub(*amount_out)?.div_up(*balance)?;
        invariant_ratio_without_fees =
            invariant_ratio_without_fees.add(ratio.mul_up(*weight)?)?;
        balance_ratios_without_fee.push(ratio);
    }

    let mut invariant_ratio = Bfp::one();
    for (((balance, weight), amount_out), balance_ratio_without_fee) in balances
        .iter()
        .zip(normalized_weights)
        .zip(amounts_out)
        .zip(&balance_ratios_without_fee)
    {
        let amount_out_with_fee = if invariant_ratio_without_fees > *balance_ratio_without_fee {
            let non_taxable_amount =
                balance.mul_down(invariant_ratio_without_fees.complement())?;
            let taxable_amount = amount_out.sub(non_taxable_amount)?;
            non_taxable_amount.add(taxable_amount.div_up(swap_fee_percentage.complement())?)?
        } else {
            *amount_out
        };

        let balance_ratio = balance.sub(amount_out_with_fee)?.div_down(*balance)?;
        invariant_ratio = invariant_ratio.mul_down(balance_ratio.pow_down(*weight)?)?;
    }

    total_supply.mul_up(invariant_ratio.complement())
}

/// Single token withdrawal for exactly `share_amount_in`. The non
/// proportional share of the withdrawal, `1 - weight`, pays the swap fee.
pub fn calc_token_out_given_exact_share_in(
    balance: Bfp,
    normalized_weight: Bfp,
    share_amount_in: Bfp,
    total_supply: Bfp,
    swap_fee_percentage: Bfp,
) -> Result<Bfp, Error> {
    let invariant_ratio = total_supply.sub(share_amount_in)?.div_up(total_supply)?;
    if invariant_ratio < *MIN_INVARIANT_RATIO {
        return Err(Error::MinShareInForTokenOut);
    }

    let balance_ratio = invariant_ratio.pow_up(Bfp::one().div_down(normalized_weight)?)?;
    let amount_out_without_fee = balance.mul_down(balance_ratio.complement())?;

    let taxable_amount = amount_out_without_fee.mul_up(normalized_weight.complement())?;
    let non_taxable_amount = amount_out_without_fee.sub(taxable_amount)?;

    non_taxable_amount.add(taxable_amount.mul_down(swap_fee_percentage.complement())?)
}

/// Proportional withdrawal for `share_amount_in`, rounded down.
pub fn calc_tokens_out_given_exact_share_in(
    balances: &[Bfp],
    share_amount_in: Bfp,
    total_supply: Bfp,
) -> Result<Vec<Bfp>, Error> {
    let share_ratio = share_amount_in.div_down(total_supply)?;
    balances
        .iter()
        .map(|balance| balance.mul_down(share_ratio))
        .collect()
}

/// Amount of a single token owed to the protocol out of the invariant growth
/// between `previous_invariant` and `current_invariant`.
pub fn calc_due_token_protocol_swap_fee_amount(
    balance: Bfp,
    normalized_weight: Bfp,
    previous_invariant: Bfp,
    current_invariant: Bfp,
    protocol_swap_fee_percentage: Bfp,
) -> Result<Bfp, Error> {
    if current_invariant <= previous_invariant {
        return Ok(Bfp::zero());
    }

    let base = previous_invariant
        .div_up(current_invariant)?
        .max(*MIN_POW_BASE_FREE_EXPONENT);
    let exponent = Bfp::one().div_down(normalized_weight)?;
    let power = base.pow_up(exponent)?;

    let token_accrued_fees = balance.mul_down(power.complement())?;
    token_accrued_fees.mul_down(protocol_swap_fee_percentage)
}

#[cfg(test)]
mod tests {
    use {super::*, crate::bfp};

    fn fp(units: u64) -> Bfp {
        Bfp::from(units)
    }

    fn wei(amount: u128) -> Bfp {
        Bfp::from_wei(amount.into())
    }

    #[test]
    fn invariant_two_tokens() {
        let weights = [bfp!("0.5"), bfp!("0.5")];
        assert_eq!(
            calculate_invariant(&weights, &[fp(100), fp(200)]).unwrap(),
            wei(141_421_356_237_306_676_156)
        );
    }

    #[test]
    fn invariant_of_empty_balance_is_an_error() {
        let weights = [bfp!("0.5"), bfp!("0.5")];
        assert_eq!(
            calculate_invariant(&weights, &[Bfp::zero(), fp(200)]).unwrap_err(),
            Error::ZeroInvariant
        );
    }

    #[test]
    fn invariant_strictly_increases_with_any_balance() {
        let weight_sets = [
            vec![bfp!("0.5"), bfp!("0.5")],
            vec![bfp!("0.3"), bfp!("0.7")],
            vec![bfp!("0.01"), bfp!("0.99")],
            vec![bfp!("0.25"), bfp!("0.5"), bfp!("0.25")],
        ];
        for weights in weight_sets {
            let balances: Vec<_> = (1..=weights.len() as u64).map(|i| fp(i * 1_000)).collect();
            let base = calculate_invariant(&weights, &balances).unwrap();
            for i in 0..balances.len() {
                let mut increased = balances.clone();
                increased[i] = increased[i].add(fp(10)).unwrap();
                let grown = calculate_invariant(&weights, &increased).unwrap();
                assert!(grown > base, "weights {weights:?} token {i}");
            }
        }
    }

    #[test]
    fn out_given_in() {
        assert_eq!(
            calc_out_given_in(fp(100), bfp!("0.3"), fp(10), bfp!("0.7"), fp(1)).unwrap(),
            wei(42_553_477_487_474_140)
        );
    }

    #[test]
    fn in_given_out() {
        assert_eq!(
            calc_in_given_out(fp(100), bfp!("0.3"), fp(10), bfp!("0.7"), fp(1)).unwrap(),
            wei(27_869_650_450_777_363_500)
        );
    }

    #[test]
    fn swap_ratio_limits() {
        let half = bfp!("0.5");
        assert_eq!(
            calc_out_given_in(fp(100), half, fp(100), half, fp(31)).unwrap_err(),
            Error::MaxInRatio
        );
        assert_eq!(
            calc_in_given_out(fp(100), half, fp(100), half, fp(31)).unwrap_err(),
            Error::MaxOutRatio
        );
    }

    #[test]
    fn swap_round_trip_without_fee_never_profits() {
        let (weight_in, weight_out) = (bfp!("0.3"), bfp!("0.7"));
        let (balance_in, balance_out) = (fp(1_000), fp(2_000));
        let amount_in = fp(10);
        let amount_out =
            calc_out_given_in(balance_in, weight_in, balance_out, weight_out, amount_in).unwrap();
        let back = calc_out_given_in(
            balance_out.sub(amount_out).unwrap(),
            weight_out,
            balance_in.add(amount_in).unwrap(),
            weight_in,
            amount_out,
        )
        .unwrap();
        assert!(back <= amount_in);
        // Only the pow error margins separate the two amounts.
        assert!(amount_in.sub(back).unwrap() < wei(100_000_000));
    }

    #[test]
    fn proportional_join_mints_proportional_shares() {
        let balances = [fp(100), fp(200)];
        let weights = [bfp!("0.5"), bfp!("0.5")];
        let supply = fp(1_000);
        let shares = calc_share_out_given_exact_tokens_in(
            &balances,
            &weights,
            &[fp(10), fp(20)],
            supply,
            bfp!("0.01"),
        )
        .unwrap();
        // Proportional deposits are never taxed and 10% more tokens means
        // (up to pow rounding) 10% more shares.
        assert!(shares <= fp(100));
        assert!(fp(100).sub(shares).unwrap() < wei(100_000_000_000));
    }

    #[test]
    fn imbalanced_join_pays_fee() {
        let balances = [fp(100), fp(200)];
        let weights = [bfp!("0.5"), bfp!("0.5")];
        let supply = fp(1_000);
        let without_fee = calc_share_out_given_exact_tokens_in(
            &balances,
            &weights,
            &[fp(10), Bfp::zero()],
            supply,
            Bfp::zero(),
        )
        .unwrap();
        let with_fee = calc_share_out_given_exact_tokens_in(
            &balances,
            &weights,
            &[fp(10), Bfp::zero()],
            supply,
            bfp!("0.1"),
        )
        .unwrap();
        assert!(with_fee < without_fee);
    }

    #[test]
    fn single_token_join_and_exit_limits() {
        let weight = bfp!("0.5");
        assert_eq!(
            calc_token_in_given_exact_share_out(fp(100), weight, fp(2_001), fp(1_000), Bfp::zero())
                .unwrap_err(),
            Error::MaxShareOutForTokenIn
        );
        assert_eq!(
            calc_token_out_given_exact_share_in(fp(100), weight, fp(301), fp(1_000), Bfp::zero())
                .unwrap_err(),
            Error::MinShareInForTokenOut
        );
    }

    #[test]
    fn single_token_join_costs_more_with_fee() {
        let weight = bfp!("0.5");
        let without_fee =
            calc_token_in_given_exact_share_out(fp(100), weight, fp(10), fp(1_000), Bfp::zero())
                .unwrap();
        let with_fee =
            calc_token_in_given_exact_share_out(fp(100), weight, fp(10), fp(1_000), bfp!("0.01"))
                .unwrap();
        assert!(with_fee > without_fee);
        // (1.01^2 - 1) * 100 = 2.01 tokens before fees.
        assert!(without_fee >= bfp!("2.01"));
    }

    #[test]
    fn single_token_exit_taxes_non_proportional_portion() {
        let weights = [bfp!("0.5"), bfp!("0.5")];
        let balances = [fp(1_000), fp(1_000)];
        let supply = calculate_invariant(&weights, &balances)
            .unwrap()
            .mul_down(fp(2))
            .unwrap();
        let share_in = Bfp::from_wei(supply.as_uint256() / 10);
        let fee = bfp!("0.01");

        let untaxed =
            calc_token_out_given_exact_share_in(balances[0], weights[0], share_in, supply, Bfp::zero())
                .unwrap();
        let taxed =
            calc_token_out_given_exact_share_in(balances[0], weights[0], share_in, supply, fee)
                .unwrap();
        assert_eq!(untaxed, wei(189_999_999_999_999_998_000));
        assert_eq!(taxed, wei(189_049_999_999_999_998_010));

        let imbalance = untaxed.mul_up(weights[0].complement()).unwrap();
        let expected_tax = imbalance
            .sub(imbalance.mul_down(fee.complement()).unwrap())
            .unwrap();
        assert!(taxed < untaxed);
        assert_eq!(untaxed.sub(taxed).unwrap(), expected_tax);
    }

    #[test]
    fn exact_tokens_out_burns_more_with_fee() {
        let balances = [fp(100), fp(200)];
        let weights = [bfp!("0.5"), bfp!("0.5")];
        let supply = fp(1_000);
        let without_fee = calc_share_in_given_exact_tokens_out(
            &balances,
            &weights,
            &[fp(10), Bfp::zero()],
            supply,
            Bfp::zero(),
        )
        .unwrap();
        let with_fee = calc_share_in_given_exact_tokens_out(
            &balances,
            &weights,
            &[fp(10), Bfp::zero()],
            supply,
            bfp!("0.1"),
        )
        .unwrap();
        assert!(with_fee > without_fee);
        let proportional = calc_share_in_given_exact_tokens_out(
            &balances,
            &weights,
            &[fp(10), fp(20)],
            supply,
            bfp!("0.1"),
        )
        .unwrap();
        assert!(proportional >= fp(100));
        assert!(proportional.sub(fp(100)).unwrap() < wei(100_000_000_000));
    }

    #[test]
    fn proportional_amounts_round_in_favour_of_pool() {
        let balances = [fp(3), wei(7)];
        let supply = fp(9);
        assert_eq!(
            calc_all_tokens_in_given_exact_share_out(&balances, fp(3), supply).unwrap(),
            vec![wei(1_000_000_000_000_000_002), wei(3)]
        );
        assert_eq!(
            calc_tokens_out_given_exact_share_in(&balances, fp(3), supply).unwrap(),
            vec![wei(999_999_999_999_999_999), wei(2)]
        );
    }

    #[test]
    fn protocol_fee_only_on_growth() {
        let weight = bfp!("0.5");
        assert_eq!(
            calc_due_token_protocol_swap_fee_amount(fp(100), weight, fp(10), fp(10), bfp!("0.5"))
                .unwrap(),
            Bfp::zero()
        );
        let due = calc_due_token_protocol_swap_fee_amount(
            fp(100),
            weight,
            fp(10),
            bfp!("10.1"),
            bfp!("0.5"),
        )
        .unwrap();
        // (1 - (10 / 10.1)^2) * 100 * 0.5 = 0.985...
        assert!(due > bfp!("0.98") && due < bfp!("0.99"));
    }
}
