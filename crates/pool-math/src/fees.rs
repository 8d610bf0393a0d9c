//! Fees paid by minting new pool shares instead of moving tokens.

use super::{error::Error, fixed_point::Bfp};

/// Number of shares to mint so that the receiver owns `fee_percentage` of the
/// value the pool gained while its invariant grew from `previous_invariant`
/// to `current_invariant`.
///
/// The share of the pool value that is growth is `(growth - 1) / growth`, the
/// receiver is entitled to `fee_percentage` of that, and minting
/// `supply * ownership / (1 - ownership)` shares gives it exactly that
/// ownership of the enlarged supply.
pub fn calc_fee_share_amount(
    total_supply: Bfp,
    previous_invariant: Bfp,
    current_invariant: Bfp,
    fee_percentage: Bfp,
) -> Result<Bfp, Error> {
    if current_invariant <= previous_invariant || fee_percentage.is_zero() {
        return Ok(Bfp::zero());
    }

    let growth = current_invariant.div_down(previous_invariant)?;
    let growth_share = growth.sub(Bfp::one())?.div_down(growth)?;
    let ownership = growth_share.mul_down(fee_percentage)?;

    total_supply
        .mul_down(ownership)?
        .div_down(ownership.complement())
}
