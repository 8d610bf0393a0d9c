//! Resolution of multi step swaps into net asset deltas.

use {
    crate::{Token, error::Error, ids::PoolId},
    num::BigInt,
    number::conversions::u256_to_big_int,
    primitive_types::U256,
    serde::{Deserialize, Serialize},
};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum SwapKind {
    /// The amount going into the pool is fixed.
    GivenIn,
    /// The amount coming out of the pool is fixed.
    GivenOut,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BatchSwapStep {
    pub pool_id: PoolId,
    pub asset_in_index: usize,
    pub asset_out_index: usize,
    /// Zero means the amount calculated by the previous step.
    pub amount: U256,
    pub user_data: Vec<u8>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SingleSwap {
    pub pool_id: PoolId,
    pub kind: SwapKind,
    pub asset_in: Token,
    pub asset_out: Token,
    pub amount: U256,
    pub user_data: Vec<u8>,
}

impl SingleSwap {
    /// The equivalent one step batch over the assets `[asset_in, asset_out]`.
    pub fn into_batch(self) -> (SwapKind, Vec<BatchSwapStep>, Vec<Token>) {
        let step = BatchSwapStep {
            pool_id: self.pool_id,
            asset_in_index: 0,
            asset_out_index: 1,
            amount: self.amount,
            user_data: self.user_data,
        };
        (self.kind, vec![step], vec![self.asset_in, self.asset_out])
    }

    /// Batch limits that enforce `limit` as the minimum received for a given
    /// in swap or the maximum paid for a given out swap.
    pub fn limits(&self, limit: U256) -> Vec<BigInt> {
        let limit = u256_to_big_int(&limit);
        match self.kind {
            SwapKind::GivenIn => vec![-u256_to_big_int(&self.amount), limit],
            SwapKind::GivenOut => vec![-limit, BigInt::default()],
        }
    }
}

/// A step with its amount resolved, as handed to the pool.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ResolvedStep {
    pub pool_id: PoolId,
    pub token_in: Token,
    pub token_out: Token,
    pub amount: U256,
}

/// Amounts a pool swap moved.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StepAmounts {
    pub amount_in: U256,
    pub amount_out: U256,
}

/// Runs `steps` in order through `swap` and returns the net delta per asset
/// from the caller's perspective: negative amounts are paid by the caller,
/// positive amounts are received.
pub fn resolve<F>(
    kind: SwapKind,
    steps: &[BatchSwapStep],
    assets: &[Token],
    mut swap: F,
) -> Result<Vec<BigInt>, Error>
where
    F: FnMut(&ResolvedStep) -> Result<StepAmounts, Error>,
{
    let mut deltas = vec![BigInt::default(); assets.len()];
    let mut previous: Option<(Token, U256)> = None;

    for (i, step) in steps.iter().enumerate() {
        let token_in = *assets.get(step.asset_in_index).ok_or(Error::OutOfBounds)?;
        let token_out = *assets.get(step.asset_out_index).ok_or(Error::OutOfBounds)?;
        if token_in == token_out {
            return Err(Error::CannotSwapSameToken);
        }

        let amount = if step.amount.is_zero() {
            if i == 0 {
                return Err(Error::UnknownAmountInFirstSwap);
            }
            // The chained token is the one this step takes as given.
            let given = match kind {
                SwapKind::GivenIn => token_in,
                SwapKind::GivenOut => token_out,
            };
            match previous {
                Some((token, amount)) if token == given => amount,
                _ => return Err(Error::MalconstructedMultihopSwap),
            }
        } else {
            step.amount
        };

        let resolved = ResolvedStep {
            pool_id: step.pool_id,
            token_in,
            token_out,
            amount,
        };
        let amounts = swap(&resolved)?;
        previous = Some(match kind {
            SwapKind::GivenIn => (token_out, amounts.amount_out),
            SwapKind::GivenOut => (token_in, amounts.amount_in),
        });

        deltas[step.asset_in_index] -= u256_to_big_int(&amounts.amount_in);
        deltas[step.asset_out_index] += u256_to_big_int(&amounts.amount_out);
    }

    Ok(deltas)
}

/// Checks every delta against its limit and the deadline against `now`.
pub fn check_limits(
    deltas: &[BigInt],
    limits: &[BigInt],
    deadline: u64,
    now: u64,
) -> Result<(), Error> {
    if deltas.len() != limits.len() {
        return Err(Error::InputLengthMismatch);
    }
    if deltas.iter().zip(limits).any(|(delta, limit)| delta < limit) {
        return Err(Error::SwapLimit);
    }
    if now > deadline {
        return Err(Error::SwapDeadline);
    }
    Ok(())
}
