use pool_math::{Bfp, Error};

/// Weights moving linearly from `start_weights` at `start_time` to
/// `end_weights` at `end_time`. Fixed weights are a schedule that already
/// ended.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct GradualWeights {
    pub start_time: u64,
    pub end_time: u64,
    pub start_weights: Vec<Bfp>,
    pub end_weights: Vec<Bfp>,
}

impl GradualWeights {
    pub fn fixed(weights: Vec<Bfp>) -> Self {
        Self {
            start_time: 0,
            end_time: 0,
            start_weights: weights.clone(),
            end_weights: weights,
        }
    }

    /// Normalized weights at `now`.
    pub fn weights_at(&self, now: u64) -> Result<Vec<Bfp>, Error> {
        let progress = self.progress(now)?;
        if progress.is_zero() {
            return Ok(self.start_weights.clone());
        }
        if progress == Bfp::one() {
            return Ok(self.end_weights.clone());
        }
        self.start_weights
            .iter()
            .zip(&self.end_weights)
            .map(|(start, end)| interpolate(*start, *end, progress))
            .collect()
    }

    /// Fraction of the update that has elapsed at `now`.
    fn progress(&self, now: u64) -> Result<Bfp, Error> {
        if now >= self.end_time {
            return Ok(Bfp::one());
        }
        if now <= self.start_time {
            return Ok(Bfp::zero());
        }
        Bfp::from(now - self.start_time).div_down(Bfp::from(self.end_time - self.start_time))
    }
}

fn interpolate(start: Bfp, end: Bfp, progress: Bfp) -> Result<Bfp, Error> {
    if end >= start {
        start.add(end.sub(start)?.mul_down(progress)?)
    } else {
        start.sub(start.sub(end)?.mul_down(progress)?)
    }
}
