//! Time weighted averages of pool prices.
//!
//! Each sample stores the low resolution logs observed at its timestamp
//! together with accumulators of those logs over time. The average of a value
//! over a window is the difference of the accumulators at the window bounds
//! divided by the window length.

use {
    crate::{
        config::OracleConfig,
        error::Error,
        events::{Event, Subscriber},
        ids::PoolId,
    },
    parking_lot::Mutex,
    pool_math::{Bfp, oracle_math},
    std::collections::{HashMap, VecDeque},
};

#[derive(Clone, Copy, Debug, Eq, PartialEq, strum::Display)]
pub enum Variable {
    PairPrice,
    SharePrice,
    Invariant,
}

/// Low resolution logs of a pool's prices at one point in time.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Observation {
    pub log_pair_price: i64,
    pub log_share_price: i64,
    pub log_invariant: i64,
}

impl Observation {
    pub fn get(&self, variable: Variable) -> i64 {
        match variable {
            Variable::PairPrice => self.log_pair_price,
            Variable::SharePrice => self.log_share_price,
            Variable::Invariant => self.log_invariant,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Sample {
    pub timestamp: u64,
    pub instant: Observation,
    pub accumulators: [i128; 3],
}

impl Sample {
    fn accumulator(&self, variable: Variable) -> i128 {
        self.accumulators[variable as usize]
    }

    /// Accumulator extrapolated to `timestamp` assuming the instant value
    /// held since this sample.
    fn accumulator_at(&self, variable: Variable, timestamp: u64) -> i128 {
        let elapsed = i128::from(timestamp.saturating_sub(self.timestamp));
        self.accumulator(variable) + i128::from(self.instant.get(variable)) * elapsed
    }

    fn next(&self, timestamp: u64, instant: Observation) -> Self {
        Self {
            timestamp,
            instant,
            accumulators: [Variable::PairPrice, Variable::SharePrice, Variable::Invariant]
                .map(|variable| self.accumulator_at(variable, timestamp)),
        }
    }
}

/// Ring buffers of samples per pool, fed by [`Event::OracleSample`].
#[derive(Debug)]
pub struct SampleBuffer {
    config: OracleConfig,
    samples: Mutex<HashMap<PoolId, VecDeque<Sample>>>,
}

impl SampleBuffer {
    pub fn new(config: OracleConfig) -> Self {
        Self {
            config,
            samples: Default::default(),
        }
    }

    pub fn record(&self, pool_id: PoolId, timestamp: u64, observation: Observation) {
        let mut samples = self.samples.lock();
        let buffer = samples.entry(pool_id).or_default();
        let Some(latest) = buffer.back().copied() else {
            buffer.push_back(Sample {
                timestamp,
                instant: observation,
                accumulators: [0; 3],
            });
            return;
        };

        let sample = latest.next(timestamp, observation);
        let sample_duration = self.config.sample_duration.as_secs();
        if timestamp.saturating_sub(latest.timestamp) < sample_duration {
            if let Some(back) = buffer.back_mut() {
                *back = sample;
            }
        } else {
            buffer.push_back(sample);
            while buffer.len() > self.config.buffer_size.max(1) {
                buffer.pop_front();
            }
        }
        tracing::trace!(pool = ?pool_id, timestamp, samples = buffer.len(), "recorded oracle sample");
    }

    pub fn samples(&self, pool_id: PoolId) -> Vec<Sample> {
        self.samples
            .lock()
            .get(&pool_id)
            .map(|buffer| buffer.iter().copied().collect())
            .unwrap_or_default()
    }

    /// The most recent value of `variable`.
    pub fn latest(&self, pool_id: PoolId, variable: Variable) -> Result<Bfp, Error> {
        let latest = self
            .samples
            .lock()
            .get(&pool_id)
            .and_then(|buffer| buffer.back().copied())
            .ok_or(Error::OracleNotInitialized)?;
        Ok(oracle_math::from_low_res_log(latest.instant.get(variable))?)
    }

    /// Accumulated log value of `variable` at `timestamp`, interpolated
    /// between samples or extrapolated past the latest one.
    pub fn accumulator_at(
        &self,
        pool_id: PoolId,
        variable: Variable,
        timestamp: u64,
    ) -> Result<i128, Error> {
        let samples = self.samples.lock();
        let buffer = samples
            .get(&pool_id)
            .filter(|buffer| !buffer.is_empty())
            .ok_or(Error::OracleNotInitialized)?;

        let after = buffer.partition_point(|sample| sample.timestamp <= timestamp);
        if after == 0 {
            return Err(Error::OracleQueryTooOld);
        }
        let before = &buffer[after - 1];
        let Some(next) = buffer.get(after) else {
            return Ok(before.accumulator_at(variable, timestamp));
        };
        if before.timestamp == timestamp {
            return Ok(before.accumulator(variable));
        }

        let elapsed = i128::from(timestamp - before.timestamp);
        let span = i128::from(next.timestamp - before.timestamp);
        let growth = next.accumulator(variable) - before.accumulator(variable);
        Ok(before.accumulator(variable) + growth * elapsed / span)
    }

    /// Average value of `variable` over the `secs` seconds ending `ago`
    /// seconds before `now`.
    pub fn time_weighted_average(
        &self,
        pool_id: PoolId,
        variable: Variable,
        secs: u64,
        ago: u64,
        now: u64,
    ) -> Result<Bfp, Error> {
        if secs == 0 {
            return Err(Error::OracleInvalidSecondsQuery);
        }
        let end = now.checked_sub(ago).ok_or(Error::OracleQueryTooOld)?;
        let begin = end.checked_sub(secs).ok_or(Error::OracleQueryTooOld)?;
        let growth = self.accumulator_at(pool_id, variable, end)?
            - self.accumulator_at(pool_id, variable, begin)?;
        let average = i64::try_from(growth / i128::from(secs))
            .map_err(|_| pool_math::Error::OutOfBounds)?;
        Ok(oracle_math::from_low_res_log(average)?)
    }
}

impl Subscriber for SampleBuffer {
    fn on_event(&self, event: &Event) {
        if let Event::OracleSample {
            pool_id,
            timestamp,
            observation,
        } = event
        {
            self.record(*pool_id, *timestamp, *observation);
        }
    }
}
