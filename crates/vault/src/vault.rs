//! The pool registry and the entry point for every pool operation.
//!
//! Operations run on a copy of the pool record while the pool is locked. The
//! copy replaces the record only after every check passed and the transfers
//! settled, so a failed operation leaves no trace. Events go out after the
//! locks are released.

use {
    crate::{
        Account,
        Token,
        accounting::{BalanceChange, FeeSettings, PoolRecord, PoolStatus},
        batch::{self, BatchSwapStep, SingleSwap, StepAmounts, SwapKind},
        clock::Clock,
        config::Config,
        error::Error,
        events::{Event, Subscriber},
        ids::PoolId,
        pools::{PoolParams, pause::PauseState, weights::GradualWeights},
        transfers::{AssetTransfers, FundManagement},
        user_data::{ExitKind, JoinKind},
    },
    num::{BigInt, Signed},
    number::conversions::big_int_to_u256,
    parking_lot::{Mutex, MutexGuard, RwLock},
    pool_math::Bfp,
    primitive_types::U256,
    std::{
        collections::{BTreeMap, BTreeSet},
        sync::Arc,
    },
};

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct JoinPoolRequest {
    /// Must equal the pool tokens.
    pub assets: Vec<Token>,
    pub max_amounts_in: Vec<U256>,
    pub user_data: Vec<u8>,
    pub from_internal_balance: bool,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ExitPoolRequest {
    /// Must equal the pool tokens.
    pub assets: Vec<Token>,
    pub min_amounts_out: Vec<U256>,
    pub user_data: Vec<u8>,
    pub to_internal_balance: bool,
}

type Record = Arc<Mutex<PoolRecord>>;

/// A resolved batch whose pool updates are not committed yet.
struct StagedBatch {
    deltas: Vec<BigInt>,
    pools: BTreeMap<PoolId, PoolRecord>,
    events: Vec<Event>,
}

pub struct Vault {
    config: Config,
    clock: Arc<dyn Clock>,
    transfers: Arc<dyn AssetTransfers>,
    /// Indexed by the nonce embedded in the pool id.
    pools: RwLock<Vec<Record>>,
    protocol_fees: Mutex<BTreeMap<Token, U256>>,
    subscribers: RwLock<Vec<Arc<dyn Subscriber>>>,
    /// Pools registered before this time can be paused until then.
    pause_window_end: u64,
}

impl Vault {
    pub fn new(
        config: Config,
        clock: Arc<dyn Clock>,
        transfers: Arc<dyn AssetTransfers>,
    ) -> Result<Self, Error> {
        config.validate()?;
        let pause_window_end = clock
            .now()
            .saturating_add(config.pause_window_duration.as_secs());
        tracing::info!(pause_window_end, "created vault");
        Ok(Self {
            config,
            clock,
            transfers,
            pools: Default::default(),
            protocol_fees: Default::default(),
            subscribers: Default::default(),
            pause_window_end,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) {
        self.subscribers.write().push(subscriber);
    }

    pub fn register_pool(&self, params: PoolParams) -> Result<PoolId, Error> {
        params
            .validate(&self.config)
            .inspect_err(|err| tracing::debug!(?err, "pool registration rejected"))?;

        let now = self.clock.now();
        let pause = if now < self.pause_window_end {
            PauseState::new(
                now,
                self.pause_window_end - now,
                self.config.buffer_period_duration.as_secs(),
            )
        } else {
            PauseState::new(now, 0, 0)
        };

        let (pool_type, tokens) = (params.pool_type, params.tokens.clone());
        let pool_id = {
            let mut pools = self.pools.write();
            let nonce = u64::try_from(pools.len()).map_err(|_| Error::OutOfBounds)?;
            let pool_id = PoolId::new(nonce, pool_type.specialization());
            pools.push(Arc::new(Mutex::new(PoolRecord::new(pool_id, params, pause))));
            pool_id
        };
        tracing::info!(pool = %pool_id, %pool_type, ?tokens, "registered pool");
        self.emit(vec![Event::PoolRegistered {
            pool_id,
            pool_type,
            tokens,
        }]);
        Ok(pool_id)
    }

    /// A snapshot of the pool record.
    pub fn pool(&self, pool_id: PoolId) -> Result<PoolRecord, Error> {
        Ok(self.record(pool_id)?.lock().clone())
    }

    pub fn pool_status(&self, pool_id: PoolId) -> Result<PoolStatus, Error> {
        let now = self.clock.now();
        Ok(self.record(pool_id)?.lock().status(now))
    }

    pub fn get_pool_tokens(&self, pool_id: PoolId) -> Result<(Vec<Token>, Vec<U256>), Error> {
        let record = self.record(pool_id)?;
        let pool = record.lock();
        let balances = pool.balances().iter().map(|b| b.as_uint256()).collect();
        Ok((pool.tokens().to_vec(), balances))
    }

    pub fn shares_of(&self, pool_id: PoolId, account: Account) -> Result<U256, Error> {
        Ok(self.record(pool_id)?.lock().shares_of(account).as_uint256())
    }

    pub fn total_supply(&self, pool_id: PoolId) -> Result<U256, Error> {
        Ok(self.record(pool_id)?.lock().total_supply().as_uint256())
    }

    /// Protocol swap fees collected in tokens so far.
    pub fn collected_protocol_fees(&self) -> BTreeMap<Token, U256> {
        self.protocol_fees.lock().clone()
    }

    pub fn join_pool(
        &self,
        pool_id: PoolId,
        sender: Account,
        recipient: Account,
        request: JoinPoolRequest,
    ) -> Result<BalanceChange, Error> {
        let fees = self.fee_settings();
        self.modify(pool_id, |pool, now| {
            check_assets(pool, &request.assets, &request.max_amounts_in)?;
            let kind = JoinKind::decode(pool.pool_type(), &request.user_data)?;
            let change = pool.on_join(sender, recipient, kind, &fees, now)?;
            if change
                .amounts
                .iter()
                .zip(&request.max_amounts_in)
                .any(|(amount, max)| amount.as_uint256() > *max)
            {
                return Err(Error::JoinAboveMax);
            }

            let funds = FundManagement {
                sender,
                from_internal_balance: request.from_internal_balance,
                recipient,
                to_internal_balance: false,
            };
            self.transfers
                .settle(&funds, &token_amounts(pool.tokens(), &change.amounts), &[])?;
            let mut events = vec![Event::PoolBalanceChanged {
                pool_id,
                account: sender,
                deltas: change
                    .amounts
                    .iter()
                    .map(|amount| amount.to_big_int())
                    .collect(),
                protocol_fee_amounts: uints(&change.protocol_fee_amounts),
            }];
            events.extend(self.credit_protocol_fees(pool, &change));
            tracing::debug!(pool = %pool_id, ?sender, shares = %change.shares, "joined pool");
            Ok((change, events))
        })
        .inspect_err(|err| tracing::debug!(pool = %pool_id, ?err, "join rejected"))
    }

    pub fn exit_pool(
        &self,
        pool_id: PoolId,
        sender: Account,
        recipient: Account,
        request: ExitPoolRequest,
    ) -> Result<BalanceChange, Error> {
        let fees = self.fee_settings();
        self.modify(pool_id, |pool, now| {
            check_assets(pool, &request.assets, &request.min_amounts_out)?;
            let kind = ExitKind::decode(&request.user_data)?;
            let change = pool.on_exit(sender, kind, &fees, now)?;
            if change
                .amounts
                .iter()
                .zip(&request.min_amounts_out)
                .any(|(amount, min)| amount.as_uint256() < *min)
            {
                return Err(Error::ExitBelowMin);
            }

            let funds = FundManagement {
                sender,
                from_internal_balance: false,
                recipient,
                to_internal_balance: request.to_internal_balance,
            };
            self.transfers
                .settle(&funds, &[], &token_amounts(pool.tokens(), &change.amounts))?;
            let mut events = vec![Event::PoolBalanceChanged {
                pool_id,
                account: sender,
                deltas: change
                    .amounts
                    .iter()
                    .map(|amount| -amount.to_big_int())
                    .collect(),
                protocol_fee_amounts: uints(&change.protocol_fee_amounts),
            }];
            events.extend(self.credit_protocol_fees(pool, &change));
            tracing::debug!(pool = %pool_id, ?sender, shares = %change.shares, "exited pool");
            Ok((change, events))
        })
        .inspect_err(|err| tracing::debug!(pool = %pool_id, ?err, "exit rejected"))
    }

    /// Swaps against a single pool. `limit` is the minimum amount out for
    /// given in swaps and the maximum amount in for given out swaps. Returns
    /// the calculated amount.
    pub fn swap(
        &self,
        single: SingleSwap,
        funds: FundManagement,
        limit: U256,
        deadline: u64,
    ) -> Result<U256, Error> {
        let limits = single.limits(limit);
        let (kind, steps, assets) = single.into_batch();
        let deltas = self.batch_swap(kind, &steps, &assets, funds, &limits, deadline)?;
        let calculated = match kind {
            SwapKind::GivenIn => &deltas[1],
            SwapKind::GivenOut => &deltas[0],
        };
        Ok(big_int_to_u256(&calculated.abs()).map_err(|_| pool_math::Error::OutOfBounds)?)
    }

    /// Executes `steps` in order and settles the net deltas with `funds`.
    /// Returns the deltas from the caller's perspective.
    pub fn batch_swap(
        &self,
        kind: SwapKind,
        steps: &[BatchSwapStep],
        assets: &[Token],
        funds: FundManagement,
        limits: &[BigInt],
        deadline: u64,
    ) -> Result<Vec<BigInt>, Error> {
        let result = self.try_batch_swap(kind, steps, assets, funds, limits, deadline);
        match &result {
            Ok(deltas) => tracing::debug!(%kind, steps = steps.len(), ?deltas, "batch swap"),
            Err(err) => tracing::debug!(%kind, steps = steps.len(), ?err, "batch swap rejected"),
        }
        result
    }

    /// The deltas a batch swap would produce now, without limits, deadline
    /// or settlement. Nothing is committed.
    pub fn query_batch_swap(
        &self,
        kind: SwapKind,
        steps: &[BatchSwapStep],
        assets: &[Token],
    ) -> Result<Vec<BigInt>, Error> {
        let records = self.batch_records(steps)?;
        let guards = lock_all(&records);
        let staged = self.run_steps(kind, steps, assets, &guards, self.clock.now())?;
        Ok(staged.deltas)
    }

    pub fn set_paused(&self, pool_id: PoolId, paused: bool) -> Result<(), Error> {
        self.modify(pool_id, |pool, now| {
            pool.set_paused(paused, now)?;
            Ok(((), vec![Event::PausedStateChanged { pool_id, paused }]))
        })
        .inspect(|_| tracing::info!(pool = %pool_id, paused, "paused state changed"))
    }

    pub fn set_swap_enabled(&self, pool_id: PoolId, enabled: bool) -> Result<(), Error> {
        self.modify(pool_id, |pool, now| {
            pool.set_swap_enabled(enabled, now)?;
            Ok(((), vec![Event::SwapEnabledSet { pool_id, enabled }]))
        })
        .inspect(|_| tracing::info!(pool = %pool_id, enabled, "swap enabled set"))
    }

    pub fn update_weights_gradually(
        &self,
        pool_id: PoolId,
        start_time: u64,
        end_time: u64,
        end_weights: Vec<Bfp>,
    ) -> Result<GradualWeights, Error> {
        self.modify(pool_id, |pool, now| {
            let schedule = pool
                .update_weights_gradually(start_time, end_time, end_weights, now)?
                .clone();
            tracing::info!(pool = %pool_id, ?schedule, "scheduled gradual weight update");
            let event = Event::GradualWeightUpdateScheduled {
                pool_id,
                schedule: schedule.clone(),
            };
            Ok((schedule, vec![event]))
        })
    }

    pub fn add_allowed_address(&self, pool_id: PoolId, account: Account) -> Result<(), Error> {
        self.modify(pool_id, |pool, _| {
            pool.add_allowed_address(account)?;
            Ok(((), Vec::new()))
        })
    }

    pub fn remove_allowed_address(&self, pool_id: PoolId, account: Account) -> Result<(), Error> {
        self.modify(pool_id, |pool, _| {
            pool.remove_allowed_address(account)?;
            Ok(((), Vec::new()))
        })
    }

    /// Applies balance changes reported by the pool's asset managers. Fails
    /// without changing anything if a balance would become negative.
    pub fn update_balances(&self, pool_id: PoolId, deltas: Vec<BigInt>) -> Result<(), Error> {
        self.modify(pool_id, |pool, _| {
            pool.update_balances(&deltas)?;
            tracing::debug!(pool = %pool_id, ?deltas, "updated managed balances");
            Ok(((), vec![Event::PoolBalanceManaged { pool_id, deltas }]))
        })
    }

    fn try_batch_swap(
        &self,
        kind: SwapKind,
        steps: &[BatchSwapStep],
        assets: &[Token],
        funds: FundManagement,
        limits: &[BigInt],
        deadline: u64,
    ) -> Result<Vec<BigInt>, Error> {
        if limits.len() != assets.len() {
            return Err(Error::InputLengthMismatch);
        }
        let records = self.batch_records(steps)?;
        let mut guards = lock_all(&records);
        let now = self.clock.now();
        let StagedBatch {
            deltas,
            pools: mut staged,
            mut events,
        } = self.run_steps(kind, steps, assets, &guards, now)?;
        batch::check_limits(&deltas, limits, deadline, now)?;

        let mut incoming = Vec::new();
        let mut outgoing = Vec::new();
        for (token, delta) in assets.iter().zip(&deltas) {
            let amount =
                big_int_to_u256(&delta.abs()).map_err(|_| pool_math::Error::OutOfBounds)?;
            if delta.is_negative() {
                incoming.push((*token, amount));
            } else if delta.is_positive() {
                outgoing.push((*token, amount));
            }
        }
        self.transfers.settle(&funds, &incoming, &outgoing)?;

        for (pool_id, guard) in guards.iter_mut() {
            if let Some(pool) = staged.remove(pool_id) {
                events.extend(self.oracle_sample(&pool, now));
                **guard = pool;
            }
        }
        drop(guards);
        self.emit(events);
        Ok(deltas)
    }

    /// Resolves the batch on copies of the locked pools.
    fn run_steps(
        &self,
        kind: SwapKind,
        steps: &[BatchSwapStep],
        assets: &[Token],
        guards: &BTreeMap<PoolId, MutexGuard<'_, PoolRecord>>,
        now: u64,
    ) -> Result<StagedBatch, Error> {
        let fees = self.fee_settings();
        let mut staged: BTreeMap<PoolId, PoolRecord> = guards
            .iter()
            .map(|(pool_id, guard)| (*pool_id, (**guard).clone()))
            .collect();
        let mut events = Vec::new();
        let deltas = batch::resolve(kind, steps, assets, |step| {
            let pool = staged
                .get_mut(&step.pool_id)
                .ok_or(Error::InvalidPoolId)?;
            let token_in = pool.token_index(step.token_in)?;
            let token_out = pool.token_index(step.token_out)?;
            let outcome = pool.on_swap(
                kind,
                token_in,
                token_out,
                Bfp::from_wei(step.amount),
                &fees,
                now,
            )?;
            let amounts = StepAmounts {
                amount_in: outcome.amount_in.as_uint256(),
                amount_out: outcome.amount_out.as_uint256(),
            };
            events.push(Event::Swap {
                pool_id: step.pool_id,
                token_in: step.token_in,
                token_out: step.token_out,
                amount_in: amounts.amount_in,
                amount_out: amounts.amount_out,
            });
            Ok(amounts)
        })?;
        Ok(StagedBatch {
            deltas,
            pools: staged,
            events,
        })
    }

    /// Records of every pool in the batch keyed by id, so that they are
    /// always locked in the same order.
    fn batch_records(&self, steps: &[BatchSwapStep]) -> Result<BTreeMap<PoolId, Record>, Error> {
        steps
            .iter()
            .map(|step| step.pool_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(|pool_id| self.record(pool_id).map(|record| (pool_id, record)))
            .collect()
    }

    /// Runs `operation` on a copy of the pool and commits the copy if it
    /// succeeds. The returned events are emitted after the pool is unlocked.
    fn modify<T>(
        &self,
        pool_id: PoolId,
        operation: impl FnOnce(&mut PoolRecord, u64) -> Result<(T, Vec<Event>), Error>,
    ) -> Result<T, Error> {
        let record = self.record(pool_id)?;
        let (output, events) = {
            let mut guard = record.lock();
            let now = self.clock.now();
            let mut pool = guard.clone();
            let (output, mut events) = operation(&mut pool, now)?;
            events.extend(self.oracle_sample(&pool, now));
            *guard = pool;
            (output, events)
        };
        self.emit(events);
        Ok(output)
    }

    fn record(&self, pool_id: PoolId) -> Result<Record, Error> {
        let record = pool_id
            .nonce()
            .and_then(|nonce| self.pools.read().get(nonce).cloned())
            .ok_or(Error::InvalidPoolId)?;
        if record.lock().id() != pool_id {
            return Err(Error::InvalidPoolId);
        }
        Ok(record)
    }

    fn fee_settings(&self) -> FeeSettings {
        FeeSettings {
            protocol_swap_fee_percentage: self.config.protocol_swap_fee_percentage,
            protocol_fee_recipient: self.config.protocol_fee_recipient,
        }
    }

    /// Adds the protocol fee amounts of a committed join or exit to the
    /// collected fees.
    fn credit_protocol_fees(&self, pool: &PoolRecord, change: &BalanceChange) -> Option<Event> {
        let amounts: Vec<_> = token_amounts(pool.tokens(), &change.protocol_fee_amounts);
        if amounts.is_empty() {
            return None;
        }
        let mut collected = self.protocol_fees.lock();
        for (token, amount) in &amounts {
            let total = collected.entry(*token).or_default();
            *total = total.saturating_add(*amount);
        }
        Some(Event::ProtocolFeesCollected {
            pool_id: pool.id(),
            amounts,
        })
    }

    fn oracle_sample(&self, pool: &PoolRecord, now: u64) -> Option<Event> {
        match pool.observation(now) {
            Ok(observation) => observation.map(|observation| Event::OracleSample {
                pool_id: pool.id(),
                timestamp: now,
                observation,
            }),
            Err(err) => {
                tracing::warn!(pool = %pool.id(), ?err, "failed to compute oracle sample");
                None
            }
        }
    }

    fn emit(&self, events: Vec<Event>) {
        if events.is_empty() {
            return;
        }
        let subscribers = self.subscribers.read().clone();
        for event in &events {
            for subscriber in &subscribers {
                subscriber.on_event(event);
            }
        }
    }
}

fn lock_all(records: &BTreeMap<PoolId, Record>) -> BTreeMap<PoolId, MutexGuard<'_, PoolRecord>> {
    records
        .iter()
        .map(|(pool_id, record)| (*pool_id, record.lock()))
        .collect()
}

fn check_assets(pool: &PoolRecord, assets: &[Token], limits: &[U256]) -> Result<(), Error> {
    if assets.len() != limits.len() {
        return Err(Error::InputLengthMismatch);
    }
    if assets != pool.tokens() {
        return Err(Error::TokensMismatch);
    }
    Ok(())
}

/// Non-zero amounts paired with their tokens.
fn token_amounts(tokens: &[Token], amounts: &[Bfp]) -> Vec<(Token, U256)> {
    tokens
        .iter()
        .zip(amounts)
        .filter(|(_, amount)| !amount.is_zero())
        .map(|(token, amount)| (*token, amount.as_uint256()))
        .collect()
}

fn uints(amounts: &[Bfp]) -> Vec<U256> {
    amounts.iter().map(|amount| amount.as_uint256()).collect()
}
