use {
    crate::{
        Account,
        Token,
        ids::PoolId,
        oracle::Observation,
        pools::{PoolType, weights::GradualWeights},
    },
    num::BigInt,
    primitive_types::U256,
};

/// Notifications about committed vault operations. Failed operations emit
/// nothing.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Event {
    PoolRegistered {
        pool_id: PoolId,
        pool_type: PoolType,
        tokens: Vec<Token>,
    },
    /// A join or exit. Deltas are from the pool's perspective.
    PoolBalanceChanged {
        pool_id: PoolId,
        account: Account,
        deltas: Vec<BigInt>,
        protocol_fee_amounts: Vec<U256>,
    },
    /// Asset manager balance update.
    PoolBalanceManaged {
        pool_id: PoolId,
        deltas: Vec<BigInt>,
    },
    Swap {
        pool_id: PoolId,
        token_in: Token,
        token_out: Token,
        amount_in: U256,
        amount_out: U256,
    },
    PausedStateChanged {
        pool_id: PoolId,
        paused: bool,
    },
    SwapEnabledSet {
        pool_id: PoolId,
        enabled: bool,
    },
    GradualWeightUpdateScheduled {
        pool_id: PoolId,
        schedule: GradualWeights,
    },
    ProtocolFeesCollected {
        pool_id: PoolId,
        amounts: Vec<(Token, U256)>,
    },
    OracleSample {
        pool_id: PoolId,
        timestamp: u64,
        observation: Observation,
    },
}

impl Event {
    pub fn pool_id(&self) -> PoolId {
        match self {
            Self::PoolRegistered { pool_id, .. }
            | Self::PoolBalanceChanged { pool_id, .. }
            | Self::PoolBalanceManaged { pool_id, .. }
            | Self::Swap { pool_id, .. }
            | Self::PausedStateChanged { pool_id, .. }
            | Self::SwapEnabledSet { pool_id, .. }
            | Self::GradualWeightUpdateScheduled { pool_id, .. }
            | Self::ProtocolFeesCollected { pool_id, .. }
            | Self::OracleSample { pool_id, .. } => *pool_id,
        }
    }
}

#[mockall::automock]
pub trait Subscriber: Send + Sync {
    fn on_event(&self, event: &Event);
}
