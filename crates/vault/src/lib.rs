//! Pool accounting, batch settlement and the registry that ties them to
//! asset transfers.

pub mod accounting;
pub mod batch;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod oracle;
pub mod pools;
pub mod transfers;
pub mod user_data;
mod vault;

pub use {
    config::Config,
    error::{Error, ErrorKind},
    ids::{Account, PoolId, Token},
    vault::{ExitPoolRequest, JoinPoolRequest, Vault},
};
