//! Deterministic pricing math for weighted and stable pools.
//!
//! All values are 18-decimal fixed point numbers ([`Bfp`]) or raw 256-bit
//! integers. Every operation that rounds does so in the direction that
//! favours the pool.

pub mod error;
pub mod fees;
pub mod fixed_point;
pub mod math;
pub mod oracle_math;
pub mod stable_math;
pub mod weighted_math;

pub use {error::Error, fixed_point::Bfp};
