//! Application layer containing the core business logic orchestration.
//!
//! `AccountRegistry` and `SettlementEngine` implement registration and
//! settlement over the storage ports. `BankHandle` fronts them with an
//! actor-like worker fed by a `tokio` channel, which serializes every
//! mutating operation.

pub mod engine;
pub mod registry;
pub mod worker;
