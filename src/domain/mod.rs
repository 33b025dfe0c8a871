//! Domain types and the storage ports the application layer depends on.

pub mod account;
pub mod identity;
pub mod ledger;
pub mod ports;
pub mod transaction;
