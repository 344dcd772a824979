//! CatBond Registry Core
//!
//! Typed data model and registries for catastrophe bond issuance,
//! fractional contracts, and secondary-market trades.
//!
//! # Architecture
//!
//! - **Keyed tables**: all state lives in a `StateStore` (RocksDB in
//!   production, in-memory for tests), one logical table per entity
//! - **Full-row replace**: every mutation reads the full record, mutates
//!   it in memory, and writes the full record back
//! - **Explicit registries**: bond/contract/trade registries are plain
//!   structs over an injected store, no singletons
//!
//! # Invariants
//!
//! - A contract's state agrees with exactly one non-archived trade
//! - `coupons_paid <= term` while a bond is active
//! - Trade ids are unique, allocated from a persisted monotonic counter

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

pub mod bonds;
pub mod config;
pub mod contracts;
pub mod error;
pub mod sequence;
pub mod store;
pub mod trades;
pub mod types;

// Re-exports
pub use bonds::BondRegistry;
pub use config::Config;
pub use contracts::{ContractRegistry, MAX_CONTRACTS_PER_BOND};
pub use error::{Error, Result};
pub use sequence::SequenceAllocator;
pub use store::{MemoryStore, RocksStore, StateStore};
pub use trades::{TradeRegistry, TRADE_SEQUENCE};
pub use types::{
    Bond, BondId, BondState, Caller, Contract, ContractId, ContractState, Role, Trade, TradeState,
};
