//! CatBond Settlement
//!
//! Orchestrates the bond/contract/trade lifecycle across the registries and
//! hands traded units off to an external payment agent.
//!
//! # Flow
//!
//! ```text
//! request -> role gate (Gateway) -> SettlementCoordinator -> registries
//!                                        |
//!                                        v
//!                            PaymentDispatcher (external payer)
//!                                        |
//!                    async callback: confirm / payContractCoupon
//! ```
//!
//! The coordinator persists a pending outbox record before every outbound
//! payment instruction and correlates the asynchronous callback against it
//! by contract id.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

pub mod api;
pub mod config;
pub mod coordinator;
pub mod coupons;
pub mod error;
pub mod payment;

// Re-exports
pub use api::Gateway;
pub use config::Config;
pub use coordinator::SettlementCoordinator;
pub use coupons::CouponRunReport;
pub use error::{Error, Result};
pub use payment::{
    InstructionStatus, LoggingDispatcher, Outbox, OutboxRecord, PaymentDispatcher,
    PaymentInstruction, PaymentType,
};

// The identity types come from registry-core; re-export for callers of the
// gateway surface.
pub use registry_core::{Caller, Role};
