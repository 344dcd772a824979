//! Role-gated invoke/query surface
//!
//! String-dispatched entry points in the hosting ledger's convention:
//! `invoke` mutates, `query` reads, both take positional string arguments
//! and return JSON bytes. Argument-count and integer-parse problems are
//! `Validation`, role mismatches are `Unauthorized`.

use crate::{
    coordinator::SettlementCoordinator,
    error::{Error, Result},
};
use registry_core::{Caller, Role, TradeState};

/// Invoke/query front over the coordinator
pub struct Gateway {
    coordinator: SettlementCoordinator,
}

fn expect_args(function: &str, args: &[String], count: usize) -> Result<()> {
    if args.len() != count {
        return Err(Error::Validation(format!(
            "{} expects {} argument(s), got {}",
            function,
            count,
            args.len()
        )));
    }
    Ok(())
}

fn parse_u64(name: &str, value: &str) -> Result<u64> {
    value
        .parse::<u64>()
        .map_err(|_| Error::Validation(format!("{} must be a non-negative integer: {}", name, value)))
}

fn require_role(caller: &Caller, role: Role) -> Result<()> {
    if caller.role != role {
        return Err(Error::Unauthorized(format!(
            "Requires the {} role, caller {} has {}",
            role, caller.name, caller.role
        )));
    }
    Ok(())
}

impl Gateway {
    /// Wrap a coordinator
    pub fn new(coordinator: SettlementCoordinator) -> Self {
        Self { coordinator }
    }

    /// Coordinator handle
    pub fn coordinator(&self) -> &SettlementCoordinator {
        &self.coordinator
    }

    /// Dispatch a mutating function
    pub async fn invoke(&self, caller: &Caller, function: &str, args: &[String]) -> Result<Vec<u8>> {
        tracing::debug!(caller = %caller.name, role = %caller.role, function, "Invoke");

        match function {
            "createBond" => {
                require_role(caller, Role::Issuer)?;
                expect_args(function, args, 4)?;
                let principal = parse_u64("principal", &args[1])?;
                let rate = parse_u64("rate", &args[2])?;
                let term = parse_u64("term", &args[3])?;
                let bond = self.coordinator.issue(caller, &args[0], principal, rate, term)?;
                Ok(serde_json::to_vec(&bond)?)
            }
            "sell" => {
                require_role(caller, Role::Investor)?;
                expect_args(function, args, 2)?;
                let price = parse_u64("price", &args[1])?;
                let trade = self.coordinator.sell(caller, &args[0], price)?;
                Ok(serde_json::to_vec(&trade)?)
            }
            "buy" => {
                require_role(caller, Role::Investor)?;
                expect_args(function, args, 1)?;
                let trade_id = parse_u64("tradeId", &args[0])?;
                let trade = self.coordinator.buy(caller, trade_id).await?;
                Ok(serde_json::to_vec(&trade)?)
            }
            "confirm" => {
                self.require_agent(caller)?;
                expect_args(function, args, 1)?;
                let contract = self.coordinator.confirm(&args[0])?;
                Ok(serde_json::to_vec(&contract)?)
            }
            "payContractCoupon" => {
                self.require_agent(caller)?;
                expect_args(function, args, 1)?;
                let contract = self.coordinator.pay_contract_coupon(&args[0])?;
                Ok(serde_json::to_vec(&contract)?)
            }
            "payCoupons" => {
                require_role(caller, Role::System)?;
                expect_args(function, args, 0)?;
                self.coordinator.remove_expired_bonds()?;
                let report = self.coordinator.pay_coupons().await?;
                Ok(serde_json::to_vec(&report)?)
            }
            "setChainCodeId" => {
                require_role(caller, Role::System)?;
                expect_args(function, args, 1)?;
                self.coordinator.set_callback_target(&args[0])?;
                Ok(Vec::new())
            }
            _ => Err(Error::Validation(format!("Unknown function: {}", function))),
        }
    }

    /// Dispatch a read-only function
    pub fn query(&self, caller: &Caller, function: &str, args: &[String]) -> Result<Vec<u8>> {
        tracing::debug!(caller = %caller.name, role = %caller.role, function, "Query");
        expect_args(function, args, 0)?;

        match function {
            "getBonds" => {
                require_role(caller, Role::Issuer)?;
                let bonds = self.coordinator.bonds().list(Some(&caller.name))?;
                Ok(serde_json::to_vec(&bonds)?)
            }
            "getContracts" => {
                let contracts = match caller.role {
                    Role::Issuer => self.coordinator.contracts().list_by_issuer(&caller.name)?,
                    Role::Investor => self.coordinator.contracts().list_by_owner(&caller.name)?,
                    Role::Auditor => self.coordinator.contracts().list_all()?,
                    _ => {
                        return Err(Error::Unauthorized(format!(
                            "getContracts not available to role {}",
                            caller.role
                        )))
                    }
                };
                Ok(serde_json::to_vec(&contracts)?)
            }
            "getTrades" => {
                let trades = match caller.role {
                    Role::Auditor => self.coordinator.trades().list(None)?,
                    Role::Investor => self.coordinator.trades().list(Some(TradeState::Offer))?,
                    _ => {
                        return Err(Error::Unauthorized(format!(
                            "getTrades not available to role {}",
                            caller.role
                        )))
                    }
                };
                Ok(serde_json::to_vec(&trades)?)
            }
            _ => Err(Error::Validation(format!("Unknown function: {}", function))),
        }
    }

    /// Callback entry gate, governed by configuration
    fn require_agent(&self, caller: &Caller) -> Result<()> {
        if self.coordinator.config().enforce_agent_role {
            require_role(caller, Role::PaymentAgent)?;
        }
        Ok(())
    }
}
