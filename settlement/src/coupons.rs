//! Batch coupon processing
//!
//! Periodic system-invoked run over the whole registry: one coupon
//! instruction per active contract, then one accrual tick per bond, then a
//! sweep that archives fully-paid bonds. Per-item failures inside a run are
//! logged and skipped; the run itself keeps going.

use crate::{
    coordinator::SettlementCoordinator,
    error::Result,
    payment::{PaymentInstruction, PaymentType},
};
use chrono::{DateTime, Utc};
use registry_core::{Bond, Contract, ContractState};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of one coupon run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouponRunReport {
    /// Run identifier
    pub run_id: Uuid,
    /// Contracts inspected (all states)
    pub contracts_scanned: u64,
    /// Coupon instructions handed to the dispatcher
    pub instructions_submitted: u64,
    /// Instructions the dispatcher rejected
    pub dispatch_failures: u64,
    /// Bonds whose accrual counter was incremented
    pub bonds_credited: u64,
    /// Run start
    pub started_at: DateTime<Utc>,
    /// Run end
    pub finished_at: DateTime<Utc>,
}

/// Coupon amount for one contract of `bond`, in whole currency units
///
/// Principal repayment tranche plus the monthly interest on it, all in
/// integer arithmetic: `ppc / term + (ppc / term) * ((rate / 100) / 12)`.
/// Sub-unit interest truncates to zero.
fn coupon_amount(price_per_contract: u64, bond: &Bond) -> u64 {
    let tranche = price_per_contract / bond.term;
    tranche + tranche * ((bond.rate / 100) / 12)
}

impl SettlementCoordinator {
    /// Run one coupon distribution cycle
    ///
    /// Dispatches a `coupon` instruction for every active contract (payer =
    /// issuer, payee = owner, callback `payContractCoupon`), then
    /// increments the accrual counter of every bond. Accrual is
    /// unconditional: bonds whose contracts are still unsold, or whose
    /// instructions failed to dispatch, tick as well.
    pub async fn pay_coupons(&self) -> Result<CouponRunReport> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();

        let contracts = self.contracts.list_all()?;
        let contracts_scanned = contracts.len() as u64;
        let mut instructions_submitted = 0u64;
        let mut dispatch_failures = 0u64;

        for contract in &contracts {
            if contract.state != ContractState::Active {
                continue;
            }

            let bond = match self.bonds.get(&contract.issuer_id, &contract.bond_id) {
                Ok(bond) => bond,
                Err(e) => {
                    tracing::warn!(
                        contract_id = %contract.id,
                        bond_id = %contract.bond_id,
                        error = %e,
                        "Skipping contract with unresolvable bond"
                    );
                    continue;
                }
            };

            match self.dispatch_coupon(contract, &bond).await {
                Ok(()) => instructions_submitted += 1,
                Err(e) => {
                    dispatch_failures += 1;
                    tracing::warn!(
                        contract_id = %contract.id,
                        error = %e,
                        "Coupon dispatch failed"
                    );
                }
            }
        }

        let mut bonds_credited = 0u64;
        for bond in self.bonds.list(None)? {
            self.bonds.mark_coupon_paid(&bond)?;
            bonds_credited += 1;
        }

        let report = CouponRunReport {
            run_id,
            contracts_scanned,
            instructions_submitted,
            dispatch_failures,
            bonds_credited,
            started_at,
            finished_at: Utc::now(),
        };

        tracing::info!(
            run_id = %report.run_id,
            contracts_scanned = report.contracts_scanned,
            instructions_submitted = report.instructions_submitted,
            dispatch_failures = report.dispatch_failures,
            bonds_credited = report.bonds_credited,
            "Coupon run finished"
        );
        Ok(report)
    }

    async fn dispatch_coupon(&self, contract: &Contract, bond: &Bond) -> Result<()> {
        let amount = coupon_amount(self.config.price_per_contract, bond);
        let contract_id = contract.id.to_string();

        self.outbox.record_pending(
            &contract_id,
            PaymentType::Coupon,
            &contract.issuer_id,
            &contract.owner_id,
            amount,
        )?;

        let instruction = PaymentInstruction {
            payer: contract.issuer_id.clone(),
            payee: contract.owner_id.clone(),
            amount,
            payment_type: PaymentType::Coupon,
            instruction_id: contract_id.clone(),
            callback_target: self.callback_target()?,
            callback_function: "payContractCoupon".to_string(),
            payload: contract_id.clone(),
        };

        if let Err(e) = self
            .dispatcher
            .submit_payment(&self.config.payment_target, instruction.to_args())
            .await
        {
            self.outbox.mark_failed(&contract_id, PaymentType::Coupon)?;
            return Err(e);
        }
        Ok(())
    }

    /// Archive every bond whose term is fully paid, cascading to contracts
    /// and trades; returns the number of bonds removed
    pub fn remove_expired_bonds(&self) -> Result<u64> {
        let mut removed = 0u64;
        for bond in self.bonds.list(None)? {
            if bond.is_expired() {
                self.bonds.archive(&self.contracts, &self.trades, &bond)?;
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::info!(removed, "Expired bonds archived");
        }
        Ok(removed)
    }
}
