//! Contract registry
//!
//! Owns fractional-unit rows keyed by (issuer, contract id). Contracts are
//! minted in bulk at issuance, each immediately paired with an offer trade,
//! and archived together with their bond.

use crate::{
    error::{Error, Result},
    store::{composite_key, StateStore, TABLE_CONTRACTS},
    trades::TradeRegistry,
    types::{Bond, Contract, ContractId, ContractState},
};
use std::sync::Arc;

/// Upper bound on fractional units minted per bond
pub const MAX_CONTRACTS_PER_BOND: u64 = 128;

/// Registry over contract rows
pub struct ContractRegistry {
    store: Arc<dyn StateStore>,
}

impl ContractRegistry {
    /// Create a registry over the store
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    fn key(issuer_id: &str, id: &ContractId) -> Vec<u8> {
        composite_key(issuer_id, &id.to_string())
    }

    /// Insert a new contract; fails with `DuplicateKey` if present
    pub fn create(&self, contract: &Contract) -> Result<()> {
        let row = bincode::serialize(contract)?;
        self.store.insert(
            TABLE_CONTRACTS,
            &Self::key(&contract.issuer_id, &contract.id),
            &row,
        )?;

        tracing::debug!(contract_id = %contract.id, "Contract created");
        Ok(())
    }

    /// Mint `count` contracts for the bond, sequences descending from
    /// `count - 1` to 0, each paired with an initial offer trade at
    /// `nominal_price`
    ///
    /// The first error aborts the batch; the hosting ledger rolls back the
    /// partial mutations.
    pub fn create_batch(
        &self,
        trades: &TradeRegistry,
        bond: &Bond,
        count: u64,
        nominal_price: u64,
    ) -> Result<()> {
        if count > MAX_CONTRACTS_PER_BOND {
            return Err(Error::Validation(format!(
                "Wrong number of contracts to create for bond: {}",
                count
            )));
        }

        let mut remaining = count;
        while remaining > 0 {
            remaining -= 1;
            let contract = Contract {
                issuer_id: bond.issuer_id.clone(),
                id: ContractId::new(bond.id.clone(), remaining),
                owner_id: bond.issuer_id.clone(),
                coupons_paid: 0,
                state: ContractState::Offer,
                bond_id: bond.id.clone(),
            };
            self.create(&contract)?;
            trades.create_for_contract(self, &contract, nominal_price)?;
        }

        tracing::info!(bond_id = %bond.id, count, "Contracts minted for bond");
        Ok(())
    }

    /// Point lookup by (issuer, id)
    pub fn get(&self, issuer_id: &str, id: &ContractId) -> Result<Contract> {
        let row = self
            .store
            .get(TABLE_CONTRACTS, &Self::key(issuer_id, id))?
            .ok_or_else(|| Error::NotFound(format!("contract {}", id)))?;
        Ok(bincode::deserialize(&row)?)
    }

    /// Lookup by the dotted wire id; the issuer is recovered from the
    /// typed id rather than ad hoc string splitting
    pub fn get_by_id(&self, contract_id: &str) -> Result<Contract> {
        let id = ContractId::parse(contract_id)?;
        let issuer = id.bond.issuer.clone();
        self.get(&issuer, &id)
    }

    /// Full-row replace
    pub fn replace(&self, contract: &Contract) -> Result<()> {
        let row = bincode::serialize(contract)?;
        self.store.replace(
            TABLE_CONTRACTS,
            &Self::key(&contract.issuer_id, &contract.id),
            &row,
        )?;
        Ok(())
    }

    /// Move the contract to a new owner and state
    pub fn transfer_ownership(
        &self,
        contract: &Contract,
        new_owner_id: &str,
        new_state: ContractState,
    ) -> Result<Contract> {
        let mut updated = contract.clone();
        updated.owner_id = new_owner_id.to_string();
        updated.state = new_state;
        self.replace(&updated)?;

        tracing::debug!(
            contract_id = %updated.id,
            owner = %updated.owner_id,
            state = %updated.state,
            "Contract ownership updated"
        );
        Ok(updated)
    }

    /// Increment the coupon counter of the contract identified by wire id
    pub fn increment_coupons_paid(&self, contract_id: &str) -> Result<Contract> {
        let mut contract = self.get_by_id(contract_id)?;
        contract.coupons_paid += 1;
        self.replace(&contract)?;
        Ok(contract)
    }

    /// List contracts created by `issuer_id`
    pub fn list_by_issuer(&self, issuer_id: &str) -> Result<Vec<Contract>> {
        let prefix = composite_key(issuer_id, "");
        let mut contracts = Vec::new();
        for (_, row) in self.store.scan(TABLE_CONTRACTS, &prefix)? {
            contracts.push(bincode::deserialize(&row)?);
        }
        Ok(contracts)
    }

    /// List contracts currently held by `owner_id` (full scan, filtered)
    pub fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Contract>> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|c| c.owner_id == owner_id)
            .collect())
    }

    /// List every contract
    pub fn list_all(&self) -> Result<Vec<Contract>> {
        let mut contracts = Vec::new();
        for (_, row) in self.store.scan(TABLE_CONTRACTS, &[])? {
            contracts.push(bincode::deserialize(&row)?);
        }
        Ok(contracts)
    }

    /// Archive the contract together with its current trade
    ///
    /// Requires the invariant "every contract has a trade": if no trade in
    /// any state references the contract the archival fails.
    pub fn archive(&self, trades: &TradeRegistry, contract: &Contract) -> Result<()> {
        let trade = trades.get_by_contract(&contract.id, None)?;
        trades.archive(trade.id)?;

        self.store.delete(
            TABLE_CONTRACTS,
            &Self::key(&contract.issuer_id, &contract.id),
        )?;

        tracing::debug!(contract_id = %contract.id, "Contract archived");
        Ok(())
    }
}
