//! Trade registry
//!
//! Owns trade rows keyed by the allocator-issued id. Lookups by contract or
//! state are full-table scans filtered client-side; table sizes stay small
//! (at most 128 contracts per bond), so no secondary index is kept. Scaling
//! this up means adding index structures behind the same method contracts.

use crate::{
    contracts::ContractRegistry,
    error::{Error, Result},
    sequence::SequenceAllocator,
    store::{StateStore, TABLE_TRADES},
    types::{Contract, ContractId, ContractState, Trade, TradeState},
};
use std::sync::Arc;

/// Counter name for trade id allocation
pub const TRADE_SEQUENCE: &str = "trades";

/// Registry over trade rows
pub struct TradeRegistry {
    store: Arc<dyn StateStore>,
    sequence: SequenceAllocator,
}

impl TradeRegistry {
    /// Create a registry over the store
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        let sequence = SequenceAllocator::new(store.clone());
        Self { store, sequence }
    }

    fn key(id: u64) -> [u8; 8] {
        id.to_be_bytes()
    }

    /// Open a new offer trade for the contract at `price`
    ///
    /// Allocates the trade id, sets the contract's current owner as seller,
    /// and moves the contract to `offer` state as a side effect.
    pub fn create_for_contract(
        &self,
        contracts: &ContractRegistry,
        contract: &Contract,
        price: u64,
    ) -> Result<Trade> {
        let trade = Trade {
            id: self.sequence.next(TRADE_SEQUENCE)?,
            contract_id: contract.id.clone(),
            seller_id: contract.owner_id.clone(),
            price,
            state: TradeState::Offer,
        };

        let row = bincode::serialize(&trade)?;
        self.store.insert(TABLE_TRADES, &Self::key(trade.id), &row)?;

        let mut updated = contract.clone();
        updated.state = ContractState::Offer;
        contracts.replace(&updated)?;

        tracing::debug!(trade_id = trade.id, contract_id = %trade.contract_id, price, "Trade created");
        Ok(trade)
    }

    /// Point lookup by id
    pub fn get(&self, id: u64) -> Result<Trade> {
        let row = self
            .store
            .get(TABLE_TRADES, &Self::key(id))?
            .ok_or_else(|| Error::NotFound(format!("No trades found for id {}", id)))?;
        Ok(bincode::deserialize(&row)?)
    }

    /// Lookup by id, requiring the given state
    pub fn get_by_id_and_state(&self, state: TradeState, id: u64) -> Result<Trade> {
        let trade = self.get(id)?;
        if trade.state != state {
            return Err(Error::NotFound(format!(
                "No {} trade found for id {}",
                state, id
            )));
        }
        Ok(trade)
    }

    /// Find the trade referencing `contract_id`, optionally restricted to a
    /// state
    ///
    /// At most one trade per contract is in `offer` or `reserved` state at
    /// a stable point; the scan returns the first match.
    pub fn get_by_contract(
        &self,
        contract_id: &ContractId,
        state: Option<TradeState>,
    ) -> Result<Trade> {
        for trade in self.list(None)? {
            if trade.contract_id != *contract_id {
                continue;
            }
            if let Some(wanted) = state {
                if trade.state != wanted {
                    continue;
                }
            }
            return Ok(trade);
        }
        Err(Error::NotFound(format!(
            "No trades found for contract {}",
            contract_id
        )))
    }

    /// List trades, optionally filtered by state
    pub fn list(&self, state: Option<TradeState>) -> Result<Vec<Trade>> {
        let mut trades = Vec::new();
        for (_, row) in self.store.scan(TABLE_TRADES, &[])? {
            let trade: Trade = bincode::deserialize(&row)?;
            if let Some(wanted) = state {
                if trade.state != wanted {
                    continue;
                }
            }
            trades.push(trade);
        }
        Ok(trades)
    }

    /// Move the trade to a new state, full-row replace
    pub fn transition(&self, trade: &Trade, new_state: TradeState) -> Result<Trade> {
        let mut updated = trade.clone();
        updated.state = new_state;

        let row = bincode::serialize(&updated)?;
        self.store.replace(TABLE_TRADES, &Self::key(updated.id), &row)?;

        tracing::debug!(trade_id = updated.id, state = %updated.state, "Trade transitioned");
        Ok(updated)
    }

    /// Delete the trade row
    pub fn archive(&self, id: u64) -> Result<()> {
        self.store.delete(TABLE_TRADES, &Self::key(id))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::Bond;

    fn fixture() -> (ContractRegistry, TradeRegistry, Contract) {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
        let contracts = ContractRegistry::new(store.clone());
        let trades = TradeRegistry::new(store);

        let bond = Bond::new("issuer0", "2017.6.13", 100_000, 600, 12);
        let contract = Contract {
            issuer_id: bond.issuer_id.clone(),
            id: ContractId::new(bond.id.clone(), 0),
            owner_id: bond.issuer_id.clone(),
            coupons_paid: 0,
            state: ContractState::Offer,
            bond_id: bond.id,
        };
        contracts.create(&contract).unwrap();
        (contracts, trades, contract)
    }

    #[test]
    fn test_ids_allocated_from_counter() {
        let (contracts, trades, contract) = fixture();

        let first = trades.create_for_contract(&contracts, &contract, 100).unwrap();
        let second = trades.create_for_contract(&contracts, &contract, 150).unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(first.seller_id, "issuer0");
        assert_eq!(first.state, TradeState::Offer);
    }

    #[test]
    fn test_get_by_id_and_state() {
        let (contracts, trades, contract) = fixture();
        let trade = trades.create_for_contract(&contracts, &contract, 100).unwrap();

        assert!(trades.get_by_id_and_state(TradeState::Offer, trade.id).is_ok());
        assert!(matches!(
            trades.get_by_id_and_state(TradeState::Reserved, trade.id),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            trades.get_by_id_and_state(TradeState::Offer, 999),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_get_by_contract_with_state_filter() {
        let (contracts, trades, contract) = fixture();
        let trade = trades.create_for_contract(&contracts, &contract, 100).unwrap();
        trades.transition(&trade, TradeState::Reserved).unwrap();

        let found = trades
            .get_by_contract(&contract.id, Some(TradeState::Reserved))
            .unwrap();
        assert_eq!(found.id, trade.id);

        assert!(trades
            .get_by_contract(&contract.id, Some(TradeState::Offer))
            .is_err());

        // Any-state lookup still finds it
        assert!(trades.get_by_contract(&contract.id, None).is_ok());
    }

    #[test]
    fn test_transition_preserves_other_fields() {
        let (contracts, trades, contract) = fixture();
        let trade = trades.create_for_contract(&contracts, &contract, 175).unwrap();

        trades.transition(&trade, TradeState::Reserved).unwrap();

        let loaded = trades.get(trade.id).unwrap();
        assert_eq!(loaded.state, TradeState::Reserved);
        assert_eq!(loaded.price, 175);
        assert_eq!(loaded.seller_id, "issuer0");
        assert_eq!(loaded.contract_id, contract.id);
    }

    #[test]
    fn test_archive_deletes_row() {
        let (contracts, trades, contract) = fixture();
        let trade = trades.create_for_contract(&contracts, &contract, 100).unwrap();

        trades.archive(trade.id).unwrap();
        assert!(trades.get(trade.id).is_err());
    }
}
