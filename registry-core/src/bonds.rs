//! Bond registry
//!
//! Owns bond rows keyed by (issuer, bond id). Archival cascades through the
//! contract registry using the explicit `bond_id` foreign key and aborts on
//! the first failed step; the hosting ledger discards partial mutations of
//! a failed top-level operation.

use crate::{
    contracts::ContractRegistry,
    error::{Error, Result},
    store::{composite_key, StateStore, TABLE_BONDS},
    trades::TradeRegistry,
    types::{Bond, BondId},
};
use std::sync::Arc;

/// Registry over bond rows
pub struct BondRegistry {
    store: Arc<dyn StateStore>,
}

impl BondRegistry {
    /// Create a registry over the store
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    fn key(issuer_id: &str, id: &BondId) -> Vec<u8> {
        composite_key(issuer_id, &id.to_string())
    }

    /// Insert a new bond; fails with `DuplicateKey` if a bond with the same
    /// (issuer, id) already exists
    pub fn create(&self, bond: &Bond) -> Result<()> {
        let row = bincode::serialize(bond)?;
        self.store
            .insert(TABLE_BONDS, &Self::key(&bond.issuer_id, &bond.id), &row)?;

        tracing::debug!(bond_id = %bond.id, principal = bond.principal, "Bond created");
        Ok(())
    }

    /// Point lookup by (issuer, id)
    pub fn get(&self, issuer_id: &str, id: &BondId) -> Result<Bond> {
        let row = self
            .store
            .get(TABLE_BONDS, &Self::key(issuer_id, id))?
            .ok_or_else(|| Error::NotFound(format!("bond {}", id)))?;
        Ok(bincode::deserialize(&row)?)
    }

    /// List bonds; `None` returns every bond (used by batch scans)
    pub fn list(&self, issuer_id: Option<&str>) -> Result<Vec<Bond>> {
        let prefix = match issuer_id {
            Some(issuer) => composite_key(issuer, ""),
            None => Vec::new(),
        };

        let mut bonds = Vec::new();
        for (_, row) in self.store.scan(TABLE_BONDS, &prefix)? {
            bonds.push(bincode::deserialize(&row)?);
        }
        Ok(bonds)
    }

    /// Record one coupon payment against the bond, full-row replace
    pub fn mark_coupon_paid(&self, bond: &Bond) -> Result<Bond> {
        let mut updated = bond.clone();
        updated.coupons_paid += 1;

        let row = bincode::serialize(&updated)?;
        self.store
            .replace(TABLE_BONDS, &Self::key(&updated.issuer_id, &updated.id), &row)?;
        Ok(updated)
    }

    /// Archive the bond, cascading to every contract (and its trade) that
    /// references it
    pub fn archive(
        &self,
        contracts: &ContractRegistry,
        trades: &TradeRegistry,
        bond: &Bond,
    ) -> Result<()> {
        for contract in contracts.list_by_issuer(&bond.issuer_id)? {
            if contract.bond_id == bond.id {
                contracts.archive(trades, &contract)?;
            }
        }

        self.store
            .delete(TABLE_BONDS, &Self::key(&bond.issuer_id, &bond.id))?;

        tracing::info!(bond_id = %bond.id, "Bond archived");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn registry() -> BondRegistry {
        BondRegistry::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_create_and_get() {
        let bonds = registry();
        let bond = Bond::new("issuer0", "2017.6.13", 500_000, 600, 12);

        bonds.create(&bond).unwrap();

        let loaded = bonds.get("issuer0", &bond.id).unwrap();
        assert_eq!(loaded, bond);
    }

    #[test]
    fn test_duplicate_create_rejected() {
        let bonds = registry();
        let bond = Bond::new("issuer0", "2017.6.13", 500_000, 600, 12);

        bonds.create(&bond).unwrap();
        assert!(matches!(bonds.create(&bond), Err(Error::DuplicateKey(_))));
    }

    #[test]
    fn test_get_missing_bond() {
        let bonds = registry();
        let id = BondId::new("issuer0", "2017.6.13", 600);
        assert!(matches!(bonds.get("issuer0", &id), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_list_filters_by_issuer() {
        let bonds = registry();
        bonds
            .create(&Bond::new("issuer0", "2017.6.13", 500_000, 600, 12))
            .unwrap();
        bonds
            .create(&Bond::new("issuer0", "2018.1.1", 200_000, 450, 6))
            .unwrap();
        bonds
            .create(&Bond::new("issuer1", "2017.6.13", 100_000, 600, 12))
            .unwrap();

        assert_eq!(bonds.list(Some("issuer0")).unwrap().len(), 2);
        assert_eq!(bonds.list(Some("issuer1")).unwrap().len(), 1);
        assert_eq!(bonds.list(None).unwrap().len(), 3);
        assert!(bonds.list(Some("issuer2")).unwrap().is_empty());
    }

    #[test]
    fn test_mark_coupon_paid_persists() {
        let bonds = registry();
        let bond = Bond::new("issuer0", "2017.6.13", 500_000, 600, 12);
        bonds.create(&bond).unwrap();

        let updated = bonds.mark_coupon_paid(&bond).unwrap();
        assert_eq!(updated.coupons_paid, 1);

        let loaded = bonds.get("issuer0", &bond.id).unwrap();
        assert_eq!(loaded.coupons_paid, 1);
    }
}
