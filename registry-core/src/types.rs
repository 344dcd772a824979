//! Core types for the bond registry
//!
//! All types are designed for:
//! - Deterministic serialization (bincode rows, full-row replace)
//! - Backward-compatible dotted wire identifiers
//! - Integer arithmetic for money (whole currency units)

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller role extracted from credentials by the hosting ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Issues bonds
    Issuer,
    /// Trades contracts
    Investor,
    /// Read-only oversight
    Auditor,
    /// Automated batch actor
    System,
    /// External payment agent (callback caller)
    PaymentAgent,
}

impl Role {
    /// Wire name of the role
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Issuer => "issuer",
            Role::Investor => "investor",
            Role::Auditor => "auditor",
            Role::System => "system",
            Role::PaymentAgent => "paymentagent",
        }
    }

    /// Parse from the credential attribute value
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "issuer" => Some(Role::Issuer),
            "investor" => Some(Role::Investor),
            "auditor" => Some(Role::Auditor),
            "system" => Some(Role::System),
            "paymentagent" => Some(Role::PaymentAgent),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Resolved caller identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    /// Enrollment name
    pub name: String,
    /// Role attribute
    pub role: Role,
    /// Company attribute
    pub company: String,
}

impl Caller {
    /// Create a caller identity
    pub fn new(name: impl Into<String>, role: Role, company: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role,
            company: company.into(),
        }
    }
}

/// Bond identifier: issuer, maturity date, and rate
///
/// The wire form is the dotted string `issuer.maturityDate.rate`. The
/// maturity date is opaque and may itself contain dots, so parsing takes
/// the first segment as issuer and the last as rate. Not guaranteed
/// collision-free across repeated identical terms.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BondId {
    /// Issuing entity
    pub issuer: String,
    /// Opaque maturity date string
    pub maturity: String,
    /// Rate in basis points
    pub rate: u64,
}

impl BondId {
    /// Create a bond id from its components
    pub fn new(issuer: impl Into<String>, maturity: impl Into<String>, rate: u64) -> Self {
        Self {
            issuer: issuer.into(),
            maturity: maturity.into(),
            rate,
        }
    }

    /// Parse the dotted wire form
    pub fn parse(s: &str) -> Result<Self> {
        let segments: Vec<&str> = s.split('.').collect();
        if segments.len() < 3 {
            return Err(Error::Validation(format!("Malformed bond id: {}", s)));
        }
        let rate = segments[segments.len() - 1]
            .parse::<u64>()
            .map_err(|_| Error::Validation(format!("Malformed bond id rate: {}", s)))?;
        Ok(Self {
            issuer: segments[0].to_string(),
            maturity: segments[1..segments.len() - 1].join("."),
            rate,
        })
    }
}

impl fmt::Display for BondId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.issuer, self.maturity, self.rate)
    }
}

/// Contract identifier: bond id plus fractional-unit sequence number
///
/// Wire form `issuer.maturityDate.rate.sequence`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContractId {
    /// Parent bond
    pub bond: BondId,
    /// Fractional-unit sequence (assigned descending at issuance)
    pub sequence: u64,
}

impl ContractId {
    /// Create a contract id from its components
    pub fn new(bond: BondId, sequence: u64) -> Self {
        Self { bond, sequence }
    }

    /// Parse the dotted wire form
    pub fn parse(s: &str) -> Result<Self> {
        let (bond_part, seq_part) = s
            .rsplit_once('.')
            .ok_or_else(|| Error::Validation(format!("Malformed contract id: {}", s)))?;
        let sequence = seq_part
            .parse::<u64>()
            .map_err(|_| Error::Validation(format!("Malformed contract sequence: {}", s)))?;
        let bond = BondId::parse(bond_part)?;
        Ok(Self { bond, sequence })
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.bond, self.sequence)
    }
}

/// Bond lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BondState {
    /// Live and accruing coupons
    Active,
}

/// Contract lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractState {
    /// Listed for sale
    Offer,
    /// Sold, payment not yet confirmed
    Reserved,
    /// Owned and accruing coupons
    Active,
}

impl ContractState {
    /// Wire name of the state
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractState::Offer => "offer",
            ContractState::Reserved => "reserved",
            ContractState::Active => "active",
        }
    }
}

impl fmt::Display for ContractState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Trade lifecycle state
///
/// `offer --buy--> reserved --confirm--> settled`; no cancel path. Archival
/// deletes the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeState {
    /// Open offer
    Offer,
    /// Buyer committed, awaiting payment confirmation
    Reserved,
    /// Payment confirmed
    Settled,
}

impl TradeState {
    /// Wire name of the state
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeState::Offer => "offer",
            TradeState::Reserved => "reserved",
            TradeState::Settled => "settled",
        }
    }
}

impl fmt::Display for TradeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Principal asset issued by an issuer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bond {
    /// Issuing entity (key component)
    pub issuer_id: String,

    /// Bond identifier (key component)
    pub id: BondId,

    /// Principal in whole currency units
    pub principal: u64,

    /// Number of coupon periods
    pub term: u64,

    /// Opaque maturity date string
    pub maturity_date: String,

    /// Rate in basis points
    pub rate: u64,

    /// Catastrophe trigger description
    pub trigger: String,

    /// Lifecycle state
    pub state: BondState,

    /// Coupon payments recorded so far
    pub coupons_paid: u64,
}

impl Bond {
    /// Create a new active bond; the id is derived from issuer, maturity
    /// and rate
    pub fn new(
        issuer_id: impl Into<String>,
        maturity_date: impl Into<String>,
        principal: u64,
        rate: u64,
        term: u64,
    ) -> Self {
        let issuer_id = issuer_id.into();
        let maturity_date = maturity_date.into();
        let id = BondId::new(issuer_id.clone(), maturity_date.clone(), rate);
        Self {
            issuer_id,
            id,
            principal,
            term,
            maturity_date,
            rate,
            trigger: String::new(),
            state: BondState::Active,
            coupons_paid: 0,
        }
    }

    /// Eligible for archival once every coupon period has been recorded
    pub fn is_expired(&self) -> bool {
        self.coupons_paid >= self.term
    }
}

/// One fractional unit of a bond
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    /// Issuing entity (key component)
    pub issuer_id: String,

    /// Contract identifier (key component)
    pub id: ContractId,

    /// Current holder; the issuer is the first owner
    pub owner_id: String,

    /// Coupons paid against this unit
    pub coupons_paid: u64,

    /// Lifecycle state
    pub state: ContractState,

    /// Parent bond (explicit foreign key, cascades use this)
    pub bond_id: BondId,
}

/// An offer to transfer ownership of a contract at a price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Globally unique id from the trade counter
    pub id: u64,

    /// Contract on offer
    pub contract_id: ContractId,

    /// Owner at the time the offer was created
    pub seller_id: String,

    /// Offer price per contract
    pub price: u64,

    /// Lifecycle state
    pub state: TradeState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bond_id_round_trip() {
        let id = BondId::new("issuer0", "2017.6.13", 600);
        assert_eq!(id.to_string(), "issuer0.2017.6.13.600");
        assert_eq!(BondId::parse("issuer0.2017.6.13.600").unwrap(), id);
    }

    #[test]
    fn test_contract_id_round_trip() {
        let id = ContractId::new(BondId::new("issuer0", "2017.6.13", 600), 42);
        assert_eq!(id.to_string(), "issuer0.2017.6.13.600.42");
        let parsed = ContractId::parse("issuer0.2017.6.13.600.42").unwrap();
        assert_eq!(parsed, id);
        assert_eq!(parsed.bond.issuer, "issuer0");
        assert_eq!(parsed.bond.maturity, "2017.6.13");
        assert_eq!(parsed.bond.rate, 600);
        assert_eq!(parsed.sequence, 42);
    }

    #[test]
    fn test_malformed_ids_rejected() {
        assert!(BondId::parse("issuer0").is_err());
        assert!(BondId::parse("issuer0.2017.notarate").is_err());
        assert!(ContractId::parse("issuer0.600").is_err());
        assert!(ContractId::parse("issuer0.2017.600.notaseq").is_err());
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("issuer"), Some(Role::Issuer));
        assert_eq!(Role::parse("paymentagent"), Some(Role::PaymentAgent));
        assert_eq!(Role::parse("swiftagent"), None);
    }

    #[test]
    fn test_bond_expiry() {
        let mut bond = Bond::new("issuer0", "2017.6.13", 300_000, 600, 12);
        assert!(!bond.is_expired());
        bond.coupons_paid = 12;
        assert!(bond.is_expired());
    }
}
