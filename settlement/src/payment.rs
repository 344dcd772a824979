//! Outbound payment instructions and the instruction outbox
//!
//! The external payer is reached through the [`PaymentDispatcher`] seam with
//! a positional byte-argument list. Every dispatch is bracketed by an outbox
//! record: Pending before the call, Acknowledged when the callback lands,
//! Failed when the dispatch itself errors. The callback entry points
//! correlate against the outbox by contract id, so a caller presenting an
//! unknown contract id is rejected when verification is enabled.

use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use registry_core::store::{composite_key, StateStore, TABLE_INSTRUCTIONS};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// External payment system seam
#[async_trait]
pub trait PaymentDispatcher: Send + Sync {
    /// Invoke the external payer at `target` with positional byte arguments
    ///
    /// No retries are attempted; an error surfaces to the caller of the
    /// triggering operation.
    async fn submit_payment(&self, target: &str, args: Vec<Vec<u8>>) -> Result<Vec<u8>>;
}

/// Dispatcher that only logs instructions; used when no payer is wired
pub struct LoggingDispatcher;

#[async_trait]
impl PaymentDispatcher for LoggingDispatcher {
    async fn submit_payment(&self, target: &str, args: Vec<Vec<u8>>) -> Result<Vec<u8>> {
        tracing::info!(target, arg_count = args.len(), "Payment instruction dispatched (logging only)");
        Ok(Vec::new())
    }
}

/// Payment instruction type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    /// Purchase settlement
    Payment,
    /// Coupon distribution
    Coupon,
}

impl PaymentType {
    /// Wire name of the type
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Payment => "payment",
            PaymentType::Coupon => "coupon",
        }
    }
}

impl fmt::Display for PaymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One outbound payment instruction
///
/// The wire format is order-significant: `submitPayment`, payer, payee,
/// amount as a decimal string, payment type, instruction id, callback
/// target id, callback function, callback payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentInstruction {
    /// Paying party
    pub payer: String,
    /// Receiving party
    pub payee: String,
    /// Absolute amount in currency units
    pub amount: u64,
    /// Instruction type
    pub payment_type: PaymentType,
    /// Instruction identifier (the contract id)
    pub instruction_id: String,
    /// Identifier the payer uses to reach back into this system
    pub callback_target: String,
    /// Callback function name (`confirm` / `payContractCoupon`)
    pub callback_function: String,
    /// Callback payload (the contract id)
    pub payload: String,
}

impl PaymentInstruction {
    /// Render the positional byte-argument list
    pub fn to_args(&self) -> Vec<Vec<u8>> {
        vec![
            b"submitPayment".to_vec(),
            self.payer.as_bytes().to_vec(),
            self.payee.as_bytes().to_vec(),
            self.amount.to_string().into_bytes(),
            self.payment_type.as_str().as_bytes().to_vec(),
            self.instruction_id.as_bytes().to_vec(),
            self.callback_target.as_bytes().to_vec(),
            self.callback_function.as_bytes().to_vec(),
            self.payload.as_bytes().to_vec(),
        ]
    }
}

/// Outbox record status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstructionStatus {
    /// Dispatched (or about to be), awaiting the callback
    Pending,
    /// Callback received
    Acknowledged,
    /// Dispatch failed
    Failed,
}

/// Persisted payment-instruction state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxRecord {
    /// Contract the instruction concerns
    pub contract_id: String,
    /// Instruction type
    pub payment_type: PaymentType,
    /// Paying party
    pub payer: String,
    /// Receiving party
    pub payee: String,
    /// Absolute amount in currency units
    pub amount: u64,
    /// Current status
    pub status: InstructionStatus,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Acknowledge/failure timestamp
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Instruction outbox over the shared store
///
/// One slot per (contract, payment type): a new sell/buy cycle for the same
/// contract reuses the slot.
pub struct Outbox {
    store: Arc<dyn StateStore>,
}

impl Outbox {
    /// Create an outbox over the store
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    fn key(contract_id: &str, payment_type: PaymentType) -> Vec<u8> {
        composite_key(contract_id, payment_type.as_str())
    }

    fn encode(record: &OutboxRecord) -> Result<Vec<u8>> {
        bincode::serialize(record)
            .map_err(registry_core::Error::from)
            .map_err(Error::from)
    }

    fn decode(row: &[u8]) -> Result<OutboxRecord> {
        bincode::deserialize(row)
            .map_err(registry_core::Error::from)
            .map_err(Error::from)
    }

    /// Persist a pending record before dispatching the instruction
    pub fn record_pending(
        &self,
        contract_id: &str,
        payment_type: PaymentType,
        payer: &str,
        payee: &str,
        amount: u64,
    ) -> Result<OutboxRecord> {
        let record = OutboxRecord {
            contract_id: contract_id.to_string(),
            payment_type,
            payer: payer.to_string(),
            payee: payee.to_string(),
            amount,
            status: InstructionStatus::Pending,
            created_at: Utc::now(),
            resolved_at: None,
        };

        self.store.replace(
            TABLE_INSTRUCTIONS,
            &Self::key(contract_id, payment_type),
            &Self::encode(&record)?,
        )?;
        Ok(record)
    }

    /// Load the record for (contract, type), if any
    pub fn get(&self, contract_id: &str, payment_type: PaymentType) -> Result<Option<OutboxRecord>> {
        match self
            .store
            .get(TABLE_INSTRUCTIONS, &Self::key(contract_id, payment_type))?
        {
            Some(row) => Ok(Some(Self::decode(&row)?)),
            None => Ok(None),
        }
    }

    /// Require a pending record for (contract, type)
    ///
    /// Used by the callback entry points to reject callers presenting a
    /// contract id with no outstanding instruction.
    pub fn expect_pending(&self, contract_id: &str, payment_type: PaymentType) -> Result<OutboxRecord> {
        match self.get(contract_id, payment_type)? {
            Some(record) if record.status == InstructionStatus::Pending => Ok(record),
            _ => Err(Error::Unauthorized(format!(
                "No pending {} instruction for contract {}",
                payment_type, contract_id
            ))),
        }
    }

    fn resolve(
        &self,
        contract_id: &str,
        payment_type: PaymentType,
        status: InstructionStatus,
    ) -> Result<Option<OutboxRecord>> {
        let Some(mut record) = self.get(contract_id, payment_type)? else {
            return Ok(None);
        };
        record.status = status;
        record.resolved_at = Some(Utc::now());

        self.store.replace(
            TABLE_INSTRUCTIONS,
            &Self::key(contract_id, payment_type),
            &Self::encode(&record)?,
        )?;
        Ok(Some(record))
    }

    /// Mark the record acknowledged if one exists; no-op otherwise
    pub fn try_acknowledge(&self, contract_id: &str, payment_type: PaymentType) -> Result<()> {
        if let Some(record) = self.resolve(contract_id, payment_type, InstructionStatus::Acknowledged)? {
            tracing::debug!(
                contract_id = %record.contract_id,
                payment_type = %record.payment_type,
                "Payment instruction acknowledged"
            );
        }
        Ok(())
    }

    /// Mark the record failed
    pub fn mark_failed(&self, contract_id: &str, payment_type: PaymentType) -> Result<()> {
        self.resolve(contract_id, payment_type, InstructionStatus::Failed)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use registry_core::MemoryStore;

    fn outbox() -> Outbox {
        Outbox::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_instruction_wire_format() {
        let instruction = PaymentInstruction {
            payer: "investor1".to_string(),
            payee: "issuer0".to_string(),
            amount: 150_000,
            payment_type: PaymentType::Payment,
            instruction_id: "issuer0.2017.6.13.600.0".to_string(),
            callback_target: "catbond-registry".to_string(),
            callback_function: "confirm".to_string(),
            payload: "issuer0.2017.6.13.600.0".to_string(),
        };

        let args = instruction.to_args();
        assert_eq!(args.len(), 9);
        assert_eq!(args[0], b"submitPayment");
        assert_eq!(args[1], b"investor1");
        assert_eq!(args[2], b"issuer0");
        assert_eq!(args[3], b"150000");
        assert_eq!(args[4], b"payment");
        assert_eq!(args[5], b"issuer0.2017.6.13.600.0");
        assert_eq!(args[6], b"catbond-registry");
        assert_eq!(args[7], b"confirm");
        assert_eq!(args[8], b"issuer0.2017.6.13.600.0");
    }

    #[test]
    fn test_pending_then_acknowledged() {
        let outbox = outbox();
        outbox
            .record_pending("c.1.600.0", PaymentType::Payment, "buyer", "seller", 100_000)
            .unwrap();

        let record = outbox
            .expect_pending("c.1.600.0", PaymentType::Payment)
            .unwrap();
        assert_eq!(record.status, InstructionStatus::Pending);

        outbox
            .try_acknowledge("c.1.600.0", PaymentType::Payment)
            .unwrap();
        let record = outbox.get("c.1.600.0", PaymentType::Payment).unwrap().unwrap();
        assert_eq!(record.status, InstructionStatus::Acknowledged);
        assert!(record.resolved_at.is_some());

        // Acknowledged records no longer satisfy expect_pending
        assert!(outbox
            .expect_pending("c.1.600.0", PaymentType::Payment)
            .is_err());
    }

    #[test]
    fn test_expect_pending_rejects_unknown_contract() {
        let outbox = outbox();
        let err = outbox
            .expect_pending("unknown.2020.600.0", PaymentType::Coupon)
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[test]
    fn test_types_use_separate_slots() {
        let outbox = outbox();
        outbox
            .record_pending("c.1.600.0", PaymentType::Payment, "buyer", "seller", 100_000)
            .unwrap();

        assert!(outbox.get("c.1.600.0", PaymentType::Coupon).unwrap().is_none());
        assert!(outbox.get("c.1.600.0", PaymentType::Payment).unwrap().is_some());
    }

    #[test]
    fn test_mark_failed() {
        let outbox = outbox();
        outbox
            .record_pending("c.1.600.0", PaymentType::Coupon, "issuer0", "owner", 8_333)
            .unwrap();
        outbox.mark_failed("c.1.600.0", PaymentType::Coupon).unwrap();

        let record = outbox.get("c.1.600.0", PaymentType::Coupon).unwrap().unwrap();
        assert_eq!(record.status, InstructionStatus::Failed);
    }
}
