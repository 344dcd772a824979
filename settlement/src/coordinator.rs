//! Settlement coordinator
//!
//! Drives the bond/contract/trade lifecycle over the registries and hands
//! purchases off to the external payer. The purchase leg is two-phase:
//! `buy` moves ownership and dispatches the payment instruction, the
//! payer's asynchronous `confirm` callback finalizes contract and trade.
//! Between the two the contract sits in `reserved`; a dispatch failure
//! leaves ownership moved with the outbox record marked failed, and relies
//! on the host boundary to discard the partial mutation.

use crate::{
    config::Config,
    error::{Error, Result},
    payment::{Outbox, PaymentDispatcher, PaymentInstruction, PaymentType},
};
use registry_core::store::{StateStore, TABLE_META};
use registry_core::{
    Bond, BondRegistry, Caller, Contract, ContractRegistry, ContractState, Trade, TradeRegistry,
    TradeState,
};
use std::sync::Arc;

const META_CALLBACK_TARGET: &[u8] = b"callback_target";

/// Lifecycle coordinator over the registries and the payment seam
pub struct SettlementCoordinator {
    pub(crate) bonds: BondRegistry,
    pub(crate) contracts: ContractRegistry,
    pub(crate) trades: TradeRegistry,
    pub(crate) outbox: Outbox,
    store: Arc<dyn StateStore>,
    pub(crate) dispatcher: Arc<dyn PaymentDispatcher>,
    pub(crate) config: Config,
}

impl SettlementCoordinator {
    /// Create a coordinator; all registries share the store
    pub fn new(
        store: Arc<dyn StateStore>,
        dispatcher: Arc<dyn PaymentDispatcher>,
        config: Config,
    ) -> Self {
        Self {
            bonds: BondRegistry::new(store.clone()),
            contracts: ContractRegistry::new(store.clone()),
            trades: TradeRegistry::new(store.clone()),
            outbox: Outbox::new(store.clone()),
            store,
            dispatcher,
            config,
        }
    }

    /// Bond registry handle (query surface)
    pub fn bonds(&self) -> &BondRegistry {
        &self.bonds
    }

    /// Contract registry handle (query surface)
    pub fn contracts(&self) -> &ContractRegistry {
        &self.contracts
    }

    /// Trade registry handle (query surface)
    pub fn trades(&self) -> &TradeRegistry {
        &self.trades
    }

    /// Instruction outbox handle
    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Issue a bond and mint its fractional contracts
    ///
    /// The contract count is `principal / price_per_contract`, integer
    /// division; a remainder smaller than one denomination stays unbacked.
    /// Each minted contract carries an initial offer trade at the nominal
    /// offer price.
    pub fn issue(
        &self,
        caller: &Caller,
        maturity_date: &str,
        principal: u64,
        rate: u64,
        term: u64,
    ) -> Result<Bond> {
        if term == 0 {
            return Err(Error::Validation("Bond term must be at least 1".to_string()));
        }

        let bond = Bond::new(&caller.name, maturity_date, principal, rate, term);
        let count = principal / self.config.price_per_contract;

        self.bonds.create(&bond)?;
        self.contracts
            .create_batch(&self.trades, &bond, count, self.config.nominal_offer_price)?;

        tracing::info!(bond_id = %bond.id, principal, count, "Bond issued");
        Ok(bond)
    }

    /// List a held contract for sale at `price`
    ///
    /// Only the current owner may list; the contract moves back to `offer`
    /// as a side effect of the trade creation.
    pub fn sell(&self, caller: &Caller, contract_id: &str, price: u64) -> Result<Trade> {
        let contract = self.contracts.get_by_id(contract_id)?;
        if contract.owner_id != caller.name {
            return Err(Error::Unauthorized(format!(
                "Caller {} does not own contract {}",
                caller.name, contract_id
            )));
        }

        let trade = self
            .trades
            .create_for_contract(&self.contracts, &contract, price)?;

        tracing::info!(trade_id = trade.id, contract_id = %contract.id, price, "Contract listed");
        Ok(trade)
    }

    /// Buy an offered trade
    ///
    /// Reserves contract and trade for the caller and dispatches the
    /// payment instruction for `price * 1000` (offer prices are quoted in
    /// 1/1000ths of the contract denomination).
    pub async fn buy(&self, caller: &Caller, trade_id: u64) -> Result<Trade> {
        let trade = self.trades.get_by_id_and_state(TradeState::Offer, trade_id)?;
        let contract = self.contracts.get_by_id(&trade.contract_id.to_string())?;

        let amount = trade
            .price
            .checked_mul(1000)
            .ok_or_else(|| Error::Validation(format!("Trade price overflow: {}", trade.price)))?;

        let contract_id = contract.id.to_string();
        self.outbox.record_pending(
            &contract_id,
            PaymentType::Payment,
            &caller.name,
            &trade.seller_id,
            amount,
        )?;

        self.contracts
            .transfer_ownership(&contract, &caller.name, ContractState::Reserved)?;

        let instruction = PaymentInstruction {
            payer: caller.name.clone(),
            payee: trade.seller_id.clone(),
            amount,
            payment_type: PaymentType::Payment,
            instruction_id: contract_id.clone(),
            callback_target: self.callback_target()?,
            callback_function: "confirm".to_string(),
            payload: contract_id.clone(),
        };

        if let Err(e) = self
            .dispatcher
            .submit_payment(&self.config.payment_target, instruction.to_args())
            .await
        {
            self.outbox.mark_failed(&contract_id, PaymentType::Payment)?;
            return Err(Error::ExternalCall(format!(
                "Payment dispatch failed for contract {}: {}",
                contract_id, e
            )));
        }

        let reserved = self.trades.transition(&trade, TradeState::Reserved)?;

        tracing::info!(
            trade_id = reserved.id,
            contract_id = %contract_id,
            buyer = %caller.name,
            amount,
            "Purchase reserved, payment instruction dispatched"
        );
        Ok(reserved)
    }

    /// Payment-confirmed callback for a purchase
    ///
    /// Activates the contract and settles its reserved trade. With callback
    /// verification enabled the contract must have a pending `payment`
    /// instruction in the outbox.
    pub fn confirm(&self, contract_id: &str) -> Result<Contract> {
        if self.config.verify_callbacks {
            self.outbox.expect_pending(contract_id, PaymentType::Payment)?;
        }

        let contract = self.contracts.get_by_id(contract_id)?;
        let trade = self
            .trades
            .get_by_contract(&contract.id, Some(TradeState::Reserved))?;

        let activated =
            self.contracts
                .transfer_ownership(&contract, &contract.owner_id, ContractState::Active)?;
        self.trades.transition(&trade, TradeState::Settled)?;
        self.outbox.try_acknowledge(contract_id, PaymentType::Payment)?;

        tracing::info!(contract_id = %activated.id, owner = %activated.owner_id, "Purchase settled");
        Ok(activated)
    }

    /// Coupon-paid callback for one contract
    pub fn pay_contract_coupon(&self, contract_id: &str) -> Result<Contract> {
        if self.config.verify_callbacks {
            self.outbox.expect_pending(contract_id, PaymentType::Coupon)?;
        }

        let contract = self.contracts.increment_coupons_paid(contract_id)?;
        self.outbox.try_acknowledge(contract_id, PaymentType::Coupon)?;

        tracing::debug!(
            contract_id = %contract.id,
            coupons_paid = contract.coupons_paid,
            "Contract coupon recorded"
        );
        Ok(contract)
    }

    /// Record the identifier the external payer uses for callbacks
    pub fn set_callback_target(&self, target_id: &str) -> Result<()> {
        self.store
            .replace(TABLE_META, META_CALLBACK_TARGET, target_id.as_bytes())?;
        tracing::info!(target_id, "Callback target registered");
        Ok(())
    }

    /// Currently registered callback target; empty until one is set
    pub fn callback_target(&self) -> Result<String> {
        match self.store.get(TABLE_META, META_CALLBACK_TARGET)? {
            Some(raw) => String::from_utf8(raw)
                .map_err(|e| Error::Other(format!("Corrupt callback target: {}", e))),
            None => Ok(String::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payment::InstructionStatus;
    use async_trait::async_trait;
    use registry_core::{MemoryStore, Role};
    use std::sync::Mutex;

    /// Captures dispatched instructions for assertions
    struct RecordingDispatcher {
        calls: Mutex<Vec<(String, Vec<Vec<u8>>)>>,
    }

    impl RecordingDispatcher {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PaymentDispatcher for RecordingDispatcher {
        async fn submit_payment(&self, target: &str, args: Vec<Vec<u8>>) -> Result<Vec<u8>> {
            self.calls.lock().unwrap().push((target.to_string(), args));
            Ok(Vec::new())
        }
    }

    struct FailingDispatcher;

    #[async_trait]
    impl PaymentDispatcher for FailingDispatcher {
        async fn submit_payment(&self, _target: &str, _args: Vec<Vec<u8>>) -> Result<Vec<u8>> {
            Err(Error::ExternalCall("payer unreachable".to_string()))
        }
    }

    fn coordinator_with(dispatcher: Arc<dyn PaymentDispatcher>) -> SettlementCoordinator {
        SettlementCoordinator::new(Arc::new(MemoryStore::new()), dispatcher, Config::default())
    }

    fn issuer() -> Caller {
        Caller::new("issuer0", Role::Issuer, "Reinsurance AG")
    }

    fn investor() -> Caller {
        Caller::new("investor1", Role::Investor, "Pension Fund")
    }

    #[test]
    fn test_issue_mints_contracts_and_offers() {
        let coordinator = coordinator_with(Arc::new(RecordingDispatcher::new()));
        let bond = coordinator
            .issue(&issuer(), "2017.6.13", 300_000, 600, 12)
            .unwrap();

        assert_eq!(bond.id.to_string(), "issuer0.2017.6.13.600");
        assert_eq!(coordinator.contracts().list_by_issuer("issuer0").unwrap().len(), 3);
        assert_eq!(
            coordinator.trades().list(Some(TradeState::Offer)).unwrap().len(),
            3
        );
    }

    #[test]
    fn test_issue_truncates_remainder() {
        let coordinator = coordinator_with(Arc::new(RecordingDispatcher::new()));
        coordinator
            .issue(&issuer(), "2017.6.13", 250_000, 600, 12)
            .unwrap();
        assert_eq!(coordinator.contracts().list_by_issuer("issuer0").unwrap().len(), 2);
    }

    #[test]
    fn test_issue_rejects_zero_term() {
        let coordinator = coordinator_with(Arc::new(RecordingDispatcher::new()));
        let result = coordinator.issue(&issuer(), "2017.6.13", 300_000, 600, 0);
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_sell_requires_ownership() {
        let coordinator = coordinator_with(Arc::new(RecordingDispatcher::new()));
        coordinator
            .issue(&issuer(), "2017.6.13", 100_000, 600, 12)
            .unwrap();

        let result = coordinator.sell(&investor(), "issuer0.2017.6.13.600.0", 150);
        assert!(matches!(result, Err(Error::Unauthorized(_))));

        coordinator
            .sell(&issuer(), "issuer0.2017.6.13.600.0", 150)
            .unwrap();
    }

    #[tokio::test]
    async fn test_buy_reserves_and_dispatches() {
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let coordinator = coordinator_with(dispatcher.clone());
        coordinator.set_callback_target("catbond-registry").unwrap();
        coordinator
            .issue(&issuer(), "2017.6.13", 100_000, 600, 12)
            .unwrap();

        let offer = coordinator
            .trades()
            .list(Some(TradeState::Offer))
            .unwrap()
            .remove(0);
        let reserved = coordinator.buy(&investor(), offer.id).await.unwrap();
        assert_eq!(reserved.state, TradeState::Reserved);

        let contract = coordinator
            .contracts()
            .get_by_id("issuer0.2017.6.13.600.0")
            .unwrap();
        assert_eq!(contract.owner_id, "investor1");
        assert_eq!(contract.state, ContractState::Reserved);

        let calls = dispatcher.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (target, args) = &calls[0];
        assert_eq!(target, "swift-payments");
        assert_eq!(args[0], b"submitPayment");
        assert_eq!(args[1], b"investor1");
        assert_eq!(args[2], b"issuer0");
        assert_eq!(args[3], b"100000"); // nominal offer 100 * 1000
        assert_eq!(args[4], b"payment");
        assert_eq!(args[6], b"catbond-registry");
        assert_eq!(args[7], b"confirm");

        let record = coordinator
            .outbox()
            .get("issuer0.2017.6.13.600.0", PaymentType::Payment)
            .unwrap()
            .unwrap();
        assert_eq!(record.status, InstructionStatus::Pending);
    }

    #[tokio::test]
    async fn test_buy_missing_trade_not_found() {
        let coordinator = coordinator_with(Arc::new(RecordingDispatcher::new()));
        let err = coordinator.buy(&investor(), 999).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_buy_dispatch_failure_marks_outbox() {
        let coordinator = coordinator_with(Arc::new(FailingDispatcher));
        coordinator
            .issue(&issuer(), "2017.6.13", 100_000, 600, 12)
            .unwrap();

        let offer = coordinator
            .trades()
            .list(Some(TradeState::Offer))
            .unwrap()
            .remove(0);
        let err = coordinator.buy(&investor(), offer.id).await.unwrap_err();
        assert!(matches!(err, Error::ExternalCall(_)));

        let record = coordinator
            .outbox()
            .get("issuer0.2017.6.13.600.0", PaymentType::Payment)
            .unwrap()
            .unwrap();
        assert_eq!(record.status, InstructionStatus::Failed);

        // The trade never left offer state
        let trade = coordinator.trades().get(offer.id).unwrap();
        assert_eq!(trade.state, TradeState::Offer);
    }

    #[tokio::test]
    async fn test_confirm_settles_purchase() {
        let coordinator = coordinator_with(Arc::new(RecordingDispatcher::new()));
        coordinator
            .issue(&issuer(), "2017.6.13", 100_000, 600, 12)
            .unwrap();
        let offer = coordinator
            .trades()
            .list(Some(TradeState::Offer))
            .unwrap()
            .remove(0);
        coordinator.buy(&investor(), offer.id).await.unwrap();

        let contract = coordinator.confirm("issuer0.2017.6.13.600.0").unwrap();
        assert_eq!(contract.state, ContractState::Active);
        assert_eq!(contract.owner_id, "investor1");

        let trade = coordinator.trades().get(offer.id).unwrap();
        assert_eq!(trade.state, TradeState::Settled);

        let record = coordinator
            .outbox()
            .get("issuer0.2017.6.13.600.0", PaymentType::Payment)
            .unwrap()
            .unwrap();
        assert_eq!(record.status, InstructionStatus::Acknowledged);

        // A second confirm has no pending instruction to correlate against
        assert!(coordinator.confirm("issuer0.2017.6.13.600.0").is_err());
    }

    #[test]
    fn test_confirm_without_pending_instruction_rejected() {
        let coordinator = coordinator_with(Arc::new(RecordingDispatcher::new()));
        coordinator
            .issue(&issuer(), "2017.6.13", 100_000, 600, 12)
            .unwrap();

        let err = coordinator.confirm("issuer0.2017.6.13.600.0").unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_confirm_unverified_requires_reserved_trade() {
        let mut config = Config::default();
        config.verify_callbacks = false;
        let coordinator = SettlementCoordinator::new(
            Arc::new(MemoryStore::new()),
            Arc::new(RecordingDispatcher::new()),
            config,
        );
        coordinator
            .issue(&issuer(), "2017.6.13", 100_000, 600, 12)
            .unwrap();

        // No purchase happened, so there is no reserved trade to settle
        let err = coordinator.confirm("issuer0.2017.6.13.600.0").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_callback_target_round_trip() {
        let coordinator = coordinator_with(Arc::new(RecordingDispatcher::new()));
        assert_eq!(coordinator.callback_target().unwrap(), "");

        coordinator.set_callback_target("catbond-registry").unwrap();
        assert_eq!(coordinator.callback_target().unwrap(), "catbond-registry");
    }
}
