//! In-memory collaborator implementations
//!
//! Reference implementations of the collaborator traits for tests,
//! simulations and embedding the engine without external services.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use lendmarket_common::{
    AccountId, BalanceError, CollaboratorError, LoanId, LoanState, LoanTerms, TokenAccount,
};

use crate::collaborators::{CollaboratorResult, CreditLine, LiquidityPool, TokenLedger};

/// Token ledger backed by a concurrent map of accounts
///
/// Uses DashMap for concurrent access, one entry per (token, owner).
#[derive(Default)]
pub struct InMemoryTokenLedger {
    accounts: DashMap<(AccountId, AccountId), TokenAccount>,
}

impl InMemoryTokenLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create tokens out of thin air (test setup)
    pub fn mint(
        &self,
        token: &AccountId,
        owner: &AccountId,
        amount: u64,
    ) -> CollaboratorResult<()> {
        self.accounts
            .entry((token.clone(), owner.clone()))
            .or_insert_with(|| TokenAccount::new(owner.clone(), token.clone()))
            .credit(amount)?;
        Ok(())
    }

    /// Snapshot of one account, if it was ever touched
    pub fn account(&self, token: &AccountId, owner: &AccountId) -> Option<TokenAccount> {
        self.accounts
            .get(&(token.clone(), owner.clone()))
            .map(|entry| entry.clone())
    }
}

#[async_trait]
impl TokenLedger for InMemoryTokenLedger {
    async fn transfer(
        &self,
        token: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: u64,
    ) -> CollaboratorResult<()> {
        if amount == 0 {
            return Err(BalanceError::InvalidAmount.into());
        }
        if from == to {
            let available = self.balance_of(token, from).await;
            if available < amount {
                return Err(BalanceError::InsufficientBalance {
                    required: amount,
                    available,
                }
                .into());
            }
            return Ok(());
        }

        {
            let mut source = self
                .accounts
                .get_mut(&(token.clone(), from.clone()))
                .ok_or(BalanceError::InsufficientBalance {
                    required: amount,
                    available: 0,
                })?;
            source.debit(amount)?;
        }

        let credited = self
            .accounts
            .entry((token.clone(), to.clone()))
            .or_insert_with(|| TokenAccount::new(to.clone(), token.clone()))
            .credit(amount);

        if let Err(err) = credited {
            // Put the debited amount back before reporting
            if let Some(mut source) = self.accounts.get_mut(&(token.clone(), from.clone())) {
                source.credit(amount)?;
            }
            return Err(err.into());
        }

        debug!(%token, %from, %to, amount, "Transferred tokens");
        Ok(())
    }

    async fn balance_of(&self, token: &AccountId, account: &AccountId) -> u64 {
        self.accounts
            .get(&(token.clone(), account.clone()))
            .map(|entry| entry.balance)
            .unwrap_or(0)
    }
}

/// Hook invocation observed by an in-memory collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookCall {
    BeforeLoanTaken(LoanId),
    AfterLoanPayment(LoanId, u64),
    AfterLoanRevocation(LoanId),
}

/// Credit line that hands out the same terms to every borrower
pub struct StaticCreditLine {
    address: AccountId,
    lender: AccountId,
    terms: Mutex<LoanTerms>,
    calls: Mutex<Vec<HookCall>>,
    rejecting: AtomicBool,
}

impl StaticCreditLine {
    pub fn new(
        address: impl Into<AccountId>,
        lender: impl Into<AccountId>,
        terms: LoanTerms,
    ) -> Self {
        Self {
            address: address.into(),
            lender: lender.into(),
            terms: Mutex::new(terms),
            calls: Mutex::new(Vec::new()),
            rejecting: AtomicBool::new(false),
        }
    }

    pub fn set_terms(&self, terms: LoanTerms) {
        *self.terms.lock() = terms;
    }

    /// Make every subsequent hook and terms request fail
    pub fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<HookCall> {
        self.calls.lock().clone()
    }

    fn check(&self) -> CollaboratorResult<()> {
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(CollaboratorError::rejected(self.address.as_str(), "credit line closed"));
        }
        Ok(())
    }
}

#[async_trait]
impl CreditLine for StaticCreditLine {
    fn address(&self) -> AccountId {
        self.address.clone()
    }

    fn lender(&self) -> AccountId {
        self.lender.clone()
    }

    async fn determine_loan_terms(
        &self,
        _borrower: AccountId,
        _borrow_amount: u64,
        duration_in_periods: u32,
    ) -> CollaboratorResult<LoanTerms> {
        self.check()?;
        let mut terms = self.terms.lock().clone();
        if terms.duration_in_periods == 0 {
            terms.duration_in_periods = duration_in_periods;
        }
        Ok(terms)
    }

    async fn on_before_loan_taken(
        &self,
        loan_id: LoanId,
        _loan: LoanState,
    ) -> CollaboratorResult<()> {
        self.check()?;
        self.calls.lock().push(HookCall::BeforeLoanTaken(loan_id));
        Ok(())
    }

    async fn on_after_loan_revocation(&self, loan_id: LoanId) -> CollaboratorResult<()> {
        self.check()?;
        self.calls.lock().push(HookCall::AfterLoanRevocation(loan_id));
        Ok(())
    }
}

/// Liquidity pool that only records the hooks it receives
///
/// Token custody lives in the [`TokenLedger`] under the pool's address.
pub struct InMemoryLiquidityPool {
    address: AccountId,
    lender: AccountId,
    calls: Mutex<Vec<HookCall>>,
    rejecting: AtomicBool,
}

impl InMemoryLiquidityPool {
    pub fn new(address: impl Into<AccountId>, lender: impl Into<AccountId>) -> Self {
        Self {
            address: address.into(),
            lender: lender.into(),
            calls: Mutex::new(Vec::new()),
            rejecting: AtomicBool::new(false),
        }
    }

    /// Make every subsequent hook fail
    pub fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<HookCall> {
        self.calls.lock().clone()
    }

    fn record(&self, call: HookCall) -> CollaboratorResult<()> {
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(CollaboratorError::rejected(self.address.as_str(), "pool hook rejected"));
        }
        self.calls.lock().push(call);
        Ok(())
    }
}

#[async_trait]
impl LiquidityPool for InMemoryLiquidityPool {
    fn address(&self) -> AccountId {
        self.address.clone()
    }

    fn lender(&self) -> AccountId {
        self.lender.clone()
    }

    async fn on_before_loan_taken(
        &self,
        loan_id: LoanId,
        _loan: LoanState,
    ) -> CollaboratorResult<()> {
        self.record(HookCall::BeforeLoanTaken(loan_id))
    }

    async fn on_after_loan_payment(&self, loan_id: LoanId, amount: u64) -> CollaboratorResult<()> {
        self.record(HookCall::AfterLoanPayment(loan_id, amount))
    }

    async fn on_after_loan_revocation(&self, loan_id: LoanId) -> CollaboratorResult<()> {
        self.record(HookCall::AfterLoanRevocation(loan_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> AccountId {
        AccountId::from("usd")
    }

    #[tokio::test]
    async fn test_transfer_moves_balance() {
        let ledger = InMemoryTokenLedger::new();
        let (alice, bob) = (AccountId::from("alice"), AccountId::from("bob"));
        ledger.mint(&token(), &alice, 100).unwrap();

        ledger.transfer(&token(), &alice, &bob, 40).await.unwrap();

        assert_eq!(ledger.balance_of(&token(), &alice).await, 60);
        assert_eq!(ledger.balance_of(&token(), &bob).await, 40);
    }

    #[tokio::test]
    async fn test_transfer_insufficient_balance_leaves_state() {
        let ledger = InMemoryTokenLedger::new();
        let (alice, bob) = (AccountId::from("alice"), AccountId::from("bob"));
        ledger.mint(&token(), &alice, 10).unwrap();

        let err = ledger.transfer(&token(), &alice, &bob, 11).await.unwrap_err();
        assert!(matches!(
            err,
            CollaboratorError::Balance(BalanceError::InsufficientBalance { .. })
        ));
        assert_eq!(ledger.balance_of(&token(), &alice).await, 10);
        assert_eq!(ledger.balance_of(&token(), &bob).await, 0);

        // Unknown sources have nothing to send
        let err = ledger.transfer(&token(), &bob, &alice, 1).await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Balance(_)));
    }

    #[tokio::test]
    async fn test_credit_line_fills_missing_duration() {
        let line = StaticCreditLine::new(
            "line",
            "lender",
            LoanTerms {
                token: token(),
                addon_amount: 0,
                duration_in_periods: 0,
                interest_rate_primary: 1,
                interest_rate_secondary: 2,
            },
        );
        let terms = line
            .determine_loan_terms(AccountId::from("b"), 10_000, 30)
            .await
            .unwrap();
        assert_eq!(terms.duration_in_periods, 30);

        line.set_rejecting(true);
        assert!(line
            .determine_loan_terms(AccountId::from("b"), 10_000, 30)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_pool_records_hooks() {
        let pool = InMemoryLiquidityPool::new("pool", "lender");
        pool.on_after_loan_payment(3, 500).await.unwrap();
        pool.on_after_loan_revocation(3).await.unwrap();
        assert_eq!(
            pool.calls(),
            vec![HookCall::AfterLoanPayment(3, 500), HookCall::AfterLoanRevocation(3)]
        );

        pool.set_rejecting(true);
        assert!(pool.on_after_loan_revocation(4).await.is_err());
        assert_eq!(pool.calls().len(), 2);
    }
}
