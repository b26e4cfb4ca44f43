//! External collaborator interfaces
//!
//! The market consumes credit lines, liquidity pools and a token ledger
//! through these traits. Any error they return aborts the calling operation
//! before the market commits its own state change.
//!
//! Hooks receive an owned snapshot of the loan, so implementations never
//! need to call back into the market while an operation is in flight.

use async_trait::async_trait;

use lendmarket_common::{AccountId, CollaboratorError, LoanId, LoanState, LoanTerms};

/// Result type for collaborator calls
pub type CollaboratorResult<T> = std::result::Result<T, CollaboratorError>;

/// Credit scoring component that prices and approves loans
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CreditLine: Send + Sync {
    /// Identity under which the credit line is registered
    fn address(&self) -> AccountId;

    /// Lender that owns this credit line
    fn lender(&self) -> AccountId;

    /// Terms for a loan of `borrow_amount` over `duration_in_periods`
    async fn determine_loan_terms(
        &self,
        borrower: AccountId,
        borrow_amount: u64,
        duration_in_periods: u32,
    ) -> CollaboratorResult<LoanTerms>;

    /// Called for every new loan before it is committed
    async fn on_before_loan_taken(&self, loan_id: LoanId, loan: LoanState)
        -> CollaboratorResult<()>;

    /// Called after a loan was revoked
    async fn on_after_loan_revocation(&self, loan_id: LoanId) -> CollaboratorResult<()>;
}

/// Token source and sink of a lending program
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LiquidityPool: Send + Sync {
    /// Account that holds the pool's tokens
    fn address(&self) -> AccountId;

    /// Lender that owns this pool
    fn lender(&self) -> AccountId;

    /// Called for every new loan before it is committed
    async fn on_before_loan_taken(&self, loan_id: LoanId, loan: LoanState)
        -> CollaboratorResult<()>;

    /// Called after a repayment was transferred into the pool
    async fn on_after_loan_payment(&self, loan_id: LoanId, amount: u64) -> CollaboratorResult<()>;

    /// Called after a loan was revoked and settled
    async fn on_after_loan_revocation(&self, loan_id: LoanId) -> CollaboratorResult<()>;
}

/// Fungible token transfers
#[async_trait]
pub trait TokenLedger: Send + Sync {
    /// Move `amount` of `token` from `from` to `to`, atomically
    async fn transfer(
        &self,
        token: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: u64,
    ) -> CollaboratorResult<()>;

    /// Current balance of `account` in `token`
    async fn balance_of(&self, token: &AccountId, account: &AccountId) -> u64;
}
