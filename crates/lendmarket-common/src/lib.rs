//! # Lendmarket Common
//!
//! Shared types and errors for the Lendmarket loan accrual engine.
//!
//! ## Core Types
//!
//! - [`AccountId`]: identity of borrowers, lenders, collaborators and tokens
//! - [`LoanState`]: per-loan mutable record (balance checkpoint, terms, freeze marker)
//! - [`LoanPreview`]/[`InstallmentLoanPreview`]: balances at a query instant
//! - [`LoanTerms`]: terms a credit line assigns to a new loan
//! - [`TokenAccount`]: per-owner token balance used by the in-memory ledger
//!
//! ## Errors
//!
//! - [`LendingError`]: unified error with one variant per failure class

pub mod error;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{
    ArgumentError, AuthorizationError, CollaboratorError, ErrorKind, LendingError,
    LoanStateError, NotFoundError, OverflowError, PauseError, Result,
};
pub use types::{
    account::AccountId,
    loan::{
        InstallmentLoanPreview, LoanId, LoanPreview, LoanState, LoanStatus, LoanTerms, LoanType,
        ProgramId,
    },
    token_account::{BalanceError, TokenAccount},
};

/// Lendmarket version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Repayment amount meaning "settle the whole outstanding balance"
pub const FULL_REPAYMENT_AMOUNT: u64 = u64::MAX;

/// Largest assignable loan id (40-bit counter)
pub const LOAN_ID_MAX: u64 = (1 << 40) - 1;

/// Default period length in seconds (one day)
pub const DEFAULT_PERIOD_IN_SECONDS: u64 = 86_400;

/// Default negative time offset in seconds (three hours)
pub const DEFAULT_NEGATIVE_TIME_OFFSET: u64 = 3 * 60 * 60;

/// Default fixed-point scale of interest rates
pub const DEFAULT_INTEREST_RATE_FACTOR: u64 = 1_000_000_000;

/// Default rounding granularity of payable amounts
pub const DEFAULT_ACCURACY_FACTOR: u64 = 10_000;

/// Default borrower self-revocation window in periods
pub const DEFAULT_COOLDOWN_IN_PERIODS: u32 = 3;

/// Default upper bound of an installment batch
pub const DEFAULT_INSTALLMENT_COUNT_MAX: u32 = 180;
