//! Error types for the lending market
//!
//! Provides a unified error type and domain-specific error variants

use thiserror::Error;

use crate::types::account::AccountId;
use crate::types::loan::{LoanId, LoanType, ProgramId};
use crate::types::token_account::BalanceError;

/// Result type alias using LendingError
pub type Result<T> = std::result::Result<T, LendingError>;

/// Unified error type for lending market operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LendingError {
    // Referenced entity does not exist
    #[error("Not found: {0}")]
    NotFound(#[from] NotFoundError),

    // Loan is in the wrong lifecycle state
    #[error("Invalid loan state: {0}")]
    InvalidState(#[from] LoanStateError),

    // Rejected input
    #[error("Invalid argument: {0}")]
    InvalidArgument(#[from] ArgumentError),

    // Caller lacks the required role
    #[error("Authorization error: {0}")]
    Authorization(#[from] AuthorizationError),

    // Fixed-width capacity exceeded
    #[error("Overflow: {0}")]
    Overflow(#[from] OverflowError),

    // Global pause switch
    #[error("Market state error: {0}")]
    GlobalState(#[from] PauseError),

    // Ordinary/installment mismatch
    #[error("Loan type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: LoanType, actual: LoanType },

    // Credit line, liquidity pool or token ledger failure
    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`LendingError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    InvalidArgument,
    Authorization,
    Overflow,
    GlobalState,
    TypeMismatch,
    Collaborator,
    Config,
    Internal,
}

impl LendingError {
    /// Error class, independent of the concrete variant
    pub fn kind(&self) -> ErrorKind {
        match self {
            LendingError::NotFound(_) => ErrorKind::NotFound,
            LendingError::InvalidState(_) => ErrorKind::InvalidState,
            LendingError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            LendingError::Authorization(_) => ErrorKind::Authorization,
            LendingError::Overflow(_) => ErrorKind::Overflow,
            LendingError::GlobalState(_) => ErrorKind::GlobalState,
            LendingError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            LendingError::Collaborator(_) => ErrorKind::Collaborator,
            LendingError::Config(_) => ErrorKind::Config,
            LendingError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Missing loans and programs
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotFoundError {
    #[error("Loan does not exist: {0}")]
    Loan(LoanId),

    #[error("Program does not exist: {0}")]
    Program(ProgramId),
}

/// Lifecycle violations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoanStateError {
    #[error("Loan {0} is already repaid")]
    AlreadyRepaid(LoanId),

    #[error("Loan {0} is already frozen")]
    AlreadyFrozen(LoanId),

    #[error("Loan {0} is not frozen")]
    NotFrozen(LoanId),

    #[error("Cooldown period has passed for loan {loan_id}: {elapsed_periods} >= {cooldown_periods}")]
    CooldownPeriodPassed {
        loan_id: LoanId,
        elapsed_periods: u64,
        cooldown_periods: u32,
    },
}

/// Input validation errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArgumentError {
    #[error("Amount must be nonzero")]
    ZeroAmount,

    #[error("Amount {amount} is not a multiple of {accuracy_factor}")]
    UnroundedAmount { amount: u64, accuracy_factor: u64 },

    #[error("Repayment {amount} exceeds outstanding balance {outstanding}")]
    RepaymentExceedsOutstanding { amount: u64, outstanding: u64 },

    #[error("Installment set is empty")]
    EmptyInstallmentSet,

    #[error("Repayment batch is empty")]
    EmptyBatch,

    #[error("Array lengths do not match: {left} != {right}")]
    ArrayLengthMismatch { left: usize, right: usize },

    #[error("Durations must be non-decreasing, violated at index {index}")]
    DurationSequenceNotAscending { index: usize },

    #[error("Installment count {count} exceeds maximum {max}")]
    InstallmentCountExceeded { count: usize, max: u32 },

    #[error("New duration {requested} must exceed current duration {current}")]
    DurationNotIncreased { current: u32, requested: u64 },

    #[error("New interest rate {requested} must be below current rate {current}")]
    InterestRateNotDecreased { current: u32, requested: u32 },

    #[error("Timestamp {timestamp} precedes the time offset {offset}")]
    TimestampBeforeOffset { timestamp: u64, offset: u64 },

    #[error("Alias {account} is already configured as {is_alias} for lender {lender}")]
    AliasAlreadyConfigured {
        lender: AccountId,
        account: AccountId,
        is_alias: bool,
    },
}

/// Role and registration failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    #[error("Caller {caller} is not authorized for this operation")]
    Unauthorized { caller: AccountId },

    #[error("Credit line {0} is not registered")]
    CreditLineNotRegistered(AccountId),

    #[error("Liquidity pool {0} is not registered")]
    LiquidityPoolNotRegistered(AccountId),

    #[error("Credit line {0} is already registered")]
    CreditLineAlreadyRegistered(AccountId),

    #[error("Liquidity pool {0} is already registered")]
    LiquidityPoolAlreadyRegistered(AccountId),
}

/// Fixed-width capacity errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OverflowError {
    #[error("Loan id {requested} exceeds maximum {max}")]
    LoanId { requested: u64, max: u64 },

    #[error("Program id counter exhausted")]
    ProgramId,

    #[error("Duration {0} exceeds 32-bit capacity")]
    Duration(u64),

    #[error("Balance overflow during {0}")]
    Balance(&'static str),
}

/// Global pause switch errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PauseError {
    #[error("Market is paused")]
    Paused,

    #[error("Market is not paused")]
    NotPaused,
}

/// Failures raised by credit lines, liquidity pools and the token ledger
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("{collaborator} rejected the call: {reason}")]
    Rejected { collaborator: String, reason: String },

    #[error("Balance error: {0}")]
    Balance(#[from] BalanceError),

    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),
}

impl CollaboratorError {
    pub fn rejected(collaborator: impl Into<String>, reason: impl Into<String>) -> Self {
        CollaboratorError::Rejected {
            collaborator: collaborator.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for LendingError {
    fn from(err: serde_json::Error) -> Self {
        LendingError::Internal(format!("serialization failed: {}", err))
    }
}

impl From<anyhow::Error> for LendingError {
    fn from(err: anyhow::Error) -> Self {
        LendingError::Internal(err.to_string())
    }
}
