//! Token account - per-owner balance of one fungible asset
//!
//! Backs the in-memory token ledger. Key characteristics:
//! - Balances are whole token units (`u64`)
//! - Debits never go negative

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::account::AccountId;

/// Balance operation errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BalanceError {
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: u64, available: u64 },

    #[error("Amount must be positive")]
    InvalidAmount,

    #[error("Balance overflow")]
    Overflow,
}

/// Balance of one owner in one token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenAccount {
    /// Account holder
    pub owner: AccountId,

    /// Asset identifier
    pub token: AccountId,

    /// Spendable balance
    pub balance: u64,

    /// Timestamp of last modification (Unix milliseconds)
    pub updated_at: i64,
}

impl TokenAccount {
    /// Create a new empty account
    pub fn new(owner: AccountId, token: AccountId) -> Self {
        Self {
            owner,
            token,
            balance: 0,
            updated_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Create an account with initial balance
    pub fn with_balance(owner: AccountId, token: AccountId, balance: u64) -> Self {
        let mut account = Self::new(owner, token);
        account.balance = balance;
        account
    }

    /// Add tokens to the account
    pub fn credit(&mut self, amount: u64) -> Result<(), BalanceError> {
        if amount == 0 {
            return Err(BalanceError::InvalidAmount);
        }

        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or(BalanceError::Overflow)?;
        self.touch();
        Ok(())
    }

    /// Remove tokens from the account
    pub fn debit(&mut self, amount: u64) -> Result<(), BalanceError> {
        if amount == 0 {
            return Err(BalanceError::InvalidAmount);
        }

        if self.balance < amount {
            return Err(BalanceError::InsufficientBalance {
                required: amount,
                available: self.balance,
            });
        }

        self.balance -= amount;
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().timestamp_millis();
    }
}

impl std::fmt::Display for TokenAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "TokenAccount(owner={}, token={}, balance={})",
            self.owner, self.token, self.balance
        )
    }
}
