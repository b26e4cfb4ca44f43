//! Loan records and their read-only projections
//!
//! A [`LoanState`] is the single mutable record the market keeps per loan.
//! All timestamps stored in it are already shifted by the market's negative
//! time offset. `tracked_balance == 0` is the authoritative closed signal.

use serde::{Deserialize, Serialize};
use std::ops::Range;

use super::account::AccountId;

/// Sequential loan identifier
pub type LoanId = u64;

/// Sequential program identifier, 0 is never assigned
pub type ProgramId = u32;

/// Ordinary loan or sub-loan of an installment batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanType {
    Ordinary,
    Installment,
}

impl std::fmt::Display for LoanType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoanType::Ordinary => write!(f, "ordinary"),
            LoanType::Installment => write!(f, "installment"),
        }
    }
}

/// Lifecycle status derived from a loan record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Active,
    Frozen,
    Closed,
}

/// Per-loan mutable record
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LoanState {
    /// Originating program
    pub program_id: ProgramId,

    /// Principal handed to the borrower
    pub borrow_amount: u64,

    /// One-time origination fee
    pub addon_amount: u64,

    /// Origination time (offset-adjusted seconds)
    pub start_timestamp: u64,

    /// Nominal term; the due period is start period + duration
    pub duration_in_periods: u32,

    /// Asset the loan is denominated in
    pub token: AccountId,

    /// Borrower of record
    pub borrower: AccountId,

    /// Per-period rate before the due period, scaled by the rate factor
    pub interest_rate_primary: u32,

    /// Per-period rate from the due period on, scaled by the rate factor
    pub interest_rate_secondary: u32,

    /// Cumulative repayments
    pub repaid_amount: u64,

    /// Checkpoint balance as of `tracked_timestamp`
    pub tracked_balance: u64,

    /// Last checkpoint (offset-adjusted seconds)
    pub tracked_timestamp: u64,

    /// Freeze instant (offset-adjusted seconds), 0 when not frozen
    pub freeze_timestamp: u64,

    /// First sibling id of an installment batch, 0 for ordinary loans
    pub first_installment_id: LoanId,

    /// Sibling count of an installment batch, 0 for ordinary loans
    pub installment_count: u32,
}

impl LoanState {
    pub fn loan_type(&self) -> LoanType {
        if self.installment_count > 0 {
            LoanType::Installment
        } else {
            LoanType::Ordinary
        }
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.tracked_balance == 0
    }

    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.freeze_timestamp != 0
    }

    pub fn status(&self) -> LoanStatus {
        if self.is_closed() {
            LoanStatus::Closed
        } else if self.is_frozen() {
            LoanStatus::Frozen
        } else {
            LoanStatus::Active
        }
    }

    /// Sibling id range; a single-element range for ordinary loans
    pub fn installment_range(&self, loan_id: LoanId) -> Range<LoanId> {
        match self.loan_type() {
            LoanType::Ordinary => loan_id..loan_id + 1,
            LoanType::Installment => {
                self.first_installment_id
                    ..self.first_installment_id + u64::from(self.installment_count)
            }
        }
    }

    /// Principal plus addon, the balance a loan starts with
    pub fn principal(&self) -> u64 {
        self.borrow_amount.saturating_add(self.addon_amount)
    }
}

/// Balances of a loan as seen at a query instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LoanPreview {
    /// Period the query instant falls into
    pub period_index: u64,

    /// Unrounded balance the loan would be checkpointed at
    pub tracked_balance: u64,

    /// Payable balance, rounded to the accuracy factor
    pub outstanding_balance: u64,
}

/// Aggregate preview over every sibling of an installment batch
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InstallmentLoanPreview {
    pub first_installment_id: LoanId,
    pub installment_count: u32,
    pub period_index: u64,
    pub total_tracked_balance: u64,
    pub total_outstanding_balance: u64,
    pub total_borrow_amount: u64,
    pub total_addon_amount: u64,
    pub total_repaid_amount: u64,
    pub installment_previews: Vec<LoanPreview>,
}

/// Terms a credit line assigns to a new loan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanTerms {
    pub token: AccountId,
    pub addon_amount: u64,
    pub duration_in_periods: u32,
    pub interest_rate_primary: u32,
    pub interest_rate_secondary: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_loan() -> LoanState {
        LoanState {
            program_id: 1,
            borrow_amount: 1_000_000,
            addon_amount: 20_000,
            token: AccountId::from("token"),
            borrower: AccountId::from("borrower"),
            tracked_balance: 1_020_000,
            ..Default::default()
        }
    }

    #[test]
    fn test_status_transitions() {
        let mut loan = open_loan();
        assert_eq!(loan.status(), LoanStatus::Active);

        loan.freeze_timestamp = 100;
        assert_eq!(loan.status(), LoanStatus::Frozen);

        loan.tracked_balance = 0;
        assert_eq!(loan.status(), LoanStatus::Closed);
    }

    #[test]
    fn test_installment_range() {
        let loan = open_loan();
        assert_eq!(loan.loan_type(), LoanType::Ordinary);
        assert_eq!(loan.installment_range(7), 7..8);

        let sibling = LoanState {
            first_installment_id: 5,
            installment_count: 3,
            ..open_loan()
        };
        assert_eq!(sibling.loan_type(), LoanType::Installment);
        assert_eq!(sibling.installment_range(6), 5..8);
    }

    #[test]
    fn test_principal() {
        assert_eq!(open_loan().principal(), 1_020_000);
    }
}
