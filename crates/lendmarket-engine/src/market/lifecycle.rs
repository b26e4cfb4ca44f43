//! Ordinary loan lifecycle: take, repay, freeze, term updates, revoke

use std::collections::BTreeMap;

use tracing::{debug, info, instrument};

use lendmarket_common::{
    AccountId, ArgumentError, LendingError, LoanId, LoanState, LoanStateError, LoanType,
    OverflowError, ProgramId, Result, FULL_REPAYMENT_AMOUNT,
};

use super::{ensure_ongoing, unauthorized, LendingMarket, TransferLog};
use crate::events::MarketEvent;
use crate::registry::ProgramContext;

/// Token movement settling a revocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Settlement {
    /// Pool refunds the borrower
    ToBorrower(u64),
    /// Borrower covers the principal shortfall
    ToPool(u64),
    None,
}

impl Settlement {
    /// Net of repayments against principal, signed from the borrower's side
    pub(super) fn from_net(net: i128) -> Result<Self> {
        let amount = u64::try_from(net.unsigned_abs())
            .map_err(|_| OverflowError::Balance("revocation settlement"))?;
        Ok(match net.signum() {
            1 => Settlement::ToBorrower(amount),
            -1 => Settlement::ToPool(amount),
            _ => Settlement::None,
        })
    }

    /// Move the settlement between the borrower and the program's pool
    pub(super) async fn apply(
        self,
        transfers: &mut TransferLog<'_>,
        context: &ProgramContext,
        token: &AccountId,
        borrower: &AccountId,
    ) -> Result<()> {
        let pool = context.liquidity_pool.address();
        match self {
            Settlement::ToBorrower(amount) => {
                transfers.transfer(token, &pool, borrower, amount).await
            }
            Settlement::ToPool(amount) => {
                transfers.transfer(token, borrower, &pool, amount).await
            }
            Settlement::None => Ok(()),
        }
    }
}

/// Repaid amount minus borrowed principal; the addon is not refunded
pub(super) fn revocation_net(loan: &LoanState) -> i128 {
    i128::from(loan.repaid_amount) - i128::from(loan.borrow_amount)
}

impl LendingMarket {
    /// Borrower-initiated loan; addon and duration come from the credit line
    #[instrument(skip(self))]
    pub async fn take_loan(
        &self,
        borrower: &AccountId,
        program_id: ProgramId,
        borrow_amount: u64,
        duration_in_periods: u32,
    ) -> Result<LoanId> {
        let mut book = self.book.write().await;
        book.ensure_not_paused()?;
        let context = self.resolve_program(program_id)?;
        self.check_origination_amounts(borrow_amount, 0)?;
        let now = self.now_adjusted()?;

        let terms = context
            .credit_line
            .determine_loan_terms(borrower.clone(), borrow_amount, duration_in_periods)
            .await?;
        self.check_rounded(terms.addon_amount)?;

        let loan = LoanState {
            program_id,
            borrow_amount,
            addon_amount: terms.addon_amount,
            start_timestamp: now,
            duration_in_periods: terms.duration_in_periods,
            token: terms.token,
            borrower: borrower.clone(),
            interest_rate_primary: terms.interest_rate_primary,
            interest_rate_secondary: terms.interest_rate_secondary,
            tracked_balance: opening_balance(borrow_amount, terms.addon_amount)?,
            tracked_timestamp: now,
            ..Default::default()
        };

        let loan_id = self.reserve_loan_ids(&book, 1)?;
        self.originate(&context, &[(loan_id, loan.clone())], borrow_amount)
            .await?;
        book.loans.push(loan.clone());

        info!(loan_id, %borrower, program_id, "Loan taken");
        self.journal.record(loan_taken_event(loan_id, &loan));
        Ok(loan_id)
    }

    /// Lender-initiated loan with explicit addon and duration
    #[instrument(skip(self))]
    pub async fn take_loan_for(
        &self,
        caller: &AccountId,
        borrower: &AccountId,
        program_id: ProgramId,
        borrow_amount: u64,
        addon_amount: u64,
        duration_in_periods: u32,
    ) -> Result<LoanId> {
        let mut book = self.book.write().await;
        book.ensure_not_paused()?;
        let context = self.resolve_program(program_id)?;
        self.ensure_lender_or_alias(&context.lender, caller)?;
        self.check_origination_amounts(borrow_amount, addon_amount)?;
        let tracked_balance = opening_balance(borrow_amount, addon_amount)?;
        let now = self.now_adjusted()?;
        let loan_id = self.reserve_loan_ids(&book, 1)?;

        let terms = context
            .credit_line
            .determine_loan_terms(borrower.clone(), borrow_amount, duration_in_periods)
            .await?;

        let loan = LoanState {
            program_id,
            borrow_amount,
            addon_amount,
            start_timestamp: now,
            duration_in_periods,
            token: terms.token,
            borrower: borrower.clone(),
            interest_rate_primary: terms.interest_rate_primary,
            interest_rate_secondary: terms.interest_rate_secondary,
            tracked_balance,
            tracked_timestamp: now,
            ..Default::default()
        };

        self.originate(&context, &[(loan_id, loan.clone())], borrow_amount)
            .await?;
        book.loans.push(loan.clone());

        info!(loan_id, %borrower, program_id, "Loan taken for borrower");
        self.journal.record(loan_taken_event(loan_id, &loan));
        Ok(loan_id)
    }

    /// Run the pre-loan hooks for every new record, then fund the borrower
    pub(super) async fn originate(
        &self,
        context: &ProgramContext,
        loans: &[(LoanId, LoanState)],
        total_borrow_amount: u64,
    ) -> Result<()> {
        for (loan_id, loan) in loans {
            context
                .credit_line
                .on_before_loan_taken(*loan_id, loan.clone())
                .await?;
            context
                .liquidity_pool
                .on_before_loan_taken(*loan_id, loan.clone())
                .await?;
        }

        let Some((_, first)) = loans.first() else {
            return Ok(());
        };
        let mut transfers = TransferLog::new(self.ledger.as_ref());
        let outcome = transfers
            .transfer(
                &first.token,
                &context.liquidity_pool.address(),
                &first.borrower,
                total_borrow_amount,
            )
            .await;
        transfers.settle(outcome).await
    }

    /// Repay `amount` of a loan, or everything with [`FULL_REPAYMENT_AMOUNT`]
    ///
    /// Anyone may repay. When the program's liquidity pool is the caller the
    /// tokens are pulled from the borrower, otherwise from the caller.
    #[instrument(skip(self))]
    pub async fn repay_loan(&self, caller: &AccountId, loan_id: LoanId, amount: u64) -> Result<()> {
        let mut book = self.book.write().await;
        book.ensure_not_paused()?;
        let loan = book.get(loan_id)?.clone();
        ensure_ongoing(loan_id, &loan)?;
        self.check_repayment_amount(amount)?;

        let context = self.resolve_program(loan.program_id)?;
        let pool = context.liquidity_pool.address();
        let payer = if *caller == pool {
            loan.borrower.clone()
        } else {
            caller.clone()
        };

        let now = self.now_adjusted()?;
        let (repaid, updated) = self.settle_repayment(loan_id, &loan, amount, now)?;

        let mut transfers = TransferLog::new(self.ledger.as_ref());
        let outcome = async {
            transfers.transfer(&loan.token, &payer, &pool, repaid).await?;
            context
                .liquidity_pool
                .on_after_loan_payment(loan_id, repaid)
                .await?;
            Ok::<(), LendingError>(())
        }
        .await;
        transfers.settle(outcome).await?;

        let event = repayment_event(loan_id, caller, &updated, repaid);
        book.commit([(loan_id, updated)]);

        info!(loan_id, %payer, repaid, "Loan repaid");
        self.journal.record(event);
        Ok(())
    }

    /// Lender repays several loans with tokens from `payer`
    #[instrument(skip(self))]
    pub async fn repay_loan_for_batch(
        &self,
        caller: &AccountId,
        loan_ids: &[LoanId],
        amounts: &[u64],
        payer: &AccountId,
    ) -> Result<()> {
        if loan_ids.len() != amounts.len() {
            return Err(ArgumentError::ArrayLengthMismatch {
                left: loan_ids.len(),
                right: amounts.len(),
            }
            .into());
        }
        if loan_ids.is_empty() {
            return Err(ArgumentError::EmptyBatch.into());
        }

        let mut book = self.book.write().await;
        book.ensure_not_paused()?;
        let now = self.now_adjusted()?;

        let mut staged: BTreeMap<LoanId, LoanState> = BTreeMap::new();
        let mut payments = Vec::with_capacity(loan_ids.len());
        let mut events = Vec::with_capacity(loan_ids.len());

        for (&loan_id, &amount) in loan_ids.iter().zip(amounts) {
            // Later entries see the effect of earlier ones on the same loan
            let loan = match staged.get(&loan_id) {
                Some(loan) => loan.clone(),
                None => book.get(loan_id)?.clone(),
            };
            ensure_ongoing(loan_id, &loan)?;
            self.check_repayment_amount(amount)?;

            let context = self.resolve_program(loan.program_id)?;
            self.ensure_lender_or_alias(&context.lender, caller)?;

            let (repaid, updated) = self.settle_repayment(loan_id, &loan, amount, now)?;
            events.push(repayment_event(loan_id, caller, &updated, repaid));
            payments.push((loan_id, loan.token.clone(), context, repaid));
            staged.insert(loan_id, updated);
        }

        let mut transfers = TransferLog::new(self.ledger.as_ref());
        let outcome = async {
            for (loan_id, token, context, repaid) in &payments {
                transfers
                    .transfer(token, payer, &context.liquidity_pool.address(), *repaid)
                    .await?;
                context
                    .liquidity_pool
                    .on_after_loan_payment(*loan_id, *repaid)
                    .await?;
            }
            Ok::<(), LendingError>(())
        }
        .await;
        transfers.settle(outcome).await?;

        book.commit(staged);

        info!(count = loan_ids.len(), %payer, "Loan batch repaid");
        self.journal.record_all(events);
        Ok(())
    }

    /// Stop accrual at the current instant
    #[instrument(skip(self))]
    pub async fn freeze(&self, caller: &AccountId, loan_id: LoanId) -> Result<()> {
        let mut book = self.book.write().await;
        book.ensure_not_paused()?;
        let loan = book.get(loan_id)?.clone();
        ensure_ongoing(loan_id, &loan)?;
        self.ensure_loan_lender(&loan, caller)?;
        if loan.is_frozen() {
            return Err(LoanStateError::AlreadyFrozen(loan_id).into());
        }

        let now = self.now_adjusted()?;
        let accrual = self.accrue(&loan, now)?;
        let updated = LoanState {
            freeze_timestamp: now,
            ..loan
        };
        book.commit([(loan_id, updated)]);

        info!(loan_id, "Loan frozen");
        self.journal.record(MarketEvent::LoanFrozen {
            loan_id,
            tracked_balance: accrual.precise_balance,
        });
        Ok(())
    }

    /// Resume accrual; frozen periods extend the duration and accrue nothing
    #[instrument(skip(self))]
    pub async fn unfreeze(&self, caller: &AccountId, loan_id: LoanId) -> Result<()> {
        let mut book = self.book.write().await;
        book.ensure_not_paused()?;
        let loan = book.get(loan_id)?.clone();
        ensure_ongoing(loan_id, &loan)?;
        self.ensure_loan_lender(&loan, caller)?;
        if !loan.is_frozen() {
            return Err(LoanStateError::NotFrozen(loan_id).into());
        }

        let now = self.now_adjusted()?;
        // Accrual of a frozen loan stops at its freeze instant
        let accrual = self.accrue(&loan, now)?;
        let frozen_periods = self.periods.periods_between(loan.freeze_timestamp, now);
        let extended = u64::from(loan.duration_in_periods).saturating_add(frozen_periods);
        let duration_in_periods =
            u32::try_from(extended).map_err(|_| OverflowError::Duration(extended))?;

        let updated = LoanState {
            tracked_balance: accrual.precise_balance,
            tracked_timestamp: now,
            freeze_timestamp: 0,
            duration_in_periods,
            ..loan
        };
        book.commit([(loan_id, updated)]);

        debug!(loan_id, frozen_periods, duration_in_periods, "Duration extended");
        info!(loan_id, "Loan unfrozen");
        self.journal.record(MarketEvent::LoanUnfrozen {
            loan_id,
            tracked_balance: accrual.precise_balance,
        });
        Ok(())
    }

    /// Extend the loan term; shorter or equal terms are rejected
    #[instrument(skip(self))]
    pub async fn update_loan_duration(
        &self,
        caller: &AccountId,
        loan_id: LoanId,
        new_duration_in_periods: u64,
    ) -> Result<()> {
        let mut book = self.book.write().await;
        book.ensure_not_paused()?;
        let loan = book.get(loan_id)?.clone();
        ensure_ongoing(loan_id, &loan)?;
        self.ensure_loan_lender(&loan, caller)?;

        let new_duration = u32::try_from(new_duration_in_periods)
            .map_err(|_| OverflowError::Duration(new_duration_in_periods))?;
        if new_duration <= loan.duration_in_periods {
            return Err(ArgumentError::DurationNotIncreased {
                current: loan.duration_in_periods,
                requested: new_duration_in_periods,
            }
            .into());
        }

        let old_duration = loan.duration_in_periods;
        book.commit([(
            loan_id,
            LoanState {
                duration_in_periods: new_duration,
                ..loan
            },
        )]);

        info!(loan_id, old_duration, new_duration, "Loan duration updated");
        self.journal.record(MarketEvent::LoanDurationUpdated {
            loan_id,
            new_duration,
            old_duration,
        });
        Ok(())
    }

    /// Lower the rate charged before the due period
    #[instrument(skip(self))]
    pub async fn update_loan_interest_rate_primary(
        &self,
        caller: &AccountId,
        loan_id: LoanId,
        new_interest_rate: u32,
    ) -> Result<()> {
        let mut book = self.book.write().await;
        book.ensure_not_paused()?;
        let loan = book.get(loan_id)?.clone();
        ensure_ongoing(loan_id, &loan)?;
        self.ensure_loan_lender(&loan, caller)?;
        ensure_rate_decreased(loan.interest_rate_primary, new_interest_rate)?;

        let old_interest_rate = loan.interest_rate_primary;
        book.commit([(
            loan_id,
            LoanState {
                interest_rate_primary: new_interest_rate,
                ..loan
            },
        )]);

        info!(loan_id, old_interest_rate, new_interest_rate, "Primary rate updated");
        self.journal.record(MarketEvent::LoanInterestRatePrimaryUpdated {
            loan_id,
            new_interest_rate,
            old_interest_rate,
        });
        Ok(())
    }

    /// Lower the rate charged from the due period on
    #[instrument(skip(self))]
    pub async fn update_loan_interest_rate_secondary(
        &self,
        caller: &AccountId,
        loan_id: LoanId,
        new_interest_rate: u32,
    ) -> Result<()> {
        let mut book = self.book.write().await;
        book.ensure_not_paused()?;
        let loan = book.get(loan_id)?.clone();
        ensure_ongoing(loan_id, &loan)?;
        self.ensure_loan_lender(&loan, caller)?;
        ensure_rate_decreased(loan.interest_rate_secondary, new_interest_rate)?;

        let old_interest_rate = loan.interest_rate_secondary;
        book.commit([(
            loan_id,
            LoanState {
                interest_rate_secondary: new_interest_rate,
                ..loan
            },
        )]);

        info!(loan_id, old_interest_rate, new_interest_rate, "Secondary rate updated");
        self.journal.record(MarketEvent::LoanInterestRateSecondaryUpdated {
            loan_id,
            new_interest_rate,
            old_interest_rate,
        });
        Ok(())
    }

    /// Cancel an ordinary loan and settle principal against repayments
    #[instrument(skip(self))]
    pub async fn revoke_loan(&self, caller: &AccountId, loan_id: LoanId) -> Result<()> {
        let mut book = self.book.write().await;
        book.ensure_not_paused()?;
        let loan = book.get(loan_id)?.clone();
        if loan.loan_type() != LoanType::Ordinary {
            return Err(LendingError::TypeMismatch {
                expected: LoanType::Ordinary,
                actual: loan.loan_type(),
            });
        }
        ensure_ongoing(loan_id, &loan)?;

        let context = self.resolve_program(loan.program_id)?;
        let now = self.now_adjusted()?;
        self.authorize_revocation(&context, loan_id, &loan, caller, now)?;

        let settlement = Settlement::from_net(revocation_net(&loan))?;
        let mut transfers = TransferLog::new(self.ledger.as_ref());
        let outcome = async {
            settlement
                .apply(&mut transfers, &context, &loan.token, &loan.borrower)
                .await?;
            context
                .liquidity_pool
                .on_after_loan_revocation(loan_id)
                .await?;
            context
                .credit_line
                .on_after_loan_revocation(loan_id)
                .await?;
            Ok::<(), LendingError>(())
        }
        .await;
        transfers.settle(outcome).await?;

        book.commit([(loan_id, closed(loan, now))]);

        info!(loan_id, ?settlement, "Loan revoked");
        self.journal.record(MarketEvent::LoanRevoked { loan_id });
        Ok(())
    }

    /// Lender or alias at any time, the borrower only within the cooldown
    pub(super) fn authorize_revocation(
        &self,
        context: &ProgramContext,
        loan_id: LoanId,
        loan: &LoanState,
        caller: &AccountId,
        now: u64,
    ) -> Result<()> {
        if self.registry.is_lender_or_alias(&context.lender, caller) {
            return Ok(());
        }
        if *caller != loan.borrower {
            return Err(unauthorized(caller));
        }

        let elapsed_periods = self.periods.periods_between(loan.start_timestamp, now);
        let cooldown_periods = self.config.cooldown_in_periods;
        if elapsed_periods >= u64::from(cooldown_periods) {
            return Err(LoanStateError::CooldownPeriodPassed {
                loan_id,
                elapsed_periods,
                cooldown_periods,
            }
            .into());
        }
        Ok(())
    }

    fn check_repayment_amount(&self, amount: u64) -> Result<()> {
        if amount == 0 {
            return Err(ArgumentError::ZeroAmount.into());
        }
        if amount != FULL_REPAYMENT_AMOUNT {
            self.check_rounded(amount)?;
        }
        Ok(())
    }

    /// Apply a repayment to a freshly accrued balance
    ///
    /// Returns the amount actually repaid and the updated record. Paying the
    /// rounded outstanding balance closes the loan, anything below it is
    /// taken off the unrounded balance.
    fn settle_repayment(
        &self,
        loan_id: LoanId,
        loan: &LoanState,
        amount: u64,
        now: u64,
    ) -> Result<(u64, LoanState)> {
        let accrual = self.accrue(loan, now)?;
        let outstanding = accrual.rounded_balance;

        let (repaid, tracked_balance) = if amount == FULL_REPAYMENT_AMOUNT || amount == outstanding
        {
            (outstanding, 0)
        } else if amount > outstanding {
            return Err(ArgumentError::RepaymentExceedsOutstanding {
                amount,
                outstanding,
            }
            .into());
        } else {
            let remaining = accrual.precise_balance.checked_sub(amount).ok_or(
                ArgumentError::RepaymentExceedsOutstanding {
                    amount,
                    outstanding,
                },
            )?;
            (amount, remaining)
        };

        let repaid_amount = loan
            .repaid_amount
            .checked_add(repaid)
            .ok_or(OverflowError::Balance("repaid amount"))?;

        debug!(loan_id, outstanding, repaid, tracked_balance, "Repayment settled");
        Ok((
            repaid,
            LoanState {
                repaid_amount,
                tracked_balance,
                tracked_timestamp: now,
                ..loan.clone()
            },
        ))
    }
}

fn opening_balance(borrow_amount: u64, addon_amount: u64) -> Result<u64> {
    Ok(borrow_amount
        .checked_add(addon_amount)
        .ok_or(OverflowError::Balance("opening balance"))?)
}

fn ensure_rate_decreased(current: u32, requested: u32) -> Result<()> {
    if requested >= current {
        return Err(ArgumentError::InterestRateNotDecreased { current, requested }.into());
    }
    Ok(())
}

/// Terminal record of a revoked loan
pub(super) fn closed(loan: LoanState, now: u64) -> LoanState {
    LoanState {
        tracked_balance: 0,
        tracked_timestamp: now,
        ..loan
    }
}

pub(super) fn loan_taken_event(loan_id: LoanId, loan: &LoanState) -> MarketEvent {
    MarketEvent::LoanTaken {
        loan_id,
        borrower: loan.borrower.clone(),
        total_borrow_amount: loan.principal(),
        duration_in_periods: loan.duration_in_periods,
    }
}

fn repayment_event(
    loan_id: LoanId,
    repayer: &AccountId,
    updated: &LoanState,
    repaid: u64,
) -> MarketEvent {
    MarketEvent::LoanRepayment {
        loan_id,
        repayer: repayer.clone(),
        borrower: updated.borrower.clone(),
        repayment_amount: repaid,
        tracked_balance: updated.tracked_balance,
    }
}
