//! Installment loans
//!
//! One borrower-facing request becomes a run of sibling loans with
//! contiguous ids. Siblings accrue independently; revocation and previews
//! operate over the whole run.

use std::ops::Range;

use tracing::{info, instrument};

use lendmarket_common::{
    AccountId, ArgumentError, InstallmentLoanPreview, LendingError, LoanId, LoanState,
    LoanStateError, LoanType, OverflowError, ProgramId, Result,
};

use super::lifecycle::{closed, loan_taken_event, revocation_net, Settlement};
use super::{LendingMarket, TransferLog};
use crate::events::MarketEvent;

impl LendingMarket {
    /// Take a batch of sibling loans on behalf of `borrower`
    ///
    /// Individual amounts need not be rounded, only the totals; this lets
    /// rounding remainders be spread over the installments. Returns the id
    /// range of the new siblings.
    #[instrument(skip(self))]
    pub async fn take_installment_loan_for(
        &self,
        caller: &AccountId,
        borrower: &AccountId,
        program_id: ProgramId,
        borrow_amounts: &[u64],
        addon_amounts: &[u64],
        durations_in_periods: &[u32],
    ) -> Result<Range<LoanId>> {
        let mut book = self.book.write().await;
        book.ensure_not_paused()?;
        let context = self.resolve_program(program_id)?;
        self.ensure_lender_or_alias(&context.lender, caller)?;

        self.check_installment_shape(borrow_amounts, addon_amounts, durations_in_periods)?;
        let total_borrow_amount = checked_sum(borrow_amounts)?;
        let total_addon_amount = checked_sum(addon_amounts)?;
        self.check_rounded(total_borrow_amount)?;
        self.check_rounded(total_addon_amount)?;

        let installment_count = u32::try_from(borrow_amounts.len())
            .map_err(|_| OverflowError::Balance("installment count"))?;
        let now = self.now_adjusted()?;
        let first_installment_id = self.reserve_loan_ids(&book, u64::from(installment_count))?;

        // Terms are asked once for the whole batch, with its longest duration
        let longest = durations_in_periods.last().copied().unwrap_or_default();
        let terms = context
            .credit_line
            .determine_loan_terms(borrower.clone(), total_borrow_amount, longest)
            .await?;

        let mut loans = Vec::with_capacity(borrow_amounts.len());
        let rows = borrow_amounts
            .iter()
            .zip(addon_amounts)
            .zip(durations_in_periods)
            .enumerate();
        for (i, ((&borrow_amount, &addon_amount), &duration_in_periods)) in rows {
            let loan = LoanState {
                program_id,
                borrow_amount,
                addon_amount,
                start_timestamp: now,
                duration_in_periods,
                token: terms.token.clone(),
                borrower: borrower.clone(),
                interest_rate_primary: terms.interest_rate_primary,
                interest_rate_secondary: terms.interest_rate_secondary,
                tracked_balance: borrow_amount
                    .checked_add(addon_amount)
                    .ok_or(OverflowError::Balance("opening balance"))?,
                tracked_timestamp: now,
                first_installment_id,
                installment_count,
                ..Default::default()
            };
            loans.push((first_installment_id + i as LoanId, loan));
        }

        self.originate(&context, &loans, total_borrow_amount).await?;

        let mut events: Vec<MarketEvent> = loans
            .iter()
            .map(|(loan_id, loan)| loan_taken_event(*loan_id, loan))
            .collect();
        events.push(MarketEvent::InstallmentLoanTaken {
            first_installment_id,
            borrower: borrower.clone(),
            program_id,
            installment_count,
            total_borrow_amount,
            total_addon_amount,
        });
        book.loans.extend(loans.into_iter().map(|(_, loan)| loan));

        info!(
            first_installment_id,
            installment_count,
            total_borrow_amount,
            "Installment loan taken"
        );
        self.journal.record_all(events);
        Ok(first_installment_id..first_installment_id + u64::from(installment_count))
    }

    /// Revoke every open sibling of the installment loan containing `loan_id`
    #[instrument(skip(self))]
    pub async fn revoke_installment_loan(&self, caller: &AccountId, loan_id: LoanId) -> Result<()> {
        let mut book = self.book.write().await;
        book.ensure_not_paused()?;
        let loan = book.get(loan_id)?.clone();
        if loan.loan_type() != LoanType::Installment {
            return Err(LendingError::TypeMismatch {
                expected: LoanType::Installment,
                actual: loan.loan_type(),
            });
        }

        let siblings = loan.installment_range(loan_id);
        let mut open = Vec::new();
        for sibling_id in siblings.clone() {
            let sibling = book.get(sibling_id)?;
            if !sibling.is_closed() {
                open.push((sibling_id, sibling.clone()));
            }
        }
        if open.is_empty() {
            return Err(LoanStateError::AlreadyRepaid(loan_id).into());
        }

        let context = self.resolve_program(loan.program_id)?;
        let now = self.now_adjusted()?;
        self.authorize_revocation(&context, loan_id, &loan, caller, now)?;

        let net: i128 = open.iter().map(|(_, sibling)| revocation_net(sibling)).sum();
        let settlement = Settlement::from_net(net)?;
        let mut transfers = TransferLog::new(self.ledger.as_ref());
        let outcome = async {
            settlement
                .apply(&mut transfers, &context, &loan.token, &loan.borrower)
                .await?;
            for (sibling_id, _) in &open {
                context
                    .liquidity_pool
                    .on_after_loan_revocation(*sibling_id)
                    .await?;
                context
                    .credit_line
                    .on_after_loan_revocation(*sibling_id)
                    .await?;
            }
            Ok::<(), LendingError>(())
        }
        .await;
        transfers.settle(outcome).await?;

        let mut events: Vec<MarketEvent> = open
            .iter()
            .map(|(sibling_id, _)| MarketEvent::LoanRevoked {
                loan_id: *sibling_id,
            })
            .collect();
        events.push(MarketEvent::InstallmentLoanRevoked {
            first_installment_id: loan.first_installment_id,
            installment_count: loan.installment_count,
        });
        book.commit(
            open.into_iter()
                .map(|(sibling_id, sibling)| (sibling_id, closed(sibling, now))),
        );

        info!(
            first_installment_id = loan.first_installment_id,
            ?settlement,
            "Installment loan revoked"
        );
        self.journal.record_all(events);
        Ok(())
    }

    /// Aggregate preview of all siblings at a raw `timestamp`, `0` meaning now
    ///
    /// An ordinary loan previews as a run of one with `installment_count == 0`.
    pub async fn get_installment_loan_preview(
        &self,
        loan_id: LoanId,
        timestamp: u64,
    ) -> Result<InstallmentLoanPreview> {
        let at = self.query_timestamp(timestamp)?;
        let book = self.book.read().await;
        let loan = book.get(loan_id)?;
        let siblings = loan.installment_range(loan_id);

        let mut preview = InstallmentLoanPreview {
            first_installment_id: siblings.start,
            installment_count: loan.installment_count,
            period_index: self.periods.period_index(at),
            ..Default::default()
        };
        for sibling_id in siblings {
            let sibling = book.get(sibling_id)?;
            let single = self.preview(sibling, at)?;
            preview.total_tracked_balance =
                add(preview.total_tracked_balance, single.tracked_balance)?;
            preview.total_outstanding_balance =
                add(preview.total_outstanding_balance, single.outstanding_balance)?;
            preview.total_borrow_amount = add(preview.total_borrow_amount, sibling.borrow_amount)?;
            preview.total_addon_amount = add(preview.total_addon_amount, sibling.addon_amount)?;
            preview.total_repaid_amount = add(preview.total_repaid_amount, sibling.repaid_amount)?;
            preview.installment_previews.push(single);
        }
        Ok(preview)
    }

    fn check_installment_shape(
        &self,
        borrow_amounts: &[u64],
        addon_amounts: &[u64],
        durations_in_periods: &[u32],
    ) -> Result<()> {
        let count = borrow_amounts.len();
        if count == 0 {
            return Err(ArgumentError::EmptyInstallmentSet.into());
        }
        for other in [addon_amounts.len(), durations_in_periods.len()] {
            if other != count {
                return Err(ArgumentError::ArrayLengthMismatch {
                    left: count,
                    right: other,
                }
                .into());
            }
        }

        let max = self.config.installment_count_max;
        if count > max as usize {
            return Err(ArgumentError::InstallmentCountExceeded { count, max }.into());
        }
        if let Some(index) = durations_in_periods
            .windows(2)
            .position(|pair| pair[1] < pair[0])
        {
            return Err(ArgumentError::DurationSequenceNotAscending { index: index + 1 }.into());
        }
        if borrow_amounts.contains(&0) {
            return Err(ArgumentError::ZeroAmount.into());
        }
        Ok(())
    }
}

fn checked_sum(amounts: &[u64]) -> Result<u64> {
    amounts
        .iter()
        .try_fold(0u64, |total, &amount| total.checked_add(amount))
        .ok_or_else(|| OverflowError::Balance("installment total").into())
}

fn add(total: u64, amount: u64) -> Result<u64> {
    total
        .checked_add(amount)
        .ok_or_else(|| OverflowError::Balance("installment preview").into())
}
