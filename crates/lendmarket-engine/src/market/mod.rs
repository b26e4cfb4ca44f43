//! Lending market
//!
//! Owns the loan book and drives every state transition. Mutating calls hold
//! the book's write guard for their whole duration, collaborator calls
//! included, so operations never interleave. Each operation works on staged
//! copies of the affected loans and commits them only once every
//! collaborator call has succeeded.

mod admin;
mod installment;
mod lifecycle;

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{error, warn};

use lendmarket_common::{
    AccountId, ArgumentError, AuthorizationError, LendingError, LoanId, LoanPreview, LoanState,
    LoanStateError, NotFoundError, OverflowError, PauseError, ProgramId, Result, LOAN_ID_MAX,
};

use crate::clock::{Clock, SystemClock};
use crate::collaborators::TokenLedger;
use crate::config::MarketConfig;
use crate::events::{EventJournal, EventSink};
use crate::interest::{Accrual, AccrualInput, InterestEngine};
use crate::period::PeriodModel;
use crate::registry::{ProgramContext, ProgramRegistry};

/// Loan records and the global pause switch
#[derive(Debug, Default)]
pub(crate) struct LoanBook {
    /// Indexed by loan id
    loans: Vec<LoanState>,
    paused: bool,
}

impl LoanBook {
    fn get(&self, loan_id: LoanId) -> Result<&LoanState> {
        usize::try_from(loan_id)
            .ok()
            .and_then(|index| self.loans.get(index))
            .ok_or_else(|| NotFoundError::Loan(loan_id).into())
    }

    fn ensure_not_paused(&self) -> Result<()> {
        if self.paused {
            return Err(PauseError::Paused.into());
        }
        Ok(())
    }

    /// Replace committed records with their staged versions
    fn commit(&mut self, staged: impl IntoIterator<Item = (LoanId, LoanState)>) {
        for (loan_id, loan) in staged {
            if let Some(slot) = usize::try_from(loan_id)
                .ok()
                .and_then(|index| self.loans.get_mut(index))
            {
                *slot = loan;
            }
        }
    }

    fn counter(&self) -> LoanId {
        self.loans.len() as LoanId
    }
}

/// Loan accrual engine and lifecycle manager
pub struct LendingMarket {
    config: MarketConfig,
    periods: PeriodModel,
    interest: InterestEngine,
    owner: AccountId,
    clock: Arc<dyn Clock>,
    ledger: Arc<dyn TokenLedger>,
    registry: ProgramRegistry,
    book: RwLock<LoanBook>,
    journal: EventJournal,
    loan_id_limit: LoanId,
}

impl LendingMarket {
    /// Create a market owned by `owner`, moving tokens through `ledger`
    pub fn new(
        config: MarketConfig,
        owner: impl Into<AccountId>,
        ledger: Arc<dyn TokenLedger>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            periods: PeriodModel::from_config(&config),
            interest: InterestEngine::new(config.interest_rate_factor, config.accuracy_factor),
            config,
            owner: owner.into(),
            clock: Arc::new(SystemClock),
            ledger,
            registry: ProgramRegistry::new(),
            book: RwLock::new(LoanBook::default()),
            journal: EventJournal::new(),
            loan_id_limit: LOAN_ID_MAX,
        })
    }

    /// Use a custom time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Add an event sink next to the default tracing sink
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.journal.add_sink(sink);
        self
    }

    #[cfg(test)]
    pub(crate) fn with_loan_id_limit(mut self, limit: LoanId) -> Self {
        self.loan_id_limit = limit;
        self
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    /// Stored record of a loan
    pub async fn get_loan_state(&self, loan_id: LoanId) -> Option<LoanState> {
        self.book.read().await.get(loan_id).ok().cloned()
    }

    pub async fn get_loan_state_batch(&self, loan_ids: &[LoanId]) -> Vec<Option<LoanState>> {
        let book = self.book.read().await;
        loan_ids
            .iter()
            .map(|&id| book.get(id).ok().cloned())
            .collect()
    }

    /// Balances of a loan at a raw `timestamp`, `0` meaning now
    pub async fn get_loan_preview(&self, loan_id: LoanId, timestamp: u64) -> Result<LoanPreview> {
        let at = self.query_timestamp(timestamp)?;
        let book = self.book.read().await;
        self.preview(book.get(loan_id)?, at)
    }

    pub async fn get_loan_preview_batch(
        &self,
        loan_ids: &[LoanId],
        timestamp: u64,
    ) -> Result<Vec<LoanPreview>> {
        let at = self.query_timestamp(timestamp)?;
        let book = self.book.read().await;
        loan_ids
            .iter()
            .map(|&id| self.preview(book.get(id)?, at))
            .collect()
    }

    // ------------------------------------------------------------------
    // Getters
    // ------------------------------------------------------------------

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    pub fn owner(&self) -> &AccountId {
        &self.owner
    }

    pub fn interest_rate_factor(&self) -> u64 {
        self.interest.interest_rate_factor()
    }

    pub fn accuracy_factor(&self) -> u64 {
        self.interest.accuracy_factor()
    }

    pub fn period_in_seconds(&self) -> u64 {
        self.periods.period_in_seconds()
    }

    /// Signed shift applied to raw timestamps, negative by construction
    pub fn time_offset(&self) -> i64 {
        i64::try_from(self.periods.negative_time_offset()).map_or(i64::MIN, |offset| -offset)
    }

    /// Number of loans ever taken, also the next loan id
    pub async fn loan_counter(&self) -> LoanId {
        self.book.read().await.counter()
    }

    pub fn program_counter(&self) -> ProgramId {
        self.registry.program_counter()
    }

    pub fn program_lender(&self, program_id: ProgramId) -> Option<AccountId> {
        self.registry.program_lender(program_id)
    }

    pub fn credit_line_lender(&self, credit_line: &AccountId) -> Option<AccountId> {
        self.registry.credit_line_lender(credit_line)
    }

    pub fn liquidity_pool_lender(&self, liquidity_pool: &AccountId) -> Option<AccountId> {
        self.registry.liquidity_pool_lender(liquidity_pool)
    }

    pub fn has_alias(&self, lender: &AccountId, account: &AccountId) -> bool {
        self.registry.has_alias(lender, account)
    }

    pub async fn is_paused(&self) -> bool {
        self.book.read().await.paused
    }

    // ------------------------------------------------------------------
    // Shared helpers
    // ------------------------------------------------------------------

    /// Current time in the offset-adjusted domain
    fn now_adjusted(&self) -> Result<u64> {
        Ok(self.periods.adjust(self.clock.now())?)
    }

    fn query_timestamp(&self, raw_timestamp: u64) -> Result<u64> {
        let raw = if raw_timestamp == 0 {
            self.clock.now()
        } else {
            raw_timestamp
        };
        Ok(self.periods.adjust(raw)?)
    }

    /// Compound a loan's checkpoint up to `at`, or up to its freeze instant
    fn accrue(&self, loan: &LoanState, at: u64) -> Result<Accrual> {
        let effective = if loan.is_frozen() {
            loan.freeze_timestamp
        } else {
            at
        };
        let accrual = self.interest.accrue(&AccrualInput {
            tracked_balance: loan.tracked_balance,
            tracked_period_index: self.periods.period_index(loan.tracked_timestamp),
            current_period_index: self.periods.period_index(effective),
            start_period_index: self.periods.period_index(loan.start_timestamp),
            duration_in_periods: loan.duration_in_periods,
            interest_rate_primary: loan.interest_rate_primary,
            interest_rate_secondary: loan.interest_rate_secondary,
        })?;
        Ok(accrual)
    }

    fn preview(&self, loan: &LoanState, at: u64) -> Result<LoanPreview> {
        let accrual = self.accrue(loan, at)?;
        Ok(LoanPreview {
            period_index: self.periods.period_index(at),
            tracked_balance: accrual.precise_balance,
            outstanding_balance: accrual.rounded_balance,
        })
    }

    fn ensure_lender_or_alias(&self, lender: &AccountId, caller: &AccountId) -> Result<()> {
        if !self.registry.is_lender_or_alias(lender, caller) {
            warn!(%caller, %lender, "Caller is neither lender nor alias");
            return Err(AuthorizationError::Unauthorized {
                caller: caller.clone(),
            }
            .into());
        }
        Ok(())
    }

    /// Lender-or-alias check against the program a loan belongs to
    fn ensure_loan_lender(&self, loan: &LoanState, caller: &AccountId) -> Result<()> {
        let lender = self
            .registry
            .program_lender(loan.program_id)
            .ok_or(NotFoundError::Program(loan.program_id))?;
        self.ensure_lender_or_alias(&lender, caller)
    }

    fn resolve_program(&self, program_id: ProgramId) -> Result<ProgramContext> {
        self.registry.resolve(program_id)
    }

    /// Borrow amounts must be nonzero, addons may be zero; both rounded
    fn check_origination_amounts(&self, borrow_amount: u64, addon_amount: u64) -> Result<()> {
        if borrow_amount == 0 {
            return Err(ArgumentError::ZeroAmount.into());
        }
        self.check_rounded(borrow_amount)?;
        self.check_rounded(addon_amount)
    }

    fn check_rounded(&self, amount: u64) -> Result<()> {
        if !self.interest.is_rounded(amount) {
            return Err(ArgumentError::UnroundedAmount {
                amount,
                accuracy_factor: self.interest.accuracy_factor(),
            }
            .into());
        }
        Ok(())
    }

    /// First id of a run of `count` fresh loans
    fn reserve_loan_ids(&self, book: &LoanBook, count: u64) -> Result<LoanId> {
        let first = book.counter();
        let last = first.saturating_add(count.saturating_sub(1));
        if last > self.loan_id_limit {
            return Err(OverflowError::LoanId {
                requested: last,
                max: self.loan_id_limit,
            }
            .into());
        }
        Ok(first)
    }
}

/// Transfers made by an in-flight operation
///
/// When the operation fails after some transfers went through, they are
/// reversed in opposite order before the error is returned.
pub(crate) struct TransferLog<'a> {
    ledger: &'a dyn TokenLedger,
    done: Vec<(AccountId, AccountId, AccountId, u64)>,
}

impl<'a> TransferLog<'a> {
    fn new(ledger: &'a dyn TokenLedger) -> Self {
        Self {
            ledger,
            done: Vec::new(),
        }
    }

    async fn transfer(
        &mut self,
        token: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: u64,
    ) -> Result<()> {
        // Nothing to move, e.g. settling a balance that rounds to zero
        if amount == 0 {
            return Ok(());
        }
        self.ledger.transfer(token, from, to, amount).await?;
        self.done.push((token.clone(), from.clone(), to.clone(), amount));
        Ok(())
    }

    /// Pass `outcome` through, reversing recorded transfers if it failed
    async fn settle(self, outcome: Result<()>) -> Result<()> {
        if outcome.is_err() {
            for (token, from, to, amount) in self.done.into_iter().rev() {
                if let Err(err) = self.ledger.transfer(&token, &to, &from, amount).await {
                    error!(%token, %from, %to, amount, %err, "Failed to reverse transfer");
                }
            }
        }
        outcome
    }
}

fn ensure_ongoing(loan_id: LoanId, loan: &LoanState) -> Result<()> {
    if loan.is_closed() {
        return Err(LoanStateError::AlreadyRepaid(loan_id).into());
    }
    Ok(())
}

fn unauthorized(caller: &AccountId) -> LendingError {
    AuthorizationError::Unauthorized {
        caller: caller.clone(),
    }
    .into()
}
