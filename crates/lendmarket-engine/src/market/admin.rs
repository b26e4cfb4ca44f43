//! Pause switch and program administration

use std::sync::Arc;

use tracing::{info, instrument, warn};

use lendmarket_common::{AccountId, PauseError, ProgramId, Result};

use super::{unauthorized, LendingMarket};
use crate::collaborators::{CreditLine, LiquidityPool};
use crate::events::MarketEvent;

impl LendingMarket {
    /// Block every mutating operation
    #[instrument(skip(self))]
    pub async fn pause(&self, caller: &AccountId) -> Result<()> {
        self.ensure_owner(caller)?;
        let mut book = self.book.write().await;
        if book.paused {
            return Err(PauseError::Paused.into());
        }
        book.paused = true;

        info!(%caller, "Market paused");
        self.journal.record(MarketEvent::Paused {
            account: caller.clone(),
        });
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn unpause(&self, caller: &AccountId) -> Result<()> {
        self.ensure_owner(caller)?;
        let mut book = self.book.write().await;
        if !book.paused {
            return Err(PauseError::NotPaused.into());
        }
        book.paused = false;

        info!(%caller, "Market unpaused");
        self.journal.record(MarketEvent::Unpaused {
            account: caller.clone(),
        });
        Ok(())
    }

    #[instrument(skip(self, credit_line))]
    pub async fn register_credit_line(
        &self,
        caller: &AccountId,
        credit_line: Arc<dyn CreditLine>,
    ) -> Result<AccountId> {
        let book = self.book.read().await;
        book.ensure_not_paused()?;
        let address = self.registry.register_credit_line(caller, credit_line)?;

        info!(%caller, %address, "Credit line registered");
        self.journal.record(MarketEvent::CreditLineRegistered {
            lender: caller.clone(),
            credit_line: address.clone(),
        });
        Ok(address)
    }

    #[instrument(skip(self, liquidity_pool))]
    pub async fn register_liquidity_pool(
        &self,
        caller: &AccountId,
        liquidity_pool: Arc<dyn LiquidityPool>,
    ) -> Result<AccountId> {
        let book = self.book.read().await;
        book.ensure_not_paused()?;
        let address = self.registry.register_liquidity_pool(caller, liquidity_pool)?;

        info!(%caller, %address, "Liquidity pool registered");
        self.journal.record(MarketEvent::LiquidityPoolRegistered {
            lender: caller.clone(),
            liquidity_pool: address.clone(),
        });
        Ok(address)
    }

    #[instrument(skip(self))]
    pub async fn create_program(
        &self,
        caller: &AccountId,
        credit_line: &AccountId,
        liquidity_pool: &AccountId,
    ) -> Result<ProgramId> {
        let book = self.book.read().await;
        book.ensure_not_paused()?;
        let program_id = self
            .registry
            .create_program(caller, credit_line, liquidity_pool)?;

        info!(%caller, program_id, "Program created");
        self.journal.record(MarketEvent::ProgramCreated {
            lender: caller.clone(),
            program_id,
        });
        Ok(program_id)
    }

    #[instrument(skip(self))]
    pub async fn update_program(
        &self,
        caller: &AccountId,
        program_id: ProgramId,
        credit_line: &AccountId,
        liquidity_pool: &AccountId,
    ) -> Result<()> {
        let book = self.book.read().await;
        book.ensure_not_paused()?;
        self.registry
            .update_program(caller, program_id, credit_line, liquidity_pool)?;

        info!(%caller, program_id, "Program updated");
        self.journal.record(MarketEvent::ProgramUpdated {
            program_id,
            credit_line: credit_line.clone(),
            liquidity_pool: liquidity_pool.clone(),
        });
        Ok(())
    }

    /// Grant or withdraw delegated lender rights; `lender` is the caller
    #[instrument(skip(self))]
    pub async fn configure_alias(
        &self,
        lender: &AccountId,
        account: &AccountId,
        is_alias: bool,
    ) -> Result<()> {
        let book = self.book.read().await;
        book.ensure_not_paused()?;
        self.registry.configure_alias(lender, account, is_alias)?;

        info!(%lender, %account, is_alias, "Alias configured");
        self.journal.record(MarketEvent::AliasConfigured {
            lender: lender.clone(),
            account: account.clone(),
            is_alias,
        });
        Ok(())
    }

    fn ensure_owner(&self, caller: &AccountId) -> Result<()> {
        if *caller != self.owner {
            warn!(%caller, "Caller is not the market owner");
            return Err(unauthorized(caller));
        }
        Ok(())
    }
}
