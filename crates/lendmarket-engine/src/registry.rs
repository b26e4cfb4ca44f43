//! Program registry
//!
//! Maps programs to a (credit line, liquidity pool) pair and a lender, keeps
//! the lender of every registered collaborator, and the lender alias sets
//! used for delegated operations.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use lendmarket_common::{
    AccountId, ArgumentError, AuthorizationError, LendingError, NotFoundError, OverflowError,
    ProgramId, Result,
};

use crate::collaborators::{CreditLine, LiquidityPool};

/// Stored program record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub lender: AccountId,
    pub credit_line: AccountId,
    pub liquidity_pool: AccountId,
}

/// Program with its collaborators resolved
#[derive(Clone)]
pub struct ProgramContext {
    pub program_id: ProgramId,
    pub lender: AccountId,
    pub credit_line: Arc<dyn CreditLine>,
    pub liquidity_pool: Arc<dyn LiquidityPool>,
}

impl std::fmt::Debug for ProgramContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgramContext")
            .field("program_id", &self.program_id)
            .field("lender", &self.lender)
            .field("credit_line", &self.credit_line.address())
            .field("liquidity_pool", &self.liquidity_pool.address())
            .finish()
    }
}

struct Registered<T: ?Sized> {
    lender: AccountId,
    handle: Arc<T>,
}

#[derive(Default)]
struct RegistryState {
    credit_lines: HashMap<AccountId, Registered<dyn CreditLine>>,
    liquidity_pools: HashMap<AccountId, Registered<dyn LiquidityPool>>,
    programs: BTreeMap<ProgramId, Program>,
    program_counter: ProgramId,
    aliases: HashMap<AccountId, HashSet<AccountId>>,
}

/// Registry of programs, collaborators and lender aliases
///
/// Lookups take a shared lock; the lock is never held across an `.await`.
#[derive(Default)]
pub struct ProgramRegistry {
    state: RwLock<RegistryState>,
}

impl ProgramRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a credit line under its own lender; `caller` must be that lender
    pub fn register_credit_line(
        &self,
        caller: &AccountId,
        credit_line: Arc<dyn CreditLine>,
    ) -> Result<AccountId> {
        let address = credit_line.address();
        let lender = credit_line.lender();
        if lender != *caller {
            return Err(unauthorized(caller));
        }

        let mut state = self.state.write();
        if state.credit_lines.contains_key(&address) {
            return Err(AuthorizationError::CreditLineAlreadyRegistered(address).into());
        }
        state.credit_lines.insert(
            address.clone(),
            Registered {
                lender,
                handle: credit_line,
            },
        );
        Ok(address)
    }

    /// Register a liquidity pool under its own lender; `caller` must be that lender
    pub fn register_liquidity_pool(
        &self,
        caller: &AccountId,
        liquidity_pool: Arc<dyn LiquidityPool>,
    ) -> Result<AccountId> {
        let address = liquidity_pool.address();
        let lender = liquidity_pool.lender();
        if lender != *caller {
            return Err(unauthorized(caller));
        }

        let mut state = self.state.write();
        if state.liquidity_pools.contains_key(&address) {
            return Err(AuthorizationError::LiquidityPoolAlreadyRegistered(address).into());
        }
        state.liquidity_pools.insert(
            address.clone(),
            Registered {
                lender,
                handle: liquidity_pool,
            },
        );
        Ok(address)
    }

    /// Create a program owned by `caller`; ids start at 1
    pub fn create_program(
        &self,
        caller: &AccountId,
        credit_line: &AccountId,
        liquidity_pool: &AccountId,
    ) -> Result<ProgramId> {
        let mut state = self.state.write();
        check_collaborators(&state, caller, credit_line, liquidity_pool)?;

        let program_id = state
            .program_counter
            .checked_add(1)
            .ok_or(OverflowError::ProgramId)?;
        state.program_counter = program_id;
        state.programs.insert(
            program_id,
            Program {
                lender: caller.clone(),
                credit_line: credit_line.clone(),
                liquidity_pool: liquidity_pool.clone(),
            },
        );
        Ok(program_id)
    }

    /// Swap the collaborators of an existing program
    pub fn update_program(
        &self,
        caller: &AccountId,
        program_id: ProgramId,
        credit_line: &AccountId,
        liquidity_pool: &AccountId,
    ) -> Result<()> {
        let mut state = self.state.write();
        let lender = state
            .programs
            .get(&program_id)
            .map(|p| p.lender.clone())
            .ok_or(NotFoundError::Program(program_id))?;
        if lender != *caller {
            return Err(unauthorized(caller));
        }
        check_collaborators(&state, caller, credit_line, liquidity_pool)?;

        if let Some(program) = state.programs.get_mut(&program_id) {
            program.credit_line = credit_line.clone();
            program.liquidity_pool = liquidity_pool.clone();
        }
        Ok(())
    }

    /// Grant or withdraw delegated rights of `account` for `lender`
    pub fn configure_alias(
        &self,
        lender: &AccountId,
        account: &AccountId,
        is_alias: bool,
    ) -> Result<()> {
        let mut state = self.state.write();
        let set = state.aliases.entry(lender.clone()).or_default();
        let changed = if is_alias {
            set.insert(account.clone())
        } else {
            set.remove(account)
        };
        if !changed {
            return Err(ArgumentError::AliasAlreadyConfigured {
                lender: lender.clone(),
                account: account.clone(),
                is_alias,
            }
            .into());
        }
        Ok(())
    }

    pub fn has_alias(&self, lender: &AccountId, account: &AccountId) -> bool {
        self.state
            .read()
            .aliases
            .get(lender)
            .is_some_and(|set| set.contains(account))
    }

    pub fn is_lender_or_alias(&self, lender: &AccountId, caller: &AccountId) -> bool {
        lender == caller || self.has_alias(lender, caller)
    }

    pub fn program(&self, program_id: ProgramId) -> Option<Program> {
        self.state.read().programs.get(&program_id).cloned()
    }

    pub fn program_lender(&self, program_id: ProgramId) -> Option<AccountId> {
        self.program(program_id).map(|p| p.lender)
    }

    pub fn credit_line_lender(&self, credit_line: &AccountId) -> Option<AccountId> {
        self.state
            .read()
            .credit_lines
            .get(credit_line)
            .map(|r| r.lender.clone())
    }

    pub fn liquidity_pool_lender(&self, liquidity_pool: &AccountId) -> Option<AccountId> {
        self.state
            .read()
            .liquidity_pools
            .get(liquidity_pool)
            .map(|r| r.lender.clone())
    }

    pub fn program_counter(&self) -> ProgramId {
        self.state.read().program_counter
    }

    /// Resolve a program to live collaborator handles
    pub fn resolve(&self, program_id: ProgramId) -> Result<ProgramContext> {
        let state = self.state.read();
        let program = state
            .programs
            .get(&program_id)
            .ok_or(NotFoundError::Program(program_id))?;
        let credit_line = state
            .credit_lines
            .get(&program.credit_line)
            .ok_or_else(|| {
                AuthorizationError::CreditLineNotRegistered(program.credit_line.clone())
            })?;
        let liquidity_pool = state
            .liquidity_pools
            .get(&program.liquidity_pool)
            .ok_or_else(|| {
                AuthorizationError::LiquidityPoolNotRegistered(program.liquidity_pool.clone())
            })?;

        Ok(ProgramContext {
            program_id,
            lender: program.lender.clone(),
            credit_line: credit_line.handle.clone(),
            liquidity_pool: liquidity_pool.handle.clone(),
        })
    }
}

fn unauthorized(caller: &AccountId) -> LendingError {
    AuthorizationError::Unauthorized {
        caller: caller.clone(),
    }
    .into()
}

fn check_collaborators(
    state: &RegistryState,
    caller: &AccountId,
    credit_line: &AccountId,
    liquidity_pool: &AccountId,
) -> Result<()> {
    let line = state
        .credit_lines
        .get(credit_line)
        .ok_or_else(|| AuthorizationError::CreditLineNotRegistered(credit_line.clone()))?;
    if line.lender != *caller {
        return Err(unauthorized(caller));
    }
    let pool = state
        .liquidity_pools
        .get(liquidity_pool)
        .ok_or_else(|| AuthorizationError::LiquidityPoolNotRegistered(liquidity_pool.clone()))?;
    if pool.lender != *caller {
        return Err(unauthorized(caller));
    }
    Ok(())
}
