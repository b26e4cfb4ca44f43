//! # Lendmarket Engine
//!
//! Loan lifecycle and compounding interest accrual for a lending market.
//!
//! ## Accrual Formula
//!
//! ```text
//! balance = tracked × (1 + r₁/F)^n₁ × (1 + r₂/F)^n₂
//! ```
//!
//! Where:
//! - n₁: periods elapsed before the due period (primary rate r₁)
//! - n₂: periods elapsed from the due period on (secondary rate r₂)
//! - F: interest rate factor
//!
//! The payable balance is the compounded value rounded half-up to the
//! accuracy factor; the unrounded value is kept as the next checkpoint.
//!
//! ## Components
//!
//! - [`period`]: timestamps to period indices under a negative time offset
//! - [`interest`]: compounding and rounding
//! - [`registry`]: programs, collaborator registration, lender aliases
//! - [`market`]: loan book, lifecycle transitions, installment loans
//! - [`collaborators`]: credit line, liquidity pool and token ledger traits
//! - [`memory`]: in-memory collaborators
//! - [`events`]: event journal and sinks

pub mod clock;
pub mod collaborators;
pub mod config;
pub mod events;
pub mod interest;
pub mod market;
pub mod memory;
pub mod period;
pub mod registry;

pub use clock::{Clock, ManualClock, SystemClock};
pub use collaborators::{CollaboratorResult, CreditLine, LiquidityPool, TokenLedger};
pub use config::MarketConfig;
pub use events::{
    EventJournal, EventRecord, EventSink, MarketEvent, MemoryEventSink, TracingEventSink,
};
pub use interest::{
    calculate_outstanding_balance, round_half_up, Accrual, AccrualInput, InterestEngine,
};
pub use market::LendingMarket;
pub use memory::{HookCall, InMemoryLiquidityPool, InMemoryTokenLedger, StaticCreditLine};
pub use period::{calculate_period_index, PeriodModel};
pub use registry::{Program, ProgramContext, ProgramRegistry};
