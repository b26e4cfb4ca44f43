//! Shared fixture for integration tests

#![allow(dead_code)]

use std::sync::{Arc, Once};

use lendmarket_common::{AccountId, LoanTerms};
use lendmarket_engine::{
    Clock, InMemoryLiquidityPool, InMemoryTokenLedger, LendingMarket, ManualClock, MarketConfig,
    MemoryEventSink, StaticCreditLine, TokenLedger,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub const DAY: u64 = 86_400;
pub const OFFSET: u64 = 10_800;
/// One hour into period 20_000
pub const START: u64 = 20_000 * DAY + OFFSET + 3_600;
pub const RATE_PRIMARY: u32 = 2_724_943;
pub const RATE_SECONDARY: u32 = 5_000_000;
pub const POOL_FUNDS: u64 = 1_000_000_000_000;
pub const PROGRAM: u32 = 1;

static TRACING: Once = Once::new();

/// Install a subscriber once per test binary; `RUST_LOG` controls output
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(tracing_subscriber::EnvFilter::new(
                std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
            ))
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();
    });
}

pub fn usd() -> AccountId {
    AccountId::from("usd")
}
pub fn owner() -> AccountId {
    AccountId::from("owner")
}
pub fn lender() -> AccountId {
    AccountId::from("lender")
}
pub fn borrower() -> AccountId {
    AccountId::from("borrower")
}
pub fn pool_address() -> AccountId {
    AccountId::from("pool")
}

pub struct Fixture {
    pub market: LendingMarket,
    pub clock: Arc<ManualClock>,
    pub ledger: Arc<InMemoryTokenLedger>,
    pub line: Arc<StaticCreditLine>,
    pub pool: Arc<InMemoryLiquidityPool>,
    pub events: MemoryEventSink,
}

impl Fixture {
    pub async fn new() -> Self {
        init_tracing();
        let clock = Arc::new(ManualClock::new(START));
        let ledger = Arc::new(InMemoryTokenLedger::new());
        let events = MemoryEventSink::new();
        let market = LendingMarket::new(MarketConfig::default(), owner(), ledger.clone())
            .unwrap()
            .with_clock(clock.clone())
            .with_event_sink(Arc::new(events.clone()));

        let line = Arc::new(StaticCreditLine::new(
            "line",
            "lender",
            LoanTerms {
                token: usd(),
                addon_amount: 0,
                duration_in_periods: 0,
                interest_rate_primary: RATE_PRIMARY,
                interest_rate_secondary: RATE_SECONDARY,
            },
        ));
        let pool = Arc::new(InMemoryLiquidityPool::new("pool", "lender"));
        market.register_credit_line(&lender(), line.clone()).await.unwrap();
        market.register_liquidity_pool(&lender(), pool.clone()).await.unwrap();
        market
            .create_program(&lender(), &AccountId::from("line"), &pool_address())
            .await
            .unwrap();
        ledger.mint(&usd(), &pool_address(), POOL_FUNDS).unwrap();

        Self {
            market,
            clock,
            ledger,
            line,
            pool,
            events,
        }
    }

    /// Move the clock to `days` after the fixture start
    pub fn at_day(&self, days: u64) {
        self.clock.set(START + days * DAY);
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    pub async fn balance(&self, account: &AccountId) -> u64 {
        self.ledger.balance_of(&usd(), account).await
    }
}
