//! Market event journal
//!
//! Every committed mutation produces one or more [`MarketEvent`]s. The
//! journal wraps them in an [`EventRecord`] and fans them out to sinks:
//! - [`TracingEventSink`]: structured log lines
//! - [`MemoryEventSink`]: in-process buffer for tests and replay

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use lendmarket_common::{AccountId, LoanId, ProgramId};

/// State change recorded by the market
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarketEvent {
    CreditLineRegistered {
        lender: AccountId,
        credit_line: AccountId,
    },
    LiquidityPoolRegistered {
        lender: AccountId,
        liquidity_pool: AccountId,
    },
    ProgramCreated {
        lender: AccountId,
        program_id: ProgramId,
    },
    ProgramUpdated {
        program_id: ProgramId,
        credit_line: AccountId,
        liquidity_pool: AccountId,
    },
    AliasConfigured {
        lender: AccountId,
        account: AccountId,
        is_alias: bool,
    },
    LoanTaken {
        loan_id: LoanId,
        borrower: AccountId,
        total_borrow_amount: u64,
        duration_in_periods: u32,
    },
    InstallmentLoanTaken {
        first_installment_id: LoanId,
        borrower: AccountId,
        program_id: ProgramId,
        installment_count: u32,
        total_borrow_amount: u64,
        total_addon_amount: u64,
    },
    LoanRepayment {
        loan_id: LoanId,
        repayer: AccountId,
        borrower: AccountId,
        repayment_amount: u64,
        tracked_balance: u64,
    },
    LoanFrozen {
        loan_id: LoanId,
        tracked_balance: u64,
    },
    LoanUnfrozen {
        loan_id: LoanId,
        tracked_balance: u64,
    },
    LoanDurationUpdated {
        loan_id: LoanId,
        new_duration: u32,
        old_duration: u32,
    },
    LoanInterestRatePrimaryUpdated {
        loan_id: LoanId,
        new_interest_rate: u32,
        old_interest_rate: u32,
    },
    LoanInterestRateSecondaryUpdated {
        loan_id: LoanId,
        new_interest_rate: u32,
        old_interest_rate: u32,
    },
    LoanRevoked {
        loan_id: LoanId,
    },
    InstallmentLoanRevoked {
        first_installment_id: LoanId,
        installment_count: u32,
    },
    Paused {
        account: AccountId,
    },
    Unpaused {
        account: AccountId,
    },
}

impl MarketEvent {
    /// Short event name used in log lines
    pub fn name(&self) -> &'static str {
        match self {
            MarketEvent::CreditLineRegistered { .. } => "credit_line_registered",
            MarketEvent::LiquidityPoolRegistered { .. } => "liquidity_pool_registered",
            MarketEvent::ProgramCreated { .. } => "program_created",
            MarketEvent::ProgramUpdated { .. } => "program_updated",
            MarketEvent::AliasConfigured { .. } => "alias_configured",
            MarketEvent::LoanTaken { .. } => "loan_taken",
            MarketEvent::InstallmentLoanTaken { .. } => "installment_loan_taken",
            MarketEvent::LoanRepayment { .. } => "loan_repayment",
            MarketEvent::LoanFrozen { .. } => "loan_frozen",
            MarketEvent::LoanUnfrozen { .. } => "loan_unfrozen",
            MarketEvent::LoanDurationUpdated { .. } => "loan_duration_updated",
            MarketEvent::LoanInterestRatePrimaryUpdated { .. } => {
                "loan_interest_rate_primary_updated"
            }
            MarketEvent::LoanInterestRateSecondaryUpdated { .. } => {
                "loan_interest_rate_secondary_updated"
            }
            MarketEvent::LoanRevoked { .. } => "loan_revoked",
            MarketEvent::InstallmentLoanRevoked { .. } => "installment_loan_revoked",
            MarketEvent::Paused { .. } => "paused",
            MarketEvent::Unpaused { .. } => "unpaused",
        }
    }

    /// Loan the event refers to, if any
    pub fn loan_id(&self) -> Option<LoanId> {
        match self {
            MarketEvent::LoanTaken { loan_id, .. }
            | MarketEvent::LoanRepayment { loan_id, .. }
            | MarketEvent::LoanFrozen { loan_id, .. }
            | MarketEvent::LoanUnfrozen { loan_id, .. }
            | MarketEvent::LoanDurationUpdated { loan_id, .. }
            | MarketEvent::LoanInterestRatePrimaryUpdated { loan_id, .. }
            | MarketEvent::LoanInterestRateSecondaryUpdated { loan_id, .. }
            | MarketEvent::LoanRevoked { loan_id } => Some(*loan_id),
            MarketEvent::InstallmentLoanTaken {
                first_installment_id,
                ..
            }
            | MarketEvent::InstallmentLoanRevoked {
                first_installment_id,
                ..
            } => Some(*first_installment_id),
            _ => None,
        }
    }
}

/// Journal entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unique event ID (UUID v7, time ordered)
    pub event_id: String,

    /// Recording time (Unix millis)
    pub recorded_at: i64,

    pub event: MarketEvent,
}

impl EventRecord {
    pub fn new(event: MarketEvent) -> Self {
        Self {
            event_id: uuid::Uuid::now_v7().to_string(),
            recorded_at: chrono::Utc::now().timestamp_millis(),
            event,
        }
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Event sink
pub trait EventSink: Send + Sync {
    /// Write one record
    fn write(&self, record: &EventRecord);

    /// Flush pending records
    fn flush(&self) {}
}

/// Emits every record as an `info` line
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn write(&self, record: &EventRecord) {
        info!(
            event_id = %record.event_id,
            event = record.event.name(),
            loan_id = ?record.event.loan_id(),
            payload = %record.to_json(),
            "Market event"
        );
    }
}

/// Keeps records in memory
#[derive(Default, Clone)]
pub struct MemoryEventSink {
    buffer: Arc<RwLock<Vec<EventRecord>>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<EventRecord> {
        self.buffer.read().clone()
    }

    pub fn events(&self) -> Vec<MarketEvent> {
        self.buffer.read().iter().map(|r| r.event.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.read().is_empty()
    }

    pub fn clear(&self) {
        self.buffer.write().clear();
    }
}

impl EventSink for MemoryEventSink {
    fn write(&self, record: &EventRecord) {
        self.buffer.write().push(record.clone());
    }
}

/// Fans committed events out to every sink
pub struct EventJournal {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl Default for EventJournal {
    fn default() -> Self {
        Self::new()
    }
}

impl EventJournal {
    /// Journal with a tracing sink
    pub fn new() -> Self {
        Self {
            sinks: vec![Arc::new(TracingEventSink)],
        }
    }

    /// Journal without any sink
    pub fn silent() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn add_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn record(&self, event: MarketEvent) {
        let record = EventRecord::new(event);
        for sink in &self.sinks {
            sink.write(&record);
        }
    }

    pub fn record_all(&self, events: impl IntoIterator<Item = MarketEvent>) {
        for event in events {
            self.record(event);
        }
    }

    pub fn flush(&self) {
        for sink in &self.sinks {
            sink.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_json_is_tagged() {
        let record = EventRecord::new(MarketEvent::LoanRevoked { loan_id: 9 });
        let json = record.to_json();
        assert!(json.contains("\"type\":\"loan_revoked\""));
        assert!(json.contains("\"loan_id\":9"));
        assert_eq!(uuid::Uuid::parse_str(&record.event_id).unwrap().get_version_num(), 7);
    }

    #[test]
    fn test_journal_fans_out() {
        let first = MemoryEventSink::new();
        let second = MemoryEventSink::new();
        let mut journal = EventJournal::silent();
        journal.add_sink(Arc::new(first.clone()));
        journal.add_sink(Arc::new(second.clone()));

        journal.record_all([
            MarketEvent::Paused {
                account: AccountId::from("owner"),
            },
            MarketEvent::Unpaused {
                account: AccountId::from("owner"),
            },
        ]);

        assert_eq!(first.len(), 2);
        assert_eq!(second.events(), first.events());
        assert_eq!(first.events()[1].name(), "unpaused");

        first.clear();
        assert!(first.is_empty());
        assert_eq!(second.len(), 2);
    }

    #[test]
    fn test_event_loan_id() {
        let event = MarketEvent::InstallmentLoanRevoked {
            first_installment_id: 4,
            installment_count: 3,
        };
        assert_eq!(event.loan_id(), Some(4));
        assert_eq!(
            MarketEvent::Paused {
                account: AccountId::from("x")
            }
            .loan_id(),
            None
        );
    }
}
