//! Monthly repayment schedule with two freeze windows
//!
//! A one-billion loan at ~170% a year is repaid every 30 days for a year.
//! The loan is frozen for 15 and for 30 periods along the way, and one
//! repayment lands while it is frozen. Its second half runs past the
//! extended due period, so the secondary rate applies.

mod common;

use common::*;
use lendmarket_common::{LoanStatus, FULL_REPAYMENT_AMOUNT};
use lendmarket_engine::MarketEvent;

const PRINCIPAL: u64 = 1_000_000_000;
const INSTALLMENT: u64 = 90_000_000;

/// Day of each repayment and the unrounded balance due right before it
const REFERENCE: [(u64, u64); 12] = [
    (30, 1_085_061_982),
    (60, 1_079_703_927),
    (90, 1_073_890_105),
    (120, 1_024_882_001),
    (150, 1_014_404_917),
    (180, 1_003_036_631),
    (210, 975_092_428),
    (240, 930_356_171),
    (270, 975_989_726),
    (300, 1_028_988_541),
    (330, 1_090_541_369),
    (360, 1_162_028_828),
];

#[derive(Debug, Clone, Copy)]
enum Step {
    Repay,
    Freeze,
    Unfreeze,
}

fn schedule() -> Vec<(u64, Step)> {
    let mut steps: Vec<(u64, Step)> = REFERENCE
        .iter()
        .map(|&(day, _)| (day, Step::Repay))
        .collect();
    steps.extend([
        (95, Step::Freeze),
        (110, Step::Unfreeze),
        (200, Step::Freeze),
        (230, Step::Unfreeze),
    ]);
    steps.sort_by_key(|&(day, _)| day);
    steps
}

#[tokio::test]
async fn test_monthly_repayments_with_freezes() {
    let f = Fixture::new().await;
    let loan_id = f
        .market
        .take_loan_for(&lender(), &borrower(), PROGRAM, PRINCIPAL, 0, 180)
        .await
        .unwrap();
    f.ledger.mint(&usd(), &borrower(), 2 * PRINCIPAL).unwrap();
    let pool_before = f.balance(&pool_address()).await;

    let mut reference = REFERENCE.iter();
    let mut paid = 0u64;
    let mut last_repaid = 0u64;
    let mut last_tracked_timestamp = 0u64;

    for (day, step) in schedule() {
        f.at_day(day);
        match step {
            Step::Freeze => f.market.freeze(&lender(), loan_id).await.unwrap(),
            Step::Unfreeze => f.market.unfreeze(&lender(), loan_id).await.unwrap(),
            Step::Repay => {
                let &(reference_day, expected) = reference.next().unwrap();
                assert_eq!(reference_day, day);

                let preview = f.market.get_loan_preview(loan_id, 0).await.unwrap();
                let relative =
                    (preview.tracked_balance as f64 - expected as f64).abs() / expected as f64;
                assert!(
                    relative < 1e-7,
                    "day {}: balance {} vs reference {}",
                    day,
                    preview.tracked_balance,
                    expected
                );

                let amount = if day == 360 {
                    FULL_REPAYMENT_AMOUNT
                } else {
                    INSTALLMENT
                };
                f.market
                    .repay_loan(&borrower(), loan_id, amount)
                    .await
                    .unwrap();
                paid += if day == 360 {
                    preview.outstanding_balance
                } else {
                    INSTALLMENT
                };
            }
        }

        let loan = f.market.get_loan_state(loan_id).await.unwrap();
        assert!(loan.repaid_amount >= last_repaid);
        assert!(loan.tracked_timestamp >= last_tracked_timestamp);
        last_repaid = loan.repaid_amount;
        last_tracked_timestamp = loan.tracked_timestamp;
    }

    let loan = f.market.get_loan_state(loan_id).await.unwrap();
    assert_eq!(loan.status(), LoanStatus::Closed);
    assert_eq!(loan.duration_in_periods, 180 + 15 + 30);
    assert_eq!(loan.repaid_amount, paid);
    assert_eq!(paid, 11 * INSTALLMENT + 1_162_030_000);
    assert_eq!(f.balance(&pool_address()).await - pool_before, paid);

    let journal_total: u64 = f
        .events
        .events()
        .iter()
        .filter_map(|event| match event {
            MarketEvent::LoanRepayment {
                repayment_amount, ..
            } => Some(*repayment_amount),
            _ => None,
        })
        .sum();
    assert_eq!(journal_total, paid);
}

#[tokio::test]
async fn test_repayment_while_frozen_does_not_accrue() {
    let f = Fixture::new().await;
    let loan_id = f
        .market
        .take_loan_for(&lender(), &borrower(), PROGRAM, PRINCIPAL, 0, 180)
        .await
        .unwrap();

    f.at_day(30);
    f.market.freeze(&lender(), loan_id).await.unwrap();
    f.at_day(40);
    f.market
        .repay_loan(&borrower(), loan_id, INSTALLMENT)
        .await
        .unwrap();

    // The balance after repayment is the freeze-instant balance minus the payment
    let loan = f.market.get_loan_state(loan_id).await.unwrap();
    assert_eq!(loan.tracked_balance, 1_085_061_982 - INSTALLMENT);
    assert_eq!(loan.status(), LoanStatus::Frozen);

    f.at_day(60);
    f.market.unfreeze(&lender(), loan_id).await.unwrap();
    let loan = f.market.get_loan_state(loan_id).await.unwrap();
    assert_eq!(loan.tracked_balance, 1_085_061_982 - INSTALLMENT);
    assert_eq!(loan.duration_in_periods, 210);
    assert_eq!(loan.tracked_timestamp, f.now() - OFFSET);
}
