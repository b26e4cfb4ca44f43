//! Property tests for frozen loans

mod common;

use common::*;
use proptest::prelude::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn frozen_balance_stays_put(
        duration in 1u32..60,
        frozen_on in 0u64..90,
        held_for in 0u64..90,
    ) {
        let (at_freeze, later, extended) = runtime().block_on(async {
            let f = Fixture::new().await;
            let loan_id = f
                .market
                .take_loan_for(&lender(), &borrower(), PROGRAM, 1_000_000_000, 0, duration)
                .await
                .unwrap();

            f.at_day(frozen_on);
            f.market.freeze(&lender(), loan_id).await.unwrap();
            let at_freeze = f.market.get_loan_preview(loan_id, 0).await.unwrap();

            f.at_day(frozen_on + held_for);
            let later = f.market.get_loan_preview(loan_id, 0).await.unwrap();
            f.market.unfreeze(&lender(), loan_id).await.unwrap();
            let loan = f.market.get_loan_state(loan_id).await.unwrap();
            (at_freeze, later, loan.duration_in_periods)
        });

        prop_assert_eq!(at_freeze.tracked_balance, later.tracked_balance);
        prop_assert_eq!(at_freeze.outstanding_balance, later.outstanding_balance);
        prop_assert_eq!(u64::from(extended), u64::from(duration) + held_for);
    }
}
