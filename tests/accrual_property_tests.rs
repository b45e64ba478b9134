//! Property-based tests for accrual and carryover
use chrono::NaiveDate;
use leave_ledger::{
    accrual::{calculate_accrual_reference, carryover_leave_balance},
    ledger::{self, AdjustmentInput, AdjustmentSource},
    request::LeaveType,
    store::Store,
};
use proptest::prelude::*;
use tempfile::tempdir;

/// Strategy for a valid (join, current) month pair
fn month_pair_strategy() -> impl Strategy<Value = (i64, i64)> {
    (1i64..=12).prop_flat_map(|join| (Just(join), join..=12))
}

/// Strategy for a pair where at least one month is out of range or the
/// order is reversed
fn invalid_month_pair_strategy() -> impl Strategy<Value = (i64, i64)> {
    prop_oneof![
        (-5i64..=0, 1i64..=12),
        (13i64..=40, 1i64..=12),
        (1i64..=12, 13i64..=40),
        (2i64..=12).prop_flat_map(|join| (Just(join), 1..join)),
    ]
}

proptest! {
    /// Test the entitlement formula for every valid month pair
    #[test]
    fn entitlement_is_rounded_monthly_share(
        annual in 0i64..=200_000,
        (join, current) in month_pair_strategy(),
    ) {
        let reference = calculate_accrual_reference(annual, join, current);
        let months = current - join + 1;

        prop_assert!(reference.is_valid);
        prop_assert_eq!(reference.months_since_join as i64, months);
        prop_assert_eq!(
            reference.entitlement_minutes,
            (annual as f64 / 12.0 * months as f64).round() as i64
        );
        prop_assert!(reference.entitlement_minutes <= annual);
    }

    /// Test that bad month input never produces an entitlement
    #[test]
    fn invalid_months_yield_nothing(
        annual in 0i64..=200_000,
        (join, current) in invalid_month_pair_strategy(),
    ) {
        let reference = calculate_accrual_reference(annual, join, current);
        prop_assert!(!reference.is_valid);
        prop_assert_eq!(reference.months_since_join, 0);
        prop_assert_eq!(reference.entitlement_minutes, 0);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Test that carryover moves the source balance exactly once
    #[test]
    fn carryover_moves_balance_once(
        source in prop_oneof![-5_000i64..=-1, 1i64..=50_000],
        existing in 0i64..=5_000,
        from_year in 2020i32..=2029,
    ) {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("carryover.db")).unwrap();
        let join = NaiveDate::from_ymd_opt(2019, 6, 1);
        let to_year = from_year + 1;

        let seed = |year: i32, delta: i64| AdjustmentInput {
            user_id: "emp".into(),
            leave_type: LeaveType::Annual,
            year,
            delta_minutes: delta,
            reason: "seed".into(),
            reference: None,
            actor_uid: "admin".into(),
            source: AdjustmentSource::Admin,
        };
        ledger::apply_adjustment_with_log(&store, &seed(from_year, source)).unwrap();
        if existing != 0 {
            ledger::apply_adjustment_with_log(&store, &seed(to_year, existing)).unwrap();
        }

        let first = carryover_leave_balance(&store, "emp", LeaveType::Annual, from_year, to_year, "admin", join).unwrap();
        prop_assert!(first.carried);
        prop_assert_eq!(first.amount_minutes, source);
        prop_assert_eq!(first.new_balance_minutes, Some(existing + source));

        let second = carryover_leave_balance(&store, "emp", LeaveType::Annual, from_year, to_year, "admin", join).unwrap();
        prop_assert!(!second.carried);

        let target = ledger::current_balance(&store, "emp", LeaveType::Annual, to_year).unwrap();
        prop_assert_eq!(target, existing + source);
        prop_assert_eq!(ledger::recompute_balance(&store, "emp", LeaveType::Annual, to_year).unwrap(), target);
        // the source year is left as it was
        prop_assert_eq!(ledger::current_balance(&store, "emp", LeaveType::Annual, from_year).unwrap(), source);
    }
}
