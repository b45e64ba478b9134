//! Monthly accrual and year-end carryover.
//!
//! Accrual is a pure calculation used to seed or check balances. Carryover
//! moves the full closing balance of one year into the next through the
//! ledger, once per year pair.
use chrono::NaiveDate;
use sled::Transactional;
use sled::transaction::ConflictableTransactionResult;

use super::error::{LeaveError, Result};
use super::ledger::{AdjustmentInput, AdjustmentSource, CarryoverMarker, LeaveBalance, stage_adjustment};
use super::request::{LeaveType, TimeStamp};
use super::store::{Store, balance_key, tx_get};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccrualReference {
    pub monthly_rate_minutes: f64,
    pub months_since_join: u32,
    pub entitlement_minutes: i64,
    pub is_valid: bool,
}

/// Entitlement earned from the join month through the current month,
/// both inclusive. Never fails; out-of-range months come back invalid.
pub fn calculate_accrual_reference(
    annual_entitlement_minutes: i64,
    join_month: i64,
    current_month: i64,
) -> AccrualReference {
    let monthly_rate_minutes = annual_entitlement_minutes.max(0) as f64 / 12.0;
    let in_range = |m: i64| (1..=12).contains(&m);
    let is_valid = in_range(join_month) && in_range(current_month) && join_month <= current_month;

    let months_since_join = if is_valid {
        (current_month - join_month + 1) as u32
    } else {
        0
    };

    AccrualReference {
        monthly_rate_minutes,
        months_since_join,
        entitlement_minutes: (monthly_rate_minutes * months_since_join as f64).round() as i64,
        is_valid,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarryoverOutcome {
    pub carried: bool,
    pub amount_minutes: i64,
    /// Target balance after the carryover, when one happened
    pub new_balance_minutes: Option<i64>,
}

impl CarryoverOutcome {
    fn skipped() -> Self {
        Self {
            carried: false,
            amount_minutes: 0,
            new_balance_minutes: None,
        }
    }
}

pub fn carryover_reason(from_year: i32) -> String {
    format!("Yearly carryover from {from_year}")
}

/// Credits `to_year` with the whole `from_year` balance. Re-running for the
/// same pair is a no-op thanks to the marker on the target row.
pub fn carryover_leave_balance(
    store: &Store,
    user_id: &str,
    leave_type: LeaveType,
    from_year: i32,
    to_year: i32,
    actor_uid: &str,
    join_date: Option<NaiveDate>,
) -> Result<CarryoverOutcome> {
    if from_year == to_year {
        return Err(LeaveError::validation(
            "Carryover source and target years must differ.",
        ));
    }
    if join_date.is_none() {
        return Err(LeaveError::validation(
            "Join date must be set before carrying over balances.",
        ));
    }

    let source_key = balance_key(user_id, leave_type, from_year);
    let target_key = balance_key(user_id, leave_type, to_year);

    let outcome = (&store.balances, &store.adjustments).transaction(
        |(balances, adjustments)| -> ConflictableTransactionResult<CarryoverOutcome, LeaveError> {
            let Some(source) = tx_get::<LeaveBalance>(balances, &source_key)? else {
                return Ok(CarryoverOutcome::skipped());
            };
            let target: Option<LeaveBalance> = tx_get(balances, &target_key)?;
            if target.is_some_and(|t| t.last_carryover_from_year == Some(from_year)) {
                return Ok(CarryoverOutcome::skipped());
            }
            // nothing to move; a zero row would break the nonzero ledger rule
            if source.balance_minutes == 0 {
                return Ok(CarryoverOutcome::skipped());
            }

            let input = AdjustmentInput {
                user_id: user_id.to_string(),
                leave_type,
                year: to_year,
                delta_minutes: source.balance_minutes,
                reason: carryover_reason(from_year),
                reference: Some(source_key.clone()),
                actor_uid: actor_uid.to_string(),
                source: AdjustmentSource::System,
            };
            let marker = CarryoverMarker {
                at: TimeStamp::new(),
                from_year,
            };
            let new_balance = stage_adjustment(balances, adjustments, &input, Some(marker))?;

            Ok(CarryoverOutcome {
                carried: true,
                amount_minutes: source.balance_minutes,
                new_balance_minutes: Some(new_balance),
            })
        },
    )?;

    if outcome.carried {
        tracing::info!(
            user = %user_id,
            leave_type = %leave_type,
            from_year,
            to_year,
            amount_minutes = outcome.amount_minutes,
            "balance carried over"
        );
    } else {
        tracing::debug!(user = %user_id, leave_type = %leave_type, from_year, to_year, "carryover skipped");
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accrual_counts_join_month_inclusive() {
        let r = calculate_accrual_reference(12 * 480, 3, 5);
        assert!(r.is_valid);
        assert_eq!(r.months_since_join, 3);
        assert_eq!(r.monthly_rate_minutes, 480.0);
        assert_eq!(r.entitlement_minutes, 1440);
    }

    #[test]
    fn accrual_rounds_fractional_rate() {
        // 1000 / 12 = 83.33.., times 7 = 583.33..
        let r = calculate_accrual_reference(1000, 6, 12);
        assert_eq!(r.entitlement_minutes, 583);
    }

    #[test]
    fn accrual_rejects_bad_months() {
        for (join, current) in [(0, 5), (5, 13), (7, 6), (-1, -1)] {
            let r = calculate_accrual_reference(9600, join, current);
            assert!(!r.is_valid);
            assert_eq!(r.months_since_join, 0);
            assert_eq!(r.entitlement_minutes, 0);
        }
    }

    #[test]
    fn negative_entitlement_clamps_to_zero() {
        let r = calculate_accrual_reference(-600, 1, 12);
        assert_eq!(r.monthly_rate_minutes, 0.0);
        assert_eq!(r.entitlement_minutes, 0);
        assert!(r.is_valid);
    }
}
