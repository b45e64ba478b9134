//! Balance ledger.
//!
//! Every change to a balance is an immutable adjustment row. The balance row
//! per `(user, leave type, year)` is a cached running sum, always written in
//! the same transaction as the adjustment that moved it.
use sled::Transactional;
use sled::transaction::{ConflictableTransactionResult, TransactionalTree};

use super::error::{LeaveError, Result};
use super::request::{LeaveType, TimeStamp};
use super::store::{Store, adjustment_key, balance_key, tx_get, tx_put};
use super::utils::new_sortable_id;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustmentSource {
    #[n(0)]
    Admin,
    #[n(1)]
    System,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct LeaveBalance {
    #[n(0)]
    pub user_id: String,
    #[n(1)]
    pub leave_type: LeaveType,
    #[n(2)]
    pub year: i32,
    #[n(3)]
    pub balance_minutes: i64, // may go negative
    #[n(4)]
    pub updated_at: TimeStamp,
    #[n(5)]
    pub updated_by: String,
    #[n(6)]
    pub last_carryover_at: Option<TimeStamp>,
    #[n(7)]
    pub last_carryover_from_year: Option<i32>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct BalanceAdjustment {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub user_id: String,
    #[n(2)]
    pub leave_type: LeaveType,
    #[n(3)]
    pub year: i32,
    #[n(4)]
    pub delta_minutes: i64,
    #[n(5)]
    pub reason: String,
    #[n(6)]
    pub reference: Option<String>,
    #[n(7)]
    pub actor_uid: String,
    #[n(8)]
    pub source: AdjustmentSource,
    #[n(9)]
    pub created_at: TimeStamp,
}

/// Arguments to a single ledger write. Callers validate delta and reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjustmentInput {
    pub user_id: String,
    pub leave_type: LeaveType,
    pub year: i32,
    pub delta_minutes: i64,
    pub reason: String,
    pub reference: Option<String>,
    pub actor_uid: String,
    pub source: AdjustmentSource,
}

/// Stamped on the target balance so a carryover runs once per year pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CarryoverMarker {
    pub at: TimeStamp,
    pub from_year: i32,
}

/// Writes the adjustment and the updated balance inside an open transaction.
/// Returns the new balance.
pub fn stage_adjustment(
    balances: &TransactionalTree,
    adjustments: &TransactionalTree,
    input: &AdjustmentInput,
    marker: Option<CarryoverMarker>,
) -> ConflictableTransactionResult<i64, LeaveError> {
    let now = TimeStamp::new();
    let key = balance_key(&input.user_id, input.leave_type, input.year);

    let current: Option<LeaveBalance> = tx_get(balances, &key)?;
    let mut balance = current.unwrap_or_else(|| LeaveBalance {
        user_id: input.user_id.clone(),
        leave_type: input.leave_type,
        year: input.year,
        balance_minutes: 0,
        updated_at: now,
        updated_by: input.actor_uid.clone(),
        last_carryover_at: None,
        last_carryover_from_year: None,
    });
    balance.balance_minutes += input.delta_minutes;
    balance.updated_at = now;
    balance.updated_by = input.actor_uid.clone();
    if let Some(marker) = marker {
        balance.last_carryover_at = Some(marker.at);
        balance.last_carryover_from_year = Some(marker.from_year);
    }

    let adjustment = BalanceAdjustment {
        id: new_sortable_id(),
        user_id: input.user_id.clone(),
        leave_type: input.leave_type,
        year: input.year,
        delta_minutes: input.delta_minutes,
        reason: input.reason.clone(),
        reference: input.reference.clone(),
        actor_uid: input.actor_uid.clone(),
        source: input.source,
        created_at: now,
    };

    tx_put(balances, &key, &balance)?;
    tx_put(
        adjustments,
        &adjustment_key(&input.user_id, input.leave_type, input.year, &adjustment.id),
        &adjustment,
    )?;
    Ok(balance.balance_minutes)
}

/// Applies one adjustment atomically and returns the new balance
pub fn apply_adjustment_with_log(store: &Store, input: &AdjustmentInput) -> Result<i64> {
    let new_balance = (&store.balances, &store.adjustments)
        .transaction(|(balances, adjustments)| stage_adjustment(balances, adjustments, input, None))?;

    tracing::info!(
        user = %input.user_id,
        leave_type = %input.leave_type,
        year = input.year,
        delta_minutes = input.delta_minutes,
        new_balance,
        "balance adjusted"
    );
    Ok(new_balance)
}

/// Re-derives a balance from its adjustment rows
pub fn recompute_balance(store: &Store, user_id: &str, leave_type: LeaveType, year: i32) -> Result<i64> {
    Ok(store
        .list_adjustments(user_id, leave_type, year)?
        .iter()
        .map(|a| a.delta_minutes)
        .sum())
}

/// Cached balance, 0 when nothing was ever recorded
pub fn current_balance(store: &Store, user_id: &str, leave_type: LeaveType, year: i32) -> Result<i64> {
    Ok(store
        .get_balance(user_id, leave_type, year)?
        .map(|b| b.balance_minutes)
        .unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn input(delta: i64) -> AdjustmentInput {
        AdjustmentInput {
            user_id: "u1".into(),
            leave_type: LeaveType::Annual,
            year: 2025,
            delta_minutes: delta,
            reason: "Initial allocation".into(),
            reference: None,
            actor_uid: "admin".into(),
            source: AdjustmentSource::Admin,
        }
    }

    #[test]
    fn first_adjustment_creates_balance() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("ledger.db")).unwrap();

        assert_eq!(current_balance(&store, "u1", LeaveType::Annual, 2025).unwrap(), 0);
        let balance = apply_adjustment_with_log(&store, &input(480)).unwrap();
        assert_eq!(balance, 480);

        let row = store.get_balance("u1", LeaveType::Annual, 2025).unwrap().unwrap();
        assert_eq!(row.updated_by, "admin");
        assert_eq!(row.last_carryover_from_year, None);
    }

    #[test]
    fn balance_can_go_negative_and_matches_log() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("ledger.db")).unwrap();

        apply_adjustment_with_log(&store, &input(60)).unwrap();
        let balance = apply_adjustment_with_log(&store, &input(-200)).unwrap();

        assert_eq!(balance, -140);
        assert_eq!(recompute_balance(&store, "u1", LeaveType::Annual, 2025).unwrap(), -140);
        assert_eq!(store.list_adjustments("u1", LeaveType::Annual, 2025).unwrap().len(), 2);
    }
}
