//! Document repository on top of sled.
//!
//! One tree per collection, CBOR values. Multi-tree writes go through sled
//! transactions, which re-run the closure against fresh reads on conflict.
use std::path::Path;
use std::sync::Arc;

use sled::Tree;
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult, TransactionalTree};

use super::directory::{Team, UserProfile};
use super::error::{LeaveError, Result};
use super::ledger::{BalanceAdjustment, LeaveBalance};
use super::request::{LeaveRequest, LeaveType};
use super::workflow::LeaveLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Requests,
    Logs,
    Balances,
    Adjustments,
    Teams,
    Users,
}

impl Collection {
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Requests => "leave_requests",
            Collection::Logs => "leave_logs",
            Collection::Balances => "leave_balances",
            Collection::Adjustments => "balance_adjustments",
            Collection::Teams => "teams",
            Collection::Users => "users",
        }
    }
}

#[derive(Clone)]
pub struct Store {
    instance: Arc<sled::Db>,
    pub(crate) requests: Tree,
    pub(crate) logs: Tree,
    pub(crate) balances: Tree,
    pub(crate) adjustments: Tree,
    pub(crate) teams: Tree,
    pub(crate) users: Tree,
}

impl Store {
    pub fn new(instance: Arc<sled::Db>) -> Result<Self> {
        Ok(Self {
            requests: instance.open_tree(Collection::Requests.name())?,
            logs: instance.open_tree(Collection::Logs.name())?,
            balances: instance.open_tree(Collection::Balances.name())?,
            adjustments: instance.open_tree(Collection::Adjustments.name())?,
            teams: instance.open_tree(Collection::Teams.name())?,
            users: instance.open_tree(Collection::Users.name())?,
            instance,
        })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)?;
        Self::new(Arc::new(db))
    }

    pub fn tree(&self, collection: Collection) -> &Tree {
        match collection {
            Collection::Requests => &self.requests,
            Collection::Logs => &self.logs,
            Collection::Balances => &self.balances,
            Collection::Adjustments => &self.adjustments,
            Collection::Teams => &self.teams,
            Collection::Users => &self.users,
        }
    }

    pub fn flush(&self) -> Result<()> {
        self.instance.flush()?;
        Ok(())
    }

    pub fn get_request(&self, id: &str) -> Result<Option<LeaveRequest>> {
        get(&self.requests, id)
    }

    pub fn list_requests(&self, keep: impl Fn(&LeaveRequest) -> bool) -> Result<Vec<LeaveRequest>> {
        let mut out: Vec<LeaveRequest> = scan(&self.requests, "")?;
        out.retain(|r| keep(r));
        out.sort_by_key(|r| r.start_at);
        Ok(out)
    }

    pub fn logs_for(&self, request_id: &str) -> Result<Vec<LeaveLog>> {
        scan(&self.logs, &format!("{request_id}/"))
    }

    pub fn get_team(&self, id: &str) -> Result<Option<Team>> {
        get(&self.teams, id)
    }

    pub fn put_team(&self, team: &Team) -> Result<()> {
        put(&self.teams, &team.id, team)
    }

    pub fn list_teams(&self) -> Result<Vec<Team>> {
        scan(&self.teams, "")
    }

    pub fn get_user(&self, uid: &str) -> Result<Option<UserProfile>> {
        get(&self.users, uid)
    }

    pub fn put_user(&self, profile: &UserProfile) -> Result<()> {
        put(&self.users, &profile.uid, profile)
    }

    pub fn list_users(&self) -> Result<Vec<UserProfile>> {
        scan(&self.users, "")
    }

    pub fn get_balance(&self, user_id: &str, leave_type: LeaveType, year: i32) -> Result<Option<LeaveBalance>> {
        get(&self.balances, &balance_key(user_id, leave_type, year))
    }

    pub fn list_balances(&self) -> Result<Vec<LeaveBalance>> {
        scan(&self.balances, "")
    }

    pub fn list_adjustments(&self, user_id: &str, leave_type: LeaveType, year: i32) -> Result<Vec<BalanceAdjustment>> {
        scan(&self.adjustments, &format!("{}/", balance_key(user_id, leave_type, year)))
    }
}

pub fn balance_key(user_id: &str, leave_type: LeaveType, year: i32) -> String {
    format!("{user_id}/{leave_type}/{year}")
}

pub fn adjustment_key(user_id: &str, leave_type: LeaveType, year: i32, id: &str) -> String {
    format!("{}/{id}", balance_key(user_id, leave_type, year))
}

pub fn log_key(request_id: &str, log_id: &str) -> String {
    format!("{request_id}/{log_id}")
}

pub fn encode<T: minicbor::Encode<()>>(value: &T) -> Result<Vec<u8>> {
    Ok(minicbor::to_vec(value)?)
}

pub fn decode<T>(bytes: &[u8]) -> Result<T>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    Ok(minicbor::decode(bytes)?)
}

fn get<T>(tree: &Tree, key: &str) -> Result<Option<T>>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    tree.get(key.as_bytes())?
        .map(|bytes| decode(&bytes))
        .transpose()
}

fn put<T: minicbor::Encode<()>>(tree: &Tree, key: &str, value: &T) -> Result<()> {
    tree.insert(key.as_bytes(), encode(value)?)?;
    Ok(())
}

/// Decodes every row under `prefix`. Rows that fail to decode are skipped,
/// one bad document must not hide the rest of a collection.
fn scan<T>(tree: &Tree, prefix: &str) -> Result<Vec<T>>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    let mut out = Vec::new();
    for item in tree.scan_prefix(prefix.as_bytes()) {
        let (key, value) = item?;
        match decode(&value) {
            Ok(v) => out.push(v),
            Err(e) => tracing::warn!(
                key = %String::from_utf8_lossy(&key),
                error = %e,
                "skipping malformed record"
            ),
        }
    }
    Ok(out)
}

/// Read inside a transaction
pub fn tx_get<T>(tree: &TransactionalTree, key: &str) -> ConflictableTransactionResult<Option<T>, LeaveError>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    match tree.get(key.as_bytes())? {
        Some(bytes) => decode(&bytes).map(Some).map_err(ConflictableTransactionError::Abort),
        None => Ok(None),
    }
}

/// Write inside a transaction
pub fn tx_put<T: minicbor::Encode<()>>(
    tree: &TransactionalTree,
    key: &str,
    value: &T,
) -> ConflictableTransactionResult<(), LeaveError> {
    let bytes = encode(value).map_err(ConflictableTransactionError::Abort)?;
    tree.insert(key.as_bytes(), bytes)?;
    Ok(())
}

pub fn abort<T>(err: LeaveError) -> ConflictableTransactionResult<T, LeaveError> {
    Err(ConflictableTransactionError::Abort(err))
}
