//! Service layer API for leave workflow operations
//!
//! Each use case loads what it needs, lets [`crate::workflow`] decide, then
//! commits the request, its log entry and any ledger entry in one sled
//! transaction. Notifications go out after the commit and never fail the call.
use std::collections::HashMap;

use sled::Transactional;
use sled::transaction::ConflictableTransactionResult;

use super::accrual::{self, CarryoverOutcome};
use super::directory::{Team, UserProfile, UserUpdate};
use super::error::{LeaveError, Result};
use super::identity::Identity;
use super::ledger::{self, AdjustmentInput, AdjustmentSource, BalanceAdjustment, stage_adjustment};
use super::notify::{NotificationKind, Notifier, Recipient, TemplateFields};
use super::request::{Accounting, LeaveRequest, LeaveRequestDraft, LeaveStatus, LeaveType, TimeStamp};
use super::store::{Store, abort, log_key, tx_get, tx_put};
use super::utils::{new_sortable_id, new_uuid_to_bech32};
use super::workflow::{
    Approval, LeaveLog, LogDraft, auto_approval, decide_approval, decide_cancellation,
    decide_rejection, should_auto_approve,
};

pub const OVERLAP: &str = "This request overlaps with an existing leave request.";
pub const STALE_REQUEST: &str =
    "This request was changed by someone else. Please refresh and try again.";
pub const NOT_WHITELISTED: &str = "Your account is not authorized to use this application.";
pub const DUPLICATE_TEAM: &str = "A team with this name already exists.";
pub const LEAD_TAKEN: &str = "This team already has a team lead.";
pub const MANAGER_TAKEN: &str = "This team already has a manager.";
pub const BOTH_ROLES: &str = "A user cannot be both lead and manager of the same team.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalOutcome {
    pub request: LeaveRequest,
    /// The normal two-step chain was skipped
    pub direct: bool,
    /// Balance after the debit, for final approvals
    pub new_balance_minutes: Option<i64>,
}

/// Admin balance correction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceCorrection {
    pub user_id: String,
    pub leave_type: LeaveType,
    pub year: i32,
    pub delta_minutes: i64,
    pub reason: String,
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CarryoverSummary {
    pub carried: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BalanceEffect {
    Unchanged,
    Debit,
    Credit,
}

impl BalanceEffect {
    fn adjustment(&self, request: &LeaveRequest, actor_uid: &str) -> Option<AdjustmentInput> {
        let (delta, reason) = match self {
            BalanceEffect::Unchanged => return None,
            BalanceEffect::Debit => (-request.requested_minutes, "Leave approved"),
            BalanceEffect::Credit => (request.requested_minutes, "Approved leave cancelled"),
        };
        Some(AdjustmentInput {
            user_id: request.employee_uid.clone(),
            leave_type: request.leave_type,
            year: request.ledger_year(),
            delta_minutes: delta,
            reason: reason.to_string(),
            reference: Some(request.id.clone()),
            actor_uid: actor_uid.to_string(),
            source: AdjustmentSource::System,
        })
    }
}

#[derive(Clone)]
pub struct LeaveService {
    store: Store,
    notifier: Notifier,
    accounting: Accounting,
}

impl LeaveService {
    pub fn new(store: Store, notifier: Notifier) -> Self {
        Self {
            store,
            notifier,
            accounting: Accounting::default(),
        }
    }

    pub fn with_accounting(mut self, accounting: Accounting) -> Self {
        self.accounting = accounting;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Profile of the caller, which must exist and be whitelisted
    fn load_actor(&self, identity: &Identity) -> Result<UserProfile> {
        let profile = self
            .store
            .get_user(identity.uid())?
            .ok_or_else(|| LeaveError::unauthorized(NOT_WHITELISTED))?;
        profile.ensure_active()?;
        Ok(profile)
    }

    fn load_team(&self, team_id: Option<&str>) -> Result<Option<Team>> {
        let Some(team_id) = team_id else {
            return Ok(None);
        };
        let team = self.store.get_team(team_id)?;
        if team.is_none() {
            tracing::warn!(team_id, "request references a missing team");
        }
        Ok(team)
    }

    fn load_request(&self, request_id: &str) -> Result<LeaveRequest> {
        self.store
            .get_request(request_id)?
            .ok_or_else(|| LeaveError::not_found("leave request", request_id))
    }

    fn load_user(&self, uid: &str) -> Result<UserProfile> {
        self.store
            .get_user(uid)?
            .ok_or_else(|| LeaveError::not_found("user", uid))
    }

    fn load_team_required(&self, team_id: &str) -> Result<Team> {
        self.store
            .get_team(team_id)?
            .ok_or_else(|| LeaveError::not_found("team", team_id))
    }

    // ---------------------------------------------------------------------
    // Leave requests
    // ---------------------------------------------------------------------

    /// Submit a new leave request for the caller
    pub fn create_leave_request(
        &self,
        identity: &Identity,
        draft: &LeaveRequestDraft,
    ) -> Result<LeaveRequest> {
        let actor = self.load_actor(identity)?;
        let valid = draft.validate_and_finalise(self.accounting)?;

        let overlapping = self.store.list_requests(|r| {
            r.employee_uid == actor.uid
                && r.status == LeaveStatus::Submitted
                && r.overlaps(valid.start_at, valid.end_at)
        })?;
        if !overlapping.is_empty() {
            return Err(LeaveError::conflict(OVERLAP));
        }

        let team = self.load_team(actor.team_id.as_deref())?;
        let now = TimeStamp::new();
        let request = LeaveRequest {
            id: new_uuid_to_bech32("leave_")?,
            employee_uid: actor.uid.clone(),
            team_id: actor.team_id.clone(),
            leave_type: valid.leave_type,
            start_at: valid.start_at,
            end_at: valid.end_at,
            requested_minutes: valid.requested_minutes,
            status: LeaveStatus::Submitted,
            note: valid.note,
            step1: None,
            step2: None,
            rejection: None,
            created_at: now,
            updated_at: now,
        };
        let log = LogDraft::created(&actor.uid, now).into_log(new_sortable_id(), &request.id);

        (&self.store.requests, &self.store.logs).transaction(
            |(requests, logs)| -> ConflictableTransactionResult<(), LeaveError> {
                tx_put(requests, &request.id, &request)?;
                tx_put(logs, &log_key(&request.id, &log.id), &log)?;
                Ok(())
            },
        )?;
        tracing::info!(
            request_id = %request.id,
            employee = %request.employee_uid,
            minutes = request.requested_minutes,
            "leave request submitted"
        );

        if should_auto_approve(team.as_ref(), &actor.uid) {
            let approval = auto_approval(&request)?;
            let (approved, new_balance) =
                self.commit_approval(&request.id, &actor.uid, approval)?;
            tracing::info!(
                request_id = %approved.id,
                new_balance = ?new_balance,
                "leave request auto-approved"
            );
            return Ok(approved);
        }

        self.notify_pending(NotificationKind::LeaveSubmitted, &request, team.as_ref(), &actor);
        Ok(request)
    }

    pub fn approve_leave_request(
        &self,
        identity: &Identity,
        request_id: &str,
    ) -> Result<ApprovalOutcome> {
        let actor = self.load_actor(identity)?;
        let request = self.load_request(request_id)?;
        let team = self.load_team(request.team_id.as_deref())?;

        let approval = decide_approval(&actor, team.as_ref(), &request)?;
        let (request, new_balance) = self.commit_approval(request_id, &actor.uid, approval)?;
        tracing::info!(
            request_id = %request.id,
            actor = %actor.uid,
            status = %request.status,
            direct = approval.direct,
            new_balance = ?new_balance,
            "leave request approved"
        );

        match request.status {
            LeaveStatus::TlApproved => {
                self.notify_pending(NotificationKind::LeaveTlApproved, &request, team.as_ref(), &actor)
            }
            _ => self.notify_employee(NotificationKind::LeaveApproved, &request, &actor, None),
        }

        Ok(ApprovalOutcome {
            request,
            direct: approval.direct,
            new_balance_minutes: new_balance,
        })
    }

    pub fn reject_leave_request(
        &self,
        identity: &Identity,
        request_id: &str,
        reason: Option<String>,
    ) -> Result<LeaveRequest> {
        let actor = self.load_actor(identity)?;
        let request = self.load_request(request_id)?;
        let team = self.load_team(request.team_id.as_deref())?;

        let expected = decide_rejection(&actor, team.as_ref(), &request)?;
        let (request, _) = self.commit_transition(
            request_id,
            &actor.uid,
            BalanceEffect::Unchanged,
            |req| {
                if req.status != expected {
                    return Err(LeaveError::conflict(STALE_REQUEST));
                }
                Ok(req.apply_rejection(&actor.uid, reason.clone(), TimeStamp::new()))
            },
        )?;
        tracing::info!(request_id = %request.id, actor = %actor.uid, "leave request rejected");

        let reason = request.rejection.as_ref().and_then(|r| r.reason.clone());
        self.notify_employee(NotificationKind::LeaveRejected, &request, &actor, reason);
        Ok(request)
    }

    pub fn cancel_leave_request(&self, identity: &Identity, request_id: &str) -> Result<LeaveRequest> {
        let actor = self.load_actor(identity)?;
        let request = self.load_request(request_id)?;

        let cancellation = decide_cancellation(&actor, &request)?;
        let effect = if cancellation.credit_back {
            BalanceEffect::Credit
        } else {
            BalanceEffect::Unchanged
        };
        let (cancelled, new_balance) = self.commit_transition(request_id, &actor.uid, effect, |req| {
            if req.status != cancellation.from {
                return Err(LeaveError::conflict(STALE_REQUEST));
            }
            Ok(req.apply_cancellation(&cancellation, &actor.uid, TimeStamp::new()))
        })?;
        tracing::info!(
            request_id = %cancelled.id,
            actor = %actor.uid,
            credited = cancellation.credit_back,
            new_balance = ?new_balance,
            "leave request cancelled"
        );

        if cancelled.employee_uid != actor.uid {
            self.notify_employee(NotificationKind::LeaveCancelled, &cancelled, &actor, None);
        } else if self.notifier.is_enabled() {
            // tell whoever was about to act on it
            let team = self.load_team(cancelled.team_id.as_deref()).ok().flatten();
            let mut before = cancelled.clone();
            before.status = cancellation.from;
            self.notify_pending(NotificationKind::LeaveCancelled, &before, team.as_ref(), &actor);
        }
        Ok(cancelled)
    }

    fn commit_approval(
        &self,
        request_id: &str,
        actor_uid: &str,
        approval: Approval,
    ) -> Result<(LeaveRequest, Option<i64>)> {
        let effect = if approval.debits_balance() {
            BalanceEffect::Debit
        } else {
            BalanceEffect::Unchanged
        };
        self.commit_transition(request_id, actor_uid, effect, |req| {
            if req.status != approval.from {
                return Err(LeaveError::conflict(STALE_REQUEST));
            }
            Ok(req.apply_approval(&approval, actor_uid, TimeStamp::new()))
        })
    }

    /// Re-reads the request inside one transaction, applies `mutate`, and
    /// writes the request, its log entry and the ledger entry together.
    /// sled retries the closure on conflict, so a racing approver sees the
    /// status the winner wrote and fails the status check in `mutate`.
    fn commit_transition<F>(
        &self,
        request_id: &str,
        actor_uid: &str,
        effect: BalanceEffect,
        mutate: F,
    ) -> Result<(LeaveRequest, Option<i64>)>
    where
        F: Fn(&mut LeaveRequest) -> Result<LogDraft>,
    {
        let store = &self.store;
        let committed = (&store.requests, &store.logs, &store.balances, &store.adjustments)
            .transaction(
                |(requests, logs, balances, adjustments)| -> ConflictableTransactionResult<(LeaveRequest, Option<i64>), LeaveError> {
                    let Some(mut request) = tx_get::<LeaveRequest>(requests, request_id)? else {
                        return abort(LeaveError::not_found("leave request", request_id));
                    };
                    let draft = match mutate(&mut request) {
                        Ok(draft) => draft,
                        Err(e) => return abort(e),
                    };
                    let log = draft.into_log(new_sortable_id(), &request.id);

                    let new_balance = match effect.adjustment(&request, actor_uid) {
                        Some(input) => Some(stage_adjustment(balances, adjustments, &input, None)?),
                        None => None,
                    };

                    tx_put(requests, &request.id, &request)?;
                    tx_put(logs, &log_key(&request.id, &log.id), &log)?;
                    Ok((request, new_balance))
                },
            )?;
        Ok(committed)
    }

    // ---------------------------------------------------------------------
    // Balances
    // ---------------------------------------------------------------------

    pub fn adjust_leave_balance(
        &self,
        identity: &Identity,
        correction: &BalanceCorrection,
    ) -> Result<i64> {
        let actor = self.load_actor(identity)?;
        actor.ensure_admin("adjust leave balances")?;
        if correction.delta_minutes == 0 {
            return Err(LeaveError::validation("Adjustment amount must be non-zero."));
        }
        let reason = correction.reason.trim();
        if reason.is_empty() {
            return Err(LeaveError::validation(
                "A reason is required for balance adjustments.",
            ));
        }
        let target = self.load_user(&correction.user_id)?;

        let input = AdjustmentInput {
            user_id: target.uid.clone(),
            leave_type: correction.leave_type,
            year: correction.year,
            delta_minutes: correction.delta_minutes,
            reason: reason.to_string(),
            reference: correction.reference.clone().filter(|r| !r.trim().is_empty()),
            actor_uid: actor.uid.clone(),
            source: AdjustmentSource::Admin,
        };
        let new_balance = ledger::apply_adjustment_with_log(&self.store, &input)?;

        if !self.notifier.is_enabled() {
            return Ok(new_balance);
        }
        let mut fields = TemplateFields::new();
        fields.insert("actor_name".into(), actor.name().to_string());
        fields.insert("leave_type".into(), input.leave_type.to_string());
        fields.insert("year".into(), input.year.to_string());
        fields.insert("delta_minutes".into(), input.delta_minutes.to_string());
        fields.insert("balance_minutes".into(), new_balance.to_string());
        fields.insert("reason".into(), input.reason.clone());
        self.notifier.notify(
            NotificationKind::BalanceAdjusted,
            vec![recipient_of(&target)],
            fields,
        );
        Ok(new_balance)
    }

    pub fn carryover_leave_balance(
        &self,
        identity: &Identity,
        user_id: &str,
        leave_type: LeaveType,
        from_year: i32,
        to_year: i32,
    ) -> Result<CarryoverOutcome> {
        let actor = self.load_actor(identity)?;
        actor.ensure_admin("run carryover")?;
        let user = self.load_user(user_id)?;
        accrual::carryover_leave_balance(
            &self.store,
            &user.uid,
            leave_type,
            from_year,
            to_year,
            &actor.uid,
            user.join_date(),
        )
    }

    /// Carries every balance of `from_year` into `to_year`. Rows that fail
    /// (no join date, missing user) are counted and logged, not fatal.
    pub fn carryover_all(
        &self,
        identity: &Identity,
        from_year: i32,
        to_year: i32,
    ) -> Result<CarryoverSummary> {
        let actor = self.load_actor(identity)?;
        actor.ensure_admin("run carryover")?;

        let mut summary = CarryoverSummary::default();
        for balance in self.store.list_balances()? {
            if balance.year != from_year {
                continue;
            }
            match self.carryover_leave_balance(
                identity,
                &balance.user_id,
                balance.leave_type,
                from_year,
                to_year,
            ) {
                Ok(outcome) if outcome.carried => summary.carried += 1,
                Ok(_) => summary.skipped += 1,
                Err(e) => {
                    tracing::warn!(
                        user = %balance.user_id,
                        leave_type = %balance.leave_type,
                        error = %e,
                        "carryover failed"
                    );
                    summary.failed += 1;
                }
            }
        }
        tracing::info!(from_year, to_year, ?summary, "carryover run finished");
        Ok(summary)
    }

    pub fn get_balance(&self, user_id: &str, leave_type: LeaveType, year: i32) -> Result<i64> {
        ledger::current_balance(&self.store, user_id, leave_type, year)
    }

    pub fn list_adjustments(
        &self,
        user_id: &str,
        leave_type: LeaveType,
        year: i32,
    ) -> Result<Vec<BalanceAdjustment>> {
        self.store.list_adjustments(user_id, leave_type, year)
    }

    pub fn recompute_balance(&self, user_id: &str, leave_type: LeaveType, year: i32) -> Result<i64> {
        ledger::recompute_balance(&self.store, user_id, leave_type, year)
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    pub fn get_request(&self, request_id: &str) -> Result<LeaveRequest> {
        self.load_request(request_id)
    }

    pub fn request_logs(&self, request_id: &str) -> Result<Vec<LeaveLog>> {
        self.store.logs_for(request_id)
    }

    pub fn list_requests_for_employee(&self, uid: &str) -> Result<Vec<LeaveRequest>> {
        self.store.list_requests(|r| r.employee_uid == uid)
    }

    /// Pending requests the caller is allowed to approve right now
    pub fn list_pending_for_approver(&self, identity: &Identity) -> Result<Vec<LeaveRequest>> {
        let actor = self.load_actor(identity)?;
        let pending = self.store.list_requests(|r| r.status.is_pending())?;
        if actor.is_admin() {
            return Ok(pending);
        }

        let teams: HashMap<String, Team> = self
            .store
            .list_teams()?
            .into_iter()
            .filter(|t| t.is_lead(&actor.uid) || t.is_manager(&actor.uid))
            .map(|t| (t.id.clone(), t))
            .collect();

        Ok(pending
            .into_iter()
            .filter(|r| {
                let team = r.team_id.as_ref().and_then(|id| teams.get(id));
                team.is_some() && decide_approval(&actor, team, r).is_ok()
            })
            .collect())
    }

    // ---------------------------------------------------------------------
    // Directory
    // ---------------------------------------------------------------------

    /// Profile for a signed-in identity, created on first sight
    pub fn register_user(&self, identity: &Identity) -> Result<UserProfile> {
        if let Some(existing) = self.store.get_user(identity.uid())? {
            return Ok(existing);
        }
        let profile = UserProfile::from_identity(identity);
        self.store.put_user(&profile)?;
        tracing::info!(uid = %profile.uid, "user registered");
        Ok(profile)
    }

    pub fn update_user(
        &self,
        identity: &Identity,
        uid: &str,
        update: &UserUpdate,
    ) -> Result<UserProfile> {
        let actor = self.load_actor(identity)?;
        actor.ensure_admin("manage users")?;
        let mut profile = self.load_user(uid)?;

        if let Some(Some(team_id)) = &update.team_id {
            self.load_team_required(team_id)?;
        }
        update.apply_to(&mut profile)?;
        self.store.put_user(&profile)?;
        tracing::info!(uid = %profile.uid, actor = %actor.uid, "user updated");
        Ok(profile)
    }

    pub fn create_team(&self, identity: &Identity, name: &str) -> Result<Team> {
        let actor = self.load_actor(identity)?;
        actor.ensure_admin("manage teams")?;

        let name = name.trim();
        if name.is_empty() {
            return Err(LeaveError::validation("Team name is required."));
        }
        let key = Team::name_key(name);
        if self
            .store
            .list_teams()?
            .iter()
            .any(|t| Team::name_key(&t.name) == key)
        {
            return Err(LeaveError::conflict(DUPLICATE_TEAM));
        }

        let team = Team {
            id: new_uuid_to_bech32("team_")?,
            name: name.to_string(),
            lead_uid: None,
            manager_uid: None,
            created_at: TimeStamp::new(),
        };
        self.store.put_team(&team)?;
        tracing::info!(team_id = %team.id, name = %team.name, "team created");
        Ok(team)
    }

    pub fn assign_team_lead(&self, identity: &Identity, team_id: &str, uid: &str) -> Result<Team> {
        self.assign_role(identity, team_id, Some(uid), TeamRole::Lead)
    }

    pub fn assign_team_manager(&self, identity: &Identity, team_id: &str, uid: &str) -> Result<Team> {
        self.assign_role(identity, team_id, Some(uid), TeamRole::Manager)
    }

    pub fn clear_team_lead(&self, identity: &Identity, team_id: &str) -> Result<Team> {
        self.assign_role(identity, team_id, None, TeamRole::Lead)
    }

    pub fn clear_team_manager(&self, identity: &Identity, team_id: &str) -> Result<Team> {
        self.assign_role(identity, team_id, None, TeamRole::Manager)
    }

    fn assign_role(
        &self,
        identity: &Identity,
        team_id: &str,
        uid: Option<&str>,
        role: TeamRole,
    ) -> Result<Team> {
        let actor = self.load_actor(identity)?;
        actor.ensure_admin("manage teams")?;
        let mut team = self.load_team_required(team_id)?;

        if let Some(uid) = uid {
            self.load_user(uid)?;
            let (current, other) = match role {
                TeamRole::Lead => (&team.lead_uid, &team.manager_uid),
                TeamRole::Manager => (&team.manager_uid, &team.lead_uid),
            };
            if other.as_deref() == Some(uid) {
                return Err(LeaveError::conflict(BOTH_ROLES));
            }
            if current.as_deref().is_some_and(|c| c != uid) {
                return Err(LeaveError::conflict(match role {
                    TeamRole::Lead => LEAD_TAKEN,
                    TeamRole::Manager => MANAGER_TAKEN,
                }));
            }
        }

        let slot = match role {
            TeamRole::Lead => &mut team.lead_uid,
            TeamRole::Manager => &mut team.manager_uid,
        };
        *slot = uid.map(str::to_string);
        self.store.put_team(&team)?;
        tracing::info!(team_id = %team.id, ?role, uid = ?uid, "team role updated");
        Ok(team)
    }

    // ---------------------------------------------------------------------
    // Notifications
    // ---------------------------------------------------------------------

    fn recipient(&self, uid: &str) -> Option<Recipient> {
        match self.store.get_user(uid) {
            Ok(Some(profile)) => Some(recipient_of(&profile)),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(uid, error = %e, "could not resolve notification recipient");
                None
            }
        }
    }

    fn request_fields(&self, request: &LeaveRequest, actor: &UserProfile) -> TemplateFields {
        let employee_name = self
            .store
            .get_user(&request.employee_uid)
            .ok()
            .flatten()
            .map(|p| p.name().to_string())
            .unwrap_or_else(|| request.employee_uid.clone());

        let mut fields = TemplateFields::new();
        fields.insert("request_id".into(), request.id.clone());
        fields.insert("employee_name".into(), employee_name);
        fields.insert("actor_name".into(), actor.name().to_string());
        fields.insert("leave_type".into(), request.leave_type.to_string());
        fields.insert("start".into(), request.start_at.to_datetime_utc().to_rfc3339());
        fields.insert("end".into(), request.end_at.to_datetime_utc().to_rfc3339());
        fields.insert("minutes".into(), request.requested_minutes.to_string());
        fields.insert("status".into(), request.status.to_string());
        fields
    }

    /// Notifies whoever acts next on a pending request
    fn notify_pending(
        &self,
        kind: NotificationKind,
        request: &LeaveRequest,
        team: Option<&Team>,
        actor: &UserProfile,
    ) {
        if !self.notifier.is_enabled() {
            return;
        }
        let Some(team) = team else {
            return;
        };
        let mut uids: Vec<&str> = Vec::new();
        match request.status {
            LeaveStatus::Submitted => {
                match team.lead_uid.as_deref() {
                    Some(lead) if lead != request.employee_uid => uids.push(lead),
                    _ => uids.extend(team.manager_uid.as_deref()),
                }
            }
            LeaveStatus::TlApproved => {
                uids.extend(team.manager_uid.as_deref());
                if kind == NotificationKind::LeaveTlApproved {
                    uids.push(&request.employee_uid);
                }
            }
            LeaveStatus::Approved | LeaveStatus::Rejected | LeaveStatus::Cancelled => {}
        }
        let recipients: Vec<Recipient> = uids
            .into_iter()
            .filter(|uid| *uid != actor.uid)
            .filter_map(|uid| self.recipient(uid))
            .collect();
        self.notifier
            .notify(kind, recipients, self.request_fields(request, actor));
    }

    fn notify_employee(
        &self,
        kind: NotificationKind,
        request: &LeaveRequest,
        actor: &UserProfile,
        reason: Option<String>,
    ) {
        if !self.notifier.is_enabled() || request.employee_uid == actor.uid {
            return;
        }
        let Some(recipient) = self.recipient(&request.employee_uid) else {
            return;
        };
        let mut fields = self.request_fields(request, actor);
        if let Some(reason) = reason {
            fields.insert("reason".into(), reason);
        }
        self.notifier.notify(kind, vec![recipient], fields);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TeamRole {
    Lead,
    Manager,
}

fn recipient_of(profile: &UserProfile) -> Recipient {
    Recipient {
        email: profile.email.clone(),
        name: profile.name().to_string(),
    }
}
