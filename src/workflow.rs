//! Leave request state machine.
//!
//! `SUBMITTED -> {TL_APPROVED, APPROVED, REJECTED, CANCELLED}`,
//! `TL_APPROVED -> {APPROVED, REJECTED, CANCELLED}`, `APPROVED -> CANCELLED`.
//! Rejected and cancelled requests are final.
//!
//! The functions here only decide. They read the actor, the team and the
//! request and return what should happen, leaving the writes to the service.
use std::collections::BTreeMap;

use super::directory::{Team, UserProfile};
use super::error::LeaveError;
use super::request::{ApprovalStamp, LeaveRequest, LeaveStatus, Rejection, TimeStamp};

pub const SELF_APPROVAL_LEAD: &str = "Team lead cannot approve their own request.";
pub const SELF_APPROVAL_MANAGER: &str = "Manager cannot approve their own request.";
pub const SELF_REJECTION_LEAD: &str = "Team lead cannot reject their own request.";
pub const SELF_REJECTION_MANAGER: &str = "Manager cannot reject their own request.";
pub const NOT_ALLOWED_APPROVE: &str = "You are not allowed to approve this request.";
pub const NOT_ALLOWED_REJECT: &str = "You are not allowed to reject this request.";
pub const NOT_ALLOWED_CANCEL: &str = "You are not allowed to cancel this request.";
pub const ADMIN_ONLY_APPROVED_CANCEL: &str = "Only admins can cancel an approved request.";
pub const NOT_PENDING_APPROVE: &str = "Only pending requests can be approved.";
pub const NOT_PENDING_REJECT: &str = "Only pending requests can be rejected.";
pub const NO_LONGER_CANCELLABLE: &str = "This request can no longer be cancelled.";

impl LeaveStatus {
    /// Every status reachable in one step
    pub fn allowed_next(&self) -> &'static [LeaveStatus] {
        use LeaveStatus::*;
        match self {
            Submitted => &[TlApproved, Approved, Rejected, Cancelled],
            TlApproved => &[Approved, Rejected, Cancelled],
            Approved => &[Cancelled],
            Rejected | Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, next: LeaveStatus) -> bool {
        self.allowed_next().contains(&next)
    }

    /// Still waiting on someone to approve or reject
    pub fn is_pending(&self) -> bool {
        matches!(self, LeaveStatus::Submitted | LeaveStatus::TlApproved)
    }
}

/// The capacity in which an actor moved the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    TeamLead,
    Manager,
    Admin,
    /// Lead-only team, applied by the system right after creation
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Approval {
    pub from: LeaveStatus,
    pub next: LeaveStatus,
    pub capacity: Capacity,
    /// Skipped part of the two-step chain
    pub direct: bool,
}

impl Approval {
    /// Final approvals are the ones that touch the balance
    pub fn debits_balance(&self) -> bool {
        self.next == LeaveStatus::Approved
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancellation {
    pub from: LeaveStatus,
    /// Approved requests get their debit credited back
    pub credit_back: bool,
}

/// Lead-only teams approve the lead's own requests automatically
pub fn should_auto_approve(team: Option<&Team>, creator_uid: &str) -> bool {
    team.is_some_and(|t| t.is_lead(creator_uid) && !t.has_manager())
}

pub fn auto_approval(request: &LeaveRequest) -> Result<Approval, LeaveError> {
    if request.status != LeaveStatus::Submitted {
        return Err(LeaveError::unauthorized(NOT_PENDING_APPROVE));
    }
    Ok(Approval {
        from: LeaveStatus::Submitted,
        next: LeaveStatus::Approved,
        capacity: Capacity::Auto,
        direct: true,
    })
}

pub fn decide_approval(
    actor: &UserProfile,
    team: Option<&Team>,
    request: &LeaveRequest,
) -> Result<Approval, LeaveError> {
    let from = request.status;
    let own = request.employee_uid == actor.uid;

    if own && team.is_some_and(|t| t.is_lead(&actor.uid)) && from == LeaveStatus::Submitted {
        return Err(LeaveError::unauthorized(SELF_APPROVAL_LEAD));
    }

    if actor.is_admin() {
        if !from.is_pending() {
            return Err(LeaveError::unauthorized(NOT_PENDING_APPROVE));
        }
        return Ok(Approval {
            from,
            next: LeaveStatus::Approved,
            capacity: Capacity::Admin,
            direct: from == LeaveStatus::Submitted,
        });
    }

    let team = team.ok_or_else(|| LeaveError::unauthorized(NOT_ALLOWED_APPROVE))?;

    if team.is_lead(&actor.uid) {
        if own {
            return Err(LeaveError::unauthorized(SELF_APPROVAL_LEAD));
        }
        return match from {
            LeaveStatus::Submitted if team.has_manager() => Ok(Approval {
                from,
                next: LeaveStatus::TlApproved,
                capacity: Capacity::TeamLead,
                direct: false,
            }),
            LeaveStatus::Submitted => Ok(Approval {
                from,
                next: LeaveStatus::Approved,
                capacity: Capacity::TeamLead,
                direct: true,
            }),
            _ => Err(LeaveError::unauthorized(NOT_ALLOWED_APPROVE)),
        };
    }

    if team.is_manager(&actor.uid) {
        if own {
            return Err(LeaveError::unauthorized(SELF_APPROVAL_MANAGER));
        }
        return match from {
            LeaveStatus::TlApproved => Ok(Approval {
                from,
                next: LeaveStatus::Approved,
                capacity: Capacity::Manager,
                direct: false,
            }),
            LeaveStatus::Submitted if skips_lead_step(team, request) => Ok(Approval {
                from,
                next: LeaveStatus::Approved,
                capacity: Capacity::Manager,
                direct: true,
            }),
            _ => Err(LeaveError::unauthorized(NOT_ALLOWED_APPROVE)),
        };
    }

    Err(LeaveError::unauthorized(NOT_ALLOWED_APPROVE))
}

/// The lead step is skipped when the lead is the requester, or the team has no lead
fn skips_lead_step(team: &Team, request: &LeaveRequest) -> bool {
    team.lead_uid.is_none() || team.is_lead(&request.employee_uid)
}

pub fn decide_rejection(
    actor: &UserProfile,
    team: Option<&Team>,
    request: &LeaveRequest,
) -> Result<LeaveStatus, LeaveError> {
    let from = request.status;
    let own = request.employee_uid == actor.uid;

    if own && team.is_some_and(|t| t.is_lead(&actor.uid)) && from == LeaveStatus::Submitted {
        return Err(LeaveError::unauthorized(SELF_REJECTION_LEAD));
    }

    if actor.is_admin() {
        if !from.is_pending() {
            return Err(LeaveError::unauthorized(NOT_PENDING_REJECT));
        }
        return Ok(from);
    }

    let team = team.ok_or_else(|| LeaveError::unauthorized(NOT_ALLOWED_REJECT))?;

    if team.is_lead(&actor.uid) {
        if own {
            return Err(LeaveError::unauthorized(SELF_REJECTION_LEAD));
        }
        return match from {
            LeaveStatus::Submitted => Ok(from),
            _ => Err(LeaveError::unauthorized(NOT_ALLOWED_REJECT)),
        };
    }

    if team.is_manager(&actor.uid) {
        if own {
            return Err(LeaveError::unauthorized(SELF_REJECTION_MANAGER));
        }
        return match from {
            LeaveStatus::TlApproved => Ok(from),
            LeaveStatus::Submitted if skips_lead_step(team, request) => Ok(from),
            _ => Err(LeaveError::unauthorized(NOT_ALLOWED_REJECT)),
        };
    }

    Err(LeaveError::unauthorized(NOT_ALLOWED_REJECT))
}

pub fn decide_cancellation(
    actor: &UserProfile,
    request: &LeaveRequest,
) -> Result<Cancellation, LeaveError> {
    let from = request.status;
    match from {
        LeaveStatus::Submitted | LeaveStatus::TlApproved => {
            if request.employee_uid != actor.uid && !actor.is_admin() {
                return Err(LeaveError::unauthorized(NOT_ALLOWED_CANCEL));
            }
            Ok(Cancellation {
                from,
                credit_back: false,
            })
        }
        LeaveStatus::Approved => {
            if !actor.is_admin() {
                return Err(LeaveError::unauthorized(ADMIN_ONLY_APPROVED_CANCEL));
            }
            Ok(Cancellation {
                from,
                credit_back: true,
            })
        }
        LeaveStatus::Rejected | LeaveStatus::Cancelled => {
            Err(LeaveError::unauthorized(NO_LONGER_CANCELLABLE))
        }
    }
}

impl LeaveRequest {
    /// Moves the request per an approval decision and returns the log entry
    /// that has to be written alongside it
    pub fn apply_approval(
        &mut self,
        approval: &Approval,
        actor_uid: &str,
        at: TimeStamp,
    ) -> LogDraft {
        let stamp = ApprovalStamp {
            actor_uid: actor_uid.to_string(),
            at,
        };
        let mut metadata = BTreeMap::new();
        match approval.capacity {
            Capacity::TeamLead => self.step1 = Some(stamp),
            Capacity::Auto => {
                self.step1 = Some(stamp);
                metadata.insert("auto".to_string(), "true".to_string());
            }
            Capacity::Manager => self.step2 = Some(stamp),
            Capacity::Admin => {
                metadata.insert("admin".to_string(), "true".to_string());
            }
        }
        if approval.direct && approval.capacity != Capacity::Auto {
            metadata.insert("direct".to_string(), "true".to_string());
        }
        self.status = approval.next;
        self.updated_at = at;

        let action = match approval.next {
            LeaveStatus::TlApproved => LogAction::TlApproved,
            _ => LogAction::Approved,
        };
        LogDraft {
            action,
            actor_uid: actor_uid.to_string(),
            at,
            metadata,
        }
    }

    pub fn apply_rejection(
        &mut self,
        actor_uid: &str,
        reason: Option<String>,
        at: TimeStamp,
    ) -> LogDraft {
        let reason = reason.filter(|r| !r.trim().is_empty());
        let mut metadata = BTreeMap::new();
        if let Some(reason) = &reason {
            metadata.insert("reason".to_string(), reason.clone());
        }
        self.rejection = Some(Rejection {
            actor_uid: actor_uid.to_string(),
            at,
            reason,
        });
        self.status = LeaveStatus::Rejected;
        self.updated_at = at;

        LogDraft {
            action: LogAction::Rejected,
            actor_uid: actor_uid.to_string(),
            at,
            metadata,
        }
    }

    pub fn apply_cancellation(
        &mut self,
        cancellation: &Cancellation,
        actor_uid: &str,
        at: TimeStamp,
    ) -> LogDraft {
        let mut metadata = BTreeMap::new();
        if cancellation.credit_back {
            metadata.insert(
                "credited_minutes".to_string(),
                self.requested_minutes.to_string(),
            );
        }
        self.status = LeaveStatus::Cancelled;
        self.updated_at = at;

        LogDraft {
            action: LogAction::Cancelled,
            actor_uid: actor_uid.to_string(),
            at,
            metadata,
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogAction {
    #[n(0)]
    Created,
    #[n(1)]
    TlApproved,
    #[n(2)]
    Approved,
    #[n(3)]
    Rejected,
    #[n(4)]
    Cancelled,
}

/// A log entry before it has an id and a parent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogDraft {
    pub action: LogAction,
    pub actor_uid: String,
    pub at: TimeStamp,
    pub metadata: BTreeMap<String, String>,
}

impl LogDraft {
    pub fn created(actor_uid: &str, at: TimeStamp) -> Self {
        Self {
            action: LogAction::Created,
            actor_uid: actor_uid.to_string(),
            at,
            metadata: BTreeMap::new(),
        }
    }

    pub fn into_log(self, id: String, request_id: &str) -> LeaveLog {
        LeaveLog {
            id,
            request_id: request_id.to_string(),
            action: self.action,
            actor_uid: self.actor_uid,
            at: self.at,
            metadata: self.metadata,
        }
    }
}

/// Append-only audit entry, one per transition
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct LeaveLog {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub request_id: String,
    #[n(2)]
    pub action: LogAction,
    #[n(3)]
    pub actor_uid: String,
    #[n(4)]
    pub at: TimeStamp,
    #[n(5)]
    pub metadata: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::Role;
    use crate::identity::Identity;
    use crate::request::LeaveType;

    fn profile(uid: &str, role: Role) -> UserProfile {
        let mut p = UserProfile::from_identity(&Identity::new(uid, format!("{uid}@example.com")));
        p.role = role;
        p.is_whitelisted = true;
        p.team_id = Some("team_1".into());
        p
    }

    fn team(lead: Option<&str>, manager: Option<&str>) -> Team {
        Team {
            id: "team_1".into(),
            name: "Platform".into(),
            lead_uid: lead.map(Into::into),
            manager_uid: manager.map(Into::into),
            created_at: TimeStamp::new(),
        }
    }

    fn request(employee: &str, status: LeaveStatus) -> LeaveRequest {
        let start = TimeStamp::new_with(2025, 5, 5, 9, 0, 0).unwrap();
        let end = TimeStamp::new_with(2025, 5, 5, 10, 0, 0).unwrap();
        LeaveRequest {
            id: "leave_1".into(),
            employee_uid: employee.into(),
            team_id: Some("team_1".into()),
            leave_type: LeaveType::Annual,
            start_at: start,
            end_at: end,
            requested_minutes: 60,
            status,
            note: None,
            step1: None,
            step2: None,
            rejection: None,
            created_at: start,
            updated_at: start,
        }
    }

    #[test]
    fn transition_table_matches_lifecycle() {
        use LeaveStatus::*;
        assert!(Submitted.can_transition_to(TlApproved));
        assert!(TlApproved.can_transition_to(Approved));
        assert!(Approved.can_transition_to(Cancelled));
        assert!(!Approved.can_transition_to(Rejected));
        assert!(!TlApproved.can_transition_to(TlApproved));
        assert!(Rejected.allowed_next().is_empty());
        assert!(Cancelled.allowed_next().is_empty());
    }

    #[test]
    fn lead_approval_goes_to_manager_when_one_exists() {
        let t = team(Some("lead"), Some("mgr"));
        let a = decide_approval(&profile("lead", Role::TeamLead), Some(&t), &request("emp", LeaveStatus::Submitted)).unwrap();
        assert_eq!(a.next, LeaveStatus::TlApproved);
        assert!(!a.debits_balance());
    }

    #[test]
    fn lead_approval_is_final_without_manager() {
        let t = team(Some("lead"), None);
        let a = decide_approval(&profile("lead", Role::TeamLead), Some(&t), &request("emp", LeaveStatus::Submitted)).unwrap();
        assert_eq!(a.next, LeaveStatus::Approved);
        assert!(a.direct);
        assert!(a.debits_balance());
    }

    #[test]
    fn lead_cannot_approve_own_request() {
        let t = team(Some("lead"), Some("mgr"));
        let err = decide_approval(&profile("lead", Role::TeamLead), Some(&t), &request("lead", LeaveStatus::Submitted)).unwrap_err();
        assert_eq!(err.to_string(), SELF_APPROVAL_LEAD);
    }

    #[test]
    fn manager_directly_approves_lead_request() {
        let t = team(Some("lead"), Some("mgr"));
        let a = decide_approval(&profile("mgr", Role::Manager), Some(&t), &request("lead", LeaveStatus::Submitted)).unwrap();
        assert_eq!(a.next, LeaveStatus::Approved);
        assert!(a.direct);
    }

    #[test]
    fn manager_cannot_skip_lead_for_regular_employee() {
        let t = team(Some("lead"), Some("mgr"));
        let err = decide_approval(&profile("mgr", Role::Manager), Some(&t), &request("emp", LeaveStatus::Submitted)).unwrap_err();
        assert_eq!(err.to_string(), NOT_ALLOWED_APPROVE);

        let a = decide_approval(&profile("mgr", Role::Manager), Some(&t), &request("emp", LeaveStatus::TlApproved)).unwrap();
        assert!(!a.direct);
    }

    #[test]
    fn admin_approves_without_team() {
        let a = decide_approval(&profile("root", Role::Admin), None, &request("emp", LeaveStatus::TlApproved)).unwrap();
        assert_eq!(a.capacity, Capacity::Admin);
        assert!(decide_approval(&profile("root", Role::Admin), None, &request("emp", LeaveStatus::Approved)).is_err());
    }

    #[test]
    fn outsider_cannot_reject() {
        let t = team(Some("lead"), Some("mgr"));
        let err = decide_rejection(&profile("other", Role::Manager), Some(&t), &request("emp", LeaveStatus::Submitted)).unwrap_err();
        assert_eq!(err.to_string(), NOT_ALLOWED_REJECT);
    }

    #[test]
    fn approved_requests_cancel_only_by_admin() {
        let req = request("emp", LeaveStatus::Approved);
        let err = decide_cancellation(&profile("emp", Role::Employee), &req).unwrap_err();
        assert_eq!(err.to_string(), ADMIN_ONLY_APPROVED_CANCEL);

        let c = decide_cancellation(&profile("root", Role::Admin), &req).unwrap();
        assert!(c.credit_back);
    }

    #[test]
    fn owner_cancels_pending_without_credit() {
        let c = decide_cancellation(&profile("emp", Role::Employee), &request("emp", LeaveStatus::TlApproved)).unwrap();
        assert!(!c.credit_back);
        let err = decide_cancellation(&profile("emp", Role::Employee), &request("emp", LeaveStatus::Rejected)).unwrap_err();
        assert_eq!(err.to_string(), NO_LONGER_CANCELLABLE);
    }

    #[test]
    fn auto_approval_marks_log() {
        let mut req = request("lead", LeaveStatus::Submitted);
        let approval = auto_approval(&req).unwrap();
        let log = req.apply_approval(&approval, "lead", TimeStamp::new());
        assert_eq!(req.status, LeaveStatus::Approved);
        assert!(req.step1.is_some());
        assert_eq!(log.metadata.get("auto").map(String::as_str), Some("true"));
    }

    #[test]
    fn rejection_keeps_reason_only_when_present() {
        let mut req = request("emp", LeaveStatus::Submitted);
        let log = req.apply_rejection("lead", Some("  ".into()), TimeStamp::new());
        assert!(log.metadata.is_empty());
        assert_eq!(req.rejection.as_ref().and_then(|r| r.reason.clone()), None);
        assert_eq!(req.status, LeaveStatus::Rejected);
    }
}
