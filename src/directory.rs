//! Teams and user profiles. These are the facts the approval rules read:
//! who leads or manages a team, who is an admin, and who may use the app at all.
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;

use super::error::LeaveError;
use super::identity::Identity;
use super::request::TimeStamp;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    #[default]
    #[n(0)]
    Employee,
    #[n(1)]
    TeamLead,
    #[n(2)]
    Manager,
    #[n(3)]
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Employee => "employee",
            Role::TeamLead => "team_lead",
            Role::Manager => "manager",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = LeaveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "employee" => Ok(Role::Employee),
            "team_lead" => Ok(Role::TeamLead),
            "manager" => Ok(Role::Manager),
            "admin" => Ok(Role::Admin),
            _ => Err(LeaveError::validation(format!("Invalid role: {s}"))),
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Team {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub lead_uid: Option<String>,
    #[n(3)]
    pub manager_uid: Option<String>,
    #[n(4)]
    pub created_at: TimeStamp,
}

impl Team {
    pub fn is_lead(&self, uid: &str) -> bool {
        self.lead_uid.as_deref() == Some(uid)
    }

    pub fn is_manager(&self, uid: &str) -> bool {
        self.manager_uid.as_deref() == Some(uid)
    }

    pub fn has_manager(&self) -> bool {
        self.manager_uid.is_some()
    }

    /// Case-insensitive key used for the unique-name check
    pub fn name_key(name: &str) -> String {
        name.trim().to_lowercase()
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    #[n(0)]
    pub uid: String,
    #[n(1)]
    pub email: String,
    #[n(2)]
    pub display_name: Option<String>,
    #[n(3)]
    pub photo_url: Option<String>,
    #[n(4)]
    pub is_whitelisted: bool,
    #[n(5)]
    pub role: Role,
    #[n(6)]
    pub team_id: Option<String>,
    // days since CE, NaiveDate has no CBOR impl
    #[n(7)]
    pub join_date: Option<i32>,
    #[n(8)]
    pub created_at: TimeStamp,
}

impl UserProfile {
    /// Profile for a first sign-in. Access stays closed until an admin
    /// whitelists the account.
    pub fn from_identity(identity: &Identity) -> Self {
        Self {
            uid: identity.uid.clone(),
            email: identity.email.clone(),
            display_name: identity.display_name.clone(),
            photo_url: identity.photo_url.clone(),
            is_whitelisted: false,
            role: Role::Employee,
            team_id: None,
            join_date: None,
            created_at: TimeStamp::new(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn join_date(&self) -> Option<NaiveDate> {
        self.join_date.and_then(NaiveDate::from_num_days_from_ce_opt)
    }

    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.email)
    }

    /// Fails unless the account may use the application
    pub fn ensure_active(&self) -> Result<(), LeaveError> {
        if !self.is_whitelisted {
            return Err(LeaveError::unauthorized(
                "Your account is not authorized to use this application.",
            ));
        }
        Ok(())
    }

    pub fn ensure_admin(&self, action: &str) -> Result<(), LeaveError> {
        if !self.is_admin() {
            return Err(LeaveError::unauthorized(format!(
                "Only admins can {action}."
            )));
        }
        Ok(())
    }
}

/// Fields an admin may change on a profile. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserUpdate {
    pub is_whitelisted: Option<bool>,
    pub role: Option<Role>,
    pub team_id: Option<Option<String>>,
    pub join_date: Option<NaiveDate>,
}

impl UserUpdate {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_whitelisted(mut self, value: bool) -> Self {
        self.is_whitelisted = Some(value);
        self
    }
    pub fn set_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }
    pub fn set_team(mut self, team_id: Option<String>) -> Self {
        self.team_id = Some(team_id);
        self
    }
    pub fn set_join_date(mut self, date: NaiveDate) -> Self {
        self.join_date = Some(date);
        self
    }

    /// Applies the update in place. The join date can be written once.
    pub fn apply_to(&self, profile: &mut UserProfile) -> Result<(), LeaveError> {
        if let Some(date) = self.join_date {
            let days = chrono::Datelike::num_days_from_ce(&date);
            match profile.join_date {
                Some(existing) if existing != days => {
                    return Err(LeaveError::validation(
                        "Join date cannot be changed once set.",
                    ));
                }
                _ => profile.join_date = Some(days),
            }
        }
        if let Some(value) = self.is_whitelisted {
            profile.is_whitelisted = value;
        }
        if let Some(role) = self.role {
            profile.role = role;
        }
        if let Some(team_id) = &self.team_id {
            profile.team_id = team_id.clone();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_date_is_write_once() {
        let mut profile = UserProfile::from_identity(&Identity::new("u1", "u1@example.com"));
        let date = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();

        UserUpdate::new().set_join_date(date).apply_to(&mut profile).unwrap();
        assert_eq!(profile.join_date(), Some(date));

        // same value again is fine
        UserUpdate::new().set_join_date(date).apply_to(&mut profile).unwrap();

        let other = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let err = UserUpdate::new()
            .set_join_date(other)
            .apply_to(&mut profile)
            .unwrap_err();
        assert_eq!(err.to_string(), "Join date cannot be changed once set.");
    }

    #[test]
    fn new_profiles_are_not_whitelisted() {
        let profile = UserProfile::from_identity(&Identity::new("u1", "u1@example.com"));
        assert!(profile.ensure_active().is_err());
        assert_eq!(profile.role, Role::Employee);
    }

    #[test]
    fn team_name_key_ignores_case_and_padding() {
        assert_eq!(Team::name_key("  Platform "), Team::name_key("PLATFORM"));
    }
}
