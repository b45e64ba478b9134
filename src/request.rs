//! Core leave request types and the draft builder used to create them
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, TimeZone, Utc, Weekday};

use super::error::LeaveError;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, Ord, PartialEq, PartialOrd, Hash)]
pub enum LeaveType {
    #[n(0)]
    Annual,
    #[n(1)]
    Sick,
    #[n(2)]
    Unpaid,
    #[n(3)]
    Other,
}

impl LeaveType {
    pub const ALL: [LeaveType; 4] = [Self::Annual, Self::Sick, Self::Unpaid, Self::Other];

    pub fn as_str(&self) -> &'static str {
        match self {
            LeaveType::Annual => "annual",
            LeaveType::Sick => "sick",
            LeaveType::Unpaid => "unpaid",
            LeaveType::Other => "other",
        }
    }
}

impl fmt::Display for LeaveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeaveType {
    type Err = LeaveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "annual" => Ok(LeaveType::Annual),
            "sick" => Ok(LeaveType::Sick),
            "unpaid" => Ok(LeaveType::Unpaid),
            "other" => Ok(LeaveType::Other),
            _ => Err(LeaveError::validation(format!("Invalid leave type: {s}"))),
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum LeaveStatus {
    #[n(0)]
    Submitted,
    #[n(1)]
    TlApproved,
    #[n(2)]
    Approved,
    #[n(3)]
    Rejected,
    #[n(4)]
    Cancelled,
}

impl LeaveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaveStatus::Submitted => "SUBMITTED",
            LeaveStatus::TlApproved => "TL_APPROVED",
            LeaveStatus::Approved => "APPROVED",
            LeaveStatus::Rejected => "REJECTED",
            LeaveStatus::Cancelled => "CANCELLED",
        }
    }

    /// Rejected and cancelled requests never move again
    pub fn is_terminal(&self) -> bool {
        matches!(self, LeaveStatus::Rejected | LeaveStatus::Cancelled)
    }
}

impl fmt::Display for LeaveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct TimeStamp(DateTime<Utc>);

impl TimeStamp {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        min: u32,
        sec: u32,
    ) -> Option<Self> {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .map(Self)
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
    pub fn year(&self) -> i32 {
        self.0.year()
    }
}

impl Default for TimeStamp {
    fn default() -> Self {
        Self::new()
    }
}

impl From<DateTime<Utc>> for TimeStamp {
    fn from(value: DateTime<Utc>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

/// Who moved a request forward, and when
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct ApprovalStamp {
    #[n(0)]
    pub actor_uid: String,
    #[n(1)]
    pub at: TimeStamp,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    #[n(0)]
    pub actor_uid: String,
    #[n(1)]
    pub at: TimeStamp,
    #[n(2)]
    pub reason: Option<String>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct LeaveRequest {
    #[n(0)]
    pub id: String, // bech32 encoded uuid7, hrp "leave_"
    #[n(1)]
    pub employee_uid: String,
    #[n(2)]
    pub team_id: Option<String>,
    #[n(3)]
    pub leave_type: LeaveType,
    #[n(4)]
    pub start_at: TimeStamp,
    #[n(5)]
    pub end_at: TimeStamp,
    #[n(6)]
    pub requested_minutes: i64,
    #[n(7)]
    pub status: LeaveStatus,
    #[n(8)]
    pub note: Option<String>,
    #[n(9)]
    pub step1: Option<ApprovalStamp>,
    #[n(10)]
    pub step2: Option<ApprovalStamp>,
    #[n(11)]
    pub rejection: Option<Rejection>,
    #[n(12)]
    pub created_at: TimeStamp,
    #[n(13)]
    pub updated_at: TimeStamp,
}

impl LeaveRequest {
    /// Balance year the request is charged against
    pub fn ledger_year(&self) -> i32 {
        self.start_at.year()
    }

    pub fn overlaps(&self, start: TimeStamp, end: TimeStamp) -> bool {
        intervals_overlap(self.start_at, self.end_at, start, end)
    }
}

/// Half-open `[start, end)` overlap test
pub fn intervals_overlap(
    a_start: TimeStamp,
    a_end: TimeStamp,
    b_start: TimeStamp,
    b_end: TimeStamp,
) -> bool {
    a_start < b_end && b_start < a_end
}

/// How the duration of a request is turned into minutes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Accounting {
    /// Wall-clock minutes between the two instants
    #[default]
    Calendar,
    /// Only minutes falling on Monday to Friday (UTC)
    Working,
}

impl FromStr for Accounting {
    type Err = LeaveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "calendar" => Ok(Accounting::Calendar),
            "working" => Ok(Accounting::Working),
            _ => Err(LeaveError::validation(format!("Invalid accounting mode: {s}"))),
        }
    }
}

pub fn requested_minutes(start: TimeStamp, end: TimeStamp, accounting: Accounting) -> i64 {
    let (start, end) = (start.to_datetime_utc(), end.to_datetime_utc());
    if end <= start {
        return 0;
    }
    match accounting {
        Accounting::Calendar => (end - start).num_minutes(),
        Accounting::Working => working_seconds(start, end) / 60,
    }
}

fn working_seconds(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    let mut cursor = start;
    let mut total = 0;

    while cursor < end {
        let next_midnight = cursor
            .date_naive()
            .succ_opt()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|d| d.and_utc());
        let Some(next_midnight) = next_midnight else {
            break;
        };
        let segment_end = next_midnight.min(end);
        if !matches!(cursor.weekday(), Weekday::Sat | Weekday::Sun) {
            total += (segment_end - cursor).num_seconds();
        }
        cursor = segment_end;
    }
    total
}

/// Builder for a new leave request, validated before anything is written
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LeaveRequestDraft {
    leave_type: Option<LeaveType>,
    start_at: Option<TimeStamp>,
    end_at: Option<TimeStamp>,
    note: Option<String>,
}

impl LeaveRequestDraft {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_leave_type(mut self, leave_type: LeaveType) -> Self {
        self.leave_type = Some(leave_type);
        self
    }
    pub fn set_start(mut self, start: TimeStamp) -> Self {
        self.start_at = Some(start);
        self
    }
    pub fn set_end(mut self, end: TimeStamp) -> Self {
        self.end_at = Some(end);
        self
    }
    pub fn set_note(mut self, note: impl Into<String>) -> Self {
        let note = note.into();
        self.note = (!note.trim().is_empty()).then_some(note);
        self
    }

    /// Checks required fields and time ordering, returning the parts of a
    /// request plus its duration in minutes
    pub fn validate_and_finalise(
        &self,
        accounting: Accounting,
    ) -> Result<ValidatedDraft, LeaveError> {
        let leave_type = self
            .leave_type
            .ok_or_else(|| LeaveError::validation("Leave type is required."))?;
        let (Some(start_at), Some(end_at)) = (self.start_at, self.end_at) else {
            return Err(LeaveError::validation("Start and end time are required."));
        };
        if end_at <= start_at {
            return Err(LeaveError::validation("End time must be after start time."));
        }
        let minutes = requested_minutes(start_at, end_at, accounting);
        if minutes <= 0 {
            return Err(LeaveError::validation(
                "Leave duration must be greater than zero.",
            ));
        }

        Ok(ValidatedDraft {
            leave_type,
            start_at,
            end_at,
            requested_minutes: minutes,
            note: self.note.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedDraft {
    pub leave_type: LeaveType,
    pub start_at: TimeStamp,
    pub end_at: TimeStamp,
    pub requested_minutes: i64,
    pub note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(day: u32, hour: u32) -> TimeStamp {
        TimeStamp::new_with(2025, 3, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn timestamp_encoding() {
        let original = TimeStamp::new();

        let encoding = minicbor::to_vec(original).unwrap();
        let decode: TimeStamp = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn calendar_minutes_span_weekends() {
        // 2025-03-07 is a Friday
        assert_eq!(requested_minutes(ts(7, 9), ts(10, 9), Accounting::Calendar), 3 * 24 * 60);
    }

    #[test]
    fn working_minutes_skip_weekends() {
        // Friday 09:00 to Monday 09:00: 15h on Friday, 9h on Monday
        assert_eq!(requested_minutes(ts(7, 9), ts(10, 9), Accounting::Working), 24 * 60);
        // Saturday only
        assert_eq!(requested_minutes(ts(8, 9), ts(8, 17), Accounting::Working), 0);
    }

    #[test]
    fn overlap_is_half_open() {
        assert!(intervals_overlap(ts(3, 9), ts(3, 12), ts(3, 11), ts(3, 13)));
        assert!(!intervals_overlap(ts(3, 9), ts(3, 12), ts(3, 12), ts(3, 13)));
    }

    #[test]
    fn draft_rejects_reversed_times() {
        let draft = LeaveRequestDraft::new()
            .set_leave_type(LeaveType::Annual)
            .set_start(ts(4, 12))
            .set_end(ts(4, 9));

        let err = draft.validate_and_finalise(Accounting::Calendar).unwrap_err();
        assert_eq!(err.to_string(), "End time must be after start time.");
    }

    #[test]
    fn draft_rejects_weekend_only_working_request() {
        let draft = LeaveRequestDraft::new()
            .set_leave_type(LeaveType::Sick)
            .set_start(ts(8, 9))
            .set_end(ts(8, 17));

        let err = draft.validate_and_finalise(Accounting::Working).unwrap_err();
        assert_eq!(err.to_string(), "Leave duration must be greater than zero.");
    }

    #[test]
    fn blank_note_is_dropped() {
        let draft = LeaveRequestDraft::new()
            .set_leave_type(LeaveType::Annual)
            .set_start(ts(4, 9))
            .set_end(ts(4, 10))
            .set_note("   ");

        let done = draft.validate_and_finalise(Accounting::Calendar).unwrap();
        assert_eq!(done.note, None);
        assert_eq!(done.requested_minutes, 60);
    }

    #[test]
    fn leave_type_parses_case_insensitively() {
        assert_eq!("Annual".parse::<LeaveType>().unwrap(), LeaveType::Annual);
        assert!("holiday".parse::<LeaveType>().is_err());
    }
}
