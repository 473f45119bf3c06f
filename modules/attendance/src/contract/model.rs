use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type OrgId = i64;
pub type UserId = i64;
pub type TemplateId = i64;
pub type AssignmentId = i64;
pub type SessionId = i64;
pub type RollCallId = i64;
pub type DeductionId = i64;

/// Raised when a persisted enum column holds an unexpected value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind} value '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionKind {
    Work,
    Lunch,
    ShortBreak,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Work => "WORK",
            Self::Lunch => "LUNCH",
            Self::ShortBreak => "SHORT_BREAK",
        }
    }
}

impl FromStr for SessionKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WORK" => Ok(Self::Work),
            "LUNCH" => Ok(Self::Lunch),
            "SHORT_BREAK" => Ok(Self::ShortBreak),
            other => Err(UnknownVariant {
                kind: "session kind",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeductionKind {
    Overbreak,
    Rollcall,
}

impl DeductionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Overbreak => "OVERBREAK",
            Self::Rollcall => "ROLLCALL",
        }
    }
}

impl FromStr for DeductionKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OVERBREAK" => Ok(Self::Overbreak),
            "ROLLCALL" => Ok(Self::Rollcall),
            other => Err(UnknownVariant {
                kind: "deduction kind",
                value: other.to_string(),
            }),
        }
    }
}

/// Roll-call lifecycle. `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RollCallResult {
    Pending,
    Passed,
    Late,
    Missed,
}

impl RollCallResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Passed => "PASSED",
            Self::Late => "LATE",
            Self::Missed => "MISSED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for RollCallResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RollCallResult {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PASSED" => Ok(Self::Passed),
            "LATE" => Ok(Self::Late),
            "MISSED" => Ok(Self::Missed),
            other => Err(UnknownVariant {
                kind: "roll-call result",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeaveKind {
    Leave,
    DayOff,
}

impl LeaveKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Leave => "LEAVE",
            Self::DayOff => "DAY_OFF",
        }
    }
}

impl FromStr for LeaveKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LEAVE" => Ok(Self::Leave),
            "DAY_OFF" => Ok(Self::DayOff),
            other => Err(UnknownVariant {
                kind: "leave kind",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrgId,
    pub name: String,
    pub timezone: Option<String>,
    /// Free-form settings bag; `rollcalls_per_hour` drives the scheduler.
    pub settings: Option<serde_json::Value>,
}

/// The slice of a user record the engine reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: UserId,
    pub org_id: OrgId,
    pub is_active: bool,
    /// IANA zone name; the literal "device" means the user never picked one.
    pub timezone: Option<String>,
    pub allow_unassigned_sessions: bool,
}

/// Weekly recurring shift rule. `day_of_week` counts from Monday = 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftTemplate {
    pub id: TemplateId,
    pub org_id: OrgId,
    pub name: Option<String>,
    pub day_of_week: u8,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub timezone: Option<String>,
}

impl ShiftTemplate {
    pub fn crosses_midnight(&self) -> bool {
        self.end_time <= self.start_time
    }
}

/// Binds a user to a template for `[effective_from, effective_to)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftAssignment {
    pub id: AssignmentId,
    pub template_id: TemplateId,
    pub user_id: UserId,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,
}

impl ShiftAssignment {
    pub fn covers(&self, date: NaiveDate) -> bool {
        date >= self.effective_from && self.effective_to.map_or(true, |to| date < to)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkSession {
    pub id: SessionId,
    pub org_id: OrgId,
    pub user_id: UserId,
    pub kind: SessionKind,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leave {
    pub id: i64,
    pub org_id: OrgId,
    pub user_id: UserId,
    pub date: NaiveDate,
    pub kind: LeaveKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deduction {
    pub id: DeductionId,
    pub org_id: OrgId,
    pub user_id: UserId,
    pub date: NaiveDate,
    pub kind: DeductionKind,
    pub minutes: i64,
    pub description: Option<String>,
    pub related_session_id: Option<SessionId>,
    pub related_roll_call_id: Option<RollCallId>,
}

/// Deduction fields computed by the domain; the repository assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDeduction {
    pub org_id: OrgId,
    pub user_id: UserId,
    pub date: NaiveDate,
    pub kind: DeductionKind,
    pub minutes: i64,
    pub description: Option<String>,
    pub related_session_id: Option<SessionId>,
    pub related_roll_call_id: Option<RollCallId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollCall {
    pub id: RollCallId,
    pub org_id: OrgId,
    pub user_id: UserId,
    pub triggered_at: DateTime<Utc>,
    pub deadline_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub result: RollCallResult,
    /// Seconds beyond the grace period, set for LATE responses.
    pub response_delay_seconds: Option<i64>,
}

/// A PENDING roll-call about to be persisted.
///
/// `hour_bucket` + `slot` and `user_id` + `hour_bucket` are unique in storage,
/// so two concurrent ticks cannot both claim the same slot or user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRollCall {
    pub org_id: OrgId,
    pub user_id: UserId,
    pub triggered_at: DateTime<Utc>,
    pub deadline_at: DateTime<Utc>,
    pub hour_bucket: DateTime<Utc>,
    pub slot: i32,
}

/// Terminal transition applied to a PENDING roll-call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollCallResolution {
    pub result: RollCallResult,
    pub responded_at: Option<DateTime<Utc>>,
    pub response_delay_seconds: Option<i64>,
}

/// Where a shift window came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowSource {
    /// A real occurrence of a template through an assignment.
    Assigned {
        template_id: TemplateId,
        assignment_id: AssignmentId,
    },
    /// All-day window synthesized for users with unassigned-session access.
    Unassigned,
}

/// One concrete occurrence of a shift, localized and in UTC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShiftWindow {
    pub source: WindowSource,
    pub org_id: OrgId,
    pub user_id: UserId,
    pub timezone: Tz,
    pub local_start: DateTime<Tz>,
    pub local_end: DateTime<Tz>,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
}

impl ShiftWindow {
    /// Half-open containment: `start_utc <= instant < end_utc`.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start_utc <= instant && instant < self.end_utc
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_utc < end && start < self.end_utc
    }

    pub fn duration(&self) -> Duration {
        self.end_utc - self.start_utc
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.source, WindowSource::Unassigned)
    }

    pub fn template_id(&self) -> Option<TemplateId> {
        match self.source {
            WindowSource::Assigned { template_id, .. } => Some(template_id),
            WindowSource::Unassigned => None,
        }
    }
}

/// Display view of an upcoming assigned shift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledShift {
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
    pub source_timezone: String,
}

/// Per-day attendance figures consumed by reporting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DaySummary {
    pub work_minutes: i64,
    pub lunch_minutes: i64,
    pub break_minutes: i64,
    pub overbreak_minutes: i64,
    pub rollcall_deduction_minutes: i64,
    pub net_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeSummary {
    pub user_id: UserId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days: u32,
    pub work_minutes: i64,
    pub lunch_minutes: i64,
    pub break_minutes: i64,
    pub overbreak_minutes: i64,
    pub rollcall_deduction_minutes: i64,
    /// Sum of daily net hours, rounded to 2 decimals.
    pub net_hours: f64,
    pub sessions_count: u32,
    pub rollcall_passed: u32,
    pub rollcall_late: u32,
    pub rollcall_missed: u32,
}

/// What happened to a user's acknowledgement of a roll-call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseOutcome {
    Passed,
    Late {
        response_delay_seconds: i64,
        deduction_minutes: i64,
    },
    /// Unknown id, someone else's roll-call, or no longer PENDING.
    Rejected,
}

impl ResponseOutcome {
    pub fn result(&self) -> Option<RollCallResult> {
        match self {
            Self::Passed => Some(RollCallResult::Passed),
            Self::Late { .. } => Some(RollCallResult::Late),
            Self::Rejected => None,
        }
    }
}
