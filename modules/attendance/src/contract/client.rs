use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::contract::{
    error::AttendanceError,
    model::{
        DaySummary, OrgId, RangeSummary, ResponseOutcome, RollCall, RollCallId, ScheduledShift,
        ShiftWindow, UserId,
    },
};

/// Public API trait for the attendance engine that other modules can use
#[async_trait]
pub trait AttendanceApi: Send + Sync {
    /// Assigned shift occurrences around a reference instant
    async fn windows_for_user(
        &self,
        user_id: UserId,
        reference: DateTime<Utc>,
    ) -> Result<Vec<ShiftWindow>, AttendanceError>;

    /// Windows overlapping the user's local day, sorted by start
    async fn windows_for_day(
        &self,
        user_id: UserId,
        date: NaiveDate,
    ) -> Result<Vec<ShiftWindow>, AttendanceError>;

    /// The assigned shift the user is in at `instant`, if any
    async fn active_window(
        &self,
        user_id: UserId,
        instant: DateTime<Utc>,
    ) -> Result<Option<ShiftWindow>, AttendanceError>;

    async fn upcoming_schedule(
        &self,
        user_id: UserId,
        today: NaiveDate,
        days_ahead: u32,
    ) -> Result<Vec<ScheduledShift>, AttendanceError>;

    async fn can_start_before_shift(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
        tolerance_minutes: i64,
    ) -> Result<bool, AttendanceError>;

    /// Day summary; reconciles the day's overbreak deduction
    async fn summarize_day(
        &self,
        user_id: UserId,
        date: NaiveDate,
    ) -> Result<DaySummary, AttendanceError>;

    /// Read-only summary over an inclusive date range
    async fn summarize_range(
        &self,
        user_id: UserId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<RangeSummary, AttendanceError>;

    async fn organization_summary(
        &self,
        org_id: OrgId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RangeSummary>, AttendanceError>;

    /// Schedule roll-calls for the organization's current UTC hour
    async fn schedule_for_current_hour(
        &self,
        org_id: OrgId,
        now: DateTime<Utc>,
        target_per_hour: Option<i64>,
    ) -> Result<Vec<RollCall>, AttendanceError>;

    /// Schedule every organization with sessions; returns the number scheduled
    async fn tick(&self, now: DateTime<Utc>) -> Result<usize, AttendanceError>;

    /// Mark overdue pending roll-calls as missed
    async fn expire_pending(&self, now: DateTime<Utc>) -> Result<u64, AttendanceError>;

    async fn classify_response(
        &self,
        roll_call_id: RollCallId,
        user_id: UserId,
        responded_at: DateTime<Utc>,
    ) -> Result<ResponseOutcome, AttendanceError>;

    /// The roll-call the user should be prompted for right now
    async fn pending_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<RollCall>, AttendanceError>;
}
