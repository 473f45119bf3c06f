use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;

use crate::contract::{
    client::AttendanceApi,
    error::AttendanceError,
    model::{
        DaySummary, OrgId, RangeSummary, ResponseOutcome, RollCall, RollCallId, ScheduledShift,
        ShiftWindow, UserId,
    },
};
use crate::domain::service::Service;

/// Local implementation of the AttendanceApi trait that delegates to the domain service
pub struct AttendanceLocalClient {
    service: Arc<Service>,
}

impl AttendanceLocalClient {
    pub fn new(service: Arc<Service>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl AttendanceApi for AttendanceLocalClient {
    async fn windows_for_user(
        &self,
        user_id: UserId,
        reference: DateTime<Utc>,
    ) -> Result<Vec<ShiftWindow>, AttendanceError> {
        self.service
            .windows_for_user(user_id, reference)
            .await
            .map_err(Into::into)
    }

    async fn windows_for_day(
        &self,
        user_id: UserId,
        date: NaiveDate,
    ) -> Result<Vec<ShiftWindow>, AttendanceError> {
        self.service
            .windows_for_day(user_id, date)
            .await
            .map_err(Into::into)
    }

    async fn active_window(
        &self,
        user_id: UserId,
        instant: DateTime<Utc>,
    ) -> Result<Option<ShiftWindow>, AttendanceError> {
        self.service
            .active_window(user_id, instant)
            .await
            .map_err(Into::into)
    }

    async fn upcoming_schedule(
        &self,
        user_id: UserId,
        today: NaiveDate,
        days_ahead: u32,
    ) -> Result<Vec<ScheduledShift>, AttendanceError> {
        self.service
            .upcoming_schedule(user_id, today, days_ahead)
            .await
            .map_err(Into::into)
    }

    async fn can_start_before_shift(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
        tolerance_minutes: i64,
    ) -> Result<bool, AttendanceError> {
        self.service
            .can_start_before_shift(user_id, now, tolerance_minutes)
            .await
            .map_err(Into::into)
    }

    async fn summarize_day(
        &self,
        user_id: UserId,
        date: NaiveDate,
    ) -> Result<DaySummary, AttendanceError> {
        self.service
            .summarize_day(user_id, date)
            .await
            .map_err(Into::into)
    }

    async fn summarize_range(
        &self,
        user_id: UserId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<RangeSummary, AttendanceError> {
        self.service
            .summarize_range(user_id, start, end)
            .await
            .map_err(Into::into)
    }

    async fn organization_summary(
        &self,
        org_id: OrgId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RangeSummary>, AttendanceError> {
        self.service
            .organization_summary(org_id, start, end)
            .await
            .map_err(Into::into)
    }

    async fn schedule_for_current_hour(
        &self,
        org_id: OrgId,
        now: DateTime<Utc>,
        target_per_hour: Option<i64>,
    ) -> Result<Vec<RollCall>, AttendanceError> {
        self.service
            .schedule_for_current_hour(org_id, now, target_per_hour)
            .await
            .map_err(Into::into)
    }

    async fn tick(&self, now: DateTime<Utc>) -> Result<usize, AttendanceError> {
        self.service.tick(now).await.map_err(Into::into)
    }

    async fn expire_pending(&self, now: DateTime<Utc>) -> Result<u64, AttendanceError> {
        self.service.expire_pending(now).await.map_err(Into::into)
    }

    async fn classify_response(
        &self,
        roll_call_id: RollCallId,
        user_id: UserId,
        responded_at: DateTime<Utc>,
    ) -> Result<ResponseOutcome, AttendanceError> {
        self.service
            .classify_response(roll_call_id, user_id, responded_at)
            .await
            .map_err(Into::into)
    }

    async fn pending_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<RollCall>, AttendanceError> {
        self.service
            .pending_for_user(user_id, now)
            .await
            .map_err(Into::into)
    }
}
