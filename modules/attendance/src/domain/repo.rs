//! Ports for the domain layer: the persistence operations the engine needs.
//! Object-safe and async-friendly via `async_trait`. The repository is
//! responsible for the uniqueness guarantees called out per method.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::contract::model::{
    Deduction, DeductionKind, Employee, Leave, NewDeduction, NewRollCall, OrgId, Organization,
    RollCall, RollCallId, RollCallResolution, ShiftAssignment, ShiftTemplate, UserId,
    WorkSession,
};

/// Users, organizations and leave records. Read-only for the engine.
#[async_trait]
pub trait DirectoryRepository: Send + Sync {
    async fn find_employee(&self, id: UserId) -> anyhow::Result<Option<Employee>>;
    async fn find_organization(&self, id: OrgId) -> anyhow::Result<Option<Organization>>;
    async fn employees_in_org(&self, org_id: OrgId) -> anyhow::Result<Vec<Employee>>;
    /// Leave records of the organization with `from <= date <= to`.
    async fn leaves_between(
        &self,
        org_id: OrgId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> anyhow::Result<Vec<Leave>>;
}

#[async_trait]
pub trait ShiftRepository: Send + Sync {
    /// Every assignment of the user (any date range) joined with its template.
    async fn assignments_for_user(
        &self,
        user_id: UserId,
    ) -> anyhow::Result<Vec<(ShiftAssignment, ShiftTemplate)>>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Sessions of the user with `start <= started_at < end`, ordered by start.
    async fn sessions_started_between(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<WorkSession>>;
    /// WORK sessions of the organization that started at or before `at` and are still open.
    async fn open_work_sessions(
        &self,
        org_id: OrgId,
        at: DateTime<Utc>,
    ) -> anyhow::Result<Vec<WorkSession>>;
    /// Distinct organizations that have logged at least one session.
    async fn organizations_with_sessions(&self) -> anyhow::Result<Vec<OrgId>>;
}

#[async_trait]
pub trait DeductionRepository: Send + Sync {
    async fn deductions_for_day(
        &self,
        user_id: UserId,
        date: NaiveDate,
        kind: DeductionKind,
    ) -> anyhow::Result<Vec<Deduction>>;
    /// Create or overwrite the single OVERBREAK row of `(user, date)` atomically.
    async fn upsert_overbreak(&self, deduction: NewDeduction) -> anyhow::Result<Deduction>;
    /// Returns true if a row was deleted.
    async fn delete_overbreak(&self, user_id: UserId, date: NaiveDate) -> anyhow::Result<bool>;
    async fn insert_deduction(&self, deduction: NewDeduction) -> anyhow::Result<Deduction>;
}

#[async_trait]
pub trait RollCallRepository: Send + Sync {
    async fn find_roll_call(&self, id: RollCallId) -> anyhow::Result<Option<RollCall>>;
    /// Roll-calls of the organization with `start <= triggered_at < end`, oldest first.
    async fn roll_calls_in_bucket(
        &self,
        org_id: OrgId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<RollCall>>;
    async fn roll_calls_for_user_between(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<RollCall>>;
    /// Insert a PENDING roll-call. `Ok(None)` when the `(org, hour_bucket, slot)`
    /// or `(user, hour_bucket)` uniqueness is already taken.
    async fn insert_roll_call(&self, roll_call: NewRollCall) -> anyhow::Result<Option<RollCall>>;
    /// Compare-and-set: apply `resolution` only if the row is still PENDING.
    /// Returns true if this call performed the transition.
    async fn resolve_pending(
        &self,
        id: RollCallId,
        resolution: RollCallResolution,
    ) -> anyhow::Result<bool>;
    /// Same compare-and-set, with `deduction` recorded in the same unit of
    /// work. Either both land or neither does.
    async fn resolve_pending_with_deduction(
        &self,
        id: RollCallId,
        resolution: RollCallResolution,
        deduction: NewDeduction,
    ) -> anyhow::Result<bool>;
    /// Flip every PENDING row with `deadline_at < now` to MISSED; returns the count.
    async fn expire_pending(&self, now: DateTime<Utc>) -> anyhow::Result<u64>;
    /// Most recent PENDING roll-call with `triggered_at <= now < deadline_at`.
    async fn latest_pending_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<RollCall>>;
}

/// The full set of ports, shared by the engine components.
#[derive(Clone)]
pub struct Repositories {
    pub directory: Arc<dyn DirectoryRepository>,
    pub shifts: Arc<dyn ShiftRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub deductions: Arc<dyn DeductionRepository>,
    pub roll_calls: Arc<dyn RollCallRepository>,
}

impl Repositories {
    /// Use one backing store for every port.
    pub fn from_shared<R>(repo: Arc<R>) -> Self
    where
        R: DirectoryRepository
            + ShiftRepository
            + SessionRepository
            + DeductionRepository
            + RollCallRepository
            + 'static,
    {
        Self {
            directory: repo.clone(),
            shifts: repo.clone(),
            sessions: repo.clone(),
            deductions: repo.clone(),
            roll_calls: repo,
        }
    }
}
