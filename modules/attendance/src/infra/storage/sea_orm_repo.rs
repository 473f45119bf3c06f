//! SeaORM-backed implementation of the domain ports.
//!
//! This struct is generic over `C: ConnectionTrait`, so you can construct it
//! with a `DatabaseConnection` **or** a transactional connection.

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, NotSet, QueryFilter, QueryOrder,
    QuerySelect, Set, SqlErr, TransactionTrait,
};

use crate::contract::model::{
    Deduction, DeductionKind, Employee, Leave, NewDeduction, NewRollCall, OrgId, Organization,
    RollCall, RollCallId, RollCallResolution, RollCallResult, SessionKind, ShiftAssignment,
    ShiftTemplate, UserId, WorkSession,
};
use crate::domain::repo::{
    DeductionRepository, DirectoryRepository, RollCallRepository, SessionRepository,
    ShiftRepository,
};
use crate::infra::storage::entity::{
    deduction, leave, organization, roll_call, shift_assignment, shift_template, user,
    work_session,
};
use crate::infra::storage::mapper::convert_all;

/// Unique key of the single OVERBREAK row of a user's day.
pub fn overbreak_key(user_id: UserId, date: NaiveDate) -> String {
    format!("overbreak:{user_id}:{date}")
}

/// SeaORM repository impl.
/// Holds a connection object; its lifetime/ownership is up to the caller.
pub struct SeaOrmAttendanceRepository<C>
where
    C: ConnectionTrait + Send + Sync,
{
    conn: C,
}

impl<C> SeaOrmAttendanceRepository<C>
where
    C: ConnectionTrait + Send + Sync,
{
    pub fn new(conn: C) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }
}

#[async_trait::async_trait]
impl<C> DirectoryRepository for SeaOrmAttendanceRepository<C>
where
    C: ConnectionTrait + Send + Sync + 'static,
{
    async fn find_employee(&self, id: UserId) -> anyhow::Result<Option<Employee>> {
        let found = user::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("find_employee failed")?;
        Ok(found.map(Into::into))
    }

    async fn find_organization(&self, id: OrgId) -> anyhow::Result<Option<Organization>> {
        let found = organization::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("find_organization failed")?;
        Ok(found.map(Into::into))
    }

    async fn employees_in_org(&self, org_id: OrgId) -> anyhow::Result<Vec<Employee>> {
        let rows = user::Entity::find()
            .filter(user::Column::OrgId.eq(org_id))
            .order_by_asc(user::Column::Id)
            .all(&self.conn)
            .await
            .context("employees_in_org failed")?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn leaves_between(
        &self,
        org_id: OrgId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> anyhow::Result<Vec<Leave>> {
        let rows = leave::Entity::find()
            .filter(leave::Column::OrgId.eq(org_id))
            .filter(leave::Column::Date.gte(from))
            .filter(leave::Column::Date.lte(to))
            .all(&self.conn)
            .await
            .context("leaves_between failed")?;
        Ok(convert_all(rows)?)
    }
}

#[async_trait::async_trait]
impl<C> ShiftRepository for SeaOrmAttendanceRepository<C>
where
    C: ConnectionTrait + Send + Sync + 'static,
{
    async fn assignments_for_user(
        &self,
        user_id: UserId,
    ) -> anyhow::Result<Vec<(ShiftAssignment, ShiftTemplate)>> {
        let rows = shift_assignment::Entity::find()
            .filter(shift_assignment::Column::UserId.eq(user_id))
            .order_by_asc(shift_assignment::Column::Id)
            .find_also_related(shift_template::Entity)
            .all(&self.conn)
            .await
            .context("assignments_for_user failed")?;
        Ok(rows
            .into_iter()
            .filter_map(|(assignment, template)| {
                template.map(|t| (assignment.into(), t.into()))
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl<C> SessionRepository for SeaOrmAttendanceRepository<C>
where
    C: ConnectionTrait + Send + Sync + 'static,
{
    async fn sessions_started_between(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<WorkSession>> {
        let rows = work_session::Entity::find()
            .filter(work_session::Column::UserId.eq(user_id))
            .filter(work_session::Column::StartedAt.gte(start))
            .filter(work_session::Column::StartedAt.lt(end))
            .order_by_asc(work_session::Column::StartedAt)
            .all(&self.conn)
            .await
            .context("sessions_started_between failed")?;
        Ok(convert_all(rows)?)
    }

    async fn open_work_sessions(
        &self,
        org_id: OrgId,
        at: DateTime<Utc>,
    ) -> anyhow::Result<Vec<WorkSession>> {
        let rows = work_session::Entity::find()
            .filter(work_session::Column::OrgId.eq(org_id))
            .filter(work_session::Column::Kind.eq(SessionKind::Work.as_str()))
            .filter(work_session::Column::StartedAt.lte(at))
            .filter(work_session::Column::EndedAt.is_null())
            .all(&self.conn)
            .await
            .context("open_work_sessions failed")?;
        Ok(convert_all(rows)?)
    }

    async fn organizations_with_sessions(&self) -> anyhow::Result<Vec<OrgId>> {
        let ids: Vec<i64> = work_session::Entity::find()
            .select_only()
            .column(work_session::Column::OrgId)
            .distinct()
            .order_by_asc(work_session::Column::OrgId)
            .into_tuple()
            .all(&self.conn)
            .await
            .context("organizations_with_sessions failed")?;
        Ok(ids)
    }
}

#[async_trait::async_trait]
impl<C> DeductionRepository for SeaOrmAttendanceRepository<C>
where
    C: ConnectionTrait + Send + Sync + 'static,
{
    async fn deductions_for_day(
        &self,
        user_id: UserId,
        date: NaiveDate,
        kind: DeductionKind,
    ) -> anyhow::Result<Vec<Deduction>> {
        let rows = deduction::Entity::find()
            .filter(deduction::Column::UserId.eq(user_id))
            .filter(deduction::Column::Date.eq(date))
            .filter(deduction::Column::Kind.eq(kind.as_str()))
            .order_by_asc(deduction::Column::Id)
            .all(&self.conn)
            .await
            .context("deductions_for_day failed")?;
        Ok(convert_all(rows)?)
    }

    async fn upsert_overbreak(&self, d: NewDeduction) -> anyhow::Result<Deduction> {
        let key = overbreak_key(d.user_id, d.date);
        let m = deduction::ActiveModel {
            id: NotSet,
            org_id: Set(d.org_id),
            user_id: Set(d.user_id),
            date: Set(d.date),
            kind: Set(DeductionKind::Overbreak.as_str().to_string()),
            minutes: Set(d.minutes),
            description: Set(d.description),
            related_session_id: Set(d.related_session_id),
            related_roll_call_id: Set(d.related_roll_call_id),
            singleton_key: Set(Some(key.clone())),
        };
        deduction::Entity::insert(m)
            .on_conflict(
                OnConflict::column(deduction::Column::SingletonKey)
                    .update_columns([
                        deduction::Column::Minutes,
                        deduction::Column::Description,
                        deduction::Column::RelatedSessionId,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.conn)
            .await
            .context("upsert_overbreak failed")?;

        let row = deduction::Entity::find()
            .filter(deduction::Column::SingletonKey.eq(key))
            .one(&self.conn)
            .await
            .context("upsert_overbreak reload failed")?
            .ok_or_else(|| anyhow::anyhow!("overbreak row missing after upsert"))?;
        Ok(row.try_into()?)
    }

    async fn delete_overbreak(&self, user_id: UserId, date: NaiveDate) -> anyhow::Result<bool> {
        let res = deduction::Entity::delete_many()
            .filter(deduction::Column::SingletonKey.eq(overbreak_key(user_id, date)))
            .exec(&self.conn)
            .await
            .context("delete_overbreak failed")?;
        Ok(res.rows_affected > 0)
    }

    async fn insert_deduction(&self, d: NewDeduction) -> anyhow::Result<Deduction> {
        insert_deduction_on(&self.conn, d).await
    }
}

#[async_trait::async_trait]
impl<C> RollCallRepository for SeaOrmAttendanceRepository<C>
where
    C: ConnectionTrait + TransactionTrait + Send + Sync + 'static,
{
    async fn find_roll_call(&self, id: RollCallId) -> anyhow::Result<Option<RollCall>> {
        let found = roll_call::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("find_roll_call failed")?;
        Ok(found.map(RollCall::try_from).transpose()?)
    }

    async fn roll_calls_in_bucket(
        &self,
        org_id: OrgId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<RollCall>> {
        let rows = roll_call::Entity::find()
            .filter(roll_call::Column::OrgId.eq(org_id))
            .filter(roll_call::Column::TriggeredAt.gte(start))
            .filter(roll_call::Column::TriggeredAt.lt(end))
            .order_by_asc(roll_call::Column::TriggeredAt)
            .all(&self.conn)
            .await
            .context("roll_calls_in_bucket failed")?;
        Ok(convert_all(rows)?)
    }

    async fn roll_calls_for_user_between(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<RollCall>> {
        let rows = roll_call::Entity::find()
            .filter(roll_call::Column::UserId.eq(user_id))
            .filter(roll_call::Column::TriggeredAt.gte(start))
            .filter(roll_call::Column::TriggeredAt.lt(end))
            .order_by_asc(roll_call::Column::TriggeredAt)
            .all(&self.conn)
            .await
            .context("roll_calls_for_user_between failed")?;
        Ok(convert_all(rows)?)
    }

    async fn insert_roll_call(&self, rc: NewRollCall) -> anyhow::Result<Option<RollCall>> {
        let m = roll_call::ActiveModel {
            id: NotSet,
            org_id: Set(rc.org_id),
            user_id: Set(rc.user_id),
            triggered_at: Set(rc.triggered_at),
            deadline_at: Set(rc.deadline_at),
            responded_at: Set(None),
            result: Set(RollCallResult::Pending.as_str().to_string()),
            response_delay_seconds: Set(None),
            hour_bucket: Set(rc.hour_bucket),
            slot: Set(rc.slot),
        };
        match m.insert(&self.conn).await {
            Ok(row) => Ok(Some(row.try_into()?)),
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => Ok(None),
            Err(e) => Err(anyhow::Error::new(e).context("insert_roll_call failed")),
        }
    }

    async fn resolve_pending(
        &self,
        id: RollCallId,
        resolution: RollCallResolution,
    ) -> anyhow::Result<bool> {
        resolve_pending_on(&self.conn, id, resolution).await
    }

    async fn resolve_pending_with_deduction(
        &self,
        id: RollCallId,
        resolution: RollCallResolution,
        deduction: NewDeduction,
    ) -> anyhow::Result<bool> {
        let txn = self
            .conn
            .begin()
            .await
            .context("resolve_pending_with_deduction: begin failed")?;
        if !resolve_pending_on(&txn, id, resolution).await? {
            txn.rollback()
                .await
                .context("resolve_pending_with_deduction: rollback failed")?;
            return Ok(false);
        }
        if let Err(e) = insert_deduction_on(&txn, deduction).await {
            txn.rollback()
                .await
                .context("resolve_pending_with_deduction: rollback failed")?;
            return Err(e);
        }
        txn.commit()
            .await
            .context("resolve_pending_with_deduction: commit failed")?;
        Ok(true)
    }

    async fn expire_pending(&self, now: DateTime<Utc>) -> anyhow::Result<u64> {
        let res = roll_call::Entity::update_many()
            .col_expr(
                roll_call::Column::Result,
                Expr::value(RollCallResult::Missed.as_str()),
            )
            .filter(roll_call::Column::Result.eq(RollCallResult::Pending.as_str()))
            .filter(roll_call::Column::DeadlineAt.lt(now))
            .exec(&self.conn)
            .await
            .context("expire_pending failed")?;
        Ok(res.rows_affected)
    }

    async fn latest_pending_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<RollCall>> {
        let found = roll_call::Entity::find()
            .filter(roll_call::Column::UserId.eq(user_id))
            .filter(roll_call::Column::Result.eq(RollCallResult::Pending.as_str()))
            .filter(roll_call::Column::TriggeredAt.lte(now))
            .filter(roll_call::Column::DeadlineAt.gt(now))
            .order_by_desc(roll_call::Column::TriggeredAt)
            .one(&self.conn)
            .await
            .context("latest_pending_for_user failed")?;
        Ok(found.map(RollCall::try_from).transpose()?)
    }
}

async fn insert_deduction_on<C>(conn: &C, d: NewDeduction) -> anyhow::Result<Deduction>
where
    C: ConnectionTrait,
{
    let singleton_key = match d.kind {
        DeductionKind::Overbreak => Some(overbreak_key(d.user_id, d.date)),
        DeductionKind::Rollcall => None,
    };
    let m = deduction::ActiveModel {
        id: NotSet,
        org_id: Set(d.org_id),
        user_id: Set(d.user_id),
        date: Set(d.date),
        kind: Set(d.kind.as_str().to_string()),
        minutes: Set(d.minutes),
        description: Set(d.description),
        related_session_id: Set(d.related_session_id),
        related_roll_call_id: Set(d.related_roll_call_id),
        singleton_key: Set(singleton_key),
    };
    let row = m.insert(conn).await.context("insert_deduction failed")?;
    Ok(row.try_into()?)
}

/// Compare-and-set on `result = PENDING`.
async fn resolve_pending_on<C>(
    conn: &C,
    id: RollCallId,
    resolution: RollCallResolution,
) -> anyhow::Result<bool>
where
    C: ConnectionTrait,
{
    let res = roll_call::Entity::update_many()
        .col_expr(
            roll_call::Column::Result,
            Expr::value(resolution.result.as_str()),
        )
        .col_expr(
            roll_call::Column::RespondedAt,
            Expr::value(resolution.responded_at),
        )
        .col_expr(
            roll_call::Column::ResponseDelaySeconds,
            Expr::value(resolution.response_delay_seconds),
        )
        .filter(roll_call::Column::Id.eq(id))
        .filter(roll_call::Column::Result.eq(RollCallResult::Pending.as_str()))
        .exec(conn)
        .await
        .context("resolve_pending failed")?;
    Ok(res.rows_affected == 1)
}
