#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;

use attendance::contract::model::{
    Deduction, DeductionKind, Employee, Leave, LeaveKind, NewDeduction, NewRollCall, OrgId,
    Organization, RollCall, RollCallId, RollCallResolution, RollCallResult, SessionKind,
    ShiftAssignment, ShiftTemplate, UserId, WorkSession,
};
use attendance::domain::attendance::AllowancePolicy;
use attendance::domain::events::AttendanceEvent;
use attendance::domain::ports::{Clock, EventPublisher};
use attendance::domain::repo::{
    DeductionRepository, DirectoryRepository, Repositories, RollCallRepository, SessionRepository,
    ShiftRepository,
};
use attendance::domain::rollcall::RollCallPolicy;
use attendance::domain::service::{Service, ServiceConfig};

pub fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

#[derive(Default)]
struct State {
    orgs: Vec<Organization>,
    users: Vec<Employee>,
    templates: Vec<ShiftTemplate>,
    assignments: Vec<ShiftAssignment>,
    sessions: Vec<WorkSession>,
    leaves: Vec<Leave>,
    deductions: Vec<(Option<String>, Deduction)>,
    roll_calls: Vec<(DateTime<Utc>, i32, RollCall)>,
    next_id: i64,
}

impl State {
    fn id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn push_deduction(&mut self, d: NewDeduction) -> Deduction {
        let id = self.id();
        let row = Deduction {
            id,
            org_id: d.org_id,
            user_id: d.user_id,
            date: d.date,
            kind: d.kind,
            minutes: d.minutes,
            description: d.description,
            related_session_id: d.related_session_id,
            related_roll_call_id: d.related_roll_call_id,
        };
        self.deductions.push((None, row.clone()));
        row
    }

    fn pending_mut(&mut self, id: RollCallId) -> Option<&mut RollCall> {
        self.roll_calls
            .iter_mut()
            .map(|(_, _, rc)| rc)
            .find(|rc| rc.id == id && rc.result == RollCallResult::Pending)
    }
}

/// In-memory implementation of every repository port, with the same
/// uniqueness rules as the SQL schema.
#[derive(Default)]
pub struct InMemoryRepo {
    state: Mutex<State>,
    /// When set, every roll-call insert reports a lost uniqueness race.
    pub reject_roll_call_inserts: Mutex<bool>,
    /// When set, writing a deduction fails like a broken connection would.
    pub fail_deduction_inserts: Mutex<bool>,
}

impl InMemoryRepo {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_org(&self, timezone: Option<&str>, settings: Option<serde_json::Value>) -> OrgId {
        let mut s = self.state.lock();
        let id = s.id();
        s.orgs.push(Organization {
            id,
            name: format!("org-{id}"),
            timezone: timezone.map(str::to_string),
            settings,
        });
        id
    }

    pub fn add_user(&self, org_id: OrgId, timezone: Option<&str>) -> UserId {
        self.add_user_with(org_id, timezone, true, false)
    }

    pub fn add_user_with(
        &self,
        org_id: OrgId,
        timezone: Option<&str>,
        is_active: bool,
        allow_unassigned_sessions: bool,
    ) -> UserId {
        let mut s = self.state.lock();
        let id = s.id();
        s.users.push(Employee {
            id,
            org_id,
            is_active,
            timezone: timezone.map(str::to_string),
            allow_unassigned_sessions,
        });
        id
    }

    pub fn add_template(
        &self,
        org_id: OrgId,
        day_of_week: u8,
        start: NaiveTime,
        end: NaiveTime,
        timezone: Option<&str>,
    ) -> i64 {
        let mut s = self.state.lock();
        let id = s.id();
        s.templates.push(ShiftTemplate {
            id,
            org_id,
            name: None,
            day_of_week,
            start_time: start,
            end_time: end,
            timezone: timezone.map(str::to_string),
        });
        id
    }

    pub fn assign(
        &self,
        template_id: i64,
        user_id: UserId,
        from: NaiveDate,
        to: Option<NaiveDate>,
    ) -> i64 {
        let mut s = self.state.lock();
        let id = s.id();
        s.assignments.push(ShiftAssignment {
            id,
            template_id,
            user_id,
            effective_from: from,
            effective_to: to,
        });
        id
    }

    /// Template for every day of the week, assigned open-ended.
    pub fn assign_every_day(
        &self,
        org_id: OrgId,
        user_id: UserId,
        start: NaiveTime,
        end: NaiveTime,
        from: NaiveDate,
    ) {
        for dow in 0..7 {
            let template = self.add_template(org_id, dow, start, end, None);
            self.assign(template, user_id, from, None);
        }
    }

    pub fn add_session(
        &self,
        user_id: UserId,
        kind: SessionKind,
        started_at: DateTime<Utc>,
        ended_at: Option<DateTime<Utc>>,
    ) -> i64 {
        let mut s = self.state.lock();
        let id = s.id();
        let org_id = s
            .users
            .iter()
            .find(|u| u.id == user_id)
            .map(|u| u.org_id)
            .unwrap_or_default();
        s.sessions.push(WorkSession {
            id,
            org_id,
            user_id,
            kind,
            started_at,
            ended_at,
        });
        id
    }

    pub fn set_session_end(&self, session_id: i64, ended_at: DateTime<Utc>) {
        let mut s = self.state.lock();
        if let Some(session) = s.sessions.iter_mut().find(|x| x.id == session_id) {
            session.ended_at = Some(ended_at);
        }
    }

    pub fn add_leave(&self, user_id: UserId, date: NaiveDate) {
        let mut s = self.state.lock();
        let id = s.id();
        let org_id = s
            .users
            .iter()
            .find(|u| u.id == user_id)
            .map(|u| u.org_id)
            .unwrap_or_default();
        s.leaves.push(Leave {
            id,
            org_id,
            user_id,
            date,
            kind: LeaveKind::Leave,
        });
    }

    pub fn add_rollcall_deduction(&self, user_id: UserId, date: NaiveDate, minutes: i64) {
        let mut s = self.state.lock();
        let id = s.id();
        s.deductions.push((
            None,
            Deduction {
                id,
                org_id: 0,
                user_id,
                date,
                kind: DeductionKind::Rollcall,
                minutes,
                description: None,
                related_session_id: None,
                related_roll_call_id: None,
            },
        ));
    }

    pub fn deductions(&self) -> Vec<Deduction> {
        self.state
            .lock()
            .deductions
            .iter()
            .map(|(_, d)| d.clone())
            .collect()
    }

    pub fn roll_calls(&self) -> Vec<RollCall> {
        let mut all: Vec<RollCall> = self
            .state
            .lock()
            .roll_calls
            .iter()
            .map(|(_, _, rc)| rc.clone())
            .collect();
        all.sort_by_key(|rc| rc.triggered_at);
        all
    }

    pub fn set_roll_call_result(&self, id: RollCallId, result: RollCallResult) {
        let mut s = self.state.lock();
        if let Some((_, _, rc)) = s.roll_calls.iter_mut().find(|(_, _, rc)| rc.id == id) {
            rc.result = result;
        }
    }
}

#[async_trait]
impl DirectoryRepository for InMemoryRepo {
    async fn find_employee(&self, id: UserId) -> Result<Option<Employee>> {
        Ok(self.state.lock().users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_organization(&self, id: OrgId) -> Result<Option<Organization>> {
        Ok(self.state.lock().orgs.iter().find(|o| o.id == id).cloned())
    }

    async fn employees_in_org(&self, org_id: OrgId) -> Result<Vec<Employee>> {
        Ok(self
            .state
            .lock()
            .users
            .iter()
            .filter(|u| u.org_id == org_id)
            .cloned()
            .collect())
    }

    async fn leaves_between(
        &self,
        org_id: OrgId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Leave>> {
        Ok(self
            .state
            .lock()
            .leaves
            .iter()
            .filter(|l| l.org_id == org_id && l.date >= from && l.date <= to)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ShiftRepository for InMemoryRepo {
    async fn assignments_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<(ShiftAssignment, ShiftTemplate)>> {
        let s = self.state.lock();
        Ok(s.assignments
            .iter()
            .filter(|a| a.user_id == user_id)
            .filter_map(|a| {
                s.templates
                    .iter()
                    .find(|t| t.id == a.template_id)
                    .map(|t| (a.clone(), t.clone()))
            })
            .collect())
    }
}

#[async_trait]
impl SessionRepository for InMemoryRepo {
    async fn sessions_started_between(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<WorkSession>> {
        let mut found: Vec<WorkSession> = self
            .state
            .lock()
            .sessions
            .iter()
            .filter(|x| x.user_id == user_id && x.started_at >= start && x.started_at < end)
            .cloned()
            .collect();
        found.sort_by_key(|x| x.started_at);
        Ok(found)
    }

    async fn open_work_sessions(
        &self,
        org_id: OrgId,
        at: DateTime<Utc>,
    ) -> Result<Vec<WorkSession>> {
        Ok(self
            .state
            .lock()
            .sessions
            .iter()
            .filter(|x| {
                x.org_id == org_id
                    && x.kind == SessionKind::Work
                    && x.started_at <= at
                    && x.ended_at.is_none()
            })
            .cloned()
            .collect())
    }

    async fn organizations_with_sessions(&self) -> Result<Vec<OrgId>> {
        let mut ids: Vec<OrgId> = self.state.lock().sessions.iter().map(|x| x.org_id).collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }
}

fn overbreak_key(user_id: UserId, date: NaiveDate) -> String {
    format!("overbreak:{user_id}:{date}")
}

#[async_trait]
impl DeductionRepository for InMemoryRepo {
    async fn deductions_for_day(
        &self,
        user_id: UserId,
        date: NaiveDate,
        kind: DeductionKind,
    ) -> Result<Vec<Deduction>> {
        Ok(self
            .state
            .lock()
            .deductions
            .iter()
            .map(|(_, d)| d)
            .filter(|d| d.user_id == user_id && d.date == date && d.kind == kind)
            .cloned()
            .collect())
    }

    async fn upsert_overbreak(&self, d: NewDeduction) -> Result<Deduction> {
        let key = overbreak_key(d.user_id, d.date);
        let mut s = self.state.lock();
        if let Some((_, existing)) = s
            .deductions
            .iter_mut()
            .find(|(k, _)| k.as_deref() == Some(key.as_str()))
        {
            existing.minutes = d.minutes;
            existing.description = d.description;
            return Ok(existing.clone());
        }
        let id = s.id();
        let row = Deduction {
            id,
            org_id: d.org_id,
            user_id: d.user_id,
            date: d.date,
            kind: DeductionKind::Overbreak,
            minutes: d.minutes,
            description: d.description,
            related_session_id: d.related_session_id,
            related_roll_call_id: d.related_roll_call_id,
        };
        s.deductions.push((Some(key), row.clone()));
        Ok(row)
    }

    async fn delete_overbreak(&self, user_id: UserId, date: NaiveDate) -> Result<bool> {
        let key = overbreak_key(user_id, date);
        let mut s = self.state.lock();
        let before = s.deductions.len();
        s.deductions.retain(|(k, _)| k.as_deref() != Some(key.as_str()));
        Ok(s.deductions.len() != before)
    }

    async fn insert_deduction(&self, d: NewDeduction) -> Result<Deduction> {
        if *self.fail_deduction_inserts.lock() {
            anyhow::bail!("insert_deduction failed: connection reset");
        }
        Ok(self.state.lock().push_deduction(d))
    }
}

#[async_trait]
impl RollCallRepository for InMemoryRepo {
    async fn find_roll_call(&self, id: RollCallId) -> Result<Option<RollCall>> {
        Ok(self
            .state
            .lock()
            .roll_calls
            .iter()
            .find(|(_, _, rc)| rc.id == id)
            .map(|(_, _, rc)| rc.clone()))
    }

    async fn roll_calls_in_bucket(
        &self,
        org_id: OrgId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RollCall>> {
        let mut found: Vec<RollCall> = self
            .state
            .lock()
            .roll_calls
            .iter()
            .map(|(_, _, rc)| rc)
            .filter(|rc| rc.org_id == org_id && rc.triggered_at >= start && rc.triggered_at < end)
            .cloned()
            .collect();
        found.sort_by_key(|rc| rc.triggered_at);
        Ok(found)
    }

    async fn roll_calls_for_user_between(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RollCall>> {
        Ok(self
            .state
            .lock()
            .roll_calls
            .iter()
            .map(|(_, _, rc)| rc)
            .filter(|rc| {
                rc.user_id == user_id && rc.triggered_at >= start && rc.triggered_at < end
            })
            .cloned()
            .collect())
    }

    async fn insert_roll_call(&self, new: NewRollCall) -> Result<Option<RollCall>> {
        if *self.reject_roll_call_inserts.lock() {
            return Ok(None);
        }
        let mut s = self.state.lock();
        let taken = s.roll_calls.iter().any(|(bucket, slot, rc)| {
            *bucket == new.hour_bucket
                && ((rc.org_id == new.org_id && *slot == new.slot) || rc.user_id == new.user_id)
        });
        if taken {
            return Ok(None);
        }
        let id = s.id();
        let rc = RollCall {
            id,
            org_id: new.org_id,
            user_id: new.user_id,
            triggered_at: new.triggered_at,
            deadline_at: new.deadline_at,
            responded_at: None,
            result: RollCallResult::Pending,
            response_delay_seconds: None,
        };
        s.roll_calls.push((new.hour_bucket, new.slot, rc.clone()));
        Ok(Some(rc))
    }

    async fn resolve_pending(&self, id: RollCallId, res: RollCallResolution) -> Result<bool> {
        let mut s = self.state.lock();
        let Some(rc) = s.pending_mut(id) else {
            return Ok(false);
        };
        rc.result = res.result;
        rc.responded_at = res.responded_at;
        rc.response_delay_seconds = res.response_delay_seconds;
        Ok(true)
    }

    async fn resolve_pending_with_deduction(
        &self,
        id: RollCallId,
        res: RollCallResolution,
        deduction: NewDeduction,
    ) -> Result<bool> {
        // One lock for both writes; a failure leaves the state untouched.
        let mut s = self.state.lock();
        if s.pending_mut(id).is_none() {
            return Ok(false);
        }
        if *self.fail_deduction_inserts.lock() {
            anyhow::bail!("insert_deduction failed: connection reset");
        }
        if let Some(rc) = s.pending_mut(id) {
            rc.result = res.result;
            rc.responded_at = res.responded_at;
            rc.response_delay_seconds = res.response_delay_seconds;
        }
        s.push_deduction(deduction);
        Ok(true)
    }

    async fn expire_pending(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut s = self.state.lock();
        let mut count = 0;
        for (_, _, rc) in s.roll_calls.iter_mut() {
            if rc.result == RollCallResult::Pending && rc.deadline_at < now {
                rc.result = RollCallResult::Missed;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn latest_pending_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<RollCall>> {
        Ok(self
            .state
            .lock()
            .roll_calls
            .iter()
            .map(|(_, _, rc)| rc)
            .filter(|rc| {
                rc.user_id == user_id
                    && rc.result == RollCallResult::Pending
                    && rc.triggered_at <= now
                    && now < rc.deadline_at
            })
            .max_by_key(|rc| rc.triggered_at)
            .cloned())
    }
}

/// Clock pinned to a settable instant.
pub struct FixedClock(Mutex<DateTime<Utc>>);

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self(Mutex::new(at)))
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.0.lock() = at;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock()
    }
}

/// Collects published events for assertions.
#[derive(Default)]
pub struct RecordingPublisher(Mutex<Vec<AttendanceEvent>>);

impl RecordingPublisher {
    pub fn events(&self) -> Vec<AttendanceEvent> {
        self.0.lock().clone()
    }
}

impl EventPublisher<AttendanceEvent> for RecordingPublisher {
    fn publish(&self, event: &AttendanceEvent) {
        self.0.lock().push(event.clone());
    }
}

pub struct Harness {
    pub repo: Arc<InMemoryRepo>,
    pub clock: Arc<FixedClock>,
    pub events: Arc<RecordingPublisher>,
    pub service: Service,
}

pub fn harness(now: DateTime<Utc>) -> Harness {
    harness_with(now, Tz::UTC, RollCallPolicy::default())
}

pub fn harness_with(now: DateTime<Utc>, default_timezone: Tz, rollcall: RollCallPolicy) -> Harness {
    harness_seeded(now, default_timezone, rollcall, 7)
}

pub fn harness_seeded(
    now: DateTime<Utc>,
    default_timezone: Tz,
    rollcall: RollCallPolicy,
    seed: u64,
) -> Harness {
    let repo = InMemoryRepo::new();
    let clock = FixedClock::new(now);
    let events = Arc::new(RecordingPublisher::default());
    let service = Service::new(
        Repositories::from_shared(repo.clone()),
        events.clone(),
        clock.clone(),
        ServiceConfig {
            default_timezone,
            rollcall,
            allowances: AllowancePolicy::default(),
            rng_seed: Some(seed),
        },
    );
    Harness {
        repo,
        clock,
        events,
        service,
    }
}
