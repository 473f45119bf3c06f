//! Day and range attendance summaries, plus reconciliation of the persisted
//! OVERBREAK deduction.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, instrument};

use crate::config::AllowanceConfig;
use crate::contract::model::{
    DaySummary, DeductionKind, Employee, NewDeduction, OrgId, RangeSummary, RollCallResult,
    SessionId, SessionKind, ShiftWindow, UserId, WorkSession,
};
use crate::domain::error::DomainError;
use crate::domain::events::AttendanceEvent;
use crate::domain::ports::{Clock, EventPublisher};
use crate::domain::repo::{
    DeductionRepository, DirectoryRepository, Repositories, RollCallRepository, SessionRepository,
};
use crate::domain::shifts::ShiftResolver;
use crate::domain::zones;

pub const MAX_RANGE_DAYS: i64 = 366;

/// Break budgets and the daily credit cap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AllowancePolicy {
    pub lunch_minutes: i64,
    pub short_break_minutes: i64,
    pub daily_credit_hours: f64,
}

impl Default for AllowancePolicy {
    fn default() -> Self {
        Self::from_config(&AllowanceConfig::default())
    }
}

impl AllowancePolicy {
    pub fn from_config(cfg: &AllowanceConfig) -> Self {
        Self {
            lunch_minutes: i64::from(cfg.lunch_minutes),
            short_break_minutes: i64::from(cfg.short_break_minutes),
            daily_credit_hours: cfg.daily_credit_hours.max(0.0),
        }
    }

    pub fn overbreak_minutes(&self, lunch: i64, short_break: i64) -> i64 {
        (lunch - self.lunch_minutes).max(0) + (short_break - self.short_break_minutes).max(0)
    }

    /// `max(0, min(work/60, cap) - deductions/60)`
    pub fn net_hours(&self, work_minutes: i64, deduction_minutes: i64) -> f64 {
        let credited = (work_minutes as f64 / 60.0).min(self.daily_credit_hours);
        (credited - deduction_minutes as f64 / 60.0).max(0.0)
    }
}

/// One computed day before any write-back.
#[derive(Debug, Clone)]
struct DayComputation {
    summary: DaySummary,
    org_id: OrgId,
    session_ids: Vec<SessionId>,
}

#[derive(Clone)]
pub struct AttendanceSummarizer {
    resolver: ShiftResolver,
    directory: Arc<dyn DirectoryRepository>,
    sessions: Arc<dyn SessionRepository>,
    deductions: Arc<dyn DeductionRepository>,
    roll_calls: Arc<dyn RollCallRepository>,
    events: Arc<dyn EventPublisher<AttendanceEvent>>,
    clock: Arc<dyn Clock>,
    policy: AllowancePolicy,
}

impl AttendanceSummarizer {
    pub fn new(
        repos: &Repositories,
        resolver: ShiftResolver,
        events: Arc<dyn EventPublisher<AttendanceEvent>>,
        clock: Arc<dyn Clock>,
        policy: AllowancePolicy,
    ) -> Self {
        Self {
            resolver,
            directory: repos.directory.clone(),
            sessions: repos.sessions.clone(),
            deductions: repos.deductions.clone(),
            roll_calls: repos.roll_calls.clone(),
            events,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &AllowancePolicy {
        &self.policy
    }

    /// Summarize one local day and bring the day's OVERBREAK row in line
    /// with it. Running it again without new sessions changes nothing.
    #[instrument(name = "attendance.summary.summarize_day", skip(self), fields(user_id = %user_id, %date))]
    pub async fn summarize_day(
        &self,
        user_id: UserId,
        date: NaiveDate,
    ) -> Result<DaySummary, DomainError> {
        let employee = self.resolver.employee(user_id).await?;
        let tz = self.resolver.user_timezone(&employee).await?;
        let now = self.clock.now();

        let day = self.compute_day(&employee, tz, date, now).await?;
        self.reconcile_overbreak(&employee, date, &day).await?;
        Ok(day.summary)
    }

    /// Read-only aggregate over `[start, end]` (inclusive local dates).
    #[instrument(name = "attendance.summary.summarize_range", skip(self), fields(user_id = %user_id, %start, %end))]
    pub async fn summarize_range(
        &self,
        user_id: UserId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<RangeSummary, DomainError> {
        validate_range(start, end)?;
        let employee = self.resolver.employee(user_id).await?;
        self.range_for(&employee, start, end).await
    }

    /// Range summary for every user of the organization.
    #[instrument(name = "attendance.summary.organization_summary", skip(self), fields(org_id = %org_id, %start, %end))]
    pub async fn organization_summary(
        &self,
        org_id: OrgId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RangeSummary>, DomainError> {
        validate_range(start, end)?;
        self.directory
            .find_organization(org_id)
            .await?
            .ok_or_else(|| DomainError::organization_not_found(org_id))?;

        let mut employees = self.directory.employees_in_org(org_id).await?;
        employees.sort_by_key(|e| e.id);

        let mut reports = Vec::with_capacity(employees.len());
        for employee in &employees {
            reports.push(self.range_for(employee, start, end).await?);
        }
        debug!(users = reports.len(), "built organization summary");
        Ok(reports)
    }

    async fn range_for(
        &self,
        employee: &Employee,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<RangeSummary, DomainError> {
        let tz = self.resolver.user_timezone(employee).await?;
        let now = self.clock.now();

        let mut report = RangeSummary {
            user_id: employee.id,
            start_date: start,
            end_date: end,
            days: 0,
            work_minutes: 0,
            lunch_minutes: 0,
            break_minutes: 0,
            overbreak_minutes: 0,
            rollcall_deduction_minutes: 0,
            net_hours: 0.0,
            sessions_count: 0,
            rollcall_passed: 0,
            rollcall_late: 0,
            rollcall_missed: 0,
        };
        let mut net_hours = 0.0;

        for date in start.iter_days().take_while(|d| *d <= end) {
            let day = self.compute_day(employee, tz, date, now).await?;
            report.days += 1;
            report.work_minutes += day.summary.work_minutes;
            report.lunch_minutes += day.summary.lunch_minutes;
            report.break_minutes += day.summary.break_minutes;
            report.overbreak_minutes += day.summary.overbreak_minutes;
            report.rollcall_deduction_minutes += day.summary.rollcall_deduction_minutes;
            report.sessions_count += day.session_ids.len() as u32;
            net_hours += day.summary.net_hours;
        }
        report.net_hours = round2(net_hours);

        let (range_start, _) = zones::day_bounds(tz, start);
        let (_, range_end) = zones::day_bounds(tz, end);
        for roll_call in self
            .roll_calls
            .roll_calls_for_user_between(employee.id, range_start, range_end)
            .await?
        {
            match roll_call.result {
                RollCallResult::Passed => report.rollcall_passed += 1,
                RollCallResult::Late => report.rollcall_late += 1,
                RollCallResult::Missed => report.rollcall_missed += 1,
                RollCallResult::Pending => {}
            }
        }
        Ok(report)
    }

    async fn compute_day(
        &self,
        employee: &Employee,
        tz: Tz,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<DayComputation, DomainError> {
        let (day_start, day_end) = zones::day_bounds(tz, date);
        let sessions = self
            .sessions
            .sessions_started_between(employee.id, day_start, day_end)
            .await?;
        let windows = self.resolver.windows_for_day_in(employee, tz, date).await?;
        let covered = merge_windows(&windows);

        let mut summary = DaySummary::default();
        let mut session_ids = Vec::with_capacity(sessions.len());
        for session in &sessions {
            session_ids.push(session.id);
            let minutes = session_minutes_within(session, &covered, now);
            match session.kind {
                SessionKind::Work => summary.work_minutes += minutes,
                SessionKind::Lunch => summary.lunch_minutes += minutes,
                SessionKind::ShortBreak => summary.break_minutes += minutes,
            }
        }

        summary.overbreak_minutes = self
            .policy
            .overbreak_minutes(summary.lunch_minutes, summary.break_minutes);
        summary.rollcall_deduction_minutes = self
            .deductions
            .deductions_for_day(employee.id, date, DeductionKind::Rollcall)
            .await?
            .iter()
            .map(|d| d.minutes)
            .sum();
        summary.net_hours = self.policy.net_hours(
            summary.work_minutes,
            summary.overbreak_minutes + summary.rollcall_deduction_minutes,
        );

        debug!(
            user_id = employee.id,
            %date,
            sessions = sessions.len(),
            windows = windows.len(),
            work = summary.work_minutes,
            lunch = summary.lunch_minutes,
            short_break = summary.break_minutes,
            overbreak = summary.overbreak_minutes,
            "computed day"
        );

        let org_id = sessions.first().map_or(employee.org_id, |s| s.org_id);
        Ok(DayComputation {
            summary,
            org_id,
            session_ids,
        })
    }

    async fn reconcile_overbreak(
        &self,
        employee: &Employee,
        date: NaiveDate,
        day: &DayComputation,
    ) -> Result<(), DomainError> {
        let minutes = day.summary.overbreak_minutes;
        if minutes <= 0 {
            if self.deductions.delete_overbreak(employee.id, date).await? {
                info!(user_id = employee.id, %date, "cleared overbreak deduction");
                self.events.publish(&AttendanceEvent::OverbreakReconciled {
                    user_id: employee.id,
                    date,
                    minutes: 0,
                });
            }
            return Ok(());
        }

        let deduction = self
            .deductions
            .upsert_overbreak(NewDeduction {
                org_id: day.org_id,
                user_id: employee.id,
                date,
                kind: DeductionKind::Overbreak,
                minutes,
                description: Some(overbreak_description(&day.session_ids)),
                related_session_id: None,
                related_roll_call_id: None,
            })
            .await?;
        info!(user_id = employee.id, %date, minutes, deduction_id = deduction.id, "reconciled overbreak deduction");
        self.events.publish(&AttendanceEvent::OverbreakReconciled {
            user_id: employee.id,
            date,
            minutes,
        });
        Ok(())
    }
}

fn validate_range(start: NaiveDate, end: NaiveDate) -> Result<(), DomainError> {
    if end < start {
        return Err(DomainError::invalid_range(start, end, "end date precedes start date"));
    }
    if (end - start).num_days() + 1 > MAX_RANGE_DAYS {
        return Err(DomainError::invalid_range(
            start,
            end,
            format!("range is longer than {MAX_RANGE_DAYS} days"),
        ));
    }
    Ok(())
}

fn overbreak_description(session_ids: &[SessionId]) -> String {
    if session_ids.is_empty() {
        "Overbreak accrued".to_string()
    } else {
        format!("Overbreak accrued from sessions {session_ids:?}")
    }
}

/// Union of the windows as disjoint, sorted `[start, end)` intervals.
pub fn merge_windows(windows: &[ShiftWindow]) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let mut intervals: Vec<_> = windows.iter().map(|w| (w.start_utc, w.end_utc)).collect();
    intervals.sort();

    let mut merged: Vec<(DateTime<Utc>, DateTime<Utc>)> = Vec::with_capacity(intervals.len());
    for (start, end) in intervals {
        match merged.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    merged
}

/// Whole minutes of `[started_at, ended_at or now)` that fall inside `covered`.
pub fn session_minutes_within(
    session: &WorkSession,
    covered: &[(DateTime<Utc>, DateTime<Utc>)],
    now: DateTime<Utc>,
) -> i64 {
    let start = session.started_at;
    let end = session.ended_at.unwrap_or(now);
    if end <= start {
        return 0;
    }
    let seconds: i64 = covered
        .iter()
        .map(|(w_start, w_end)| {
            let lo = start.max(*w_start);
            let hi = end.min(*w_end);
            if hi > lo {
                (hi - lo).num_seconds()
            } else {
                0
            }
        })
        .sum();
    seconds / 60
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
