//! Shift window resolution: weekly templates + assignment ranges + zones →
//! concrete UTC intervals.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::{debug, instrument};

use crate::contract::model::{
    Employee, OrgId, ScheduledShift, ShiftAssignment, ShiftTemplate, ShiftWindow, UserId,
    WindowSource,
};
use crate::domain::error::DomainError;
use crate::domain::repo::{DirectoryRepository, ShiftRepository};
use crate::domain::zones::{self, DEVICE_TIMEZONE};

pub const MAX_SCHEDULE_DAYS: u32 = 31;
pub const MAX_PRE_SHIFT_TOLERANCE_MINUTES: i64 = 30;

#[derive(Clone)]
pub struct ShiftResolver {
    directory: Arc<dyn DirectoryRepository>,
    shifts: Arc<dyn ShiftRepository>,
    default_tz: Tz,
}

impl ShiftResolver {
    pub fn new(
        directory: Arc<dyn DirectoryRepository>,
        shifts: Arc<dyn ShiftRepository>,
        default_tz: Tz,
    ) -> Self {
        Self {
            directory,
            shifts,
            default_tz,
        }
    }

    pub fn default_timezone(&self) -> Tz {
        self.default_tz
    }

    /// All assigned windows near `reference`: for every assignment, the
    /// occurrences on the template weekday at/before the reference's local
    /// date and one week either side. Deduplicated by (template, start).
    #[instrument(name = "attendance.shifts.windows_for_user", skip(self), fields(user_id = %user_id))]
    pub async fn windows_for_user(
        &self,
        user_id: UserId,
        reference: DateTime<Utc>,
    ) -> Result<Vec<ShiftWindow>, DomainError> {
        let assignments = self.shifts.assignments_for_user(user_id).await?;
        let mut org_zones: HashMap<OrgId, Option<String>> = HashMap::new();
        let mut seen = HashSet::new();
        let mut windows = Vec::new();

        for (assignment, template) in &assignments {
            let org_zone = match org_zones.get(&template.org_id) {
                Some(zone) => zone.clone(),
                None => {
                    let zone = self
                        .directory
                        .find_organization(template.org_id)
                        .await?
                        .and_then(|org| org.timezone);
                    org_zones.insert(template.org_id, zone.clone());
                    zone
                }
            };
            let tz = zones::resolve(
                &[template.timezone.as_deref(), org_zone.as_deref()],
                self.default_tz,
            );
            let local_reference = zones::local_date(tz, reference);

            for candidate in candidate_dates(local_reference, template.day_of_week) {
                if !assignment.covers(candidate) {
                    continue;
                }
                let window = build_window(template, assignment, tz, candidate);
                if seen.insert((template.id, window.start_utc)) {
                    windows.push(window);
                }
            }
        }

        debug!(count = windows.len(), "resolved shift windows");
        Ok(windows)
    }

    /// The first assigned window containing `instant`. Fallback windows never
    /// count as an active shift.
    pub async fn active_window(
        &self,
        user_id: UserId,
        instant: DateTime<Utc>,
    ) -> Result<Option<ShiftWindow>, DomainError> {
        Ok(self
            .windows_for_user(user_id, instant)
            .await?
            .into_iter()
            .find(|w| w.contains(instant)))
    }

    /// Windows overlapping the user's local calendar day, sorted by start.
    /// Users with unassigned-session access get an all-day window when no real
    /// shift touches the day.
    #[instrument(name = "attendance.shifts.windows_for_day", skip(self), fields(user_id = %user_id, %date))]
    pub async fn windows_for_day(
        &self,
        user_id: UserId,
        date: NaiveDate,
    ) -> Result<Vec<ShiftWindow>, DomainError> {
        let employee = self.employee(user_id).await?;
        let tz = self.user_timezone(&employee).await?;
        self.windows_for_day_in(&employee, tz, date).await
    }

    pub(crate) async fn windows_for_day_in(
        &self,
        employee: &Employee,
        tz: Tz,
        date: NaiveDate,
    ) -> Result<Vec<ShiftWindow>, DomainError> {
        let (day_start, day_end) = zones::day_bounds(tz, date);
        let mut windows: Vec<ShiftWindow> = self
            .windows_for_user(employee.id, day_end)
            .await?
            .into_iter()
            .filter(|w| w.overlaps(day_start, day_end))
            .collect();
        windows.sort_by_key(|w| w.start_utc);

        if windows.is_empty() && employee.allow_unassigned_sessions {
            debug!(user_id = employee.id, %date, "using unassigned all-day window");
            windows.push(unassigned_window(employee, tz, date));
        }
        Ok(windows)
    }

    /// Upcoming assigned shifts for display, starting at `today`.
    /// `days_ahead` is clamped to [1, 31]; fallback windows are skipped.
    #[instrument(name = "attendance.shifts.upcoming_schedule", skip(self), fields(user_id = %user_id))]
    pub async fn upcoming_schedule(
        &self,
        user_id: UserId,
        today: NaiveDate,
        days_ahead: u32,
    ) -> Result<Vec<ScheduledShift>, DomainError> {
        let employee = self.employee(user_id).await?;
        let tz = self.user_timezone(&employee).await?;
        let days = days_ahead.clamp(1, MAX_SCHEDULE_DAYS);

        let mut schedule = Vec::new();
        for date in today.iter_days().take(days as usize) {
            for window in self.windows_for_day_in(&employee, tz, date).await? {
                if window.is_fallback() {
                    continue;
                }
                schedule.push(ScheduledShift {
                    start_utc: window.start_utc,
                    end_utc: window.end_utc,
                    source_timezone: window.timezone.name().to_string(),
                });
            }
        }
        // Overnight shifts touch two days.
        schedule.sort_by(|a, b| (a.start_utc, a.end_utc).cmp(&(b.start_utc, b.end_utc)));
        schedule.dedup();
        Ok(schedule)
    }

    /// True when an assigned shift starts within `tolerance_minutes` after
    /// `now` on the same local date. Tolerance is clamped to [0, 30]; zero
    /// disables early starts.
    pub async fn can_start_before_shift(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
        tolerance_minutes: i64,
    ) -> Result<bool, DomainError> {
        let tolerance = tolerance_minutes.clamp(0, MAX_PRE_SHIFT_TOLERANCE_MINUTES);
        if tolerance == 0 {
            return Ok(false);
        }
        let horizon = Duration::minutes(tolerance);
        let windows = self.windows_for_user(user_id, now + horizon).await?;
        Ok(windows.iter().any(|w| {
            w.start_utc > now
                && w.start_utc - now <= horizon
                && zones::local_date(w.timezone, now) == w.local_start.date_naive()
        }))
    }

    /// User zone (unless "device") → organization zone → default.
    pub async fn user_timezone(&self, employee: &Employee) -> Result<Tz, DomainError> {
        let user_zone = employee
            .timezone
            .as_deref()
            .filter(|tz| *tz != DEVICE_TIMEZONE);
        if user_zone.is_some_and(|tz| !tz.trim().is_empty()) {
            return Ok(zones::parse_or_default(user_zone, self.default_tz));
        }
        let org_zone = self
            .directory
            .find_organization(employee.org_id)
            .await?
            .and_then(|org| org.timezone);
        Ok(zones::parse_or_default(org_zone.as_deref(), self.default_tz))
    }

    pub(crate) async fn employee(&self, user_id: UserId) -> Result<Employee, DomainError> {
        self.directory
            .find_employee(user_id)
            .await?
            .ok_or_else(|| DomainError::user_not_found(user_id))
    }
}

/// Most recent date on `day_of_week` (Monday = 0) at or before `reference`,
/// and the same weekday one week earlier and later.
pub fn candidate_dates(reference: NaiveDate, day_of_week: u8) -> [NaiveDate; 3] {
    let current = i64::from(reference.weekday().num_days_from_monday());
    let delta = (current - i64::from(day_of_week % 7)).rem_euclid(7);
    let anchor = reference - Duration::days(delta);
    [
        anchor,
        anchor - Duration::days(7),
        anchor + Duration::days(7),
    ]
}

/// Materialize one occurrence of `template` on `date` in `tz`.
/// An end at or before the start rolls over to the next calendar day.
pub fn build_window(
    template: &ShiftTemplate,
    assignment: &ShiftAssignment,
    tz: Tz,
    date: NaiveDate,
) -> ShiftWindow {
    let end_date = if template.crosses_midnight() {
        date.succ_opt().unwrap_or(date)
    } else {
        date
    };
    let local_start = zones::localize(tz, date.and_time(template.start_time));
    let local_end = zones::localize(tz, end_date.and_time(template.end_time));

    ShiftWindow {
        source: WindowSource::Assigned {
            template_id: template.id,
            assignment_id: assignment.id,
        },
        org_id: template.org_id,
        user_id: assignment.user_id,
        timezone: tz,
        start_utc: local_start.with_timezone(&Utc),
        end_utc: local_end.with_timezone(&Utc),
        local_start,
        local_end,
    }
}

fn unassigned_window(employee: &Employee, tz: Tz, date: NaiveDate) -> ShiftWindow {
    let local_start = zones::local_midnight(tz, date);
    let local_end = zones::local_midnight(tz, date.succ_opt().unwrap_or(date));
    ShiftWindow {
        source: WindowSource::Unassigned,
        org_id: employee.org_id,
        user_id: employee.id,
        timezone: tz,
        start_utc: local_start.with_timezone(&Utc),
        end_utc: local_end.with_timezone(&Utc),
        local_start,
        local_end,
    }
}
