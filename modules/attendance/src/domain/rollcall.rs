//! Randomized intra-hour roll-calls: scheduling, expiry and response
//! classification.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, instrument, warn};

use crate::config::RollCallConfig;
use crate::contract::model::{
    DeductionKind, NewDeduction, NewRollCall, OrgId, ResponseOutcome, RollCall, RollCallId,
    RollCallResolution, RollCallResult, UserId,
};
use crate::domain::error::DomainError;
use crate::domain::events::AttendanceEvent;
use crate::domain::ports::EventPublisher;
use crate::domain::repo::{
    DirectoryRepository, Repositories, RollCallRepository, SessionRepository,
};
use crate::domain::shifts::ShiftResolver;
use crate::domain::zones;

pub const MIN_ROLLCALLS_PER_HOUR: i64 = 1;
pub const SETTINGS_TARGET_KEY: &str = "rollcalls_per_hour";

const LATE_DESCRIPTION: &str = "Roll-call late response";

/// Scheduling and response tunables after clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollCallPolicy {
    pub default_target: i64,
    pub min_gap_minutes: i64,
    pub max_gap_minutes: i64,
    pub response_window_minutes: i64,
    pub grace_period_seconds: i64,
}

impl Default for RollCallPolicy {
    fn default() -> Self {
        Self::from_config(&RollCallConfig::default())
    }
}

impl RollCallPolicy {
    /// Gaps are forced to `1 <= min <= max`, the response window to at least one minute.
    pub fn from_config(cfg: &RollCallConfig) -> Self {
        let min_gap = i64::from(cfg.min_gap_minutes).max(1);
        let mut policy = Self {
            default_target: MIN_ROLLCALLS_PER_HOUR,
            min_gap_minutes: min_gap,
            max_gap_minutes: i64::from(cfg.max_gap_minutes).max(min_gap),
            response_window_minutes: i64::from(cfg.response_window_minutes).max(1),
            grace_period_seconds: i64::from(cfg.grace_period_seconds),
        };
        policy.default_target = policy.clamp_target(Some(i64::from(cfg.rollcalls_per_hour)));
        policy
    }

    pub fn max_target(&self) -> i64 {
        (60 / self.min_gap_minutes).max(MIN_ROLLCALLS_PER_HOUR)
    }

    /// `None` selects the configured default; anything else is clamped to
    /// `[1, 60 / min_gap]`.
    pub fn clamp_target(&self, target: Option<i64>) -> i64 {
        match target {
            None => self.default_target,
            Some(value) => value.clamp(MIN_ROLLCALLS_PER_HOUR, self.max_target()),
        }
    }

    /// Read the organization's `rollcalls_per_hour` setting (a number or a
    /// numeric string). Missing or unparsable values give the default.
    pub fn target_from_settings(&self, settings: Option<&serde_json::Value>) -> i64 {
        let stored = settings
            .and_then(|s| s.get(SETTINGS_TARGET_KEY))
            .and_then(|v| match v {
                serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
                serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
                _ => None,
            });
        self.clamp_target(stored)
    }

    pub fn response_window(&self) -> Duration {
        Duration::minutes(self.response_window_minutes)
    }

    /// PASSED up to and including the grace period, LATE beyond it.
    pub fn classify_delay(&self, delay_seconds: i64) -> ResponseOutcome {
        if delay_seconds <= self.grace_period_seconds {
            return ResponseOutcome::Passed;
        }
        let excess = delay_seconds - self.grace_period_seconds;
        ResponseOutcome::Late {
            response_delay_seconds: excess,
            deduction_minutes: ceil_minutes(excess),
        }
    }
}

/// Positive seconds rounded up to whole minutes.
pub fn ceil_minutes(seconds: i64) -> i64 {
    (seconds.max(0) + 59) / 60
}

/// Start of the UTC hour containing `instant`.
pub fn hour_bucket(instant: DateTime<Utc>) -> DateTime<Utc> {
    let secs = instant.timestamp();
    Utc.timestamp_opt(secs - secs.rem_euclid(3600), 0)
        .single()
        .unwrap_or(instant)
}

#[derive(Clone)]
pub struct RollCallScheduler {
    resolver: ShiftResolver,
    directory: Arc<dyn DirectoryRepository>,
    sessions: Arc<dyn SessionRepository>,
    roll_calls: Arc<dyn RollCallRepository>,
    events: Arc<dyn EventPublisher<AttendanceEvent>>,
    policy: RollCallPolicy,
    rng: Arc<Mutex<StdRng>>,
}

impl RollCallScheduler {
    pub fn new(
        repos: &Repositories,
        resolver: ShiftResolver,
        events: Arc<dyn EventPublisher<AttendanceEvent>>,
        policy: RollCallPolicy,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            resolver,
            directory: repos.directory.clone(),
            sessions: repos.sessions.clone(),
            roll_calls: repos.roll_calls.clone(),
            events,
            policy,
            rng: Arc::new(Mutex::new(rng)),
        }
    }

    pub fn policy(&self) -> &RollCallPolicy {
        &self.policy
    }

    /// Fill the organization's current UTC hour up to the target.
    ///
    /// The first roll-call of an empty hour fires at `now`; every later one
    /// sits a random gap after the previous trigger. Nothing is scheduled
    /// later than the end of the hour minus the response window.
    #[instrument(
        name = "attendance.rollcall.schedule_for_current_hour",
        skip(self),
        fields(org_id = %org_id, %now)
    )]
    pub async fn schedule_for_current_hour(
        &self,
        org_id: OrgId,
        now: DateTime<Utc>,
        target_per_hour: Option<i64>,
    ) -> Result<Vec<RollCall>, DomainError> {
        let target = self.policy.clamp_target(target_per_hour) as usize;
        let bucket = hour_bucket(now);
        let bucket_end = bucket + Duration::hours(1);
        let latest = bucket_end - self.policy.response_window();

        let existing = self
            .roll_calls
            .roll_calls_in_bucket(org_id, bucket, bucket_end)
            .await?;
        if existing.len() >= target {
            debug!(existing = existing.len(), target, "hour already at target");
            return Ok(Vec::new());
        }

        let mut pool = self.eligible_users(org_id, now).await?;
        if pool.is_empty() {
            debug!("no eligible users");
            return Ok(Vec::new());
        }

        let mut covered: HashSet<UserId> = existing.iter().map(|rc| rc.user_id).collect();
        let last_trigger = existing.last().map(|rc| rc.triggered_at);
        let mut anchor = last_trigger.map_or(now, |t| t.max(now));
        let mut first = last_trigger.is_none();
        let mut scheduled: Vec<RollCall> = Vec::new();

        while existing.len() + scheduled.len() < target {
            let Some((triggered_at, user_id)) =
                self.draw_slot(anchor, latest, first, &mut pool, &covered)
            else {
                break;
            };

            let slot = (existing.len() + scheduled.len()) as i32;
            let inserted = self
                .roll_calls
                .insert_roll_call(NewRollCall {
                    org_id,
                    user_id,
                    triggered_at,
                    deadline_at: triggered_at + self.policy.response_window(),
                    hour_bucket: bucket,
                    slot,
                })
                .await?;
            let Some(roll_call) = inserted else {
                warn!(slot, user_id, "slot already claimed by a concurrent run, stopping");
                break;
            };

            info!(roll_call_id = roll_call.id, user_id, %triggered_at, slot, "scheduled roll-call");
            self.events.publish(&AttendanceEvent::RollCallScheduled {
                id: roll_call.id,
                org_id,
                user_id,
                triggered_at,
            });
            covered.insert(user_id);
            anchor = triggered_at;
            first = false;
            scheduled.push(roll_call);
        }

        Ok(scheduled)
    }

    /// Pick the next trigger time and a user for it, or `None` when the hour
    /// has no room left or the pool runs dry. Covered users are dropped from
    /// the pool as they are drawn.
    fn draw_slot(
        &self,
        anchor: DateTime<Utc>,
        latest: DateTime<Utc>,
        first: bool,
        pool: &mut Vec<UserId>,
        covered: &HashSet<UserId>,
    ) -> Option<(DateTime<Utc>, UserId)> {
        let mut rng = self.rng.lock();

        let triggered_at = if first {
            anchor
        } else {
            let min_gap = Duration::minutes(self.policy.min_gap_minutes);
            let remaining = latest - anchor;
            if remaining <= min_gap {
                return None;
            }
            let max_gap = remaining.min(Duration::minutes(self.policy.max_gap_minutes));
            let gap = rng.gen_range(min_gap.num_seconds()..=max_gap.num_seconds());
            anchor + Duration::seconds(gap)
        };
        if triggered_at > latest {
            return None;
        }

        while !pool.is_empty() {
            let user_id = pool.swap_remove(rng.gen_range(0..pool.len()));
            if !covered.contains(&user_id) {
                return Some((triggered_at, user_id));
            }
        }
        None
    }

    /// Active users, not on leave on their local date, clocked in to a WORK
    /// session and inside an assigned shift at `now`. Sorted by id.
    pub async fn eligible_users(
        &self,
        org_id: OrgId,
        now: DateTime<Utc>,
    ) -> Result<Vec<UserId>, DomainError> {
        let clocked_in: HashSet<UserId> = self
            .sessions
            .open_work_sessions(org_id, now)
            .await?
            .into_iter()
            .map(|s| s.user_id)
            .collect();
        if clocked_in.is_empty() {
            return Ok(Vec::new());
        }

        let today = now.date_naive();
        let mut leave_dates: HashMap<UserId, HashSet<NaiveDate>> = HashMap::new();
        for leave in self
            .directory
            .leaves_between(
                org_id,
                today.pred_opt().unwrap_or(today),
                today.succ_opt().unwrap_or(today),
            )
            .await?
        {
            leave_dates.entry(leave.user_id).or_default().insert(leave.date);
        }

        let mut employees = self.directory.employees_in_org(org_id).await?;
        employees.sort_by_key(|e| e.id);

        let mut eligible = Vec::new();
        for employee in employees
            .iter()
            .filter(|e| e.is_active && clocked_in.contains(&e.id))
        {
            if let Some(dates) = leave_dates.get(&employee.id) {
                let tz = self.resolver.user_timezone(employee).await?;
                if dates.contains(&zones::local_date(tz, now)) {
                    debug!(user_id = employee.id, "on leave today");
                    continue;
                }
            }
            if self.resolver.active_window(employee.id, now).await?.is_some() {
                eligible.push(employee.id);
            }
        }
        debug!(eligible = eligible.len(), "collected eligible users");
        Ok(eligible)
    }

    /// Flip every overdue PENDING roll-call to MISSED.
    #[instrument(name = "attendance.rollcall.expire_pending", skip(self), fields(%now))]
    pub async fn expire_pending(&self, now: DateTime<Utc>) -> Result<u64, DomainError> {
        let count = self.roll_calls.expire_pending(now).await?;
        if count > 0 {
            info!(count, "expired pending roll-calls");
            self.events
                .publish(&AttendanceEvent::RollCallsExpired { count, at: now });
        }
        Ok(count)
    }

    /// Resolve a user's acknowledgement. Only the owner's PENDING roll-call can
    /// be answered; everything else is rejected without side effects.
    #[instrument(
        name = "attendance.rollcall.classify_response",
        skip(self),
        fields(roll_call_id = %roll_call_id, user_id = %user_id)
    )]
    pub async fn classify_response(
        &self,
        roll_call_id: RollCallId,
        user_id: UserId,
        responded_at: DateTime<Utc>,
    ) -> Result<ResponseOutcome, DomainError> {
        let Some(roll_call) = self.roll_calls.find_roll_call(roll_call_id).await? else {
            debug!("unknown roll-call");
            return Ok(ResponseOutcome::Rejected);
        };
        if roll_call.user_id != user_id || roll_call.result != RollCallResult::Pending {
            debug!(owner = roll_call.user_id, result = %roll_call.result, "response rejected");
            return Ok(ResponseOutcome::Rejected);
        }

        let delay = (responded_at - roll_call.triggered_at).num_seconds();
        let outcome = self.policy.classify_delay(delay);
        let (result, response_delay_seconds) = match outcome {
            ResponseOutcome::Late {
                response_delay_seconds,
                ..
            } => (RollCallResult::Late, Some(response_delay_seconds)),
            _ => (RollCallResult::Passed, None),
        };

        let resolution = RollCallResolution {
            result,
            responded_at: Some(responded_at),
            response_delay_seconds,
        };
        let applied = match outcome {
            ResponseOutcome::Late {
                deduction_minutes, ..
            } => {
                let date = self.deduction_date(&roll_call).await?;
                self.roll_calls
                    .resolve_pending_with_deduction(
                        roll_call_id,
                        resolution,
                        NewDeduction {
                            org_id: roll_call.org_id,
                            user_id,
                            date,
                            kind: DeductionKind::Rollcall,
                            minutes: deduction_minutes,
                            description: Some(LATE_DESCRIPTION.to_string()),
                            related_session_id: None,
                            related_roll_call_id: Some(roll_call_id),
                        },
                    )
                    .await?
            }
            _ => {
                self.roll_calls
                    .resolve_pending(roll_call_id, resolution)
                    .await?
            }
        };
        if !applied {
            debug!("roll-call left PENDING before the response landed");
            return Ok(ResponseOutcome::Rejected);
        }

        info!(%result, delay, "roll-call resolved");
        self.events.publish(&AttendanceEvent::RollCallResolved {
            id: roll_call_id,
            user_id,
            result,
            at: responded_at,
        });
        Ok(outcome)
    }

    /// Schedule the current hour of every organization with work sessions,
    /// each with its own configured target. Returns the number scheduled.
    #[instrument(name = "attendance.rollcall.tick", skip(self), fields(%now))]
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<usize, DomainError> {
        let mut total = 0;
        for org_id in self.sessions.organizations_with_sessions().await? {
            let Some(org) = self.directory.find_organization(org_id).await? else {
                warn!(org_id, "sessions reference a missing organization");
                continue;
            };
            let target = self.policy.target_from_settings(org.settings.as_ref());
            total += self
                .schedule_for_current_hour(org_id, now, Some(target))
                .await?
                .len();
        }
        info!(total, "tick finished");
        Ok(total)
    }

    pub async fn pending_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<RollCall>, DomainError> {
        Ok(self.roll_calls.latest_pending_for_user(user_id, now).await?)
    }

    /// Local date of the trigger in the owner's zone.
    async fn deduction_date(&self, roll_call: &RollCall) -> Result<NaiveDate, DomainError> {
        let tz = match self.directory.find_employee(roll_call.user_id).await? {
            Some(employee) => self.resolver.user_timezone(&employee).await?,
            None => self.resolver.default_timezone(),
        };
        Ok(zones::local_date(tz, roll_call.triggered_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn policy_with(min_gap: u32, max_gap: u32, target: u32) -> RollCallPolicy {
        RollCallPolicy::from_config(&RollCallConfig {
            rollcalls_per_hour: target,
            min_gap_minutes: min_gap,
            max_gap_minutes: max_gap,
            ..RollCallConfig::default()
        })
    }

    #[test]
    fn defaults() {
        let policy = RollCallPolicy::default();
        assert_eq!(policy.default_target, 5);
        assert_eq!(policy.max_target(), 12);
        assert_eq!(policy.response_window(), Duration::minutes(5));
        assert_eq!(policy.grace_period_seconds, 300);
    }

    #[test]
    fn target_is_clamped() {
        let policy = RollCallPolicy::default();
        assert_eq!(policy.clamp_target(None), 5);
        assert_eq!(policy.clamp_target(Some(0)), 1);
        assert_eq!(policy.clamp_target(Some(-4)), 1);
        assert_eq!(policy.clamp_target(Some(7)), 7);
        assert_eq!(policy.clamp_target(Some(100)), 12);
    }

    #[test]
    fn invalid_gaps_are_repaired() {
        let policy = policy_with(0, 0, 50);
        assert_eq!(policy.min_gap_minutes, 1);
        assert_eq!(policy.max_gap_minutes, 1);
        assert_eq!(policy.max_target(), 60);
        assert_eq!(policy.default_target, 50);

        let policy = policy_with(20, 10, 5);
        assert_eq!(policy.max_gap_minutes, 20);
        assert_eq!(policy.default_target, 3);
    }

    #[test]
    fn target_read_from_settings() {
        let policy = RollCallPolicy::default();
        assert_eq!(policy.target_from_settings(None), 5);
        assert_eq!(policy.target_from_settings(Some(&json!({}))), 5);
        assert_eq!(policy.target_from_settings(Some(&json!({"rollcalls_per_hour": 3}))), 3);
        assert_eq!(policy.target_from_settings(Some(&json!({"rollcalls_per_hour": "8"}))), 8);
        assert_eq!(policy.target_from_settings(Some(&json!({"rollcalls_per_hour": 99}))), 12);
        assert_eq!(policy.target_from_settings(Some(&json!({"rollcalls_per_hour": "lots"}))), 5);
        assert_eq!(policy.target_from_settings(Some(&json!({"rollcalls_per_hour": null}))), 5);
    }

    #[test]
    fn delay_classification_boundary() {
        let policy = RollCallPolicy::default();
        assert_eq!(policy.classify_delay(0), ResponseOutcome::Passed);
        assert_eq!(policy.classify_delay(300), ResponseOutcome::Passed);
        assert_eq!(
            policy.classify_delay(301),
            ResponseOutcome::Late {
                response_delay_seconds: 1,
                deduction_minutes: 1
            }
        );
        assert_eq!(
            policy.classify_delay(421),
            ResponseOutcome::Late {
                response_delay_seconds: 121,
                deduction_minutes: 3
            }
        );
    }

    #[test]
    fn minutes_round_up() {
        assert_eq!(ceil_minutes(1), 1);
        assert_eq!(ceil_minutes(60), 1);
        assert_eq!(ceil_minutes(61), 2);
        assert_eq!(ceil_minutes(0), 0);
    }

    #[test]
    fn bucket_truncates_to_the_hour() {
        let t = Utc.with_ymd_and_hms(2024, 3, 4, 14, 37, 12).unwrap();
        assert_eq!(hour_bucket(t), Utc.with_ymd_and_hms(2024, 3, 4, 14, 0, 0).unwrap());
        assert_eq!(hour_bucket(hour_bucket(t)), hour_bucket(t));
    }
}
