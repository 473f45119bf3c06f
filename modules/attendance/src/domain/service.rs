use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::{debug, instrument};

use crate::config::AttendanceConfig;
use crate::contract::model::{
    DaySummary, OrgId, RangeSummary, ResponseOutcome, RollCall, RollCallId, ScheduledShift,
    ShiftWindow, UserId,
};
use crate::domain::attendance::{AllowancePolicy, AttendanceSummarizer};
use crate::domain::error::DomainError;
use crate::domain::events::AttendanceEvent;
use crate::domain::ports::{Clock, EventPublisher};
use crate::domain::repo::Repositories;
use crate::domain::rollcall::{RollCallPolicy, RollCallScheduler};
use crate::domain::shifts::ShiftResolver;
use crate::domain::zones;

/// Configuration for the domain service
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub default_timezone: Tz,
    pub rollcall: RollCallPolicy,
    pub allowances: AllowancePolicy,
    pub rng_seed: Option<u64>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_timezone: Tz::UTC,
            rollcall: RollCallPolicy::default(),
            allowances: AllowancePolicy::default(),
            rng_seed: None,
        }
    }
}

impl ServiceConfig {
    /// The default zone must be a valid IANA name; everything else is clamped.
    pub fn from_config(cfg: &AttendanceConfig) -> anyhow::Result<Self> {
        let default_timezone = cfg
            .default_timezone
            .trim()
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("invalid default_timezone '{}'", cfg.default_timezone))?;
        Ok(Self {
            default_timezone,
            rollcall: RollCallPolicy::from_config(&cfg.rollcall),
            allowances: AllowancePolicy::from_config(&cfg.allowances),
            rng_seed: cfg.rng_seed,
        })
    }
}

/// Domain service facade over the resolver, summarizer and scheduler.
/// Depends only on the ports, not on infra types.
#[derive(Clone)]
pub struct Service {
    resolver: ShiftResolver,
    summarizer: AttendanceSummarizer,
    scheduler: RollCallScheduler,
    clock: Arc<dyn Clock>,
}

impl Service {
    pub fn new(
        repos: Repositories,
        events: Arc<dyn EventPublisher<AttendanceEvent>>,
        clock: Arc<dyn Clock>,
        config: ServiceConfig,
    ) -> Self {
        let resolver = ShiftResolver::new(
            repos.directory.clone(),
            repos.shifts.clone(),
            config.default_timezone,
        );
        let summarizer = AttendanceSummarizer::new(
            &repos,
            resolver.clone(),
            events.clone(),
            clock.clone(),
            config.allowances,
        );
        let scheduler = RollCallScheduler::new(
            &repos,
            resolver.clone(),
            events,
            config.rollcall,
            config.rng_seed,
        );
        Self {
            resolver,
            summarizer,
            scheduler,
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn resolver(&self) -> &ShiftResolver {
        &self.resolver
    }

    pub fn scheduler(&self) -> &RollCallScheduler {
        &self.scheduler
    }

    // --- shift windows ---

    pub async fn windows_for_user(
        &self,
        user_id: UserId,
        reference: DateTime<Utc>,
    ) -> Result<Vec<ShiftWindow>, DomainError> {
        self.resolver.windows_for_user(user_id, reference).await
    }

    pub async fn windows_for_day(
        &self,
        user_id: UserId,
        date: NaiveDate,
    ) -> Result<Vec<ShiftWindow>, DomainError> {
        self.resolver.windows_for_day(user_id, date).await
    }

    #[instrument(name = "attendance.service.active_window", skip(self), fields(user_id = %user_id, %instant))]
    pub async fn active_window(
        &self,
        user_id: UserId,
        instant: DateTime<Utc>,
    ) -> Result<Option<ShiftWindow>, DomainError> {
        let window = self.resolver.active_window(user_id, instant).await?;
        debug!(found = window.is_some(), "active window lookup");
        Ok(window)
    }

    pub async fn upcoming_schedule(
        &self,
        user_id: UserId,
        today: NaiveDate,
        days_ahead: u32,
    ) -> Result<Vec<ScheduledShift>, DomainError> {
        self.resolver
            .upcoming_schedule(user_id, today, days_ahead)
            .await
    }

    pub async fn can_start_before_shift(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
        tolerance_minutes: i64,
    ) -> Result<bool, DomainError> {
        self.resolver
            .can_start_before_shift(user_id, now, tolerance_minutes)
            .await
    }

    pub async fn user_timezone(&self, user_id: UserId) -> Result<Tz, DomainError> {
        let employee = self.resolver.employee(user_id).await?;
        self.resolver.user_timezone(&employee).await
    }

    /// UTC bounds of the user's local calendar date.
    pub async fn day_bounds(
        &self,
        user_id: UserId,
        date: NaiveDate,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>), DomainError> {
        let tz = self.user_timezone(user_id).await?;
        Ok(zones::day_bounds(tz, date))
    }

    // --- summaries ---

    pub async fn summarize_day(
        &self,
        user_id: UserId,
        date: NaiveDate,
    ) -> Result<DaySummary, DomainError> {
        self.summarizer.summarize_day(user_id, date).await
    }

    pub async fn summarize_range(
        &self,
        user_id: UserId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<RangeSummary, DomainError> {
        self.summarizer.summarize_range(user_id, start, end).await
    }

    pub async fn organization_summary(
        &self,
        org_id: OrgId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RangeSummary>, DomainError> {
        self.summarizer
            .organization_summary(org_id, start, end)
            .await
    }

    // --- roll-calls ---

    pub async fn schedule_for_current_hour(
        &self,
        org_id: OrgId,
        now: DateTime<Utc>,
        target_per_hour: Option<i64>,
    ) -> Result<Vec<RollCall>, DomainError> {
        self.scheduler
            .schedule_for_current_hour(org_id, now, target_per_hour)
            .await
    }

    pub async fn tick(&self, now: DateTime<Utc>) -> Result<usize, DomainError> {
        self.scheduler.tick(now).await
    }

    pub async fn expire_pending(&self, now: DateTime<Utc>) -> Result<u64, DomainError> {
        self.scheduler.expire_pending(now).await
    }

    pub async fn classify_response(
        &self,
        roll_call_id: RollCallId,
        user_id: UserId,
        responded_at: DateTime<Utc>,
    ) -> Result<ResponseOutcome, DomainError> {
        self.scheduler
            .classify_response(roll_call_id, user_id, responded_at)
            .await
    }

    pub async fn pending_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<RollCall>, DomainError> {
        self.scheduler.pending_for_user(user_id, now).await
    }
}
