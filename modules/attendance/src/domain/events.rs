use chrono::{DateTime, NaiveDate, Utc};

use crate::contract::model::{OrgId, RollCallId, RollCallResult, UserId};

/// Transport-agnostic domain event.
#[derive(Debug, Clone, PartialEq)]
pub enum AttendanceEvent {
    RollCallScheduled {
        id: RollCallId,
        org_id: OrgId,
        user_id: UserId,
        triggered_at: DateTime<Utc>,
    },
    RollCallResolved {
        id: RollCallId,
        user_id: UserId,
        result: RollCallResult,
        at: DateTime<Utc>,
    },
    RollCallsExpired {
        count: u64,
        at: DateTime<Utc>,
    },
    /// `minutes == 0` means the day's OVERBREAK row was removed.
    OverbreakReconciled {
        user_id: UserId,
        date: NaiveDate,
        minutes: i64,
    },
}
