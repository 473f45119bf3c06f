use tracing::info;

use crate::domain::events::AttendanceEvent;
use crate::domain::ports::EventPublisher;

/// Publishes domain events as structured log records under the
/// `attendance::events` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventPublisher;

impl EventPublisher<AttendanceEvent> for TracingEventPublisher {
    fn publish(&self, event: &AttendanceEvent) {
        match event {
            AttendanceEvent::RollCallScheduled {
                id,
                org_id,
                user_id,
                triggered_at,
            } => info!(
                target: "attendance::events",
                event = "roll_call_scheduled",
                id, org_id, user_id, %triggered_at
            ),
            AttendanceEvent::RollCallResolved {
                id,
                user_id,
                result,
                at,
            } => info!(
                target: "attendance::events",
                event = "roll_call_resolved",
                id, user_id, %result, %at
            ),
            AttendanceEvent::RollCallsExpired { count, at } => info!(
                target: "attendance::events",
                event = "roll_calls_expired",
                count, %at
            ),
            AttendanceEvent::OverbreakReconciled {
                user_id,
                date,
                minutes,
            } => info!(
                target: "attendance::events",
                event = "overbreak_reconciled",
                user_id, %date, minutes
            ),
        }
    }
}
