//! Entity ↔ contract conversions.

use crate::contract::model::{
    Deduction, Employee, Leave, Organization, RollCall, ShiftAssignment, ShiftTemplate,
    UnknownVariant, WorkSession,
};
use crate::infra::storage::entity::{
    deduction, leave, organization, roll_call, shift_assignment, shift_template, user,
    work_session,
};

impl From<organization::Model> for Organization {
    fn from(m: organization::Model) -> Self {
        Self {
            id: m.id,
            name: m.name,
            timezone: m.timezone,
            settings: m.settings,
        }
    }
}

impl From<user::Model> for Employee {
    fn from(m: user::Model) -> Self {
        Self {
            id: m.id,
            org_id: m.org_id,
            is_active: m.is_active,
            timezone: m.timezone,
            allow_unassigned_sessions: m.allow_unassigned_sessions,
        }
    }
}

impl From<shift_template::Model> for ShiftTemplate {
    fn from(m: shift_template::Model) -> Self {
        Self {
            id: m.id,
            org_id: m.org_id,
            name: m.name,
            day_of_week: m.day_of_week.rem_euclid(7) as u8,
            start_time: m.start_time,
            end_time: m.end_time,
            timezone: m.timezone,
        }
    }
}

impl From<shift_assignment::Model> for ShiftAssignment {
    fn from(m: shift_assignment::Model) -> Self {
        Self {
            id: m.id,
            template_id: m.template_id,
            user_id: m.user_id,
            effective_from: m.effective_from,
            effective_to: m.effective_to,
        }
    }
}

impl TryFrom<work_session::Model> for WorkSession {
    type Error = UnknownVariant;

    fn try_from(m: work_session::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: m.id,
            org_id: m.org_id,
            user_id: m.user_id,
            kind: m.kind.parse()?,
            started_at: m.started_at,
            ended_at: m.ended_at,
        })
    }
}

impl TryFrom<leave::Model> for Leave {
    type Error = UnknownVariant;

    fn try_from(m: leave::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: m.id,
            org_id: m.org_id,
            user_id: m.user_id,
            date: m.date,
            kind: m.kind.parse()?,
        })
    }
}

impl TryFrom<deduction::Model> for Deduction {
    type Error = UnknownVariant;

    fn try_from(m: deduction::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: m.id,
            org_id: m.org_id,
            user_id: m.user_id,
            date: m.date,
            kind: m.kind.parse()?,
            minutes: m.minutes,
            description: m.description,
            related_session_id: m.related_session_id,
            related_roll_call_id: m.related_roll_call_id,
        })
    }
}

impl TryFrom<roll_call::Model> for RollCall {
    type Error = UnknownVariant;

    fn try_from(m: roll_call::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: m.id,
            org_id: m.org_id,
            user_id: m.user_id,
            triggered_at: m.triggered_at,
            deadline_at: m.deadline_at,
            responded_at: m.responded_at,
            result: m.result.parse()?,
            response_delay_seconds: m.response_delay_seconds,
        })
    }
}

/// Convert a batch of rows, failing on the first unexpected enum value.
pub fn convert_all<M, T>(rows: Vec<M>) -> Result<Vec<T>, UnknownVariant>
where
    T: TryFrom<M, Error = UnknownVariant>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::model::{RollCallResult, SessionKind};
    use chrono::{TimeZone, Utc};

    #[test]
    fn session_kind_is_parsed() {
        let at = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        let row = work_session::Model {
            id: 1,
            org_id: 2,
            user_id: 3,
            kind: "SHORT_BREAK".into(),
            started_at: at,
            ended_at: None,
        };
        let session = WorkSession::try_from(row).unwrap();
        assert_eq!(session.kind, SessionKind::ShortBreak);
        assert_eq!(session.ended_at, None);
    }

    #[test]
    fn unknown_result_is_an_error() {
        let at = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        let row = roll_call::Model {
            id: 1,
            org_id: 1,
            user_id: 1,
            triggered_at: at,
            deadline_at: at,
            responded_at: None,
            result: "SKIPPED".into(),
            response_delay_seconds: None,
            hour_bucket: at,
            slot: 0,
        };
        assert!(RollCall::try_from(row.clone()).is_err());

        let ok = roll_call::Model {
            result: "MISSED".into(),
            ..row
        };
        assert_eq!(RollCall::try_from(ok).unwrap().result, RollCallResult::Missed);
    }
}
