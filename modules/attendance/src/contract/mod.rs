pub mod client;
pub mod error;
pub mod model;

pub use client::AttendanceApi;
pub use error::AttendanceError;
pub use model::{
    DaySummary, Deduction, DeductionKind, Employee, Leave, LeaveKind, Organization,
    RangeSummary, ResponseOutcome, RollCall, RollCallResult, ScheduledShift, SessionKind,
    ShiftAssignment, ShiftTemplate, ShiftWindow, WindowSource, WorkSession,
};
