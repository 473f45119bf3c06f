//! SeaORM entities. Enum-like columns are stored as upper-case strings.

pub mod deduction;
pub mod leave;
pub mod organization;
pub mod roll_call;
pub mod shift_assignment;
pub mod shift_template;
pub mod user;
pub mod work_session;
