use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "roll_calls")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub org_id: i64,
    pub user_id: i64,
    pub triggered_at: DateTimeUtc,
    pub deadline_at: DateTimeUtc,
    pub responded_at: Option<DateTimeUtc>,
    /// PENDING | PASSED | LATE | MISSED
    pub result: String,
    pub response_delay_seconds: Option<i64>,
    pub hour_bucket: DateTimeUtc,
    pub slot: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
