use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "deductions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub org_id: i64,
    pub user_id: i64,
    pub date: Date,
    /// OVERBREAK | ROLLCALL
    pub kind: String,
    pub minutes: i64,
    pub description: Option<String>,
    pub related_session_id: Option<i64>,
    pub related_roll_call_id: Option<i64>,
    /// `overbreak:{user}:{date}` for OVERBREAK rows, NULL otherwise.
    #[sea_orm(unique)]
    pub singleton_key: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
