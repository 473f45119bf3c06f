use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Organizations::Table)
                    .if_not_exists()
                    .col(pk(Organizations::Id))
                    .col(ColumnDef::new(Organizations::Name).string().not_null())
                    .col(ColumnDef::new(Organizations::Timezone).string().null())
                    .col(ColumnDef::new(Organizations::Settings).json().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(pk(Users::Id))
                    .col(ColumnDef::new(Users::OrgId).big_integer().not_null())
                    .col(
                        ColumnDef::new(Users::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(Users::Timezone).string().null())
                    .col(
                        ColumnDef::new(Users::AllowUnassignedSessions)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ShiftTemplates::Table)
                    .if_not_exists()
                    .col(pk(ShiftTemplates::Id))
                    .col(ColumnDef::new(ShiftTemplates::OrgId).big_integer().not_null())
                    .col(ColumnDef::new(ShiftTemplates::Name).string().null())
                    .col(ColumnDef::new(ShiftTemplates::DayOfWeek).integer().not_null())
                    .col(ColumnDef::new(ShiftTemplates::StartTime).time().not_null())
                    .col(ColumnDef::new(ShiftTemplates::EndTime).time().not_null())
                    .col(ColumnDef::new(ShiftTemplates::Timezone).string().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ShiftAssignments::Table)
                    .if_not_exists()
                    .col(pk(ShiftAssignments::Id))
                    .col(
                        ColumnDef::new(ShiftAssignments::TemplateId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ShiftAssignments::UserId).big_integer().not_null())
                    .col(
                        ColumnDef::new(ShiftAssignments::EffectiveFrom)
                            .date()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ShiftAssignments::EffectiveTo).date().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_shift_assignments_template")
                            .from(ShiftAssignments::Table, ShiftAssignments::TemplateId)
                            .to(ShiftTemplates::Table, ShiftTemplates::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(WorkSessions::Table)
                    .if_not_exists()
                    .col(pk(WorkSessions::Id))
                    .col(ColumnDef::new(WorkSessions::OrgId).big_integer().not_null())
                    .col(ColumnDef::new(WorkSessions::UserId).big_integer().not_null())
                    .col(ColumnDef::new(WorkSessions::Kind).string().not_null())
                    .col(
                        ColumnDef::new(WorkSessions::StartedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WorkSessions::EndedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Leaves::Table)
                    .if_not_exists()
                    .col(pk(Leaves::Id))
                    .col(ColumnDef::new(Leaves::OrgId).big_integer().not_null())
                    .col(ColumnDef::new(Leaves::UserId).big_integer().not_null())
                    .col(ColumnDef::new(Leaves::Date).date().not_null())
                    .col(ColumnDef::new(Leaves::Kind).string().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Deductions::Table)
                    .if_not_exists()
                    .col(pk(Deductions::Id))
                    .col(ColumnDef::new(Deductions::OrgId).big_integer().not_null())
                    .col(ColumnDef::new(Deductions::UserId).big_integer().not_null())
                    .col(ColumnDef::new(Deductions::Date).date().not_null())
                    .col(ColumnDef::new(Deductions::Kind).string().not_null())
                    .col(ColumnDef::new(Deductions::Minutes).big_integer().not_null())
                    .col(ColumnDef::new(Deductions::Description).string().null())
                    .col(ColumnDef::new(Deductions::RelatedSessionId).big_integer().null())
                    .col(
                        ColumnDef::new(Deductions::RelatedRollCallId)
                            .big_integer()
                            .null(),
                    )
                    .col(ColumnDef::new(Deductions::SingletonKey).string().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RollCalls::Table)
                    .if_not_exists()
                    .col(pk(RollCalls::Id))
                    .col(ColumnDef::new(RollCalls::OrgId).big_integer().not_null())
                    .col(ColumnDef::new(RollCalls::UserId).big_integer().not_null())
                    .col(
                        ColumnDef::new(RollCalls::TriggeredAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RollCalls::DeadlineAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RollCalls::RespondedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(RollCalls::Result).string().not_null())
                    .col(
                        ColumnDef::new(RollCalls::ResponseDelaySeconds)
                            .big_integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(RollCalls::HourBucket)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(RollCalls::Slot).integer().not_null())
                    .to_owned(),
            )
            .await?;

        // Concurrent schedulers race on these; the loser's insert fails.
        manager
            .create_index(
                Index::create()
                    .name("ux_roll_calls_org_bucket_slot")
                    .table(RollCalls::Table)
                    .col(RollCalls::OrgId)
                    .col(RollCalls::HourBucket)
                    .col(RollCalls::Slot)
                    .unique()
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("ux_roll_calls_user_bucket")
                    .table(RollCalls::Table)
                    .col(RollCalls::UserId)
                    .col(RollCalls::HourBucket)
                    .unique()
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("ix_roll_calls_result_deadline")
                    .table(RollCalls::Table)
                    .col(RollCalls::Result)
                    .col(RollCalls::DeadlineAt)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("ux_deductions_singleton_key")
                    .table(Deductions::Table)
                    .col(Deductions::SingletonKey)
                    .unique()
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("ix_deductions_user_date")
                    .table(Deductions::Table)
                    .col(Deductions::UserId)
                    .col(Deductions::Date)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("ix_work_sessions_user_started")
                    .table(WorkSessions::Table)
                    .col(WorkSessions::UserId)
                    .col(WorkSessions::StartedAt)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("ix_shift_assignments_user")
                    .table(ShiftAssignments::Table)
                    .col(ShiftAssignments::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RollCalls::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Deductions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Leaves::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(WorkSessions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ShiftAssignments::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ShiftTemplates::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Organizations::Table).to_owned())
            .await
    }
}

fn pk<T: IntoIden>(name: T) -> ColumnDef {
    ColumnDef::new(name)
        .big_integer()
        .not_null()
        .auto_increment()
        .primary_key()
        .to_owned()
}

#[derive(DeriveIden)]
enum Organizations {
    Table,
    Id,
    Name,
    Timezone,
    Settings,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    OrgId,
    IsActive,
    Timezone,
    AllowUnassignedSessions,
}

#[derive(DeriveIden)]
enum ShiftTemplates {
    Table,
    Id,
    OrgId,
    Name,
    DayOfWeek,
    StartTime,
    EndTime,
    Timezone,
}

#[derive(DeriveIden)]
enum ShiftAssignments {
    Table,
    Id,
    TemplateId,
    UserId,
    EffectiveFrom,
    EffectiveTo,
}

#[derive(DeriveIden)]
enum WorkSessions {
    Table,
    Id,
    OrgId,
    UserId,
    Kind,
    StartedAt,
    EndedAt,
}

#[derive(DeriveIden)]
enum Leaves {
    Table,
    Id,
    OrgId,
    UserId,
    Date,
    Kind,
}

#[derive(DeriveIden)]
enum Deductions {
    Table,
    Id,
    OrgId,
    UserId,
    Date,
    Kind,
    Minutes,
    Description,
    RelatedSessionId,
    RelatedRollCallId,
    SingletonKey,
}

#[derive(DeriveIden)]
enum RollCalls {
    Table,
    Id,
    OrgId,
    UserId,
    TriggeredAt,
    DeadlineAt,
    RespondedAt,
    Result,
    ResponseDelaySeconds,
    HourBucket,
    Slot,
}
