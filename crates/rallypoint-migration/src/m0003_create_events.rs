use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Events::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Events::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Events::OrgId).uuid().not_null())
                    .col(ColumnDef::new(Events::LocationId).uuid().not_null())
                    .col(ColumnDef::new(Events::Name).string().not_null())
                    .col(ColumnDef::new(Events::Description).string().null())
                    .col(ColumnDef::new(Events::DayOfWeek).string().not_null())
                    .col(ColumnDef::new(Events::StartTime).string().not_null())
                    .col(ColumnDef::new(Events::EndTime).string().null())
                    .col(
                        ColumnDef::new(Events::Recurrence)
                            .string()
                            .not_null()
                            .default("weekly"),
                    )
                    .col(
                        ColumnDef::new(Events::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Events::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Events::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_events_org_id")
                    .table(Events::Table)
                    .col(Events::OrgId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_events_location_id")
                    .table(Events::Table)
                    .col(Events::LocationId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Events::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Events {
    Table,
    Id,
    OrgId,
    LocationId,
    Name,
    Description,
    DayOfWeek,
    StartTime,
    EndTime,
    Recurrence,
    IsActive,
    CreatedAt,
    UpdatedAt,
}
