use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(EventTypes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EventTypes::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(EventTypes::Name).string().not_null())
                    .col(
                        ColumnDef::new(EventTypes::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .index(
                        Index::create()
                            .name("idx_event_types_name_unique")
                            .table(EventTypes::Table)
                            .col(EventTypes::Name)
                            .unique(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(EventEventTypes::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(EventEventTypes::EventId).uuid().not_null())
                    .col(
                        ColumnDef::new(EventEventTypes::EventTypeId)
                            .uuid()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(EventEventTypes::EventId)
                            .col(EventEventTypes::EventTypeId),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(EventEventTypes::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(EventTypes::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum EventTypes {
    Table,
    Id,
    Name,
    CreatedAt,
}

#[derive(DeriveIden)]
enum EventEventTypes {
    Table,
    EventId,
    EventTypeId,
}
