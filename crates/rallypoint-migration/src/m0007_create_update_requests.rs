use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(UpdateRequests::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UpdateRequests::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(UpdateRequests::RegionId).uuid().not_null())
                    .col(ColumnDef::new(UpdateRequests::Kind).string().not_null())
                    .col(
                        ColumnDef::new(UpdateRequests::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(UpdateRequests::SubmittedBy)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UpdateRequests::Payload)
                            .json_binary()
                            .not_null(),
                    )
                    .col(ColumnDef::new(UpdateRequests::Meta).json_binary().null())
                    .col(ColumnDef::new(UpdateRequests::ReviewedBy).uuid().null())
                    .col(
                        ColumnDef::new(UpdateRequests::ReviewedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(UpdateRequests::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(UpdateRequests::UpdatedAt)
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
                    .name("idx_update_requests_region_id")
                    .table(UpdateRequests::Table)
                    .col(UpdateRequests::RegionId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_update_requests_status")
                    .table(UpdateRequests::Table)
                    .col(UpdateRequests::Status)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UpdateRequests::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum UpdateRequests {
    Table,
    Id,
    RegionId,
    Kind,
    Status,
    SubmittedBy,
    Payload,
    Meta,
    ReviewedBy,
    ReviewedAt,
    CreatedAt,
    UpdatedAt,
}
