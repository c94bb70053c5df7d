use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Orgs::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Orgs::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Orgs::ParentId).uuid().null())
                    .col(ColumnDef::new(Orgs::OrgType).string().not_null())
                    .col(ColumnDef::new(Orgs::Name).string().not_null())
                    .col(ColumnDef::new(Orgs::Description).string().null())
                    .col(ColumnDef::new(Orgs::Website).string().null())
                    .col(
                        ColumnDef::new(Orgs::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Orgs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Orgs::UpdatedAt)
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
                    .name("idx_orgs_parent_id")
                    .table(Orgs::Table)
                    .col(Orgs::ParentId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        // One org name per parent; the nation root is unique by having no parent.
        manager
            .create_index(
                Index::create()
                    .name("idx_orgs_parent_name_unique")
                    .table(Orgs::Table)
                    .col(Orgs::ParentId)
                    .col(Orgs::Name)
                    .unique()
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Orgs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Orgs {
    Table,
    Id,
    ParentId,
    OrgType,
    Name,
    Description,
    Website,
    IsActive,
    CreatedAt,
    UpdatedAt,
}
