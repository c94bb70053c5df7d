use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Locations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Locations::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Locations::OrgId).uuid().not_null())
                    .col(ColumnDef::new(Locations::Name).string().not_null())
                    .col(ColumnDef::new(Locations::Description).string().null())
                    .col(ColumnDef::new(Locations::AddressStreet).string().null())
                    .col(ColumnDef::new(Locations::AddressCity).string().null())
                    .col(ColumnDef::new(Locations::AddressState).string().null())
                    .col(ColumnDef::new(Locations::AddressZip).string().null())
                    .col(ColumnDef::new(Locations::AddressCountry).string().null())
                    .col(ColumnDef::new(Locations::Latitude).double().null())
                    .col(ColumnDef::new(Locations::Longitude).double().null())
                    .col(
                        ColumnDef::new(Locations::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Locations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Locations::UpdatedAt)
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
                    .name("idx_locations_org_id")
                    .table(Locations::Table)
                    .col(Locations::OrgId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Locations::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Locations {
    Table,
    Id,
    OrgId,
    Name,
    Description,
    AddressStreet,
    AddressCity,
    AddressState,
    AddressZip,
    AddressCountry,
    Latitude,
    Longitude,
    IsActive,
    CreatedAt,
    UpdatedAt,
}
