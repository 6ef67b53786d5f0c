use sea_orm_migration::prelude::extension::postgres::Type;
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Postgres enum for grant attribution categories
        manager
            .create_type(
                Type::create()
                    .as_enum(GrantTypeEnum)
                    .values([
                        GrantTypeVariants::Free,
                        GrantTypeVariants::Purchase,
                        GrantTypeVariants::Referral,
                        GrantTypeVariants::Admin,
                        GrantTypeVariants::Organization,
                        GrantTypeVariants::Ad,
                    ])
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CreditGrants::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CreditGrants::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(CreditGrants::OwnerId).uuid().not_null())
                    .col(ColumnDef::new(CreditGrants::OrganizationId).uuid().null())
                    .col(
                        ColumnDef::new(CreditGrants::GrantType)
                            .custom(GrantTypeEnum)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CreditGrants::Principal)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CreditGrants::Balance)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(CreditGrants::Priority)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(CreditGrants::Description).string().null())
                    .col(
                        ColumnDef::new(CreditGrants::ExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(CreditGrants::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Consumption-order queries filter by owner and sort by priority
        manager
            .create_index(
                Index::create()
                    .name("idx_credit_grants_owner_priority")
                    .table(CreditGrants::Table)
                    .col(CreditGrants::OwnerId)
                    .col(CreditGrants::Priority)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_credit_grants_owner_expires")
                    .table(CreditGrants::Table)
                    .col(CreditGrants::OwnerId)
                    .col(CreditGrants::ExpiresAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CreditGrants::Table).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(GrantTypeEnum).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum CreditGrants {
    Table,
    Id,
    OwnerId,
    OrganizationId,
    GrantType,
    Principal,
    Balance,
    Priority,
    Description,
    ExpiresAt,
    CreatedAt,
}

#[derive(DeriveIden)]
#[sea_orm(iden = "grant_type")]
struct GrantTypeEnum;

#[derive(DeriveIden)]
enum GrantTypeVariants {
    Free,
    Purchase,
    Referral,
    Admin,
    Organization,
    Ad,
}
