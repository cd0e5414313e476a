use sea_orm_migration::prelude::*;

use super::m20261019_000001_create_sources::Sources;
use super::m20261019_000002_create_products::Products;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DailySnapshots::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(DailySnapshots::ProductId).uuid().not_null())
                    .col(ColumnDef::new(DailySnapshots::SourceId).uuid().not_null())
                    .col(ColumnDef::new(DailySnapshots::Date).date().not_null())
                    .col(
                        ColumnDef::new(DailySnapshots::PriceBuyClose)
                            .decimal_len(18, 2)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DailySnapshots::PriceSellClose)
                            .decimal_len(18, 2)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DailySnapshots::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .primary_key(
                        Index::create()
                            .col(DailySnapshots::ProductId)
                            .col(DailySnapshots::SourceId)
                            .col(DailySnapshots::Date),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_daily_snapshots_product")
                            .from(DailySnapshots::Table, DailySnapshots::ProductId)
                            .to(Products::Table, Products::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_daily_snapshots_source")
                            .from(DailySnapshots::Table, DailySnapshots::SourceId)
                            .to(Sources::Table, Sources::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_daily_snapshots_date")
                    .table(DailySnapshots::Table)
                    .col(DailySnapshots::Date)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DailySnapshots::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum DailySnapshots {
    Table,
    ProductId,
    SourceId,
    Date,
    PriceBuyClose,
    PriceSellClose,
    UpdatedAt,
}
