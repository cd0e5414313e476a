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
                    .table(PriceTicks::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PriceTicks::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PriceTicks::ProductId).uuid().not_null())
                    .col(ColumnDef::new(PriceTicks::SourceId).uuid().not_null())
                    .col(ColumnDef::new(PriceTicks::PriceBuy).decimal_len(18, 2).not_null())
                    .col(ColumnDef::new(PriceTicks::PriceSell).decimal_len(18, 2).not_null())
                    .col(ColumnDef::new(PriceTicks::Currency).char_len(3).not_null())
                    .col(
                        ColumnDef::new(PriceTicks::CollectedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PriceTicks::EffectiveAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PriceTicks::RawHash).char_len(64).not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_price_ticks_product")
                            .from(PriceTicks::Table, PriceTicks::ProductId)
                            .to(Products::Table, Products::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_price_ticks_source")
                            .from(PriceTicks::Table, PriceTicks::SourceId)
                            .to(Sources::Table, Sources::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Deduplication key for inserts
        manager
            .create_index(
                Index::create()
                    .name("idx_price_ticks_product_source_effective")
                    .table(PriceTicks::Table)
                    .col(PriceTicks::ProductId)
                    .col(PriceTicks::SourceId)
                    .col(PriceTicks::EffectiveAt)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_price_ticks_effective_at")
                    .table(PriceTicks::Table)
                    .col(PriceTicks::EffectiveAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PriceTicks::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum PriceTicks {
    Table,
    Id,
    ProductId,
    SourceId,
    PriceBuy,
    PriceSell,
    Currency,
    CollectedAt,
    EffectiveAt,
    RawHash,
}
