use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Products::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Products::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Products::Brand).string_len(64).not_null())
                    .col(ColumnDef::new(Products::Form).string_len(16).not_null())
                    .col(ColumnDef::new(Products::Karat).small_integer().null())
                    .col(ColumnDef::new(Products::Region).string_len(64).null())
                    .col(
                        ColumnDef::new(Products::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // NULL karat/region must collide with each other, so the identity
        // index is over coalesced expressions
        let db = manager.get_connection();
        db.execute_unprepared(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_products_identity
            ON products (brand, form, COALESCE(karat, -1), COALESCE(region, ''))
            "#,
        )
        .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared("DROP INDEX IF EXISTS idx_products_identity;")
            .await?;

        manager
            .drop_table(Table::drop().table(Products::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Products {
    Table,
    Id,
    Brand,
    Form,
    Karat,
    Region,
    CreatedAt,
}
