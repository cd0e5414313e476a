pub use sea_orm_migration::prelude::*;

mod m20261019_000001_create_sources;
mod m20261019_000002_create_products;
mod m20261019_000003_create_price_ticks;
mod m20261019_000004_create_daily_snapshots;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261019_000001_create_sources::Migration),
            Box::new(m20261019_000002_create_products::Migration),
            Box::new(m20261019_000003_create_price_ticks::Migration),
            Box::new(m20261019_000004_create_daily_snapshots::Migration),
        ]
    }
}
