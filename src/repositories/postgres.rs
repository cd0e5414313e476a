//! Postgres-backed repositories on SeaORM

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseBackend, DatabaseConnection, EntityTrait, FromQueryResult, QueryFilter,
    Statement, Value,
};
use uuid::Uuid;

use super::{DailySnapshotRepository, ProductRepository, RepoError, SourceRepository, TickRepository};
use crate::config::ConflictPolicy;
use crate::entities::{products, sources};
use crate::models::price::{
    CanonicalPriceTick, DailySnapshot, DayChange, GoldForm, Product, Source, StoredTick, TickFilter,
};
use crate::services::daily_close;

const FILTER_CLAUSE: &str = r#"
    ($1::text IS NULL OR p.form = $1)
    AND ($2::text IS NULL OR p.brand = $2)
    AND ($3::text IS NULL OR p.region = $3)
"#;

#[derive(Clone)]
pub struct PgStore {
    db: DatabaseConnection,
    timezone: Tz,
    conflict_policy: ConflictPolicy,
}

impl PgStore {
    pub fn new(db: DatabaseConnection, timezone: Tz, conflict_policy: ConflictPolicy) -> Self {
        Self {
            db,
            timezone,
            conflict_policy,
        }
    }

    fn statement(sql: &str, values: Vec<Value>) -> Statement {
        Statement::from_sql_and_values(DatabaseBackend::Postgres, sql, values)
    }

    fn filter_values(filter: &TickFilter) -> Vec<Value> {
        vec![
            filter.form.map(|f| f.as_str().to_string()).into(),
            filter.brand.clone().into(),
            filter.region.clone().into(),
        ]
    }
}

fn to_source(model: sources::Model) -> Source {
    Source {
        id: model.id,
        name: model.name,
        base_url: model.base_url,
    }
}

fn to_product(model: products::Model) -> Result<Product, RepoError> {
    let form = GoldForm::from_str(&model.form)
        .ok_or_else(|| RepoError::Invalid(format!("unknown form '{}' on product {}", model.form, model.id)))?;
    let karat = model
        .karat
        .map(u8::try_from)
        .transpose()
        .map_err(|_| RepoError::Invalid(format!("karat out of range on product {}", model.id)))?;

    Ok(Product {
        id: model.id,
        brand: model.brand,
        form,
        karat,
        region: model.region,
    })
}

#[derive(Debug, FromQueryResult)]
struct TickRow {
    id: i64,
    product_id: Uuid,
    source_id: Uuid,
    price_buy: Decimal,
    price_sell: Decimal,
    currency: String,
    collected_at: DateTime<Utc>,
    effective_at: DateTime<Utc>,
    raw_hash: String,
}

impl From<TickRow> for StoredTick {
    fn from(row: TickRow) -> Self {
        StoredTick {
            id: row.id,
            product_id: row.product_id,
            source_id: row.source_id,
            price_buy: row.price_buy,
            price_sell: row.price_sell,
            currency: row.currency,
            collected_at: row.collected_at,
            effective_at: row.effective_at,
            raw_hash: row.raw_hash,
        }
    }
}

#[derive(Debug, FromQueryResult)]
struct SnapshotRow {
    product_id: Uuid,
    source_id: Uuid,
    date: NaiveDate,
    price_buy_close: Decimal,
    price_sell_close: Decimal,
}

impl From<SnapshotRow> for DailySnapshot {
    fn from(row: SnapshotRow) -> Self {
        DailySnapshot {
            product_id: row.product_id,
            source_id: row.source_id,
            date: row.date,
            price_buy_close: row.price_buy_close,
            price_sell_close: row.price_sell_close,
        }
    }
}

#[async_trait]
impl SourceRepository for PgStore {
    async fn get_by_name(&self, name: &str) -> Result<Option<Source>, RepoError> {
        let model = sources::Entity::find()
            .filter(sources::Column::Name.eq(name))
            .one(&self.db)
            .await?;

        Ok(model.map(to_source))
    }

    async fn ensure(&self, name: &str, base_url: &str) -> Result<Source, RepoError> {
        let model = sources::Entity::find()
            .from_raw_sql(Self::statement(
                r#"
                INSERT INTO sources (id, name, base_url, created_at)
                VALUES ($1, $2, $3, now())
                ON CONFLICT (name) DO UPDATE SET base_url = EXCLUDED.base_url
                RETURNING *
                "#,
                vec![Uuid::new_v4().into(), name.into(), base_url.into()],
            ))
            .one(&self.db)
            .await?
            .ok_or_else(|| RepoError::NotFound(format!("source {}", name)))?;

        Ok(to_source(model))
    }
}

#[async_trait]
impl ProductRepository for PgStore {
    async fn find(
        &self,
        brand: &str,
        form: GoldForm,
        karat: Option<u8>,
        region: Option<&str>,
    ) -> Result<Option<Product>, RepoError> {
        let mut query = products::Entity::find()
            .filter(products::Column::Brand.eq(brand))
            .filter(products::Column::Form.eq(form.as_str()));

        query = match karat {
            Some(k) => query.filter(products::Column::Karat.eq(i16::from(k))),
            None => query.filter(products::Column::Karat.is_null()),
        };
        query = match region {
            Some(r) => query.filter(products::Column::Region.eq(r)),
            None => query.filter(products::Column::Region.is_null()),
        };

        query.one(&self.db).await?.map(to_product).transpose()
    }

    async fn find_or_create(
        &self,
        brand: &str,
        form: GoldForm,
        karat: Option<u8>,
        region: Option<&str>,
    ) -> Result<Product, RepoError> {
        if let Some(existing) = self.find(brand, form, karat, region).await? {
            return Ok(existing);
        }

        let created = products::Entity::find()
            .from_raw_sql(Self::statement(
                r#"
                INSERT INTO products (id, brand, form, karat, region, created_at)
                VALUES ($1, $2, $3, $4, $5, now())
                ON CONFLICT DO NOTHING
                RETURNING *
                "#,
                vec![
                    Uuid::new_v4().into(),
                    brand.into(),
                    form.as_str().into(),
                    karat.map(i16::from).into(),
                    region.map(str::to_string).into(),
                ],
            ))
            .one(&self.db)
            .await?;

        match created {
            Some(model) => to_product(model),
            // Lost a race with a concurrent insert of the same identity
            None => self
                .find(brand, form, karat, region)
                .await?
                .ok_or_else(|| RepoError::NotFound(format!("product {}/{}", brand, form))),
        }
    }
}

#[async_trait]
impl TickRepository for PgStore {
    async fn insert(&self, tick: &CanonicalPriceTick) -> Result<bool, RepoError> {
        let conflict = match self.conflict_policy {
            ConflictPolicy::DoNothing => "DO NOTHING",
            ConflictPolicy::Update => {
                "DO UPDATE SET price_buy = EXCLUDED.price_buy, price_sell = EXCLUDED.price_sell, \
                 currency = EXCLUDED.currency, collected_at = EXCLUDED.collected_at, raw_hash = EXCLUDED.raw_hash"
            }
        };

        let sql = format!(
            r#"
            INSERT INTO price_ticks
                (product_id, source_id, price_buy, price_sell, currency, collected_at, effective_at, raw_hash)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (product_id, source_id, effective_at) {}
            "#,
            conflict
        );

        let result = self
            .db
            .execute(Self::statement(
                &sql,
                vec![
                    tick.product_id().into(),
                    tick.source_id().into(),
                    tick.price_buy().into(),
                    tick.price_sell().into(),
                    tick.currency().into(),
                    tick.collected_at().into(),
                    tick.effective_at().into(),
                    tick.raw_hash().into(),
                ],
            ))
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn latest(&self, filter: &TickFilter) -> Result<Vec<StoredTick>, RepoError> {
        let sql = format!(
            r#"
            SELECT DISTINCT ON (t.product_id, t.source_id)
                t.id, t.product_id, t.source_id, t.price_buy, t.price_sell,
                t.currency, t.collected_at, t.effective_at, t.raw_hash
            FROM price_ticks t
            JOIN products p ON p.id = t.product_id
            WHERE {}
            ORDER BY t.product_id, t.source_id, t.effective_at DESC, t.collected_at DESC, t.id DESC
            "#,
            FILTER_CLAUSE
        );

        let rows = TickRow::find_by_statement(Self::statement(&sql, Self::filter_values(filter)))
            .all(&self.db)
            .await?;

        Ok(rows.into_iter().map(StoredTick::from).collect())
    }

    async fn history(&self, filter: &TickFilter, since: NaiveDate) -> Result<Vec<DailySnapshot>, RepoError> {
        let sql = format!(
            r#"
            SELECT s.product_id, s.source_id, s.date, s.price_buy_close, s.price_sell_close
            FROM daily_snapshots s
            JOIN products p ON p.id = s.product_id
            WHERE {} AND s.date >= $4
            ORDER BY s.date, s.product_id, s.source_id
            "#,
            FILTER_CLAUSE
        );

        let mut values = Self::filter_values(filter);
        values.push(since.into());

        let rows = SnapshotRow::find_by_statement(Self::statement(&sql, values))
            .all(&self.db)
            .await?;

        Ok(rows.into_iter().map(DailySnapshot::from).collect())
    }

    async fn day_over_day(&self, filter: &TickFilter) -> Result<Vec<DayChange>, RepoError> {
        let sql = format!(
            r#"
            SELECT product_id, source_id, date, price_buy_close, price_sell_close
            FROM (
                SELECT s.*,
                       ROW_NUMBER() OVER (PARTITION BY s.product_id, s.source_id ORDER BY s.date DESC) AS rn
                FROM daily_snapshots s
                JOIN products p ON p.id = s.product_id
                WHERE {}
            ) ranked
            WHERE rn <= 2
            "#,
            FILTER_CLAUSE
        );

        let rows = SnapshotRow::find_by_statement(Self::statement(&sql, Self::filter_values(filter)))
            .all(&self.db)
            .await?;

        let snapshots: Vec<DailySnapshot> = rows.into_iter().map(DailySnapshot::from).collect();
        Ok(daily_close::day_over_day(&snapshots))
    }
}

#[async_trait]
impl DailySnapshotRepository for PgStore {
    async fn upsert_daily_close(&self, date: NaiveDate) -> Result<usize, RepoError> {
        let result = self
            .db
            .execute(Self::statement(
                r#"
                INSERT INTO daily_snapshots
                    (product_id, source_id, date, price_buy_close, price_sell_close, updated_at)
                SELECT DISTINCT ON (product_id, source_id)
                    product_id, source_id, $1::date, price_buy, price_sell, now()
                FROM price_ticks
                WHERE (effective_at AT TIME ZONE $2)::date = $1::date
                ORDER BY product_id, source_id, effective_at DESC, collected_at DESC, id DESC
                ON CONFLICT (product_id, source_id, date) DO UPDATE SET
                    price_buy_close = EXCLUDED.price_buy_close,
                    price_sell_close = EXCLUDED.price_sell_close,
                    updated_at = now()
                "#,
                vec![date.into(), self.timezone.name().into()],
            ))
            .await?;

        Ok(result.rows_affected() as usize)
    }
}
