use crate::database::{corrupt, repo_err, to_i32, to_u32};
use async_trait::async_trait;
use chalet_catalog::{Listing, ListingCategory, ListingFilter, ListingRepository};
use chalet_core::{RepoError, RepoResult};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

pub struct StoreListingRepository {
    pool: PgPool,
}

impl StoreListingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ListingRow {
    id: Uuid,
    owner_id: Uuid,
    name: String,
    description: Option<String>,
    category: String,
    price_per_day: Decimal,
    max_capacity: i32,
    features: Vec<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ListingRow> for Listing {
    type Error = RepoError;

    fn try_from(row: ListingRow) -> Result<Self, Self::Error> {
        Ok(Listing {
            id: row.id,
            owner_id: row.owner_id,
            name: row.name,
            description: row.description,
            category: row.category.parse().map_err(|_| corrupt("category", &row.category))?,
            price_per_day: row.price_per_day,
            max_capacity: to_u32(row.max_capacity, "max_capacity")?,
            features: row.features.into_iter().collect(),
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const COLUMNS: &str =
    "id, owner_id, name, description, category, price_per_day, max_capacity, features, is_active, created_at, updated_at";

#[async_trait]
impl ListingRepository for StoreListingRepository {
    async fn insert(&self, listing: &Listing) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO listings (id, owner_id, name, description, category, price_per_day, max_capacity, features, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(listing.id)
        .bind(listing.owner_id)
        .bind(&listing.name)
        .bind(&listing.description)
        .bind(listing.category.as_str())
        .bind(listing.price_per_day)
        .bind(to_i32(listing.max_capacity, "max_capacity")?)
        .bind(listing.features.iter().cloned().collect::<Vec<String>>())
        .bind(listing.is_active)
        .bind(listing.created_at)
        .bind(listing.updated_at)
        .execute(&self.pool)
        .await
        .map_err(repo_err)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> RepoResult<Option<Listing>> {
        let row: Option<ListingRow> = sqlx::query_as(&format!("SELECT {} FROM listings WHERE id = $1", COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(repo_err)?;
        row.map(Listing::try_from).transpose()
    }

    async fn update(&self, listing: &Listing) -> RepoResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE listings
            SET name = $2, description = $3, category = $4, price_per_day = $5, max_capacity = $6,
                features = $7, is_active = $8, updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(listing.id)
        .bind(&listing.name)
        .bind(&listing.description)
        .bind(listing.category.as_str())
        .bind(listing.price_per_day)
        .bind(to_i32(listing.max_capacity, "max_capacity")?)
        .bind(listing.features.iter().cloned().collect::<Vec<String>>())
        .bind(listing.is_active)
        .bind(listing.updated_at)
        .execute(&self.pool)
        .await
        .map_err(repo_err)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound(format!("listing {}", listing.id)));
        }
        Ok(())
    }

    async fn list(&self, filter: &ListingFilter) -> RepoResult<Vec<Listing>> {
        let rows: Vec<ListingRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM listings
            WHERE ($1::text IS NULL OR category = $1)
              AND ($2::bool IS NULL OR is_active = $2)
              AND ($3::uuid IS NULL OR owner_id = $3)
            ORDER BY created_at DESC
            "#,
            COLUMNS
        ))
        .bind(filter.category.map(|c: ListingCategory| c.as_str()))
        .bind(filter.active)
        .bind(filter.owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(repo_err)?;
        rows.into_iter().map(Listing::try_from).collect()
    }
}
