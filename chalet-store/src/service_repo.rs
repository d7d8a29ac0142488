use crate::database::{corrupt, repo_err, to_i32, to_u32};
use async_trait::async_trait;
use chalet_booking::{CustomerService, ServiceRepository, TransportBooking, TransportRepository};
use chalet_core::{RepoError, RepoResult};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

pub struct StoreServiceRepository {
    pool: PgPool,
}

impl StoreServiceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ServiceRow {
    id: Uuid,
    booking_id: Uuid,
    user_id: Uuid,
    service_type: String,
    details: Json<serde_json::Value>,
    is_active: bool,
    applied_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ServiceRow> for CustomerService {
    type Error = RepoError;

    fn try_from(row: ServiceRow) -> Result<Self, Self::Error> {
        Ok(CustomerService {
            id: row.id,
            booking_id: row.booking_id,
            user_id: row.user_id,
            service_type: row
                .service_type
                .parse()
                .map_err(|_| corrupt("service_type", &row.service_type))?,
            details: row.details.0,
            is_active: row.is_active,
            applied_at: row.applied_at,
            expires_at: row.expires_at,
            created_at: row.created_at,
        })
    }
}

const SERVICE_COLUMNS: &str = "id, booking_id, user_id, service_type, details, is_active, applied_at, expires_at, created_at";

#[async_trait]
impl ServiceRepository for StoreServiceRepository {
    async fn insert(&self, service: &CustomerService) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO customer_services (id, booking_id, user_id, service_type, details, is_active, applied_at, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(service.id)
        .bind(service.booking_id)
        .bind(service.user_id)
        .bind(service.service_type.as_str())
        .bind(Json(&service.details))
        .bind(service.is_active)
        .bind(service.applied_at)
        .bind(service.expires_at)
        .bind(service.created_at)
        .execute(&self.pool)
        .await
        .map_err(repo_err)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> RepoResult<Option<CustomerService>> {
        let row: Option<ServiceRow> =
            sqlx::query_as(&format!("SELECT {} FROM customer_services WHERE id = $1", SERVICE_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(repo_err)?;
        row.map(CustomerService::try_from).transpose()
    }

    async fn list_for_booking(&self, booking_id: Uuid) -> RepoResult<Vec<CustomerService>> {
        let rows: Vec<ServiceRow> = sqlx::query_as(&format!(
            "SELECT {} FROM customer_services WHERE booking_id = $1 ORDER BY created_at",
            SERVICE_COLUMNS
        ))
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await
        .map_err(repo_err)?;
        rows.into_iter().map(CustomerService::try_from).collect()
    }

    async fn set_active(&self, id: Uuid, active: bool) -> RepoResult<CustomerService> {
        let row: Option<ServiceRow> = sqlx::query_as(&format!(
            "UPDATE customer_services SET is_active = $2 WHERE id = $1 RETURNING {}",
            SERVICE_COLUMNS
        ))
        .bind(id)
        .bind(active)
        .fetch_optional(&self.pool)
        .await
        .map_err(repo_err)?;
        row.ok_or_else(|| RepoError::NotFound(format!("service {}", id)))?
            .try_into()
    }

    async fn expire_before(&self, now: DateTime<Utc>) -> RepoResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE customer_services
            SET is_active = FALSE
            WHERE is_active AND applied_at IS NULL AND expires_at IS NOT NULL AND expires_at <= $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(repo_err)?;
        Ok(result.rows_affected())
    }
}

pub struct StoreTransportRepository {
    pool: PgPool,
}

impl StoreTransportRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TransportRow {
    id: Uuid,
    booking_id: Uuid,
    transport_type: String,
    pickup_location: String,
    pickup_time: DateTime<Utc>,
    return_time: Option<DateTime<Utc>>,
    passengers: i32,
    price: Decimal,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransportRow> for TransportBooking {
    type Error = RepoError;

    fn try_from(row: TransportRow) -> Result<Self, Self::Error> {
        Ok(TransportBooking {
            id: row.id,
            booking_id: row.booking_id,
            transport_type: row
                .transport_type
                .parse()
                .map_err(|_| corrupt("transport_type", &row.transport_type))?,
            pickup_location: row.pickup_location,
            pickup_time: row.pickup_time,
            return_time: row.return_time,
            passengers: to_u32(row.passengers, "passengers")?,
            price: row.price,
            status: row.status.parse().map_err(|_| corrupt("status", &row.status))?,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl TransportRepository for StoreTransportRepository {
    async fn insert(&self, transport: &TransportBooking) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO transport_bookings (id, booking_id, transport_type, pickup_location, pickup_time, return_time, passengers, price, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(transport.id)
        .bind(transport.booking_id)
        .bind(transport.transport_type.as_str())
        .bind(&transport.pickup_location)
        .bind(transport.pickup_time)
        .bind(transport.return_time)
        .bind(to_i32(transport.passengers, "passengers")?)
        .bind(transport.price)
        .bind(transport.status.as_str())
        .bind(transport.created_at)
        .execute(&self.pool)
        .await
        .map_err(repo_err)?;
        Ok(())
    }

    async fn list_for_booking(&self, booking_id: Uuid) -> RepoResult<Vec<TransportBooking>> {
        let rows: Vec<TransportRow> = sqlx::query_as(
            r#"
            SELECT id, booking_id, transport_type, pickup_location, pickup_time, return_time, passengers, price, status, created_at
            FROM transport_bookings WHERE booking_id = $1 ORDER BY created_at
            "#,
        )
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await
        .map_err(repo_err)?;
        rows.into_iter().map(TransportBooking::try_from).collect()
    }
}
