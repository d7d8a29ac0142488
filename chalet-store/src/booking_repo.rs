use crate::database::{corrupt, repo_err, to_i32, to_u32, EXCLUSION_VIOLATION};
use async_trait::async_trait;
use chalet_booking::{Booking, BookingRepository, BookingStatus, InsertOutcome, PaymentStatus};
use chalet_catalog::DateRange;
use chalet_core::{RepoError, RepoResult};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::error::ErrorKind;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

const REFERENCE_CONSTRAINT: &str = "bookings_reference_key";

/// Postgres booking store. Conditional inserts are serialized per listing by
/// a transaction-scoped advisory lock; the exclusion constraint backs it up.
pub struct StoreBookingRepository {
    pool: PgPool,
}

impl StoreBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    reference: String,
    listing_id: Uuid,
    user_id: Uuid,
    check_in: NaiveDate,
    check_out: NaiveDate,
    guests: i32,
    special_requests: Option<String>,
    subtotal: Decimal,
    discount_amount: Decimal,
    cashback_amount: Decimal,
    total_amount: Decimal,
    status: String,
    payment_status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = RepoError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: row.id,
            reference: row.reference,
            listing_id: row.listing_id,
            user_id: row.user_id,
            check_in: row.check_in,
            check_out: row.check_out,
            guests: to_u32(row.guests, "guests")?,
            special_requests: row.special_requests,
            subtotal: row.subtotal,
            discount_amount: row.discount_amount,
            cashback_amount: row.cashback_amount,
            total_amount: row.total_amount,
            status: row.status.parse().map_err(|_| corrupt("status", &row.status))?,
            payment_status: row
                .payment_status
                .parse()
                .map_err(|_| corrupt("payment_status", &row.payment_status))?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const COLUMNS: &str = "id, reference, listing_id, user_id, check_in, check_out, guests, special_requests, \
     subtotal, discount_amount, cashback_amount, total_amount, status, payment_status, created_at, updated_at";

impl StoreBookingRepository {
    async fn fetch_where(&self, clause: &str, id: Uuid) -> RepoResult<Vec<Booking>> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM bookings WHERE {} ORDER BY created_at DESC",
            COLUMNS, clause
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(repo_err)?;
        rows.into_iter().map(Booking::try_from).collect()
    }

    /// Single-column update returning the new row.
    async fn set_column(&self, column: &str, id: Uuid, value: &str) -> RepoResult<Booking> {
        let query = format!(
            "UPDATE bookings SET {} = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            column, COLUMNS
        );
        let row: Option<BookingRow> = sqlx::query_as(&query)
            .bind(id)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(repo_err)?;
        row.ok_or_else(|| RepoError::NotFound(format!("booking {}", id)))?
            .try_into()
    }
}

#[async_trait]
impl BookingRepository for StoreBookingRepository {
    async fn insert_if_available(&self, booking: &Booking) -> RepoResult<InsertOutcome> {
        let mut tx = self.pool.begin().await.map_err(repo_err)?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(booking.listing_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(repo_err)?;

        let existing: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM bookings
            WHERE listing_id = $1
              AND status IN ('pending', 'confirmed')
              AND check_in < $3
              AND $2 < check_out
            LIMIT 1
            "#,
        )
        .bind(booking.listing_id)
        .bind(booking.check_in)
        .bind(booking.check_out)
        .fetch_optional(&mut *tx)
        .await
        .map_err(repo_err)?;

        if let Some(existing) = existing {
            tx.rollback().await.map_err(repo_err)?;
            return Ok(InsertOutcome::Conflict {
                existing: Some(existing),
            });
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO bookings (id, reference, listing_id, user_id, check_in, check_out, guests, special_requests,
                                  subtotal, discount_amount, cashback_amount, total_amount, status, payment_status,
                                  created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(booking.id)
        .bind(&booking.reference)
        .bind(booking.listing_id)
        .bind(booking.user_id)
        .bind(booking.check_in)
        .bind(booking.check_out)
        .bind(to_i32(booking.guests, "guests")?)
        .bind(&booking.special_requests)
        .bind(booking.subtotal)
        .bind(booking.discount_amount)
        .bind(booking.cashback_amount)
        .bind(booking.total_amount)
        .bind(booking.status.as_str())
        .bind(booking.payment_status.as_str())
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {
                tx.commit().await.map_err(repo_err)?;
                Ok(InsertOutcome::Inserted)
            }
            Err(sqlx::Error::Database(db))
                if db.kind() == ErrorKind::UniqueViolation && db.constraint() == Some(REFERENCE_CONSTRAINT) =>
            {
                Ok(InsertOutcome::DuplicateReference)
            }
            Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some(EXCLUSION_VIOLATION) => {
                warn!(listing_id = %booking.listing_id, "exclusion constraint rejected overlapping booking");
                Ok(InsertOutcome::Conflict { existing: None })
            }
            Err(e) => Err(repo_err(e)),
        }
    }

    async fn get(&self, id: Uuid) -> RepoResult<Option<Booking>> {
        let row: Option<BookingRow> = sqlx::query_as(&format!("SELECT {} FROM bookings WHERE id = $1", COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(repo_err)?;
        row.map(Booking::try_from).transpose()
    }

    async fn find_by_reference(&self, reference: &str) -> RepoResult<Option<Booking>> {
        let row: Option<BookingRow> =
            sqlx::query_as(&format!("SELECT {} FROM bookings WHERE reference = $1", COLUMNS))
                .bind(reference)
                .fetch_optional(&self.pool)
                .await
                .map_err(repo_err)?;
        row.map(Booking::try_from).transpose()
    }

    async fn list_for_user(&self, user_id: Uuid) -> RepoResult<Vec<Booking>> {
        self.fetch_where("user_id = $1", user_id).await
    }

    async fn list_for_listing(&self, listing_id: Uuid) -> RepoResult<Vec<Booking>> {
        self.fetch_where("listing_id = $1", listing_id).await
    }

    async fn active_ranges(&self, listing_id: Uuid) -> RepoResult<Vec<(Uuid, DateRange)>> {
        let rows: Vec<(Uuid, NaiveDate, NaiveDate)> = sqlx::query_as(
            "SELECT id, check_in, check_out FROM bookings WHERE listing_id = $1 AND status IN ('pending', 'confirmed')",
        )
        .bind(listing_id)
        .fetch_all(&self.pool)
        .await
        .map_err(repo_err)?;

        rows.into_iter()
            .map(|(id, check_in, check_out)| {
                DateRange::new(check_in, check_out)
                    .map(|range| (id, range))
                    .map_err(|e| RepoError::Corrupt(e.to_string()))
            })
            .collect()
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected: BookingStatus,
        next: BookingStatus,
    ) -> RepoResult<Option<Booking>> {
        let query = format!(
            "UPDATE bookings SET status = $2, updated_at = NOW() WHERE id = $1 AND status = $3 RETURNING {}",
            COLUMNS
        );
        let row: Option<BookingRow> = sqlx::query_as(&query)
            .bind(id)
            .bind(next.as_str())
            .bind(expected.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(repo_err)?;
        row.map(Booking::try_from).transpose()
    }

    async fn update_payment_status(&self, id: Uuid, status: PaymentStatus) -> RepoResult<Booking> {
        self.set_column("payment_status", id, status.as_str()).await
    }
}
