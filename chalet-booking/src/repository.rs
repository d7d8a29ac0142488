use crate::models::{Booking, BookingStatus, CustomerService, PaymentStatus, TransportBooking};
use async_trait::async_trait;
use chalet_catalog::availability::CommittedRanges;
use chalet_catalog::DateRange;
use chalet_core::RepoResult;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Result of the storage-level conditional insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// An overlapping pending/confirmed booking exists. The id is known when
    /// the store found it by scanning, not when a constraint fired.
    Conflict { existing: Option<Uuid> },
    DuplicateReference,
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Inserts `booking` only if no pending/confirmed booking on the same
    /// listing overlaps it. Must be atomic against concurrent callers.
    async fn insert_if_available(&self, booking: &Booking) -> RepoResult<InsertOutcome>;
    async fn get(&self, id: Uuid) -> RepoResult<Option<Booking>>;
    async fn find_by_reference(&self, reference: &str) -> RepoResult<Option<Booking>>;
    async fn list_for_user(&self, user_id: Uuid) -> RepoResult<Vec<Booking>>;
    async fn list_for_listing(&self, listing_id: Uuid) -> RepoResult<Vec<Booking>>;
    /// Ranges of bookings that still hold their dates.
    async fn active_ranges(&self, listing_id: Uuid) -> RepoResult<Vec<(Uuid, DateRange)>>;
    /// Moves the booking to `next` only while its stored status is still
    /// `expected`. `None` when the status moved on or the booking is gone.
    async fn update_status(
        &self,
        id: Uuid,
        expected: BookingStatus,
        next: BookingStatus,
    ) -> RepoResult<Option<Booking>>;
    async fn update_payment_status(&self, id: Uuid, status: PaymentStatus) -> RepoResult<Booking>;
}

#[async_trait]
pub trait ServiceRepository: Send + Sync {
    async fn insert(&self, service: &CustomerService) -> RepoResult<()>;
    async fn get(&self, id: Uuid) -> RepoResult<Option<CustomerService>>;
    async fn list_for_booking(&self, booking_id: Uuid) -> RepoResult<Vec<CustomerService>>;
    async fn set_active(&self, id: Uuid, active: bool) -> RepoResult<CustomerService>;
    /// Deactivates unapplied services whose expiry is at or before `now`.
    async fn expire_before(&self, now: DateTime<Utc>) -> RepoResult<u64>;
}

#[async_trait]
pub trait TransportRepository: Send + Sync {
    async fn insert(&self, transport: &TransportBooking) -> RepoResult<()>;
    async fn list_for_booking(&self, booking_id: Uuid) -> RepoResult<Vec<TransportBooking>>;
}

/// Feeds the availability index from the booking collection.
pub struct BookingRangeSource {
    bookings: Arc<dyn BookingRepository>,
}

impl BookingRangeSource {
    pub fn new(bookings: Arc<dyn BookingRepository>) -> Self {
        Self { bookings }
    }
}

#[async_trait]
impl CommittedRanges for BookingRangeSource {
    async fn committed_ranges(&self, listing_id: Uuid) -> RepoResult<Vec<(Uuid, DateRange)>> {
        self.bookings.active_ranges(listing_id).await
    }
}
