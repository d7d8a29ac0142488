use crate::models::{Booking, BookingStatus, CustomerService, PaymentStatus, TransportBooking};
use crate::repository::{BookingRepository, InsertOutcome, ServiceRepository, TransportRepository};
use async_trait::async_trait;
use chalet_catalog::DateRange;
use chalet_core::{RepoError, RepoResult};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-process booking store. The conditional insert runs under the write
/// lock, which makes it atomic for every caller sharing the instance.
#[derive(Default)]
pub struct InMemoryBookingRepository {
    bookings: RwLock<HashMap<Uuid, Booking>>,
    fail_inserts: AtomicBool,
    insert_delay: StdMutex<Option<Duration>>,
}

impl InMemoryBookingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent inserts fail as if the backend were down.
    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Stalls subsequent inserts before they touch the map.
    pub fn delay_inserts(&self, delay: Option<Duration>) {
        *self.insert_delay.lock().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    pub async fn len(&self) -> usize {
        self.bookings.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn modify<F>(&self, id: Uuid, f: F) -> RepoResult<Booking>
    where
        F: FnOnce(&mut Booking),
    {
        let mut bookings = self.bookings.write().await;
        let booking = bookings
            .get_mut(&id)
            .ok_or_else(|| RepoError::NotFound(format!("booking {}", id)))?;
        f(booking);
        booking.updated_at = Utc::now();
        Ok(booking.clone())
    }
}

fn newest_first(mut bookings: Vec<Booking>) -> Vec<Booking> {
    bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    bookings
}

#[async_trait]
impl BookingRepository for InMemoryBookingRepository {
    async fn insert_if_available(&self, booking: &Booking) -> RepoResult<InsertOutcome> {
        let delay = *self.insert_delay.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(RepoError::Unavailable("booking store rejected the write".into()));
        }

        let mut bookings = self.bookings.write().await;
        if bookings.values().any(|b| b.reference == booking.reference) {
            return Ok(InsertOutcome::DuplicateReference);
        }
        let range = booking.range();
        if let Some(existing) = bookings.values().find(|b| {
            b.listing_id == booking.listing_id && b.status.holds_dates() && b.range().overlaps(&range)
        }) {
            return Ok(InsertOutcome::Conflict {
                existing: Some(existing.id),
            });
        }
        bookings.insert(booking.id, booking.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn get(&self, id: Uuid) -> RepoResult<Option<Booking>> {
        Ok(self.bookings.read().await.get(&id).cloned())
    }

    async fn find_by_reference(&self, reference: &str) -> RepoResult<Option<Booking>> {
        Ok(self
            .bookings
            .read()
            .await
            .values()
            .find(|b| b.reference == reference)
            .cloned())
    }

    async fn list_for_user(&self, user_id: Uuid) -> RepoResult<Vec<Booking>> {
        let bookings = self.bookings.read().await;
        Ok(newest_first(bookings.values().filter(|b| b.user_id == user_id).cloned().collect()))
    }

    async fn list_for_listing(&self, listing_id: Uuid) -> RepoResult<Vec<Booking>> {
        let bookings = self.bookings.read().await;
        Ok(newest_first(
            bookings.values().filter(|b| b.listing_id == listing_id).cloned().collect(),
        ))
    }

    async fn active_ranges(&self, listing_id: Uuid) -> RepoResult<Vec<(Uuid, DateRange)>> {
        let bookings = self.bookings.read().await;
        Ok(bookings
            .values()
            .filter(|b| b.listing_id == listing_id && b.status.holds_dates())
            .map(|b| (b.id, b.range()))
            .collect())
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected: BookingStatus,
        next: BookingStatus,
    ) -> RepoResult<Option<Booking>> {
        let mut bookings = self.bookings.write().await;
        Ok(bookings.get_mut(&id).filter(|b| b.status == expected).map(|b| {
            b.status = next;
            b.updated_at = Utc::now();
            b.clone()
        }))
    }

    async fn update_payment_status(&self, id: Uuid, status: PaymentStatus) -> RepoResult<Booking> {
        self.modify(id, |b| b.payment_status = status).await
    }
}

#[derive(Default)]
pub struct InMemoryServiceRepository {
    services: RwLock<HashMap<Uuid, CustomerService>>,
}

impl InMemoryServiceRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ServiceRepository for InMemoryServiceRepository {
    async fn insert(&self, service: &CustomerService) -> RepoResult<()> {
        self.services.write().await.insert(service.id, service.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> RepoResult<Option<CustomerService>> {
        Ok(self.services.read().await.get(&id).cloned())
    }

    async fn list_for_booking(&self, booking_id: Uuid) -> RepoResult<Vec<CustomerService>> {
        let services = self.services.read().await;
        let mut found: Vec<CustomerService> =
            services.values().filter(|s| s.booking_id == booking_id).cloned().collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(found)
    }

    async fn set_active(&self, id: Uuid, active: bool) -> RepoResult<CustomerService> {
        let mut services = self.services.write().await;
        let service = services
            .get_mut(&id)
            .ok_or_else(|| RepoError::NotFound(format!("service {}", id)))?;
        service.is_active = active;
        Ok(service.clone())
    }

    async fn expire_before(&self, now: DateTime<Utc>) -> RepoResult<u64> {
        let mut services = self.services.write().await;
        let mut expired = 0;
        for service in services.values_mut() {
            if service.is_active && service.is_expired(now) {
                service.is_active = false;
                expired += 1;
            }
        }
        Ok(expired)
    }
}

#[derive(Default)]
pub struct InMemoryTransportRepository {
    transports: RwLock<Vec<TransportBooking>>,
}

impl InMemoryTransportRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransportRepository for InMemoryTransportRepository {
    async fn insert(&self, transport: &TransportBooking) -> RepoResult<()> {
        self.transports.write().await.push(transport.clone());
        Ok(())
    }

    async fn list_for_booking(&self, booking_id: Uuid) -> RepoResult<Vec<TransportBooking>> {
        Ok(self
            .transports
            .read()
            .await
            .iter()
            .filter(|t| t.booking_id == booking_id)
            .cloned()
            .collect())
    }
}
