use crate::models::{Booking, BookingStatus, PaymentStatus};
use crate::reference::ReferenceGenerator;
use crate::repository::{BookingRangeSource, BookingRepository, InsertOutcome};
use crate::BookingRules;
use chalet_catalog::availability::CalendarGuard;
use chalet_catalog::{
    AvailabilityError, AvailabilityIndex, DateRange, Listing, ListingRepository, PriceBreakdown, PricingCalculator,
    PricingError, ReserveOutcome,
};
use chalet_core::{Actor, CoreError, EventPublisher, RepoError};
use chalet_shared::models::events::{BookingCancelledEvent, BookingCreatedEvent};
use chalet_shared::DomainEvent;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Fresh references drawn before giving up on a commit.
const MAX_REFERENCE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub listing_id: Uuid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: u32,
    #[serde(default)]
    pub special_requests: Option<String>,
}

/// Turns stay requests into committed, priced, non-overlapping bookings.
///
/// The coordinator owns the availability index; nothing else writes to it.
/// A listing's calendar stays locked from the conflict check until the row
/// is persisted or the reservation is released.
pub struct ReservationCoordinator {
    listings: Arc<dyn ListingRepository>,
    bookings: Arc<dyn BookingRepository>,
    index: AvailabilityIndex,
    pricing: PricingCalculator,
    references: ReferenceGenerator,
    publisher: Arc<dyn EventPublisher>,
    commit_timeout: Duration,
}

impl ReservationCoordinator {
    pub fn new(
        listings: Arc<dyn ListingRepository>,
        bookings: Arc<dyn BookingRepository>,
        publisher: Arc<dyn EventPublisher>,
        rules: &BookingRules,
    ) -> Self {
        let source = Arc::new(BookingRangeSource::new(bookings.clone()));
        Self {
            listings,
            index: AvailabilityIndex::new(source, rules.reservation_timeout),
            bookings,
            pricing: PricingCalculator::new(rules.transport_rates.clone()),
            references: ReferenceGenerator::new(rules.reference_prefix.clone()),
            publisher,
            commit_timeout: rules.reservation_timeout,
        }
    }

    pub fn pricing(&self) -> &PricingCalculator {
        &self.pricing
    }

    /// Reserve, price, persist. Any failure after the reservation releases it.
    pub async fn create_booking(&self, actor: &Actor, request: BookingRequest) -> Result<Booking, ReservationError> {
        let range = DateRange::new(request.check_in, request.check_out)?;
        let listing = self.active_listing(request.listing_id).await?;
        // Pure, so validation failures happen before anything is touched.
        let price = self.pricing.compute_price(&listing, &range, request.guests, &[])?;

        let mut guard = self.index.lock(listing.id).await?;
        let token = match self.index.reserve_in(&mut guard, Uuid::new_v4(), range).await? {
            ReserveOutcome::Reserved(token) => token,
            ReserveOutcome::Conflict { existing, range: taken } => {
                warn!(listing_id = %listing.id, %range, %existing, %taken, "booking conflict");
                return Err(ReservationError::Conflict {
                    listing_id: listing.id,
                    range,
                });
            }
        };

        for attempt in 1..=MAX_REFERENCE_ATTEMPTS {
            let booking = Booking::pending(
                token.id,
                self.references.generate(),
                listing.id,
                actor.user_id,
                range,
                request.guests,
                request.special_requests.clone(),
                &price,
            );

            let outcome = match self.bounded(self.bookings.insert_if_available(&booking)).await {
                Ok(outcome) => outcome,
                Err(ReservationError::CommitTimeout(limit)) => {
                    // The reply is late, not necessarily the write.
                    match self.bounded(self.bookings.get(booking.id)).await {
                        Ok(Some(_)) => {
                            warn!(booking_id = %booking.id, ?limit, "commit reply timed out after the row was stored");
                            InsertOutcome::Inserted
                        }
                        stored => {
                            guard.release(&token.id);
                            guard.invalidate();
                            if let Err(e) = stored {
                                warn!(booking_id = %booking.id, error = %e, "could not confirm commit state");
                            }
                            error!(listing_id = %listing.id, %range, ?limit, "booking commit timed out, reservation released");
                            return Err(ReservationError::CommitTimeout(limit));
                        }
                    }
                }
                Err(e) => {
                    guard.release(&token.id);
                    error!(listing_id = %listing.id, %range, error = %e, "booking commit failed, reservation released");
                    return Err(e);
                }
            };

            match outcome {
                InsertOutcome::Inserted => {
                    guard.settle(&token.id);
                    drop(guard);
                    info!(
                        booking_id = %booking.id,
                        reference = %booking.reference,
                        listing_id = %listing.id,
                        %range,
                        total = %booking.total_amount,
                        "booking committed"
                    );
                    self.publisher.publish(DomainEvent::BookingCreated(BookingCreatedEvent {
                        booking_id: booking.id,
                        reference: booking.reference.clone(),
                        listing_id: booking.listing_id,
                        user_id: booking.user_id,
                        check_in: booking.check_in,
                        check_out: booking.check_out,
                        total_amount: booking.total_amount,
                        timestamp: Utc::now().timestamp(),
                    }));
                    return Ok(booking);
                }
                InsertOutcome::DuplicateReference => {
                    warn!(reference = %booking.reference, attempt, "booking reference collision, drawing again");
                }
                InsertOutcome::Conflict { existing } => {
                    // Storage knows of a stay this calendar missed (another instance wrote it).
                    guard.release(&token.id);
                    self.resync(&mut guard).await;
                    warn!(listing_id = %listing.id, %range, existing = ?existing, "conflict detected at commit");
                    return Err(ReservationError::Conflict {
                        listing_id: listing.id,
                        range,
                    });
                }
            }
        }

        guard.release(&token.id);
        error!(listing_id = %listing.id, "could not draw an unused booking reference");
        Err(ReservationError::ReferenceExhausted(MAX_REFERENCE_ATTEMPTS))
    }

    /// Cancels and frees the dates under the listing's lock.
    pub async fn cancel_booking(&self, actor: &Actor, booking_id: Uuid) -> Result<Booking, ReservationError> {
        let booking = self.booking(booking_id).await?;
        let owner = self.listing_owner(booking.listing_id).await?;
        if !actor.can_cancel_booking(booking.user_id, owner) {
            return Err(ReservationError::NotAuthorized(format!(
                "user {} may not cancel booking {}",
                actor.user_id, booking.reference
            )));
        }

        let cancelled = self.transition(booking.listing_id, booking_id, BookingStatus::Cancelled).await?;
        info!(booking_id = %cancelled.id, reference = %cancelled.reference, cancelled_by = %actor.user_id, "booking cancelled");
        self.publisher.publish(DomainEvent::BookingCancelled(BookingCancelledEvent {
            booking_id: cancelled.id,
            listing_id: cancelled.listing_id,
            cancelled_by: actor.user_id,
            timestamp: Utc::now().timestamp(),
        }));
        Ok(cancelled)
    }

    /// pending → confirmed, by the listing's owner or an admin.
    pub async fn confirm_booking(&self, actor: &Actor, booking_id: Uuid) -> Result<Booking, ReservationError> {
        self.advance(actor, booking_id, BookingStatus::Confirmed).await
    }

    /// confirmed → completed. Completed stays no longer hold their dates.
    pub async fn complete_booking(&self, actor: &Actor, booking_id: Uuid) -> Result<Booking, ReservationError> {
        self.advance(actor, booking_id, BookingStatus::Completed).await
    }

    pub async fn set_payment_status(
        &self,
        actor: &Actor,
        booking_id: Uuid,
        status: PaymentStatus,
    ) -> Result<Booking, ReservationError> {
        let booking = self.booking(booking_id).await?;
        self.authorize_owner_side(actor, &booking).await?;
        let updated = self.bounded(self.bookings.update_payment_status(booking_id, status)).await?;
        info!(booking_id = %updated.id, payment_status = status.as_str(), "payment status updated");
        Ok(updated)
    }

    /// Display read; may lag behind a commit on another instance.
    pub async fn is_available(
        &self,
        listing_id: Uuid,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Result<bool, ReservationError> {
        let range = DateRange::new(check_in, check_out)?;
        Ok(self.index.is_available(listing_id, range).await?)
    }

    /// Committed stays overlapping `[from, to)`.
    pub async fn availability(
        &self,
        listing_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DateRange>, ReservationError> {
        let window = DateRange::new(from, to)?;
        self.listing(listing_id).await?;
        Ok(self.index.committed(listing_id, window).await?)
    }

    /// Price a stay without reserving anything.
    pub async fn quote(
        &self,
        listing_id: Uuid,
        check_in: NaiveDate,
        check_out: NaiveDate,
        guests: u32,
    ) -> Result<PriceBreakdown, ReservationError> {
        let range = DateRange::new(check_in, check_out)?;
        let listing = self.active_listing(listing_id).await?;
        Ok(self.pricing.compute_price(&listing, &range, guests, &[])?)
    }

    pub async fn get_booking(&self, actor: &Actor, booking_id: Uuid) -> Result<Booking, ReservationError> {
        let booking = self.booking(booking_id).await?;
        self.authorize_view(actor, &booking).await?;
        Ok(booking)
    }

    pub async fn find_by_reference(&self, actor: &Actor, reference: &str) -> Result<Booking, ReservationError> {
        let booking = self
            .bookings
            .find_by_reference(reference)
            .await?
            .ok_or_else(|| ReservationError::BookingNotFound(reference.to_string()))?;
        self.authorize_view(actor, &booking).await?;
        Ok(booking)
    }

    /// A user's own bookings; admins may list anyone's.
    pub async fn list_for_user(&self, actor: &Actor, user_id: Uuid) -> Result<Vec<Booking>, ReservationError> {
        if actor.user_id != user_id && !actor.is_admin() {
            return Err(ReservationError::NotAuthorized(format!(
                "user {} may not list bookings of {}",
                actor.user_id, user_id
            )));
        }
        Ok(self.bookings.list_for_user(user_id).await?)
    }

    pub async fn list_for_listing(&self, actor: &Actor, listing_id: Uuid) -> Result<Vec<Booking>, ReservationError> {
        let listing = self.listing(listing_id).await?;
        if !actor.can_manage_listing(listing.owner_id) {
            return Err(ReservationError::NotAuthorized(format!(
                "user {} does not manage listing {}",
                actor.user_id, listing_id
            )));
        }
        Ok(self.bookings.list_for_listing(listing_id).await?)
    }

    async fn advance(&self, actor: &Actor, booking_id: Uuid, next: BookingStatus) -> Result<Booking, ReservationError> {
        let booking = self.booking(booking_id).await?;
        self.authorize_owner_side(actor, &booking).await?;
        let updated = self.transition(booking.listing_id, booking_id, next).await?;
        info!(booking_id = %updated.id, status = next.as_str(), actor = %actor.user_id, "booking status changed");
        Ok(updated)
    }

    /// Status change under the calendar lock. The write only lands if the
    /// stored status still matches the one checked here, which also covers
    /// writers on other instances.
    async fn transition(
        &self,
        listing_id: Uuid,
        booking_id: Uuid,
        next: BookingStatus,
    ) -> Result<Booking, ReservationError> {
        let mut guard = self.index.lock(listing_id).await?;
        let current = self.booking(booking_id).await?;
        if !current.status.can_transition_to(next) {
            return Err(ReservationError::InvalidTransition {
                from: current.status,
                to: next,
            });
        }

        let written = match self.bounded(self.bookings.update_status(booking_id, current.status, next)).await {
            Ok(written) => written,
            Err(e) => {
                // The write may still land; rebuild from storage next time.
                guard.invalidate();
                return Err(e);
            }
        };
        let Some(updated) = written else {
            // Another instance changed the booking after it was read.
            self.resync(&mut guard).await;
            let actual = self.booking(booking_id).await?;
            warn!(
                %booking_id,
                expected = current.status.as_str(),
                actual = actual.status.as_str(),
                "status changed concurrently"
            );
            return Err(ReservationError::InvalidTransition {
                from: actual.status,
                to: next,
            });
        };
        if current.status.holds_dates() && !next.holds_dates() {
            guard.release(&booking_id);
        }
        Ok(updated)
    }

    async fn resync(&self, guard: &mut CalendarGuard) {
        if let Err(e) = self.index.refresh(guard).await {
            warn!(listing_id = %guard.listing_id(), error = %e, "calendar refresh failed, will rehydrate on next use");
            guard.invalidate();
        }
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, ReservationError>
    where
        F: Future<Output = Result<T, RepoError>>,
    {
        match tokio::time::timeout(self.commit_timeout, fut).await {
            Ok(result) => result.map_err(ReservationError::from),
            Err(_) => Err(ReservationError::CommitTimeout(self.commit_timeout)),
        }
    }

    async fn booking(&self, booking_id: Uuid) -> Result<Booking, ReservationError> {
        self.bookings
            .get(booking_id)
            .await?
            .ok_or_else(|| ReservationError::BookingNotFound(booking_id.to_string()))
    }

    async fn listing(&self, listing_id: Uuid) -> Result<Listing, ReservationError> {
        self.listings
            .get(listing_id)
            .await?
            .ok_or(ReservationError::ListingNotFound(listing_id))
    }

    async fn active_listing(&self, listing_id: Uuid) -> Result<Listing, ReservationError> {
        let listing = self.listing(listing_id).await?;
        if !listing.is_active {
            return Err(ReservationError::ListingInactive(listing_id));
        }
        Ok(listing)
    }

    /// Owner of the booked listing; a vanished listing has no owner to match.
    async fn listing_owner(&self, listing_id: Uuid) -> Result<Uuid, ReservationError> {
        Ok(self.listings.get(listing_id).await?.map(|l| l.owner_id).unwrap_or_else(Uuid::nil))
    }

    async fn authorize_view(&self, actor: &Actor, booking: &Booking) -> Result<(), ReservationError> {
        let owner = self.listing_owner(booking.listing_id).await?;
        if actor.can_view_booking(booking.user_id, owner) {
            Ok(())
        } else {
            Err(ReservationError::NotAuthorized(format!(
                "user {} may not view booking {}",
                actor.user_id, booking.reference
            )))
        }
    }

    async fn authorize_owner_side(&self, actor: &Actor, booking: &Booking) -> Result<(), ReservationError> {
        let owner = self.listing_owner(booking.listing_id).await?;
        if actor.can_advance_booking(owner) {
            Ok(())
        } else {
            Err(ReservationError::NotAuthorized(format!(
                "user {} does not manage the listing of booking {}",
                actor.user_id, booking.reference
            )))
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReservationError {
    #[error(transparent)]
    Availability(#[from] AvailabilityError),

    #[error(transparent)]
    Pricing(#[from] PricingError),

    #[error("Listing not found: {0}")]
    ListingNotFound(Uuid),

    #[error("Listing {0} is not accepting bookings")]
    ListingInactive(Uuid),

    #[error("Booking not found: {0}")]
    BookingNotFound(String),

    #[error("Listing {listing_id} is already booked for {range}")]
    Conflict { listing_id: Uuid, range: DateRange },

    #[error("{0}")]
    NotAuthorized(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: BookingStatus, to: BookingStatus },

    #[error("Booking commit exceeded {0:?}")]
    CommitTimeout(Duration),

    #[error("No unused booking reference after {0} attempts")]
    ReferenceExhausted(usize),

    #[error(transparent)]
    Backend(#[from] RepoError),
}

impl From<ReservationError> for CoreError {
    fn from(err: ReservationError) -> Self {
        match err {
            ReservationError::Availability(e) => e.into(),
            ReservationError::Pricing(e) => e.into(),
            ReservationError::Backend(e) => e.into(),
            ReservationError::ListingNotFound(_) | ReservationError::BookingNotFound(_) => {
                CoreError::NotFound(err.to_string())
            }
            ReservationError::ListingInactive(_) | ReservationError::InvalidTransition { .. } => {
                CoreError::Validation(err.to_string())
            }
            ReservationError::Conflict { .. } => CoreError::BookingConflict(err.to_string()),
            ReservationError::NotAuthorized(_) => CoreError::NotAuthorized(err.to_string()),
            ReservationError::CommitTimeout(_) => CoreError::Timeout(err.to_string()),
            ReservationError::ReferenceExhausted(_) => CoreError::BackendUnavailable(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBookingRepository;
    use chalet_catalog::memory::InMemoryListingRepository;
    use chalet_catalog::{ListingCategory, NewListing};
    use chalet_core::NoopPublisher;
    use rust_decimal::Decimal;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, day).unwrap()
    }

    async fn setup() -> (ReservationCoordinator, Arc<InMemoryBookingRepository>, Listing) {
        let listings = Arc::new(InMemoryListingRepository::new());
        let bookings = Arc::new(InMemoryBookingRepository::new());
        let listing = Listing::new(
            Uuid::new_v4(),
            NewListing {
                name: "Olive Grove Farm".into(),
                description: None,
                category: ListingCategory::Family,
                price_per_day: Decimal::from(50),
                max_capacity: 6,
                features: vec!["pool".into()],
            },
        )
        .unwrap();
        listings.insert(&listing).await.unwrap();

        let coordinator = ReservationCoordinator::new(
            listings,
            bookings.clone(),
            Arc::new(NoopPublisher),
            &BookingRules::default(),
        );
        (coordinator, bookings, listing)
    }

    fn request(listing_id: Uuid, check_in: u32, check_out: u32, guests: u32) -> BookingRequest {
        BookingRequest {
            listing_id,
            check_in: d(check_in),
            check_out: d(check_out),
            guests,
            special_requests: None,
        }
    }

    #[tokio::test]
    async fn test_create_booking_prices_and_persists() {
        let (coordinator, bookings, listing) = setup().await;
        let guest = Actor::customer(Uuid::new_v4());

        let booking = coordinator.create_booking(&guest, request(listing.id, 1, 4, 2)).await.unwrap();

        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.payment_status, PaymentStatus::Pending);
        assert_eq!(booking.subtotal, Decimal::from(150));
        assert_eq!(booking.total_amount, Decimal::from(150));
        assert!(booking.reference.starts_with("FR-"));
        assert_eq!(bookings.len().await, 1);
        assert!(!coordinator.is_available(listing.id, d(3), d(5)).await.unwrap());
        assert!(coordinator.is_available(listing.id, d(4), d(6)).await.unwrap());
    }

    #[tokio::test]
    async fn test_validation_happens_before_mutation() {
        let (coordinator, bookings, listing) = setup().await;
        let guest = Actor::customer(Uuid::new_v4());

        let too_many = coordinator.create_booking(&guest, request(listing.id, 1, 4, 7)).await;
        assert!(matches!(too_many, Err(ReservationError::Pricing(PricingError::CapacityExceeded { .. }))));

        let backwards = coordinator.create_booking(&guest, request(listing.id, 4, 1, 2)).await;
        assert!(matches!(backwards, Err(ReservationError::Availability(AvailabilityError::InvalidRange { .. }))));

        assert!(bookings.is_empty().await);
        assert!(coordinator.is_available(listing.id, d(1), d(4)).await.unwrap());
    }

    #[tokio::test]
    async fn test_inactive_listing_rejected() {
        let listings = Arc::new(InMemoryListingRepository::new());
        let mut listing = Listing::new(
            Uuid::new_v4(),
            NewListing {
                name: "Closed Chalet".into(),
                description: None,
                category: ListingCategory::Youth,
                price_per_day: Decimal::from(80),
                max_capacity: 10,
                features: vec![],
            },
        )
        .unwrap();
        listing.is_active = false;
        listings.insert(&listing).await.unwrap();
        let coordinator = ReservationCoordinator::new(
            listings,
            Arc::new(InMemoryBookingRepository::new()),
            Arc::new(NoopPublisher),
            &BookingRules::default(),
        );

        let result = coordinator
            .create_booking(&Actor::customer(Uuid::new_v4()), request(listing.id, 1, 2, 1))
            .await;
        assert!(matches!(result, Err(ReservationError::ListingInactive(_))));
        assert_eq!(CoreError::from(result.unwrap_err()).kind(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_status_workflow() {
        let (coordinator, _, listing) = setup().await;
        let guest = Actor::customer(Uuid::new_v4());
        let owner = Actor::owner(listing.owner_id);
        let booking = coordinator.create_booking(&guest, request(listing.id, 1, 4, 2)).await.unwrap();

        // Guests cannot drive the owner-side workflow.
        assert!(matches!(
            coordinator.confirm_booking(&guest, booking.id).await,
            Err(ReservationError::NotAuthorized(_))
        ));
        assert!(matches!(
            coordinator.complete_booking(&owner, booking.id).await,
            Err(ReservationError::InvalidTransition { .. })
        ));

        let confirmed = coordinator.confirm_booking(&owner, booking.id).await.unwrap();
        assert_eq!(confirmed.status, BookingStatus::Confirmed);
        assert!(!coordinator.is_available(listing.id, d(1), d(4)).await.unwrap());

        let paid = coordinator
            .set_payment_status(&owner, booking.id, PaymentStatus::Paid)
            .await
            .unwrap();
        assert_eq!(paid.payment_status, PaymentStatus::Paid);

        let completed = coordinator.complete_booking(&owner, booking.id).await.unwrap();
        assert_eq!(completed.status, BookingStatus::Completed);
        assert!(coordinator.is_available(listing.id, d(1), d(4)).await.unwrap());

        assert!(matches!(
            coordinator.cancel_booking(&guest, booking.id).await,
            Err(ReservationError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_booking_visibility() {
        let (coordinator, _, listing) = setup().await;
        let guest = Actor::customer(Uuid::new_v4());
        let stranger = Actor::customer(Uuid::new_v4());
        let booking = coordinator.create_booking(&guest, request(listing.id, 10, 12, 2)).await.unwrap();

        assert_eq!(coordinator.get_booking(&guest, booking.id).await.unwrap().id, booking.id);
        assert_eq!(
            coordinator
                .find_by_reference(&Actor::owner(listing.owner_id), &booking.reference)
                .await
                .unwrap()
                .id,
            booking.id
        );
        assert!(matches!(
            coordinator.get_booking(&stranger, booking.id).await,
            Err(ReservationError::NotAuthorized(_))
        ));
        assert!(matches!(
            coordinator.list_for_listing(&stranger, listing.id).await,
            Err(ReservationError::NotAuthorized(_))
        ));
        assert_eq!(coordinator.list_for_user(&guest, guest.user_id).await.unwrap().len(), 1);
        assert!(coordinator.list_for_user(&stranger, stranger.user_id).await.unwrap().is_empty());
        assert!(matches!(
            coordinator.find_by_reference(&guest, "FR-00000000").await,
            Err(ReservationError::BookingNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_quote_and_availability_window() {
        let (coordinator, _, listing) = setup().await;
        let quote = coordinator.quote(listing.id, d(1), d(4), 2).await.unwrap();
        assert_eq!(quote.nights, 3);
        assert_eq!(quote.total, Decimal::from(150));

        coordinator
            .create_booking(&Actor::customer(Uuid::new_v4()), request(listing.id, 5, 8, 2))
            .await
            .unwrap();
        let taken = coordinator.availability(listing.id, d(1), d(30)).await.unwrap();
        assert_eq!(taken, vec![DateRange::new(d(5), d(8)).unwrap()]);
        assert!(coordinator.availability(listing.id, d(8), d(30)).await.unwrap().is_empty());
    }
}
