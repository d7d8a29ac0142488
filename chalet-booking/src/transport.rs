use crate::models::{BookingStatus, TransportBooking, TransportStatus};
use crate::repository::{BookingRepository, TransportRepository};
use chalet_catalog::{PricingError, TransportRates, TransportType};
use chalet_core::{Actor, CoreError, RepoError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportRequest {
    pub transport_type: TransportType,
    pub pickup_location: String,
    pub pickup_time: DateTime<Utc>,
    #[serde(default)]
    pub return_time: Option<DateTime<Utc>>,
    pub passengers: u32,
}

/// Books transportation add-ons for existing stays.
pub struct TransportDesk {
    bookings: Arc<dyn BookingRepository>,
    transports: Arc<dyn TransportRepository>,
    rates: TransportRates,
}

impl TransportDesk {
    pub fn new(bookings: Arc<dyn BookingRepository>, transports: Arc<dyn TransportRepository>, rates: TransportRates) -> Self {
        Self {
            bookings,
            transports,
            rates,
        }
    }

    pub fn quote(&self, transport_type: TransportType, passengers: u32) -> Result<Decimal, TransportError> {
        if passengers == 0 {
            return Err(TransportError::NoPassengers);
        }
        Ok(self.rates.price(transport_type, passengers)?)
    }

    pub async fn book_transport(
        &self,
        actor: &Actor,
        booking_id: Uuid,
        request: TransportRequest,
    ) -> Result<TransportBooking, TransportError> {
        let price = self.quote(request.transport_type, request.passengers)?;
        let pickup_location = request.pickup_location.trim();
        if pickup_location.is_empty() {
            return Err(TransportError::MissingPickup);
        }
        if let Some(return_time) = request.return_time {
            if return_time <= request.pickup_time {
                return Err(TransportError::ReturnBeforePickup);
            }
        }

        let booking = self.owned_booking(actor, booking_id).await?;
        if booking.status == BookingStatus::Cancelled {
            return Err(TransportError::BookingCancelled(booking.reference));
        }

        let transport = TransportBooking {
            id: Uuid::new_v4(),
            booking_id,
            transport_type: request.transport_type,
            pickup_location: pickup_location.to_string(),
            pickup_time: request.pickup_time,
            return_time: request.return_time,
            passengers: request.passengers,
            price,
            status: TransportStatus::Pending,
            created_at: Utc::now(),
        };
        self.transports.insert(&transport).await?;
        info!(
            transport_id = %transport.id,
            booking_id = %booking_id,
            transport_type = transport.transport_type.as_str(),
            %price,
            "transport booked"
        );
        Ok(transport)
    }

    pub async fn list_for_booking(&self, actor: &Actor, booking_id: Uuid) -> Result<Vec<TransportBooking>, TransportError> {
        self.owned_booking(actor, booking_id).await?;
        Ok(self.transports.list_for_booking(booking_id).await?)
    }

    async fn owned_booking(&self, actor: &Actor, booking_id: Uuid) -> Result<crate::models::Booking, TransportError> {
        let booking = self
            .bookings
            .get(booking_id)
            .await?
            .ok_or(TransportError::BookingNotFound(booking_id))?;
        if booking.user_id != actor.user_id && !actor.is_admin() {
            return Err(TransportError::NotOwner(booking_id));
        }
        Ok(booking)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("At least one passenger is required")]
    NoPassengers,

    #[error("Pickup location is required")]
    MissingPickup,

    #[error("Return time must be after pickup time")]
    ReturnBeforePickup,

    #[error("Booking not found: {0}")]
    BookingNotFound(Uuid),

    #[error("Booking {0} belongs to another user")]
    NotOwner(Uuid),

    #[error("Booking {0} is cancelled")]
    BookingCancelled(String),

    #[error(transparent)]
    Pricing(#[from] PricingError),

    #[error(transparent)]
    Backend(#[from] RepoError),
}

impl From<TransportError> for CoreError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::BookingNotFound(_) => CoreError::NotFound(err.to_string()),
            TransportError::NotOwner(_) => CoreError::NotAuthorized(err.to_string()),
            TransportError::Backend(e) => e.into(),
            _ => CoreError::Validation(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryBookingRepository, InMemoryTransportRepository};
    use crate::models::Booking;
    use chalet_catalog::{DateRange, PricingCalculator};
    use chrono::{Duration, NaiveDate};

    async fn desk_with_booking() -> (TransportDesk, Arc<InMemoryBookingRepository>, Booking) {
        let bookings = Arc::new(InMemoryBookingRepository::new());
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 7, 3).unwrap(),
        )
        .unwrap();
        let booking = Booking::pending(
            Uuid::new_v4(),
            "FR-TRANSP01".into(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            range,
            4,
            None,
            &PricingCalculator::apply_adjustments(2, Decimal::from(200), &[]).unwrap(),
        );
        bookings.insert_if_available(&booking).await.unwrap();
        let desk = TransportDesk::new(
            bookings.clone(),
            Arc::new(InMemoryTransportRepository::new()),
            TransportRates::default(),
        );
        (desk, bookings, booking)
    }

    fn request(transport_type: TransportType, passengers: u32) -> TransportRequest {
        let pickup_time = Utc::now() + Duration::days(3);
        TransportRequest {
            transport_type,
            pickup_location: "Central Station".into(),
            pickup_time,
            return_time: Some(pickup_time + Duration::days(2)),
            passengers,
        }
    }

    #[test]
    fn test_quote() {
        let desk = TransportDesk::new(
            Arc::new(InMemoryBookingRepository::new()),
            Arc::new(InMemoryTransportRepository::new()),
            TransportRates::default(),
        );
        assert_eq!(desk.quote(TransportType::Bus, 4).unwrap(), Decimal::from(60));
        assert_eq!(desk.quote(TransportType::PrivateCar, 7).unwrap(), Decimal::from(80));
        assert!(matches!(desk.quote(TransportType::Minibus, 0), Err(TransportError::NoPassengers)));
    }

    #[tokio::test]
    async fn test_book_transport() {
        let (desk, _, booking) = desk_with_booking().await;
        let guest = Actor::customer(booking.user_id);

        let transport = desk
            .book_transport(&guest, booking.id, request(TransportType::Bus, 4))
            .await
            .unwrap();
        assert_eq!(transport.price, Decimal::from(60));
        assert_eq!(transport.status, TransportStatus::Pending);

        let listed = desk.list_for_booking(&guest, booking.id).await.unwrap();
        assert_eq!(listed, vec![transport]);
    }

    #[tokio::test]
    async fn test_book_transport_rejections() {
        let (desk, bookings, booking) = desk_with_booking().await;
        let guest = Actor::customer(booking.user_id);

        let mut backwards = request(TransportType::Minibus, 3);
        backwards.return_time = Some(backwards.pickup_time - Duration::hours(1));
        assert!(matches!(
            desk.book_transport(&guest, booking.id, backwards).await,
            Err(TransportError::ReturnBeforePickup)
        ));

        assert!(matches!(
            desk.book_transport(&Actor::customer(Uuid::new_v4()), booking.id, request(TransportType::Bus, 1))
                .await,
            Err(TransportError::NotOwner(_))
        ));

        bookings
            .update_status(booking.id, BookingStatus::Pending, BookingStatus::Cancelled)
            .await
            .unwrap();
        assert!(matches!(
            desk.book_transport(&guest, booking.id, request(TransportType::Bus, 1)).await,
            Err(TransportError::BookingCancelled(_))
        ));
    }
}
