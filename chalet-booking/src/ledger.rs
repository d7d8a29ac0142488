use crate::models::{Booking, CustomerService, ServiceType};
use crate::repository::{BookingRepository, ServiceRepository};
use chalet_catalog::{PriceAdjustment, PriceBreakdown, PricingCalculator, PricingError};
use chalet_core::{Actor, CoreError, EventPublisher, RepoError};
use chalet_shared::models::events::ServiceAppliedEvent;
use chalet_shared::DomainEvent;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Records customer services (discounts, cashback, gifts) against bookings.
///
/// Recording never changes the booking; `reprice` shows what the active
/// services would do to it.
pub struct ServiceLedger {
    bookings: Arc<dyn BookingRepository>,
    services: Arc<dyn ServiceRepository>,
    publisher: Arc<dyn EventPublisher>,
    expiry: Duration,
}

impl ServiceLedger {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        services: Arc<dyn ServiceRepository>,
        publisher: Arc<dyn EventPublisher>,
        expiry: Duration,
    ) -> Self {
        Self {
            bookings,
            services,
            publisher,
            expiry,
        }
    }

    /// Attach a service to a booking the actor owns (support admins may act
    /// for any customer).
    pub async fn apply_service(
        &self,
        actor: &Actor,
        booking_id: Uuid,
        service_type: ServiceType,
        details: serde_json::Value,
    ) -> Result<CustomerService, LedgerError> {
        let booking = self.owned_booking(actor, booking_id).await?;
        validate_details(&booking, service_type, &details)?;

        let service = CustomerService::new(booking.id, booking.user_id, service_type, details, self.expiry);
        self.services.insert(&service).await?;

        info!(
            service_id = %service.id,
            booking_id = %booking.id,
            service_type = service_type.as_str(),
            by = %actor.user_id,
            "service recorded"
        );
        self.publisher.publish(DomainEvent::ServiceApplied(ServiceAppliedEvent {
            service_id: service.id,
            booking_id: booking.id,
            service_type: service_type.as_str().to_string(),
            expires_at: service.expires_at,
        }));
        Ok(service)
    }

    pub async fn list_services(&self, actor: &Actor, booking_id: Uuid) -> Result<Vec<CustomerService>, LedgerError> {
        self.owned_booking(actor, booking_id).await?;
        Ok(self.services.list_for_booking(booking_id).await?)
    }

    pub async fn deactivate_service(&self, actor: &Actor, service_id: Uuid) -> Result<CustomerService, LedgerError> {
        let service = self
            .services
            .get(service_id)
            .await?
            .ok_or(LedgerError::ServiceNotFound(service_id))?;
        if service.user_id != actor.user_id && !actor.is_admin() {
            return Err(LedgerError::NotOwner {
                booking_id: service.booking_id,
                user_id: actor.user_id,
            });
        }
        let service = self.services.set_active(service_id, false).await?;
        info!(service_id = %service.id, by = %actor.user_id, "service deactivated");
        Ok(service)
    }

    /// Deactivates unapplied services past their expiry; returns how many.
    pub async fn expire_stale(&self, now: DateTime<Utc>) -> Result<u64, LedgerError> {
        let expired = self.services.expire_before(now).await?;
        if expired > 0 {
            info!(expired, "stale services expired");
        }
        Ok(expired)
    }

    /// The booking's price with its live services applied, discount first.
    pub async fn reprice(&self, actor: &Actor, booking_id: Uuid) -> Result<PriceBreakdown, LedgerError> {
        let booking = self.owned_booking(actor, booking_id).await?;
        let now = Utc::now();
        let adjustments: Vec<PriceAdjustment> = self
            .services
            .list_for_booking(booking_id)
            .await?
            .iter()
            .filter_map(|s| s.as_adjustment(now))
            .collect();
        Ok(PricingCalculator::apply_adjustments(
            booking.range().nights(),
            booking.subtotal,
            &adjustments,
        )?)
    }

    async fn owned_booking(&self, actor: &Actor, booking_id: Uuid) -> Result<Booking, LedgerError> {
        let booking = self
            .bookings
            .get(booking_id)
            .await?
            .ok_or(LedgerError::BookingNotFound(booking_id))?;
        if booking.user_id != actor.user_id && !actor.is_admin() {
            return Err(LedgerError::NotOwner {
                booking_id,
                user_id: actor.user_id,
            });
        }
        Ok(booking)
    }
}

fn validate_details(booking: &Booking, service_type: ServiceType, details: &serde_json::Value) -> Result<(), LedgerError> {
    let candidate = CustomerService::new(booking.id, booking.user_id, service_type, details.clone(), Duration::zero());
    let has_key = |key: &str| details.get(key).is_some();

    match service_type {
        ServiceType::Cashback => {
            if has_key("amount") {
                let amount = candidate
                    .amount()
                    .ok_or_else(|| LedgerError::InvalidAmount("cashback amount must be a number".into()))?;
                if amount < Decimal::ZERO || amount > booking.total_amount {
                    return Err(LedgerError::InvalidAmount(format!(
                        "cashback {} must lie between 0 and the booking total {}",
                        amount, booking.total_amount
                    )));
                }
                Ok(())
            } else if has_key("percentage") {
                check_percentage(candidate.percentage())
            } else {
                Err(LedgerError::InvalidAmount("cashback needs an amount or a percentage".into()))
            }
        }
        ServiceType::FoodDiscount | ServiceType::BusDiscount => check_percentage(candidate.percentage()),
        ServiceType::PromotionalGift => Ok(()),
    }
}

/// Percentages lie in (0, 100].
fn check_percentage(value: Option<Decimal>) -> Result<(), LedgerError> {
    match value {
        Some(p) if p > Decimal::ZERO && p <= Decimal::ONE_HUNDRED => Ok(()),
        Some(p) => Err(LedgerError::InvalidAmount(format!("percentage {} out of range", p))),
        None => Err(LedgerError::InvalidAmount("percentage must be a number".into())),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Booking not found: {0}")]
    BookingNotFound(Uuid),

    #[error("Service not found: {0}")]
    ServiceNotFound(Uuid),

    #[error("User {user_id} does not own booking {booking_id}")]
    NotOwner { booking_id: Uuid, user_id: Uuid },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error(transparent)]
    Pricing(#[from] PricingError),

    #[error(transparent)]
    Backend(#[from] RepoError),
}

impl From<LedgerError> for CoreError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::BookingNotFound(_) | LedgerError::ServiceNotFound(_) => CoreError::NotFound(err.to_string()),
            LedgerError::NotOwner { .. } => CoreError::NotAuthorized(err.to_string()),
            LedgerError::InvalidAmount(msg) => CoreError::InvalidAmount(msg),
            LedgerError::Pricing(e) => e.into(),
            LedgerError::Backend(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryBookingRepository, InMemoryServiceRepository};
    use crate::repository::InsertOutcome;
    use chalet_catalog::DateRange;
    use chalet_core::BroadcastPublisher;
    use chrono::NaiveDate;
    use serde_json::json;

    struct Fixture {
        ledger: ServiceLedger,
        services: Arc<InMemoryServiceRepository>,
        booking: Booking,
        guest: Actor,
        events: BroadcastPublisher,
    }

    async fn fixture() -> Fixture {
        let bookings = Arc::new(InMemoryBookingRepository::new());
        let services = Arc::new(InMemoryServiceRepository::new());
        let guest = Actor::customer(Uuid::new_v4());
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 6, 4).unwrap(),
        )
        .unwrap();
        let price = PricingCalculator::apply_adjustments(3, Decimal::from(150), &[]).unwrap();
        let booking = Booking::pending(
            Uuid::new_v4(),
            "FR-TESTREF1".into(),
            Uuid::new_v4(),
            guest.user_id,
            range,
            2,
            None,
            &price,
        );
        assert_eq!(bookings.insert_if_available(&booking).await.unwrap(), InsertOutcome::Inserted);

        let events = BroadcastPublisher::new(16);
        let ledger = ServiceLedger::new(bookings, services.clone(), Arc::new(events.clone()), Duration::days(30));
        Fixture {
            ledger,
            services,
            booking,
            guest,
            events,
        }
    }

    #[tokio::test]
    async fn test_apply_service_sets_expiry_and_announces() {
        let f = fixture().await;
        let mut rx = f.events.subscribe();

        let service = f
            .ledger
            .apply_service(&f.guest, f.booking.id, ServiceType::FoodDiscount, json!({"percentage": 10}))
            .await
            .unwrap();

        assert!(service.is_active);
        assert_eq!(service.expires_at, Some(service.created_at + Duration::days(30)));
        assert!(matches!(rx.try_recv().unwrap(), DomainEvent::ServiceApplied(e) if e.service_id == service.id));
    }

    #[tokio::test]
    async fn test_cashback_above_total_is_invalid_amount() {
        let f = fixture().await;
        let err = f
            .ledger
            .apply_service(&f.guest, f.booking.id, ServiceType::Cashback, json!({"amount": 150.01}))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(_)));
        assert_eq!(CoreError::from(err).kind(), "INVALID_AMOUNT");

        let negative = f
            .ledger
            .apply_service(&f.guest, f.booking.id, ServiceType::Cashback, json!({"amount": -1}))
            .await;
        assert!(matches!(negative, Err(LedgerError::InvalidAmount(_))));

        // Exactly the total is allowed.
        f.ledger
            .apply_service(&f.guest, f.booking.id, ServiceType::Cashback, json!({"amount": "150.00"}))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_discount_percentage_bounds() {
        let f = fixture().await;
        for bad in [json!({"percentage": 0}), json!({"percentage": 101}), json!({"note": "none"})] {
            let result = f
                .ledger
                .apply_service(&f.guest, f.booking.id, ServiceType::BusDiscount, bad)
                .await;
            assert!(matches!(result, Err(LedgerError::InvalidAmount(_))));
        }
        f.ledger
            .apply_service(&f.guest, f.booking.id, ServiceType::BusDiscount, json!({"percentage": 100}))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_ownership_rules() {
        let f = fixture().await;
        let stranger = Actor::customer(Uuid::new_v4());

        let result = f
            .ledger
            .apply_service(&stranger, f.booking.id, ServiceType::PromotionalGift, json!({"item": "basket"}))
            .await;
        assert!(matches!(result, Err(LedgerError::NotOwner { .. })));

        let missing = f
            .ledger
            .apply_service(&f.guest, Uuid::new_v4(), ServiceType::PromotionalGift, json!({}))
            .await;
        assert!(matches!(missing, Err(LedgerError::BookingNotFound(_))));

        // Support staff act on behalf of the customer.
        let admin = Actor::admin(Uuid::new_v4());
        let gift = f
            .ledger
            .apply_service(&admin, f.booking.id, ServiceType::PromotionalGift, json!({"item": "basket"}))
            .await
            .unwrap();
        assert_eq!(gift.user_id, f.guest.user_id);
    }

    #[tokio::test]
    async fn test_reprice_applies_discount_before_cashback() {
        let f = fixture().await;
        f.ledger
            .apply_service(&f.guest, f.booking.id, ServiceType::FoodDiscount, json!({"percentage": 10}))
            .await
            .unwrap();
        f.ledger
            .apply_service(&f.guest, f.booking.id, ServiceType::Cashback, json!({"percentage": 10}))
            .await
            .unwrap();

        let price = f.ledger.reprice(&f.guest, f.booking.id).await.unwrap();
        assert_eq!(price.subtotal, Decimal::from(150));
        assert_eq!(price.discount, Decimal::from(15));
        assert_eq!(price.cashback, Decimal::new(1350, 2));
        assert_eq!(price.total, Decimal::new(12150, 2));
    }

    #[tokio::test]
    async fn test_deactivate_and_expire() {
        let f = fixture().await;
        let discount = f
            .ledger
            .apply_service(&f.guest, f.booking.id, ServiceType::FoodDiscount, json!({"percentage": 10}))
            .await
            .unwrap();
        let gift = f
            .ledger
            .apply_service(&f.guest, f.booking.id, ServiceType::PromotionalGift, json!({}))
            .await
            .unwrap();

        let off = f.ledger.deactivate_service(&f.guest, discount.id).await.unwrap();
        assert!(!off.is_active);
        let price = f.ledger.reprice(&f.guest, f.booking.id).await.unwrap();
        assert_eq!(price.total, Decimal::from(150));

        assert_eq!(f.ledger.expire_stale(Utc::now()).await.unwrap(), 0);
        let later = gift.created_at + Duration::days(31);
        assert_eq!(f.ledger.expire_stale(later).await.unwrap(), 1);
        let listed = f.ledger.list_services(&f.guest, f.booking.id).await.unwrap();
        assert!(listed.iter().all(|s| !s.is_active));
        assert_eq!(f.services.get(gift.id).await.unwrap().map(|s| s.is_active), Some(false));
    }
}
