use chalet_catalog::{DateRange, PriceAdjustment, PriceBreakdown, TransportType};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Booking status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }

    /// Pending and confirmed bookings occupy their dates.
    pub fn holds_dates(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Cancelled | BookingStatus::Completed)
    }

    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Cancelled) | (Confirmed, Completed)
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            "completed" => Ok(BookingStatus::Completed),
            other => Err(format!("unknown booking status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Partial,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Partial => "partial",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "partial" => Ok(PaymentStatus::Partial),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(format!("unknown payment status '{}'", other)),
        }
    }
}

/// A user's reservation of a listing for `[check_in, check_out)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: Uuid,
    pub reference: String,
    pub listing_id: Uuid,
    pub user_id: Uuid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: u32,
    pub special_requests: Option<String>,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub cashback_amount: Decimal,
    pub total_amount: Decimal,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// A fresh pending booking; `id` is the reservation token's id.
    pub fn pending(
        id: Uuid,
        reference: String,
        listing_id: Uuid,
        user_id: Uuid,
        range: DateRange,
        guests: u32,
        special_requests: Option<String>,
        price: &PriceBreakdown,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            reference,
            listing_id,
            user_id,
            check_in: range.check_in,
            check_out: range.check_out,
            guests,
            special_requests,
            subtotal: price.subtotal,
            discount_amount: price.discount,
            cashback_amount: price.cashback,
            total_amount: price.total,
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn range(&self) -> DateRange {
        DateRange {
            check_in: self.check_in,
            check_out: self.check_out,
        }
    }

    pub fn update_status(&mut self, status: BookingStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransportStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl TransportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportStatus::Pending => "pending",
            TransportStatus::Confirmed => "confirmed",
            TransportStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for TransportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransportStatus::Pending),
            "confirmed" => Ok(TransportStatus::Confirmed),
            "cancelled" => Ok(TransportStatus::Cancelled),
            other => Err(format!("unknown transport status '{}'", other)),
        }
    }
}

/// Transportation add-on attached to a booking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransportBooking {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub transport_type: TransportType,
    pub pickup_location: String,
    pub pickup_time: DateTime<Utc>,
    pub return_time: Option<DateTime<Utc>>,
    pub passengers: u32,
    pub price: Decimal,
    pub status: TransportStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    FoodDiscount,
    BusDiscount,
    Cashback,
    PromotionalGift,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::FoodDiscount => "food_discount",
            ServiceType::BusDiscount => "bus_discount",
            ServiceType::Cashback => "cashback",
            ServiceType::PromotionalGift => "promotional_gift",
        }
    }

    pub fn is_discount(&self) -> bool {
        matches!(self, ServiceType::FoodDiscount | ServiceType::BusDiscount)
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "food_discount" => Ok(ServiceType::FoodDiscount),
            "bus_discount" => Ok(ServiceType::BusDiscount),
            "cashback" => Ok(ServiceType::Cashback),
            "promotional_gift" => Ok(ServiceType::PromotionalGift),
            other => Err(format!("unknown service type '{}'", other)),
        }
    }
}

/// Promotional or financial adjustment attached to a booking.
///
/// `details` is free-form; pricing reads `percentage` for discounts and
/// `amount` or `percentage` for cashback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomerService {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub user_id: Uuid,
    pub service_type: ServiceType,
    pub details: serde_json::Value,
    pub is_active: bool,
    pub applied_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl CustomerService {
    pub fn new(
        booking_id: Uuid,
        user_id: Uuid,
        service_type: ServiceType,
        details: serde_json::Value,
        expires_after: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            booking_id,
            user_id,
            service_type,
            details,
            is_active: true,
            applied_at: None,
            expires_at: Some(now + expires_after),
            created_at: now,
        }
    }

    /// Unapplied services lapse at `expires_at`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.applied_at.is_none() && self.expires_at.map_or(false, |at| at <= now)
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_expired(now)
    }

    pub fn percentage(&self) -> Option<Decimal> {
        decimal_field(&self.details, "percentage")
    }

    pub fn amount(&self) -> Option<Decimal> {
        decimal_field(&self.details, "amount")
    }

    /// What this service contributes to the booking price right now.
    pub fn as_adjustment(&self, now: DateTime<Utc>) -> Option<PriceAdjustment> {
        if !self.is_live(now) {
            return None;
        }
        match self.service_type {
            ServiceType::FoodDiscount | ServiceType::BusDiscount => {
                self.percentage().map(PriceAdjustment::PercentDiscount)
            }
            ServiceType::Cashback => self
                .amount()
                .map(PriceAdjustment::CashbackFlat)
                .or_else(|| self.percentage().map(PriceAdjustment::CashbackPercent)),
            ServiceType::PromotionalGift => None,
        }
    }
}

/// Reads a number given either as JSON number or numeric string.
fn decimal_field(details: &serde_json::Value, key: &str) -> Option<Decimal> {
    match details.get(key)? {
        serde_json::Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        serde_json::Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_transitions() {
        assert!(BookingStatus::Pending.can_transition_to(BookingStatus::Confirmed));
        assert!(BookingStatus::Confirmed.can_transition_to(BookingStatus::Completed));
        assert!(!BookingStatus::Pending.can_transition_to(BookingStatus::Completed));
        assert!(!BookingStatus::Cancelled.can_transition_to(BookingStatus::Confirmed));
        assert!(!BookingStatus::Completed.can_transition_to(BookingStatus::Cancelled));
        assert!(BookingStatus::Confirmed.holds_dates());
        assert!(!BookingStatus::Cancelled.holds_dates());
    }

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [
            BookingStatus::Pending,
            BookingStatus::Confirmed,
            BookingStatus::Cancelled,
            BookingStatus::Completed,
        ] {
            assert_eq!(status.as_str().parse::<BookingStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_service_adjustments() {
        let now = Utc::now();
        let booking_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();

        let food = CustomerService::new(booking_id, user_id, ServiceType::FoodDiscount, json!({"percentage": 10}), Duration::days(30));
        assert_eq!(food.as_adjustment(now), Some(PriceAdjustment::PercentDiscount(Decimal::from(10))));

        let flat = CustomerService::new(booking_id, user_id, ServiceType::Cashback, json!({"amount": "12.50"}), Duration::days(30));
        assert_eq!(flat.as_adjustment(now), Some(PriceAdjustment::CashbackFlat(Decimal::new(1250, 2))));

        let pct = CustomerService::new(booking_id, user_id, ServiceType::Cashback, json!({"percentage": 5}), Duration::days(30));
        assert_eq!(pct.as_adjustment(now), Some(PriceAdjustment::CashbackPercent(Decimal::from(5))));

        let gift = CustomerService::new(booking_id, user_id, ServiceType::PromotionalGift, json!({"item": "honey jar"}), Duration::days(30));
        assert_eq!(gift.as_adjustment(now), None);
    }

    #[test]
    fn test_service_expiry() {
        let mut service = CustomerService::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            ServiceType::BusDiscount,
            json!({"percentage": 20}),
            Duration::days(30),
        );
        let later = service.created_at + Duration::days(31);

        assert!(service.is_live(service.created_at));
        assert!(service.is_expired(later));
        assert_eq!(service.as_adjustment(later), None);

        // Applied services no longer lapse.
        service.applied_at = Some(service.created_at + Duration::days(1));
        assert!(service.is_live(later));
    }
}
