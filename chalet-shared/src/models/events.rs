use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct BookingCreatedEvent {
    pub booking_id: Uuid,
    pub reference: String,
    pub listing_id: Uuid,
    pub user_id: Uuid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub total_amount: Decimal,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct BookingCancelledEvent {
    pub booking_id: Uuid,
    pub listing_id: Uuid,
    pub cancelled_by: Uuid,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct ServiceAppliedEvent {
    pub service_id: Uuid,
    pub booking_id: Uuid,
    pub service_type: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct MessagePostedEvent {
    pub message_id: Uuid,
    pub conversation_id: Uuid,
    pub customer_id: Uuid,
    /// "customer" or "team"
    pub sender: String,
    pub created_at: DateTime<Utc>,
}

/// Everything the booking core announces after a committed change.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainEvent {
    BookingCreated(BookingCreatedEvent),
    BookingCancelled(BookingCancelledEvent),
    ServiceApplied(ServiceAppliedEvent),
    MessagePosted(MessagePostedEvent),
}

impl DomainEvent {
    /// Topic-style name, used as a log field and SSE event name.
    pub fn topic(&self) -> &'static str {
        match self {
            DomainEvent::BookingCreated(_) => "booking.created",
            DomainEvent::BookingCancelled(_) => "booking.cancelled",
            DomainEvent::ServiceApplied(_) => "service.applied",
            DomainEvent::MessagePosted(_) => "message.posted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_is_tagged() {
        let event = DomainEvent::BookingCancelled(BookingCancelledEvent {
            booking_id: Uuid::new_v4(),
            listing_id: Uuid::new_v4(),
            cancelled_by: Uuid::new_v4(),
            timestamp: 0,
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "BOOKING_CANCELLED");
        assert_eq!(event.topic(), "booking.cancelled");
    }
}
