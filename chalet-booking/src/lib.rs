pub mod coordinator;
pub mod ledger;
pub mod memory;
pub mod models;
pub mod reference;
pub mod repository;
pub mod transport;

use chalet_catalog::TransportRates;
use std::time::Duration;

pub use coordinator::{BookingRequest, ReservationCoordinator, ReservationError};
pub use ledger::{LedgerError, ServiceLedger};
pub use models::{Booking, BookingStatus, CustomerService, PaymentStatus, ServiceType, TransportBooking, TransportStatus};
pub use reference::ReferenceGenerator;
pub use repository::{BookingRangeSource, BookingRepository, InsertOutcome, ServiceRepository, TransportRepository};
pub use transport::{TransportDesk, TransportError, TransportRequest};

/// Business rules the booking components are built from.
#[derive(Debug, Clone)]
pub struct BookingRules {
    /// Bound on waiting for a listing's calendar and on each commit.
    pub reservation_timeout: Duration,
    pub service_expiry: chrono::Duration,
    pub reference_prefix: String,
    pub transport_rates: TransportRates,
}

impl Default for BookingRules {
    fn default() -> Self {
        Self {
            reservation_timeout: Duration::from_millis(5000),
            service_expiry: chrono::Duration::days(30),
            reference_prefix: reference::DEFAULT_PREFIX.to_string(),
            transport_rates: TransportRates::default(),
        }
    }
}
