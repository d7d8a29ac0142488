pub mod availability;
pub mod listing;
pub mod management;
pub mod memory;
pub mod pricing;

pub use availability::{AvailabilityError, AvailabilityIndex, DateRange, ReservationToken, ReserveOutcome};
pub use listing::{Listing, ListingCategory, ListingError, ListingFilter, ListingRepository, ListingUpdate, NewListing};
pub use management::ListingService;
pub use pricing::{PriceAdjustment, PriceBreakdown, PricingCalculator, PricingError, TransportRates, TransportType};
