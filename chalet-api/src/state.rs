use chalet_booking::memory::{InMemoryBookingRepository, InMemoryServiceRepository, InMemoryTransportRepository};
use chalet_booking::{BookingRepository, ReservationCoordinator, ServiceLedger, ServiceRepository, TransportDesk, TransportRepository};
use chalet_catalog::memory::InMemoryListingRepository;
use chalet_catalog::{ListingRepository, ListingService};
use chalet_core::{BroadcastPublisher, EventPublisher, IdentityResolver};
use chalet_shared::Masked;
use chalet_store::app_config::BusinessRules;
use chalet_store::RedisClient;
use chalet_support::memory::InMemoryMessageRepository;
use chalet_support::{BroadcastFeed, ChangeFeed, MessageRepository, SupportDesk};
use std::sync::Arc;

use crate::middleware::auth::JwtIdentityResolver;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: Masked<String>,
    pub expiration: u64,
    pub allow_dev_tokens: bool,
}

/// Storage behind the services; Postgres in production, in-memory otherwise.
pub struct Repositories {
    pub listings: Arc<dyn ListingRepository>,
    pub bookings: Arc<dyn BookingRepository>,
    pub services: Arc<dyn ServiceRepository>,
    pub transports: Arc<dyn TransportRepository>,
    pub messages: Arc<dyn MessageRepository>,
    /// Without a feed, conversation watchers poll `messages`.
    pub feed: Option<Arc<dyn ChangeFeed>>,
}

impl Repositories {
    pub fn in_memory() -> Self {
        Self {
            listings: Arc::new(InMemoryListingRepository::new()),
            bookings: Arc::new(InMemoryBookingRepository::new()),
            services: Arc::new(InMemoryServiceRepository::new()),
            transports: Arc::new(InMemoryTransportRepository::new()),
            messages: Arc::new(InMemoryMessageRepository::new()),
            feed: Some(Arc::new(BroadcastFeed::new(256))),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub listings: Arc<ListingService>,
    pub coordinator: Arc<ReservationCoordinator>,
    pub ledger: Arc<ServiceLedger>,
    pub transport: Arc<TransportDesk>,
    pub support: Arc<SupportDesk>,
    pub identity: Arc<dyn IdentityResolver>,
    pub events: BroadcastPublisher,
    pub redis: Option<Arc<RedisClient>>,
    pub auth: AuthConfig,
    pub business_rules: BusinessRules,
}

impl AppState {
    pub fn new(repos: Repositories, auth: AuthConfig, business_rules: BusinessRules, redis: Option<Arc<RedisClient>>) -> Self {
        let events = BroadcastPublisher::new(256);
        let publisher: Arc<dyn EventPublisher> = Arc::new(events.clone());
        let rules = business_rules.booking_rules();

        Self {
            listings: Arc::new(ListingService::new(repos.listings.clone())),
            coordinator: Arc::new(ReservationCoordinator::new(
                repos.listings,
                repos.bookings.clone(),
                publisher.clone(),
                &rules,
            )),
            ledger: Arc::new(ServiceLedger::new(
                repos.bookings.clone(),
                repos.services,
                publisher.clone(),
                rules.service_expiry,
            )),
            transport: Arc::new(TransportDesk::new(repos.bookings, repos.transports, rules.transport_rates.clone())),
            support: Arc::new(SupportDesk::new(
                repos.messages,
                repos.feed,
                publisher,
                business_rules.poll_interval(),
            )),
            identity: Arc::new(JwtIdentityResolver::new(auth.secret.clone())),
            events,
            redis,
            auth,
            business_rules,
        }
    }

    /// Swaps the bearer token resolver.
    pub fn with_identity(mut self, identity: Arc<dyn IdentityResolver>) -> Self {
        self.identity = identity;
        self
    }

    /// Fully in-process state without rate limiting.
    pub fn in_memory(auth: AuthConfig) -> Self {
        Self::new(Repositories::in_memory(), auth, BusinessRules::default(), None)
    }
}
