pub mod app_config;
pub mod booking_repo;
pub mod database;
pub mod listing_repo;
pub mod message_repo;
pub mod redis_repo;
pub mod service_repo;

pub use app_config::Config;
pub use booking_repo::StoreBookingRepository;
pub use database::DbClient;
pub use listing_repo::StoreListingRepository;
pub use message_repo::StoreMessageRepository;
pub use redis_repo::RedisClient;
pub use service_repo::{StoreServiceRepository, StoreTransportRepository};
