use chalet_booking::BookingRules;
use chalet_catalog::TransportRates;
use chalet_shared::Masked;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    /// Rate limiting is skipped without it.
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    pub auth: AuthConfig,
    #[serde(default)]
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    #[serde(default = "default_reservation_timeout_ms")]
    pub reservation_timeout_ms: u64,
    #[serde(default = "default_service_expiry_days")]
    pub service_expiry_days: i64,
    #[serde(default = "default_reference_prefix")]
    pub reference_prefix: String,
    #[serde(default)]
    pub transport_prices: TransportPrices,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: i64,
    #[serde(default = "default_expiry_sweep_seconds")]
    pub expiry_sweep_seconds: u64,
}

fn default_reservation_timeout_ms() -> u64 { 5000 }
fn default_service_expiry_days() -> i64 { 30 }
fn default_reference_prefix() -> String { "FR-".into() }
fn default_poll_interval_ms() -> u64 { 3000 }
fn default_rate_limit() -> i64 { 100 }
fn default_expiry_sweep_seconds() -> u64 { 3600 }

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            reservation_timeout_ms: default_reservation_timeout_ms(),
            service_expiry_days: default_service_expiry_days(),
            reference_prefix: default_reference_prefix(),
            transport_prices: TransportPrices::default(),
            poll_interval_ms: default_poll_interval_ms(),
            rate_limit_per_minute: default_rate_limit(),
            expiry_sweep_seconds: default_expiry_sweep_seconds(),
        }
    }
}

impl BusinessRules {
    pub fn booking_rules(&self) -> BookingRules {
        BookingRules {
            reservation_timeout: Duration::from_millis(self.reservation_timeout_ms),
            service_expiry: chrono::Duration::days(self.service_expiry_days),
            reference_prefix: self.reference_prefix.clone(),
            transport_rates: self.transport_prices.rates(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn expiry_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_sweep_seconds)
    }
}

/// Base transport prices; bus is per passenger, the rest flat.
#[derive(Debug, Deserialize, Clone)]
pub struct TransportPrices {
    pub bus: Decimal,
    pub private_car: Decimal,
    pub minibus: Decimal,
}

impl Default for TransportPrices {
    fn default() -> Self {
        let rates = TransportRates::default();
        Self {
            bus: rates.bus,
            private_car: rates.private_car,
            minibus: rates.minibus,
        }
    }
}

impl TransportPrices {
    pub fn rates(&self) -> TransportRates {
        TransportRates {
            bus: self.bus,
            private_car: self.private_car,
            minibus: self.minibus,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: Masked<String>,
    pub jwt_expiration_seconds: u64,
    /// Enables `POST /v1/auth/token`.
    #[serde(default)]
    pub allow_dev_tokens: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: Masked<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: Masked<String>,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. CHALET__DATABASE__URL
            .add_source(config::Environment::with_prefix("CHALET").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};

    fn parse(toml: &str) -> Config {
        config::Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse(
            r#"
            [server]
            port = 8080
            [database]
            url = "postgres://u:secret@db/chalet"
            [auth]
            jwt_secret = "s3cret"
            jwt_expiration_seconds = 60
            "#,
        );

        assert!(config.redis.is_none());
        assert!(!config.auth.allow_dev_tokens);
        assert_eq!(config.database.max_connections, 5);

        let rules = config.business_rules.booking_rules();
        assert_eq!(rules.reservation_timeout, Duration::from_millis(5000));
        assert_eq!(rules.service_expiry, chrono::Duration::days(30));
        assert_eq!(rules.reference_prefix, "FR-");
        assert_eq!(rules.transport_rates.bus, Decimal::from(15));
        assert_eq!(config.business_rules.poll_interval(), Duration::from_millis(3000));
    }

    #[test]
    fn test_secrets_are_masked_in_debug() {
        let config = parse(
            r#"
            [server]
            port = 8080
            [database]
            url = "postgres://u:hunter2@db/chalet"
            [auth]
            jwt_secret = "very-secret-key"
            jwt_expiration_seconds = 60
            [business_rules.transport_prices]
            bus = 20
            private_car = 90
            minibus = 130
            "#,
        );

        let printed = format!("{:?}", config);
        assert!(!printed.contains("hunter2"));
        assert!(!printed.contains("very-secret-key"));
        assert_eq!(config.auth.jwt_secret.expose(), "very-secret-key");
        assert_eq!(config.business_rules.transport_prices.rates().minibus, Decimal::from(130));
    }
}
