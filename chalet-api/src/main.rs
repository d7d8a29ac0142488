use anyhow::Context;
use chalet_api::{app, worker, AppState, AuthConfig, Repositories};
use chalet_store::{
    Config, DbClient, RedisClient, StoreBookingRepository, StoreListingRepository, StoreMessageRepository,
    StoreServiceRepository, StoreTransportRepository,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chalet_api=debug,chalet_booking=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("failed to load config")?;
    tracing::info!("Starting Chalet API on port {}", config.server.port);

    let db = DbClient::new(config.database.url.expose(), config.database.max_connections)
        .await
        .context("failed to connect to Postgres")?;
    db.migrate().await.context("failed to run migrations")?;

    let redis = match &config.redis {
        Some(redis) => match RedisClient::new(redis.url.expose()).await {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                tracing::warn!(error = %e, "redis unavailable, rate limiting disabled");
                None
            }
        },
        None => None,
    };

    // Postgres has no push feed here; watchers poll.
    let repos = Repositories {
        listings: Arc::new(StoreListingRepository::new(db.pool.clone())),
        bookings: Arc::new(StoreBookingRepository::new(db.pool.clone())),
        services: Arc::new(StoreServiceRepository::new(db.pool.clone())),
        transports: Arc::new(StoreTransportRepository::new(db.pool.clone())),
        messages: Arc::new(StoreMessageRepository::new(db.pool.clone())),
        feed: None,
    };

    let auth = AuthConfig {
        secret: config.auth.jwt_secret.clone(),
        expiration: config.auth.jwt_expiration_seconds,
        allow_dev_tokens: config.auth.allow_dev_tokens,
    };
    let state = AppState::new(repos, auth, config.business_rules.clone(), redis);

    tokio::spawn(worker::start_expiry_worker(
        state.ledger.clone(),
        config.business_rules.expiry_sweep_interval(),
    ));

    let app = app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
