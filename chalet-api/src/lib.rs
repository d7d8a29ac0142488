use axum::{http::Method, middleware::from_fn_with_state, routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod bookings;
pub mod error;
pub mod extract;
pub mod listings;
pub mod middleware;
pub mod state;
pub mod support;
pub mod worker;

pub use error::AppError;
pub use state::{AppState, AuthConfig, Repositories};

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    // Everything here needs a resolved Actor.
    let protected = Router::new()
        .merge(listings::routes())
        .merge(bookings::routes())
        .merge(support::routes())
        .route_layer(from_fn_with_state(state.clone(), middleware::actor_middleware));

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(auth::routes())
        .merge(listings::public_routes())
        .merge(protected)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(from_fn_with_state(state.clone(), middleware::rate_limit_middleware))
        .with_state(state)
}
