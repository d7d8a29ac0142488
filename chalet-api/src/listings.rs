use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
    Extension, Json, Router,
};
use chalet_catalog::{DateRange, Listing, ListingFilter, ListingUpdate, NewListing, PriceBreakdown};
use chalet_core::Actor;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::AppError,
    extract::{AppJson, AppPath, AppQuery},
    state::AppState,
};

/// Readable without a token.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/listings", get(list_listings))
        .route("/v1/listings/{id}", get(get_listing))
        .route("/v1/listings/{id}/availability", get(get_availability))
        .route("/v1/listings/{id}/quote", post(quote_stay))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/listings", post(create_listing))
        .route("/v1/listings/{id}", axum::routing::patch(update_listing))
        .route("/v1/listings/{id}/active", put(set_active))
}

async fn list_listings(
    State(state): State<AppState>,
    AppQuery(filter): AppQuery<ListingFilter>,
) -> Result<Json<Vec<Listing>>, AppError> {
    Ok(Json(state.listings.list_listings(&filter).await?))
}

async fn get_listing(State(state): State<AppState>, AppPath(id): AppPath<Uuid>) -> Result<Json<Listing>, AppError> {
    Ok(Json(state.listings.get_listing(id).await?))
}

async fn create_listing(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    AppJson(body): AppJson<NewListing>,
) -> Result<(StatusCode, Json<Listing>), AppError> {
    let listing = state.listings.create_listing(&actor, body).await?;
    Ok((StatusCode::CREATED, Json(listing)))
}

async fn update_listing(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    AppPath(id): AppPath<Uuid>,
    AppJson(body): AppJson<ListingUpdate>,
) -> Result<Json<Listing>, AppError> {
    Ok(Json(state.listings.update_listing(&actor, id, body).await?))
}

#[derive(Debug, Deserialize)]
pub struct ActiveBody {
    pub active: bool,
}

async fn set_active(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    AppPath(id): AppPath<Uuid>,
    AppJson(body): AppJson<ActiveBody>,
) -> Result<Json<Listing>, AppError> {
    Ok(Json(state.listings.set_active(&actor, id, body.active).await?))
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub listing_id: Uuid,
    pub from: NaiveDate,
    pub to: NaiveDate,
    /// True when no committed stay overlaps the window.
    pub available: bool,
    pub booked: Vec<DateRange>,
}

async fn get_availability(
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
    AppQuery(q): AppQuery<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let booked = state.coordinator.availability(id, q.from, q.to).await?;
    Ok(Json(AvailabilityResponse {
        listing_id: id,
        from: q.from,
        to: q.to,
        available: booked.is_empty(),
        booked,
    }))
}

#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: u32,
}

async fn quote_stay(
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
    AppJson(body): AppJson<QuoteRequest>,
) -> Result<Json<PriceBreakdown>, AppError> {
    let price = state.coordinator.quote(id, body.check_in, body.check_out, body.guests).await?;
    Ok(Json(price))
}
