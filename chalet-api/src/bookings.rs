use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use chalet_booking::{
    Booking, BookingRequest, CustomerService, PaymentStatus, ServiceType, TransportBooking, TransportRequest,
};
use chalet_catalog::{PriceBreakdown, TransportType};
use chalet_core::Actor;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::AppError,
    extract::{AppJson, AppPath},
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", post(create_booking).get(list_my_bookings))
        .route("/v1/bookings/{id}", get(get_booking))
        .route("/v1/bookings/reference/{reference}", get(get_by_reference))
        .route("/v1/bookings/{id}/cancel", post(cancel_booking))
        .route("/v1/bookings/{id}/confirm", post(confirm_booking))
        .route("/v1/bookings/{id}/complete", post(complete_booking))
        .route("/v1/bookings/{id}/payment", post(set_payment))
        .route("/v1/bookings/{id}/services", get(list_services).post(apply_service))
        .route("/v1/bookings/{id}/price", get(reprice))
        .route("/v1/bookings/{id}/transport", get(list_transport).post(book_transport))
        .route("/v1/listings/{id}/bookings", get(list_listing_bookings))
        .route("/v1/services/{id}/deactivate", post(deactivate_service))
        .route("/v1/transport/quote", post(quote_transport))
}

async fn create_booking(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    AppJson(body): AppJson<BookingRequest>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let booking = state.coordinator.create_booking(&actor, body).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

async fn list_my_bookings(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Vec<Booking>>, AppError> {
    Ok(Json(state.coordinator.list_for_user(&actor, actor.user_id).await?))
}

async fn list_listing_bookings(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    AppPath(listing_id): AppPath<Uuid>,
) -> Result<Json<Vec<Booking>>, AppError> {
    Ok(Json(state.coordinator.list_for_listing(&actor, listing_id).await?))
}

async fn get_booking(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.coordinator.get_booking(&actor, id).await?))
}

async fn get_by_reference(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    AppPath(reference): AppPath<String>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.coordinator.find_by_reference(&actor, &reference).await?))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.coordinator.cancel_booking(&actor, id).await?))
}

async fn confirm_booking(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.coordinator.confirm_booking(&actor, id).await?))
}

async fn complete_booking(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.coordinator.complete_booking(&actor, id).await?))
}

#[derive(Debug, Deserialize)]
pub struct PaymentBody {
    pub payment_status: PaymentStatus,
}

async fn set_payment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    AppPath(id): AppPath<Uuid>,
    AppJson(body): AppJson<PaymentBody>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.coordinator.set_payment_status(&actor, id, body.payment_status).await?))
}

#[derive(Debug, Deserialize)]
pub struct ServiceBody {
    pub service_type: ServiceType,
    #[serde(default)]
    pub details: serde_json::Value,
}

async fn apply_service(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    AppPath(id): AppPath<Uuid>,
    AppJson(body): AppJson<ServiceBody>,
) -> Result<(StatusCode, Json<CustomerService>), AppError> {
    let service = state.ledger.apply_service(&actor, id, body.service_type, body.details).await?;
    Ok((StatusCode::CREATED, Json(service)))
}

async fn list_services(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<Vec<CustomerService>>, AppError> {
    Ok(Json(state.ledger.list_services(&actor, id).await?))
}

async fn deactivate_service(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<CustomerService>, AppError> {
    Ok(Json(state.ledger.deactivate_service(&actor, id).await?))
}

/// Current price with live services applied; the stored booking is unchanged.
async fn reprice(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<PriceBreakdown>, AppError> {
    Ok(Json(state.ledger.reprice(&actor, id).await?))
}

async fn book_transport(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    AppPath(id): AppPath<Uuid>,
    AppJson(body): AppJson<TransportRequest>,
) -> Result<(StatusCode, Json<TransportBooking>), AppError> {
    let booked = state.transport.book_transport(&actor, id, body).await?;
    Ok((StatusCode::CREATED, Json(booked)))
}

async fn list_transport(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<Vec<TransportBooking>>, AppError> {
    Ok(Json(state.transport.list_for_booking(&actor, id).await?))
}

#[derive(Debug, Deserialize)]
pub struct TransportQuoteBody {
    pub transport_type: TransportType,
    pub passengers: u32,
}

#[derive(Debug, Serialize)]
pub struct TransportQuote {
    pub transport_type: TransportType,
    pub passengers: u32,
    pub price: Decimal,
}

async fn quote_transport(
    State(state): State<AppState>,
    AppJson(body): AppJson<TransportQuoteBody>,
) -> Result<Json<TransportQuote>, AppError> {
    let price = state.transport.quote(body.transport_type, body.passengers)?;
    Ok(Json(TransportQuote {
        transport_type: body.transport_type,
        passengers: body.passengers,
        price,
    }))
}
