//! services/api/src/web/bookings.rs
//!
//! Axum handlers for the reservation endpoints. This is the inbound layer of
//! the booking engine: it shapes calendar days into check-in/check-out
//! instants, attaches the authenticated caller, and maps the engine's error
//! taxonomy onto HTTP statuses.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use booking_core::domain::{Booking, CreateBooking};
use booking_core::engine::BookingError;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::middleware::AuthUser;
use crate::web::state::AppState;

/// Guests take the room at 14:00 and leave it by 12:00.
const CHECK_IN_HOUR: u32 = 14;
const CHECK_OUT_HOUR: u32 = 12;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CreateBookingRequest {
    pub space_id: Uuid,
    /// Check-in day; the booked range starts at 14:00.
    pub start_date: NaiveDate,
    /// Check-out day; the booked range ends at 12:00.
    pub end_date: NaiveDate,
}

#[derive(Serialize, ToSchema)]
pub struct BookingResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub space_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub total_price: f64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Booking> for BookingResponse {
    fn from(b: Booking) -> Self {
        Self {
            id: b.id,
            user_id: b.user_id,
            space_id: b.space_id,
            start_date: b.start_date,
            end_date: b.end_date,
            total_price: b.total_price,
            status: b.status.as_str().to_string(),
            created_at: b.created_at,
            updated_at: b.updated_at,
        }
    }
}

//=========================================================================================
// Helpers
//=========================================================================================

fn at_hour(date: NaiveDate, hour: u32) -> Result<DateTime<Utc>, (StatusCode, String)> {
    date.and_hms_opt(hour, 0, 0)
        .map(|dt| Utc.from_utc_datetime(&dt))
        .ok_or((StatusCode::BAD_REQUEST, "Invalid date".to_string()))
}

fn booking_error_response(e: BookingError) -> (StatusCode, String) {
    let status = match &e {
        BookingError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        BookingError::NotFound(_) => StatusCode::NOT_FOUND,
        BookingError::InvalidState(_) => StatusCode::UNPROCESSABLE_ENTITY,
        BookingError::Conflict(_) => StatusCode::CONFLICT,
        BookingError::Forbidden => StatusCode::FORBIDDEN,
        BookingError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        BookingError::Cancelled => StatusCode::GATEWAY_TIMEOUT,
    };
    (status, e.to_string())
}

/// Runs an engine call under the configured request timeout. On expiry the
/// token is cancelled so the engine aborts its outstanding storage calls and
/// the caller sees the distinct timeout condition.
async fn with_deadline<T>(
    timeout: Duration,
    token: &CancellationToken,
    fut: impl Future<Output = Result<T, BookingError>>,
) -> Result<T, BookingError> {
    tokio::select! {
        res = fut => res,
        _ = tokio::time::sleep(timeout) => {
            token.cancel();
            Err(BookingError::Cancelled)
        }
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /bookings - Reserve a space for a date range
#[utoipa::path(
    post,
    path = "/bookings",
    request_body = CreateBookingRequest,
    responses(
        (status = 201, description = "Booking created", body = BookingResponse),
        (status = 400, description = "Invalid dates"),
        (status = 404, description = "Space not found"),
        (status = 409, description = "Space already booked for the selected dates"),
        (status = 422, description = "Space is not active")
    )
)]
pub async fn create_booking_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let input = CreateBooking {
        user_id: auth.user_id,
        space_id: req.space_id,
        start_date: at_hour(req.start_date, CHECK_IN_HOUR)?,
        end_date: at_hour(req.end_date, CHECK_OUT_HOUR)?,
    };

    let token = CancellationToken::new();
    let booking = with_deadline(
        state.config.request_timeout,
        &token,
        state.engine.create(input, &token),
    )
    .await
    .map_err(booking_error_response)?;

    Ok((StatusCode::CREATED, Json(BookingResponse::from(booking))))
}

/// GET /bookings - List the caller's bookings
#[utoipa::path(
    get,
    path = "/bookings",
    responses(
        (status = 200, description = "The caller's bookings", body = [BookingResponse])
    )
)]
pub async fn list_bookings_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let token = CancellationToken::new();
    let bookings = with_deadline(
        state.config.request_timeout,
        &token,
        state.engine.list_by_user(auth.user_id, &token),
    )
    .await
    .map_err(booking_error_response)?;

    let body: Vec<BookingResponse> = bookings.into_iter().map(BookingResponse::from).collect();
    Ok(Json(body))
}

/// GET /bookings/{id} - Fetch one booking; owner only
#[utoipa::path(
    get,
    path = "/bookings/{id}",
    responses(
        (status = 200, description = "The booking", body = BookingResponse),
        (status = 403, description = "Caller does not own this booking"),
        (status = 404, description = "Booking not found")
    ),
    params(
        ("id" = Uuid, Path, description = "Booking id")
    )
)]
pub async fn get_booking_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let token = CancellationToken::new();
    let booking = with_deadline(
        state.config.request_timeout,
        &token,
        state.engine.get_by_id(id, auth.user_id, &token),
    )
    .await
    .map_err(booking_error_response)?;

    Ok(Json(BookingResponse::from(booking)))
}

/// POST /bookings/{id}/cancel - Cancel a booking; owner only
#[utoipa::path(
    post,
    path = "/bookings/{id}/cancel",
    responses(
        (status = 200, description = "Booking cancelled"),
        (status = 403, description = "Caller does not own this booking"),
        (status = 404, description = "Booking not found"),
        (status = 409, description = "Booking already cancelled")
    ),
    params(
        ("id" = Uuid, Path, description = "Booking id")
    )
)]
pub async fn cancel_booking_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let token = CancellationToken::new();
    with_deadline(
        state.config.request_timeout,
        &token,
        state.engine.cancel(id, auth.user_id, &token),
    )
    .await
    .map_err(booking_error_response)?;

    Ok(StatusCode::OK)
}
