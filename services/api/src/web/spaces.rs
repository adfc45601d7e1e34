//! services/api/src/web/spaces.rs
//!
//! Read endpoints for browsing spaces, plus the admin-only CRUD surface.
//! Deleting a space deactivates it; bookings keep their history.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use booking_core::domain::Space;
use booking_core::ports::{PortError, SpaceLookup};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CreateSpaceRequest {
    pub name: String,
    pub price_per_night: f64,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateSpaceRequest {
    pub name: Option<String>,
    pub price_per_night: Option<f64>,
    pub is_active: Option<bool>,
}

#[derive(Serialize, ToSchema)]
pub struct SpaceResponse {
    pub id: Uuid,
    pub name: String,
    pub price_per_night: f64,
    pub is_active: bool,
}

impl From<Space> for SpaceResponse {
    fn from(s: Space) -> Self {
        Self {
            id: s.id,
            name: s.name,
            price_per_night: s.price_per_night,
            is_active: s.is_active,
        }
    }
}

fn port_error_response(e: PortError) -> (StatusCode, String) {
    match e {
        PortError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        PortError::Unavailable(_) => {
            error!("space storage call failed: {:?}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Storage unavailable".to_string(),
            )
        }
    }
}

//=========================================================================================
// Read Handlers
//=========================================================================================

/// GET /spaces - List all spaces
#[utoipa::path(
    get,
    path = "/spaces",
    responses(
        (status = 200, description = "All spaces", body = [SpaceResponse])
    )
)]
pub async fn list_spaces_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let spaces = state
        .db
        .list_spaces()
        .await
        .map_err(port_error_response)?;
    let body: Vec<SpaceResponse> = spaces.into_iter().map(SpaceResponse::from).collect();
    Ok(Json(body))
}

/// GET /spaces/{id} - Fetch one space
#[utoipa::path(
    get,
    path = "/spaces/{id}",
    responses(
        (status = 200, description = "The space", body = SpaceResponse),
        (status = 404, description = "Space not found")
    ),
    params(
        ("id" = Uuid, Path, description = "Space id")
    )
)]
pub async fn get_space_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let space = state
        .db
        .get_by_id(id)
        .await
        .map_err(port_error_response)?
        .ok_or((StatusCode::NOT_FOUND, "Space not found".to_string()))?;
    Ok(Json(SpaceResponse::from(space)))
}

//=========================================================================================
// Admin Handlers
//=========================================================================================

/// POST /admin/spaces - Create a space
#[utoipa::path(
    post,
    path = "/admin/spaces",
    request_body = CreateSpaceRequest,
    responses(
        (status = 201, description = "Space created", body = SpaceResponse),
        (status = 400, description = "Invalid request"),
        (status = 403, description = "Caller is not an admin")
    )
)]
pub async fn create_space_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSpaceRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if req.name.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Name must not be empty".to_string()));
    }
    if req.price_per_night <= 0.0 {
        return Err((
            StatusCode::BAD_REQUEST,
            "Price per night must be positive".to_string(),
        ));
    }

    let space = state
        .db
        .create_space(req.name.trim(), req.price_per_night)
        .await
        .map_err(port_error_response)?;
    Ok((StatusCode::CREATED, Json(SpaceResponse::from(space))))
}

/// PUT /admin/spaces/{id} - Update a space
#[utoipa::path(
    put,
    path = "/admin/spaces/{id}",
    request_body = UpdateSpaceRequest,
    responses(
        (status = 200, description = "Space updated", body = SpaceResponse),
        (status = 400, description = "Invalid request"),
        (status = 403, description = "Caller is not an admin"),
        (status = 404, description = "Space not found")
    ),
    params(
        ("id" = Uuid, Path, description = "Space id")
    )
)]
pub async fn update_space_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateSpaceRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if let Some(price) = req.price_per_night {
        if price <= 0.0 {
            return Err((
                StatusCode::BAD_REQUEST,
                "Price per night must be positive".to_string(),
            ));
        }
    }
    if let Some(name) = &req.name {
        if name.trim().is_empty() {
            return Err((StatusCode::BAD_REQUEST, "Name must not be empty".to_string()));
        }
    }

    let space = state
        .db
        .update_space(
            id,
            req.name.as_deref().map(str::trim),
            req.price_per_night,
            req.is_active,
        )
        .await
        .map_err(port_error_response)?
        .ok_or((StatusCode::NOT_FOUND, "Space not found".to_string()))?;
    Ok(Json(SpaceResponse::from(space)))
}

/// DELETE /admin/spaces/{id} - Deactivate a space
#[utoipa::path(
    delete,
    path = "/admin/spaces/{id}",
    responses(
        (status = 200, description = "Space deactivated"),
        (status = 403, description = "Caller is not an admin"),
        (status = 404, description = "Space not found")
    ),
    params(
        ("id" = Uuid, Path, description = "Space id")
    )
)]
pub async fn delete_space_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let deactivated = state
        .db
        .deactivate_space(id)
        .await
        .map_err(port_error_response)?;
    if !deactivated {
        return Err((StatusCode::NOT_FOUND, "Space not found".to_string()));
    }
    Ok(StatusCode::OK)
}
