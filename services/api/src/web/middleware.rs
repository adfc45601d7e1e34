//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use booking_core::ports::PortError;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use crate::web::state::AppState;

/// Role attached to a user account. Anything unrecognized in storage is
/// treated as a plain user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Admin,
}

impl Role {
    fn from_db(raw: &str) -> Role {
        match raw {
            "admin" => Role::Admin,
            _ => Role::User,
        }
    }
}

/// The authenticated caller, injected into request extensions by
/// [`require_auth`].
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
}

/// A failing session lookup is a storage outage, not an auth verdict.
fn session_lookup_failed(e: PortError) -> StatusCode {
    error!("failed to validate auth session: {e}");
    StatusCode::SERVICE_UNAVAILABLE
}

/// Middleware that validates the auth session cookie and extracts the caller.
///
/// If valid, inserts an [`AuthUser`] into request extensions for handlers to
/// use. If invalid or missing, returns 401 Unauthorized; if session storage
/// is unreachable, 503 Service Unavailable.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let cookie_header = req
        .headers()
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let auth_session_id = cookie_header
        .split(';')
        .find_map(|c| c.trim().strip_prefix("session="))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let session = state
        .db
        .validate_auth_session(auth_session_id)
        .await
        .map_err(session_lookup_failed)?;

    let (user_id, role) = session.ok_or(StatusCode::UNAUTHORIZED)?;

    req.extensions_mut().insert(AuthUser {
        user_id,
        role: Role::from_db(&role),
    });

    Ok(next.run(req).await)
}

/// Middleware for admin-only routes; must run after [`require_auth`].
pub async fn require_admin(req: Request, next: Next) -> Result<Response, StatusCode> {
    match req.extensions().get::<AuthUser>() {
        Some(user) if user.role == Role::Admin => Ok(next.run(req).await),
        Some(_) => Err(StatusCode::FORBIDDEN),
        None => Err(StatusCode::UNAUTHORIZED),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_outage_is_not_an_auth_verdict() {
        let status = session_lookup_failed(PortError::Unavailable("pool timed out".into()));
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn unrecognized_role_falls_back_to_user() {
        assert_eq!(Role::from_db("admin"), Role::Admin);
        assert_eq!(Role::from_db("superuser"), Role::User);
    }
}
