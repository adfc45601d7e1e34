pub mod auth;
pub mod bookings;
pub mod middleware;
pub mod spaces;
pub mod state;

pub use middleware::{require_admin, require_auth};

use utoipa::OpenApi;

/// Master definition for the OpenAPI specification.
#[derive(OpenApi)]
#[openapi(
    paths(
        auth::signup_handler,
        auth::login_handler,
        auth::logout_handler,
        spaces::list_spaces_handler,
        spaces::get_space_handler,
        spaces::create_space_handler,
        spaces::update_space_handler,
        spaces::delete_space_handler,
        bookings::create_booking_handler,
        bookings::list_bookings_handler,
        bookings::get_booking_handler,
        bookings::cancel_booking_handler,
    ),
    components(
        schemas(
            auth::SignupRequest,
            auth::LoginRequest,
            auth::AuthResponse,
            spaces::CreateSpaceRequest,
            spaces::UpdateSpaceRequest,
            spaces::SpaceResponse,
            bookings::CreateBookingRequest,
            bookings::BookingResponse,
        )
    ),
    tags(
        (name = "Space Booking API", description = "API endpoints for registering users, managing spaces and reserving them.")
    )
)]
pub struct ApiDoc;
