//! services/api/src/bin/api.rs

use api_lib::{
    adapters::DbAdapter,
    config::Config,
    error::ApiError,
    web::{
        auth::{login_handler, logout_handler, signup_handler},
        bookings::{
            cancel_booking_handler, create_booking_handler, get_booking_handler,
            list_bookings_handler,
        },
        require_admin, require_auth,
        spaces::{
            create_space_handler, delete_space_handler, get_space_handler, list_spaces_handler,
            update_space_handler,
        },
        state::AppState,
        ApiDoc,
    },
};
use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use booking_core::engine::BookingEngine;
use booking_core::ports::{BookingStore, SpaceLookup, UserLookup};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Wire the Booking Engine to its Ports ---
    let users: Arc<dyn UserLookup> = db_adapter.clone();
    let spaces: Arc<dyn SpaceLookup> = db_adapter.clone();
    let store: Arc<dyn BookingStore> = db_adapter.clone();
    let engine = Arc::new(BookingEngine::new(users, spaces, store));

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        engine,
        db: db_adapter,
        config: config.clone(),
    });

    let cors_origin = "http://localhost:3000"
        .parse::<HeaderValue>()
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let cors = CorsLayer::new()
        .allow_origin(cors_origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 5. Create the Web Router ---
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/signup", post(signup_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler));

    // Routes for any authenticated user
    let user_routes = Router::new()
        .route("/spaces", get(list_spaces_handler))
        .route("/spaces/{id}", get(get_space_handler))
        .route(
            "/bookings",
            post(create_booking_handler).get(list_bookings_handler),
        )
        .route("/bookings/{id}", get(get_booking_handler))
        .route("/bookings/{id}/cancel", post(cancel_booking_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    // Admin-only space management
    let admin_routes = Router::new()
        .route("/admin/spaces", post(create_space_handler))
        .route(
            "/admin/spaces/{id}",
            put(update_space_handler).delete(delete_space_handler),
        )
        .layer(axum_middleware::from_fn(require_admin))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    let api_router = Router::new()
        .merge(public_routes)
        .merge(user_routes)
        .merge(admin_routes)
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
