//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::adapters::DbAdapter;
use crate::config::Config;
use booking_core::engine::BookingEngine;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all
/// handlers. The engine sees the adapter only through its ports; the auth and
/// space-admin handlers use the adapter directly.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<BookingEngine>,
    pub db: Arc<DbAdapter>,
    pub config: Arc<Config>,
}
