//! crates/booking_core/src/ports.rs
//!
//! Defines the service contracts (traits) the booking engine depends on.
//! These traits form the boundary of the hexagonal architecture, allowing the
//! engine to be independent of specific storage implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{Booking, BookingStatus, Space};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors of the underlying storage; the
/// engine never sees driver error types.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    /// The storage or lookup call failed transiently (connection loss,
    /// timeout, driver error). Safe for the caller to retry.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    /// The storage engine itself rejected a write that would violate the
    /// no-overlap guarantee (e.g. a range-exclusion constraint). Acts as the
    /// last-resort guard behind the engine's own overlap check.
    #[error("storage conflict: {0}")]
    Conflict(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Capability Ports (Traits)
//=========================================================================================

/// Answers whether a user id is known to the system.
#[async_trait]
pub trait UserLookup: Send + Sync {
    async fn exists(&self, user_id: Uuid) -> PortResult<bool>;
}

/// Resolves a space id to its bookable attributes.
#[async_trait]
pub trait SpaceLookup: Send + Sync {
    async fn get_by_id(&self, space_id: Uuid) -> PortResult<Option<Space>>;
}

/// Persistence for bookings. `find_overlapping` + `insert` are called by the
/// engine as one logical unit under its per-space serialization.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Returns every non-cancelled booking for `space_id` whose
    /// `[start_date, end_date)` intersects `[start, end)`.
    async fn find_overlapping(
        &self,
        space_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> PortResult<Vec<Booking>>;

    async fn insert(&self, booking: &Booking) -> PortResult<()>;

    async fn find_by_id(&self, id: Uuid) -> PortResult<Option<Booking>>;

    async fn find_by_user(&self, user_id: Uuid) -> PortResult<Vec<Booking>>;

    /// Conditional status update: writes `status` and `updated_at` only when
    /// the row exists and is not already cancelled. Returns whether a row
    /// was updated, so a concurrent double-cancel cannot lose an update.
    async fn update_status(
        &self,
        id: Uuid,
        status: BookingStatus,
        updated_at: DateTime<Utc>,
    ) -> PortResult<bool>;
}
