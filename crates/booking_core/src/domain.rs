//! crates/booking_core/src/domain.rs
//!
//! Defines the pure, core data structures for the booking engine.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Lifecycle state of a booking.
///
/// A closed set: `Cancelled` is terminal, and every transition goes through
/// [`BookingStatus::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingStatus {
    Pending,
    Paid,
    Cancelled,
}

/// Events that can move a booking between statuses.
///
/// `ConfirmPayment` is driven by an external payment collaborator; the
/// engine itself only ever applies `Cancel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingEvent {
    ConfirmPayment,
    Cancel,
}

/// A status transition that is not part of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot apply {event:?} to a {from:?} booking")]
pub struct InvalidTransition {
    pub from: BookingStatus,
    pub event: BookingEvent,
}

impl BookingStatus {
    /// Applies `event` to the current status, returning the next status.
    pub fn apply(self, event: BookingEvent) -> Result<BookingStatus, InvalidTransition> {
        match (self, event) {
            (BookingStatus::Pending, BookingEvent::ConfirmPayment) => Ok(BookingStatus::Paid),
            (BookingStatus::Pending | BookingStatus::Paid, BookingEvent::Cancel) => {
                Ok(BookingStatus::Cancelled)
            }
            (from, event) => Err(InvalidTransition { from, event }),
        }
    }

    /// The storage representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Paid => "paid",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    /// Parses the storage representation back into a status.
    pub fn parse(s: &str) -> Option<BookingStatus> {
        match s {
            "pending" => Some(BookingStatus::Pending),
            "paid" => Some(BookingStatus::Paid),
            "cancelled" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }
}

/// A confirmed reservation of one space for a half-open date range.
#[derive(Debug, Clone)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub space_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub total_price: f64,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Builds a fresh booking from a validated request. Always starts
    /// `Pending` with a newly generated id.
    pub fn new(input: &CreateBooking, total_price: f64, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: input.user_id,
            space_id: input.space_id,
            start_date: input.start_date,
            end_date: input.end_date,
            total_price,
            status: BookingStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A reservation request, as shaped by the inbound layer. The dates are
/// expected to already carry check-in/check-out times; the engine only
/// relies on `start_date < end_date` and whole-day arithmetic.
#[derive(Debug, Clone)]
pub struct CreateBooking {
    pub user_id: Uuid,
    pub space_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

/// A bookable space, as seen by the engine.
#[derive(Debug, Clone)]
pub struct Space {
    pub id: Uuid,
    pub name: String,
    pub price_per_night: f64,
    pub is_active: bool,
}

// Represents a user - used throughout the app.
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: Uuid,
    pub email: Option<String>,
}

/// Half-open interval overlap: `[a_start, a_end)` and `[b_start, b_end)`
/// share at least one instant iff `a_start < b_end && b_start < a_end`.
pub fn overlaps(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && b_start < a_end
}

/// Whole-day count between the midnight truncations of `start` and `end`.
/// This is the pricing unit; check-in/check-out times are deliberately
/// ignored.
pub fn nights_between(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end.date_naive() - start.date_naive()).num_days()
}
