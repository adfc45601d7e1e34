//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete
//! implementation of the `UserLookup`, `SpaceLookup` and `BookingStore` ports
//! from the `booking_core` crate. It handles all interactions with the
//! PostgreSQL database using `sqlx`.
//!
//! Besides the ports, the adapter carries the inherent persistence methods the
//! HTTP layer needs for auth sessions and space administration.

use async_trait::async_trait;
use booking_core::domain::{Booking, BookingStatus, Space, User};
use booking_core::ports::{BookingStore, PortError, PortResult, SpaceLookup, UserLookup};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

// Postgres SQLSTATE codes the adapter translates into port errors.
const UNIQUE_VIOLATION: &str = "23505";
const EXCLUSION_VIOLATION: &str = "23P01";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter backed by a `sqlx` Postgres pool.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unavailable(e: sqlx::Error) -> PortError {
    PortError::Unavailable(e.to_string())
}

fn sqlstate(e: &sqlx::Error) -> Option<String> {
    e.as_database_error()
        .and_then(|d| d.code())
        .map(|c| c.into_owned())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct BookingRecord {
    id: Uuid,
    user_id: Uuid,
    space_id: Uuid,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    total_price: f64,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl BookingRecord {
    fn to_domain(self) -> PortResult<Booking> {
        let status = BookingStatus::parse(&self.status).ok_or_else(|| {
            PortError::Unavailable(format!("booking {} has corrupt status '{}'", self.id, self.status))
        })?;
        Ok(Booking {
            id: self.id,
            user_id: self.user_id,
            space_id: self.space_id,
            start_date: self.start_date,
            end_date: self.end_date,
            total_price: self.total_price,
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct SpaceRecord {
    id: Uuid,
    name: String,
    price_per_night: f64,
    is_active: bool,
}

impl SpaceRecord {
    fn to_domain(self) -> Space {
        Space {
            id: self.id,
            name: self.name,
            price_per_night: self.price_per_night,
            is_active: self.is_active,
        }
    }
}

/// Sensitive login row, only used by the auth handlers.
#[derive(FromRow)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub hashed_password: String,
    pub role: String,
}

//=========================================================================================
// Core Port Implementations
//=========================================================================================

#[async_trait]
impl UserLookup for DbAdapter {
    async fn exists(&self, user_id: Uuid) -> PortResult<bool> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE user_id = $1)")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(unavailable)
    }
}

#[async_trait]
impl SpaceLookup for DbAdapter {
    async fn get_by_id(&self, space_id: Uuid) -> PortResult<Option<Space>> {
        let record = sqlx::query_as::<_, SpaceRecord>(
            "SELECT id, name, price_per_night, is_active FROM spaces WHERE id = $1",
        )
        .bind(space_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(record.map(SpaceRecord::to_domain))
    }
}

#[async_trait]
impl BookingStore for DbAdapter {
    async fn find_overlapping(
        &self,
        space_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> PortResult<Vec<Booking>> {
        // Canonical half-open overlap: existing.start < new.end AND
        // new.start < existing.end.
        let records = sqlx::query_as::<_, BookingRecord>(
            "SELECT id, user_id, space_id, start_date, end_date, total_price, status, created_at, updated_at \
             FROM bookings \
             WHERE space_id = $1 AND status <> 'cancelled' AND start_date < $3 AND $2 < end_date",
        )
        .bind(space_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        records.into_iter().map(BookingRecord::to_domain).collect()
    }

    async fn insert(&self, booking: &Booking) -> PortResult<()> {
        let res = sqlx::query(
            "INSERT INTO bookings \
             (id, user_id, space_id, start_date, end_date, total_price, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(booking.id)
        .bind(booking.user_id)
        .bind(booking.space_id)
        .bind(booking.start_date)
        .bind(booking.end_date)
        .bind(booking.total_price)
        .bind(booking.status.as_str())
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => Ok(()),
            // The bookings_no_overlap exclusion constraint is the storage
            // backstop behind the engine's own overlap check.
            Err(e) if sqlstate(&e).as_deref() == Some(EXCLUSION_VIOLATION) => Err(
                PortError::Conflict(format!("space {} range already taken", booking.space_id)),
            ),
            Err(e) => Err(unavailable(e)),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> PortResult<Option<Booking>> {
        let record = sqlx::query_as::<_, BookingRecord>(
            "SELECT id, user_id, space_id, start_date, end_date, total_price, status, created_at, updated_at \
             FROM bookings WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        record.map(BookingRecord::to_domain).transpose()
    }

    async fn find_by_user(&self, user_id: Uuid) -> PortResult<Vec<Booking>> {
        let records = sqlx::query_as::<_, BookingRecord>(
            "SELECT id, user_id, space_id, start_date, end_date, total_price, status, created_at, updated_at \
             FROM bookings WHERE user_id = $1 ORDER BY created_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        records.into_iter().map(BookingRecord::to_domain).collect()
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: BookingStatus,
        updated_at: DateTime<Utc>,
    ) -> PortResult<bool> {
        // Conditional update: a cancelled row is terminal and never rewritten.
        let res = sqlx::query(
            "UPDATE bookings SET status = $2, updated_at = $3 \
             WHERE id = $1 AND status <> 'cancelled'",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(updated_at)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(res.rows_affected() > 0)
    }
}

//=========================================================================================
// Auth Persistence (used by the web/auth handlers, not a core port)
//=========================================================================================

impl DbAdapter {
    pub async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<User> {
        let user_id = Uuid::new_v4();
        let res = sqlx::query(
            "INSERT INTO users (user_id, email, hashed_password, role) VALUES ($1, $2, $3, 'user')",
        )
        .bind(user_id)
        .bind(email)
        .bind(hashed_password)
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => Ok(User {
                user_id,
                email: Some(email.to_string()),
            }),
            Err(e) if sqlstate(&e).as_deref() == Some(UNIQUE_VIOLATION) => {
                Err(PortError::Conflict("email already registered".to_string()))
            }
            Err(e) => Err(unavailable(e)),
        }
    }

    pub async fn get_user_by_email(&self, email: &str) -> PortResult<Option<UserCredentials>> {
        sqlx::query_as::<_, UserCredentials>(
            "SELECT user_id, email, hashed_password, role FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)
    }

    pub async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    /// Resolves a live session to `(user_id, role)`. Expired sessions are
    /// treated the same as unknown ones.
    pub async fn validate_auth_session(
        &self,
        session_id: &str,
    ) -> PortResult<Option<(Uuid, String)>> {
        let row = sqlx::query_as::<_, (Uuid, String)>(
            "SELECT s.user_id, u.role FROM auth_sessions s \
             JOIN users u ON u.user_id = s.user_id \
             WHERE s.id = $1 AND s.expires_at > now()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(row)
    }

    pub async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}

//=========================================================================================
// Space Administration (used by the web/spaces handlers, not a core port)
//=========================================================================================

impl DbAdapter {
    pub async fn create_space(&self, name: &str, price_per_night: f64) -> PortResult<Space> {
        let record = sqlx::query_as::<_, SpaceRecord>(
            "INSERT INTO spaces (id, name, price_per_night, is_active) \
             VALUES ($1, $2, $3, TRUE) \
             RETURNING id, name, price_per_night, is_active",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(price_per_night)
        .fetch_one(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(record.to_domain())
    }

    pub async fn list_spaces(&self) -> PortResult<Vec<Space>> {
        let records = sqlx::query_as::<_, SpaceRecord>(
            "SELECT id, name, price_per_night, is_active FROM spaces ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(records.into_iter().map(SpaceRecord::to_domain).collect())
    }

    /// Partial update; `None` fields keep their current value. Returns the
    /// updated space, or `None` when the id is unknown.
    pub async fn update_space(
        &self,
        id: Uuid,
        name: Option<&str>,
        price_per_night: Option<f64>,
        is_active: Option<bool>,
    ) -> PortResult<Option<Space>> {
        let record = sqlx::query_as::<_, SpaceRecord>(
            "UPDATE spaces SET \
                 name = COALESCE($2, name), \
                 price_per_night = COALESCE($3, price_per_night), \
                 is_active = COALESCE($4, is_active), \
                 updated_at = now() \
             WHERE id = $1 \
             RETURNING id, name, price_per_night, is_active",
        )
        .bind(id)
        .bind(name)
        .bind(price_per_night)
        .bind(is_active)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(record.map(SpaceRecord::to_domain))
    }

    /// Soft delete: the space stays on record but stops being bookable.
    pub async fn deactivate_space(&self, id: Uuid) -> PortResult<bool> {
        let res = sqlx::query("UPDATE spaces SET is_active = FALSE, updated_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(res.rows_affected() > 0)
    }
}
