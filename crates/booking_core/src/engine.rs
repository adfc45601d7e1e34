//! crates/booking_core/src/engine.rs
//!
//! The booking engine: decides whether a requested date range for a space may
//! be confirmed, computes its price, and guarantees that no two non-cancelled
//! bookings for the same space ever overlap.
//!
//! The engine only talks to the [`UserLookup`], [`SpaceLookup`] and
//! [`BookingStore`] ports; it never touches concrete storage types.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use crate::domain::{nights_between, Booking, BookingEvent, CreateBooking};
use crate::ports::{BookingStore, PortError, PortResult, SpaceLookup, UserLookup};

/// Everything that can go wrong inside the engine, one variant per error
/// kind the caller is expected to distinguish.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
    #[error("conflict: {0}")]
    Conflict(&'static str),
    #[error("forbidden")]
    Forbidden,
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("operation cancelled")]
    Cancelled,
}

/// The booking engine. Cheap to share behind an `Arc`; every operation is an
/// independent, short-lived request.
pub struct BookingEngine {
    users: Arc<dyn UserLookup>,
    spaces: Arc<dyn SpaceLookup>,
    store: Arc<dyn BookingStore>,
    /// One async mutex per space id, serializing overlap-check + insert for
    /// concurrent create calls on the same space. Other operations do not
    /// take it.
    space_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl BookingEngine {
    pub fn new(
        users: Arc<dyn UserLookup>,
        spaces: Arc<dyn SpaceLookup>,
        store: Arc<dyn BookingStore>,
    ) -> Self {
        Self {
            users,
            spaces,
            store,
            space_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Validates and persists a new reservation.
    ///
    /// Fail-fast validation order: user exists, space exists and is active,
    /// start date is not in the past (day-level comparison), duration is at
    /// least one night, no overlapping non-cancelled booking. The overlap
    /// check and the insert run under the per-space lock.
    pub async fn create(
        &self,
        input: CreateBooking,
        cancel: &CancellationToken,
    ) -> Result<Booking, BookingError> {
        let known = self
            .run_port(cancel, "user lookup", self.users.exists(input.user_id))
            .await?;
        if !known {
            return Err(BookingError::NotFound("user"));
        }

        let space = self
            .run_port(cancel, "space lookup", self.spaces.get_by_id(input.space_id))
            .await?
            .ok_or(BookingError::NotFound("space"))?;
        if !space.is_active {
            return Err(BookingError::InvalidState("space inactive"));
        }

        if input.start_date.date_naive() < Utc::now().date_naive() {
            return Err(BookingError::InvalidInput("start date in the past"));
        }

        let nights = nights_between(input.start_date, input.end_date);
        if nights < 1 {
            return Err(BookingError::InvalidInput("minimum duration is one night"));
        }

        let lock = self.space_lock(input.space_id).await;
        let _guard = lock.lock().await;

        let existing = self
            .run_port(
                cancel,
                "overlap check",
                self.store
                    .find_overlapping(input.space_id, input.start_date, input.end_date),
            )
            .await?;
        if !existing.is_empty() {
            return Err(BookingError::Conflict("space already booked"));
        }

        let total_price = space.price_per_night * nights as f64;
        let booking = Booking::new(&input, total_price, Utc::now());
        self.run_port(cancel, "insert booking", self.store.insert(&booking))
            .await
            .map_err(|e| match e {
                // The storage-level overlap guard fires here and nowhere else.
                BookingError::Conflict(_) => BookingError::Conflict("space already booked"),
                other => other,
            })?;

        info!(
            booking_id = %booking.id,
            space_id = %input.space_id,
            user_id = %input.user_id,
            nights,
            total_price,
            "booking created"
        );
        Ok(booking)
    }

    /// Fetches one booking, rejecting callers that do not own it.
    pub async fn get_by_id(
        &self,
        id: Uuid,
        requester: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Booking, BookingError> {
        let booking = self
            .run_port(cancel, "booking lookup", self.store.find_by_id(id))
            .await?
            .ok_or(BookingError::NotFound("booking"))?;
        if booking.user_id != requester {
            return Err(BookingError::Forbidden);
        }
        Ok(booking)
    }

    /// All bookings owned by `user_id`. Unpaginated.
    pub async fn list_by_user(
        &self,
        user_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Vec<Booking>, BookingError> {
        self.run_port(cancel, "booking list", self.store.find_by_user(user_id))
            .await
    }

    /// Cancels a booking on behalf of its owner. `Cancelled` is terminal, so
    /// a second cancel reports a conflict. The write itself is conditional
    /// on the row not being cancelled yet, which closes the race between two
    /// concurrent cancels of the same booking.
    pub async fn cancel(
        &self,
        id: Uuid,
        requester: Uuid,
        cancel: &CancellationToken,
    ) -> Result<(), BookingError> {
        let booking = self
            .run_port(cancel, "booking lookup", self.store.find_by_id(id))
            .await?
            .ok_or(BookingError::NotFound("booking"))?;
        if booking.user_id != requester {
            return Err(BookingError::Forbidden);
        }

        let next = booking
            .status
            .apply(BookingEvent::Cancel)
            .map_err(|_| BookingError::Conflict("booking already cancelled"))?;

        let updated = self
            .run_port(
                cancel,
                "status update",
                self.store.update_status(id, next, Utc::now()),
            )
            .await?;
        if !updated {
            // Lost the race against a concurrent cancel.
            return Err(BookingError::Conflict("booking already cancelled"));
        }

        info!(booking_id = %id, user_id = %requester, "booking cancelled");
        Ok(())
    }

    async fn space_lock(&self, space_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.space_locks.lock().await;
        locks
            .entry(space_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Races a port call against the caller-supplied cancellation signal and
    /// folds port failures into the engine's error taxonomy. Storage detail
    /// is logged here, with operation context, and never reaches the caller.
    async fn run_port<T>(
        &self,
        cancel: &CancellationToken,
        op: &'static str,
        fut: impl Future<Output = PortResult<T>> + Send,
    ) -> Result<T, BookingError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(BookingError::Cancelled),
            res = fut => res.map_err(|e| match e {
                PortError::Conflict(detail) => {
                    info!(op, %detail, "storage rejected conflicting write");
                    BookingError::Conflict("concurrent update")
                }
                PortError::Unavailable(detail) => {
                    error!(op, %detail, "storage call failed");
                    BookingError::Unavailable(format!("{op} failed"))
                }
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{overlaps, BookingStatus, Space};
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;

    struct StubUsers {
        known: HashSet<Uuid>,
    }

    #[async_trait]
    impl UserLookup for StubUsers {
        async fn exists(&self, user_id: Uuid) -> PortResult<bool> {
            Ok(self.known.contains(&user_id))
        }
    }

    struct StubSpaces {
        spaces: HashMap<Uuid, Space>,
    }

    #[async_trait]
    impl SpaceLookup for StubSpaces {
        async fn get_by_id(&self, space_id: Uuid) -> PortResult<Option<Space>> {
            Ok(self.spaces.get(&space_id).cloned())
        }
    }

    /// In-memory store mirroring the SQL adapter's semantics. Yields between
    /// operations so interleavings in the race test are realistic.
    #[derive(Default)]
    struct MemStore {
        rows: StdMutex<Vec<Booking>>,
    }

    #[async_trait]
    impl BookingStore for MemStore {
        async fn find_overlapping(
            &self,
            space_id: Uuid,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> PortResult<Vec<Booking>> {
            tokio::task::yield_now().await;
            let rows = self.rows.lock().unwrap();
            Ok(rows
                .iter()
                .filter(|b| {
                    b.space_id == space_id
                        && b.status != BookingStatus::Cancelled
                        && overlaps(b.start_date, b.end_date, start, end)
                })
                .cloned()
                .collect())
        }

        async fn insert(&self, booking: &Booking) -> PortResult<()> {
            tokio::task::yield_now().await;
            self.rows.lock().unwrap().push(booking.clone());
            Ok(())
        }

        async fn find_by_id(&self, id: Uuid) -> PortResult<Option<Booking>> {
            let rows = self.rows.lock().unwrap();
            Ok(rows.iter().find(|b| b.id == id).cloned())
        }

        async fn find_by_user(&self, user_id: Uuid) -> PortResult<Vec<Booking>> {
            let rows = self.rows.lock().unwrap();
            Ok(rows.iter().filter(|b| b.user_id == user_id).cloned().collect())
        }

        async fn update_status(
            &self,
            id: Uuid,
            status: BookingStatus,
            updated_at: DateTime<Utc>,
        ) -> PortResult<bool> {
            let mut rows = self.rows.lock().unwrap();
            match rows
                .iter_mut()
                .find(|b| b.id == id && b.status != BookingStatus::Cancelled)
            {
                Some(row) => {
                    row.status = status;
                    row.updated_at = updated_at;
                    Ok(true)
                }
                None => Ok(false),
            }
        }
    }

    /// A store whose every call fails, for taxonomy-mapping tests.
    struct DownStore;

    #[async_trait]
    impl BookingStore for DownStore {
        async fn find_overlapping(
            &self,
            _: Uuid,
            _: DateTime<Utc>,
            _: DateTime<Utc>,
        ) -> PortResult<Vec<Booking>> {
            Err(PortError::Unavailable("connection refused".into()))
        }
        async fn insert(&self, _: &Booking) -> PortResult<()> {
            Err(PortError::Unavailable("connection refused".into()))
        }
        async fn find_by_id(&self, _: Uuid) -> PortResult<Option<Booking>> {
            Err(PortError::Unavailable("connection refused".into()))
        }
        async fn find_by_user(&self, _: Uuid) -> PortResult<Vec<Booking>> {
            Err(PortError::Unavailable("connection refused".into()))
        }
        async fn update_status(
            &self,
            _: Uuid,
            _: BookingStatus,
            _: DateTime<Utc>,
        ) -> PortResult<bool> {
            Err(PortError::Unavailable("connection refused".into()))
        }
    }

    /// A store whose writes lose to a concurrent transaction: inserts trip
    /// the storage-level overlap guard, status updates a plain write
    /// conflict.
    #[derive(Default)]
    struct ContendedStore {
        existing: StdMutex<Option<Booking>>,
    }

    #[async_trait]
    impl BookingStore for ContendedStore {
        async fn find_overlapping(
            &self,
            _: Uuid,
            _: DateTime<Utc>,
            _: DateTime<Utc>,
        ) -> PortResult<Vec<Booking>> {
            Ok(Vec::new())
        }
        async fn insert(&self, _: &Booking) -> PortResult<()> {
            Err(PortError::Conflict("overlapping range".into()))
        }
        async fn find_by_id(&self, _: Uuid) -> PortResult<Option<Booking>> {
            Ok(self.existing.lock().unwrap().clone())
        }
        async fn find_by_user(&self, _: Uuid) -> PortResult<Vec<Booking>> {
            Ok(self.existing.lock().unwrap().clone().into_iter().collect())
        }
        async fn update_status(
            &self,
            _: Uuid,
            _: BookingStatus,
            _: DateTime<Utc>,
        ) -> PortResult<bool> {
            Err(PortError::Conflict("concurrent transaction".into()))
        }
    }

    struct Fixture {
        engine: Arc<BookingEngine>,
        user: Uuid,
        other_user: Uuid,
        space: Uuid,
        inactive_space: Uuid,
    }

    fn fixture_with_store(store: Arc<dyn BookingStore>) -> Fixture {
        let user = Uuid::new_v4();
        let other_user = Uuid::new_v4();
        let space = Uuid::new_v4();
        let inactive = Uuid::new_v4();

        let mut spaces = HashMap::new();
        spaces.insert(
            space,
            Space {
                id: space,
                name: "Room A".into(),
                price_per_night: 100.0,
                is_active: true,
            },
        );
        spaces.insert(
            inactive,
            Space {
                id: inactive,
                name: "Closed room".into(),
                price_per_night: 100.0,
                is_active: false,
            },
        );

        let engine = Arc::new(BookingEngine::new(
            Arc::new(StubUsers {
                known: [user, other_user].into_iter().collect(),
            }),
            Arc::new(StubSpaces { spaces }),
            store,
        ));

        Fixture {
            engine,
            user,
            other_user,
            space,
            inactive_space: inactive,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_store(Arc::new(MemStore::default()))
    }

    /// Builds a request `start`/`end` days from today, normalized to the
    /// 14:00 check-in / 12:00 check-out times the inbound layer applies.
    fn request(fx: &Fixture, user: Uuid, start: i64, end: i64) -> CreateBooking {
        let today = Utc::now().date_naive();
        let start_day = today + Duration::days(start);
        let end_day = today + Duration::days(end);
        CreateBooking {
            user_id: user,
            space_id: fx.space,
            start_date: Utc.from_utc_datetime(&start_day.and_hms_opt(14, 0, 0).unwrap()),
            end_date: Utc.from_utc_datetime(&end_day.and_hms_opt(12, 0, 0).unwrap()),
        }
    }

    #[tokio::test]
    async fn create_prices_three_nights_and_starts_pending() {
        let fx = fixture();
        let token = CancellationToken::new();

        let booking = fx
            .engine
            .create(request(&fx, fx.user, 1, 4), &token)
            .await
            .unwrap();

        assert_eq!(booking.total_price, 300.0);
        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.user_id, fx.user);
        assert_eq!(booking.created_at, booking.updated_at);
    }

    #[tokio::test]
    async fn overlapping_create_is_rejected() {
        let fx = fixture();
        let token = CancellationToken::new();

        fx.engine
            .create(request(&fx, fx.user, 1, 4), &token)
            .await
            .unwrap();

        let second = fx
            .engine
            .create(request(&fx, fx.other_user, 3, 5), &token)
            .await;
        assert!(matches!(second, Err(BookingError::Conflict(_))));
    }

    #[tokio::test]
    async fn adjacent_ranges_do_not_conflict() {
        let fx = fixture();
        let token = CancellationToken::new();

        fx.engine
            .create(request(&fx, fx.user, 1, 4), &token)
            .await
            .unwrap();

        // Checks out on day 4, next guest checks in on day 4.
        let next = fx
            .engine
            .create(request(&fx, fx.other_user, 4, 6), &token)
            .await;
        assert!(next.is_ok());
    }

    #[tokio::test]
    async fn zero_duration_is_invalid_input() {
        let fx = fixture();
        let token = CancellationToken::new();

        let res = fx.engine.create(request(&fx, fx.user, 2, 2), &token).await;
        assert!(matches!(res, Err(BookingError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn past_start_date_is_invalid_input() {
        let fx = fixture();
        let token = CancellationToken::new();

        let res = fx.engine.create(request(&fx, fx.user, -2, 2), &token).await;
        assert!(matches!(res, Err(BookingError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn unknown_user_and_space_are_not_found() {
        let fx = fixture();
        let token = CancellationToken::new();

        let res = fx
            .engine
            .create(request(&fx, Uuid::new_v4(), 1, 3), &token)
            .await;
        assert!(matches!(res, Err(BookingError::NotFound("user"))));

        let mut input = request(&fx, fx.user, 1, 3);
        input.space_id = Uuid::new_v4();
        let res = fx.engine.create(input, &token).await;
        assert!(matches!(res, Err(BookingError::NotFound("space"))));
    }

    #[tokio::test]
    async fn inactive_space_is_invalid_state() {
        let fx = fixture();
        let token = CancellationToken::new();

        let mut input = request(&fx, fx.user, 1, 3);
        input.space_id = fx.inactive_space;

        let res = fx.engine.create(input, &token).await;
        assert!(matches!(res, Err(BookingError::InvalidState(_))));
    }

    #[tokio::test]
    async fn cancel_releases_the_range() {
        let fx = fixture();
        let token = CancellationToken::new();

        let booking = fx
            .engine
            .create(request(&fx, fx.user, 1, 4), &token)
            .await
            .unwrap();

        fx.engine.cancel(booking.id, fx.user, &token).await.unwrap();

        let fetched = fx
            .engine
            .get_by_id(booking.id, fx.user, &token)
            .await
            .unwrap();
        assert_eq!(fetched.status, BookingStatus::Cancelled);

        // The same range is bookable again, by anyone.
        let rebook = fx
            .engine
            .create(request(&fx, fx.other_user, 1, 4), &token)
            .await;
        assert!(rebook.is_ok());
    }

    #[tokio::test]
    async fn cancel_by_non_owner_is_forbidden() {
        let fx = fixture();
        let token = CancellationToken::new();

        let booking = fx
            .engine
            .create(request(&fx, fx.user, 1, 4), &token)
            .await
            .unwrap();

        let res = fx.engine.cancel(booking.id, fx.other_user, &token).await;
        assert!(matches!(res, Err(BookingError::Forbidden)));
    }

    #[tokio::test]
    async fn double_cancel_conflicts() {
        let fx = fixture();
        let token = CancellationToken::new();

        let booking = fx
            .engine
            .create(request(&fx, fx.user, 1, 4), &token)
            .await
            .unwrap();

        fx.engine.cancel(booking.id, fx.user, &token).await.unwrap();
        let second = fx.engine.cancel(booking.id, fx.user, &token).await;
        assert!(matches!(second, Err(BookingError::Conflict(_))));
    }

    #[tokio::test]
    async fn cancel_of_missing_booking_is_not_found() {
        let fx = fixture();
        let token = CancellationToken::new();

        let res = fx.engine.cancel(Uuid::new_v4(), fx.user, &token).await;
        assert!(matches!(res, Err(BookingError::NotFound("booking"))));
    }

    #[tokio::test]
    async fn get_by_id_enforces_ownership() {
        let fx = fixture();
        let token = CancellationToken::new();

        let booking = fx
            .engine
            .create(request(&fx, fx.user, 1, 4), &token)
            .await
            .unwrap();

        let owner_view = fx.engine.get_by_id(booking.id, fx.user, &token).await;
        assert!(owner_view.is_ok());

        let stranger_view = fx
            .engine
            .get_by_id(booking.id, fx.other_user, &token)
            .await;
        assert!(matches!(stranger_view, Err(BookingError::Forbidden)));

        let missing = fx
            .engine
            .get_by_id(Uuid::new_v4(), fx.user, &token)
            .await;
        assert!(matches!(missing, Err(BookingError::NotFound("booking"))));
    }

    #[tokio::test]
    async fn get_by_id_is_an_idempotent_read() {
        let fx = fixture();
        let token = CancellationToken::new();

        let booking = fx
            .engine
            .create(request(&fx, fx.user, 1, 4), &token)
            .await
            .unwrap();

        let first = fx
            .engine
            .get_by_id(booking.id, fx.user, &token)
            .await
            .unwrap();
        let second = fx
            .engine
            .get_by_id(booking.id, fx.user, &token)
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.status, second.status);
        assert_eq!(first.total_price, second.total_price);
        assert_eq!(first.updated_at, second.updated_at);
    }

    #[tokio::test]
    async fn list_by_user_returns_only_their_bookings() {
        let fx = fixture();
        let token = CancellationToken::new();

        fx.engine
            .create(request(&fx, fx.user, 1, 3), &token)
            .await
            .unwrap();
        fx.engine
            .create(request(&fx, fx.other_user, 5, 7), &token)
            .await
            .unwrap();

        let mine = fx.engine.list_by_user(fx.user, &token).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert!(mine.iter().all(|b| b.user_id == fx.user));

        let nobody = fx
            .engine
            .list_by_user(Uuid::new_v4(), &token)
            .await
            .unwrap();
        assert!(nobody.is_empty());
    }

    #[tokio::test]
    async fn concurrent_creates_have_a_single_winner() {
        let fx = fixture();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let engine = fx.engine.clone();
            let input = request(&fx, fx.user, 1, 4);
            handles.push(tokio::spawn(async move {
                let token = CancellationToken::new();
                engine.create(input, &token).await
            }));
        }

        let mut successes = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(BookingError::Conflict(_)) => conflicts += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(conflicts, 9);
    }

    #[tokio::test]
    async fn cancelled_token_aborts_the_operation() {
        let fx = fixture();
        let token = CancellationToken::new();
        token.cancel();

        let res = fx.engine.create(request(&fx, fx.user, 1, 4), &token).await;
        assert!(matches!(res, Err(BookingError::Cancelled)));
    }

    #[tokio::test]
    async fn storage_overlap_guard_reports_double_booking() {
        let fx = fixture_with_store(Arc::new(ContendedStore::default()));
        let token = CancellationToken::new();

        let res = fx.engine.create(request(&fx, fx.user, 1, 4), &token).await;
        assert!(matches!(
            res,
            Err(BookingError::Conflict("space already booked"))
        ));
    }

    #[tokio::test]
    async fn contended_cancel_does_not_claim_double_booking() {
        let store = Arc::new(ContendedStore::default());
        let fx = fixture_with_store(store.clone());
        let token = CancellationToken::new();

        let booking = Booking::new(&request(&fx, fx.user, 1, 4), 300.0, Utc::now());
        *store.existing.lock().unwrap() = Some(booking.clone());

        let res = fx.engine.cancel(booking.id, fx.user, &token).await;
        assert!(matches!(res, Err(BookingError::Conflict("concurrent update"))));
    }

    #[tokio::test]
    async fn storage_failure_surfaces_as_unavailable() {
        let fx = fixture_with_store(Arc::new(DownStore));
        let token = CancellationToken::new();

        let res = fx.engine.create(request(&fx, fx.user, 1, 4), &token).await;
        assert!(matches!(res, Err(BookingError::Unavailable(_))));

        let res = fx.engine.list_by_user(fx.user, &token).await;
        assert!(matches!(res, Err(BookingError::Unavailable(_))));
    }
}
