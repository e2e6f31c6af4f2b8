use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, ErrorCode};

use crate::db::queries;
use crate::errors::{BackendError, RepositoryError};
use crate::models::{NewReservation, Reservation, ReservationStatus, RoomType, StayDates};

const BACKEND: &str = "reservations";
const MAX_ID_ATTEMPTS: usize = 5;

/// Durable reservation storage. The conversation engine only ever reads,
/// commits a fresh key, or moves the dates of an existing key.
#[async_trait]
pub trait ReservationRepository: Send + Sync {
    /// Looks up a live reservation. Cancelled ones are reported as missing.
    async fn find(&self, reference: &str) -> Result<Reservation, RepositoryError>;

    /// Persists a new reservation under a freshly issued id and returns it.
    async fn commit(&self, reservation: &NewReservation) -> Result<String, RepositoryError>;

    /// Moves a reservation to new dates, failing with `Conflict` when it
    /// changed since `expected_version` was read.
    async fn update(
        &self,
        reference: &str,
        dates: StayDates,
        expected_version: i64,
    ) -> Result<Reservation, RepositoryError>;

    /// Whether another stay of `room` fits the dates, ignoring `exclude`.
    async fn is_available(
        &self,
        room: RoomType,
        dates: StayDates,
        exclude: Option<&str>,
    ) -> Result<bool, RepositoryError>;
}

pub struct SqliteReservations {
    db: Arc<Mutex<Connection>>,
    inventory: u32,
}

impl SqliteReservations {
    pub fn new(db: Arc<Mutex<Connection>>, inventory: u32) -> Self {
        Self { db, inventory }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, RepositoryError> {
        self.db
            .lock()
            .map_err(|_| BackendError::unavailable(BACKEND, "database lock poisoned").into())
    }
}

fn storage_error(e: anyhow::Error) -> RepositoryError {
    BackendError::unavailable(BACKEND, e).into()
}

fn is_duplicate_key(e: &anyhow::Error) -> bool {
    matches!(
        e.downcast_ref::<rusqlite::Error>(),
        Some(rusqlite::Error::SqliteFailure(f, _)) if f.code == ErrorCode::ConstraintViolation
    )
}

/// Short guest-facing reference such as `HB-3F9A1C07`.
pub fn generate_reference() -> String {
    let raw = uuid::Uuid::new_v4().simple().to_string();
    format!("HB-{}", raw[..8].to_uppercase())
}

#[async_trait]
impl ReservationRepository for SqliteReservations {
    async fn find(&self, reference: &str) -> Result<Reservation, RepositoryError> {
        let conn = self.conn()?;
        match queries::get_reservation(&conn, reference).map_err(storage_error)? {
            Some(r) if r.status == ReservationStatus::Confirmed => Ok(r),
            _ => Err(RepositoryError::NotFound(reference.to_string())),
        }
    }

    async fn commit(&self, reservation: &NewReservation) -> Result<String, RepositoryError> {
        let conn = self.conn()?;
        let now = Utc::now().naive_utc();

        for _ in 0..MAX_ID_ATTEMPTS {
            let record = Reservation {
                id: generate_reference(),
                guest_name: reservation.guest_name.clone(),
                guest_email: reservation.guest_email.clone(),
                guest_phone: reservation.guest_phone.clone(),
                room_type: reservation.room_type,
                adults: reservation.adults,
                children: reservation.children,
                check_in: reservation.check_in,
                check_out: reservation.check_out,
                status: ReservationStatus::Confirmed,
                version: 1,
                created_at: now,
                updated_at: now,
            };
            match queries::insert_reservation(&conn, &record) {
                Ok(()) => {
                    tracing::info!(booking_id = %record.id, room = record.room_type.as_str(), "reservation committed");
                    return Ok(record.id);
                }
                Err(e) if is_duplicate_key(&e) => {
                    tracing::warn!(booking_id = %record.id, "reservation id collision, reissuing");
                }
                Err(e) => return Err(storage_error(e)),
            }
        }
        Err(BackendError::unavailable(BACKEND, "could not issue a unique reservation id").into())
    }

    async fn update(
        &self,
        reference: &str,
        dates: StayDates,
        expected_version: i64,
    ) -> Result<Reservation, RepositoryError> {
        let conn = self.conn()?;
        let now = Utc::now().naive_utc();
        let written =
            queries::update_reservation_dates(&conn, reference, &dates, expected_version, &now)
                .map_err(storage_error)?;

        let current = queries::get_reservation(&conn, reference).map_err(storage_error)?;
        match (written, current) {
            (1, Some(updated)) => {
                tracing::info!(booking_id = reference, version = updated.version, "reservation rescheduled");
                Ok(updated)
            }
            (_, Some(r)) if r.status == ReservationStatus::Confirmed => {
                Err(RepositoryError::Conflict(reference.to_string()))
            }
            _ => Err(RepositoryError::NotFound(reference.to_string())),
        }
    }

    async fn is_available(
        &self,
        room: RoomType,
        dates: StayDates,
        exclude: Option<&str>,
    ) -> Result<bool, RepositoryError> {
        let conn = self.conn()?;
        let taken = queries::count_overlapping(&conn, room, &dates, exclude).map_err(storage_error)?;
        Ok(taken < i64::from(self.inventory))
    }
}
