use std::sync::{Arc, MutexGuard};

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{ConversationSession, Reservation, ReservationStatus};
use crate::state::AppState;

#[allow(clippy::result_large_err)]
fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), Response> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if token.is_empty() || token != expected_token {
        return Err(AppError::Unauthorized.into_response());
    }
    Ok(())
}

#[allow(clippy::result_large_err)]
fn lock_db(state: &AppState) -> Result<MutexGuard<'_, Connection>, Response> {
    state
        .db
        .lock()
        .map_err(|_| AppError::Internal(anyhow::anyhow!("database lock poisoned")).into_response())
}

fn internal(e: anyhow::Error) -> Response {
    tracing::error!(error = %e, "admin query failed");
    AppError::Internal(e).into_response()
}

// GET /api/sessions/:id
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Result<Json<ConversationSession>, Response> {
    check_auth(&headers, &state.config.admin_token)?;

    match state.engine.snapshot(&session_id).map_err(internal)? {
        Some(session) => Ok(Json(session)),
        None => Err(AppError::NotFound(format!("session {session_id}")).into_response()),
    }
}

// GET /api/bookings
#[derive(Deserialize)]
pub struct BookingsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct BookingResponse {
    #[serde(flatten)]
    reservation: Reservation,
    nights: i64,
    total_amount: f64,
}

impl From<Reservation> for BookingResponse {
    fn from(reservation: Reservation) -> Self {
        Self {
            nights: reservation.nights(),
            total_amount: reservation.total_amount(),
            reservation,
        }
    }
}

pub async fn get_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<Vec<BookingResponse>>, Response> {
    check_auth(&headers, &state.config.admin_token)?;

    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let reservations = {
        let db = lock_db(&state)?;
        queries::list_reservations(&db, query.status.as_deref(), limit).map_err(internal)?
    };

    Ok(Json(reservations.into_iter().map(BookingResponse::from).collect()))
}

// GET /api/bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<BookingResponse>, Response> {
    check_auth(&headers, &state.config.admin_token)?;

    let reservation = {
        let db = lock_db(&state)?;
        queries::get_reservation(&db, &id.to_uppercase()).map_err(internal)?
    };

    reservation
        .map(|r| Json(BookingResponse::from(r)))
        .ok_or_else(|| AppError::NotFound(format!("booking {id}")).into_response())
}

// POST /api/bookings/:id/cancel
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, Response> {
    check_auth(&headers, &state.config.admin_token)?;

    let now = Utc::now().naive_utc();
    let updated = {
        let db = lock_db(&state)?;
        queries::update_reservation_status(&db, &id.to_uppercase(), &ReservationStatus::Cancelled, &now)
            .map_err(internal)?
    };

    if updated {
        tracing::info!(booking_id = %id, "reservation cancelled by admin");
        Ok(Json(serde_json::json!({"ok": true})))
    } else {
        Err(AppError::NotFound(format!("booking {id}")).into_response())
    }
}
