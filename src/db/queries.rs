use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{
    ConversationSession, Reservation, ReservationStatus, RoomType, StayDates,
};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

fn ts(value: &NaiveDateTime) -> String {
    value.format(TS_FORMAT).to_string()
}

fn date(value: &NaiveDate) -> String {
    value.format(DATE_FORMAT).to_string()
}

// ── Sessions ──

/// Loads a stored session regardless of expiry; the caller applies the TTL.
pub fn get_session(conn: &Connection, session_id: &str) -> anyhow::Result<Option<ConversationSession>> {
    let snapshot: Option<String> = conn
        .query_row(
            "SELECT snapshot FROM sessions WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )
        .optional()?;

    match snapshot {
        Some(json) => match serde_json::from_str(&json) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                tracing::warn!(session_id, error = %e, "discarding unreadable session snapshot");
                Ok(None)
            }
        },
        None => Ok(None),
    }
}

pub fn save_session(
    conn: &Connection,
    session: &ConversationSession,
    expires_at: &NaiveDateTime,
) -> anyhow::Result<()> {
    let snapshot = serde_json::to_string(session)?;
    conn.execute(
        "INSERT INTO sessions (session_id, snapshot, stage, updated_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(session_id) DO UPDATE SET
           snapshot = excluded.snapshot,
           stage = excluded.stage,
           updated_at = excluded.updated_at,
           expires_at = excluded.expires_at",
        params![
            session.session_id,
            snapshot,
            session.stage_label(),
            ts(&session.updated_at),
            ts(expires_at),
        ],
    )?;
    Ok(())
}

pub fn expire_old_sessions(conn: &Connection, now: &NaiveDateTime) -> anyhow::Result<usize> {
    let count = conn.execute(
        "DELETE FROM sessions WHERE expires_at <= ?1",
        params![ts(now)],
    )?;
    Ok(count)
}

// ── Reservations ──

const RESERVATION_COLUMNS: &str = "id, guest_name, guest_email, guest_phone, room_type, adults, children, \
     check_in, check_out, status, version, created_at, updated_at";

pub fn insert_reservation(conn: &Connection, reservation: &Reservation) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO reservations (id, guest_name, guest_email, guest_phone, room_type, adults, children, check_in, check_out, status, version, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            reservation.id,
            reservation.guest_name,
            reservation.guest_email,
            reservation.guest_phone,
            reservation.room_type.as_str(),
            reservation.adults,
            reservation.children,
            date(&reservation.check_in),
            date(&reservation.check_out),
            reservation.status.as_str(),
            reservation.version,
            ts(&reservation.created_at),
            ts(&reservation.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_reservation(conn: &Connection, id: &str) -> anyhow::Result<Option<Reservation>> {
    let result = conn.query_row(
        &format!("SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = ?1"),
        params![id],
        |row| Ok(parse_reservation_row(row)),
    );

    match result {
        Ok(reservation) => Ok(Some(reservation?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Moves a reservation to new dates if it is still at `expected_version`.
/// Returns the number of rows written: zero means missing or stale.
pub fn update_reservation_dates(
    conn: &Connection,
    id: &str,
    dates: &StayDates,
    expected_version: i64,
    now: &NaiveDateTime,
) -> anyhow::Result<usize> {
    let count = conn.execute(
        "UPDATE reservations
         SET check_in = ?1, check_out = ?2, version = version + 1, updated_at = ?3
         WHERE id = ?4 AND version = ?5 AND status = 'confirmed'",
        params![
            date(&dates.check_in),
            date(&dates.check_out),
            ts(now),
            id,
            expected_version
        ],
    )?;
    Ok(count)
}

pub fn update_reservation_status(
    conn: &Connection,
    id: &str,
    status: &ReservationStatus,
    now: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE reservations SET status = ?1, version = version + 1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), ts(now), id],
    )?;
    Ok(count > 0)
}

/// Confirmed reservations of `room` whose stay overlaps `dates`.
pub fn count_overlapping(
    conn: &Connection,
    room: RoomType,
    dates: &StayDates,
    exclude_id: Option<&str>,
) -> anyhow::Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM reservations
         WHERE room_type = ?1 AND status = 'confirmed'
           AND check_in < ?3 AND check_out > ?2
           AND (?4 IS NULL OR id != ?4)",
        params![room.as_str(), date(&dates.check_in), date(&dates.check_out), exclude_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn list_reservations(
    conn: &Connection,
    status_filter: Option<&str>,
    limit: i64,
) -> anyhow::Result<Vec<Reservation>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RESERVATION_COLUMNS} FROM reservations
         WHERE (?1 IS NULL OR status = ?1)
         ORDER BY check_in ASC LIMIT ?2"
    ))?;
    let rows = stmt.query_map(params![status_filter, limit], |row| {
        Ok(parse_reservation_row(row))
    })?;

    let mut reservations = vec![];
    for row in rows {
        reservations.push(row??);
    }
    Ok(reservations)
}

fn parse_reservation_row(row: &rusqlite::Row) -> anyhow::Result<Reservation> {
    let room_str: String = row.get(4)?;
    let check_in_str: String = row.get(7)?;
    let check_out_str: String = row.get(8)?;
    let status_str: String = row.get(9)?;
    let created_at_str: String = row.get(11)?;
    let updated_at_str: String = row.get(12)?;

    let room_type = RoomType::parse(&room_str)
        .ok_or_else(|| anyhow::anyhow!("unknown room type in storage: {room_str}"))?;

    Ok(Reservation {
        id: row.get(0)?,
        guest_name: row.get(1)?,
        guest_email: row.get(2)?,
        guest_phone: row.get(3)?,
        room_type,
        adults: row.get(5)?,
        children: row.get(6)?,
        check_in: NaiveDate::parse_from_str(&check_in_str, DATE_FORMAT)?,
        check_out: NaiveDate::parse_from_str(&check_out_str, DATE_FORMAT)?,
        status: ReservationStatus::from_str(&status_str),
        version: row.get(10)?,
        created_at: NaiveDateTime::parse_from_str(&created_at_str, TS_FORMAT)?,
        updated_at: NaiveDateTime::parse_from_str(&updated_at_str, TS_FORMAT)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use crate::models::Workflow;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn reservation(id: &str, room: RoomType, check_in: u32, check_out: u32) -> Reservation {
        Reservation {
            id: id.to_string(),
            guest_name: "Ada Lovelace".to_string(),
            guest_email: "ada@example.com".to_string(),
            guest_phone: None,
            room_type: room,
            adults: 2,
            children: 0,
            check_in: NaiveDate::from_ymd_opt(2025, 6, check_in).unwrap(),
            check_out: NaiveDate::from_ymd_opt(2025, 6, check_out).unwrap(),
            status: ReservationStatus::Confirmed,
            version: 1,
            created_at: at(2025, 5, 1),
            updated_at: at(2025, 5, 1),
        }
    }

    fn stay(check_in: u32, check_out: u32) -> StayDates {
        StayDates {
            check_in: NaiveDate::from_ymd_opt(2025, 6, check_in).unwrap(),
            check_out: NaiveDate::from_ymd_opt(2025, 6, check_out).unwrap(),
        }
    }

    #[test]
    fn test_session_roundtrip_and_expiry() {
        let conn = init_db(":memory:").unwrap();
        let mut session = ConversationSession::new("ig:42", at(2025, 5, 1));
        session.workflow = Some(Workflow::new_booking());
        save_session(&conn, &session, &at(2025, 5, 2)).unwrap();

        let loaded = get_session(&conn, "ig:42").unwrap().unwrap();
        assert_eq!(loaded, session);
        assert!(get_session(&conn, "ig:43").unwrap().is_none());

        assert_eq!(expire_old_sessions(&conn, &at(2025, 5, 1)).unwrap(), 0);
        assert_eq!(expire_old_sessions(&conn, &at(2025, 5, 3)).unwrap(), 1);
        assert!(get_session(&conn, "ig:42").unwrap().is_none());
    }

    #[test]
    fn test_reservation_roundtrip() {
        let conn = init_db(":memory:").unwrap();
        let original = reservation("HB-00000001", RoomType::Deluxe, 10, 14);
        insert_reservation(&conn, &original).unwrap();

        let loaded = get_reservation(&conn, "HB-00000001").unwrap().unwrap();
        assert_eq!(loaded.room_type, RoomType::Deluxe);
        assert_eq!(loaded.check_in, original.check_in);
        assert_eq!(loaded.version, 1);
        assert!(get_reservation(&conn, "HB-FFFFFFFF").unwrap().is_none());

        // Primary key rejects a duplicate id.
        assert!(insert_reservation(&conn, &original).is_err());
    }

    #[test]
    fn test_versioned_date_update() {
        let conn = init_db(":memory:").unwrap();
        insert_reservation(&conn, &reservation("HB-00000002", RoomType::Suite, 10, 14)).unwrap();

        let written =
            update_reservation_dates(&conn, "HB-00000002", &stay(12, 15), 1, &at(2025, 5, 2)).unwrap();
        assert_eq!(written, 1);
        let stale =
            update_reservation_dates(&conn, "HB-00000002", &stay(20, 22), 1, &at(2025, 5, 2)).unwrap();
        assert_eq!(stale, 0);

        let loaded = get_reservation(&conn, "HB-00000002").unwrap().unwrap();
        assert_eq!(loaded.version, 2);
        assert_eq!(loaded.check_in, NaiveDate::from_ymd_opt(2025, 6, 12).unwrap());
    }

    #[test]
    fn test_overlap_count() {
        let conn = init_db(":memory:").unwrap();
        insert_reservation(&conn, &reservation("HB-00000003", RoomType::Standard, 10, 14)).unwrap();
        insert_reservation(&conn, &reservation("HB-00000004", RoomType::Standard, 14, 16)).unwrap();
        insert_reservation(&conn, &reservation("HB-00000005", RoomType::Deluxe, 10, 14)).unwrap();

        assert_eq!(count_overlapping(&conn, RoomType::Standard, &stay(11, 15), None).unwrap(), 2);
        // Check-out day is free for the next arrival.
        assert_eq!(count_overlapping(&conn, RoomType::Standard, &stay(16, 18), None).unwrap(), 0);
        assert_eq!(
            count_overlapping(&conn, RoomType::Standard, &stay(11, 15), Some("HB-00000003")).unwrap(),
            1
        );

        update_reservation_status(&conn, "HB-00000004", &ReservationStatus::Cancelled, &at(2025, 5, 2))
            .unwrap();
        assert_eq!(count_overlapping(&conn, RoomType::Standard, &stay(11, 15), None).unwrap(), 1);
    }

    #[test]
    fn test_list_with_status_filter() {
        let conn = init_db(":memory:").unwrap();
        insert_reservation(&conn, &reservation("HB-00000006", RoomType::Standard, 10, 14)).unwrap();
        insert_reservation(&conn, &reservation("HB-00000007", RoomType::Deluxe, 1, 3)).unwrap();
        update_reservation_status(&conn, "HB-00000006", &ReservationStatus::Cancelled, &at(2025, 5, 2))
            .unwrap();

        let all = list_reservations(&conn, None, 50).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, "HB-00000007");

        let cancelled = list_reservations(&conn, Some("cancelled"), 50).unwrap();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].id, "HB-00000006");
    }
}
